use std::fmt;
use std::time::{Duration, Instant};

/// A labelled phase duration collected while a run progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub label: &'static str,
    pub duration: Duration,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.label, self.duration)
    }
}

/// Measures consecutive phases; each `lap` closes the phase opened by the
/// previous one (or by `start`).
pub struct Stopwatch {
    last: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Returns the span since the last lap under the given label.
    ///
    /// * `label`: Name of the phase that just finished.
    pub fn lap(&mut self, label: &'static str) -> Span {
        let now = Instant::now();
        let span = Span {
            label,
            duration: now - self.last,
        };
        self.last = now;
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laps_carry_labels_in_order() {
        let mut watch = Stopwatch::start();
        let first = watch.lap("load");
        let second = watch.lap("compute");
        assert_eq!(first.label, "load");
        assert_eq!(second.label, "compute");
    }
}
