/// Position on the process grid, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

/// Grid axis a shift moves along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Col,
}

/// Endpoints of one pairwise exchange: the rank a block arrives from and
/// the rank this process's block departs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftTarget {
    pub source: usize,
    pub dest: usize,
}

/// One process's view of a periodic `side x side` torus over the group.
///
/// Rank `r` sits at coordinate `(r / side, r % side)`; the mapping back is
/// `row * side + col`. Both are total over the grid and mutually inverse.
#[derive(Debug, Clone, Copy)]
pub struct GridTopology {
    side: usize,
    rank: usize,
    coord: Coord,
}

impl GridTopology {
    /// * `side`: Grid side length; the group must hold `side * side` ranks.
    /// * `rank`: This process's rank within the group.
    pub fn new(side: usize, rank: usize) -> Self {
        assert!(side > 0);
        assert!(rank < side * side);
        Self {
            side,
            rank,
            coord: Coord {
                row: rank / side,
                col: rank % side,
            },
        }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn coord(&self) -> Coord {
        self.coord
    }

    pub fn rank_of(&self, coord: Coord) -> usize {
        assert!(coord.row < self.side && coord.col < self.side);
        coord.row * self.side + coord.col
    }

    pub fn coord_of(&self, rank: usize) -> Coord {
        assert!(rank < self.side * self.side);
        Coord {
            row: rank / self.side,
            col: rank % self.side,
        }
    }

    /// Exchange endpoints if every process moved its block `displacement`
    /// steps along `axis`, wrapping at the grid boundary.
    ///
    /// A positive displacement moves blocks toward lower indices (left for
    /// [`Axis::Col`], up for [`Axis::Row`]): the arriving block comes from
    /// `(c + displacement) mod side` and the departing one goes to
    /// `(c - displacement) mod side`. Shifting by `side` is the identity,
    /// and shifting by `-displacement` undoes shifting by `displacement`.
    pub fn shift(&self, axis: Axis, displacement: i64) -> ShiftTarget {
        let side = self.side as i64;
        let line = match axis {
            Axis::Row => self.coord.row,
            Axis::Col => self.coord.col,
        } as i64;
        let from = (line + displacement).rem_euclid(side) as usize;
        let to = (line - displacement).rem_euclid(side) as usize;

        let (source, dest) = match axis {
            Axis::Row => (
                Coord { row: from, col: self.coord.col },
                Coord { row: to, col: self.coord.col },
            ),
            Axis::Col => (
                Coord { row: self.coord.row, col: from },
                Coord { row: self.coord.row, col: to },
            ),
        };
        ShiftTarget {
            source: self.rank_of(source),
            dest: self.rank_of(dest),
        }
    }
}

/// Side length of the square grid holding `process_count` ranks, or `None`
/// if the count is not a positive perfect square.
pub fn grid_side(process_count: usize) -> Option<usize> {
    if process_count == 0 {
        return None;
    }
    let side = (process_count as f64).sqrt().round() as usize;
    (side * side == process_count).then_some(side)
}
