use crate::matrix::{Element, Matrix};
use crate::topology::Coord;

/// Copies the block owned by `coord` out of a global matrix.
///
/// * `global`: Full row-major matrix.
/// * `coord`: Grid position owning the block.
/// * `block_dim`: Side length of one block.
pub fn extract_block<T: Element>(global: &Matrix<T>, coord: Coord, block_dim: usize) -> Matrix<T> {
    let top = coord.row * block_dim;
    let left = coord.col * block_dim;
    assert!(top + block_dim <= global.rows());
    assert!(left + block_dim <= global.cols());

    let mut block = Matrix::zeros(block_dim, block_dim);
    for r in 0..block_dim {
        block
            .row_mut(r)
            .copy_from_slice(&global.row(top + r)[left..left + block_dim]);
    }
    block
}

/// Writes `block` into the slot of the global result owned by `coord`; the
/// exact inverse of [`extract_block`].
pub fn assemble_block<T: Element>(result: &mut Matrix<T>, coord: Coord, block: &Matrix<T>) {
    assert!(block.is_square());
    let block_dim = block.rows();
    let top = coord.row * block_dim;
    let left = coord.col * block_dim;
    assert!(top + block_dim <= result.rows());
    assert!(left + block_dim <= result.cols());

    for r in 0..block_dim {
        result.row_mut(top + r)[left..left + block_dim].copy_from_slice(block.row(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::GridTopology;

    fn numbered(n: usize) -> Matrix<i64> {
        Matrix::from_vec(n, n, (0..(n * n) as i64).collect()).unwrap()
    }

    #[test]
    fn extract_picks_the_owned_sub_block() {
        let global = numbered(4);
        let block = extract_block(&global, Coord { row: 0, col: 1 }, 2);
        assert_eq!(block, Matrix::from_rows(vec![vec![2, 3], vec![6, 7]]));

        let block = extract_block(&global, Coord { row: 1, col: 1 }, 2);
        assert_eq!(block, Matrix::from_rows(vec![vec![10, 11], vec![14, 15]]));
    }

    #[test]
    fn assemble_is_the_inverse_of_extract() {
        let global = numbered(6);
        let grid = GridTopology::new(3, 0);

        let mut rebuilt = Matrix::zeros(6, 6);
        for rank in 0..9 {
            let coord = grid.coord_of(rank);
            let block = extract_block(&global, coord, 2);
            assemble_block(&mut rebuilt, coord, &block);
        }
        assert_eq!(rebuilt, global);
    }

    #[test]
    fn single_block_round_trip_preserves_the_slot() {
        let global = numbered(4);
        let coord = Coord { row: 1, col: 0 };
        let block = extract_block(&global, coord, 2);

        let mut target = Matrix::zeros(4, 4);
        assemble_block(&mut target, coord, &block);
        assert_eq!(extract_block(&target, coord, 2), block);
        assert_eq!(target[(2, 0)], global[(2, 0)]);
        assert_eq!(target[(0, 0)], 0);
    }
}
