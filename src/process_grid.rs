//! Rank <-> grid coordinate arithmetic for a square np x np process grid.
//!
//! Rank `r` sits at row `r / np`, column `r % np`. Grid rows are contiguous
//! rank ranges ([BlockedArch]), grid columns are strided ones ([StridedArch]).

use crate::error::{GridError, GridResult};
use crate::grid_arch::{BlockedArch, StridedArch};

/// Integer square root, `floor(sqrt(n))`.
pub fn isqrt(n: usize) -> usize {
    let mut root = (n as f64).sqrt() as usize;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root
}

/// The (row, col) position of `rank` on an np x np grid.
pub fn grid_coords(rank: usize, np: usize) -> (usize, usize) {
    (rank / np, rank % np)
}

/// The rank at (row, col) of an np x np grid.
pub fn grid_rank(row: usize, col: usize, np: usize) -> usize {
    row * np + col
}

/// Where one pe sits on the process grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProcessGrid {
    np: usize,
    row: usize,
    col: usize,
}

impl ProcessGrid {
    /// Fails unless `num_pes` is a perfect square.
    pub fn new(num_pes: usize, rank: usize) -> GridResult<ProcessGrid> {
        let np = isqrt(num_pes);
        if np == 0 || np * np != num_pes {
            return Err(GridError::NotSquareGrid { num_pes });
        }
        let (row, col) = grid_coords(rank, np);
        Ok(ProcessGrid { np, row, col })
    }

    /// Grid dimension, the grid is np x np.
    pub fn np(&self) -> usize {
        self.np
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn rank(&self) -> usize {
        grid_rank(self.row, self.col, self.np)
    }

    /// The pes sharing this pe's grid row; team pe `j` is grid column `j`.
    pub fn row_arch(&self) -> BlockedArch {
        BlockedArch::new(self.row * self.np, self.np)
    }

    /// The pes sharing this pe's grid column; team pe `i` is grid row `i`.
    pub fn col_arch(&self) -> StridedArch {
        StridedArch::new(self.col, self.np, self.np)
    }

    /// Periodic shift partners along one grid dimension: moving data `steps`
    /// positions towards lower indices, `pos` sends to the first entry and
    /// receives from the second.
    pub fn shift_partners(&self, pos: usize, steps: usize) -> (usize, usize) {
        let steps = steps % self.np;
        let dest = (pos + self.np - steps) % self.np;
        let src = (pos + steps) % self.np;
        (dest, src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isqrt_exact_and_floor() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(3), 1);
        assert_eq!(isqrt(4), 2);
        assert_eq!(isqrt(15), 3);
        assert_eq!(isqrt(16), 4);
        assert_eq!(isqrt(1 << 40), 1 << 20);
    }

    #[test]
    fn coords_round_trip() {
        for np in 1..5 {
            for rank in 0..np * np {
                let (row, col) = grid_coords(rank, np);
                assert!(row < np && col < np);
                assert_eq!(grid_rank(row, col, np), rank);
            }
        }
        assert_eq!(grid_coords(5, 3), (1, 2));
    }

    #[test]
    fn grid_requires_perfect_square() {
        assert!(ProcessGrid::new(4, 0).is_ok());
        assert!(ProcessGrid::new(1, 0).is_ok());
        assert!(matches!(
            ProcessGrid::new(6, 0),
            Err(GridError::NotSquareGrid { num_pes: 6 })
        ));
        assert!(ProcessGrid::new(0, 0).is_err());
    }

    #[test]
    fn row_and_column_layouts() {
        use crate::grid_arch::TeamArch;
        let grid = ProcessGrid::new(9, 7).unwrap();
        assert_eq!((grid.row(), grid.col()), (2, 1));
        let row = grid.row_arch();
        assert_eq!((row.start_pe(), row.end_pe()), (6, 8));
        let col = grid.col_arch();
        assert_eq!((col.start_pe(), col.end_pe()), (1, 7));
        assert_eq!(col.team_pe_id(&7), Ok(2));
    }

    #[test]
    fn shifts_wrap_around() {
        let grid = ProcessGrid::new(9, 0).unwrap();
        assert_eq!(grid.shift_partners(0, 1), (2, 1));
        assert_eq!(grid.shift_partners(2, 1), (1, 0));
        assert_eq!(grid.shift_partners(1, 2), (2, 0));
        assert_eq!(grid.shift_partners(1, 3), (1, 1));
    }
}
