use crate::error::{alloc_zeroed, GridError, GridResult};
use crate::process_grid::ProcessGrid;
use crate::team::{GatherTarget, GridTeam, StridedLayout};
use crate::utils::format_row;

use std::io::Write;
use std::sync::Arc;

/// A square `f64` matrix split into equal blocks over a square process grid.
///
/// The team's pes form an `np x np` grid; the pe at grid position
/// `(row, col)` owns the row-major `n x n` block starting at global entry
/// `(row * n, col * n)`.
#[derive(Debug)]
pub struct DistMat {
    global_n: usize,
    local_n: usize,
    grid: ProcessGrid,
    team: Arc<GridTeam>,
    data: Vec<f64>,
}

impl DistMat {
    /// Create a zeroed `global_n x global_n` matrix over `team`.
    ///
    /// Fails when the team size is not a perfect square, when `global_n` is
    /// not divisible by the grid dimension, or when the local block cannot
    /// be allocated.
    pub fn new(team: &Arc<GridTeam>, global_n: usize) -> GridResult<DistMat> {
        let grid = ProcessGrid::new(team.num_pes(), team.my_pe())?;
        if global_n % grid.np() != 0 {
            return Err(GridError::NotDivisible {
                op: "MatCreate",
                global: global_n,
                parts: grid.np(),
            });
        }
        let local_n = global_n / grid.np();
        let data = alloc_zeroed("matrix", local_n * local_n)?;
        tracing::trace!(
            "[{}] new matrix: global {} local {} at ({}, {})",
            team.world_pe(),
            global_n,
            local_n,
            grid.row(),
            grid.col()
        );
        Ok(DistMat {
            global_n,
            local_n,
            grid,
            team: team.clone(),
            data,
        })
    }

    /// Global number of rows (and columns).
    pub fn global_n(&self) -> usize {
        self.global_n
    }

    /// Rows (and columns) of the local block.
    pub fn local_n(&self) -> usize {
        self.local_n
    }

    /// Dimension of the process grid.
    pub fn np(&self) -> usize {
        self.grid.np()
    }

    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    pub fn team(&self) -> &Arc<GridTeam> {
        &self.team
    }

    pub fn local(&self) -> &[f64] {
        &self.data
    }

    pub fn local_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Collect the full row-major matrix on team pe 0.
    ///
    /// Every pe must call this; only pe 0 gets `Some`.
    #[tracing::instrument(skip_all)]
    pub fn gather_to_root(&self) -> GridResult<Option<Vec<f64>>> {
        let (n, global_n, np) = (self.local_n, self.global_n, self.np());
        if self.team.my_pe() != 0 {
            self.team.gather_strided(&self.data, 0, None)?;
            return Ok(None);
        }
        let mut global = alloc_zeroed("matrix", global_n * global_n)?;
        let displacements = (0..np)
            .flat_map(|row| (0..np).map(move |col| row * n * global_n + col * n))
            .collect::<Vec<_>>();
        self.team.gather_strided(
            &self.data,
            0,
            Some(GatherTarget {
                buf: &mut global,
                layout: StridedLayout::new(n, n, global_n),
                displacements: &displacements,
            }),
        )?;
        Ok(Some(global))
    }

    /// Print the whole matrix on team pe 0, row by row.
    ///
    /// Every pe takes part in the gather; only pe 0 writes.
    #[tracing::instrument(skip_all)]
    pub fn view<W: Write>(&self, dest: &mut W) -> GridResult<()> {
        let global = match self.gather_to_root()? {
            Some(global) => global,
            None => return Ok(()),
        };
        writeln!(dest, "Matrix distributed over {} processes", self.team.num_pes())?;
        writeln!(dest, "  Global size: {} x {}", self.global_n, self.global_n)?;
        writeln!(dest, "  Local size: {} x {}", self.local_n, self.local_n)?;
        writeln!(dest, "  Entries:")?;
        if self.global_n > 0 {
            for row in global.chunks_exact(self.global_n) {
                writeln!(dest, "{}", format_row(row))?;
            }
        }
        writeln!(dest)?;
        Ok(())
    }
}
