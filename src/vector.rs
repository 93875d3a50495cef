use crate::error::{alloc_zeroed, GridError, GridResult};
use crate::team::GridTeam;
use crate::utils::format_g;

use std::io::Write;
use std::sync::Arc;

const VIEW_TAG: u32 = 1;

/// A vector of `f64` split into equal contiguous blocks, one per team pe.
///
/// Team pe `r` owns the global entries `r * local_len() .. (r + 1) * local_len()`.
#[derive(Debug)]
pub struct DistVec {
    global_len: usize,
    local_len: usize,
    team: Arc<GridTeam>,
    data: Vec<f64>,
}

impl DistVec {
    /// Create a zeroed vector of `global_len` entries over `team`.
    ///
    /// Fails when `global_len` does not split evenly over the team or the
    /// local block cannot be allocated.
    pub fn new(team: &Arc<GridTeam>, global_len: usize) -> GridResult<DistVec> {
        let num_pes = team.num_pes();
        if global_len % num_pes != 0 {
            return Err(GridError::NotDivisible {
                op: "VecCreate",
                global: global_len,
                parts: num_pes,
            });
        }
        let local_len = global_len / num_pes;
        let data = alloc_zeroed("vector", local_len)?;
        tracing::trace!(
            "[{}] new vector: global {} local {}",
            team.world_pe(),
            global_len,
            local_len
        );
        Ok(DistVec {
            global_len,
            local_len,
            team: team.clone(),
            data,
        })
    }

    pub fn global_len(&self) -> usize {
        self.global_len
    }

    pub fn local_len(&self) -> usize {
        self.local_len
    }

    /// Global index of the first local entry.
    pub fn offset(&self) -> usize {
        self.team.my_pe() * self.local_len
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

    /// Set every local entry to `value`.
    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Print the whole vector on team pe 0.
    ///
    /// Every other pe sends its block to pe 0 and writes nothing.
    #[tracing::instrument(skip_all)]
    pub fn view<W: Write>(&self, dest: &mut W) -> GridResult<()> {
        if self.team.my_pe() != 0 {
            self.team.send(0, VIEW_TAG, &self.data)?;
            return Ok(());
        }
        writeln!(dest, "Vector distributed over {} processes", self.team.num_pes())?;
        writeln!(dest, "  Global size: {}", self.global_len)?;
        writeln!(dest, "  Local size: {}", self.local_len)?;
        writeln!(dest, "  Entries:")?;
        for value in self.data.iter() {
            writeln!(dest, "{}", format_g(*value))?;
        }
        let mut block = alloc_zeroed("vector", self.local_len)?;
        for pe in 1..self.team.num_pes() {
            self.team.recv(pe, VIEW_TAG, &mut block)?;
            for value in block.iter() {
                writeln!(dest, "{}", format_g(*value))?;
            }
        }
        writeln!(dest)?;
        Ok(())
    }
}
