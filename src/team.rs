use crate::barrier::Barrier;
use crate::comm::{Comm, CommOps, Dist, Envelope, SerializedData};
use crate::error::{CommError, CommResult, GridResult};
use crate::grid_arch::{ArchRT, TeamArch};
use crate::process_grid::ProcessGrid;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

// collective traffic never collides with user tags (which are at most u32::MAX)
const COLLECTIVE_BIT: u64 = 1 << 63;

/// Reduction applied element wise by [GridTeam::reduce] and friends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

/// Element types the reducing collectives can combine.
pub trait Reducible: Dist + PartialOrd + std::ops::Add<Output = Self> {}
impl<T: Dist + PartialOrd + std::ops::Add<Output = T>> Reducible for T {}

impl ReduceOp {
    /// `acc[i] = acc[i] op other[i]`
    pub fn combine<T: Reducible>(&self, acc: &mut [T], other: &[T]) {
        for (a, b) in acc.iter_mut().zip(other.iter()) {
            match self {
                ReduceOp::Sum => *a = *a + *b,
                ReduceOp::Min => {
                    if *b < *a {
                        *a = *b
                    }
                }
                ReduceOp::Max => {
                    if *b > *a {
                        *a = *b
                    }
                }
            }
        }
    }
}

/// Placement of one pe's block inside a larger receive buffer:
/// `count` runs of `blocklen` entries, consecutive runs `stride` entries apart.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StridedLayout {
    pub count: usize,
    pub blocklen: usize,
    pub stride: usize,
}

impl StridedLayout {
    pub fn new(count: usize, blocklen: usize, stride: usize) -> StridedLayout {
        StridedLayout {
            count,
            blocklen,
            stride,
        }
    }

    /// Number of entries one block carries.
    pub fn size(&self) -> usize {
        self.count * self.blocklen
    }

    /// Distance from the first to one past the last entry a block touches.
    pub fn extent(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            (self.count - 1) * self.stride + self.blocklen
        }
    }

    fn unpack<T: Copy>(&self, block: &[T], dst: &mut [T], displacement: usize) {
        if self.blocklen == 0 {
            return;
        }
        for (i, run) in block.chunks_exact(self.blocklen).enumerate() {
            let start = displacement + i * self.stride;
            dst[start..start + self.blocklen].copy_from_slice(run);
        }
    }
}

/// Receive side of [GridTeam::gather_strided], only needed on the root.
#[derive(Debug)]
pub struct GatherTarget<'a, T> {
    pub buf: &'a mut [T],
    pub layout: StridedLayout,
    /// offset into `buf` of each team pe's block, in team pe order
    pub displacements: &'a [usize],
}

/// The row and column teams of a team laid out as a square process grid.
#[derive(Debug, Clone)]
pub struct GridTeams {
    pub grid: ProcessGrid,
    /// pes of this pe's grid row, team pe `j` is grid column `j`
    pub row: Arc<GridTeam>,
    /// pes of this pe's grid column, team pe `i` is grid row `i`
    pub col: Arc<GridTeam>,
}

/// A set of pes that communicate with each other.
///
/// Team pe ids always run from `0` to `num_pes() - 1`; the team's arch maps
/// them onto world pes. Every collective must be called by all members of
/// the team, in the same order.
pub struct GridTeam {
    comm: Arc<Comm>,
    arch: Arc<ArchRT>,
    team_id: u64,
    my_pe: usize,
    world_pe: usize,
    collective_cnt: AtomicU64,
    subteam_cnt: AtomicU64,
    barrier: Barrier,
    grid_teams: OnceLock<GridTeams>,
}

impl std::fmt::Debug for GridTeam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GridTeam {{ id: {:#x}, pe: {} of {}, world pe: {} }}",
            self.team_id,
            self.my_pe,
            self.num_pes(),
            self.world_pe
        )
    }
}

impl GridTeam {
    pub(crate) fn world(comm: Arc<Comm>) -> Arc<GridTeam> {
        let num_pes = comm.num_pes();
        let world_pe = comm.my_pe();
        let mut hasher = DefaultHasher::new();
        "world".hash(&mut hasher);
        num_pes.hash(&mut hasher);
        Arc::new(GridTeam {
            comm,
            arch: Arc::new(ArchRT::world(num_pes)),
            team_id: hasher.finish(),
            my_pe: world_pe,
            world_pe,
            collective_cnt: AtomicU64::new(0),
            subteam_cnt: AtomicU64::new(0),
            barrier: Barrier::new(),
            grid_teams: OnceLock::new(),
        })
    }

    /// Create a team from a subset of this team's pes.
    ///
    /// Every pe of this team must call it, members or not, in the same order
    /// as the other pes: each call gets a fresh team id, even for a layout
    /// that was split off before.
    ///
    /// Returns `None` on pes that are not part of the new team, or when the
    /// layout does not fit inside this team.
    pub fn create_subteam_from_arch<A>(self: &Arc<Self>, arch: A) -> Option<Arc<GridTeam>>
    where
        A: TeamArch + 'static,
    {
        let seq = self.subteam_cnt.fetch_add(1, Ordering::Relaxed);
        let parent_last = self.num_pes().checked_sub(1)?;
        if arch.num_pes() == 0
            || arch.num_pes() > self.num_pes()
            || arch.start_pe() > parent_last
            || arch.end_pe() > parent_last
        {
            tracing::warn!(
                "[{}] subteam layout {:?} does not fit a team of {} pes",
                self.world_pe,
                arch,
                self.num_pes()
            );
            return None;
        }
        let arch = Arc::new(ArchRT::new(self.arch.clone(), arch));
        let my_pe = arch.team_pe(self.world_pe).ok()?;

        let mut hasher = DefaultHasher::new();
        self.team_id.hash(&mut hasher);
        seq.hash(&mut hasher);
        format!("{:?}", arch.arch).hash(&mut hasher);
        arch.team_iter().collect::<Vec<_>>().hash(&mut hasher);
        let team_id = hasher.finish();
        tracing::debug!(
            "[{}] joined team {:#x} as pe {} of {}",
            self.world_pe,
            team_id,
            my_pe,
            arch.num_pes()
        );
        Some(Arc::new(GridTeam {
            comm: self.comm.clone(),
            arch,
            team_id,
            my_pe,
            world_pe: self.world_pe,
            collective_cnt: AtomicU64::new(0),
            subteam_cnt: AtomicU64::new(0),
            barrier: self.barrier,
            grid_teams: OnceLock::new(),
        }))
    }

    /// Split this team into the rows and columns of a square process grid.
    ///
    /// The split is done once per team and shared by every later caller, so
    /// all operations on the grid use the same collective sequence.
    pub fn grid_teams(self: &Arc<Self>) -> GridResult<GridTeams> {
        if let Some(teams) = self.grid_teams.get() {
            return Ok(teams.clone());
        }
        let grid = ProcessGrid::new(self.num_pes(), self.my_pe)?;
        let missing = |what: &str| {
            CommError::InvalidArgument(format!(
                "pe {} is not a member of its own grid {}",
                self.my_pe, what
            ))
        };
        let row = self
            .create_subteam_from_arch(grid.row_arch())
            .ok_or_else(|| missing("row"))?;
        let col = self
            .create_subteam_from_arch(grid.col_arch())
            .ok_or_else(|| missing("column"))?;
        let teams = self.grid_teams.get_or_init(|| GridTeams { grid, row, col });
        Ok(teams.clone())
    }

    /// This pe's id within the team.
    pub fn my_pe(&self) -> usize {
        self.my_pe
    }

    pub fn num_pes(&self) -> usize {
        self.arch.num_pes()
    }

    /// This pe's id within the world.
    pub fn world_pe(&self) -> usize {
        self.world_pe
    }

    /// World pe ids of the team members, in team order.
    pub fn world_pes(&self) -> Vec<usize> {
        self.arch.team_iter().collect()
    }

    /// True if both handles refer to the same team.
    pub fn same_team(&self, other: &GridTeam) -> bool {
        self.team_id == other.team_id
    }

    /// Raise the group abort flag: every pe blocked in, or later entering,
    /// a communication call fails with [CommError::Aborted].
    pub fn abort(&self, code: i32) {
        self.comm.abort(code);
    }

    /// The abort code, once some pe has aborted the group.
    pub fn aborted(&self) -> Option<i32> {
        self.comm.aborted()
    }

    pub(crate) fn bytes_sent(&self) -> usize {
        self.comm.bytes_sent()
    }

    pub(crate) fn next_collective(&self) -> u64 {
        self.collective_cnt.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn collective_tag(seq: u64, round: u64) -> u64 {
        COLLECTIVE_BIT | (seq << 16) | (round & 0xffff)
    }

    fn check_pe(&self, pe: usize) -> CommResult<()> {
        if pe < self.num_pes() {
            Ok(())
        } else {
            Err(CommError::InvalidArgument(format!(
                "pe {} is not part of a team of {} pes",
                pe,
                self.num_pes()
            )))
        }
    }

    pub(crate) fn send_raw<T: Dist>(&self, team_pe: usize, tag: u64, data: &[T]) -> CommResult<()> {
        let dst = self.arch.world_pe(team_pe)?;
        self.comm.send(
            dst,
            Envelope {
                src: self.world_pe,
                team: self.team_id,
                tag,
                data: SerializedData::new(data)?,
            },
        )
    }

    pub(crate) fn recv_raw<T: Dist>(&self, team_pe: usize, tag: u64, buf: &mut [T]) -> CommResult<()> {
        let src = self.arch.world_pe(team_pe)?;
        let envelope = self.comm.recv(src, self.team_id, tag)?;
        debug_assert_eq!(envelope.src, src);
        envelope.data.deserialize_into(buf)
    }

    /// Point to point send to team pe `pe`, never waits for the receiver.
    pub fn send<T: Dist>(&self, pe: usize, tag: u32, data: &[T]) -> CommResult<()> {
        self.check_pe(pe)?;
        self.send_raw(pe, tag as u64, data)
    }

    /// Blocking receive from team pe `pe`; `buf` must have the sent length.
    pub fn recv<T: Dist>(&self, pe: usize, tag: u32, buf: &mut [T]) -> CommResult<()> {
        self.check_pe(pe)?;
        self.recv_raw(pe, tag as u64, buf)
    }

    #[tracing::instrument(skip_all)]
    pub fn barrier(&self) -> CommResult<()> {
        self.barrier.barrier(self)
    }

    /// Binomial tree broadcast of `buf` from team pe `root`.
    pub fn broadcast<T: Dist>(&self, buf: &mut [T], root: usize) -> CommResult<()> {
        self.check_pe(root)?;
        let num_pes = self.num_pes();
        let tag = Self::collective_tag(self.next_collective(), 0);
        if num_pes == 1 {
            return Ok(());
        }
        let rel = (self.my_pe + num_pes - root) % num_pes;
        let mut mask = 1;
        while mask < num_pes {
            if rel & mask != 0 {
                self.recv_raw((rel - mask + root) % num_pes, tag, buf)?;
                break;
            }
            mask <<= 1;
        }
        mask >>= 1;
        while mask > 0 {
            if rel + mask < num_pes {
                self.send_raw((rel + mask + root) % num_pes, tag, buf)?;
            }
            mask >>= 1;
        }
        Ok(())
    }

    /// Collect equally sized blocks on `root`, in team pe order.
    /// Returns the concatenation on the root and `None` elsewhere.
    pub fn gather<T: Dist>(&self, local: &[T], root: usize) -> CommResult<Option<Vec<T>>> {
        self.check_pe(root)?;
        let tag = Self::collective_tag(self.next_collective(), 0);
        if self.my_pe != root {
            self.send_raw(root, tag, local)?;
            return Ok(None);
        }
        let len = local.len();
        let mut out = Vec::with_capacity(len * self.num_pes());
        for _ in 0..self.num_pes() {
            out.extend_from_slice(local);
        }
        for pe in (0..self.num_pes()).filter(|pe| *pe != root) {
            self.recv_raw(pe, tag, &mut out[pe * len..(pe + 1) * len])?;
        }
        Ok(Some(out))
    }

    /// Gather every pe's `local` block into `target` on `root`, placing the
    /// block of team pe `p` at `displacements[p]` with the target layout.
    /// `target` is ignored on every other pe.
    pub fn gather_strided<T: Dist>(
        &self,
        local: &[T],
        root: usize,
        target: Option<GatherTarget<'_, T>>,
    ) -> CommResult<()> {
        self.check_pe(root)?;
        let tag = Self::collective_tag(self.next_collective(), 0);
        if self.my_pe != root {
            return self.send_raw(root, tag, local);
        }
        let target = target.ok_or_else(|| {
            CommError::InvalidArgument("the root of a strided gather needs a target".to_owned())
        })?;
        let layout = target.layout;
        if local.len() != layout.size() {
            return Err(CommError::SizeMismatch {
                expected: layout.size(),
                received: local.len(),
            });
        }
        if target.displacements.len() != self.num_pes() {
            return Err(CommError::InvalidArgument(format!(
                "{} displacements given for a team of {} pes",
                target.displacements.len(),
                self.num_pes()
            )));
        }
        if let Some(disp) = target
            .displacements
            .iter()
            .find(|disp| **disp + layout.extent() > target.buf.len())
        {
            return Err(CommError::InvalidArgument(format!(
                "block at offset {} with extent {} overruns a target of {} entries",
                disp,
                layout.extent(),
                target.buf.len()
            )));
        }
        let mut block = local.to_vec();
        for pe in 0..self.num_pes() {
            if pe != root {
                self.recv_raw(pe, tag, &mut block)?;
                layout.unpack(&block, target.buf, target.displacements[pe]);
            } else {
                layout.unpack(local, target.buf, target.displacements[pe]);
            }
        }
        Ok(())
    }

    /// Ring all-gather: every pe ends up with all blocks, in team pe order.
    pub fn all_gather<T: Dist>(&self, local: &[T]) -> CommResult<Vec<T>> {
        let num_pes = self.num_pes();
        let seq = self.next_collective();
        let len = local.len();
        let mut out = Vec::with_capacity(len * num_pes);
        for _ in 0..num_pes {
            out.extend_from_slice(local);
        }
        if num_pes == 1 || len == 0 {
            return Ok(out);
        }
        let right = (self.my_pe + 1) % num_pes;
        let left = (self.my_pe + num_pes - 1) % num_pes;
        for step in 0..num_pes - 1 {
            let tag = Self::collective_tag(seq, step as u64);
            let send_block = (self.my_pe + num_pes - step) % num_pes;
            let recv_block = (self.my_pe + num_pes - step - 1) % num_pes;
            self.send_raw(right, tag, &out[send_block * len..(send_block + 1) * len])?;
            self.recv_raw(left, tag, &mut out[recv_block * len..(recv_block + 1) * len])?;
        }
        Ok(out)
    }

    /// Element wise reduction onto `root`, combined in team pe order.
    pub fn reduce<T: Reducible>(
        &self,
        local: &[T],
        op: ReduceOp,
        root: usize,
    ) -> CommResult<Option<Vec<T>>> {
        self.check_pe(root)?;
        let tag = Self::collective_tag(self.next_collective(), 0);
        if self.my_pe != root {
            self.send_raw(root, tag, local)?;
            return Ok(None);
        }
        let mut acc = local.to_vec();
        let mut contribution = local.to_vec();
        for pe in 0..self.num_pes() {
            let part: &[T] = if pe == root {
                local
            } else {
                self.recv_raw(pe, tag, &mut contribution)?;
                &contribution
            };
            if pe == 0 {
                acc.copy_from_slice(part);
            } else {
                op.combine(&mut acc, part);
            }
        }
        Ok(Some(acc))
    }

    /// Reduce onto team pe 0, then broadcast the result.
    pub fn all_reduce<T: Reducible>(&self, local: &[T], op: ReduceOp) -> CommResult<Vec<T>> {
        let mut result = match self.reduce(local, op, 0)? {
            Some(result) => result,
            None => local.to_vec(),
        };
        self.broadcast(&mut result, 0)?;
        Ok(result)
    }

    /// Reduce `local` element wise and scatter the result in equal blocks:
    /// team pe `p` receives entries `p * len / num_pes .. (p + 1) * len / num_pes`.
    pub fn reduce_scatter_block<T: Reducible>(&self, local: &[T], op: ReduceOp) -> CommResult<Vec<T>> {
        let num_pes = self.num_pes();
        if local.len() % num_pes != 0 {
            return Err(CommError::InvalidArgument(format!(
                "reduce scatter of {} entries over {} pes",
                local.len(),
                num_pes
            )));
        }
        let tag = Self::collective_tag(self.next_collective(), 0);
        let len = local.len() / num_pes;
        for pe in (0..num_pes).filter(|pe| *pe != self.my_pe) {
            self.send_raw(pe, tag, &local[pe * len..(pe + 1) * len])?;
        }
        let mine = &local[self.my_pe * len..(self.my_pe + 1) * len];
        let mut acc = mine.to_vec();
        let mut contribution = mine.to_vec();
        for pe in 0..num_pes {
            let part: &[T] = if pe == self.my_pe {
                mine
            } else {
                self.recv_raw(pe, tag, &mut contribution)?;
                &contribution
            };
            if pe == 0 {
                acc.copy_from_slice(part);
            } else {
                op.combine(&mut acc, part);
            }
        }
        Ok(acc)
    }

    /// Send `buf` to `dest` and replace its contents with the block from `src`.
    ///
    /// Meant for team wide shifts: every member calls it together, so it is
    /// sequenced like a collective.
    pub fn send_recv_replace<T: Dist>(&self, buf: &mut [T], dest: usize, src: usize) -> CommResult<()> {
        self.check_pe(dest)?;
        self.check_pe(src)?;
        let tag = Self::collective_tag(self.next_collective(), 0);
        if dest == self.my_pe && src == self.my_pe {
            return Ok(());
        }
        self.send_raw(dest, tag, buf)?;
        self.recv_raw(src, tag, buf)
    }
}
