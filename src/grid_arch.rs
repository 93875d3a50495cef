use enum_dispatch::enum_dispatch;
use std::sync::Arc;

/// An abstraction which represents the PEs that are associated with a team
#[enum_dispatch]
pub trait TeamArch: Send + Sync + std::fmt::Debug {
    /// The number of PEs in the team defined by this TeamArch
    fn num_pes(&self) -> usize;
    /// The id of the first (lowest numbered) PE in the team, with respect to the parent team
    fn start_pe(&self) -> usize;
    /// The id of the last (highest numbered) PE in the team, with respect to the parent team
    fn end_pe(&self) -> usize;
    /// Converts a team PE id into the id space of the parent team
    ///
    /// Returns an error if the pe does not exist in the team
    fn parent_pe_id(&self, team_pe: &usize) -> ArchResult<usize>;
    /// Converts a parent team PE id into the id space of this team
    ///
    /// Returns an error if the pe does not exist in the team
    fn team_pe_id(&self, parent_pe: &usize) -> ArchResult<usize>;
}

/// An error that occurs when trying to address a PE that does not exist on a team/subteam
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdError {
    pub parent_pe: usize,
    pub team_pe: usize,
}

pub(crate) type ArchResult<T> = Result<T, IdError>;

impl std::fmt::Display for IdError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Invalid Id => parent_pe:{} team_pe => {}",
            self.parent_pe, self.team_pe
        )
    }
}

impl std::error::Error for IdError {}

#[enum_dispatch(TeamArch)]
#[derive(Clone, Debug)]
pub(crate) enum ArchEnum {
    Global(GlobalArch),
    Strided(StridedArch),
    Blocked(BlockedArch),
    Dynamic(Arc<dyn TeamArch>),
}

impl ArchEnum {
    pub(crate) fn new<A>(arch: A) -> ArchEnum
    where
        A: TeamArch + 'static,
    {
        assert!(arch.num_pes() > 0);
        let any_arch = &arch as &dyn std::any::Any;
        if let Some(strided) = any_arch.downcast_ref::<StridedArch>() {
            (*strided).into()
        } else if let Some(blocked) = any_arch.downcast_ref::<BlockedArch>() {
            (*blocked).into()
        } else if let Some(global) = any_arch.downcast_ref::<GlobalArch>() {
            (*global).into()
        } else {
            ArchEnum::Dynamic(Arc::new(arch))
        }
    }
}

// user defined layouts
impl TeamArch for Arc<dyn TeamArch> {
    fn num_pes(&self) -> usize {
        (**self).num_pes()
    }
    fn start_pe(&self) -> usize {
        (**self).start_pe()
    }
    fn end_pe(&self) -> usize {
        (**self).end_pe()
    }
    fn parent_pe_id(&self, team_pe: &usize) -> ArchResult<usize> {
        (**self).parent_pe_id(team_pe)
    }
    fn team_pe_id(&self, parent_pe: &usize) -> ArchResult<usize> {
        (**self).team_pe_id(parent_pe)
    }
}

/// A team layout resolved all the way down to world pe ids.
#[derive(Debug, Clone)]
pub(crate) struct ArchRT {
    pub(crate) parent: Option<Arc<ArchRT>>,
    pub(crate) arch: ArchEnum,
    pub(crate) num_pes: usize,
}

impl ArchRT {
    pub(crate) fn world(num_pes: usize) -> ArchRT {
        ArchRT {
            parent: None,
            arch: ArchEnum::Global(GlobalArch::new(num_pes)),
            num_pes,
        }
    }

    pub(crate) fn new<A>(parent: Arc<ArchRT>, arch: A) -> ArchRT
    where
        A: TeamArch + 'static,
    {
        assert!(
            arch.num_pes() <= parent.num_pes(),
            "cannot have more pes in subteam than parent"
        );

        // start and end are parent team ids, which run from 0
        let last = parent.num_pes() - 1;
        assert!(
            arch.start_pe() <= last && arch.end_pe() <= last,
            "subteam PEs must be subset of parent PEs"
        );

        ArchRT {
            parent: Some(parent),
            num_pes: arch.num_pes(),
            arch: ArchEnum::new(arch),
        }
    }

    pub(crate) fn num_pes(&self) -> usize {
        self.num_pes
    }

    pub(crate) fn world_pe(&self, team_pe: usize) -> ArchResult<usize> {
        let parent_pe = self.arch.parent_pe_id(&team_pe)?;
        match &self.parent {
            Some(parent) => parent.world_pe(parent_pe),
            None => Ok(parent_pe),
        }
    }

    pub(crate) fn team_pe(&self, world_pe: usize) -> ArchResult<usize> {
        match &self.parent {
            Some(parent) => {
                let parent_pe = parent.team_pe(world_pe)?;
                self.arch.team_pe_id(&parent_pe)
            }
            None => self.arch.team_pe_id(&world_pe),
        }
    }

    /// iterator over the world pe ids of this team, in team order
    pub(crate) fn team_iter(&self) -> TeamPeIter {
        TeamPeIter {
            arch: self.clone(),
            cur_pe: 0,
        }
    }
}

pub(crate) struct TeamPeIter {
    arch: ArchRT,
    cur_pe: usize, //pe in team based ids
}

impl Iterator for TeamPeIter {
    type Item = usize;
    fn next(&mut self) -> Option<usize> {
        if self.cur_pe >= self.arch.num_pes() {
            return None;
        }
        let pe = self.arch.world_pe(self.cur_pe).ok();
        self.cur_pe += 1;
        pe
    }
}

/// The layout of the world team: every pe, in rank order.
#[derive(Copy, Clone, std::hash::Hash, Debug)]
pub struct GlobalArch {
    pub(crate) num_pes: usize,
}

impl GlobalArch {
    pub fn new(num_pes: usize) -> GlobalArch {
        GlobalArch { num_pes }
    }
}

impl TeamArch for GlobalArch {
    fn num_pes(&self) -> usize {
        self.num_pes
    }
    fn start_pe(&self) -> usize {
        0
    }
    fn end_pe(&self) -> usize {
        self.num_pes - 1
    }
    fn parent_pe_id(&self, team_pe: &usize) -> ArchResult<usize> {
        if *team_pe < self.num_pes {
            Ok(*team_pe)
        } else {
            Err(IdError {
                parent_pe: *team_pe,
                team_pe: *team_pe,
            })
        }
    }
    fn team_pe_id(&self, parent_pe: &usize) -> ArchResult<usize> {
        self.parent_pe_id(parent_pe)
    }
}

/// A grouping of PEs using a "strided" pattern, e.g. one column of a process grid.
///
/// # Examples
///
///```
/// use gridmm::StridedArch;
///
/// // column 1 of a 4x4 grid => pes 1,5,9,13
/// let col = StridedArch::new(1, 4, 4);
///```
#[derive(Copy, Clone, std::hash::Hash, Debug)]
pub struct StridedArch {
    pub(crate) num_pes: usize,
    pub(crate) start_pe: usize, //this is with respect to the parent arch
    pub(crate) end_pe: usize,   //this is with respect to the parent arch
    pub(crate) stride: usize,   //this is with respect to the parent arch
}

impl StridedArch {
    /// Construct a new StridedArch from a starting PE, the stride length, and the number of PEs in the team
    pub fn new(start_pe: usize, stride: usize, num_team_pes: usize) -> StridedArch {
        assert!(stride > 0, "stride must be positive");
        StridedArch {
            num_pes: num_team_pes,
            start_pe,
            end_pe: start_pe + num_team_pes.saturating_sub(1) * stride,
            stride,
        }
    }
}

impl TeamArch for StridedArch {
    fn num_pes(&self) -> usize {
        self.num_pes
    }
    fn start_pe(&self) -> usize {
        self.start_pe
    }
    fn end_pe(&self) -> usize {
        self.end_pe
    }
    fn parent_pe_id(&self, team_pe: &usize) -> ArchResult<usize> {
        let parent_pe = self.start_pe + team_pe * self.stride;
        if *team_pe < self.num_pes {
            Ok(parent_pe)
        } else {
            Err(IdError {
                parent_pe,
                team_pe: *team_pe,
            })
        }
    }
    fn team_pe_id(&self, parent_pe: &usize) -> ArchResult<usize> {
        if *parent_pe >= self.start_pe
            && *parent_pe <= self.end_pe
            && (parent_pe - self.start_pe) % self.stride == 0
        {
            Ok((parent_pe - self.start_pe) / self.stride)
        } else {
            Err(IdError {
                parent_pe: *parent_pe,
                team_pe: 0,
            })
        }
    }
}

/// A grouping of contiguous PEs, e.g. one row of a process grid.
///
/// # Examples
///
///```
/// use gridmm::BlockedArch;
///
/// // row 2 of a 3x3 grid => pes 6,7,8
/// let row = BlockedArch::new(6, 3);
///```
#[derive(Copy, Clone, std::hash::Hash, Debug)]
pub struct BlockedArch {
    pub(crate) num_pes: usize,
    pub(crate) start_pe: usize, //this is with respect to the parent arch (inclusive)
    pub(crate) end_pe: usize,   //this is with respect to the parent arch (inclusive)
}

impl BlockedArch {
    /// Construct a new BlockedArch from a starting PE and the number of PEs in the team
    pub fn new(start_pe: usize, num_team_pes: usize) -> BlockedArch {
        BlockedArch {
            num_pes: num_team_pes,
            start_pe,
            end_pe: start_pe + num_team_pes.saturating_sub(1),
        }
    }
}

impl TeamArch for BlockedArch {
    fn num_pes(&self) -> usize {
        self.num_pes
    }
    fn start_pe(&self) -> usize {
        self.start_pe
    }
    fn end_pe(&self) -> usize {
        self.end_pe
    }
    fn parent_pe_id(&self, team_pe: &usize) -> ArchResult<usize> {
        if *team_pe < self.num_pes {
            Ok(self.start_pe + team_pe)
        } else {
            Err(IdError {
                parent_pe: self.start_pe + team_pe,
                team_pe: *team_pe,
            })
        }
    }
    fn team_pe_id(&self, parent_pe: &usize) -> ArchResult<usize> {
        if *parent_pe >= self.start_pe && *parent_pe <= self.end_pe {
            Ok(parent_pe - self.start_pe)
        } else {
            Err(IdError {
                parent_pe: *parent_pe,
                team_pe: 0,
            })
        }
    }
}
