use crate::comm::{create_comms, Backend, Comm, CommOps};
use crate::config;
use crate::error::{CommResult, GridError, GridResult, ERR_COMM};
use crate::grid_arch::TeamArch;
use crate::team::GridTeam;

use std::sync::Arc;

/// The handle a single pe gets on the world it runs in.
///
/// A `GridWorld` gives access to the world team, from which the row and
/// column teams of the process grid are split, and to the group abort.
#[derive(Debug, Clone)]
pub struct GridWorld {
    team: Arc<GridTeam>,
    my_pe: usize,
    num_pes: usize,
    backend: Backend,
}

impl GridWorld {
    fn new(comm: Comm) -> GridWorld {
        let my_pe = comm.my_pe();
        let num_pes = comm.num_pes();
        let backend = comm.backend();
        GridWorld {
            team: GridTeam::world(Arc::new(comm)),
            my_pe,
            num_pes,
            backend,
        }
    }

    /// Returns the id of this pe (roughly equivalent to MPI Rank)
    pub fn my_pe(&self) -> usize {
        self.my_pe
    }

    /// Returns the number of pes in this execution
    pub fn num_pes(&self) -> usize {
        self.num_pes
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// The team containing every pe of the world.
    pub fn team(&self) -> Arc<GridTeam> {
        self.team.clone()
    }

    #[tracing::instrument(skip_all)]
    pub fn barrier(&self) -> CommResult<()> {
        self.team.barrier()
    }

    /// Abort the whole group with `code`.
    pub fn abort(&self, code: i32) {
        self.team.abort(code);
    }

    /// create a team containing any number of pe's from the world using the provided TeamArch (layout)
    ///
    /// Returns `None` on pes that are not members of the new team.
    #[tracing::instrument(skip_all)]
    pub fn create_team_from_arch<A>(&self, arch: A) -> Option<Arc<GridTeam>>
    where
        A: TeamArch + 'static,
    {
        self.team.create_subteam_from_arch(arch)
    }

    #[doc(hidden)]
    #[allow(non_snake_case)]
    pub fn MB_sent(&self) -> f64 {
        self.team.bytes_sent() as f64 / 1_000_000.0
    }
}

// raises the group abort if the pe's closure panics, so its peers do not wait forever
struct AbortOnPanic<'a>(&'a GridWorld);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("[{}] panicked, aborting the group", self.0.my_pe());
            self.0.abort(ERR_COMM);
        }
    }
}

/// An implementation of the Builder design pattern, used to launch a group of pes.
///
/// # Examples
///
///```
/// use gridmm::{Backend, GridWorldBuilder};
///
/// let ranks = GridWorldBuilder::new()
///     .with_backend(Backend::Threads)
///     .with_num_pes(4)
///     .launch(|world| Ok(world.my_pe()))
///     .unwrap();
/// assert_eq!(ranks, vec![0, 1, 2, 3]);
///```
#[derive(Debug, Clone)]
pub struct GridWorldBuilder {
    backend: Backend,
    num_pes: usize,
}

impl Default for GridWorldBuilder {
    fn default() -> Self {
        GridWorldBuilder::new()
    }
}

impl GridWorldBuilder {
    /// A builder for the backend and pe count given by the environment.
    pub fn new() -> GridWorldBuilder {
        GridWorldBuilder {
            backend: Default::default(),
            num_pes: config().num_pes,
        }
    }

    /// Specify the comm backend to use for this execution
    pub fn with_backend(mut self, backend: Backend) -> GridWorldBuilder {
        self.backend = backend;
        self
    }

    pub fn with_num_pes(mut self, num_pes: usize) -> GridWorldBuilder {
        self.num_pes = num_pes;
        self
    }

    /// Run `f` once on every pe and collect the results in pe order.
    ///
    /// When `f` fails on some pe, the error is logged with the pe's rank and
    /// the group is aborted with the error's code: every other pe fails its
    /// next (or current) communication call. The error returned is the one
    /// that caused the abort, not the `Aborted` errors it produced elsewhere.
    #[tracing::instrument(skip_all)]
    pub fn launch<R, F>(self, f: F) -> GridResult<Vec<R>>
    where
        R: Send,
        F: Fn(&GridWorld) -> GridResult<R> + Send + Sync,
    {
        let comms = create_comms(self.backend, self.num_pes)?;
        tracing::debug!(
            "launching {} pes on the {:?} backend",
            self.num_pes,
            self.backend
        );
        let f = &f;
        let results = std::thread::scope(|scope| {
            let handles = comms
                .into_iter()
                .map(|comm| scope.spawn(move || run_pe(GridWorld::new(comm), f)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>()
        });

        let mut values = Vec::with_capacity(results.len());
        let mut root_cause: Option<GridError> = None;
        let mut aborted: Option<GridError> = None;
        for result in results {
            match result {
                Ok(Ok(value)) => values.push(value),
                Ok(Err(err)) if err.is_abort() => {
                    aborted.get_or_insert(err);
                }
                Ok(Err(err)) => {
                    root_cause.get_or_insert(err);
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        match root_cause.or(aborted) {
            Some(err) => Err(err),
            None => Ok(values),
        }
    }
}

fn run_pe<R, F>(world: GridWorld, f: &F) -> GridResult<R>
where
    F: Fn(&GridWorld) -> GridResult<R>,
{
    let _guard = AbortOnPanic(&world);
    let res = world
        .barrier()
        .map_err(GridError::from)
        .and_then(|_| f(&world))
        .and_then(|value| {
            world.barrier()?;
            Ok(value)
        });
    if let Err(err) = &res {
        if !err.is_abort() {
            tracing::error!("[{}] {} (code {})", world.my_pe(), err, err.code());
            world.abort(err.code());
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommError, ERR_ARG};

    #[test]
    fn launch_collects_in_pe_order() {
        let res = GridWorldBuilder::new()
            .with_backend(Backend::Threads)
            .with_num_pes(3)
            .launch(|world| Ok((world.my_pe(), world.num_pes())))
            .unwrap();
        assert_eq!(res, vec![(0, 3), (1, 3), (2, 3)]);
    }

    #[test]
    fn local_backend_runs_one_pe() {
        let res = GridWorldBuilder::new()
            .with_backend(Backend::Local)
            .with_num_pes(1)
            .launch(|world| {
                world.barrier()?;
                Ok(world.backend())
            })
            .unwrap();
        assert_eq!(res, vec![Backend::Local]);
        assert!(GridWorldBuilder::new()
            .with_backend(Backend::Local)
            .with_num_pes(2)
            .launch(|_| Ok(()))
            .is_err());
    }

    #[test]
    fn failure_on_one_pe_aborts_the_rest() {
        let res = GridWorldBuilder::new()
            .with_backend(Backend::Threads)
            .with_num_pes(4)
            .launch(|world| {
                if world.my_pe() == 2 {
                    return Err(GridError::NotSquareGrid { num_pes: 3 });
                }
                // would wait forever for pe 2 without the abort
                let mut buf = [0.0f64];
                world.team().recv(2, 1, &mut buf)?;
                Ok(())
            });
        match res {
            Err(err) => {
                assert!(!err.is_abort());
                assert_eq!(err.code(), ERR_ARG);
            }
            Ok(_) => panic!("launch should fail"),
        }
    }

    #[test]
    fn explicit_abort_reports_code() {
        let res = GridWorldBuilder::new()
            .with_backend(Backend::Threads)
            .with_num_pes(2)
            .launch(|world| {
                if world.my_pe() == 0 {
                    world.abort(77);
                }
                world.barrier()?;
                Ok(())
            });
        assert!(matches!(
            res,
            Err(GridError::Comm(CommError::Aborted(77)))
        ));
    }

    #[test]
    fn traffic_is_counted() {
        let sent = GridWorldBuilder::new()
            .with_backend(Backend::Threads)
            .with_num_pes(2)
            .launch(|world| {
                let team = world.team();
                let mut buf = vec![1.0f64; 1000];
                team.broadcast(&mut buf, 0)?;
                Ok(world.MB_sent())
            })
            .unwrap();
        assert!(sent[0] > 0.0);
    }
}
