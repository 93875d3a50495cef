//! gridmm multiplies dense matrices and vectors that are distributed over a square
//! grid of processing elements (pes).
//!
//! A world of `P = np * np` pes is launched with [GridWorldBuilder]. Every pe owns one
//! `n x n` block of each [DistMat] (`n = N / np`) and one contiguous `N / P` slice of
//! each [DistVec]. Pes share no memory; they only exchange messages through a
//! [GridTeam], either the world team or the row and column teams of the process grid.
//!
//! Two algorithms are provided for `C <- A B + C`:
//! - SUMMA, which broadcasts one block column of A along the grid rows and one block
//!   row of B along the grid columns per step
//! - Cannon's algorithm, which skews A and B once and then shifts them between
//!   nearest neighbours of the (periodic) grid
//!
//! and one for `y <- A x` ([mat_mult]).
//!
//! Pes communicate through a comm backend: [Backend::Local] for a single pe, or
//! [Backend::Threads] which runs every pe on its own thread and passes serialized
//! messages between them.
//!
//! EXAMPLES
//! --------
//!
//! # Checking SUMMA on a 2 x 2 grid
//! ```
//! use gridmm::{check, Backend, GridWorldBuilder, MatMultType};
//!
//! fn main() {
//!     let passed = GridWorldBuilder::new()
//!         .with_backend(Backend::Threads)
//!         .with_num_pes(4)
//!         .launch(|world| {
//!             let team = world.team();
//!             let passed = check::check_mat_mat_mult(&team, 8, MatMultType::Summa)?;
//!             check::all_passed(&team, passed)
//!         })
//!         .unwrap();
//!     assert!(passed.iter().all(|p| *p));
//! }
//! ```
//!
//! # Building operands by hand
//! ```
//! use gridmm::{mat_mat_mult, DistMat, GridWorldBuilder, MatMultType};
//!
//! fn main() {
//!     GridWorldBuilder::new()
//!         .with_num_pes(9)
//!         .launch(|world| {
//!             let team = world.team();
//!             let mut a = DistMat::new(&team, 6)?;
//!             let mut b = DistMat::new(&team, 6)?;
//!             let mut c = DistMat::new(&team, 6)?;
//!             a.fill(1.0);
//!             b.fill(2.0);
//!             mat_mat_mult(&a, &b, &mut c, MatMultType::Cannon)?;
//!             c.view(&mut std::io::stdout())
//!         })
//!         .unwrap();
//! }
//! ```

mod barrier;
pub mod bench;
mod cannon;
pub mod check;
mod comm;
mod env_var;
mod error;
mod grid_arch;
mod kernel;
mod matrix;
mod mult;
mod process_grid;
mod summa;
mod team;
mod utils;
mod vector;
mod world;

pub use crate::comm::{Backend, Dist};
pub use crate::env_var::{config, Config};
pub use crate::error::{
    CommError, CommResult, GridError, GridResult, ERR_ARG, ERR_COMM, ERR_IO, ERR_NO_MEM,
};
pub use crate::grid_arch::{BlockedArch, GlobalArch, IdError, StridedArch, TeamArch};
pub use crate::kernel::{mat_mat_mult_local, mat_mult_local};
pub use crate::matrix::DistMat;
pub use crate::mult::{mat_mat_mult, mat_mult, MatMultType};
pub use crate::process_grid::{grid_coords, grid_rank, isqrt, ProcessGrid};
pub use crate::team::{
    GatherTarget, GridTeam, GridTeams, ReduceOp, Reducible, StridedLayout,
};
pub use crate::utils::format_g;
pub use crate::vector::DistVec;
pub use crate::world::{GridWorld, GridWorldBuilder};
