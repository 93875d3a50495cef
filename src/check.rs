//! Correctness checks with closed-form expected results.
//!
//! The operands are seeded with rank dependent constants so that every
//! entry of the product can be written down without forming it.

use crate::error::GridResult;
use crate::matrix::DistMat;
use crate::mult::{mat_mat_mult, mat_mult, MatMultType};
use crate::team::{GridTeam, ReduceOp};
use crate::utils::format_g;
use crate::vector::DistVec;

use std::sync::Arc;

/// Largest absolute deviation accepted by the checks.
pub const CHECK_TOLERANCE: f64 = 1e-10;

/// Expected entry of `y = A x` on `rank` when A holds `rank + 1` and x
/// holds `size - rank` everywhere.
pub fn expected_mat_mult(size: usize, np: usize, rank: usize, x_local: usize) -> f64 {
    let row = rank / np;
    let sum: usize = (0..size).map(|i| (size - i) * (i / np + 1 + row * np)).sum();
    (sum * x_local) as f64
}

/// Expected entry of `C = A B + C` on `rank` when A holds `rank + 1`,
/// B holds `size - rank` and C holds `size * rank + rank`.
pub fn expected_mat_mat_mult(size: usize, np: usize, rank: usize, local_n: usize) -> f64 {
    let (row, col) = (rank / np, rank % np);
    let sum: usize = (0..np)
        .map(|i| (i + 1 + row * np) * (size - i * np - col))
        .sum();
    (sum * local_n + size * rank + rank) as f64
}

/// Seed `a` and `x`, run [mat_mult] and compare the local part of `y`.
///
/// Returns whether every local entry matched.
pub fn check_mat_mult_with(a: &mut DistMat, x: &mut DistVec, y: &mut DistVec) -> GridResult<bool> {
    let rank = a.team().my_pe();
    let size = a.team().num_pes();
    a.fill((rank + 1) as f64);
    x.fill((size - rank) as f64);
    mat_mult(a, x, y)?;

    let expect = expected_mat_mult(size, a.np(), rank, x.local_len());
    let mut passed = true;
    for (i, got) in y.local().iter().enumerate() {
        if (got - expect).abs() > CHECK_TOLERANCE {
            tracing::error!(
                "[{}] CheckMatMult failed at local index {}, expected {} got {}",
                rank,
                i,
                format_g(expect),
                format_g(*got)
            );
            passed = false;
        }
    }
    Ok(passed)
}

/// Seed `a`, `b` and `c`, run [mat_mat_mult] and compare the local block of `c`.
pub fn check_mat_mat_mult_with(
    a: &mut DistMat,
    b: &mut DistMat,
    c: &mut DistMat,
    algorithm: MatMultType,
) -> GridResult<bool> {
    let rank = a.team().my_pe();
    let size = a.team().num_pes();
    a.fill((rank + 1) as f64);
    b.fill((size - rank) as f64);
    c.fill((size * rank + rank) as f64);
    mat_mat_mult(a, b, c, algorithm)?;

    let n = c.local_n();
    let expect = expected_mat_mat_mult(size, a.np(), rank, n);
    let mut passed = true;
    for (idx, got) in c.local().iter().enumerate() {
        if (got - expect).abs() > CHECK_TOLERANCE {
            tracing::error!(
                "[{}] CheckMatMatMult failed at local index ({}, {}), expected {} got {}",
                rank,
                idx / n,
                idx % n,
                format_g(expect),
                format_g(*got)
            );
            passed = false;
        }
    }
    Ok(passed)
}

/// Create the operands of size `global_n` on `team` and check MatMult.
#[tracing::instrument(skip_all)]
pub fn check_mat_mult(team: &Arc<GridTeam>, global_n: usize) -> GridResult<bool> {
    let mut a = DistMat::new(team, global_n)?;
    let mut x = DistVec::new(team, global_n)?;
    let mut y = DistVec::new(team, global_n)?;
    check_mat_mult_with(&mut a, &mut x, &mut y)
}

/// Create the operands of size `global_n` on `team` and check MatMatMult.
#[tracing::instrument(skip_all)]
pub fn check_mat_mat_mult(
    team: &Arc<GridTeam>,
    global_n: usize,
    algorithm: MatMultType,
) -> GridResult<bool> {
    let mut a = DistMat::new(team, global_n)?;
    let mut b = DistMat::new(team, global_n)?;
    let mut c = DistMat::new(team, global_n)?;
    check_mat_mat_mult_with(&mut a, &mut b, &mut c, algorithm)
}

/// Combine the per pe outcomes: the check passed only if it passed everywhere.
pub fn all_passed(team: &GridTeam, passed: bool) -> GridResult<bool> {
    let failed = team.all_reduce(&[u8::from(!passed)], ReduceOp::Max)?;
    Ok(failed[0] == 0)
}
