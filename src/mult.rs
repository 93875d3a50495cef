use crate::cannon::cannon;
use crate::error::{alloc_zeroed, GridError, GridResult};
use crate::kernel::mat_mult_local;
use crate::matrix::DistMat;
use crate::summa::summa;
use crate::team::ReduceOp;
use crate::vector::DistVec;

/// The distributed matrix-matrix algorithms.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum MatMultType {
    /// broadcast the k-th block column of A and block row of B in step k
    #[default]
    Summa,
    /// skew once, then shift A left and B up after every step
    Cannon,
}

impl MatMultType {
    pub fn name(&self) -> &'static str {
        match self {
            MatMultType::Summa => "SUMMA",
            MatMultType::Cannon => "CANNON",
        }
    }
}

impl std::fmt::Display for MatMultType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for MatMultType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUMMA" => Ok(MatMultType::Summa),
            "CANNON" => Ok(MatMultType::Cannon),
            _ => Err(format!(
                "unknown algorithm '{}', expected SUMMA or CANNON",
                s
            )),
        }
    }
}

/// `y <- A x`.
///
/// `x` and `y` are ordinary distributed vectors (pe `r` holds the `r`-th of
/// `num_pes` blocks) over the same team as `A`.
///
/// 1. the pes of grid row `i` hold exactly block `i` of x, one all-gather
///    along the row assembles it
/// 2. pe `(i, j)` needs block `j`, broadcast down column `j` from the
///    diagonal pe `(j, j)`
/// 3. local product with the `n x n` block
/// 4. the partial products of row `i` are summed and scattered along the
///    row, so pe `(i, j)` receives its own slice of y
#[tracing::instrument(skip_all)]
pub fn mat_mult(a: &DistMat, x: &DistVec, y: &mut DistVec) -> GridResult<()> {
    if !a.team().same_team(x.team()) || !a.team().same_team(y.team()) {
        return Err(GridError::TeamMismatch { op: "MatMult" });
    }
    let np = a.np();
    let n = a.local_n();
    if a.global_n() != x.global_len()
        || a.global_n() != y.global_len()
        || x.local_len() * np != n
        || x.local_len() != y.local_len()
    {
        return Err(GridError::MatMultSizeMismatch {
            matrix: a.global_n(),
            x: x.global_len(),
            y: y.global_len(),
            matrix_local: n,
            np,
            x_local: x.local_len(),
            y_local: y.local_len(),
        });
    }
    let teams = a.team().grid_teams()?;
    let grid = a.grid();

    let mut x_block = teams.row.all_gather(x.local())?;
    teams.col.broadcast(&mut x_block, grid.col())?;
    tracing::trace!(
        "[{}] MatMult: x block {} assembled",
        a.team().world_pe(),
        grid.col()
    );

    let mut partial = alloc_zeroed("MatMult partial product", n)?;
    mat_mult_local(n, a.local(), &x_block, &mut partial);

    let y_part = teams.row.reduce_scatter_block(&partial, ReduceOp::Sum)?;
    y.local_mut().copy_from_slice(&y_part);
    Ok(())
}

/// `C <- A B + C` with the chosen algorithm.
///
/// All three matrices must be distributed identically over the same team.
/// C is accumulated into, so repeating the call without re-zeroing C adds
/// the product again.
#[tracing::instrument(skip_all)]
pub fn mat_mat_mult(
    a: &DistMat,
    b: &DistMat,
    c: &mut DistMat,
    algorithm: MatMultType,
) -> GridResult<()> {
    if !a.team().same_team(b.team()) || !a.team().same_team(c.team()) {
        return Err(GridError::TeamMismatch { op: "MatMatMult" });
    }
    if a.local_n() != b.local_n()
        || a.local_n() != c.local_n()
        || a.global_n() != b.global_n()
        || a.global_n() != c.global_n()
    {
        return Err(GridError::MatMatMultSizeMismatch {
            global: [a.global_n(), b.global_n(), c.global_n()],
            local: [a.local_n(), b.local_n(), c.local_n()],
        });
    }
    tracing::debug!(
        "[{}] MatMatMult[{}] N={} n={}",
        a.team().world_pe(),
        algorithm,
        a.global_n(),
        a.local_n()
    );
    match algorithm {
        MatMultType::Summa => summa(a, b, c),
        MatMultType::Cannon => cannon(a, b, c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_parse() {
        assert_eq!("SUMMA".parse::<MatMultType>(), Ok(MatMultType::Summa));
        assert_eq!("cannon".parse::<MatMultType>(), Ok(MatMultType::Cannon));
        assert!("strassen".parse::<MatMultType>().is_err());
        assert_eq!(MatMultType::default(), MatMultType::Summa);
        assert_eq!(MatMultType::Cannon.to_string(), "CANNON");
    }
}
