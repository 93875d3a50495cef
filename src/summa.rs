use crate::error::{alloc_zeroed, GridResult};
use crate::kernel::mat_mat_mult_local;
use crate::matrix::DistMat;

/// SUMMA: in step `k` the A block of grid column `k` is broadcast along
/// every grid row and the B block of grid row `k` along every grid column,
/// then each pe accumulates their product into its C block.
///
/// Operands are checked by [crate::mat_mat_mult].
pub(crate) fn summa(a: &DistMat, b: &DistMat, c: &mut DistMat) -> GridResult<()> {
    let teams = a.team().grid_teams()?;
    let grid = teams.grid;
    let n = a.local_n();
    let mut a_k = alloc_zeroed("SUMMA A panel", n * n)?;
    let mut b_k = alloc_zeroed("SUMMA B panel", n * n)?;

    for k in 0..grid.np() {
        if grid.col() == k {
            a_k.copy_from_slice(a.local());
        }
        teams.row.broadcast(&mut a_k, k)?;
        if grid.row() == k {
            b_k.copy_from_slice(b.local());
        }
        teams.col.broadcast(&mut b_k, k)?;
        // the broadcasts are blocking, both panels are complete here and
        // are not overwritten before the next step's broadcasts
        mat_mat_mult_local(n, &a_k, &b_k, c.local_mut());
        tracing::trace!("[{}] SUMMA step {} done", a.team().world_pe(), k);
    }
    Ok(())
}
