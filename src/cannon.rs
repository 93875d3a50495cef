use crate::error::{alloc_zeroed, GridResult};
use crate::kernel::mat_mat_mult_local;
use crate::matrix::DistMat;

/// Cannon's algorithm on private copies of the A and B blocks.
///
/// The A block of grid row `i` is skewed `i` places left and the B block of
/// grid column `j` is skewed `j` places up, after which pe `(i, j)` holds
/// `A(i, i+j)` and `B(i+j, j)`. Each of the `np` steps multiplies the held
/// pair into C and then shifts A one place left and B one place up, all
/// positions wrapping around.
///
/// Operands are checked by [crate::mat_mat_mult].
pub(crate) fn cannon(a: &DistMat, b: &DistMat, c: &mut DistMat) -> GridResult<()> {
    let teams = a.team().grid_teams()?;
    let grid = teams.grid;
    let np = grid.np();
    let n = a.local_n();
    let mut a_cur = alloc_zeroed("Cannon A block", n * n)?;
    let mut b_cur = alloc_zeroed("Cannon B block", n * n)?;
    a_cur.copy_from_slice(a.local());
    b_cur.copy_from_slice(b.local());

    // a pe's position in its row team is its column, and vice versa
    let (dest, src) = grid.shift_partners(grid.col(), grid.row());
    teams.row.send_recv_replace(&mut a_cur, dest, src)?;
    let (dest, src) = grid.shift_partners(grid.row(), grid.col());
    teams.col.send_recv_replace(&mut b_cur, dest, src)?;
    tracing::trace!("[{}] Cannon skew done", a.team().world_pe());

    let (a_dest, a_src) = grid.shift_partners(grid.col(), 1);
    let (b_dest, b_src) = grid.shift_partners(grid.row(), 1);
    for step in 0..np {
        mat_mat_mult_local(n, &a_cur, &b_cur, c.local_mut());
        if step + 1 < np {
            teams.row.send_recv_replace(&mut a_cur, a_dest, a_src)?;
            teams.col.send_recv_replace(&mut b_cur, b_dest, b_src)?;
        }
        tracing::trace!("[{}] Cannon step {} done", a.team().world_pe(), step);
    }
    Ok(())
}
