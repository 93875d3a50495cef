use crate::config;
use crate::error::CommResult;
use crate::team::GridTeam;

/// n-way dissemination barrier built from point to point messages.
///
/// In round `k` every pe signals the pes `j * factor^k` positions ahead of it
/// (for `j` in `1..factor`) and waits for the pes the same distances behind.
/// After `ceil(log_factor(num_pes))` rounds every pe has transitively heard
/// from every other one.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Barrier {
    factor: usize,
}

impl Barrier {
    pub(crate) fn new() -> Barrier {
        Barrier {
            factor: config().barrier_dissemination_factor.max(2),
        }
    }

    pub(crate) fn barrier(&self, team: &GridTeam) -> CommResult<()> {
        let num_pes = team.num_pes();
        if num_pes == 1 {
            return Ok(());
        }
        let my_pe = team.my_pe();
        let seq = team.next_collective();
        let mut dist = 1;
        let mut round = 0;
        while dist < num_pes {
            let partners = (1..self.factor)
                .map(|j| j * dist)
                .take_while(|d| *d < num_pes)
                .collect::<Vec<_>>();
            let tag = GridTeam::collective_tag(seq, round);
            for d in partners.iter() {
                team.send_raw::<u8>((my_pe + d) % num_pes, tag, &[])?;
            }
            for d in partners.iter() {
                team.recv_raw::<u8>((my_pe + num_pes - d) % num_pes, tag, &mut [])?;
            }
            dist *= self.factor;
            round += 1;
        }
        tracing::trace!("[{}] left barrier {}", team.world_pe(), seq);
        Ok(())
    }
}
