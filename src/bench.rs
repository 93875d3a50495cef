//! Timing of a single multiply with statistics over all pes.

use crate::error::GridResult;
use crate::matrix::DistMat;
use crate::mult::{mat_mat_mult, mat_mult, MatMultType};
use crate::team::{GridTeam, ReduceOp};
use crate::utils::format_g;
use crate::vector::DistVec;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

/// Spread of one duration (in seconds) over the pes of a team.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TimingStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// sample standard deviation, 0 on a single pe
    pub std: f64,
}

/// One benchmark result as written to the JSON output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimingRecord {
    #[serde(rename = "TestCase")]
    pub test_case: String,
    pub nprocs: usize,
    #[serde(rename = "N")]
    pub global_n: usize,
    #[serde(flatten)]
    pub stats: TimingStats,
}

impl TimingRecord {
    /// Write the record to `file` as one line of JSON (`-` means stdout,
    /// an existing file is overwritten), or print a table to stdout when
    /// no file is given.
    pub fn report(&self, file: Option<&str>) -> GridResult<()> {
        match file {
            Some("-") => {
                let stdout = std::io::stdout();
                self.write_json(&mut stdout.lock())
            }
            Some(path) => {
                let mut fd = std::fs::File::create(path)?;
                self.write_json(&mut fd)?;
                println!("Timing data saved to {}", path);
                Ok(())
            }
            None => {
                let stdout = std::io::stdout();
                self.write_table(&mut stdout.lock())
            }
        }
    }

    pub fn write_json<W: Write>(&self, dest: &mut W) -> GridResult<()> {
        serde_json::to_writer(&mut *dest, self).map_err(std::io::Error::from)?;
        writeln!(dest)?;
        Ok(())
    }

    pub fn write_table<W: Write>(&self, dest: &mut W) -> GridResult<()> {
        writeln!(
            dest,
            "Timing data for {} on {} processes, matrix size {}",
            self.test_case, self.nprocs, self.global_n
        )?;
        writeln!(dest, "All data in seconds. Min, Max, Mean, Standard deviation.")?;
        writeln!(
            dest,
            "{} {} {} {}",
            format_g(self.stats.min),
            format_g(self.stats.max),
            format_g(self.stats.mean),
            format_g(self.stats.std)
        )?;
        Ok(())
    }
}

/// Reduce the duration measured on every pe of `team`.
pub fn timing_stats(team: &GridTeam, duration: f64) -> GridResult<TimingStats> {
    let size = team.num_pes() as f64;
    let min = team.all_reduce(&[duration], ReduceOp::Min)?[0];
    let max = team.all_reduce(&[duration], ReduceOp::Max)?[0];
    let mean = team.all_reduce(&[duration], ReduceOp::Sum)?[0] / size;
    let sq_dev = team.all_reduce(&[(duration - mean) * (duration - mean)], ReduceOp::Sum)?[0];
    let std = if team.num_pes() > 1 {
        (sq_dev / (size - 1.0)).sqrt()
    } else {
        0.0
    };
    Ok(TimingStats {
        min,
        max,
        mean,
        std,
    })
}

fn seeded_rng(team: &GridTeam) -> StdRng {
    let (size, rank) = (team.num_pes(), team.my_pe());
    StdRng::seed_from_u64((size * rank + rank) as u64)
}

fn randomize(rng: &mut StdRng, data: &mut [f64]) {
    data.iter_mut().for_each(|v| *v = rng.gen::<f64>());
}

/// Time `y <- A x` on random operands of size `global_n`.
#[tracing::instrument(skip_all)]
pub fn bench_mat_mult(team: &Arc<GridTeam>, global_n: usize) -> GridResult<TimingRecord> {
    let mut a = DistMat::new(team, global_n)?;
    let mut x = DistVec::new(team, global_n)?;
    let mut y = DistVec::new(team, global_n)?;
    let mut rng = seeded_rng(team);
    randomize(&mut rng, a.local_mut());
    randomize(&mut rng, x.local_mut());

    let start = Instant::now();
    mat_mult(&a, &x, &mut y)?;
    let duration = start.elapsed().as_secs_f64();
    tracing::debug!("[{}] MatMult took {} s", team.world_pe(), duration);

    Ok(TimingRecord {
        test_case: "MatMult".to_owned(),
        nprocs: team.num_pes(),
        global_n,
        stats: timing_stats(team, duration)?,
    })
}

/// Time `C <- A B + C` with `algorithm` on random operands of size `global_n`.
#[tracing::instrument(skip_all)]
pub fn bench_mat_mat_mult(
    team: &Arc<GridTeam>,
    global_n: usize,
    algorithm: MatMultType,
) -> GridResult<TimingRecord> {
    let mut a = DistMat::new(team, global_n)?;
    let mut b = DistMat::new(team, global_n)?;
    let mut c = DistMat::new(team, global_n)?;
    let mut rng = seeded_rng(team);
    randomize(&mut rng, a.local_mut());
    randomize(&mut rng, b.local_mut());
    randomize(&mut rng, c.local_mut());

    let start = Instant::now();
    mat_mat_mult(&a, &b, &mut c, algorithm)?;
    let duration = start.elapsed().as_secs_f64();
    tracing::debug!(
        "[{}] MatMatMult[{}] took {} s",
        team.world_pe(),
        algorithm,
        duration
    );

    Ok(TimingRecord {
        test_case: format!("MatMatMult[{}]", algorithm),
        nprocs: team.num_pes(),
        global_n,
        stats: timing_stats(team, duration)?,
    })
}
