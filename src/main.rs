use gridmm::bench::{bench_mat_mat_mult, bench_mat_mult};
use gridmm::check::{all_passed, check_mat_mat_mult, check_mat_mult};
use gridmm::{GridError, GridWorldBuilder, MatMultType};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// check correctness of matrix-vector multiplication
    #[value(name = "CHECK_MAT_MULT")]
    CheckMatMult,
    /// print timing data for matrix-vector multiplication
    #[value(name = "BENCH_MAT_MULT")]
    BenchMatMult,
    /// check correctness of matrix-matrix multiplication
    #[value(name = "CHECK_MAT_MAT_MULT")]
    CheckMatMatMult,
    /// print timing data for matrix-matrix multiplication
    #[value(name = "BENCH_MAT_MAT_MULT")]
    BenchMatMatMult,
}

/// Run benchmarking or checking of matrix-vector or matrix-matrix multiplication.
#[derive(Parser, Debug)]
#[command(name = "gridmm", version)]
struct Options {
    /// Set matrix size
    #[arg(short = 'N', value_parser = parse_size)]
    n: usize,

    /// Select algorithm for matrix-matrix multiplication: CANNON or SUMMA
    #[arg(short = 'a', default_value = "SUMMA")]
    algorithm: MatMultType,

    /// Select execution mode
    #[arg(short = 't', value_enum, default_value_t = Mode::CheckMatMult)]
    mode: Mode,

    /// In benchmarking mode, print timing data to FILE in JSON format.
    /// WARNING: overwrites output file if it exists. Use "-f -" to dump to standard output.
    #[arg(short = 'f', value_name = "FILE")]
    file: Option<String>,

    /// Number of processing elements, must be a perfect square for matrices
    /// [default: GRIDMM_NUM_PES or 1]
    #[arg(long = "num-pes")]
    num_pes: Option<usize>,
}

fn parse_size(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!(
            "Could not interpret matrix size '{}' as positive int.",
            arg
        )),
    }
}

fn report_check(name: &str, passed: &[bool]) {
    if passed.iter().all(|p| *p) {
        eprintln!("{} succeeded.", name);
    } else {
        eprintln!("{} failed.", name);
    }
}

fn run(options: &Options) -> anyhow::Result<()> {
    let mut builder = GridWorldBuilder::new();
    if let Some(num_pes) = options.num_pes {
        builder = builder.with_num_pes(num_pes);
    }
    let n = options.n;
    let algorithm = options.algorithm;
    tracing::debug!("{:?}", options);

    match options.mode {
        Mode::CheckMatMult => {
            let passed = builder.launch(|world| {
                let team = world.team();
                let passed = check_mat_mult(&team, n)?;
                all_passed(&team, passed)
            })?;
            report_check("CheckMatMult", &passed);
        }
        Mode::CheckMatMatMult => {
            let passed = builder.launch(|world| {
                let team = world.team();
                let passed = check_mat_mat_mult(&team, n, algorithm)?;
                all_passed(&team, passed)
            })?;
            report_check("CheckMatMatMult", &passed);
        }
        Mode::BenchMatMult => {
            let records = builder.launch(|world| bench_mat_mult(&world.team(), n))?;
            if let Some(record) = records.first() {
                record
                    .report(options.file.as_deref())
                    .with_context(|| format!("Unable to write timing data for {}", record.test_case))?;
            }
        }
        Mode::BenchMatMatMult => {
            let records =
                builder.launch(|world| bench_mat_mat_mult(&world.team(), n, algorithm))?;
            if let Some(record) = records.first() {
                record
                    .report(options.file.as_deref())
                    .with_context(|| format!("Unable to write timing data for {}", record.test_case))?;
            }
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let options = Options::parse();
    if let Err(err) = run(&options) {
        eprintln!("gridmm: {:#}", err);
        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<GridError>())
            .map(|err| err.code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}
