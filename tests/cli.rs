use assert_cmd::Command;
use serial_test::serial;

fn gridmm() -> Command {
    let mut cmd = Command::cargo_bin("gridmm").unwrap();
    cmd.env("GRIDMM_BACKEND", "threads");
    cmd
}

macro_rules! create_check_test {
    ( $mode:ident, $alg:ident, $num_pes:expr, $n:expr, $msg:expr ) => {
        paste::paste! {
            #[test]
            #[serial]
            #[allow(non_snake_case)]
            fn [<$mode _ $alg _ $num_pes _ $n>]() {
                let result = gridmm()
                    .arg(format!("--num-pes={}", $num_pes))
                    .arg("-N")
                    .arg(stringify!($n))
                    .arg("-a")
                    .arg(stringify!($alg))
                    .arg("-t")
                    .arg(stringify!($mode))
                    .assert();
                println!("{:?}", result);
                result.success().stderr(format!("{} succeeded.\n", $msg));
            }
        }
    };
}

macro_rules! iter_num_pes {
    ( $mode:ident, $alg:ident, ($($num_pes:expr),*), $n:expr, $msg:expr ) => {
        $( create_check_test!($mode, $alg, $num_pes, $n, $msg); )*
    };
}

macro_rules! create_check_tests {
    ( $mode:ident, ($($alg:ident),*), $num_pes:tt, $n:expr, $msg:expr ) => {
        $( iter_num_pes!($mode, $alg, $num_pes, $n, $msg); )*
    };
}

create_check_tests!(CHECK_MAT_MAT_MULT, (SUMMA, CANNON), (1, 4, 9), 18, "CheckMatMatMult");
create_check_tests!(CHECK_MAT_MULT, (SUMMA), (1, 4, 9), 36, "CheckMatMult");

#[test]
#[serial]
fn default_mode_checks_mat_mult() {
    gridmm()
        .args(["--num-pes", "4", "-N", "8"])
        .assert()
        .success()
        .stderr("CheckMatMult succeeded.\n");
}

#[test]
#[serial]
fn bench_writes_json_to_stdout() {
    let output = gridmm()
        .args(["--num-pes", "4", "-N", "8", "-t", "BENCH_MAT_MAT_MULT", "-a", "CANNON", "-f", "-"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["TestCase"], "MatMatMult[CANNON]");
    assert_eq!(record["nprocs"], 4);
    assert_eq!(record["N"], 8);
    assert!(record["min"].as_f64().unwrap() <= record["max"].as_f64().unwrap());
}

#[test]
#[serial]
fn bench_prints_a_table() {
    let output = gridmm()
        .args(["--num-pes", "4", "-N", "8", "-t", "BENCH_MAT_MULT"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let mut lines = stdout.lines();
    assert_eq!(
        lines.next(),
        Some("Timing data for MatMult on 4 processes, matrix size 8")
    );
    assert_eq!(
        lines.next(),
        Some("All data in seconds. Min, Max, Mean, Standard deviation.")
    );
    assert_eq!(lines.next().map(|l| l.split(' ').count()), Some(4));
}

#[test]
#[serial]
fn bench_saves_to_file() {
    let path = std::env::temp_dir().join(format!("gridmm_bench_{}.json", std::process::id()));
    let path_str = path.to_str().unwrap().to_owned();
    gridmm()
        .args(["-N", "4", "-t", "BENCH_MAT_MAT_MULT", "-f", path_str.as_str()])
        .assert()
        .success()
        .stdout(format!("Timing data saved to {}\n", path_str));
    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(record["TestCase"], "MatMatMult[SUMMA]");
    assert_eq!(record["nprocs"], 1);
    std::fs::remove_file(&path).unwrap();
}

#[test]
#[serial]
fn non_square_grid_fails_with_its_code() {
    gridmm()
        .args(["--num-pes", "3", "-N", "6", "-t", "CHECK_MAT_MAT_MULT"])
        .assert()
        .code(gridmm::ERR_ARG);
}

#[test]
#[serial]
fn bad_options_are_rejected() {
    gridmm().args(["-N", "0"]).assert().failure();
    gridmm().args(["-N", "8", "-a", "STRASSEN"]).assert().failure();
    gridmm().args(["-N", "8", "-t", "CHECK"]).assert().failure();
    gridmm().assert().failure();
}
