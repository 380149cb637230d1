use assert_cmd::Command;
use assert_fs::prelude::*;

const PLAN: &str = r#"
rule = "exact"

[[model]]
name = "fiducial"
snapshots = [20, 30]
plot_snapshots = [30]
bins = { low = 0.0, high = 2.0, width = 1.0 }
"#;

fn run_cli(args: &[&str], stdin_data: Option<&str>) -> String {
    let mut cmd = Command::cargo_bin("rsage-stats").expect("cli binary");
    cmd.args(args);
    if let Some(data) = stdin_data {
        cmd.write_stdin(data);
    }
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out)
        .expect("utf8 output")
        .trim()
        .to_string()
}

fn rows(out: &str) -> Vec<Vec<String>> {
    out.lines()
        .map(|l| l.split(',').map(str::to_string).collect())
        .collect()
}

#[test]
fn cli_bins_pairs_from_stdin() {
    let out = run_cli(
        &["bin", "--low", "0", "--high", "10", "--width", "2"],
        Some("1 1\n1,1\n3;2\n-5 7\n"),
    );
    let r = rows(&out);
    assert_eq!(r[0], vec!["center", "count", "mean", "std", "sum"]);
    assert_eq!(r.len(), 6);
    // first bin: two samples of 1.0
    assert_eq!(r[1], vec!["1", "2", "1", "0", "2"]);
    assert_eq!(r[2], vec!["3", "1", "2", "0", "2"]);
    assert_eq!(r[5], vec!["9", "0", "0", "0", "0"]);
}

#[test]
fn cli_reports_dropped_samples_on_stderr() {
    let mut cmd = Command::cargo_bin("rsage-stats").expect("cli binary");
    cmd.args(["bin", "--low", "0", "--high", "10", "--width", "2"])
        .write_stdin("-5 1 15 1");
    let out = cmd.assert().success().get_output().clone();
    let stderr = String::from_utf8(out.stderr).expect("utf8");
    assert!(stderr.contains("dropped 2"), "{stderr}");
}

#[test]
fn cli_rejects_invalid_bins_and_odd_input() {
    Command::cargo_bin("rsage-stats")
        .expect("cli binary")
        .args(["bin", "--low", "1", "--high", "0", "--width", "1"])
        .write_stdin("")
        .assert()
        .failure();
    Command::cargo_bin("rsage-stats")
        .expect("cli binary")
        .args(["bin", "--low", "0", "--high", "1", "--width", "1"])
        .write_stdin("0.5 1 0.5")
        .assert()
        .failure();
}

#[test]
fn cli_reduces_files_across_workers_and_saves_results() {
    let td = assert_fs::TempDir::new().expect("temp dir");
    let plan = td.child("plan.toml");
    plan.write_str(PLAN).expect("write plan");
    let a = td.child("a.txt");
    let b = td.child("b.txt");
    let c = td.child("c.txt");
    a.write_str("# model snapshot x y\nfiducial 30 0.5 1\nfiducial 20 0.5 100\n")
        .expect("write a");
    b.write_str("fiducial 30 0.5 2\nfiducial 30 1.5 10\n")
        .expect("write b");
    c.write_str("fiducial 30 0.5 3\n").expect("write c");
    let saved = td.child("out.bin");

    let out = run_cli(
        &[
            "reduce",
            "--plan",
            plan.path().to_str().expect("plan path"),
            "--workers",
            "2",
            "--save",
            saved.path().to_str().expect("save path"),
            "--input",
            a.path().to_str().expect("a"),
            b.path().to_str().expect("b"),
            c.path().to_str().expect("c"),
        ],
        None,
    );
    let r = rows(&out);
    assert_eq!(r[0], vec!["model", "snapshot", "center", "count", "mean", "std"]);
    // snapshot 30, bin 0 holds {1, 2, 3}
    assert_eq!(r[1][..5], ["fiducial", "30", "0.5", "3", "2"]);
    let std: f64 = r[1][5].parse().expect("std");
    assert!((std - (2.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    assert_eq!(r[2], vec!["fiducial", "30", "1.5", "1", "10", "0"]);
    assert_eq!(r[3], vec!["model", "snapshot", "count", "mean", "std"]);
    assert_eq!(r[4][..4], ["fiducial", "20", "1", "100"]);
    assert_eq!(r[5][..3], ["fiducial", "30", "4"]);

    assert!(saved.path().exists());
    let shown = run_cli(&["show", saved.path().to_str().expect("save path")], None);
    assert_eq!(shown, out);
}

#[test]
fn cli_rule_flag_overrides_the_plan() {
    let td = assert_fs::TempDir::new().expect("temp dir");
    let plan = td.child("plan.toml");
    plan.write_str(PLAN).expect("write plan");
    let a = td.child("a.txt");
    let b = td.child("b.txt");
    a.write_str("fiducial 30 0.5 2\nfiducial 30 0.5 4\n").expect("write a");
    b.write_str("fiducial 30 0.5 6\nfiducial 30 0.5 8\n").expect("write b");

    let run = |rule: &str| {
        let out = run_cli(
            &[
                "reduce",
                "--plan",
                plan.path().to_str().expect("plan path"),
                "--workers",
                "2",
                "--rule",
                rule,
                "--input",
                a.path().to_str().expect("a"),
                b.path().to_str().expect("b"),
            ],
            None,
        );
        rows(&out)[1][5].parse::<f64>().expect("std")
    };
    // each worker sees a pair: only the exact rule keeps the spread behind the zero stds
    assert!((run("exact") - 5.0_f64.sqrt()).abs() < 1e-12);
    assert_eq!(run("within-group"), 0.0);
}

#[test]
fn cli_fails_on_rows_outside_the_plan() {
    let td = assert_fs::TempDir::new().expect("temp dir");
    let plan = td.child("plan.toml");
    plan.write_str(PLAN).expect("write plan");
    let a = td.child("a.txt");
    a.write_str("fiducial 99 0.5 1\n").expect("write a");

    Command::cargo_bin("rsage-stats")
        .expect("cli binary")
        .args([
            "reduce",
            "--plan",
            plan.path().to_str().expect("plan path"),
            "--input",
            a.path().to_str().expect("a"),
        ])
        .assert()
        .failure();
}

#[test]
fn cli_reads_only_files_in_the_plan_range() {
    let td = assert_fs::TempDir::new().expect("temp dir");
    let plan = td.child("plan.toml");
    plan.write_str(
        r#"
[[model]]
name = "fiducial"
snapshots = [30]
first_file = 1
last_file = 2
bins = { low = 0.0, high = 1.0, width = 1.0 }
"#,
    )
    .expect("write plan");
    let inputs: Vec<_> = [1.0, 2.0, 4.0, 100.0]
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let f = td.child(format!("f{i}.txt"));
            f.write_str(&format!("fiducial 30 0.5 {y}\n")).expect("write input");
            f
        })
        .collect();
    let paths: Vec<&str> = inputs
        .iter()
        .map(|f| f.path().to_str().expect("input path"))
        .collect();

    for workers in ["1", "2"] {
        let mut args = vec![
            "reduce",
            "--plan",
            plan.path().to_str().expect("plan path"),
            "--workers",
            workers,
            "--input",
        ];
        args.extend(paths.iter().copied());
        let r = rows(&run_cli(&args, None));
        // files 1 and 2 only: {2, 4}
        assert_eq!(r[1][..5], ["fiducial", "30", "0.5", "2", "3"], "workers={workers}");
    }
}
