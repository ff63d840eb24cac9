use assert_cmd::Command;
use predicates::str::{contains, diff};

#[test]
fn runs_without_arguments() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.assert().success();
}

#[test]
fn runs_countdown() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("run").arg("tests/files/countdown.asm").arg("--minimal");

    cmd.assert().success().stdout(diff("3\n2\n1\n"));
}

#[test]
fn runs_path_without_subcommand() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("tests/files/sum.asm");

    cmd.assert()
        .success()
        .stdout(diff("40\n"))
        .stderr(contains("Halted"))
        .stderr(contains("Completed"));
}

#[test]
fn reads_input() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("run")
        .arg("tests/files/double.asm")
        .arg("--minimal")
        .write_stdin("21\n");

    cmd.assert().success().stdout(diff("42\n"));
}

#[test]
fn alerts_on_missing_input() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("run")
        .arg("tests/files/double.asm")
        .arg("--minimal")
        .write_stdin("");

    cmd.assert()
        .success()
        .stdout(diff(""))
        .stderr(contains("Alert: No input available"));
}

#[test]
fn stops_at_step_limit() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("run")
        .arg("tests/files/countdown.asm")
        .arg("--minimal")
        .arg("--max-steps")
        .arg("2");

    cmd.assert().success().stdout(diff("3\n"));
}

#[test]
fn traces_instructions() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("run")
        .arg("tests/files/countdown.asm")
        .env("ISAKIT_TRACE", "1");

    cmd.assert()
        .success()
        .stdout(diff("3\n2\n1\n"))
        .stderr(contains("mov $1, 3"))
        .stderr(contains("flags"));
}

#[test]
fn checks_files() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("check").arg("tests/files/countdown.asm");
    cmd.assert().success().stderr(contains("no errors found!"));

    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("check").arg("tests/files/undefined.asm");
    cmd.assert()
        .failure()
        .stderr(contains("Undefined label `nowhere`"));

    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("check").arg("tests/files/duplicate.asm");
    cmd.assert()
        .failure()
        .stderr(contains("Line 2: Duplicate label `@x`"));
}

#[test]
fn assembles_and_runs_machine_code() {
    let dest = std::env::temp_dir().join(format!("isakit-countdown-{}.mc", std::process::id()));

    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("assemble").arg("tests/files/countdown.asm").arg(&dest);
    cmd.assert().success();

    let contents = std::fs::read_to_string(&dest).unwrap();
    let first = contents.lines().next().unwrap();
    // mov $1, 3
    assert_eq!(first, "0101000010000000");
    assert!(contents.lines().all(|line| line.len() == 16));

    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("run").arg(&dest).arg("--minimal");
    cmd.assert().success().stdout(diff("3\n2\n1\n"));

    let _ = std::fs::remove_file(dest);
}

#[test]
fn lists_program() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("list").arg("tests/files/countdown.asm");

    cmd.assert()
        .success()
        .stdout(contains("0101000010000000"))
        .stdout(contains("loop: out $1"))
        .stdout(contains("bne 2 # until zero"))
        .stdout(contains("# Count down from 3, printing every value"));
}

#[test]
fn rejects_unknown_extension() {
    let mut cmd = Command::cargo_bin("isakit").unwrap();
    cmd.arg("run").arg("Cargo.toml");
    cmd.assert().failure().stderr(contains("unknown extension"));
}
