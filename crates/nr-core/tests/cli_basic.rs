//! Binary-level CLI tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn needrestart() -> Command {
    Command::cargo_bin("needrestart").expect("binary built")
}

fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[test]
fn help_exits_zero() {
    needrestart()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("-b"))
        .stdout(predicate::str::contains("-p"));
}

#[test]
fn version_exits_zero() {
    needrestart()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_flag_exits_one() {
    needrestart().arg("-Z").assert().code(1);
}

#[test]
fn unreadable_explicit_config_is_fatal() {
    needrestart()
        .args(["-c", "/nonexistent/needrestart.toml", "-l"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot read configuration file"));
}

#[test]
fn unreadable_explicit_config_is_fatal_in_batch_too() {
    needrestart()
        .args(["-c", "/nonexistent/needrestart.toml", "-b", "-l"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot read configuration file"));
}

#[test]
fn kernel_flag_as_non_root_still_checks_libraries() {
    // A non-root -k drops the kernel restriction instead of silencing the
    // run: the library check happens, the kernel records do not.
    if is_root() {
        return;
    }
    needrestart()
        .args(["-b", "-k"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("NEEDRESTART-VER: "))
        .stdout(predicate::str::contains("NEEDRESTART-KSTA").not());
}

#[test]
fn plugin_mode_requires_root() {
    if is_root() {
        // As root the plugin runs for real; the contract is the status
        // line shape and an exit code in the Nagios range.
        let assert = needrestart().arg("-p").assert();
        let output = assert.get_output();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let code = output.status.code().unwrap_or(-1);
        assert!(
            stdout.contains(" - Kernel: "),
            "unexpected plugin line: {}",
            stdout
        );
        assert!((0..=3).contains(&code), "exit code {} out of range", code);
    } else {
        needrestart()
            .arg("-p")
            .assert()
            .code(3)
            .stdout(predicate::str::starts_with("UNKN - needs to be root"));
    }
}

#[test]
fn batch_mode_starts_with_version_record() {
    needrestart()
        .args(["-b", "-l"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("NEEDRESTART-VER: "));
}

#[test]
fn batch_listing_is_idempotent() {
    let run = || {
        let output = needrestart()
            .args(["-b", "-l"])
            .output()
            .expect("run needrestart");
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut svc: Vec<String> = stdout
            .lines()
            .filter(|l| l.starts_with("NEEDRESTART-SVC: "))
            .map(|l| l.to_string())
            .collect();
        svc.sort();
        svc
    };

    assert_eq!(run(), run());
}

#[test]
fn verbose_and_quiet_override_each_other() {
    // Last flag wins; both orders must parse.
    needrestart().args(["-v", "-q", "-b", "-l"]).assert().success();
    needrestart().args(["-q", "-v", "-b", "-l"]).assert().success();
}
