//! End-to-end tests for the fwswapctl binary.

use assert_cmd::Command;
use predicates::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn fwswapctl() -> Result<Command, Box<dyn std::error::Error>> {
    Ok(Command::cargo_bin("fwswapctl")?)
}

#[test]
fn create_then_dump_round_trips() -> TestResult {
    let dir = tempfile::tempdir()?;
    let part = dir.path().join("zImage");
    std::fs::write(&part, b"pretend kernel contents")?;
    let image = dir.path().join("fw.img");

    fwswapctl()?
        .args(["create", "-o"])
        .arg(&image)
        .args(["-i", "0x2424", "-p"])
        .arg(format!("kernel:{}", part.display()))
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"));

    fwswapctl()?
        .arg("dump")
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("HWID    : 0x2424"))
        .stdout(predicate::str::contains("name=kernel"))
        .stdout(predicate::str::contains("size=23"));
    Ok(())
}

#[test]
fn dump_json_is_machine_readable() -> TestResult {
    let dir = tempfile::tempdir()?;
    let part = dir.path().join("rootfs.ubi");
    std::fs::write(&part, b"rootfs bytes")?;
    let image = dir.path().join("fw.img");

    fwswapctl()?
        .args(["create", "-o"])
        .arg(&image)
        .args(["-i", "beef", "-p"])
        .arg(format!("rootfs:{}", part.display()))
        .assert()
        .success();

    let output = fwswapctl()?.args(["--json", "dump"]).arg(&image).output()?;
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["hwid"], "0xbeef");
    assert_eq!(summary["parts"][0]["name"], "rootfs");
    assert_eq!(summary["parts"][0]["size"], 12);
    Ok(())
}

#[test]
fn dump_rejects_truncated_image_with_image_exit_code() -> TestResult {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("short.img");
    std::fs::write(&image, b"xyz")?;

    fwswapctl()?
        .arg("dump")
        .arg(&image)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error"));
    Ok(())
}

#[test]
fn apply_with_missing_config_uses_config_exit_code() -> TestResult {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("fw.img");
    std::fs::write(&image, b"never parsed")?;

    fwswapctl()?
        .arg("apply")
        .arg(&image)
        .arg("--config")
        .arg(dir.path().join("no-such.conf"))
        .assert()
        .code(4);
    Ok(())
}

#[test]
fn create_rejects_malformed_part_spec() -> TestResult {
    let dir = tempfile::tempdir()?;

    fwswapctl()?
        .args(["create", "-o"])
        .arg(dir.path().join("out.img"))
        .args(["-i", "2424", "-p", "no-colon-here"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("name:file"));
    Ok(())
}

#[test]
fn create_requires_at_least_one_part() -> TestResult {
    let dir = tempfile::tempdir()?;

    fwswapctl()?
        .args(["create", "-o"])
        .arg(dir.path().join("out.img"))
        .args(["-i", "2424"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--part"));
    Ok(())
}
