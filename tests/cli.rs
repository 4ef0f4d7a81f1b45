use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::{tempdir, TempDir};

fn build_asset_dir() -> TempDir {
    let dir = tempdir().expect("temp dir");
    let assets = dir.path().join("assets");
    fs::create_dir_all(assets.join("sub")).expect("asset dirs");
    fs::write(assets.join("a.txt"), vec![b'a'; 100]).expect("write a");
    fs::write(assets.join("sub").join("b.bin"), vec![0xb2; 5000]).expect("write b");
    fs::write(assets.join("c.dat"), b"").expect("write c");
    dir
}

fn crystal_pak() -> Command {
    Command::cargo_bin("crystal-pak").expect("binary exists")
}

fn build(dir: &Path, extra: &[&str]) {
    crystal_pak()
        .arg("build")
        .arg(dir.join("assets"))
        .arg(dir.join("out.pak"))
        .args(extra)
        .assert()
        .success()
        .stdout(contains("Packed 3 assets"));
}

#[test]
fn cli_builds_lists_and_verifies_an_ordinal_package() {
    let dir = build_asset_dir();
    build(dir.path(), &[]);
    assert!(dir.path().join("out.pak.manifest.json").exists());

    crystal_pak()
        .arg("list")
        .arg(dir.path().join("out.pak"))
        .assert()
        .success()
        .stdout(contains("ordinal package: 3 entries"))
        .stdout(contains(" - 0 block 1 size 100 a.txt"))
        .stdout(contains("sub/b.bin"));

    crystal_pak()
        .arg("verify")
        .arg(dir.path().join("out.pak"))
        .assert()
        .success()
        .stdout(contains("OK:"));
}

#[test]
fn cli_extracts_from_a_hashed_package_by_path() {
    let dir = build_asset_dir();
    build(dir.path(), &["--hashed", "--session", "0xc0ffee"]);

    crystal_pak()
        .arg("list")
        .arg(dir.path().join("out.pak"))
        .assert()
        .success()
        .stdout(contains("hashed package: 3 entries"))
        .stdout(contains("session 0x00c0ffee"));

    let out = dir.path().join("b.out");
    crystal_pak()
        .arg("extract")
        .arg(dir.path().join("out.pak"))
        .arg("sub/b.bin")
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("Extracted 5000 bytes"));
    assert_eq!(fs::read(&out).expect("extracted file"), vec![0xb2; 5000]);
}

#[test]
fn cli_reports_corrupt_packages() {
    let dir = build_asset_dir();
    build(dir.path(), &[]);
    let pak = dir.path().join("out.pak");
    let mut bytes = fs::read(&pak).expect("read package");
    bytes[2048 + 10] ^= 0xff;
    fs::write(&pak, bytes).expect("rewrite package");

    crystal_pak()
        .arg("verify")
        .arg(&pak)
        .assert()
        .failure()
        .stderr(contains("CRC-32 mismatch"));
}

#[test]
fn cli_rejects_unknown_commands() {
    crystal_pak()
        .arg("explode")
        .assert()
        .failure()
        .stderr(contains("Usage:"));
}
