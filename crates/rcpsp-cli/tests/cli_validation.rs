//! Exit code integration tests (S10): argument/config errors exit 1,
//! instance/runtime errors exit 2, success exits 0.

use std::path::PathBuf;
use std::process::Command;

const PSPLIB_MAX_CHAIN: &str = "\
4 1 0 0
0 : 1 1
1 : 1 2
2 : 1 3
3 : 0
0 1 0
1 1 3
2 1 5
3 1 0
1
";

fn rcpsp_tabu_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("target/debug/rcpsp-tabu")
}

fn run(args: &[&str]) -> i32 {
    let status = Command::new(rcpsp_tabu_binary())
        .args(args)
        .status()
        .expect("failed to execute rcpsp-tabu");
    status.code().unwrap_or(-1)
}

#[test]
fn exit_0_on_valid_instance() {
    let dir = tempfile::tempdir().unwrap();
    let instance_path = dir.path().join("chain.sm");
    std::fs::write(&instance_path, PSPLIB_MAX_CHAIN).unwrap();

    let code = run(&[
        "--input-files",
        instance_path.to_str().unwrap(),
        "--number-of-iterations",
        "5",
    ]);
    assert_eq!(code, 0, "a valid instance should solve and exit 0");
}

#[test]
fn exit_2_on_missing_instance_file() {
    let code = run(&["--input-files", "/nonexistent/path/does-not-exist.sm"]);
    assert_eq!(code, 2, "a missing instance file is a runtime error, not an argument error");
}

#[test]
fn exit_2_on_malformed_instance_file() {
    let dir = tempfile::tempdir().unwrap();
    let instance_path = dir.path().join("bad.sm");
    std::fs::write(&instance_path, "not a valid instance file\n").unwrap();

    let code = run(&["--input-files", instance_path.to_str().unwrap()]);
    assert_eq!(code, 2, "malformed instance content should exit 2");
}

#[test]
fn exit_1_on_out_of_range_erase_amount() {
    let dir = tempfile::tempdir().unwrap();
    let instance_path = dir.path().join("chain.sm");
    std::fs::write(&instance_path, PSPLIB_MAX_CHAIN).unwrap();

    let code = run(&[
        "--input-files",
        instance_path.to_str().unwrap(),
        "--randomize-erase-amount",
        "1.5",
    ]);
    assert_eq!(code, 1, "an out-of-range tunable is an argument/config error");
}

#[test]
fn exit_1_on_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let instance_path = dir.path().join("chain.sm");
    std::fs::write(&instance_path, PSPLIB_MAX_CHAIN).unwrap();

    let code = run(&[
        "--input-files",
        instance_path.to_str().unwrap(),
        "--config",
        "/nonexistent/path/config.toml",
    ]);
    assert_eq!(code, 1, "an unreadable config file is an argument/config error");
}

#[test]
fn write_result_file_produces_res_alongside_instance() {
    let dir = tempfile::tempdir().unwrap();
    let instance_path = dir.path().join("chain.sm");
    std::fs::write(&instance_path, PSPLIB_MAX_CHAIN).unwrap();

    let code = run(&[
        "--input-files",
        instance_path.to_str().unwrap(),
        "--number-of-iterations",
        "5",
        "--write-result-file",
    ]);
    assert_eq!(code, 0);
    assert!(dir.path().join("chain.res").exists(), "a .res file should be written next to the instance");
}

#[test]
fn multiple_instances_are_solved_in_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.sm");
    let b = dir.path().join("b.sm");
    std::fs::write(&a, PSPLIB_MAX_CHAIN).unwrap();
    std::fs::write(&b, PSPLIB_MAX_CHAIN).unwrap();

    let code = run(&[
        "--input-files",
        a.to_str().unwrap(),
        b.to_str().unwrap(),
        "--number-of-iterations",
        "5",
    ]);
    assert_eq!(code, 0, "solving multiple instances in one invocation should still exit 0");
}
