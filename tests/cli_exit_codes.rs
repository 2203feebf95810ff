use std::process::Command;

fn exit_code(binary: &str, args: &[&str]) -> Option<i32> {
    Command::new(binary)
        .args(args)
        .env("QUANT_LOG", "off")
        .output()
        .expect("binary runs")
        .status
        .code()
}

#[test]
fn help_and_version() {
    let serial = env!("CARGO_BIN_EXE_quant-serial");
    assert_eq!(exit_code(serial, &["--help"]), Some(2));
    assert_eq!(exit_code(serial, &["--version"]), Some(0));
}

#[test]
fn usage_errors_exit_with_one() {
    let serial = env!("CARGO_BIN_EXE_quant-serial");
    assert_eq!(exit_code(serial, &[]), Some(1));
    assert_eq!(exit_code(serial, &["config.json", "--bogus"]), Some(1));
    let worker = env!("CARGO_BIN_EXE_quant-worker");
    assert_eq!(exit_code(worker, &["0", "config.json"]), Some(1));
    let combine = env!("CARGO_BIN_EXE_quant-combine");
    assert_eq!(exit_code(combine, &["two", "config.json"]), Some(1));
}

#[test]
fn pipeline_failures_exit_with_three() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("missing.json");
    let missing = missing.to_str().expect("utf-8 path");
    let calibrate = env!("CARGO_BIN_EXE_quant-calibrate");
    assert_eq!(exit_code(calibrate, &[missing]), Some(3));

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{ not json").expect("writes");
    let summarize = env!("CARGO_BIN_EXE_quant-summarize");
    assert_eq!(
        exit_code(summarize, &[broken.to_str().expect("utf-8 path")]),
        Some(3)
    );
}
