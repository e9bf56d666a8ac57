//! Integration tests for the `compare` command.
use evgrid::cli::{RunOpts, handle_compare_command};
use evgrid::settings::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Write a copy of the simple example's scenario with a different final EV share
fn write_scenario(dir: &Path, name: &str, final_share: f64) -> PathBuf {
    let contents = fs::read_to_string("demos/simple/scenario.toml").unwrap();
    let contents = contents.replace("final_share = 0.5", &format!("final_share = {final_share}"));
    let path = dir.join(format!("{name}.toml"));
    fs::write(&path, contents).unwrap();
    path
}

/// An integration test for the `compare` command.
#[test]
fn test_handle_compare_command() {
    unsafe { std::env::set_var("EVGRID_LOG_LEVEL", "off") };

    let dir = tempdir().unwrap();
    let scenarios = [
        write_scenario(dir.path(), "low", 0.2),
        write_scenario(dir.path(), "high", 0.8),
    ];
    let output_dir = dir.path().join("comparison");
    let opts = RunOpts {
        output_dir: Some(output_dir.clone()),
        overwrite: false,
    };
    handle_compare_command(
        &scenarios,
        Some(Path::new("demos/simple")),
        &opts,
        Some(Settings::default()),
    )
    .unwrap();

    for name in ["low", "high"] {
        assert!(output_dir.join(name).join("load_profile.csv").is_file());
    }

    let mut reader = csv::Reader::from_path(output_dir.join("comparison.csv")).unwrap();
    let rows: Vec<_> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][0], "low");
    assert_eq!(&rows[1][0], "high");

    // More EVs means more charging load
    let ev_served = |row: &csv::StringRecord| row[9].parse::<f64>().unwrap();
    assert!(ev_served(&rows[1]) > ev_served(&rows[0]));
}
