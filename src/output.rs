//! The module responsible for writing output data to disk.
use crate::region::RegionID;
use crate::simulation::{RegionSummary, SimulationResult};
use crate::units::Energy;
use anyhow::{Context, Result, ensure};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which scenario-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "evgrid_results";

/// The output file name for the load profile
const LOAD_PROFILE_FILE_NAME: &str = "load_profile.csv";

/// The output file name for per-region summaries
const REGION_SUMMARY_FILE_NAME: &str = "region_summary.csv";

/// The output file name for the validated scenario
const SCENARIO_FILE_NAME: &str = "scenario.toml";

/// The output file name for scenario comparisons
const COMPARISON_FILE_NAME: &str = "comparison.csv";

/// The file stem used for scenario files in bundled examples
const DEFAULT_SCENARIO_STEM: &str = "scenario";

/// Get a name for a scenario from the path to its file.
///
/// This is the file stem, unless the file has the default name (`scenario.toml`), in which case it
/// is the name of the containing folder.
pub fn get_scenario_name(scenario_path: &Path) -> Result<String> {
    let scenario_path = scenario_path
        .canonicalize() // canonicalise in case the user has specified a relative path
        .context("Could not resolve path to scenario")?;

    let stem = scenario_path
        .file_stem()
        .context("Scenario path has no file name")?
        .to_str()
        .context("Invalid chars in scenario file name")?;
    if stem != DEFAULT_SCENARIO_STEM {
        return Ok(stem.to_string());
    }

    let dir_name = scenario_path
        .parent()
        .and_then(Path::file_name)
        .context("Scenario cannot be in root folder")?
        .to_str()
        .context("Invalid chars in scenario dir name")?;
    Ok(dir_name.to_string())
}

/// Get the default output directory for the scenario at the specified path
pub fn get_output_dir(scenario_path: &Path) -> Result<PathBuf> {
    let name = get_scenario_name(scenario_path)?;
    Ok([OUTPUT_DIRECTORY_ROOT, &name].iter().collect())
}

/// Create a new output directory.
///
/// If the directory already exists and isn't empty, it is only replaced if `allow_overwrite` is
/// true.
///
/// # Returns
///
/// True if an existing folder was overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if let Ok(mut it) = fs::read_dir(output_dir) {
        if it.next().is_none() {
            // Folder exists and is empty: nothing to do
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. \
            Please delete the folder or pass the --overwrite command-line option."
        );

        fs::remove_dir_all(output_dir).context("Could not delete folder")?;
        true
    } else {
        false
    };

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Represents a row in the load profile CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct LoadProfileRow {
    region_id: RegionID,
    time: NaiveDateTime,
    baseline: Energy,
    ev_raw: Energy,
    ev_served: Energy,
    deferred_served: Energy,
    unmet: Energy,
    total: Energy,
}

/// Represents a row in the region summary CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct RegionSummaryRow {
    region_id: RegionID,
    peak_baseline: Energy,
    peak_total: Energy,
    peak_increase: Energy,
    peak_time: Option<NaiveDateTime>,
    mean_total: Energy,
    baseline: Energy,
    ev_raw: Energy,
    ev_served: Energy,
    unmet: Energy,
    residual_unmet: Energy,
}

impl From<&RegionSummary> for RegionSummaryRow {
    fn from(summary: &RegionSummary) -> Self {
        Self {
            region_id: summary.region_id.clone(),
            peak_baseline: summary.peak_baseline,
            peak_total: summary.peak_total,
            peak_increase: summary.peak_increase(),
            peak_time: summary.peak_time,
            mean_total: summary.mean_total,
            baseline: summary.baseline,
            ev_raw: summary.ev_raw,
            ev_served: summary.ev_served,
            unmet: summary.unmet,
            residual_unmet: summary.residual_unmet,
        }
    }
}

/// Write the load profile for every region and time step
fn write_load_profile(output_path: &Path, result: &SimulationResult) -> Result<()> {
    let file_path = output_path.join(LOAD_PROFILE_FILE_NAME);
    let mut writer = csv::Writer::from_path(file_path)?;
    for record in result.records() {
        writer.serialize(LoadProfileRow {
            region_id: record.region_id.clone(),
            time: record.time,
            baseline: record.baseline,
            ev_raw: record.ev_raw,
            ev_served: record.ev_served,
            deferred_served: record.deferred_served,
            unmet: record.unmet,
            total: record.total(),
        })?;
    }
    writer.flush()?;

    Ok(())
}

/// Write summary statistics for each region
fn write_region_summary(output_path: &Path, result: &SimulationResult) -> Result<()> {
    let file_path = output_path.join(REGION_SUMMARY_FILE_NAME);
    let mut writer = csv::Writer::from_path(file_path)?;
    for summary in result.summary() {
        writer.serialize(RegionSummaryRow::from(&summary))?;
    }
    writer.flush()?;

    Ok(())
}

/// Write the validated scenario, with all defaults filled in, in TOML format
fn write_scenario(output_path: &Path, result: &SimulationResult) -> Result<()> {
    let file_path = output_path.join(SCENARIO_FILE_NAME);
    let contents = toml::to_string(result.config()).context("Could not serialise scenario")?;
    fs::write(&file_path, contents)?;

    Ok(())
}

/// Write all outputs of a simulation run to the specified folder
pub fn write_results(output_path: &Path, result: &SimulationResult) -> Result<()> {
    write_load_profile(output_path, result).context("Failed to write load profile")?;
    write_region_summary(output_path, result).context("Failed to write region summary")?;
    write_scenario(output_path, result).context("Failed to write scenario")?;

    Ok(())
}

/// Write summary statistics for several scenarios side by side.
///
/// # Arguments
///
/// * `output_path` - Folder in which to write the file
/// * `results` - Scenario names and their simulation results
pub fn write_comparison(output_path: &Path, results: &[(String, SimulationResult)]) -> Result<()> {
    let file_path = output_path.join(COMPARISON_FILE_NAME);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(file_path)?;
    writer.write_record([
        "scenario",
        "region_id",
        "peak_baseline",
        "peak_total",
        "peak_increase",
        "peak_time",
        "mean_total",
        "baseline",
        "ev_raw",
        "ev_served",
        "unmet",
        "residual_unmet",
    ])?;
    for (name, result) in results {
        for summary in result.summary() {
            writer.serialize((name, RegionSummaryRow::from(&summary)))?;
        }
    }
    writer.flush()?;

    Ok(())
}
