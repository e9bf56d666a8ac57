//! Code for reading region-related information from CSV files.
use super::*;
use crate::data::Fleet;
use crate::id::define_id_getter;
use crate::region::RegionID;
use crate::vehicle::VehicleClass;
use serde::Deserialize;

const REGIONS_FILE_NAME: &str = "regions.csv";

/// A row of the regions file
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RegionRow {
    /// A unique identifier for the region
    pub id: RegionID,
    /// A text description of the region
    pub description: String,
    /// Number of light vehicles in the region
    #[serde(deserialize_with = "deserialise_non_negative")]
    pub vehicle_population: f64,
    /// Number of light vehicles which are already electric (optional)
    pub ev_count: Option<f64>,
    /// Number of heavy vehicles in the region (the column may be omitted)
    #[serde(default, deserialize_with = "deserialise_non_negative")]
    pub heavy_vehicle_population: f64,
    /// Number of heavy vehicles which are already electric (optional)
    #[serde(default)]
    pub heavy_ev_count: Option<f64>,
}
define_id_getter! {RegionRow, RegionID}

impl RegionRow {
    /// The region's fleet for each vehicle class it has vehicles of
    pub fn fleets(&self) -> IndexMap<VehicleClass, Fleet> {
        let mut fleets = IndexMap::new();
        fleets.insert(
            VehicleClass::Light,
            Fleet::new(self.vehicle_population, self.ev_count),
        );
        if self.heavy_vehicle_population > 0.0 || self.heavy_ev_count.is_some() {
            fleets.insert(
                VehicleClass::Heavy,
                Fleet::new(self.heavy_vehicle_population, self.heavy_ev_count),
            );
        }

        fleets
    }
}

/// Check that the EV counts, if given, are valid for the region's vehicle populations
fn check_ev_count(row: &RegionRow) -> Result<()> {
    for (class, fleet) in row.fleets() {
        let Some(ev_count) = fleet.ev_count else {
            continue;
        };
        ensure!(
            ev_count.is_finite() && ev_count >= 0.0,
            "{class} EV count for region {} must be a finite number no less than zero",
            row.id
        );
        ensure!(
            ev_count <= fleet.population,
            "{class} EV count for region {} ({ev_count}) exceeds vehicle population ({})",
            row.id,
            fleet.population
        );
    }

    Ok(())
}

/// Reads regions from a CSV file.
///
/// # Arguments
///
/// * `data_dir` - Folder containing baseline data files
///
/// # Returns
///
/// An `IndexMap<RegionID, RegionRow>` with the parsed regions data or an error
pub fn read_regions(data_dir: &Path) -> Result<IndexMap<RegionID, RegionRow>> {
    let file_path = data_dir.join(REGIONS_FILE_NAME);
    let regions: IndexMap<RegionID, RegionRow> = read_csv_id_file(&file_path)?;
    for row in regions.values() {
        check_ev_count(row).with_context(|| input_err_msg(&file_path))?;
    }

    Ok(regions)
}
