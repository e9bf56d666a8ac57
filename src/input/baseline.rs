//! Code for reading baseline demand and vehicle population time series from CSV files.
use super::*;
use crate::id::IDCollection;
use crate::region::RegionID;
use crate::units::Energy;
use crate::vehicle::VehicleClass;
use anyhow::bail;
use chrono::NaiveDateTime;
use indexmap::IndexSet;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use strum::IntoEnumIterator;

const BASELINE_DEMAND_FILE_NAME: &str = "baseline_demand.csv";
const VEHICLE_POPULATION_FILE_NAME: &str = "vehicle_population.csv";

/// A time series for each region
pub type RegionSeriesMap<T> = IndexMap<RegionID, BTreeMap<NaiveDateTime, T>>;

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct BaselineDemandRaw {
    region_id: String,
    time: NaiveDateTime,
    #[serde(deserialize_with = "deserialise_non_negative")]
    demand: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct VehiclePopulationRaw {
    region_id: String,
    #[serde(default)]
    vehicle_class: VehicleClass,
    time: NaiveDateTime,
    #[serde(deserialize_with = "deserialise_non_negative")]
    population: f64,
}

/// Read baseline demand (energy per time step) for each region.
///
/// # Arguments
///
/// * `data_dir` - Folder containing baseline data files
/// * `region_ids` - All known region IDs
pub fn read_baseline_demand(
    data_dir: &Path,
    region_ids: &IndexSet<RegionID>,
) -> Result<RegionSeriesMap<Energy>> {
    let file_path = data_dir.join(BASELINE_DEMAND_FILE_NAME);
    let iter = read_csv::<BaselineDemandRaw>(&file_path)?
        .map(|row| (row.region_id, row.time, Energy(row.demand)));
    collect_series(iter, region_ids).with_context(|| input_err_msg(&file_path))
}

/// Read vehicle population time series for each vehicle class and region, if the file is present.
///
/// The `vehicle_class` column is optional; rows without it describe light vehicles.
///
/// # Arguments
///
/// * `data_dir` - Folder containing baseline data files
/// * `region_ids` - All known region IDs
pub fn read_population_series(
    data_dir: &Path,
    region_ids: &IndexSet<RegionID>,
) -> Result<IndexMap<VehicleClass, RegionSeriesMap<f64>>> {
    let file_path = data_dir.join(VEHICLE_POPULATION_FILE_NAME);
    let rows = read_csv_optional::<VehiclePopulationRaw>(&file_path)?
        .into_group_map_by(|row| row.vehicle_class);

    let mut map = IndexMap::new();
    for class in VehicleClass::iter() {
        let Some(rows) = rows.get(&class) else {
            continue;
        };
        let iter = rows
            .iter()
            .map(|row| (row.region_id.clone(), row.time, row.population));
        let series = collect_series(iter, region_ids)
            .with_context(|| format!("Invalid {class} vehicle population"))
            .with_context(|| input_err_msg(&file_path))?;
        map.insert(class, series);
    }

    Ok(map)
}

/// Group rows into a time series per region, checking for unknown regions and duplicate times
fn collect_series<I, T>(iter: I, region_ids: &IndexSet<RegionID>) -> Result<RegionSeriesMap<T>>
where
    I: Iterator<Item = (String, NaiveDateTime, T)>,
{
    let mut map = RegionSeriesMap::new();
    for (region_id, time, value) in iter {
        let region_id = region_ids.get_id_by_str(&region_id)?;
        let series = map.entry(region_id.clone()).or_insert_with(BTreeMap::new);
        match series.entry(time) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(_) => {
                bail!("Duplicate entry for region {region_id} at {time}")
            }
        }
    }

    Ok(map)
}
