//! Common routines for handling input data.
use crate::data::{BaselineData, RegionData};
use crate::id::{HasID, IDLike};
use crate::region::Region;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use std::fs;
use std::path::Path;

mod baseline;
use baseline::{read_baseline_demand, read_population_series};
mod region;
use region::read_regions;

/// Read a series of type `T`s from a CSV file.
///
/// Will raise an error if the file is empty.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    let vec = read_csv_internal(file_path)?;
    ensure!(!vec.is_empty(), "CSV file {} cannot be empty", file_path.display());

    Ok(vec.into_iter())
}

/// Read a series of type `T`s from a CSV file, returning an empty iterator if the file is missing.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv_optional<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    if !file_path.exists() {
        return Ok(Vec::new().into_iter());
    }

    Ok(read_csv_internal(file_path)?.into_iter())
}

fn read_csv_internal<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let vec = csv::Reader::from_path(file_path)
        .with_context(|| input_err_msg(file_path))?
        .into_deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Read an f64, checking that it is finite and not negative
pub fn deserialise_non_negative<'de, D>(deserialiser: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserialiser)?;
    if !value.is_finite() || value < 0.0 {
        Err(serde::de::Error::custom(
            "Value must be a finite number no less than zero",
        ))?;
    }

    Ok(value)
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Read a CSV file of items with IDs.
///
/// As this function is only ever used for top-level CSV files (i.e. the ones which actually
/// define the IDs for a given type), we use an ordered map to maintain the order in the input
/// files.
fn read_csv_id_file<T, ID>(file_path: &Path) -> Result<IndexMap<ID, T>>
where
    T: HasID<ID> + DeserializeOwned,
    ID: IDLike,
{
    fn fill_and_validate_map<T, ID>(file_path: &Path) -> Result<IndexMap<ID, T>>
    where
        T: HasID<ID> + DeserializeOwned,
        ID: IDLike,
    {
        let mut map = IndexMap::new();
        for record in read_csv::<T>(file_path)? {
            let id = record.get_id().clone();
            let id_str: &str = id.borrow();
            ensure!(!id_str.is_empty(), "IDs cannot be empty");
            let existing = map.insert(id.clone(), record).is_some();
            ensure!(!existing, "Duplicate ID found: {id}");
        }

        Ok(map)
    }

    fill_and_validate_map(file_path).with_context(|| input_err_msg(file_path))
}

/// Load baseline data from the specified directory.
///
/// The directory must contain `regions.csv` and `baseline_demand.csv`. `vehicle_population.csv`
/// is optional. A population series for a vehicle class gives the region a fleet of that class
/// even if `regions.csv` lists no vehicles of it.
///
/// # Arguments
///
/// * `data_dir` - Folder containing baseline data files
///
/// # Returns
///
/// The baseline data for every region, or an error.
pub fn load_baseline_data<P: AsRef<Path>>(data_dir: P) -> Result<BaselineData> {
    let data_dir = data_dir.as_ref();
    let regions = read_regions(data_dir)?;
    let region_ids = regions.keys().cloned().collect();
    let mut baseline = read_baseline_demand(data_dir, &region_ids)?;
    let mut population = read_population_series(data_dir, &region_ids)?;

    let regions = regions
        .into_iter()
        .map(|(id, row)| {
            let fleets = row.fleets();
            let region = Region {
                id: id.clone(),
                description: row.description,
            };
            let mut data = RegionData::new(region, fleets);
            data.baseline_demand = baseline.shift_remove(&id).unwrap_or_default();
            for (class, series) in population.iter_mut() {
                if let Some(series) = series.shift_remove(&id) {
                    data.fleets.entry(*class).or_default().population_series = series;
                }
            }
            (id, data)
        })
        .collect();

    Ok(BaselineData::new(regions))
}
