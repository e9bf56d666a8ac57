//! Regions represent the geographical areas for which load is simulated.
use crate::error::ConfigError;
use crate::id::{IDCollection, define_id_getter, define_id_type};
use indexmap::IndexSet;
use serde::Deserialize;

define_id_type! {RegionID}

/// Represents a region with an ID and a longer description.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Region {
    /// A unique identifier for a region (e.g. "AKL").
    pub id: RegionID,
    /// A text description of the region (e.g. "Auckland").
    pub description: String,
}
define_id_getter! {Region, RegionID}

/// Parse a string of regions separated by semicolons into a set of [`RegionID`]s.
///
/// The string can be either "all" (case-insensitive), a single region, or a semicolon-separated
/// list of regions (e.g. "AKL;WLG;CHC" or "AKL; WLG; CHC"). The returned set preserves the order
/// of `region_ids` for "all" and the order given in `s` otherwise.
pub fn parse_region_selection(
    s: &str,
    region_ids: &IndexSet<RegionID>,
) -> Result<IndexSet<RegionID>, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::EmptyRegionSelection);
    }

    if s.eq_ignore_ascii_case("all") {
        if region_ids.is_empty() {
            return Err(ConfigError::EmptyRegionSelection);
        }
        return Ok(region_ids.clone());
    }

    s.split(';')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            region_ids
                .get_id_by_str(id)
                .map_err(|_| ConfigError::UnknownRegion(id.to_string()))
        })
        .collect::<Result<IndexSet<_>, _>>()
        .and_then(|ids| {
            if ids.is_empty() {
                Err(ConfigError::EmptyRegionSelection)
            } else {
                Ok(ids)
            }
        })
}
