//! The read-only baseline data service shared by simulation runs.
//!
//! [`BaselineData`] holds historical (non-EV) demand and vehicle populations for each region. It is
//! loaded once, wrapped in an [`Arc`](std::sync::Arc) and shared by reference between concurrent
//! simulation runs. Nothing in the simulation mutates it.
use crate::error::DataGapError;
use crate::region::{Region, RegionID};
use crate::time_grid::TimeGrid;
use crate::units::Energy;
use crate::vehicle::VehicleClass;
use chrono::NaiveDateTime;
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;

/// The vehicles of one class in a region
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fleet {
    /// The total number of vehicles of this class
    pub population: f64,
    /// The number of vehicles which are already electric, if known
    pub ev_count: Option<f64>,
    /// Changes in population over time, overriding `population` from the given time onwards
    pub population_series: BTreeMap<NaiveDateTime, f64>,
}

impl Fleet {
    /// Create a fleet with no population series attached
    pub fn new(population: f64, ev_count: Option<f64>) -> Self {
        Self {
            population,
            ev_count,
            population_series: BTreeMap::new(),
        }
    }

    /// The share of the fleet which is electric (zero if unknown)
    pub fn current_ev_share(&self) -> f64 {
        match self.ev_count {
            Some(ev_count) if self.population > 0.0 => {
                (ev_count / self.population).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

/// Historical data for a single region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionData {
    /// The region this data describes
    pub region: Region,
    /// The region's vehicles, by class. Classes with no entry have no vehicles.
    pub fleets: IndexMap<VehicleClass, Fleet>,
    /// Baseline demand for each time step (energy per step)
    pub baseline_demand: BTreeMap<NaiveDateTime, Energy>,
}

impl RegionData {
    /// Create region data with no baseline demand attached
    pub fn new(region: Region, fleets: IndexMap<VehicleClass, Fleet>) -> Self {
        Self {
            region,
            fleets,
            baseline_demand: BTreeMap::new(),
        }
    }

    /// The share of vehicles of the given class which are already electric (zero if unknown)
    pub fn current_ev_share(&self, class: VehicleClass) -> f64 {
        self.fleets
            .get(&class)
            .map_or(0.0, Fleet::current_ev_share)
    }

    /// Get baseline demand for every step of `grid`.
    ///
    /// Missing values are reported rather than filled in.
    pub fn baseline_for_grid(&self, grid: &TimeGrid) -> Result<Vec<Energy>, DataGapError> {
        grid.iter()
            .map(|(_, time)| {
                self.baseline_demand
                    .get(&time)
                    .copied()
                    .ok_or_else(|| DataGapError::MissingBaseline {
                        region: self.region.id.clone(),
                        time,
                    })
            })
            .collect()
    }

    /// Get the population of a vehicle class for every step of `grid`.
    ///
    /// If no population series was supplied, the scalar population is used throughout. Otherwise
    /// each step takes the most recent value in the series, and it is an error for the series to
    /// start after the first step. A class the region has no fleet for has no vehicles.
    pub fn population_for_grid(
        &self,
        class: VehicleClass,
        grid: &TimeGrid,
    ) -> Result<Vec<f64>, DataGapError> {
        let Some(fleet) = self.fleets.get(&class) else {
            return Ok(vec![0.0; grid.n_steps()]);
        };
        if fleet.population_series.is_empty() {
            return Ok(vec![fleet.population; grid.n_steps()]);
        }

        grid.iter()
            .map(|(_, time)| {
                fleet
                    .population_series
                    .range(..=time)
                    .next_back()
                    .map(|(_, population)| *population)
                    .ok_or_else(|| DataGapError::MissingPopulation {
                        region: self.region.id.clone(),
                        class,
                        time,
                    })
            })
            .collect()
    }
}

/// Baseline data for all known regions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaselineData {
    regions: IndexMap<RegionID, RegionData>,
}

impl BaselineData {
    /// Create a new [`BaselineData`] from per-region data
    pub fn new(regions: IndexMap<RegionID, RegionData>) -> Self {
        Self { regions }
    }

    /// The IDs of all regions for which there is data, in input order
    pub fn region_ids(&self) -> IndexSet<RegionID> {
        self.regions.keys().cloned().collect()
    }

    /// Get the data for a region
    pub fn region(&self, region_id: &RegionID) -> Result<&RegionData, DataGapError> {
        self.regions
            .get(region_id)
            .ok_or_else(|| DataGapError::MissingRegion(region_id.clone()))
    }

    /// Iterate over the data for each region
    pub fn iter(&self) -> impl Iterator<Item = &RegionData> {
        self.regions.values()
    }
}
