//! Functionality for running a scenario simulation.
//!
//! A run projects the EV fleet, builds a charging profile and aggregates load for every selected
//! region. Regions don't interact, so they are simulated in parallel. Runs never modify the
//! baseline data, so several scenarios can share one copy of it.
use crate::adoption::project_adoption;
use crate::aggregate::{LoadRecord, RegionInputs, RegionLoad, aggregate_region};
use crate::charging::generate_profile;
use crate::data::BaselineData;
use crate::error::SimulationError;
use crate::region::RegionID;
use crate::scenario::ScenarioConfig;
use crate::time_grid::TimeGrid;
use crate::units::Energy;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use log::{debug, info};
use rayon::prelude::*;
use std::sync::Arc;

/// A single simulation run: one scenario applied to the baseline data
pub struct Simulation {
    config: Arc<ScenarioConfig>,
    data: Arc<BaselineData>,
    grid: TimeGrid,
}

impl Simulation {
    /// Prepare a simulation run.
    ///
    /// Fails if the horizon is empty or there is no data for a selected region.
    pub fn new(
        config: Arc<ScenarioConfig>,
        data: Arc<BaselineData>,
    ) -> Result<Self, SimulationError> {
        let grid = config.grid();
        if grid.is_empty() {
            return Err(SimulationError::EmptyHorizon);
        }
        for region_id in config.regions() {
            data.region(region_id)?;
        }

        Ok(Self { config, data, grid })
    }

    /// Run the simulation.
    ///
    /// Regions are simulated in parallel, but results are always returned in the order in which
    /// regions were selected. If any region fails, the error for the earliest such region is
    /// returned and no results are produced.
    pub fn run(&self) -> Result<SimulationResult, SimulationError> {
        info!(
            "Simulating {} region(s) over {} time steps of {} minutes",
            self.config.regions().len(),
            self.grid.n_steps(),
            self.grid.step_minutes()
        );

        let loads: Vec<_> = self
            .config
            .regions()
            .par_iter()
            .map(|region_id| self.simulate_region(region_id))
            .collect();

        let mut records = Vec::with_capacity(loads.len() * self.grid.n_steps());
        let mut residual_unmet = IndexMap::new();
        for load in loads {
            let load = load?;
            records.extend(load.records);
            residual_unmet.insert(load.region_id, load.residual_unmet);
        }

        Ok(SimulationResult {
            config: Arc::clone(&self.config),
            records,
            residual_unmet,
        })
    }

    fn simulate_region(&self, region_id: &RegionID) -> Result<RegionLoad, SimulationError> {
        debug!("Simulating region {region_id}");
        let region = self.data.region(region_id)?;
        let baseline = region.baseline_for_grid(&self.grid)?;
        let trajectory = project_adoption(self.config.adoption(), &self.grid, region)?;
        debug!(
            "Region {region_id}: {:.0} EVs at end of horizon",
            trajectory.total_fleet_at(self.grid.n_steps() - 1)
        );
        let profile = generate_profile(
            self.config.mix_for(region_id),
            self.config.compliance(),
            self.grid.steps_per_day(),
        );
        let limits = self
            .config
            .infrastructure()
            .energy_limits_for_grid(region_id, &self.grid);

        let inputs = RegionInputs {
            region_id,
            baseline: &baseline,
            trajectory: &trajectory,
            profile: &profile,
            limits: &limits,
        };
        let load = aggregate_region(
            &inputs,
            &self.grid,
            self.config.vehicle_energy(),
            self.config.shortfall(),
        )?;

        let unmet: Energy = load.records.iter().map(|record| record.unmet).sum();
        if unmet > Energy::ZERO || load.residual_unmet > Energy::ZERO {
            debug!(
                "Region {region_id}: {unmet} kWh of charging demand unmet, {} kWh outstanding at \
                end of horizon",
                load.residual_unmet
            );
        }

        Ok(load)
    }
}

/// Run several scenarios against the same baseline data.
///
/// Scenarios are run in parallel. The results are in the same order as `configs`.
pub fn run_scenarios(
    configs: &[Arc<ScenarioConfig>],
    data: &Arc<BaselineData>,
) -> Vec<Result<SimulationResult, SimulationError>> {
    configs
        .par_iter()
        .map(|config| Simulation::new(Arc::clone(config), Arc::clone(data))?.run())
        .collect()
}

/// The output of a simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    config: Arc<ScenarioConfig>,
    records: Vec<LoadRecord>,
    residual_unmet: IndexMap<RegionID, Energy>,
}

impl SimulationResult {
    /// The scenario which produced this result
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// All load records, ordered by region (in selection order) then time
    pub fn records(&self) -> &[LoadRecord] {
        &self.records
    }

    /// Load records for a single region
    pub fn records_for<'a>(
        &'a self,
        region_id: &'a RegionID,
    ) -> impl Iterator<Item = &'a LoadRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| &record.region_id == region_id)
    }

    /// Charging demand still outstanding at the end of the horizon for a region
    pub fn residual_unmet(&self, region_id: &RegionID) -> Energy {
        self.residual_unmet
            .get(region_id)
            .copied()
            .unwrap_or(Energy::ZERO)
    }

    /// Summary statistics for each selected region
    pub fn summary(&self) -> Vec<RegionSummary> {
        self.config
            .regions()
            .iter()
            .map(|region_id| {
                RegionSummary::from_records(
                    region_id,
                    self.records_for(region_id),
                    self.residual_unmet(region_id),
                )
            })
            .collect()
    }
}

/// Summary statistics of load for a region over the horizon
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSummary {
    /// The region
    pub region_id: RegionID,
    /// The highest baseline load in a single step
    pub peak_baseline: Energy,
    /// The highest total load in a single step
    pub peak_total: Energy,
    /// When the highest total load occurs (first occurrence)
    pub peak_time: Option<NaiveDateTime>,
    /// The mean total load per step
    pub mean_total: Energy,
    /// Total baseline energy
    pub baseline: Energy,
    /// Total EV charging demand
    pub ev_raw: Energy,
    /// Total EV charging energy delivered
    pub ev_served: Energy,
    /// Total demand recorded as unmet during the horizon
    pub unmet: Energy,
    /// Demand still outstanding at the end of the horizon
    pub residual_unmet: Energy,
}

impl RegionSummary {
    fn from_records<'a, I>(region_id: &RegionID, records: I, residual_unmet: Energy) -> Self
    where
        I: Iterator<Item = &'a LoadRecord>,
    {
        let mut summary = Self {
            region_id: region_id.clone(),
            peak_baseline: Energy::ZERO,
            peak_total: Energy::ZERO,
            peak_time: None,
            mean_total: Energy::ZERO,
            baseline: Energy::ZERO,
            ev_raw: Energy::ZERO,
            ev_served: Energy::ZERO,
            unmet: Energy::ZERO,
            residual_unmet,
        };

        let mut count = 0;
        let mut total = Energy::ZERO;
        for record in records {
            count += 1;
            total += record.total();
            summary.peak_baseline = summary.peak_baseline.max(record.baseline);
            if summary.peak_time.is_none() || record.total() > summary.peak_total {
                summary.peak_total = record.total();
                summary.peak_time = Some(record.time);
            }
            summary.baseline += record.baseline;
            summary.ev_raw += record.ev_raw;
            summary.ev_served += record.ev_served;
            summary.unmet += record.unmet;
        }
        if count > 0 {
            summary.mean_total = Energy(total.value() / f64::from(count));
        }

        summary
    }

    /// How much EV charging raises the peak above the baseline peak
    pub fn peak_increase(&self) -> Energy {
        self.peak_total - self.peak_baseline
    }
}
