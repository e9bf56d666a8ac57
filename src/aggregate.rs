//! Code for combining baseline demand with EV charging demand for a region.
//!
//! EV charging demand in each step is limited by the available charging capacity. Demand which
//! can't be met is either dropped or deferred to later steps, depending on the
//! [`ShortfallPolicy`]. The only state carried between steps is held in a per-region
//! [`ShortfallAccumulator`].
use crate::adoption::AdoptionTrajectory;
use crate::charging::ChargingProfile;
use crate::error::SimulationError;
use crate::region::RegionID;
use crate::time_grid::TimeGrid;
use crate::units::{Dimensionless, Energy};
use crate::vehicle::VehicleEnergy;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::collections::VecDeque;

/// What to do with EV demand which exceeds charging capacity
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Default,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum ShortfallPolicy {
    /// Record excess demand as unmet straight away
    #[default]
    #[string = "drop"]
    Drop,
    /// Carry excess demand forward, giving up on it at the end of the day
    #[string = "defer_within_day"]
    DeferWithinDay,
    /// Carry excess demand forward, including into following days
    #[string = "defer_across_days"]
    DeferAcrossDays,
}

/// Validated shortfall handling parameters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ShortfallParameters {
    /// How excess demand is handled
    pub policy: ShortfallPolicy,
    /// Maximum number of steps demand can be deferred by before it is recorded as unmet
    pub max_deferral_steps: Option<u32>,
}

/// A chunk of demand waiting to be served
#[derive(Debug, Clone, Copy, PartialEq)]
struct DeferredDemand {
    /// The step in which the demand arose
    origin: usize,
    /// The outstanding energy
    energy: Energy,
}

/// How EV demand was handled in a single step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepOutcome {
    /// Energy delivered for demand arising in this step
    pub served_own: Energy,
    /// Energy delivered for demand deferred from earlier steps
    pub served_deferred: Energy,
    /// Demand arising in this step which couldn't be delivered in this step
    pub shortfall: Energy,
    /// Demand given up on in this step (dropped or expired)
    pub unmet: Energy,
}

/// Tracks EV demand carried forward between steps for a single region.
///
/// Deferred demand is served first-in, first-out, using whatever capacity is left after the
/// current step's own demand.
#[derive(Debug, Clone)]
pub struct ShortfallAccumulator {
    params: ShortfallParameters,
    pending: VecDeque<DeferredDemand>,
}

impl ShortfallAccumulator {
    /// Create a new, empty accumulator
    pub fn new(params: ShortfallParameters) -> Self {
        Self {
            params,
            pending: VecDeque::new(),
        }
    }

    /// Total deferred demand still waiting to be served
    pub fn pending(&self) -> Energy {
        self.pending.iter().map(|chunk| chunk.energy).sum()
    }

    /// Process EV demand for a single step.
    ///
    /// # Arguments
    ///
    /// * `step` - The index of the current step
    /// * `demand` - EV demand arising in this step
    /// * `limit` - Energy chargers can deliver in this step (`None` if unconstrained)
    pub fn step(&mut self, step: usize, demand: Energy, limit: Option<Energy>) -> StepOutcome {
        let mut outcome = StepOutcome {
            unmet: self.expire(step),
            ..StepOutcome::default()
        };

        let Some(limit) = limit else {
            outcome.served_own = demand;
            outcome.served_deferred = self.pending.drain(..).map(|chunk| chunk.energy).sum();
            return outcome;
        };

        let limit = limit.max(Energy::ZERO);
        outcome.served_own = demand.min(limit);
        outcome.shortfall = (demand - outcome.served_own).max(Energy::ZERO);

        let mut spare = limit - outcome.served_own;
        while spare > Energy::ZERO {
            let Some(chunk) = self.pending.front_mut() else {
                break;
            };
            let served = chunk.energy.min(spare);
            chunk.energy -= served;
            spare -= served;
            outcome.served_deferred += served;
            if chunk.energy <= Energy::ZERO {
                self.pending.pop_front();
            }
        }

        if outcome.shortfall > Energy::ZERO {
            match self.params.policy {
                ShortfallPolicy::Drop => outcome.unmet += outcome.shortfall,
                ShortfallPolicy::DeferWithinDay | ShortfallPolicy::DeferAcrossDays => {
                    self.pending.push_back(DeferredDemand {
                        origin: step,
                        energy: outcome.shortfall,
                    });
                }
            }
        }

        outcome
    }

    /// Give up on deferred demand older than the maximum deferral, returning the energy
    fn expire(&mut self, step: usize) -> Energy {
        let Some(max_steps) = self.params.max_deferral_steps else {
            return Energy::ZERO;
        };

        let mut expired = Energy::ZERO;
        while let Some(chunk) = self.pending.front() {
            if step - chunk.origin <= max_steps as usize {
                break;
            }
            expired += chunk.energy;
            self.pending.pop_front();
        }

        expired
    }

    /// Called at the end of each day, returning any demand which is given up on
    pub fn end_of_day(&mut self) -> Energy {
        if self.params.policy == ShortfallPolicy::DeferWithinDay {
            self.take_pending()
        } else {
            Energy::ZERO
        }
    }

    /// Finish processing, returning any demand still outstanding
    pub fn finish(mut self) -> Energy {
        self.take_pending()
    }

    fn take_pending(&mut self) -> Energy {
        self.pending.drain(..).map(|chunk| chunk.energy).sum()
    }
}

/// Load for a single region and time step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadRecord {
    /// The region
    pub region_id: RegionID,
    /// The index of the time step
    pub step: usize,
    /// The time at which the step starts
    pub time: NaiveDateTime,
    /// Non-EV demand
    pub baseline: Energy,
    /// EV charging demand arising in this step, ignoring capacity limits
    pub ev_raw: Energy,
    /// EV charging energy actually delivered in this step (including deferred demand)
    pub ev_served: Energy,
    /// The part of `ev_served` which was deferred from earlier steps
    pub deferred_served: Energy,
    /// Demand arising in this step which exceeded capacity
    pub shortfall: Energy,
    /// Demand recorded as unmet in this step
    pub unmet: Energy,
}

impl LoadRecord {
    /// Total load: baseline plus EV charging actually delivered
    pub fn total(&self) -> Energy {
        self.baseline + self.ev_served
    }
}

/// The aggregated load for a single region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionLoad {
    /// The region
    pub region_id: RegionID,
    /// Load for each time step, in order
    pub records: Vec<LoadRecord>,
    /// Deferred demand still unmet at the end of the horizon
    pub residual_unmet: Energy,
}

/// The inputs needed to aggregate load for a region
pub struct RegionInputs<'a> {
    /// The region
    pub region_id: &'a RegionID,
    /// Baseline demand for each step
    pub baseline: &'a [Energy],
    /// The projected EV fleet
    pub trajectory: &'a AdoptionTrajectory,
    /// The intraday charging profile
    pub profile: &'a ChargingProfile,
    /// Charging energy limits for each step
    pub limits: &'a [Option<Energy>],
}

/// Check that a calculated quantity is finite
fn check_finite(
    value: Energy,
    quantity: &'static str,
    region_id: &RegionID,
    time: NaiveDateTime,
) -> Result<Energy, SimulationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimulationError::NonFinite {
            quantity,
            region: region_id.clone(),
            time,
        })
    }
}

/// Combine baseline demand and EV charging demand for a region over the time grid.
///
/// EV demand in each step is the daily charging energy of the whole EV fleet (summed over vehicle
/// classes) multiplied by the charging profile's fraction for that time of day.
///
/// # Arguments
///
/// * `inputs` - Per-step data for the region
/// * `grid` - The simulation time grid
/// * `vehicle_energy` - Charging energy per EV per day for each vehicle class
/// * `shortfall` - How to handle demand exceeding capacity
pub fn aggregate_region(
    inputs: &RegionInputs,
    grid: &TimeGrid,
    vehicle_energy: &VehicleEnergy,
    shortfall: ShortfallParameters,
) -> Result<RegionLoad, SimulationError> {
    let mut accumulator = ShortfallAccumulator::new(shortfall);
    let mut records = Vec::with_capacity(grid.n_steps());

    for (step, time) in grid.iter() {
        let baseline = check_finite(inputs.baseline[step], "baseline", inputs.region_id, time)?;
        let fraction = inputs.profile.fraction(grid.slot_of_day(step));
        let ev_raw = check_finite(
            inputs.trajectory.daily_energy_at(vehicle_energy, step) * Dimensionless(fraction),
            "EV demand",
            inputs.region_id,
            time,
        )?
        .max(Energy::ZERO);

        let mut outcome = accumulator.step(step, ev_raw, inputs.limits[step]);
        if grid.is_last_step_of_day(step) {
            outcome.unmet += accumulator.end_of_day();
        }

        records.push(LoadRecord {
            region_id: inputs.region_id.clone(),
            step,
            time,
            baseline,
            ev_raw,
            ev_served: outcome.served_own + outcome.served_deferred,
            deferred_served: outcome.served_deferred,
            shortfall: outcome.shortfall,
            unmet: outcome.unmet,
        });
    }

    Ok(RegionLoad {
        region_id: inputs.region_id.clone(),
        records,
        residual_unmet: accumulator.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adoption::ClassTrajectory;
    use crate::fixture::simple_grid;
    use crate::vehicle::VehicleClass;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn params(policy: ShortfallPolicy, max_deferral_steps: Option<u32>) -> ShortfallParameters {
        ShortfallParameters {
            policy,
            max_deferral_steps,
        }
    }

    #[test]
    fn test_unconstrained_serves_everything() {
        let mut acc = ShortfallAccumulator::new(params(ShortfallPolicy::Drop, None));
        let outcome = acc.step(0, Energy(5.0), None);
        assert_eq!(outcome.served_own, Energy(5.0));
        assert_eq!(outcome.shortfall, Energy::ZERO);
        assert_eq!(outcome.unmet, Energy::ZERO);
    }

    #[test]
    fn test_zero_capacity_drop() {
        let mut acc = ShortfallAccumulator::new(params(ShortfallPolicy::Drop, None));
        let outcome = acc.step(0, Energy(5.0), Some(Energy::ZERO));
        assert_eq!(outcome.served_own, Energy::ZERO);
        assert_eq!(outcome.shortfall, Energy(5.0));
        assert_eq!(outcome.unmet, Energy(5.0));
        assert_eq!(acc.finish(), Energy::ZERO);
    }

    #[test]
    fn test_deferral_uses_spare_capacity() {
        let mut acc = ShortfallAccumulator::new(params(ShortfallPolicy::DeferAcrossDays, None));

        let first = acc.step(0, Energy(8.0), Some(Energy(5.0)));
        assert_eq!(first.served_own, Energy(5.0));
        assert_eq!(first.shortfall, Energy(3.0));
        assert_eq!(first.unmet, Energy::ZERO);
        assert_eq!(acc.pending(), Energy(3.0));

        // Own demand is served first, then deferred demand with what's left
        let second = acc.step(1, Energy(4.0), Some(Energy(5.0)));
        assert_eq!(second.served_own, Energy(4.0));
        assert_eq!(second.served_deferred, Energy(1.0));
        assert_eq!(acc.pending(), Energy(2.0));

        let third = acc.step(2, Energy::ZERO, Some(Energy(5.0)));
        assert_eq!(third.served_deferred, Energy(2.0));
        assert_eq!(acc.finish(), Energy::ZERO);
    }

    #[test]
    fn test_deferral_expires() {
        let mut acc = ShortfallAccumulator::new(params(ShortfallPolicy::DeferAcrossDays, Some(1)));
        acc.step(0, Energy(3.0), Some(Energy::ZERO));
        assert_eq!(acc.step(1, Energy::ZERO, Some(Energy::ZERO)).unmet, Energy::ZERO);
        assert_eq!(acc.step(2, Energy::ZERO, Some(Energy(10.0))).unmet, Energy(3.0));
        assert_eq!(acc.pending(), Energy::ZERO);
    }

    #[test]
    fn test_end_of_day() {
        let mut within = ShortfallAccumulator::new(params(ShortfallPolicy::DeferWithinDay, None));
        within.step(0, Energy(3.0), Some(Energy::ZERO));
        assert_eq!(within.end_of_day(), Energy(3.0));

        let mut across = ShortfallAccumulator::new(params(ShortfallPolicy::DeferAcrossDays, None));
        across.step(0, Energy(3.0), Some(Energy::ZERO));
        assert_eq!(across.end_of_day(), Energy::ZERO);
        assert_eq!(across.finish(), Energy(3.0));
    }

    /// A constant EV fleet for each class
    fn trajectory(grid: &TimeGrid, fleets: &[(VehicleClass, f64)]) -> AdoptionTrajectory {
        let n = grid.n_steps();
        let classes = fleets
            .iter()
            .map(|&(class, fleet)| {
                let trajectory = ClassTrajectory {
                    shares: vec![0.5; n],
                    fleet: vec![fleet; n],
                };
                (class, trajectory)
            })
            .collect();

        AdoptionTrajectory {
            region_id: "NZ".into(),
            classes,
        }
    }

    fn aggregate_classes(
        grid: &TimeGrid,
        fleets: &[(VehicleClass, f64)],
        limits: &[Option<Energy>],
        policy: ShortfallPolicy,
    ) -> RegionLoad {
        let region_id = "NZ".into();
        let baseline = vec![Energy(100.0); grid.n_steps()];
        let trajectory = trajectory(grid, fleets);
        let profile = crate::charging::ChargingBehaviour::Uniform.base_shape(grid.steps_per_day());
        let inputs = RegionInputs {
            region_id: &region_id,
            baseline: &baseline,
            trajectory: &trajectory,
            profile: &profile,
            limits,
        };
        let energy = VehicleEnergy::new(
            [
                (VehicleClass::Light, Energy(24.0)),
                (VehicleClass::Heavy, Energy(240.0)),
            ]
            .into_iter()
            .collect(),
        );

        aggregate_region(&inputs, grid, &energy, params(policy, None)).unwrap()
    }

    fn aggregate(
        grid: &TimeGrid,
        fleet: f64,
        limits: &[Option<Energy>],
        policy: ShortfallPolicy,
    ) -> RegionLoad {
        aggregate_classes(grid, &[(VehicleClass::Light, fleet)], limits, policy)
    }

    #[rstest]
    fn test_vehicle_classes(simple_grid: TimeGrid) {
        let limits = vec![None; simple_grid.n_steps()];
        let fleets = [(VehicleClass::Light, 10.0), (VehicleClass::Heavy, 2.0)];
        let load = aggregate_classes(&simple_grid, &fleets, &limits, ShortfallPolicy::Drop);

        // 10 light EVs at 24 kWh and 2 heavy EVs at 240 kWh per day, spread over 24 hours
        for record in &load.records {
            assert_approx_eq!(Energy, record.ev_raw, Energy(10.0 + 20.0), epsilon = 1e-9);
        }
    }

    #[rstest]
    #[case(ShortfallPolicy::Drop)]
    #[case(ShortfallPolicy::DeferWithinDay)]
    #[case(ShortfallPolicy::DeferAcrossDays)]
    fn test_energy_conserved(simple_grid: TimeGrid, #[case] policy: ShortfallPolicy) {
        // Capacity alternates between none and plenty
        let limits: Vec<_> = (0..simple_grid.n_steps())
            .map(|step| Some(Energy(if step % 3 == 0 { 0.0 } else { 15.0 })))
            .collect();
        let load = aggregate(&simple_grid, 10.0, &limits, policy);

        let raw: Energy = load.records.iter().map(|r| r.ev_raw).sum();
        let served: Energy = load.records.iter().map(|r| r.ev_served).sum();
        let unmet: Energy = load.records.iter().map(|r| r.unmet).sum();
        assert_approx_eq!(Energy, raw, served + unmet + load.residual_unmet, epsilon = 1e-9);

        for record in &load.records {
            assert!(record.ev_served <= Energy(15.0));
            assert!(record.total() >= record.baseline);
        }
    }

    #[rstest]
    fn test_zero_capacity_clamp(simple_grid: TimeGrid) {
        let limits = vec![Some(Energy::ZERO); simple_grid.n_steps()];
        let load = aggregate(&simple_grid, 10.0, &limits, ShortfallPolicy::Drop);
        for record in &load.records {
            assert_eq!(record.ev_served, Energy::ZERO);
            assert_eq!(record.shortfall, record.ev_raw);
            assert_eq!(record.unmet, record.ev_raw);
            assert_eq!(record.total(), Energy(100.0));
        }
    }

    #[rstest]
    fn test_uniform_demand(simple_grid: TimeGrid) {
        let limits = vec![None; simple_grid.n_steps()];
        let load = aggregate(&simple_grid, 10.0, &limits, ShortfallPolicy::Drop);

        // 10 vehicles * 24 kWh/day spread over 24 hourly slots
        for record in &load.records {
            assert_approx_eq!(Energy, record.ev_raw, Energy(10.0), epsilon = 1e-9);
            assert_approx_eq!(Energy, record.total(), Energy(110.0), epsilon = 1e-9);
        }
        assert_eq!(load.residual_unmet, Energy::ZERO);
    }

    #[rstest]
    fn test_within_day_truncation(simple_grid: TimeGrid) {
        // No capacity in the last hour of the first day, plenty afterwards
        let limits: Vec<_> = (0..simple_grid.n_steps())
            .map(|step| Some(Energy(if step == 23 { 0.0 } else { 100.0 })))
            .collect();

        let within = aggregate(&simple_grid, 10.0, &limits, ShortfallPolicy::DeferWithinDay);
        assert_approx_eq!(Energy, within.records[23].unmet, Energy(10.0), epsilon = 1e-9);
        assert_eq!(within.records[24].deferred_served, Energy::ZERO);

        let across = aggregate(&simple_grid, 10.0, &limits, ShortfallPolicy::DeferAcrossDays);
        assert_eq!(across.records[23].unmet, Energy::ZERO);
        assert_approx_eq!(
            Energy,
            across.records[24].deferred_served,
            Energy(10.0),
            epsilon = 1e-9
        );
    }
}
