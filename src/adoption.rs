//! Code for projecting the size of the EV fleet in each region over time.
//!
//! The EV share of the vehicle fleet follows an adoption curve from an initial share to a final
//! share over the adoption period. Regions are projected independently of one another.
use crate::data::RegionData;
use crate::error::DataGapError;
use crate::region::RegionID;
use crate::time_grid::{TimeGrid, years_between};
use crate::units::{Dimensionless, Energy};
use crate::vehicle::{VehicleClass, VehicleEnergy};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use strum::IntoEnumIterator;

/// The family of adoption curve, as given in scenario files
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Default,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum AdoptionCurveKind {
    /// Straight-line growth between the start and end of the adoption period
    #[default]
    #[string = "linear"]
    Linear,
    /// S-shaped growth between the start and end of the adoption period
    #[string = "logistic"]
    Logistic,
}

/// The shape of an adoption curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdoptionCurve {
    /// Straight-line growth
    Linear,
    /// A logistic curve, rescaled so that it passes exactly through the initial share at the start
    /// of the adoption period and the final share at the end
    Logistic {
        /// Growth rate per year
        growth_rate: f64,
        /// The time of fastest growth
        inflection: NaiveDateTime,
    },
}

impl AdoptionCurve {
    /// The progress from initial to final share at `time`, between 0 and 1.
    ///
    /// Progress is zero before `start` and one from `end` onwards. If `start == end`, adoption
    /// happens instantaneously at that time.
    pub fn progress(&self, time: NaiveDateTime, start: NaiveDateTime, end: NaiveDateTime) -> f64 {
        if time >= end {
            return 1.0;
        }
        if time <= start {
            return 0.0;
        }

        let linear = || (time - start).num_seconds() as f64 / (end - start).num_seconds() as f64;
        let progress = match self {
            Self::Linear => linear(),
            Self::Logistic {
                growth_rate,
                inflection,
            } => {
                let logistic =
                    |t| 1.0 / (1.0 + (-growth_rate * years_between(*inflection, t)).exp());
                let (low, high) = (logistic(start), logistic(end));
                let range = high - low;
                if range > 0.0 {
                    (logistic(time) - low) / range
                } else {
                    // Curve is numerically flat, so fall back on straight-line growth
                    linear()
                }
            }
        };

        progress.clamp(0.0, 1.0)
    }
}

/// Per-region overrides of adoption parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AdoptionOverride {
    /// Replacement curve shape
    pub curve: Option<AdoptionCurve>,
    /// Replacement initial share
    pub initial_share: Option<f64>,
    /// Replacement final share
    pub final_share: Option<f64>,
}

/// Adoption shares for one vehicle class, replacing the general shares for vehicles of that class
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassShares {
    /// Replacement initial share
    pub initial_share: Option<f64>,
    /// Replacement final share
    pub final_share: Option<f64>,
}

/// Validated adoption parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdoptionParameters {
    /// The shape of the curve
    pub curve: AdoptionCurve,
    /// EV share at the start of adoption. If `None`, the region's current share is used.
    pub initial_share: Option<f64>,
    /// EV share at the end of adoption
    pub final_share: f64,
    /// When adoption begins
    pub start: NaiveDateTime,
    /// When the final share is reached
    pub end: NaiveDateTime,
    /// Shares for specific vehicle classes
    pub classes: IndexMap<VehicleClass, ClassShares>,
    /// Overrides for specific regions, applying to every vehicle class
    pub overrides: IndexMap<RegionID, AdoptionOverride>,
}

impl AdoptionParameters {
    /// Get the curve, initial share and final share for one class of vehicle in a region.
    ///
    /// Region overrides take precedence over class shares, which take precedence over the general
    /// shares.
    fn for_region(&self, region: &RegionData, class: VehicleClass) -> (AdoptionCurve, f64, f64) {
        let over = self.overrides.get(&region.region.id);
        let class_shares = self.classes.get(&class);
        let curve = over.and_then(|o| o.curve).unwrap_or(self.curve);
        let initial_share = over
            .and_then(|o| o.initial_share)
            .or(class_shares.and_then(|c| c.initial_share))
            .or(self.initial_share)
            .unwrap_or_else(|| region.current_ev_share(class));
        let final_share = over
            .and_then(|o| o.final_share)
            .or(class_shares.and_then(|c| c.final_share))
            .unwrap_or(self.final_share);

        (curve, initial_share, final_share)
    }
}

/// The projected EVs of one vehicle class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTrajectory {
    /// EV share of the class's vehicles at each step
    pub shares: Vec<f64>,
    /// Number of EVs at each step
    pub fleet: Vec<f64>,
}

/// The projected EV fleet for one region over the time grid
#[derive(Debug, Clone, PartialEq)]
pub struct AdoptionTrajectory {
    /// The region
    pub region_id: RegionID,
    /// The projection for each vehicle class the region has a fleet of
    pub classes: IndexMap<VehicleClass, ClassTrajectory>,
}

impl AdoptionTrajectory {
    /// The number of EVs of the given class at the given step
    pub fn fleet_at(&self, class: VehicleClass, step: usize) -> f64 {
        self.classes
            .get(&class)
            .map_or(0.0, |trajectory| trajectory.fleet[step])
    }

    /// The number of EVs of every class at the given step
    pub fn total_fleet_at(&self, step: usize) -> f64 {
        self.classes
            .values()
            .map(|trajectory| trajectory.fleet[step])
            .sum()
    }

    /// Charging energy needed per day by the whole EV fleet at the given step
    pub fn daily_energy_at(&self, energy: &VehicleEnergy, step: usize) -> Energy {
        self.classes
            .iter()
            .map(|(class, trajectory)| {
                energy.daily_energy(*class) * Dimensionless(trajectory.fleet[step])
            })
            .sum()
    }
}

/// Project the EV fleet for a region over every step of `grid`.
///
/// Each vehicle class the region has a fleet of is projected separately. The number of EVs of a
/// class at each step is the EV share given by the adoption curve multiplied by the population of
/// that class at that step. It is never negative and never exceeds the population.
pub fn project_adoption(
    params: &AdoptionParameters,
    grid: &TimeGrid,
    region: &RegionData,
) -> Result<AdoptionTrajectory, DataGapError> {
    let mut classes = IndexMap::new();
    for class in VehicleClass::iter().filter(|class| region.fleets.contains_key(class)) {
        let (curve, initial_share, final_share) = params.for_region(region, class);
        let population = region.population_for_grid(class, grid)?;

        let shares: Vec<f64> = grid
            .iter()
            .map(|(_, time)| {
                let progress = curve.progress(time, params.start, params.end);
                (initial_share + (final_share - initial_share) * progress).clamp(0.0, 1.0)
            })
            .collect();

        let fleet = shares
            .iter()
            .zip(&population)
            .map(|(share, population)| share * population.max(0.0))
            .collect();

        classes.insert(class, ClassTrajectory { shares, fleet });
    }

    Ok(AdoptionTrajectory {
        region_id: region.region.id.clone(),
        classes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Fleet;
    use crate::fixture::{datetime, region_data, simple_grid};
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn linear_params(simple_grid: TimeGrid) -> AdoptionParameters {
        AdoptionParameters {
            curve: AdoptionCurve::Linear,
            initial_share: Some(0.0),
            final_share: 0.5,
            start: simple_grid.time(0),
            end: simple_grid.time(10),
            classes: IndexMap::new(),
            overrides: IndexMap::new(),
        }
    }

    fn light_fleet(trajectory: &AdoptionTrajectory, step: usize) -> f64 {
        trajectory.fleet_at(VehicleClass::Light, step)
    }

    fn light_shares(trajectory: &AdoptionTrajectory) -> &[f64] {
        &trajectory.classes[&VehicleClass::Light].shares
    }

    #[rstest]
    fn test_linear_projection(
        linear_params: AdoptionParameters,
        simple_grid: TimeGrid,
        region_data: RegionData,
    ) {
        let trajectory = project_adoption(&linear_params, &simple_grid, &region_data).unwrap();
        assert_approx_eq!(f64, light_fleet(&trajectory, 0), 0.0);
        assert_approx_eq!(f64, light_fleet(&trajectory, 5), 250.0, epsilon = 1e-9);
        assert_approx_eq!(f64, light_fleet(&trajectory, 10), 500.0);
        assert_approx_eq!(f64, light_fleet(&trajectory, 20), 500.0);
    }

    #[rstest]
    fn test_logistic_projection(
        mut linear_params: AdoptionParameters,
        simple_grid: TimeGrid,
        region_data: RegionData,
    ) {
        linear_params.curve = AdoptionCurve::Logistic {
            growth_rate: 2000.0,
            inflection: simple_grid.time(5),
        };
        let trajectory = project_adoption(&linear_params, &simple_grid, &region_data).unwrap();

        let shares = light_shares(&trajectory);
        assert_approx_eq!(f64, shares[0], 0.0);
        assert_approx_eq!(f64, shares[5], 0.25, epsilon = 1e-9);
        assert_approx_eq!(f64, shares[10], 0.5);
        assert!(shares[..=10].windows(2).all(|w| w[0] <= w[1]));

        // S-shaped: slow at the start, fast in the middle
        assert!(shares[1] - shares[0] < shares[5] - shares[4]);
    }

    #[rstest]
    fn test_region_override(
        mut linear_params: AdoptionParameters,
        simple_grid: TimeGrid,
        region_data: RegionData,
    ) {
        linear_params.overrides.insert(
            "NZ".into(),
            AdoptionOverride {
                final_share: Some(1.0),
                ..Default::default()
            },
        );
        let trajectory = project_adoption(&linear_params, &simple_grid, &region_data).unwrap();
        assert_approx_eq!(f64, light_fleet(&trajectory, 10), 1000.0);
    }

    #[rstest]
    fn test_initial_share_from_data(
        mut linear_params: AdoptionParameters,
        simple_grid: TimeGrid,
        mut region_data: RegionData,
    ) {
        linear_params.initial_share = None;
        region_data.fleets[&VehicleClass::Light].ev_count = Some(100.0);
        let trajectory = project_adoption(&linear_params, &simple_grid, &region_data).unwrap();
        assert_approx_eq!(f64, light_fleet(&trajectory, 0), 100.0);
        assert_approx_eq!(f64, light_fleet(&trajectory, 10), 500.0);
    }

    #[rstest]
    fn test_bounded_by_population(
        mut linear_params: AdoptionParameters,
        simple_grid: TimeGrid,
        region_data: RegionData,
    ) {
        linear_params.initial_share = Some(0.9);
        linear_params.final_share = 1.0;
        let trajectory = project_adoption(&linear_params, &simple_grid, &region_data).unwrap();
        assert!(
            trajectory.classes[&VehicleClass::Light]
                .fleet
                .iter()
                .all(|fleet| (0.0..=1000.0).contains(fleet))
        );
    }

    #[rstest]
    fn test_vehicle_classes(
        mut linear_params: AdoptionParameters,
        simple_grid: TimeGrid,
        mut region_data: RegionData,
    ) {
        region_data
            .fleets
            .insert(VehicleClass::Heavy, Fleet::new(100.0, Some(2.0)));
        linear_params.initial_share = None;
        linear_params.classes.insert(
            VehicleClass::Heavy,
            ClassShares {
                final_share: Some(0.1),
                ..Default::default()
            },
        );
        let trajectory = project_adoption(&linear_params, &simple_grid, &region_data).unwrap();

        assert_approx_eq!(f64, trajectory.fleet_at(VehicleClass::Heavy, 0), 2.0);
        assert_approx_eq!(f64, trajectory.fleet_at(VehicleClass::Heavy, 10), 10.0);
        assert_approx_eq!(f64, light_fleet(&trajectory, 10), 500.0);
        assert_approx_eq!(f64, trajectory.total_fleet_at(10), 510.0);

        let energy = VehicleEnergy::new(
            [
                (VehicleClass::Light, Energy(5.0)),
                (VehicleClass::Heavy, Energy(200.0)),
            ]
            .into_iter()
            .collect(),
        );
        assert_approx_eq!(
            Energy,
            trajectory.daily_energy_at(&energy, 10),
            Energy(500.0 * 5.0 + 10.0 * 200.0)
        );
    }

    #[rstest]
    fn test_no_heavy_fleet(
        linear_params: AdoptionParameters,
        simple_grid: TimeGrid,
        region_data: RegionData,
    ) {
        let trajectory = project_adoption(&linear_params, &simple_grid, &region_data).unwrap();
        assert!(!trajectory.classes.contains_key(&VehicleClass::Heavy));
        assert_eq!(trajectory.fleet_at(VehicleClass::Heavy, 10), 0.0);
    }

    #[test]
    fn test_instantaneous_adoption() {
        let at = datetime("2025-01-01T05:00:00");
        let curve = AdoptionCurve::Linear;
        assert_eq!(curve.progress(datetime("2025-01-01T04:00:00"), at, at), 0.0);
        assert_eq!(curve.progress(at, at, at), 1.0);
    }
}
