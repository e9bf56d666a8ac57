//! Scenario configuration: the validated, immutable description of a single simulation run.
//!
//! Scenarios are read from TOML files into a [`RawScenario`], which has defaults for every optional
//! parameter. A [`ScenarioConfig`] can only be constructed by validating a [`RawScenario`], so a
//! config which exists is always valid.
use crate::adoption::{
    AdoptionCurve, AdoptionCurveKind, AdoptionOverride, AdoptionParameters, ClassShares,
};
use crate::aggregate::{ShortfallParameters, ShortfallPolicy};
use crate::charging::{ChargingBehaviour, ChargingMix};
use crate::error::ConfigError;
use crate::infrastructure::{CapacityChange, InfrastructureSchedule};
use crate::input::{input_err_msg, read_toml};
use crate::region::{RegionID, parse_region_selection};
use crate::time_grid::{Horizon, MINUTES_PER_DAY, TimeGrid};
use crate::units::{Distance, Energy, EnergyPerDistance, Power};
use crate::vehicle::{VehicleClass, VehicleEnergy};
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Timelike};
use indexmap::{IndexMap, IndexSet};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::Path;
use strum::IntoEnumIterator;

/// Region ID used in scenario files to refer to every selected region
const ALL_REGIONS: &str = "all";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_regions, String, ALL_REGIONS.to_string());
define_param_default!(default_step_minutes, u32, 60);
define_param_default!(default_growth_rate, f64, 0.5);
define_param_default!(default_compliance, f64, 1.0);
define_param_default!(
    default_mix,
    IndexMap<ChargingBehaviour, f64>,
    [(ChargingBehaviour::HomeOvernight, 1.0)].into_iter().collect()
);

/// The contents of a scenario file, before validation
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawScenario {
    /// A short description of the scenario
    #[serde(default)]
    pub description: String,
    /// Which regions to simulate: "all" or a semicolon-separated list of region IDs
    #[serde(default = "default_regions")]
    pub regions: String,
    /// The simulation horizon
    pub horizon: RawHorizon,
    /// EV adoption parameters
    #[serde(default)]
    pub adoption: RawAdoption,
    /// Vehicle energy use for each class
    #[serde(default)]
    pub vehicle: IndexMap<VehicleClass, RawVehicleClass>,
    /// Charging behaviour
    #[serde(default)]
    pub charging: RawCharging,
    /// Charging capacity changes
    #[serde(default)]
    pub infrastructure: Vec<RawCapacityEntry>,
    /// How to handle demand exceeding charging capacity
    #[serde(default)]
    pub shortfall: RawShortfall,
}

/// The simulation horizon, as given in scenario files
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawHorizon {
    /// The first time step
    pub start: NaiveDateTime,
    /// The end of the horizon (exclusive)
    pub end: NaiveDateTime,
    /// Step size in minutes
    #[serde(default = "default_step_minutes")]
    pub step_minutes: u32,
}

/// Adoption parameters, as given in scenario files
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawAdoption {
    /// The shape of the adoption curve
    #[serde(default)]
    pub curve: AdoptionCurveKind,
    /// EV share at the start of adoption (defaults to the current share in the data)
    pub initial_share: Option<f64>,
    /// EV share at the end of adoption
    #[serde(default)]
    pub final_share: f64,
    /// Start of adoption (defaults to the horizon start)
    pub start: Option<NaiveDateTime>,
    /// End of adoption (defaults to the last step of the horizon)
    pub end: Option<NaiveDateTime>,
    /// Growth rate per year, for logistic curves
    #[serde(default = "default_growth_rate")]
    pub growth_rate: f64,
    /// Time of fastest growth, for logistic curves (defaults to the midpoint)
    pub inflection: Option<NaiveDateTime>,
    /// Shares for particular vehicle classes, replacing the general shares
    #[serde(default)]
    pub classes: IndexMap<VehicleClass, ClassShares>,
    /// Per-region overrides
    #[serde(default)]
    pub overrides: IndexMap<String, RawAdoptionOverride>,
}

impl Default for RawAdoption {
    fn default() -> Self {
        Self {
            curve: AdoptionCurveKind::default(),
            initial_share: None,
            final_share: 0.0,
            start: None,
            end: None,
            growth_rate: default_growth_rate(),
            inflection: None,
            classes: IndexMap::new(),
            overrides: IndexMap::new(),
        }
    }
}

/// Per-region adoption overrides, as given in scenario files
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawAdoptionOverride {
    /// Replacement curve shape
    pub curve: Option<AdoptionCurveKind>,
    /// Replacement logistic growth rate
    pub growth_rate: Option<f64>,
    /// Replacement initial share
    pub initial_share: Option<f64>,
    /// Replacement final share
    pub final_share: Option<f64>,
}

/// Energy use for one class of vehicle, as given in scenario files.
///
/// Missing values take the typical figures for the class.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawVehicleClass {
    /// Charging energy per EV per day. If absent, calculated from efficiency and distance.
    pub daily_energy_kwh: Option<f64>,
    /// Energy used per km driven
    pub efficiency_kwh_per_km: Option<f64>,
    /// Average distance driven per day
    pub daily_distance_km: Option<f64>,
}

/// Charging behaviour, as given in scenario files
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawCharging {
    /// Share of owners who follow the behaviour mix
    #[serde(default = "default_compliance")]
    pub compliance: f64,
    /// Share of owners following each behaviour
    #[serde(default = "default_mix")]
    pub mix: IndexMap<ChargingBehaviour, f64>,
    /// Per-region replacement mixes
    #[serde(default)]
    pub overrides: IndexMap<String, IndexMap<ChargingBehaviour, f64>>,
}

impl Default for RawCharging {
    fn default() -> Self {
        Self {
            compliance: default_compliance(),
            mix: default_mix(),
            overrides: IndexMap::new(),
        }
    }
}

/// A charging capacity entry, as given in scenario files
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawCapacityEntry {
    /// The region the entry applies to, or "all"
    #[serde(default = "default_regions")]
    pub region: String,
    /// When the capacity takes effect
    pub from: NaiveDateTime,
    /// Available charging capacity in kW
    pub capacity_kw: f64,
}

/// Shortfall handling, as given in scenario files
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawShortfall {
    /// What to do with excess demand
    #[serde(default)]
    pub policy: ShortfallPolicy,
    /// Maximum number of steps demand can be deferred by
    pub max_deferral_steps: Option<u32>,
}

/// A validated scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioConfig {
    description: String,
    regions: IndexSet<RegionID>,
    horizon: Horizon,
    adoption: AdoptionParameters,
    vehicle_energy: VehicleEnergy,
    compliance: f64,
    charging_mix: ChargingMix,
    charging_overrides: IndexMap<RegionID, ChargingMix>,
    infrastructure: InfrastructureSchedule,
    shortfall: ShortfallParameters,
}

impl ScenarioConfig {
    /// Validate a raw scenario.
    ///
    /// # Arguments
    ///
    /// * `raw` - The scenario as read from file
    /// * `known_regions` - IDs of all regions for which baseline data is available
    ///
    /// # Returns
    ///
    /// A valid [`ScenarioConfig`] or the first problem found with the scenario
    pub fn new(raw: RawScenario, known_regions: &IndexSet<RegionID>) -> Result<Self, ConfigError> {
        let regions = parse_region_selection(&raw.regions, known_regions)?;
        let horizon = check_horizon(&raw.horizon)?;
        let adoption = check_adoption(&raw.adoption, &horizon, &regions, known_regions)?;
        let vehicle_energy = check_vehicle(&raw.vehicle)?;
        check_share("compliance", raw.charging.compliance)?;
        let charging_mix = ChargingMix::new(raw.charging.mix, "all regions")?;
        let charging_overrides =
            check_charging_overrides(raw.charging.overrides, &regions, known_regions)?;
        let infrastructure = check_infrastructure(&raw.infrastructure, &regions, known_regions)?;
        let shortfall = check_shortfall(&raw.shortfall)?;

        Ok(Self {
            description: raw.description,
            regions,
            horizon,
            adoption,
            vehicle_energy,
            compliance: raw.charging.compliance,
            charging_mix,
            charging_overrides,
            infrastructure,
            shortfall,
        })
    }

    /// Read and validate a scenario file.
    ///
    /// # Arguments
    ///
    /// * `file_path` - Path to the scenario TOML file
    /// * `known_regions` - IDs of all regions for which baseline data is available
    pub fn from_path(file_path: &Path, known_regions: &IndexSet<RegionID>) -> Result<Self> {
        let raw: RawScenario = read_toml(file_path)?;
        let config = Self::new(raw, known_regions).with_context(|| input_err_msg(file_path))?;
        Ok(config)
    }

    /// A short description of the scenario
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The selected regions, in the order they were given
    pub fn regions(&self) -> &IndexSet<RegionID> {
        &self.regions
    }

    /// The simulation horizon
    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    /// The time grid for the horizon
    pub fn grid(&self) -> TimeGrid {
        TimeGrid::new(&self.horizon)
    }

    /// Adoption parameters
    pub fn adoption(&self) -> &AdoptionParameters {
        &self.adoption
    }

    /// Charging energy per EV per day for each vehicle class
    pub fn vehicle_energy(&self) -> &VehicleEnergy {
        &self.vehicle_energy
    }

    /// Share of owners who follow the charging mix
    pub fn compliance(&self) -> f64 {
        self.compliance
    }

    /// The charging mix for a region, taking overrides into account
    pub fn mix_for(&self, region_id: &RegionID) -> &ChargingMix {
        self.charging_overrides
            .get(region_id)
            .unwrap_or(&self.charging_mix)
    }

    /// The charging capacity schedule
    pub fn infrastructure(&self) -> &InfrastructureSchedule {
        &self.infrastructure
    }

    /// Shortfall handling parameters
    pub fn shortfall(&self) -> ShortfallParameters {
        self.shortfall
    }
}

/// Check that a share lies in [0, 1]
fn check_share(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ShareOutOfRange {
            name: name.to_string(),
            value,
        })
    }
}

/// Check that a value is finite and strictly positive
fn check_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive {
            name: name.to_string(),
            value,
        })
    }
}

/// Look up a region named in a scenario file.
///
/// Returns `None` (with a warning) for regions which are known but not selected.
fn check_region(
    id: &str,
    what: &str,
    regions: &IndexSet<RegionID>,
    known_regions: &IndexSet<RegionID>,
) -> Result<Option<RegionID>, ConfigError> {
    if let Some(id) = regions.get(id) {
        return Ok(Some(id.clone()));
    }
    if known_regions.contains(id) {
        warn!("Ignoring {what} for region {id}, which is not selected");
        return Ok(None);
    }

    Err(ConfigError::UnknownRegion(id.to_string()))
}

/// Check the horizon is a non-empty span of time with a step size which divides a day
fn check_horizon(raw: &RawHorizon) -> Result<Horizon, ConfigError> {
    let step = raw.step_minutes;
    if step == 0 {
        return Err(ConfigError::NonPositiveStepSize);
    }
    if MINUTES_PER_DAY % step != 0 {
        return Err(ConfigError::StepSizeNotDivisorOfDay(step));
    }

    let minute_of_day = raw.start.hour() * 60 + raw.start.minute();
    if raw.start.second() != 0 || raw.start.nanosecond() != 0 || minute_of_day % step != 0 {
        return Err(ConfigError::StartNotAligned(raw.start));
    }

    if raw.start > raw.end {
        return Err(ConfigError::StartAfterEnd {
            start: raw.start,
            end: raw.end,
        });
    }
    if raw.start == raw.end {
        return Err(ConfigError::NonPositiveHorizon);
    }

    Ok(Horizon {
        start: raw.start,
        end: raw.end,
        step_minutes: step,
    })
}

/// Build an adoption curve of the given kind
fn make_curve(
    kind: AdoptionCurveKind,
    growth_rate: f64,
    inflection: NaiveDateTime,
) -> Result<AdoptionCurve, ConfigError> {
    match kind {
        AdoptionCurveKind::Linear => Ok(AdoptionCurve::Linear),
        AdoptionCurveKind::Logistic => {
            check_positive("growth_rate", growth_rate)?;
            Ok(AdoptionCurve::Logistic {
                growth_rate,
                inflection,
            })
        }
    }
}

/// Check adoption parameters, filling in defaults from the horizon.
///
/// By default adoption runs from the first step of the horizon to the last, so that the final
/// share is reached within the simulated period.
fn check_adoption(
    raw: &RawAdoption,
    horizon: &Horizon,
    regions: &IndexSet<RegionID>,
    known_regions: &IndexSet<RegionID>,
) -> Result<AdoptionParameters, ConfigError> {
    let start = raw.start.unwrap_or(horizon.start);
    let end = raw.end.unwrap_or_else(|| {
        let grid = TimeGrid::new(horizon);
        grid.time(grid.n_steps().saturating_sub(1))
    });
    if start > end {
        return Err(ConfigError::AdoptionStartAfterEnd { start, end });
    }

    if let Some(initial_share) = raw.initial_share {
        check_share("initial_share", initial_share)?;
    }
    check_share("final_share", raw.final_share)?;
    for (class, shares) in &raw.classes {
        if let Some(initial_share) = shares.initial_share {
            check_share(&format!("initial_share for {class} vehicles"), initial_share)?;
        }
        if let Some(final_share) = shares.final_share {
            check_share(&format!("final_share for {class} vehicles"), final_share)?;
        }
    }

    let inflection = raw.inflection.unwrap_or(start + (end - start) / 2);
    let curve = make_curve(raw.curve, raw.growth_rate, inflection)?;

    let mut overrides = IndexMap::new();
    for (id, raw_override) in &raw.overrides {
        let Some(region_id) = check_region(id, "adoption override", regions, known_regions)?
        else {
            continue;
        };

        let context = |name| format!("{name} for region {region_id}");
        if let Some(initial_share) = raw_override.initial_share {
            check_share(&context("initial_share"), initial_share)?;
        }
        if let Some(final_share) = raw_override.final_share {
            check_share(&context("final_share"), final_share)?;
        }

        let curve = if raw_override.curve.is_some() || raw_override.growth_rate.is_some() {
            Some(make_curve(
                raw_override.curve.unwrap_or(raw.curve),
                raw_override.growth_rate.unwrap_or(raw.growth_rate),
                inflection,
            )?)
        } else {
            None
        };

        overrides.insert(
            region_id,
            AdoptionOverride {
                curve,
                initial_share: raw_override.initial_share,
                final_share: raw_override.final_share,
            },
        );
    }

    Ok(AdoptionParameters {
        curve,
        initial_share: raw.initial_share,
        final_share: raw.final_share,
        start,
        end,
        classes: raw.classes.clone(),
        overrides,
    })
}

/// Work out the daily charging energy per vehicle for every class
fn check_vehicle(
    raw: &IndexMap<VehicleClass, RawVehicleClass>,
) -> Result<VehicleEnergy, ConfigError> {
    let mut daily_energy = IndexMap::new();
    for class in VehicleClass::iter() {
        let raw = raw.get(&class).cloned().unwrap_or_default();
        let context = |name| format!("{name} for {class} vehicles");
        if let Some(energy) = raw.daily_energy_kwh {
            check_positive(&context("daily_energy_kwh"), energy)?;
            daily_energy.insert(class, Energy(energy));
            continue;
        }

        let efficiency = raw
            .efficiency_kwh_per_km
            .map_or(class.default_efficiency(), EnergyPerDistance);
        let distance = raw
            .daily_distance_km
            .map_or(class.default_daily_distance(), Distance);
        check_positive(&context("efficiency_kwh_per_km"), efficiency.value())?;
        check_positive(&context("daily_distance_km"), distance.value())?;

        // The product of two large values can still overflow
        let energy = efficiency * distance;
        check_positive(&context("daily energy"), energy.value())?;
        daily_energy.insert(class, energy);
    }

    Ok(VehicleEnergy::new(daily_energy))
}

/// Check per-region charging mixes
fn check_charging_overrides(
    raw: IndexMap<String, IndexMap<ChargingBehaviour, f64>>,
    regions: &IndexSet<RegionID>,
    known_regions: &IndexSet<RegionID>,
) -> Result<IndexMap<RegionID, ChargingMix>, ConfigError> {
    let mut overrides = IndexMap::new();
    for (id, shares) in raw {
        let Some(region_id) = check_region(&id, "charging override", regions, known_regions)?
        else {
            continue;
        };
        let mix = ChargingMix::new(shares, &format!("region {region_id}"))?;
        overrides.insert(region_id, mix);
    }

    Ok(overrides)
}

/// Build the infrastructure schedule for the selected regions.
///
/// Entries for "all" apply to every selected region. Where a region has its own entry at the same
/// time as an "all" entry, the region's own entry takes precedence.
fn check_infrastructure(
    entries: &[RawCapacityEntry],
    regions: &IndexSet<RegionID>,
    known_regions: &IndexSet<RegionID>,
) -> Result<InfrastructureSchedule, ConfigError> {
    let mut shared = BTreeMap::new();
    let mut specific: IndexMap<RegionID, BTreeMap<NaiveDateTime, Power>> = IndexMap::new();

    for entry in entries {
        if !entry.capacity_kw.is_finite() || entry.capacity_kw < 0.0 {
            return Err(ConfigError::Negative {
                name: format!("capacity_kw for region {}", entry.region),
                value: entry.capacity_kw,
            });
        }

        let (map, region_id) = if entry.region.eq_ignore_ascii_case(ALL_REGIONS) {
            (&mut shared, RegionID::new(ALL_REGIONS))
        } else {
            let Some(region_id) =
                check_region(&entry.region, "capacity entry", regions, known_regions)?
            else {
                continue;
            };
            (specific.entry(region_id.clone()).or_default(), region_id)
        };

        match map.entry(entry.from) {
            Entry::Vacant(slot) => {
                slot.insert(Power(entry.capacity_kw));
            }
            Entry::Occupied(_) => {
                return Err(ConfigError::DuplicateCapacityEntry {
                    region: region_id,
                    time: entry.from,
                });
            }
        }
    }

    let mut schedule = IndexMap::new();
    for region_id in regions {
        let mut merged = shared.clone();
        if let Some(own) = specific.get(region_id) {
            merged.extend(own.iter().map(|(time, capacity)| (*time, *capacity)));
        }
        if merged.is_empty() {
            continue;
        }

        let changes = merged
            .into_iter()
            .map(|(from, capacity)| CapacityChange { from, capacity })
            .collect();
        schedule.insert(region_id.clone(), changes);
    }

    Ok(InfrastructureSchedule::new(schedule))
}

/// Check shortfall handling parameters
fn check_shortfall(raw: &RawShortfall) -> Result<ShortfallParameters, ConfigError> {
    if raw.max_deferral_steps == Some(0) {
        return Err(ConfigError::ZeroMaxDeferral);
    }
    if raw.policy == ShortfallPolicy::Drop && raw.max_deferral_steps.is_some() {
        warn!("max_deferral_steps has no effect when the shortfall policy is \"drop\"");
    }

    Ok(ShortfallParameters {
        policy: raw.policy,
        max_deferral_steps: raw.max_deferral_steps,
    })
}
