//! Code for generating intraday charging profiles from a mix of charging behaviours.
//!
//! Each [`ChargingBehaviour`] has a base shape, given as relative weights for each hour of the
//! day. A [`ChargingProfile`] is the mix-weighted combination of these shapes, resampled onto the
//! time-of-day slots of the simulation and normalised so that it sums to one over a day.
use crate::error::ConfigError;
use float_cmp::approx_eq;
use indexmap::IndexMap;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use strum::EnumIter;

/// The tolerance used when checking that behaviour shares sum to one
pub const SHARE_SUM_TOLERANCE: f64 = 1e-6;

/// Hourly weights for overnight home charging (18:00 to 07:00)
const HOME_OVERNIGHT_WEIGHTS: [f64; 24] = [
    1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, // 00:00-07:00
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, // 07:00-18:00
    1.0, 1.0, 1.0, 1.0, 1.0, 1.0, // 18:00-24:00
];

/// Hourly weights for workplace charging during the working day (08:00 to 17:00)
const WORKPLACE_DAYTIME_WEIGHTS: [f64; 24] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, // 00:00-08:00
    1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, // 08:00-17:00
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, // 17:00-24:00
];

/// Hourly weights for public charging, which peaks around midday and in the early evening
const PUBLIC_OPPORTUNISTIC_WEIGHTS: [f64; 24] = [
    0.2, 0.1, 0.1, 0.1, 0.1, 0.2, 0.4, 0.6, 0.8, 1.0, 1.1, 1.2, //
    1.3, 1.2, 1.1, 1.0, 1.1, 1.3, 1.4, 1.2, 0.9, 0.6, 0.4, 0.3,
];

/// Hourly weights for charging spread evenly over the day
const UNIFORM_WEIGHTS: [f64; 24] = [1.0; 24];

/// A category of charging behaviour
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum ChargingBehaviour {
    /// Charging at home, overnight
    #[string = "home_overnight"]
    HomeOvernight,
    /// Charging at the workplace, during the day
    #[string = "workplace_daytime"]
    WorkplaceDaytime,
    /// Charging at public chargers whenever convenient
    #[string = "public_opportunistic"]
    PublicOpportunistic,
    /// Charging with no preferred time of day
    #[string = "uniform"]
    Uniform,
}

impl ChargingBehaviour {
    /// The relative charging weight for each hour of the day
    fn hourly_weights(self) -> &'static [f64; 24] {
        match self {
            Self::HomeOvernight => &HOME_OVERNIGHT_WEIGHTS,
            Self::WorkplaceDaytime => &WORKPLACE_DAYTIME_WEIGHTS,
            Self::PublicOpportunistic => &PUBLIC_OPPORTUNISTIC_WEIGHTS,
            Self::Uniform => &UNIFORM_WEIGHTS,
        }
    }

    /// The base shape for this behaviour, resampled onto `steps_per_day` slots
    pub fn base_shape(self, steps_per_day: usize) -> ChargingProfile {
        resample_hourly_weights(self.hourly_weights(), steps_per_day)
    }
}

/// The share of EV owners following each charging behaviour.
///
/// Shares are guaranteed to lie in [0, 1] and to sum to one within [`SHARE_SUM_TOLERANCE`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct ChargingMix(IndexMap<ChargingBehaviour, f64>);

impl ChargingMix {
    /// Create a new, validated [`ChargingMix`].
    ///
    /// # Arguments
    ///
    /// * `shares` - Share of owners for each behaviour
    /// * `context` - Describes where the mix came from, for error messages
    pub fn new(
        shares: IndexMap<ChargingBehaviour, f64>,
        context: &str,
    ) -> Result<Self, ConfigError> {
        if shares.is_empty() {
            return Err(ConfigError::EmptyMix(context.to_string()));
        }

        for (behaviour, share) in &shares {
            if !(0.0..=1.0).contains(share) {
                return Err(ConfigError::ShareOutOfRange {
                    name: format!("Share of {behaviour} charging for {context}"),
                    value: *share,
                });
            }
        }

        let sum: f64 = shares.values().sum();
        if !approx_eq!(f64, sum, 1.0, epsilon = SHARE_SUM_TOLERANCE) {
            return Err(ConfigError::SharesDoNotSumToOne {
                context: context.to_string(),
                sum,
            });
        }

        Ok(Self(shares))
    }

    /// A mix in which everyone follows a single behaviour
    pub fn single(behaviour: ChargingBehaviour) -> Self {
        Self([(behaviour, 1.0)].into_iter().collect())
    }

    /// The share for the given behaviour (zero if absent)
    pub fn share(&self, behaviour: ChargingBehaviour) -> f64 {
        self.0.get(&behaviour).copied().unwrap_or(0.0)
    }

    /// Iterate over behaviours and their shares
    pub fn iter(&self) -> impl Iterator<Item = (ChargingBehaviour, f64)> + '_ {
        self.0.iter().map(|(behaviour, share)| (*behaviour, *share))
    }
}

/// A normalised intraday charging shape.
///
/// Holds the fraction of a day's charging energy drawn in each time-of-day slot. Fractions are
/// non-negative and sum to one.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingProfile {
    fractions: Vec<f64>,
}

impl ChargingProfile {
    /// The fraction of daily charging energy drawn in the given slot
    pub fn fraction(&self, slot: usize) -> f64 {
        self.fractions[slot]
    }

    /// The number of time-of-day slots
    pub fn steps_per_day(&self) -> usize {
        self.fractions.len()
    }

    /// The fractions for each slot
    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    /// The sum of all fractions (one, up to rounding error)
    pub fn total(&self) -> f64 {
        self.fractions.iter().sum()
    }

    /// Build a profile from arbitrary non-negative weights, normalising them to sum to one.
    ///
    /// If the weights sum to zero, a flat profile is returned instead.
    fn from_weights(weights: Vec<f64>) -> Self {
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            let n = weights.len();
            return Self {
                fractions: vec![1.0 / n as f64; n],
            };
        }

        Self {
            fractions: weights.into_iter().map(|w| w.max(0.0) / total).collect(),
        }
    }
}

/// Resample hourly weights onto `steps_per_day` equal slots.
///
/// Weights are integrated at minute resolution, so slots which don't line up with whole hours
/// (e.g. 45-minute steps) get the correct share of each hour.
fn resample_hourly_weights(hourly: &[f64; 24], steps_per_day: usize) -> ChargingProfile {
    let minutes_per_slot = 24 * 60 / steps_per_day;
    let weights = (0..steps_per_day)
        .map(|slot| {
            let first = slot * minutes_per_slot;
            (first..first + minutes_per_slot)
                .map(|minute| hourly[minute / 60])
                .sum::<f64>()
        })
        .collect();

    ChargingProfile::from_weights(weights)
}

/// Generate the charging profile for a behaviour mix.
///
/// The profile is a weighted sum of the base shapes of each behaviour in the mix. Owners who don't
/// comply with the mix (a share of `1 - compliance`) are assumed to charge uniformly over the day.
///
/// # Arguments
///
/// * `mix` - The share of owners following each behaviour
/// * `compliance` - The share of owners who follow the mix, in [0, 1]
/// * `steps_per_day` - The number of time-of-day slots in the profile
pub fn generate_profile(
    mix: &ChargingMix,
    compliance: f64,
    steps_per_day: usize,
) -> ChargingProfile {
    let mut weights = vec![0.0; steps_per_day];
    let mut add_shape = |behaviour: ChargingBehaviour, weight: f64| {
        // Zero-weighted behaviours contribute nothing
        if weight <= 0.0 {
            return;
        }

        let shape = behaviour.base_shape(steps_per_day);
        for (total, fraction) in weights.iter_mut().zip(shape.fractions()) {
            *total += weight * fraction;
        }
    };

    for (behaviour, share) in mix.iter() {
        add_shape(behaviour, compliance * share);
    }
    add_shape(ChargingBehaviour::Uniform, 1.0 - compliance);

    ChargingProfile::from_weights(weights)
}

#[cfg(test)]
mod tests {
    use super::ChargingBehaviour::*;
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    fn mix(shares: &[(ChargingBehaviour, f64)]) -> ChargingMix {
        ChargingMix::new(shares.iter().copied().collect(), "test").unwrap()
    }

    #[rstest]
    #[case(24)]
    #[case(48)]
    #[case(96)]
    #[case(32)] // 45-minute steps
    #[case(1)]
    fn test_base_shapes_normalised(#[case] steps_per_day: usize) {
        for behaviour in ChargingBehaviour::iter() {
            let shape = behaviour.base_shape(steps_per_day);
            assert_eq!(shape.steps_per_day(), steps_per_day);
            assert_approx_eq!(f64, shape.total(), 1.0, epsilon = 1e-9);
            assert!(shape.fractions().iter().all(|f| *f >= 0.0));
        }
    }

    #[test]
    fn test_home_overnight_shape() {
        // 13 charging hours between 18:00 and 07:00
        let shape = ChargingBehaviour::HomeOvernight.base_shape(24);
        assert_approx_eq!(f64, shape.fraction(0), 1.0 / 13.0, epsilon = 1e-12);
        assert_approx_eq!(f64, shape.fraction(12), 0.0);
        assert_approx_eq!(f64, shape.fraction(18), 1.0 / 13.0, epsilon = 1e-12);
    }

    #[test]
    fn test_half_hourly_workplace_shape() {
        let shape = ChargingBehaviour::WorkplaceDaytime.base_shape(48);
        assert_approx_eq!(f64, shape.fraction(15), 0.0); // 07:30
        assert_approx_eq!(f64, shape.fraction(16), 1.0 / 18.0, epsilon = 1e-12); // 08:00
        assert_approx_eq!(f64, shape.fraction(33), 1.0 / 18.0, epsilon = 1e-12); // 16:30
        assert_approx_eq!(f64, shape.fraction(34), 0.0); // 17:00
    }

    #[rstest]
    #[case(&[(HomeOvernight, 1.0)], 1.0)]
    #[case(&[(HomeOvernight, 0.5), (WorkplaceDaytime, 0.5)], 1.0)]
    #[case(&[(HomeOvernight, 0.2), (WorkplaceDaytime, 0.3), (PublicOpportunistic, 0.5)], 0.6)]
    #[case(&[(HomeOvernight, 1.0), (WorkplaceDaytime, 0.0)], 0.0)]
    #[case(&[(PublicOpportunistic, 0.7), (Uniform, 0.3)], 0.25)]
    fn test_generate_profile_normalised(
        #[case] shares: &[(ChargingBehaviour, f64)],
        #[case] compliance: f64,
    ) {
        for steps_per_day in [24, 48, 288] {
            let profile = generate_profile(&mix(shares), compliance, steps_per_day);
            assert_approx_eq!(f64, profile.total(), 1.0, epsilon = 1e-6);
            assert!(profile.fractions().iter().all(|f| *f >= 0.0));
        }
    }

    #[rstest]
    #[case(HomeOvernight, "home_overnight")]
    #[case(PublicOpportunistic, "public_opportunistic")]
    fn test_behaviour_labels(#[case] behaviour: ChargingBehaviour, #[case] label: &str) {
        assert_eq!(behaviour.to_string(), label);
        let mix: IndexMap<ChargingBehaviour, f64> =
            toml::from_str(&format!("{label} = 1.0")).unwrap();
        assert_eq!(mix[&behaviour], 1.0);
    }

    #[test]
    fn test_zero_weight_behaviour_contributes_nothing() {
        let with_zero = generate_profile(
            &mix(&[
                (ChargingBehaviour::HomeOvernight, 1.0),
                (ChargingBehaviour::WorkplaceDaytime, 0.0),
            ]),
            1.0,
            24,
        );
        let without = generate_profile(&ChargingMix::single(HomeOvernight), 1.0, 24);
        assert_eq!(with_zero, without);
    }

    #[test]
    fn test_non_compliance_spreads_demand() {
        let profile = generate_profile(&ChargingMix::single(HomeOvernight), 0.5, 24);

        // Midday gets only the uniform, non-compliant half of demand
        assert_approx_eq!(f64, profile.fraction(12), 0.5 / 24.0, epsilon = 1e-12);
        assert_approx_eq!(f64, profile.fraction(0), 0.5 / 13.0 + 0.5 / 24.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mix_new_invalid() {
        assert_eq!(
            ChargingMix::new(IndexMap::new(), "test").unwrap_err(),
            ConfigError::EmptyMix("test".into())
        );
        assert!(matches!(
            ChargingMix::new(
                [(ChargingBehaviour::HomeOvernight, 1.2)].into_iter().collect(),
                "test"
            ),
            Err(ConfigError::ShareOutOfRange { .. })
        ));
        assert!(matches!(
            ChargingMix::new(
                [
                    (ChargingBehaviour::HomeOvernight, 0.6),
                    (ChargingBehaviour::WorkplaceDaytime, 0.6)
                ]
                .into_iter()
                .collect(),
                "test"
            ),
            Err(ConfigError::SharesDoNotSumToOne { .. })
        ));
    }

    #[test]
    fn test_mix_within_tolerance() {
        assert!(
            ChargingMix::new(
                [
                    (ChargingBehaviour::HomeOvernight, 0.5),
                    (ChargingBehaviour::WorkplaceDaytime, 0.5 + 5e-7)
                ]
                .into_iter()
                .collect(),
                "test"
            )
            .is_ok()
        );
    }
}
