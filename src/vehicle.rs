//! Vehicle classes and the energy drawn by EVs of each class.
//!
//! Light vehicles (cars, vans) and heavy vehicles (trucks, buses) are adopted at different rates
//! and use very different amounts of energy per day, so each region's fleet is tracked per class.
use crate::units::{Distance, Energy, EnergyPerDistance};
use indexmap::IndexMap;
use serde::Serialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use strum::EnumIter;

/// A class of road vehicle
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    EnumIter,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum VehicleClass {
    /// Cars, vans and other light vehicles
    #[default]
    #[string = "light"]
    Light,
    /// Trucks, buses and other heavy vehicles
    #[string = "heavy"]
    Heavy,
}

impl VehicleClass {
    /// Typical energy used per km driven by an EV of this class
    pub fn default_efficiency(self) -> EnergyPerDistance {
        match self {
            Self::Light => EnergyPerDistance(0.18),
            Self::Heavy => EnergyPerDistance(0.80),
        }
    }

    /// Typical distance driven per day by a vehicle of this class
    pub fn default_daily_distance(self) -> Distance {
        match self {
            Self::Light => Distance(30.0),
            Self::Heavy => Distance(300.0),
        }
    }
}

/// Charging energy drawn per EV per day, for every vehicle class
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VehicleEnergy(IndexMap<VehicleClass, Energy>);

impl VehicleEnergy {
    /// Create a new [`VehicleEnergy`] from the daily energy for each class
    pub fn new(daily_energy: IndexMap<VehicleClass, Energy>) -> Self {
        Self(daily_energy)
    }

    /// Daily charging energy per EV of the given class (zero for classes with no entry)
    pub fn daily_energy(&self, class: VehicleClass) -> Energy {
        self.0.get(&class).copied().unwrap_or(Energy::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(VehicleClass::Light, 5.4)]
    #[case(VehicleClass::Heavy, 240.0)]
    fn test_default_daily_energy(#[case] class: VehicleClass, #[case] expected: f64) {
        let energy = class.default_efficiency() * class.default_daily_distance();
        assert_approx_eq!(Energy, energy, Energy(expected), epsilon = 1e-9);
    }

    #[test]
    fn test_labels() {
        assert_eq!(VehicleClass::Heavy.to_string(), "heavy");
        let energy: IndexMap<VehicleClass, Energy> =
            toml::from_str("light = 5.0\nheavy = 200.0").unwrap();
        assert_eq!(energy[&VehicleClass::Heavy], Energy(200.0));
    }

    #[test]
    fn test_daily_energy() {
        let energy =
            VehicleEnergy::new([(VehicleClass::Heavy, Energy(200.0))].into_iter().collect());
        assert_eq!(energy.daily_energy(VehicleClass::Heavy), Energy(200.0));
        assert_eq!(energy.daily_energy(VehicleClass::Light), Energy::ZERO);
    }
}
