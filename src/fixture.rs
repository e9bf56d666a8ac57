//! Fixtures for tests
use crate::data::{BaselineData, Fleet, RegionData};
use crate::region::{Region, RegionID};
use crate::scenario::{RawHorizon, RawScenario};
use crate::time_grid::{Horizon, TimeGrid};
use crate::units::Energy;
use crate::vehicle::VehicleClass;
use chrono::NaiveDateTime;
use indexmap::IndexSet;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Parse a time in ISO 8601 format (e.g. "2025-01-01T00:00:00")
pub fn datetime(s: &str) -> NaiveDateTime {
    s.parse().unwrap()
}

#[fixture]
pub fn region_ids() -> IndexSet<RegionID> {
    ["AKL".into(), "WLG".into()].into_iter().collect()
}

/// Two days at hourly resolution, starting at midnight on 1 January 2025
#[fixture]
pub fn simple_grid() -> TimeGrid {
    TimeGrid::new(&Horizon {
        start: datetime("2025-01-01T00:00:00"),
        end: datetime("2025-01-03T00:00:00"),
        step_minutes: 60,
    })
}

/// A region with 1000 light vehicles and a flat baseline of 100 kWh per step
#[fixture]
pub fn region_data(simple_grid: TimeGrid) -> RegionData {
    let region = Region {
        id: "NZ".into(),
        description: "New Zealand".into(),
    };
    let fleets = [(VehicleClass::Light, Fleet::new(1000.0, None))]
        .into_iter()
        .collect();
    let mut data = RegionData::new(region, fleets);
    data.baseline_demand = simple_grid
        .iter()
        .map(|(_, time)| (time, Energy(100.0)))
        .collect();
    data
}

#[fixture]
pub fn baseline_data(region_data: RegionData) -> BaselineData {
    BaselineData::new([(region_data.region.id.clone(), region_data)].into_iter().collect())
}

/// A scenario covering the same two days as [`simple_grid`], with defaults for everything else
#[fixture]
pub fn raw_scenario() -> RawScenario {
    RawScenario {
        description: String::new(),
        regions: "all".into(),
        horizon: RawHorizon {
            start: datetime("2025-01-01T00:00:00"),
            end: datetime("2025-01-03T00:00:00"),
            step_minutes: 60,
        },
        adoption: Default::default(),
        vehicle: Default::default(),
        charging: Default::default(),
        infrastructure: Vec::new(),
        shortfall: Default::default(),
    }
}
