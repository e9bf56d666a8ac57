//! The infrastructure rollout schedule: available charging capacity per region over time.
//!
//! Capacity changes take effect at a given time and last until the next change for the same
//! region. Capacity can go down as well as up (e.g. when chargers are retired). Before the first
//! change for a region, charging is unconstrained.
use crate::region::RegionID;
use crate::time_grid::TimeGrid;
use crate::units::{Energy, Power};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;

/// A change in available charging capacity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapacityChange {
    /// When the change takes effect
    pub from: NaiveDateTime,
    /// Available charging capacity from this time onwards
    pub capacity: Power,
}

/// Charging capacity changes for each region, sorted by time
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct InfrastructureSchedule(IndexMap<RegionID, Vec<CapacityChange>>);

impl InfrastructureSchedule {
    /// Create a new schedule.
    ///
    /// Changes for each region must already be sorted by time, with no two at the same time.
    pub(crate) fn new(changes: IndexMap<RegionID, Vec<CapacityChange>>) -> Self {
        Self(changes)
    }

    /// The capacity changes for the given region
    pub fn changes_for(&self, region_id: &RegionID) -> &[CapacityChange] {
        self.0.get(region_id).map_or(&[], Vec::as_slice)
    }

    /// The available capacity for a region at a given time (`None` means unconstrained)
    pub fn capacity_at(&self, region_id: &RegionID, time: NaiveDateTime) -> Option<Power> {
        self.changes_for(region_id)
            .iter()
            .take_while(|change| change.from <= time)
            .last()
            .map(|change| change.capacity)
    }

    /// The energy that can be delivered by chargers in each step of `grid` for a region.
    ///
    /// `None` means charging is unconstrained in that step.
    pub fn energy_limits_for_grid(
        &self,
        region_id: &RegionID,
        grid: &TimeGrid,
    ) -> Vec<Option<Energy>> {
        let changes = self.changes_for(region_id);
        let step_duration = grid.step_duration();
        let mut next = 0;
        let mut current = None;

        grid.iter()
            .map(|(_, time)| {
                while next < changes.len() && changes[next].from <= time {
                    current = Some(changes[next].capacity);
                    next += 1;
                }
                current.map(|capacity| capacity * step_duration)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{datetime, simple_grid};
    use rstest::rstest;

    fn schedule() -> InfrastructureSchedule {
        InfrastructureSchedule::new(
            [(
                "NZ".into(),
                vec![
                    CapacityChange {
                        from: datetime("2025-01-01T02:00:00"),
                        capacity: Power(100.0),
                    },
                    CapacityChange {
                        from: datetime("2025-01-01T04:00:00"),
                        capacity: Power(40.0),
                    },
                ],
            )]
            .into_iter()
            .collect(),
        )
    }

    #[rstest]
    #[case("2025-01-01T01:00:00", None)]
    #[case("2025-01-01T02:00:00", Some(Power(100.0)))]
    #[case("2025-01-01T03:30:00", Some(Power(100.0)))]
    #[case("2025-01-01T04:00:00", Some(Power(40.0)))]
    #[case("2025-01-09T04:00:00", Some(Power(40.0)))]
    fn test_capacity_at(#[case] time: &str, #[case] expected: Option<Power>) {
        assert_eq!(schedule().capacity_at(&"NZ".into(), datetime(time)), expected);
    }

    #[test]
    fn test_unknown_region_unconstrained() {
        assert_eq!(
            schedule().capacity_at(&"AU".into(), datetime("2025-01-02T00:00:00")),
            None
        );
    }

    #[rstest]
    fn test_energy_limits_for_grid(simple_grid: TimeGrid) {
        let limits = schedule().energy_limits_for_grid(&"NZ".into(), &simple_grid);
        assert_eq!(limits.len(), simple_grid.n_steps());
        assert_eq!(limits[..5], [
            None,
            None,
            Some(Energy(100.0)),
            Some(Energy(100.0)),
            Some(Energy(40.0))
        ]);

        // Agrees with point lookups
        for (step, time) in simple_grid.iter() {
            let expected = schedule()
                .capacity_at(&"NZ".into(), time)
                .map(|capacity| capacity * simple_grid.step_duration());
            assert_eq!(limits[step], expected);
        }
    }
}
