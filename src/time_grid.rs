//! Code for working with the uniform time grid over which a simulation is run.
//!
//! The grid covers the half-open interval `[start, end)` in steps of a fixed number of minutes.
//! Step sizes always divide a day exactly, so every step falls into one of a fixed number of
//! time-of-day slots.
use crate::units::Duration;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// The number of minutes in a day
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// The number of seconds in a (non-leap) year, used for time-based rates
const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// The simulation horizon and resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Horizon {
    /// The first time step
    pub start: NaiveDateTime,
    /// The end of the horizon (exclusive)
    pub end: NaiveDateTime,
    /// The size of each time step in minutes
    pub step_minutes: u32,
}

/// A uniform grid of time steps
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    start: NaiveDateTime,
    step_minutes: u32,
    n_steps: usize,
}

impl TimeGrid {
    /// Create the time grid for the given horizon.
    ///
    /// The horizon is expected to have been validated already: the step size is non-zero and
    /// divides a day.
    pub fn new(horizon: &Horizon) -> Self {
        let span = (horizon.end - horizon.start).num_minutes().max(0);
        let step = i64::from(horizon.step_minutes.max(1));
        let n_steps = usize::try_from(span.div_euclid(step) + i64::from(span % step != 0))
            .unwrap_or_default();

        Self {
            start: horizon.start,
            step_minutes: horizon.step_minutes.max(1),
            n_steps,
        }
    }

    /// The number of time steps in the grid
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Whether the grid contains no time steps
    pub fn is_empty(&self) -> bool {
        self.n_steps == 0
    }

    /// The size of each step in minutes
    pub fn step_minutes(&self) -> u32 {
        self.step_minutes
    }

    /// The length of a single time step
    pub fn step_duration(&self) -> Duration {
        Duration::from_minutes(self.step_minutes)
    }

    /// The number of time-of-day slots (i.e. steps in one day)
    pub fn steps_per_day(&self) -> usize {
        (MINUTES_PER_DAY / self.step_minutes) as usize
    }

    /// The time at which the given step starts
    pub fn time(&self, step: usize) -> NaiveDateTime {
        self.start + chrono::Duration::minutes(step as i64 * i64::from(self.step_minutes))
    }

    /// The calendar day on which the given step falls
    pub fn date(&self, step: usize) -> NaiveDate {
        self.time(step).date()
    }

    /// The time-of-day slot for the given step
    pub fn slot_of_day(&self, step: usize) -> usize {
        let time = self.time(step);
        let minute_of_day = time.hour() * 60 + time.minute();
        (minute_of_day / self.step_minutes) as usize
    }

    /// Whether `step` is the last step of its calendar day within the grid
    pub fn is_last_step_of_day(&self, step: usize) -> bool {
        step + 1 < self.n_steps && self.date(step + 1) != self.date(step)
    }

    /// Iterate over all steps along with the time at which they start
    pub fn iter(&self) -> impl Iterator<Item = (usize, NaiveDateTime)> + '_ {
        (0..self.n_steps).map(|step| (step, self.time(step)))
    }
}

/// The number of years elapsed from `from` to `to` (negative if `to` is earlier)
pub fn years_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / SECONDS_PER_YEAR
}
