//! Error types for scenario validation and simulation.
//!
//! Errors raised by the simulation core are strongly typed so that callers can distinguish bad
//! scenario input from gaps in the baseline data. The command-line layer wraps these in
//! [`anyhow::Error`] with additional context.
use crate::region::RegionID;
use crate::vehicle::VehicleClass;
use chrono::NaiveDateTime;
use thiserror::Error;

/// A scenario parameter is malformed or out of range
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// A share or rate is outside [0, 1]
    #[error("{name} must be between 0 and 1, got {value}")]
    ShareOutOfRange {
        /// The parameter name
        name: String,
        /// The offending value
        value: f64,
    },
    /// The charging behaviour shares don't sum to one
    #[error("Charging behaviour shares for {context} must sum to 1, got {sum}")]
    SharesDoNotSumToOne {
        /// Which mix the shares belong to
        context: String,
        /// The actual sum
        sum: f64,
    },
    /// No charging behaviours were given
    #[error("Charging behaviour mix for {0} is empty")]
    EmptyMix(String),
    /// No regions were selected
    #[error("No regions selected")]
    EmptyRegionSelection,
    /// A region ID isn't present in the baseline data
    #[error("Unknown region: {0}")]
    UnknownRegion(String),
    /// The step size is zero
    #[error("Time step size must be greater than zero")]
    NonPositiveStepSize,
    /// The step size doesn't divide a day
    #[error("Time step size ({0} minutes) must divide one day exactly")]
    StepSizeNotDivisorOfDay(u32),
    /// The horizon starts at a time that isn't a multiple of the step size past midnight
    #[error("Horizon start ({0}) must be aligned with the time step size")]
    StartNotAligned(NaiveDateTime),
    /// The horizon starts after it ends
    #[error("Horizon start ({start}) is after its end ({end})")]
    StartAfterEnd {
        /// Start of horizon
        start: NaiveDateTime,
        /// End of horizon
        end: NaiveDateTime,
    },
    /// The horizon has zero length
    #[error("Horizon must have a length greater than zero")]
    NonPositiveHorizon,
    /// The adoption period starts after it ends
    #[error("Adoption start ({start}) is after adoption end ({end})")]
    AdoptionStartAfterEnd {
        /// Start of adoption period
        start: NaiveDateTime,
        /// End of adoption period
        end: NaiveDateTime,
    },
    /// A parameter which must be strictly positive isn't
    #[error("{name} must be a finite number greater than zero, got {value}")]
    NonPositive {
        /// The parameter name
        name: String,
        /// The offending value
        value: f64,
    },
    /// A parameter which must be non-negative isn't
    #[error("{name} must be a finite number no less than zero, got {value}")]
    Negative {
        /// The parameter name
        name: String,
        /// The offending value
        value: f64,
    },
    /// More than one infrastructure entry for the same region and time
    #[error("Duplicate charging capacity entries for region {region} at {time}")]
    DuplicateCapacityEntry {
        /// The region
        region: RegionID,
        /// The effective-from time
        time: NaiveDateTime,
    },
    /// A maximum deferral of zero steps was given
    #[error("max_deferral_steps must be greater than zero")]
    ZeroMaxDeferral,
}

/// Baseline data is missing for a selected region or time
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataGapError {
    /// There is no data at all for a region
    #[error("No baseline data for region {0}")]
    MissingRegion(RegionID),
    /// Baseline demand is missing for a time step
    #[error("Baseline demand for region {region} is missing at {time}")]
    MissingBaseline {
        /// The region
        region: RegionID,
        /// The first time step lacking data
        time: NaiveDateTime,
    },
    /// Vehicle population is missing for a time step
    #[error("Population of {class} vehicles for region {region} is missing at {time}")]
    MissingPopulation {
        /// The region
        region: RegionID,
        /// The vehicle class
        class: VehicleClass,
        /// The first time step lacking data
        time: NaiveDateTime,
    },
}

/// A simulation run failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    /// The scenario was invalid
    #[error("Invalid scenario: {0}")]
    Config(#[from] ConfigError),
    /// Baseline data was missing
    #[error("Missing input data: {0}")]
    DataGap(#[from] DataGapError),
    /// The horizon contains no steps
    #[error("The simulation horizon contains no time steps")]
    EmptyHorizon,
    /// A calculation produced a NaN or infinite value
    #[error("Calculated {quantity} for region {region} at {time} is not a finite number")]
    NonFinite {
        /// Which quantity was being calculated
        quantity: &'static str,
        /// The region
        region: RegionID,
        /// The time step
        time: NaiveDateTime,
    },
}
