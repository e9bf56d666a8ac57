//! Common functionality for evgrid.
//!
//! evgrid explores how electric vehicle uptake reshapes regional electricity load under
//! user-chosen scenarios. It is exploratory, not predictive.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod adoption;
pub mod aggregate;
pub mod charging;
pub mod cli;
pub mod data;
pub mod error;
pub mod id;
pub mod infrastructure;
pub mod input;
pub mod log;
pub mod output;
pub mod region;
pub mod scenario;
pub mod settings;
pub mod simulation;
pub mod time_grid;
pub mod units;
pub mod vehicle;

#[cfg(test)]
mod fixture;

/// Get the config folder for the program.
///
/// This will be *something* like `~/.config/evgrid`, but the exact path varies by platform.
pub fn get_evgrid_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // No appropriate config dir for this platform, so use the current directory
        return PathBuf::default();
    };

    config_dir.push("evgrid");
    config_dir
}
