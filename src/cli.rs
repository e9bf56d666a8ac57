//! The command line interface for the simulation.
use crate::data::BaselineData;
use crate::input::load_baseline_data;
use crate::log;
use crate::output::metadata::write_metadata;
use crate::output::{
    create_output_directory, get_output_dir, get_scenario_name, write_comparison, write_results,
};
use crate::scenario::ScenarioConfig;
use crate::settings::Settings;
use crate::simulation::{Simulation, run_scenarios};
use ::log::{info, warn};
use anyhow::{Context, Result, ensure};
use clap::{Args, CommandFactory, Parser, Subcommand};
use indexmap::IndexSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod example;
use example::ExampleSubcommands;
pub mod settings;
use settings::SettingsSubcommands;

/// The default output folder for the `compare` command
const COMPARISON_OUTPUT_DIR: &str = "evgrid_results/comparison";

/// The command line interface for the simulation.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the run command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a scenario.
    Run {
        /// Path to the scenario file.
        scenario: PathBuf,
        /// Directory containing baseline data (defaults to the scenario file's folder).
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Run several scenarios and compare their results.
    Compare {
        /// Paths to the scenario files.
        #[arg(required = true, num_args = 2..)]
        scenarios: Vec<PathBuf>,
        /// Directory containing baseline data (defaults to the first scenario file's folder).
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Manage example scenarios.
    Example {
        /// The available subcommands for managing example scenarios.
        #[command(subcommand)]
        subcommand: ExampleSubcommands,
    },
    /// Validate a scenario against baseline data.
    Validate {
        /// Path to the scenario file.
        scenario: PathBuf,
        /// Directory containing baseline data (defaults to the scenario file's folder).
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run {
                scenario,
                data_dir,
                opts,
            } => handle_run_command(&scenario, data_dir.as_deref(), &opts, None),
            Self::Compare {
                scenarios,
                data_dir,
                opts,
            } => handle_compare_command(&scenarios, data_dir.as_deref(), &opts, None),
            Self::Example { subcommand } => subcommand.execute(),
            Self::Validate { scenario, data_dir } => {
                handle_validate_command(&scenario, data_dir.as_deref(), None)
            }
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start evgrid
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ evgrid --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        // Output program help in markdown format
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    if let Some(settings) = settings {
        Ok(settings)
    } else {
        Settings::load().context("Failed to load settings.")
    }
}

/// Configure the global thread pool used for simulations
fn configure_threads(num_threads: usize) {
    if num_threads == 0 {
        return;
    }

    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        warn!("Could not configure thread pool: {err}");
    }
}

/// The baseline data folder for a scenario: either given explicitly or the scenario's own folder
fn resolve_data_dir(scenario_path: &Path, data_dir: Option<&Path>) -> PathBuf {
    if let Some(data_dir) = data_dir {
        return data_dir.to_path_buf();
    }

    match scenario_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Load baseline data and a scenario, validating the scenario against the data
fn load_inputs(
    scenario_path: &Path,
    data_dir: &Path,
) -> Result<(Arc<BaselineData>, ScenarioConfig)> {
    let data = load_baseline_data(data_dir).context("Failed to load baseline data.")?;
    info!("Loaded baseline data from {}", data_dir.display());

    let config = ScenarioConfig::from_path(scenario_path, &data.region_ids())
        .context("Failed to load scenario.")?;
    info!("Loaded scenario from {}", scenario_path.display());

    Ok((Arc::new(data), config))
}

/// Get the output folder and create it
fn prepare_output_dir(output_path: &Path, opts: &RunOpts, settings: &Settings) -> Result<bool> {
    create_output_directory(output_path, opts.overwrite || settings.overwrite).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_path.display()
        )
    })
}

/// Handle the `run` command.
pub fn handle_run_command(
    scenario_path: &Path,
    data_dir: Option<&Path>,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(scenario_path)?;
        &pathbuf
    };
    let overwrite = prepare_output_dir(output_path, opts, &settings)?;

    // Initialise program logger
    log::init(&settings.log_level, Some(output_path))
        .context("Failed to initialise logging.")?;
    configure_threads(settings.num_threads);

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    let data_dir = resolve_data_dir(scenario_path, data_dir);
    let (data, config) = load_inputs(scenario_path, &data_dir)?;
    info!("Output folder: {}", output_path.display());

    // Run the simulation
    let description = config.description().to_string();
    let result = Simulation::new(Arc::new(config), data)
        .and_then(|simulation| simulation.run())
        .context("Simulation failed.")?;

    write_results(output_path, &result)?;
    write_metadata(output_path, scenario_path, &data_dir, &description)
        .context("Failed to save metadata.")?;
    info!("Simulation complete!");

    Ok(())
}

/// Handle the `compare` command.
pub fn handle_compare_command(
    scenario_paths: &[PathBuf],
    data_dir: Option<&Path>,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    ensure!(!scenario_paths.is_empty(), "No scenarios given");
    let settings = load_settings(settings)?;

    let output_path = opts
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(COMPARISON_OUTPUT_DIR));
    let overwrite = prepare_output_dir(&output_path, opts, &settings)?;

    log::init(&settings.log_level, Some(&output_path))
        .context("Failed to initialise logging.")?;
    configure_threads(settings.num_threads);
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    let data_dir = resolve_data_dir(&scenario_paths[0], data_dir);
    let data = Arc::new(load_baseline_data(&data_dir).context("Failed to load baseline data.")?);
    info!("Loaded baseline data from {}", data_dir.display());
    let region_ids = data.region_ids();

    // Scenario names are used for output folders, so must be unique
    let mut names = IndexSet::new();
    let mut configs = Vec::new();
    for path in scenario_paths {
        let name = get_scenario_name(path)?;
        ensure!(
            names.insert(name.clone()),
            "More than one scenario is named {name}. Please rename the scenario files."
        );

        let config = ScenarioConfig::from_path(path, &region_ids)
            .with_context(|| format!("Failed to load scenario {name}."))?;
        configs.push(Arc::new(config));
    }
    info!("Comparing {} scenarios", configs.len());

    let mut results = Vec::new();
    for (name, result) in names.into_iter().zip(run_scenarios(&configs, &data)) {
        let result = result.with_context(|| format!("Simulation of scenario {name} failed."))?;
        results.push((name, result));
    }

    for (name, result) in &results {
        let scenario_output = output_path.join(name);
        create_output_directory(&scenario_output, true)?;
        write_results(&scenario_output, result)?;
    }
    write_comparison(&output_path, &results).context("Failed to write comparison.")?;
    info!("Comparison complete!");

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(
    scenario_path: &Path,
    data_dir: Option<&Path>,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;

    // Initialise program logger (we won't save log files when running the validate command)
    log::init(&settings.log_level, None).context("Failed to initialise logging.")?;

    // Load/validate the scenario
    let data_dir = resolve_data_dir(scenario_path, data_dir);
    let (data, config) = load_inputs(scenario_path, &data_dir)?;
    Simulation::new(Arc::new(config), data).context("Failed to validate scenario.")?;
    info!("Scenario validation successful!");

    Ok(())
}
