use anyhow::{ensure, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use log::info;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::properties::ModelProperties;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let settings = load_default_config().unwrap();
        assert!(settings.model.ends_with("tests/data/nested_cubes.toml"));
        assert!(settings.threads >= 1);
        assert!(settings.use_cell_cache);
        assert_eq!(settings.properties, ModelProperties::default());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut settings = load_default_config().unwrap();
        settings.threads = 0;
        assert!(validate_config(&settings).is_err());

        let mut settings = load_default_config().unwrap();
        settings.facet_tolerance = -1.0;
        assert!(validate_config(&settings).is_err());
    }

    #[test]
    fn cli_overrides() {
        let mut settings = load_default_config().unwrap();
        let args = CliArgs::parse_from(["raynav", "-t", "3", "-n", "50", "--no-cache"]);
        apply_cli_overrides(&mut settings, &args);
        assert_eq!(settings.threads, 3);
        assert_eq!(settings.histories, 50);
        assert!(!settings.use_cell_cache);
    }
}

/// Maximum deviation of a direction's norm from 1 before it is rejected.
pub const UNIT_VECTOR_TOLERANCE: f64 = 1e-8;
/// Distance below which a point is considered to lie on a facet.
pub const ON_SURFACE_TOLERANCE: f64 = 1e-8;
/// Slack on barycentric coordinates so rays through shared facet edges are not lost.
pub const BARYCENTRIC_TOLERANCE: f64 = 1e-12;
/// A located cell whose boundary lies closer than this along the ray is
/// swapped for its neighbour when boundary checking is requested.
pub const BOUNDARY_CHECK_DISTANCE: f64 = 1e-5;
/// Relative tolerance used when classifying a point against a quadric surface.
pub const QUADRIC_RELATIVE_TOLERANCE: f64 = 1e-12;

/// Runtime configuration for the driver and model loading.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Path to the model manifest.
    pub model: PathBuf,
    #[serde(default)]
    pub facet_tolerance: f64,
    #[serde(default = "default_threads")]
    pub threads: usize,
    pub histories: usize,
    /// Position every history starts from.
    #[serde(default)]
    pub source: [f64; 3],
    pub seed: Option<u64>,
    #[serde(default = "default_use_cell_cache")]
    pub use_cell_cache: bool,
    #[serde(default)]
    pub properties: ModelProperties,
}

fn default_threads() -> usize {
    1
}

fn default_use_cell_cache() -> bool {
    true
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("could not load the default configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("could not deserialize the default configuration")?;
    config.model = resolve(&root, &config.model);

    validate_config(&config)?;

    Ok(config)
}

/// Loads settings from the config file and environment, then applies
/// command-line overrides.
pub fn load_config() -> Result<Settings> {
    load_config_with_args(&CliArgs::parse())
}

pub fn load_config_with_args(args: &CliArgs) -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    let config_file = if local_config.exists() {
        info!("using local configuration: {:?}", local_config);
        local_config
    } else {
        info!("using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let settings = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(
            Environment::with_prefix("RAYNAV")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("could not load configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("could not deserialize configuration")?;
    config.model = resolve(&root, &config.model);

    apply_cli_overrides(&mut config, args);

    validate_config(&config)?;

    Ok(config)
}

fn apply_cli_overrides(config: &mut Settings, args: &CliArgs) {
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(tolerance) = args.facet_tolerance {
        config.facet_tolerance = tolerance;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(histories) = args.histories {
        config.histories = histories;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if args.no_cache {
        config.use_cell_cache = false;
    }
}

// Paths in the config file are relative to the project root.
fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        root.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the RAYNAV_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("RAYNAV_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("failed to get the current executable path")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(Path::to_path_buf)
        .context("could not find the project root directory")
}

pub fn validate_config(config: &Settings) -> Result<()> {
    ensure!(
        config.facet_tolerance >= 0.0,
        "facet tolerance must not be negative"
    );
    ensure!(config.threads > 0, "thread count must be at least 1");
    config.properties.validate()?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "raynav - ray navigation through faceted transport geometries")]
pub struct CliArgs {
    /// File path to the model manifest (TOML, referencing a Wavefront .obj mesh).
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Faceting tolerance passed to the geometry kernel.
    #[arg(long)]
    facet_tolerance: Option<f64>,

    /// Number of worker threads, each owning one internal ray.
    #[arg(short, long)]
    threads: Option<usize>,

    /// Number of rays to trace from the source to a termination cell.
    #[arg(short = 'n', long)]
    histories: Option<usize>,

    /// Random seed for the ray directions.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Locate cells by brute force only, bypassing the found-cell cache.
    #[arg(long)]
    no_cache: bool,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Model: {}
  - Facet Tolerance: {:.6}
  - Threads: {}
  - Histories: {}
  - Source: {:?}
  - Seed: {:?}
  - Cell Cache: {}
  ",
            self.model.display(),
            self.facet_tolerance,
            self.threads,
            self.histories,
            self.source,
            self.seed,
            self.use_cell_cache,
        )
    }
}
