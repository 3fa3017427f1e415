//! Configuration loading.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. the optional `bolt.toml` file (see [`schema`])
//! 2. `BOLT_*` environment variables (see [`apply_env_overrides`])
//! 3. command line flags, applied by the binary

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "bolt.toml";

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, or
/// contains unknown keys.
///
/// ```no_run
/// use bolt::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("bolt.toml"))?;
/// println!("Reporter: {:?}", config.run.reporter);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads configuration from a TOML string.
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

/// Resolves the configuration for a run.
///
/// An explicitly named file must exist. Without one, [`DEFAULT_CONFIG_FILE`]
/// in `dir` is used when present and defaults otherwise.
pub fn resolve_config(explicit: Option<&Path>, dir: &Path) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    let default_path = dir.join(DEFAULT_CONFIG_FILE);
    if default_path.is_file() {
        tracing::debug!("Using config file {}", default_path.display());
        load_config(&default_path)
    } else {
        Ok(Config::default())
    }
}

/// Applies `BOLT_PASS_SYMBOL`, `BOLT_FAIL_SYMBOL` and `BOLT_SKIP_SYMBOL`.
///
/// `lookup` is usually `std::env::var`. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let symbols = [
        ("BOLT_PASS_SYMBOL", &mut config.progress.pass_symbol),
        ("BOLT_FAIL_SYMBOL", &mut config.progress.fail_symbol),
        ("BOLT_SKIP_SYMBOL", &mut config.progress.skip_symbol),
    ];

    for (name, symbol) in symbols {
        if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
            *symbol = value;
        }
    }
}
