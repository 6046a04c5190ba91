//! Loads the fleet configuration from YAML plus `BOSFLASH_*` overrides.

use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::config::{EnvOverrides, FleetConfig, validate_config};

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "BOSFLASH_";

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "bosflash.yaml";

/// Load `path`, apply overrides from `vars`, and validate.
///
/// A missing file yields the built-in defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, an override has
/// the wrong shape, or the result fails validation.
pub fn load_config<I>(path: &Path, vars: I) -> Result<FleetConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("cannot parse {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        FleetConfig::default()
    };

    let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX)
        .from_iter(vars)
        .context("cannot read BOSFLASH_* environment overrides")?;
    config.apply_overrides(overrides);

    validate_config(&config).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}
