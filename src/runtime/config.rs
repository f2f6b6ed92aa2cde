//! Configuration persistence
//!
//! Reads and writes `config.json` in a runtime directory. Writes go through a
//! temp file and a rename so a crash never leaves a half-written config.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

use super::RuntimeConfig;

/// File name of the configuration inside a runtime directory.
pub const CONFIG_FILE: &str = "config.json";

/// Path of the configuration file in `dir`.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Write data atomically to a file
///
/// Creates a temporary file, writes the data, syncs, then renames
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;

    file.write_all(data)
        .context("Failed to write data")?;

    file.sync_all()
        .context("Failed to sync file")?;

    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    if let Some(parent) = path.parent() {
        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .with_context(|| format!("Failed to open directory: {:?}", parent))?;

        dir.sync_all()
            .context("Failed to sync directory")?;
    }

    Ok(())
}

/// Write runtime configuration into `dir`, creating it if needed
pub fn write_config(dir: &Path, config: &RuntimeConfig) -> Result<()> {
    config.validate()?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {:?}", dir))?;

    let json = serde_json::to_vec_pretty(config)
        .context("Failed to serialize config")?;

    write_atomic(&config_path(dir), &json)?;
    tracing::debug!("wrote config to {:?}", config_path(dir));

    Ok(())
}

/// Load runtime configuration from `dir`; defaults when there is no config file
pub fn load_config(dir: &Path) -> Result<RuntimeConfig> {
    let path = config_path(dir);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!("no config at {:?}, using defaults", path);
            return Ok(RuntimeConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read file: {:?}", path));
        }
    };
    let config: RuntimeConfig = serde_json::from_slice(&data)
        .context("Failed to deserialize config")?;
    config.validate()?;

    Ok(config)
}
