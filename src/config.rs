use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::options::{ImportOptions, DEFAULT_KILOBYTES_PER_CHUNK};

/// Contents of `snapimport.toml`. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SnapimportConfig {
    pub database: Option<String>,
    pub chunk_kb: Option<usize>,
    #[serde(default)]
    pub import: ImportDefaults,
}

/// Default import flags
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ImportDefaults {
    pub no_transaction: bool,
    pub accept_missing_tables: bool,
    pub accept_version_diff: bool,
    pub accept_name_diff: bool,
    pub accept_changed_primary_key: bool,
    pub overwrite_values: bool,
    pub clear_tables_before_import: bool,
    pub skip_tables: Vec<String>,
}

impl SnapimportConfig {
    /// Options seeded from the file
    pub fn import_options(&self) -> ImportOptions {
        let flags = &self.import;
        ImportOptions {
            no_transaction: flags.no_transaction,
            kilobytes_per_chunk: self.chunk_kb.unwrap_or(DEFAULT_KILOBYTES_PER_CHUNK),
            accept_missing_tables: flags.accept_missing_tables,
            accept_version_diff: flags.accept_version_diff,
            accept_name_diff: flags.accept_name_diff,
            accept_changed_primary_key: flags.accept_changed_primary_key,
            overwrite_values: flags.overwrite_values,
            clear_tables_before_import: flags.clear_tables_before_import,
            skip_tables: flags.skip_tables.clone(),
            ..Default::default()
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("snapimport.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".snapimport").join("snapimport.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<SnapimportConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: SnapimportConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &SnapimportConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
