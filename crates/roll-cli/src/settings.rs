//! Layered configuration: an optional TOML file under `ROLL_*` environment
//! variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use roll_engine::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database file. `~` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path:  PathBuf,
  /// JSON roster of known users, events and meetings. Without one every
  /// lookup misses.
  #[serde(default)]
  pub roster_path: Option<PathBuf>,
  #[serde(default)]
  pub engine:      EngineConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("roll.db") }

impl Settings {
  /// Read `path` if it exists, then apply environment overrides such as
  /// `ROLL_STORE_PATH` or `ROLL_ENGINE__MAX_PAGE_LIMIT`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let mut settings: Self = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("ROLL")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise Settings")?;

    settings.store_path = expand_tilde(&settings.store_path);
    settings.roster_path = settings.roster_path.as_deref().map(expand_tilde);
    Ok(settings)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
