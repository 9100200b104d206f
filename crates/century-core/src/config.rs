use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trend::{TrendLayout, TrendPeriod};
use crate::window::{InvalidWindowError, WindowSize};

pub const DEFAULT_OWNER: &str = "local";
pub const DEFAULT_DATA_DIR: &str = ".century";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid window size in config: {0}")]
    Window(#[from] InvalidWindowError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CenturyConfig {
    /// Directory holding `events.jsonl` and `habits.json`; relative paths resolve
    /// against the project root.
    pub data_dir: Option<String>,
    /// Account that owns habits created from this checkout.
    pub owner: Option<String>,
    pub window_size: Option<i64>,
    pub trend_period: Option<i64>,
    pub trend_width: Option<f64>,
    pub trend_padding: Option<f64>,
}

/// Effective settings after project, global and built-in defaults are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub owner: String,
    pub window: WindowSize,
    pub trend_period: TrendPeriod,
    pub trend_layout: TrendLayout,
    pub source: &'static str,
}

pub fn config_filename_candidates() -> [&'static str; 2] {
    [".century.toml", ".centuryrc"]
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(".century.toml")
}

/// `$CENTURY_HOME/config.toml`, with `CENTURY_HOME` defaulting to `~/.century`.
pub fn global_config_path() -> Option<PathBuf> {
    non_empty_env_path("CENTURY_HOME")
        .or_else(|| non_empty_env_path("HOME").map(|home| home.join(DEFAULT_DATA_DIR)))
        .map(|home| home.join("config.toml"))
}

fn non_empty_env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Project config from `root`. A present but unparsable file is an error.
pub fn load_config(root: &Path) -> Result<Option<CenturyConfig>, ConfigError> {
    for name in config_filename_candidates() {
        let path = root.join(name);
        if path.is_file() {
            let text = fs::read_to_string(&path)?;
            return Ok(Some(toml::from_str::<CenturyConfig>(&text)?));
        }
    }
    Ok(None)
}

pub fn load_global_config() -> Result<Option<CenturyConfig>, ConfigError> {
    let Some(path) = global_config_path() else {
        return Ok(None);
    };
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    Ok(Some(toml::from_str::<CenturyConfig>(&text)?))
}

pub fn write_config(root: &Path, config: &CenturyConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path(root);
    let body = toml::to_string_pretty(config)?;
    fs::write(&path, body)?;
    Ok(path)
}

/// Merges project config over global config over built-in defaults.
pub fn resolve_settings(root: &Path) -> Result<Settings, ConfigError> {
    let project = load_config(root)?;
    let global = load_global_config()?;
    let source = if project.is_some() {
        "project"
    } else if global.is_some() {
        "global"
    } else {
        "default"
    };

    let (project, global) = (project.as_ref(), global.as_ref());

    let data_dir = pick(project, global, |config| normalize_optional(config.data_dir.clone()))
        .map(PathBuf::from)
        .map(|dir| if dir.is_absolute() { dir } else { root.join(dir) })
        .unwrap_or_else(|| root.join(DEFAULT_DATA_DIR));
    let owner = pick(project, global, |config| normalize_optional(config.owner.clone()))
        .unwrap_or_else(|| DEFAULT_OWNER.to_string());
    let window = pick(project, global, |config| config.window_size)
        .map(WindowSize::new)
        .transpose()?
        .unwrap_or_default();
    let trend_period = pick(project, global, |config| config.trend_period)
        .map(TrendPeriod::coerce)
        .unwrap_or_default();
    let defaults = TrendLayout::default();
    let trend_layout = TrendLayout {
        width: pick(project, global, |config| config.trend_width).unwrap_or(defaults.width),
        padding: pick(project, global, |config| config.trend_padding).unwrap_or(defaults.padding),
    };

    Ok(Settings {
        data_dir,
        owner,
        window,
        trend_period,
        trend_layout,
        source,
    })
}

fn pick<T>(
    project: Option<&CenturyConfig>,
    global: Option<&CenturyConfig>,
    select: impl Fn(&CenturyConfig) -> Option<T>,
) -> Option<T> {
    project.and_then(&select).or_else(|| global.and_then(&select))
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}
