//! Configuration loading and parsing.
//!
//! Defines the TOML config schema and resolves defaults and file locations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use tunebox_library::db::{DEFAULT_ALBUM_SORT, DEFAULT_ITEM_SORT};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TUNEBOX_CONFIG";

const DEFAULT_WARNING_THRESHOLD: usize = 100;

/// Top-level configuration loaded from TOML.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Path of the library database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,
    /// Music directory imported when `import` is given no paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Item order for queries without sort parts.
    pub sort_item: String,
    /// Album order for queries without sort parts.
    pub sort_album: String,
    /// `ls` template for items.
    pub format_item: String,
    /// `ls -a` template for albums.
    pub format_album: String,
    pub ui: UiConfig,
    pub play: PlayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: None,
            directory: None,
            sort_item: DEFAULT_ITEM_SORT.to_string(),
            sort_album: DEFAULT_ALBUM_SORT.to_string(),
            format_item: "$artist - $album - $title".to_string(),
            format_album: "$albumartist - $album".to_string(),
            ui: UiConfig::default(),
            play: PlayConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    /// Colorize terminal output.
    pub color: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

/// The `[play]` section.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PlayConfig {
    /// Player command line; `$args` and `{}` are placeholders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Make paths relative to this directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_to: Option<PathBuf>,
    /// With `-a`, pass album folders instead of tracks.
    pub use_folders: bool,
    /// Pass paths as arguments instead of writing an m3u playlist.
    pub raw: bool,
    /// Ask before queueing more than this many tracks or albums.
    #[serde(alias = "warning_treshold")]
    pub warning_threshold: WarningThreshold,
    /// Start the playlist with a UTF-8 byte order mark.
    pub bom: bool,
}

/// Selection size above which `play` asks for confirmation; `None` disables the prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawThreshold", into = "RawThreshold")]
pub struct WarningThreshold(Option<usize>);

impl WarningThreshold {
    pub const DISABLED: Self = Self(None);

    pub fn new(limit: usize) -> Self {
        if limit == 0 { Self::DISABLED } else { Self(Some(limit)) }
    }

    #[cfg(test)]
    pub fn limit(&self) -> Option<usize> {
        self.0
    }

    /// True if `count` selected entries should trigger the prompt.
    pub fn exceeded_by(&self, count: usize) -> bool {
        self.0.is_some_and(|limit| count > limit)
    }
}

impl Default for WarningThreshold {
    fn default() -> Self {
        Self(Some(DEFAULT_WARNING_THRESHOLD))
    }
}

/// Accepts an integer or `false`.
#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum RawThreshold {
    Count(i64),
    Enabled(bool),
}

impl TryFrom<RawThreshold> for WarningThreshold {
    type Error = String;

    fn try_from(raw: RawThreshold) -> Result<Self, Self::Error> {
        match raw {
            RawThreshold::Count(n) if n < 0 => {
                Err(format!("warning_threshold must not be negative, got {n}"))
            }
            RawThreshold::Count(n) => Ok(Self::new(n as usize)),
            RawThreshold::Enabled(false) => Ok(Self::DISABLED),
            RawThreshold::Enabled(true) => Ok(Self::default()),
        }
    }
}

impl From<WarningThreshold> for RawThreshold {
    fn from(threshold: WarningThreshold) -> Self {
        match threshold.0 {
            Some(limit) => RawThreshold::Count(limit as i64),
            None => RawThreshold::Enabled(false),
        }
    }
}

/// A config plus the file it came from.
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    /// Config file location, whether or not it exists.
    pub path: Option<PathBuf>,
    /// True if `path` was read.
    pub from_file: bool,
    pub config: Config,
}

impl PlayConfig {
    /// `relative_to` with a leading `~` expanded.
    pub fn relative_to(&self) -> Option<PathBuf> {
        self.relative_to.as_deref().map(expand_home)
    }
}

impl Config {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(raw)?)
    }

    /// Resolve the config file: explicit path, then `$TUNEBOX_CONFIG`, then the
    /// per-user config directory. Only a missing default file falls back to defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<LoadedConfig> {
        let chosen = explicit.map(Path::to_path_buf).or_else(|| {
            std::env::var_os(CONFIG_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        });
        if let Some(path) = chosen {
            let config = Self::load(&path)?;
            return Ok(LoadedConfig {
                path: Some(path),
                from_file: true,
                config,
            });
        }

        let path = default_config_path();
        match path.as_ref() {
            Some(p) if p.exists() => Ok(LoadedConfig {
                config: Self::load(p)?,
                path,
                from_file: true,
            }),
            _ => {
                tracing::debug!("no config file found; using defaults");
                Ok(LoadedConfig {
                    path,
                    from_file: false,
                    config: Config::default(),
                })
            }
        }
    }

    /// Library database path, falling back to the per-user data directory.
    pub fn library_path(&self) -> Result<PathBuf> {
        if let Some(path) = self.library.as_deref() {
            return Ok(expand_home(path));
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join("library.sqlite"))
            .ok_or_else(|| anyhow::anyhow!("cannot determine a data directory; set `library`"))
    }

    pub fn music_directory(&self) -> Option<PathBuf> {
        self.directory.as_deref().map(expand_home)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialize config")
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "tunebox")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match BaseDirs::new() {
        Some(base) => base.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}
