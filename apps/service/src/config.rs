use std::{env, fmt, fs, io, path};

use logger::LogFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil::EngineConfig;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: Logging,
    pub paths: Paths,
    pub executor: Executor,
    pub retention: Retention,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Default level, refined by `RUST_LOG`
    pub level: String,
    /// `compact` or `json`, overridden by `RUST_LOG_FORMAT`
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// TOML file with hosts, services, contacts and the other objects
    pub objects: path::PathBuf,
    /// JSON retention snapshot written on shutdown and periodically
    pub retention: path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Executor {
    /// Commands allowed to run at the same time
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Retention {
    pub enabled: bool,
    /// Seconds between periodic saves, zero to save on shutdown only
    pub save_interval_seconds: u64,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Directory holding vigil's files ($XDG_CONFIG_HOME/vigil or
/// $HOME/.config/vigil)
fn config_dir() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("vigil"))
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

impl Default for Paths {
    fn default() -> Self {
        let base = config_dir().unwrap_or_else(|_| path::PathBuf::from("."));
        Self { objects: base.join("objects.toml"), retention: base.join("retention.json") }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self { workers: 16 }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self { enabled: true, save_interval_seconds: 3600 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: Logging::default(),
            paths: Paths::default(),
            executor: Executor::default(),
            retention: Retention::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Logging {
    pub fn log_format(&self) -> LogFormat {
        self.format.parse().unwrap_or_default()
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;
        write_title_1(f, "Paths")?;
        write_1(f, "Objects", &self.paths.objects.display())?;
        write_1(f, "Retention", &self.paths.retention.display())?;
        write_title_1(f, "Executor")?;
        write_1(f, "Workers", &self.executor.workers)?;
        write_title_1(f, "Retention")?;
        write_1(f, "Enabled", &self.retention.enabled)?;
        write_1(f, "Save Interval (s)", &self.retention.save_interval_seconds)?;
        write_title_1(f, "Engine")?;
        write_1(f, "Interval Length (s)", &self.engine.interval_length)?;
        write_1(f, "Notifications", &self.engine.enable_notifications)?;
        write_1(f, "Flap Detection", &self.engine.enable_flap_detection)?;
        write_1(f, "Max Parallel Service Checks", &self.engine.max_parallel_service_checks)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            config_dir()?.join("config.toml")
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str()).map_err(|source| Error::ParseFailed { path: config_path, source })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str).map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }
}
