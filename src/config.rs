//! TOML configuration for the harvester.
//!
//! When the configuration file is missing, a commented template is written
//! next to the expected location and loading fails with an instructive
//! message so the operator can fill it in and restart.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Template written when no configuration file exists yet.
const CONFIG_TEMPLATE: &str = r#"# log-harvester configuration

[paths]
# Directory containing the timestamp-named log files to watch.
logs_dir = "/path/to/logs"
# SQLite database file (created on first run).
database = "harvester.sqlite3"

[harvester]
# Seconds between tailing cycles.
reading_interval_secs = 1.0
# Records older than this many seconds are deleted. 0 disables retention.
retention_window_secs = 10

# Patterns tried in order against every line of streams without their own set.
# The first capture group must be the line's timestamp (DD-MM-YY HH:MM:SS.mmm).
[[default_patterns]]
name = "default"
regex = '^\[(\d{2}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3})\](.+)\.?$'

# Per-stream ordered pattern sets, keyed by stream id:
#
# [[patterns.chat]]
# name = "chat"
# regex = '^\[(?P<ts>\d{2}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3})\](?P<msg>.+)\.$'
"#;

/// One named pattern; `regex` is kept as text until extraction time so a bad
/// entry only disables itself, not the whole stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDef {
    pub name: String,
    pub regex: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paths {
    /// Directory containing the log files to watch.
    pub logs_dir: PathBuf,
    /// SQLite database file.
    pub database: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarvesterSettings {
    /// Seconds between tailing cycles.
    pub reading_interval_secs: f64,
    /// Maximum record age in seconds; 0 disables retention.
    pub retention_window_secs: u64,
}

/// Loaded configuration, injected into the harvester at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub paths: Paths,
    pub harvester: HarvesterSettings,
    /// Fallback pattern set for streams without their own.
    #[serde(default)]
    pub default_patterns: Vec<PatternDef>,
    /// Per-stream ordered pattern sets, keyed by stream id.
    #[serde(default)]
    pub patterns: BTreeMap<String, Vec<PatternDef>>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is replaced by a generated template and reported as a
    /// configuration error; the operator is expected to edit it and restart.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            error!(path = %path.display(), "Missing configuration file");
            std::fs::write(path, CONFIG_TEMPLATE)?;
            return Err(Error::Config {
                message: format!(
                    "a new configuration file has been generated at {}; fill it in and start again",
                    path.display()
                ),
            });
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw).map_err(|e| Error::Config {
            message: format!("{} could not be parsed: {}", path.display(), e),
        })?;
        config.validate()?;

        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.paths.logs_dir.exists() {
            return Err(Error::Config {
                message: format!(
                    "the configured log directory {} does not exist",
                    self.paths.logs_dir.display()
                ),
            });
        }
        if self.default_patterns.is_empty() {
            return Err(Error::Config {
                message: "at least one [[default_patterns]] entry is required".to_string(),
            });
        }
        // NaN and infinity would panic later in Duration::from_secs_f64.
        let interval = self.harvester.reading_interval_secs;
        if !interval.is_finite() || interval <= 0.0 {
            return Err(Error::Config {
                message: "reading_interval_secs must be a positive, finite number".to_string(),
            });
        }
        Ok(())
    }

    /// Time between tailing cycles.
    pub fn reading_interval(&self) -> Duration {
        Duration::from_secs_f64(self.harvester.reading_interval_secs)
    }

    /// Maximum record age, or `None` when retention is disabled.
    pub fn retention_window(&self) -> Option<Duration> {
        match self.harvester.retention_window_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Ordered pattern set for a stream, falling back to the default set.
    pub fn patterns_for(&self, stream_id: &str) -> &[PatternDef] {
        self.patterns
            .get(stream_id)
            .map(|set| set.as_slice())
            .unwrap_or(&self.default_patterns)
    }
}
