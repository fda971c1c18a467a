use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::probe::DEFAULT_PROBE_TIMEOUT;

/// Browsers the page-load measurement can be requested for.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserKind::Chrome => write!(f, "chrome"),
            BrowserKind::Firefox => write!(f, "firefox"),
        }
    }
}

/// User configuration for a full page assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSettings {
    #[serde(default = "default_browsers")]
    pub browsers: Vec<BrowserKind>,
    #[serde(default = "bool_true")]
    pub mobile_test: bool,
    #[serde(default = "bool_true")]
    pub link_check: bool,
    #[serde(default = "bool_true")]
    pub interaction_test: bool,
    #[serde(default = "bool_true")]
    pub load_test: bool,
    #[serde(default)]
    pub load: LoadTestSettings,
    #[serde(default)]
    pub links: LinkCheckSettings,
    /// Optional override for where JSON reports are written.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

fn default_browsers() -> Vec<BrowserKind> {
    vec![BrowserKind::Chrome]
}

fn bool_true() -> bool {
    true
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            browsers: default_browsers(),
            mobile_test: true,
            link_check: true,
            interaction_test: true,
            load_test: true,
            load: LoadTestSettings::default(),
            links: LinkCheckSettings::default(),
            output_dir: None,
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl AssessmentSettings {
    /// Load settings from disk, writing defaults if missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read config at {}", path.display()))?;
            let parsed: Self = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed config at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            settings.save(path)?;
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let serialised = serde_json::to_string_pretty(self)?;
        fs::write(path, serialised)
            .with_context(|| format!("Failed to persist config to {}", path.display()))
    }

    /// Checks every numeric knob an assessment depends on.
    pub fn validate(&self) -> Result<()> {
        if self.load_test {
            self.load.validate()?;
        }
        if self.link_check {
            self.links.validate()?;
        }
        Ok(())
    }

    /// Resolve the directory JSON reports are written into.
    pub fn resolve_output_dir(&self) -> Result<PathBuf> {
        if let Some(path) = &self.output_dir {
            return Ok(path.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join("reports"))
    }
}

/// Parameters of the concurrent load test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadTestSettings {
    #[serde(default = "LoadTestSettings::default_users")]
    pub concurrent_users: usize,
    /// Soft lower bound on the test length.
    #[serde(default = "LoadTestSettings::default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "LoadTestSettings::default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Pause between consecutive batches.
    #[serde(default = "LoadTestSettings::default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

impl LoadTestSettings {
    fn default_users() -> usize {
        10
    }

    fn default_duration_secs() -> u64 {
        30
    }

    fn default_probe_timeout_secs() -> u64 {
        DEFAULT_PROBE_TIMEOUT.as_secs()
    }

    fn default_batch_pause_ms() -> u64 {
        1000
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrent_users == 0 {
            bail!("load test requires at least one concurrent user");
        }
        if self.duration_secs == 0 {
            bail!("load test duration must be at least one second");
        }
        if self.probe_timeout_secs == 0 {
            bail!("probe timeout must be at least one second");
        }
        Ok(())
    }
}

impl Default for LoadTestSettings {
    fn default() -> Self {
        Self {
            concurrent_users: Self::default_users(),
            duration_secs: Self::default_duration_secs(),
            probe_timeout_secs: Self::default_probe_timeout_secs(),
            batch_pause_ms: Self::default_batch_pause_ms(),
        }
    }
}

/// Limits applied when checking page anchors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkCheckSettings {
    #[serde(default = "LinkCheckSettings::default_max_links")]
    pub max_links: usize,
    #[serde(default = "LinkCheckSettings::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LinkCheckSettings {
    fn default_max_links() -> usize {
        50
    }

    fn default_timeout_secs() -> u64 {
        10
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            bail!("link check timeout must be at least one second");
        }
        Ok(())
    }
}

impl Default for LinkCheckSettings {
    fn default() -> Self {
        Self {
            max_links: Self::default_max_links(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub traces: TraceSettings,
}

/// JSON trace export written next to the console output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "TraceSettings::default_max_files")]
    pub max_files: usize,
}

impl TraceSettings {
    fn default_max_files() -> usize {
        10
    }
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            max_files: Self::default_max_files(),
        }
    }
}

pub(crate) fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "sitepulse", "SitePulse")
        .context("Unable to resolve platform data directory")
}

/// Compute the default path to the assessment configuration file.
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    Ok(dirs.config_dir().join("config.json"))
}
