use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::BrowserKind;

/// Navigation timings reported by a browser, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageLoadMetrics {
    pub browser: BrowserKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_load_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_content_loaded: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_complete: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_paint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_contentful_paint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageLoadMetrics {
    pub fn failed(browser: BrowserKind, error: impl Into<String>) -> Self {
        Self {
            browser,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Anchor discovered on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub href: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// Raw viewport observations used to derive the responsiveness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileSignals {
    pub mobile_width: u32,
    pub mobile_height: u32,
    pub desktop_width: u32,
    pub has_viewport_meta: bool,
    pub mobile_nav_elements: u32,
}

const MOBILE_BASE_SCORE: u32 = 70;

/// Mobile test outcome as folded into the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileReport {
    #[serde(flatten)]
    pub signals: Option<MobileSignals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsiveness_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MobileReport {
    /// Base 70, +15 for a viewport meta tag, +10 for mobile navigation,
    /// +5 when the mobile viewport is narrower than desktop; capped at 100.
    pub fn from_signals(signals: MobileSignals) -> Self {
        let mut score = MOBILE_BASE_SCORE;
        if signals.has_viewport_meta {
            score += 15;
        }
        if signals.mobile_nav_elements > 0 {
            score += 10;
        }
        if signals.mobile_width < signals.desktop_width {
            score += 5;
        }
        Self {
            signals: Some(signals),
            responsiveness_score: Some(score.min(100)),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            signals: None,
            responsiveness_score: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    FormInput,
    ButtonClick,
}

/// Latency of one simulated user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSample {
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub index: usize,
    /// Seconds from the start of the interaction until it settled.
    pub response_time: f64,
}

/// Browser automation collaborator that produces the page-level measurements.
pub trait BrowserDriver {
    fn measure_page_load(&self, url: &Url, browser: BrowserKind) -> PageLoadMetrics;
    fn collect_links(&self, url: &Url) -> Result<Vec<PageLink>>;
    fn mobile_signals(&self, url: &Url) -> Result<MobileSignals>;
    fn simulate_interactions(&self, url: &Url) -> Result<Vec<InteractionSample>>;
}

/// Measurements captured by an external browser runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedMeasurements {
    #[serde(default)]
    pub load_times: BTreeMap<BrowserKind, PageLoadMetrics>,
    #[serde(default)]
    pub links: Option<Vec<PageLink>>,
    #[serde(default)]
    pub mobile: Option<MobileSignals>,
    #[serde(default)]
    pub interactions: Option<Vec<InteractionSample>>,
}

/// Replays recorded measurements instead of driving a browser.
#[derive(Debug, Clone, Default)]
pub struct RecordedDriver {
    measurements: RecordedMeasurements,
}

impl RecordedDriver {
    pub fn new(measurements: RecordedMeasurements) -> Self {
        Self { measurements }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Unable to read measurements at {}", path.display()))?;
        let measurements = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed measurements at {}", path.display()))?;
        Ok(Self::new(measurements))
    }
}

impl BrowserDriver for RecordedDriver {
    fn measure_page_load(&self, _url: &Url, browser: BrowserKind) -> PageLoadMetrics {
        match self.measurements.load_times.get(&browser) {
            Some(metrics) => PageLoadMetrics {
                browser,
                ..metrics.clone()
            },
            None => PageLoadMetrics::failed(browser, format!("no recorded {browser} page load")),
        }
    }

    fn collect_links(&self, _url: &Url) -> Result<Vec<PageLink>> {
        match &self.measurements.links {
            Some(links) => Ok(links.clone()),
            None => bail!("no recorded page links"),
        }
    }

    fn mobile_signals(&self, _url: &Url) -> Result<MobileSignals> {
        match self.measurements.mobile {
            Some(signals) => Ok(signals),
            None => bail!("no recorded mobile viewport measurements"),
        }
    }

    fn simulate_interactions(&self, _url: &Url) -> Result<Vec<InteractionSample>> {
        match &self.measurements.interactions {
            Some(samples) => Ok(samples.clone()),
            None => bail!("no recorded interaction samples"),
        }
    }
}
