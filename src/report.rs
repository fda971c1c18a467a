use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AssessmentSettings, BrowserKind};
use crate::driver::{InteractionSample, MobileReport, PageLoadMetrics};
use crate::links::BrokenLink;
use crate::score::{ScoreBreakdown, ScoreInputs};
use crate::stats::LoadTestReport;

/// A category outcome, or the error that kept it from being measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measured<T> {
    Value(T),
    Failed { error: String },
}

impl<T> Measured<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Measured::Value(value) => Some(value),
            Measured::Failed { .. } => None,
        }
    }

    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Measured::Value(value),
            Err(err) => Measured::Failed {
                error: format!("{err:#}"),
            },
        }
    }
}

/// Everything one assessment produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub run_id: Uuid,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub config: AssessmentSettings,
    #[serde(default)]
    pub load_times: BTreeMap<BrowserKind, PageLoadMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_links: Option<Measured<Vec<BrokenLink>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_test: Option<MobileReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactions: Option<Measured<Vec<InteractionSample>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_test: Option<LoadTestReport>,
    pub performance_score: u8,
}

impl AssessmentReport {
    pub fn new(url: impl Into<String>, config: AssessmentSettings) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            url: url.into(),
            timestamp: Utc::now(),
            config,
            load_times: BTreeMap::new(),
            broken_links: None,
            mobile_test: None,
            interactions: None,
            load_test: None,
            performance_score: 100,
        }
    }

    pub fn score_inputs(&self) -> ScoreInputs<'_> {
        ScoreInputs {
            load_times: Some(&self.load_times),
            broken_links: self
                .broken_links
                .as_ref()
                .and_then(Measured::value)
                .map(Vec::len),
            mobile_score: self
                .mobile_test
                .as_ref()
                .and_then(|mobile| mobile.responsiveness_score),
            success_rate: self.load_test.as_ref().map(|report| report.success_rate),
        }
    }

    pub fn score_breakdown(&self) -> ScoreBreakdown {
        ScoreBreakdown::compute(&self.score_inputs())
    }

    /// Recompute `performance_score` from the current sub-metrics.
    pub fn rescore(&mut self) -> u8 {
        self.performance_score = self.score_breakdown().score;
        self.performance_score
    }
}

/// Persists reports as pretty-printed JSON files.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    directory: PathBuf,
}

impl ReportWriter {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn write(&self, report: &AssessmentReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory).with_context(|| {
            format!(
                "Failed to create report directory {}",
                self.directory.display()
            )
        })?;

        let stamp = report.timestamp.format("%Y%m%d_%H%M%S");
        let mut path = self.directory.join(format!("performance_test_{stamp}.json"));
        let mut counter = 0;
        while path.exists() {
            counter += 1;
            path = self
                .directory
                .join(format!("performance_test_{stamp}-{counter}.json"));
        }

        let rendered = serde_json::to_string_pretty(report)?;
        fs::write(&path, rendered)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(path)
    }
}
