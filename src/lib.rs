pub mod config;
pub mod driver;
pub mod links;
pub mod load;
pub mod probe;
pub mod report;
pub mod score;
pub mod stats;
pub mod telemetry;

mod serde_secs;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, bail};
use tracing::{info, info_span, warn};
use url::Url;

use crate::config::AssessmentSettings;
use crate::driver::{BrowserDriver, MobileReport};
use crate::links::LinkChecker;
use crate::load::{LoadGenerator, LoadTestPlan};
use crate::probe::{BlockingTransport, HttpProbe, ProbeTransport};
use crate::report::{AssessmentReport, Measured};

/// Runs every enabled assessment category against a page and scores it.
pub struct Assessor {
    settings: AssessmentSettings,
    transport: Arc<dyn ProbeTransport>,
    stop: Option<Arc<AtomicBool>>,
}

impl Assessor {
    /// Construct an assessor backed by the blocking HTTP transport.
    pub fn from_settings(settings: AssessmentSettings) -> Result<Self> {
        let transport = BlockingTransport::new()?;
        Ok(Self::with_transport(settings, Arc::new(transport)))
    }

    pub fn with_transport(settings: AssessmentSettings, transport: Arc<dyn ProbeTransport>) -> Self {
        Self {
            settings,
            transport,
            stop: None,
        }
    }

    /// Flag that ends the load test after its current batch.
    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn settings(&self) -> &AssessmentSettings {
        &self.settings
    }

    pub fn run(&self, target: &str, driver: &dyn BrowserDriver) -> Result<AssessmentReport> {
        let url = Url::parse(target).with_context(|| format!("invalid target URL '{target}'"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("target {url} must use http or https");
        }
        self.settings.validate()?;
        let plan = if self.settings.load_test {
            Some(LoadTestPlan::from_settings(url.clone(), &self.settings.load)?)
        } else {
            None
        };

        let span = info_span!("assessment", url = %url);
        let _guard = span.enter();
        let mut report = AssessmentReport::new(url.as_str(), self.settings.clone());

        info!("measuring page load times");
        for browser in &self.settings.browsers {
            let metrics = driver.measure_page_load(&url, *browser);
            if let Some(error) = &metrics.error {
                warn!(browser = %browser, error = %error, "page load measurement failed");
            }
            report.load_times.insert(*browser, metrics);
        }

        if self.settings.link_check {
            info!("checking for broken links");
            let checker = LinkChecker::new(self.transport.as_ref(), &self.settings.links);
            let outcome = driver
                .collect_links(&url)
                .map(|links| checker.check(&links));
            if let Err(err) = &outcome {
                warn!(error = %err, "link check skipped");
            }
            report.broken_links = Some(Measured::from_result(outcome));
        }

        if self.settings.mobile_test {
            info!("testing mobile responsiveness");
            let mobile = match driver.mobile_signals(&url) {
                Ok(signals) => MobileReport::from_signals(signals),
                Err(err) => {
                    warn!(error = %err, "mobile test skipped");
                    MobileReport::failed(format!("{err:#}"))
                }
            };
            report.mobile_test = Some(mobile);
        }

        if self.settings.interaction_test {
            info!("simulating user interactions");
            let outcome = driver.simulate_interactions(&url);
            if let Err(err) = &outcome {
                warn!(error = %err, "interaction test skipped");
            }
            report.interactions = Some(Measured::from_result(outcome));
        }

        if let Some(plan) = plan {
            info!(
                users = plan.concurrent_users(),
                duration_s = plan.duration().as_secs(),
                "running load test"
            );
            let probe = HttpProbe::new(
                Arc::clone(&self.transport),
                self.settings.load.probe_timeout(),
            );
            let mut generator = LoadGenerator::new(probe);
            if let Some(stop) = &self.stop {
                generator = generator.with_stop_signal(Arc::clone(stop));
            }
            let run = generator.run(&plan)?;
            report.load_test = Some(run.report());
        }

        let score = report.rescore();
        info!(score, "assessment completed");
        Ok(report)
    }
}
