use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, value_parser};
use sitepulse::Assessor;
use sitepulse::config::{AssessmentSettings, BrowserKind, default_config_path};
use sitepulse::driver::RecordedDriver;
use sitepulse::report::ReportWriter;
use sitepulse::telemetry;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sitepulse", version, about = "Web page performance and health assessment", long_about = None)]
struct Cli {
    /// Page to assess.
    #[arg(value_name = "URL")]
    url: String,

    /// Override the default configuration path.
    #[arg(long, value_parser = value_parser!(PathBuf))]
    config: Option<PathBuf>,

    /// Concurrent virtual users for the load test.
    #[arg(long)]
    users: Option<usize>,

    /// Load test duration in seconds.
    #[arg(long)]
    duration: Option<u64>,

    /// Per-request timeout for load test probes, in seconds.
    #[arg(long)]
    probe_timeout: Option<u64>,

    /// Browser to measure page load with (repeatable).
    #[arg(long = "browser", value_enum)]
    browsers: Vec<BrowserKind>,

    /// Recorded browser measurements (JSON) to fold into the report.
    #[arg(long, value_parser = value_parser!(PathBuf))]
    measurements: Option<PathBuf>,

    /// Skip the concurrent load test.
    #[arg(long, action = ArgAction::SetTrue)]
    skip_load_test: bool,

    /// Skip the broken link check.
    #[arg(long, action = ArgAction::SetTrue)]
    skip_links: bool,

    /// Skip the mobile responsiveness test.
    #[arg(long, action = ArgAction::SetTrue)]
    skip_mobile: bool,

    /// Skip the interaction latency test.
    #[arg(long, action = ArgAction::SetTrue)]
    skip_interactions: bool,

    /// Directory to write the JSON report into.
    #[arg(long, value_parser = value_parser!(PathBuf))]
    output: Option<PathBuf>,

    /// Print the report without saving it.
    #[arg(long, action = ArgAction::SetTrue)]
    no_save: bool,

    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, settings: &mut AssessmentSettings) {
        if let Some(users) = self.users {
            settings.load.concurrent_users = users;
        }
        if let Some(duration) = self.duration {
            settings.load.duration_secs = duration;
        }
        if let Some(timeout) = self.probe_timeout {
            settings.load.probe_timeout_secs = timeout;
        }
        if !self.browsers.is_empty() {
            settings.browsers = self.browsers.clone();
        }
        if let Some(output) = &self.output {
            settings.output_dir = Some(output.clone());
        }
        settings.load_test &= !self.skip_load_test;
        settings.link_check &= !self.skip_links;
        settings.mobile_test &= !self.skip_mobile;
        settings.interaction_test &= !self.skip_interactions;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut settings = AssessmentSettings::load_or_default(&config_path)?;
    cli.apply(&mut settings);

    telemetry::init_tracing("sitepulse", cli.verbose, &settings.telemetry)?;
    info!(path = %config_path.display(), "using assessment config");
    if let Some(trace) = telemetry::current_trace_file() {
        info!(path = %trace.display(), "writing JSON trace");
    }

    let driver = match &cli.measurements {
        Some(path) => RecordedDriver::from_file(path)?,
        None => RecordedDriver::default(),
    };

    let assessor = Assessor::from_settings(settings)?;
    let report = assessor.run(&cli.url, &driver)?;

    if let Some(load) = &report.load_test {
        println!(
            "Load test: {}/{} requests succeeded ({:.1}%)",
            load.successful_requests, load.total_requests, load.success_rate
        );
    }
    println!("\nPerformance Score: {}/100", report.performance_score);

    if cli.no_save {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let writer = ReportWriter::new(assessor.settings().resolve_output_dir()?);
        let path = writer.write(&report)?;
        println!("Results saved to {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_config() {
        let cli = Cli::parse_from([
            "sitepulse",
            "https://example.com",
            "--users",
            "25",
            "--duration",
            "60",
            "--browser",
            "chrome",
            "--browser",
            "firefox",
            "--skip-mobile",
        ]);
        let mut settings = AssessmentSettings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.load.concurrent_users, 25);
        assert_eq!(settings.load.duration_secs, 60);
        assert_eq!(
            settings.browsers,
            vec![BrowserKind::Chrome, BrowserKind::Firefox]
        );
        assert!(!settings.mobile_test);
        assert!(settings.link_check);
    }

    #[test]
    fn defaults_leave_config_untouched() {
        let cli = Cli::parse_from(["sitepulse", "https://example.com"]);
        let mut settings = AssessmentSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.load, AssessmentSettings::default().load);
        assert!(settings.load_test);
    }
}
