use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal HTTP capability the probe and link checker depend on.
///
/// Implementations return the final status code of the response and treat
/// anything that prevented one from arriving (DNS, connect, TLS, timeout,
/// truncated body) as an error.
pub trait ProbeTransport: Send + Sync {
    fn get(&self, url: &Url, timeout: Duration) -> Result<u16>;
    fn head(&self, url: &Url, timeout: Duration) -> Result<u16>;
}

/// Production transport backed by the blocking reqwest client.
pub struct BlockingTransport {
    client: Client,
}

impl BlockingTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("SitePulse/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::limited(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl ProbeTransport for BlockingTransport {
    fn get(&self, url: &Url, timeout: Duration) -> Result<u16> {
        let response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .with_context(|| format!("Failed to reach {url}"))?;
        let status = response.status().as_u16();
        // Latency covers the full body, not just the headers.
        response
            .bytes()
            .with_context(|| format!("Failed to read response body from {url}"))?;
        Ok(status)
    }

    fn head(&self, url: &Url, timeout: Duration) -> Result<u16> {
        let response = self
            .client
            .head(url.as_str())
            .timeout(timeout)
            .send()
            .with_context(|| format!("Failed to reach {url}"))?;
        Ok(response.status().as_u16())
    }
}

/// Outcome of a single timed GET.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    #[serde(rename = "response_time", with = "crate::serde_secs")]
    pub latency: Option<Duration>,
    #[serde(rename = "status_code")]
    pub status: Option<u16>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a probe did not count as a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    /// Connection, DNS, TLS or timeout failure; no status arrived.
    NetworkFailure,
    /// The server answered with a status of 400 or above.
    HttpError,
}

impl ProbeResult {
    pub fn from_status(status: u16, latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            status: Some(status),
            success: status < 400,
            error: None,
        }
    }

    pub fn network_failure(error: impl Into<String>) -> Self {
        Self {
            latency: None,
            status: None,
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn failure(&self) -> Option<ProbeFailure> {
        if self.success {
            None
        } else if self.status.is_some() {
            Some(ProbeFailure::HttpError)
        } else {
            Some(ProbeFailure::NetworkFailure)
        }
    }
}

/// Issues timed GET requests against a single target.
#[derive(Clone)]
pub struct HttpProbe {
    transport: Arc<dyn ProbeTransport>,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(transport: Arc<dyn ProbeTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform one GET. Every failure is folded into the returned value.
    pub fn probe(&self, url: &Url) -> ProbeResult {
        let started = Instant::now();
        match self.transport.get(url, self.timeout) {
            Ok(status) => {
                let latency = started.elapsed();
                debug!(url = %url, status, latency_ms = latency.as_millis() as u64, "probe completed");
                ProbeResult::from_status(status, latency)
            }
            Err(err) => {
                debug!(url = %url, error = %err, "probe failed");
                ProbeResult::network_failure(format!("{err:#}"))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Scripted transport: answers with a fixed outcome after an optional delay.
    pub(crate) struct StubTransport {
        pub(crate) outcome: std::result::Result<u16, String>,
        pub(crate) delay: Duration,
        pub(crate) calls: AtomicUsize,
        pub(crate) head_statuses: Mutex<Vec<(String, std::result::Result<u16, String>)>>,
    }

    impl StubTransport {
        pub(crate) fn status(status: u16) -> Self {
            Self::with_outcome(Ok(status), Duration::ZERO)
        }

        pub(crate) fn unreachable() -> Self {
            Self::with_outcome(Err("connection refused".into()), Duration::ZERO)
        }

        pub(crate) fn with_outcome(
            outcome: std::result::Result<u16, String>,
            delay: Duration,
        ) -> Self {
            Self {
                outcome,
                delay,
                calls: AtomicUsize::new(0),
                head_statuses: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_head(self, url: &str, outcome: std::result::Result<u16, String>) -> Self {
            self.head_statuses
                .lock()
                .expect("stub lock")
                .push((url.to_string(), outcome));
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProbeTransport for StubTransport {
        fn get(&self, _url: &Url, _timeout: Duration) -> Result<u16> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            match &self.outcome {
                Ok(status) => Ok(*status),
                Err(message) => bail!("{message}"),
            }
        }

        fn head(&self, url: &Url, _timeout: Duration) -> Result<u16> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let guard = self.head_statuses.lock().expect("stub lock");
            let outcome = guard
                .iter()
                .find(|(candidate, _)| candidate == url.as_str())
                .map(|(_, outcome)| outcome.clone())
                .unwrap_or(Ok(200));
            match outcome {
                Ok(status) => Ok(status),
                Err(message) => bail!("{message}"),
            }
        }
    }

    fn target() -> Url {
        Url::parse("https://example.com/").expect("valid url")
    }

    #[test]
    fn success_below_400() {
        let probe = HttpProbe::new(Arc::new(StubTransport::status(302)), DEFAULT_PROBE_TIMEOUT);
        let result = probe.probe(&target());
        assert!(result.success);
        assert_eq!(result.status, Some(302));
        assert!(result.latency.is_some());
        assert!(result.error.is_none());
        assert_eq!(result.failure(), None);
    }

    #[test]
    fn http_error_keeps_status_without_error_string() {
        let probe = HttpProbe::new(Arc::new(StubTransport::status(503)), DEFAULT_PROBE_TIMEOUT);
        let result = probe.probe(&target());
        assert!(!result.success);
        assert_eq!(result.status, Some(503));
        assert!(result.error.is_none());
        assert_eq!(result.failure(), Some(ProbeFailure::HttpError));
    }

    #[test]
    fn boundary_status_400_is_failure() {
        let probe = HttpProbe::new(Arc::new(StubTransport::status(400)), DEFAULT_PROBE_TIMEOUT);
        assert!(!probe.probe(&target()).success);
    }

    #[test]
    fn network_failure_is_captured() {
        let probe = HttpProbe::new(Arc::new(StubTransport::unreachable()), DEFAULT_PROBE_TIMEOUT);
        let result = probe.probe(&target());
        assert!(!result.success);
        assert_eq!(result.status, None);
        assert_eq!(result.latency, None);
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|error| error.contains("connection refused"))
        );
        assert_eq!(result.failure(), Some(ProbeFailure::NetworkFailure));
    }

    #[test]
    fn serialises_with_report_field_names() {
        let result = ProbeResult::from_status(200, Duration::from_millis(250));
        let value = serde_json::to_value(&result).expect("json");
        assert_eq!(value["status_code"], 200);
        assert_eq!(value["response_time"], 0.25);
        assert_eq!(value["success"], true);
        assert!(value.get("error").is_none());
    }
}
