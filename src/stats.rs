use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::probe::ProbeResult;

/// Summary of a load-test run.
///
/// Latency statistics cover successful probes only and are `None` when there
/// were none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestReport {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    #[serde(rename = "avg_response_time", with = "crate::serde_secs")]
    pub avg_latency: Option<Duration>,
    #[serde(rename = "min_response_time", with = "crate::serde_secs")]
    pub min_latency: Option<Duration>,
    #[serde(rename = "max_response_time", with = "crate::serde_secs")]
    pub max_latency: Option<Duration>,
    #[serde(rename = "median_response_time", with = "crate::serde_secs")]
    pub median_latency: Option<Duration>,
}

impl LoadTestReport {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let total = results.len() as u64;
        let mut latencies = Vec::new();
        let mut successful = 0u64;
        for result in results.iter().filter(|result| result.success) {
            successful += 1;
            if let Some(latency) = result.latency {
                latencies.push(latency);
            }
        }

        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        };

        let summary = LatencySummary::compute(latencies);
        Self {
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            success_rate,
            avg_latency: summary.as_ref().map(|s| s.mean),
            min_latency: summary.as_ref().map(|s| s.min),
            max_latency: summary.as_ref().map(|s| s.max),
            median_latency: summary.as_ref().map(|s| s.median),
        }
    }
}

struct LatencySummary {
    mean: Duration,
    min: Duration,
    max: Duration,
    median: Duration,
}

impl LatencySummary {
    fn compute(mut samples: Vec<Duration>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();

        let count = samples.len();
        // Integer nanosecond sums keep the mean independent of arrival order.
        let total_nanos: u128 = samples.iter().map(Duration::as_nanos).sum();
        let mean = nanos_to_duration(total_nanos / count as u128);

        let mid = count / 2;
        let median = if count % 2 == 0 {
            nanos_to_duration((samples[mid - 1].as_nanos() + samples[mid].as_nanos()) / 2)
        } else {
            samples[mid]
        };

        Some(Self {
            mean,
            min: samples[0],
            max: samples[count - 1],
            median,
        })
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(ms: u64) -> ProbeResult {
        ProbeResult::from_status(200, Duration::from_millis(ms))
    }

    fn http_error(ms: u64) -> ProbeResult {
        ProbeResult::from_status(500, Duration::from_millis(ms))
    }

    fn unreachable() -> ProbeResult {
        ProbeResult::network_failure("dns error")
    }

    #[test]
    fn empty_input_is_well_defined() {
        let report = LoadTestReport::from_results(&[]);
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.successful_requests, 0);
        assert_eq!(report.failed_requests, 0);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.avg_latency, None);
        assert_eq!(report.median_latency, None);
    }

    #[test]
    fn counts_partition_total() {
        let results = vec![ok(100), http_error(40), unreachable(), ok(300), unreachable()];
        let report = LoadTestReport::from_results(&results);
        assert_eq!(report.total_requests, 5);
        assert_eq!(report.successful_requests, 2);
        assert_eq!(report.failed_requests, 3);
        assert_eq!(
            report.successful_requests + report.failed_requests,
            report.total_requests
        );
        assert!((report.success_rate - 40.0).abs() < 1e-9);
    }

    #[test]
    fn latency_ignores_failed_requests() {
        let results = vec![ok(100), http_error(5), ok(200), ok(600)];
        let report = LoadTestReport::from_results(&results);
        assert_eq!(report.min_latency, Some(Duration::from_millis(100)));
        assert_eq!(report.max_latency, Some(Duration::from_millis(600)));
        assert_eq!(report.avg_latency, Some(Duration::from_millis(300)));
        assert_eq!(report.median_latency, Some(Duration::from_millis(200)));
    }

    #[test]
    fn even_count_median_is_midpoint() {
        let results = vec![ok(400), ok(100), ok(300), ok(200)];
        let report = LoadTestReport::from_results(&results);
        assert_eq!(report.median_latency, Some(Duration::from_millis(250)));
    }

    #[test]
    fn all_failures_leave_latency_absent() {
        let results = vec![unreachable(), http_error(20), unreachable()];
        let report = LoadTestReport::from_results(&results);
        assert_eq!(report.successful_requests, 0);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.avg_latency, None);
        assert_eq!(report.min_latency, None);
        assert_eq!(report.max_latency, None);
        assert_eq!(report.median_latency, None);
    }

    #[test]
    fn report_is_order_independent() {
        let results = vec![
            ok(130),
            unreachable(),
            ok(17),
            http_error(3),
            ok(999),
            ok(41),
            ok(41),
        ];
        let baseline = LoadTestReport::from_results(&results);

        let mut reversed = results.clone();
        reversed.reverse();
        assert_eq!(LoadTestReport::from_results(&reversed), baseline);

        for shift in 1..results.len() {
            let mut rotated = results.clone();
            rotated.rotate_left(shift);
            assert_eq!(LoadTestReport::from_results(&rotated), baseline);
        }
    }

    #[test]
    fn serialises_latency_as_seconds() {
        let report = LoadTestReport::from_results(&[ok(500), unreachable()]);
        let value = serde_json::to_value(&report).expect("json");
        assert_eq!(value["successful_requests"], 1);
        assert_eq!(value["success_rate"], 50.0);
        assert_eq!(value["avg_response_time"], 0.5);

        let empty = serde_json::to_value(LoadTestReport::from_results(&[])).expect("json");
        assert!(empty["median_response_time"].is_null());
    }
}
