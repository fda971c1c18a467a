use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::BrowserKind;
use crate::driver::PageLoadMetrics;

const BASELINE: f64 = 100.0;
const BROKEN_LINK_PENALTY: f64 = 10.0;
const SUCCESS_RATE_TARGET: f64 = 95.0;

/// Sub-metrics the composite score is computed from. Absent categories
/// contribute no penalty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInputs<'a> {
    pub load_times: Option<&'a BTreeMap<BrowserKind, PageLoadMetrics>>,
    pub broken_links: Option<usize>,
    pub mobile_score: Option<u32>,
    pub success_rate: Option<f64>,
}

/// Individual penalties and the resulting score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub load_time_penalties: BTreeMap<BrowserKind, f64>,
    pub broken_link_penalty: f64,
    pub mobile_penalty: f64,
    pub success_rate_penalty: f64,
    pub total_penalty: f64,
    pub score: u8,
}

impl ScoreBreakdown {
    pub fn compute(inputs: &ScoreInputs<'_>) -> Self {
        let load_time_penalties: BTreeMap<BrowserKind, f64> = inputs
            .load_times
            .into_iter()
            .flatten()
            .filter_map(|(browser, metrics)| {
                metrics
                    .total_load_time
                    .map(|secs| (*browser, load_time_penalty(secs)))
            })
            .collect();
        let broken_link_penalty = inputs
            .broken_links
            .map_or(0.0, |count| count as f64 * BROKEN_LINK_PENALTY);
        let mobile_penalty = inputs.mobile_score.map_or(0.0, mobile_penalty);
        let success_rate_penalty = inputs.success_rate.map_or(0.0, success_rate_penalty);

        let total_penalty = load_time_penalties.values().sum::<f64>()
            + broken_link_penalty
            + mobile_penalty
            + success_rate_penalty;
        let score = (BASELINE - total_penalty).clamp(0.0, 100.0).round() as u8;

        Self {
            load_time_penalties,
            broken_link_penalty,
            mobile_penalty,
            success_rate_penalty,
            total_penalty,
            score,
        }
    }
}

pub fn calculate_performance_score(inputs: &ScoreInputs<'_>) -> u8 {
    ScoreBreakdown::compute(inputs).score
}

fn load_time_penalty(secs: f64) -> f64 {
    if secs > 5.0 {
        25.0
    } else if secs > 3.0 {
        15.0
    } else if secs > 2.0 {
        10.0
    } else if secs > 1.0 {
        5.0
    } else {
        0.0
    }
}

fn mobile_penalty(score: u32) -> f64 {
    if score < 70 {
        20.0
    } else if score < 85 {
        10.0
    } else {
        0.0
    }
}

fn success_rate_penalty(rate: f64) -> f64 {
    if rate < SUCCESS_RATE_TARGET {
        (SUCCESS_RATE_TARGET - rate) * 2.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_times(entries: &[(BrowserKind, Option<f64>)]) -> BTreeMap<BrowserKind, PageLoadMetrics> {
        entries
            .iter()
            .map(|(browser, secs)| {
                (
                    *browser,
                    PageLoadMetrics {
                        browser: *browser,
                        total_load_time: *secs,
                        ..PageLoadMetrics::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn baseline_only_scores_100() {
        assert_eq!(calculate_performance_score(&ScoreInputs::default()), 100);
    }

    #[test]
    fn load_time_thresholds() {
        assert_eq!(load_time_penalty(0.8), 0.0);
        assert_eq!(load_time_penalty(1.0), 0.0);
        assert_eq!(load_time_penalty(1.5), 5.0);
        assert_eq!(load_time_penalty(2.5), 10.0);
        assert_eq!(load_time_penalty(3.0), 10.0);
        assert_eq!(load_time_penalty(4.2), 15.0);
        assert_eq!(load_time_penalty(5.01), 25.0);
    }

    #[test]
    fn load_time_penalties_accumulate_across_browsers() {
        let times = load_times(&[
            (BrowserKind::Chrome, Some(2.5)),
            (BrowserKind::Firefox, Some(6.0)),
        ]);
        let inputs = ScoreInputs {
            load_times: Some(&times),
            ..ScoreInputs::default()
        };
        let breakdown = ScoreBreakdown::compute(&inputs);
        assert_eq!(breakdown.load_time_penalties[&BrowserKind::Chrome], 10.0);
        assert_eq!(breakdown.load_time_penalties[&BrowserKind::Firefox], 25.0);
        assert_eq!(breakdown.score, 65);
    }

    #[test]
    fn errored_browser_measurement_is_ignored() {
        let times = load_times(&[(BrowserKind::Chrome, None)]);
        let inputs = ScoreInputs {
            load_times: Some(&times),
            ..ScoreInputs::default()
        };
        assert_eq!(calculate_performance_score(&inputs), 100);
    }

    #[test]
    fn broken_links_cost_ten_each() {
        let inputs = ScoreInputs {
            broken_links: Some(3),
            ..ScoreInputs::default()
        };
        let breakdown = ScoreBreakdown::compute(&inputs);
        assert_eq!(breakdown.broken_link_penalty, 30.0);
        assert_eq!(breakdown.score, 70);
    }

    #[test]
    fn mobile_thresholds() {
        assert_eq!(mobile_penalty(69), 20.0);
        assert_eq!(mobile_penalty(70), 10.0);
        assert_eq!(mobile_penalty(84), 10.0);
        assert_eq!(mobile_penalty(85), 0.0);
    }

    #[test]
    fn success_rate_penalty_scales_below_target() {
        assert_eq!(success_rate_penalty(100.0), 0.0);
        assert_eq!(success_rate_penalty(95.0), 0.0);
        assert_eq!(success_rate_penalty(50.0), 90.0);
        assert_eq!(success_rate_penalty(0.0), 190.0);
        assert!((success_rate_penalty(94.5) - 1.0).abs() < 1e-9);

        let inputs = ScoreInputs {
            success_rate: Some(50.0),
            ..ScoreInputs::default()
        };
        assert_eq!(calculate_performance_score(&inputs), 10);
    }

    #[test]
    fn fractional_penalty_rounds_to_nearest() {
        let inputs = ScoreInputs {
            success_rate: Some(94.7),
            ..ScoreInputs::default()
        };
        let breakdown = ScoreBreakdown::compute(&inputs);
        assert!((breakdown.total_penalty - 0.6).abs() < 1e-9);
        assert_eq!(breakdown.score, 99);
    }

    #[test]
    fn combined_penalties_floor_at_zero() {
        let times = load_times(&[(BrowserKind::Chrome, Some(7.0))]);
        let inputs = ScoreInputs {
            load_times: Some(&times),
            broken_links: Some(3),
            mobile_score: Some(60),
            success_rate: Some(0.0),
        };
        let breakdown = ScoreBreakdown::compute(&inputs);
        assert_eq!(breakdown.success_rate_penalty, 190.0);
        assert_eq!(breakdown.total_penalty, 265.0);
        assert_eq!(breakdown.score, 0);
    }
}
