// Composite deployment health score.
//
// Statistical computations intentionally cast int→float.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalyticsSection;

use super::Deployment;

/// The composite score and the `[0, 1]` components it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: u8,
    pub success_rate: f64,
    pub active_trend: f64,
    pub frequency: f64,
    pub diversity: f64,
    pub total_deployments: u64,
    /// Distinct projects deploying in the trailing window.
    pub active_projects: u64,
    pub window_days: u32,
}

/// Score the deployment history as of `now`.
///
/// Components, each in `[0, 1]`:
/// - success rate over all recorded deployments;
/// - active-project trend: `0.5 + 0.5 * (current - previous) / max(current, previous)`
///   comparing the trailing window with the one before it, `0` when both are empty;
/// - frequency: deployments in the trailing window over the configured target, capped at 1;
/// - diversity: normalized Herfindahl complement of the SSG mix, `0` for a single SSG.
///
/// The weighted sum is scaled to 100, rounded and clamped. No history scores 0.
pub fn health_report(
    deployments: &[Deployment],
    config: &AnalyticsSection,
    now: DateTime<Utc>,
) -> HealthReport {
    let window = Duration::days(i64::from(config.health_window_days));
    let current_start = now - window;
    let previous_start = current_start - window;

    let total = deployments.len() as u64;
    let successes = deployments.iter().filter(|d| d.success).count() as u64;
    let success_rate = if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64
    };

    let active_in = |start: DateTime<Utc>, end: DateTime<Utc>| {
        deployments
            .iter()
            .filter(|d| d.at >= start && d.at < end)
            .map(|d| &d.project)
            .collect::<BTreeSet<_>>()
            .len() as f64
    };
    let current = active_in(current_start, now);
    let previous = active_in(previous_start, current_start);
    let active_trend = if current == 0.0 && previous == 0.0 {
        0.0
    } else {
        0.5 + 0.5 * (current - previous) / current.max(previous)
    };

    let recent = deployments
        .iter()
        .filter(|d| d.at >= current_start && d.at < now)
        .count() as f64;
    let target = f64::from(config.target_deployments_per_window.max(1));
    let frequency = (recent / target).min(1.0);

    let diversity = diversity(deployments);

    let w = &config.health_weights;
    let weight_sum = w.success_rate + w.active_trend + w.frequency + w.diversity;
    let weighted = if weight_sum > 0.0 {
        (w.success_rate * success_rate
            + w.active_trend * active_trend
            + w.frequency * frequency
            + w.diversity * diversity)
            / weight_sum
    } else {
        0.0
    };
    let score = (weighted * 100.0).round().clamp(0.0, 100.0) as u8;

    HealthReport {
        score,
        success_rate,
        active_trend,
        frequency,
        diversity,
        total_deployments: total,
        active_projects: current as u64,
        window_days: config.health_window_days,
    }
}

/// `(1 - HHI) / (1 - 1/n)` over the SSG share of deployments.
fn diversity(deployments: &[Deployment]) -> f64 {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for d in deployments {
        *counts.entry(d.ssg.as_str()).or_default() += 1;
    }
    let n = counts.len();
    if n < 2 {
        return 0.0;
    }
    let total = deployments.len() as f64;
    let hhi: f64 = counts
        .values()
        .map(|&c| {
            let share = c as f64 / total;
            share * share
        })
        .sum();
    ((1.0 - hhi) / (1.0 - 1.0 / n as f64)).clamp(0.0, 1.0)
}
