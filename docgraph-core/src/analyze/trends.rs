// Period-over-period success-rate trends.
#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalyticsSection;
use crate::error::ValidationError;

use super::Deployment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

impl TrendDirection {
    /// Classify a delta in percentage points.
    pub fn classify(delta_pct: f64, threshold_pct: f64) -> Self {
        if delta_pct > threshold_pct {
            Self::Improving
        } else if delta_pct < -threshold_pct {
            Self::Declining
        } else {
            Self::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One non-empty bucket, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total: u64,
    pub successes: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsgTrend {
    pub direction: TrendDirection,
    /// Success-rate change between consecutive non-empty windows, in percentage points.
    pub deltas: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub period_days: u32,
    /// Taken from the most recent delta; `stable` with fewer than two windows.
    pub direction: TrendDirection,
    /// Oldest first.
    pub windows: Vec<TrendWindow>,
    pub deltas: Vec<f64>,
    pub by_ssg: BTreeMap<String, SsgTrend>,
}

/// Bucket deployments into `period_days`-wide windows ending at `now` and
/// classify the change between consecutive windows.
pub fn identify_trends(
    deployments: &[Deployment],
    period_days: u32,
    config: &AnalyticsSection,
    now: DateTime<Utc>,
) -> crate::error::Result<TrendReport> {
    if period_days == 0 {
        return Err(ValidationError::InvalidValue {
            field: "period_days".into(),
            reason: "must be positive".into(),
        }
        .into());
    }
    let period = Duration::days(i64::from(period_days));
    let threshold = config.trend_threshold_pct;

    let windows = bucket(deployments.iter(), period, config.max_trend_windows, now);
    let deltas = deltas(&windows);
    let direction = direction(&deltas, threshold);

    let mut per_ssg: BTreeMap<&str, Vec<&Deployment>> = BTreeMap::new();
    for d in deployments {
        per_ssg.entry(d.ssg.as_str()).or_default().push(d);
    }
    let by_ssg = per_ssg
        .into_iter()
        .map(|(ssg, items)| {
            let windows = bucket(items.into_iter(), period, config.max_trend_windows, now);
            let deltas = self::deltas(&windows);
            let trend = SsgTrend {
                direction: self::direction(&deltas, threshold),
                deltas,
            };
            (ssg.to_string(), trend)
        })
        .collect();

    Ok(TrendReport {
        period_days,
        direction,
        windows,
        deltas,
        by_ssg,
    })
}

fn bucket<'a>(
    deployments: impl Iterator<Item = &'a Deployment>,
    period: Duration,
    max_windows: u32,
    now: DateTime<Utc>,
) -> Vec<TrendWindow> {
    // Index 0 is the most recent window.
    let mut counts: BTreeMap<u32, (u64, u64)> = BTreeMap::new();
    for d in deployments {
        if d.at >= now {
            continue;
        }
        let age = now - d.at;
        let Ok(index) = u32::try_from(age.num_seconds() / period.num_seconds()) else {
            continue;
        };
        if index >= max_windows {
            continue;
        }
        let entry = counts.entry(index).or_default();
        entry.0 += 1;
        if d.success {
            entry.1 += 1;
        }
    }

    counts
        .into_iter()
        .rev()
        .map(|(index, (total, successes))| {
            let end = now - period * i32::try_from(index).unwrap_or(i32::MAX);
            TrendWindow {
                start: end - period,
                end,
                total,
                successes,
                rate: successes as f64 / total as f64,
            }
        })
        .collect()
}

fn deltas(windows: &[TrendWindow]) -> Vec<f64> {
    windows
        .windows(2)
        .map(|pair| (pair[1].rate - pair[0].rate) * 100.0)
        .collect()
}

fn direction(deltas: &[f64], threshold_pct: f64) -> TrendDirection {
    deltas
        .last()
        .map_or(TrendDirection::Stable, |&d| TrendDirection::classify(d, threshold_pct))
}
