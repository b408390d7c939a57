// Per-SSG success statistics and ranking.
#![allow(clippy::cast_precision_loss)]

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::normalize_ssg;

use super::{Deployment, ScanControl};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsgStatistics {
    pub ssg: String,
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    /// `successes / total`, or `0.0` when there is no history.
    pub rate: f64,
    pub sample_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_deployment: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_build_time_ms: Option<f64>,
}

impl SsgStatistics {
    pub fn empty(ssg: &str) -> Self {
        Self {
            ssg: ssg.to_string(),
            total: 0,
            successes: 0,
            failures: 0,
            rate: 0.0,
            sample_size: 0,
            last_success: None,
            last_deployment: None,
            avg_build_time_ms: None,
        }
    }

    pub fn has_history(&self) -> bool {
        self.total > 0
    }
}

/// Aggregate the deployments of one SSG.
pub fn ssg_statistics(deployments: &[Deployment], ssg: &str) -> SsgStatistics {
    let ssg = normalize_ssg(ssg);
    let mut stats = SsgStatistics::empty(&ssg);
    let mut build_total = 0u64;
    let mut build_count = 0u64;

    for d in deployments.iter().filter(|d| d.ssg == ssg) {
        stats.total += 1;
        if d.success {
            stats.successes += 1;
            stats.last_success = stats.last_success.max(Some(d.at));
        } else {
            stats.failures += 1;
        }
        stats.last_deployment = stats.last_deployment.max(Some(d.at));
        if let Some(ms) = d.build_time_ms {
            build_total = build_total.saturating_add(ms);
            build_count += 1;
        }
    }

    stats.sample_size = stats.total;
    if stats.total > 0 {
        stats.rate = stats.successes as f64 / stats.total as f64;
    }
    if build_count > 0 {
        stats.avg_build_time_ms = Some(build_total as f64 / build_count as f64);
    }
    stats
}

/// Ranking order: rate desc, sample size desc, last success desc, name asc.
pub fn ranking(a: &SsgStatistics, b: &SsgStatistics) -> Ordering {
    b.rate
        .total_cmp(&a.rate)
        .then_with(|| b.sample_size.cmp(&a.sample_size))
        .then_with(|| b.last_success.cmp(&a.last_success))
        .then_with(|| a.ssg.cmp(&b.ssg))
}

/// Statistics for each distinct SSG in `ssgs`, ranked.
pub fn compare_ssgs(
    deployments: &[Deployment],
    ssgs: &[String],
    control: &ScanControl,
) -> crate::error::Result<Vec<SsgStatistics>> {
    const OP: &str = "compare_ssgs";
    let mut names: Vec<String> = ssgs
        .iter()
        .map(|s| normalize_ssg(s))
        .filter(|s| !s.is_empty())
        .collect();
    names.sort();
    names.dedup();

    let mut ranked = Vec::with_capacity(names.len());
    for (i, ssg) in names.iter().enumerate() {
        control.step(i, OP)?;
        ranked.push(ssg_statistics(deployments, ssg));
    }
    control.check(OP)?;
    ranked.sort_by(ranking);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;
    use chrono::Duration;
    use proptest::prelude::*;

    fn deployment(ssg: &str, success: bool, minutes: i64) -> Deployment {
        Deployment {
            project: NodeId::from("project:p"),
            ssg: ssg.into(),
            success,
            at: DateTime::from_timestamp(1_767_225_600, 0).unwrap() + Duration::minutes(minutes),
            build_time_ms: None,
        }
    }

    #[test]
    fn empty_history_is_zero_not_nan() {
        let stats = ssg_statistics(&[], "hugo");
        assert_eq!(stats.total, 0);
        assert_eq!(stats.sample_size, 0);
        assert!(stats.rate.abs() < f64::EPSILON);
        assert!(!stats.rate.is_nan());
    }

    #[test]
    fn counts_and_recency() {
        let history = vec![
            deployment("hugo", true, 0),
            deployment("hugo", false, 10),
            deployment("hugo", true, 5),
            deployment("jekyll", true, 20),
        ];
        let stats = ssg_statistics(&history, "Hugo");
        assert_eq!((stats.total, stats.successes, stats.failures), (3, 2, 1));
        assert!((stats.rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.last_success, Some(history[2].at));
        assert_eq!(stats.last_deployment, Some(history[1].at));
    }

    #[test]
    fn average_build_time_ignores_missing_samples() {
        let mut a = deployment("hugo", true, 0);
        a.build_time_ms = Some(1000);
        let mut b = deployment("hugo", true, 1);
        b.build_time_ms = Some(3000);
        let c = deployment("hugo", true, 2);
        let stats = ssg_statistics(&[a, b, c], "hugo");
        assert_eq!(stats.avg_build_time_ms, Some(2000.0));
    }

    #[test]
    fn ranking_breaks_ties_by_sample_then_recency() {
        let history = vec![
            deployment("hugo", true, 0),
            deployment("hugo", true, 1),
            deployment("jekyll", true, 0),
            deployment("mkdocs", true, 5),
            deployment("docusaurus", false, 9),
        ];
        let names: Vec<String> = ["docusaurus", "jekyll", "mkdocs", "hugo", "hugo", "astro"]
            .map(String::from)
            .to_vec();
        let ranked = compare_ssgs(&history, &names, &ScanControl::new()).unwrap();
        let order: Vec<&str> = ranked.iter().map(|s| s.ssg.as_str()).collect();
        // hugo has the larger sample; mkdocs succeeded more recently than jekyll;
        // astro and docusaurus both sit at rate 0, the larger sample first.
        assert_eq!(order, vec!["hugo", "mkdocs", "jekyll", "docusaurus", "astro"]);
    }

    proptest! {
        #[test]
        fn rate_is_successes_over_total(outcomes in proptest::collection::vec(any::<bool>(), 0..64)) {
            let history: Vec<Deployment> = outcomes
                .iter()
                .enumerate()
                .map(|(i, &ok)| deployment("hugo", ok, i64::try_from(i).unwrap()))
                .collect();
            let stats = ssg_statistics(&history, "hugo");
            prop_assert_eq!(stats.successes + stats.failures, stats.total);
            prop_assert!((0.0..=1.0).contains(&stats.rate));
            if stats.total == 0 {
                prop_assert!(stats.rate == 0.0);
            } else {
                prop_assert!((stats.rate - stats.successes as f64 / stats.total as f64).abs() < 1e-12);
            }
        }
    }
}
