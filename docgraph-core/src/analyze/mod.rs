// Analytics over the deployment history: success rates, health and trends.
//
// Every aggregate is computed from a committed snapshot and orders events by
// their `created_at`, never by storage order.

pub mod health;
pub mod scan;
pub mod similarity;
pub mod stats;
pub mod trends;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::config::AnalyticsSection;
use crate::contracts::keys;
use crate::store::schema::{DeploymentRecord, PropertyRecord};
use crate::store::{GraphSnapshot, GraphStore};
use crate::types::{EdgeKind, NodeId, NodeKind};

pub use health::HealthReport;
pub use scan::ScanControl;
pub use similarity::{SimilarProject, similar_projects};
pub use stats::SsgStatistics;
pub use trends::{SsgTrend, TrendDirection, TrendReport, TrendWindow};

/// One deployment attempt, flattened out of a `project_deployed_with` edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub project: NodeId,
    pub ssg: String,
    pub success: bool,
    pub at: DateTime<Utc>,
    pub build_time_ms: Option<u64>,
}

/// Which projects' history an aggregate covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    All,
    Projects(BTreeSet<NodeId>),
}

impl Scope {
    pub fn contains(&self, project: &NodeId) -> bool {
        match self {
            Self::All => true,
            Self::Projects(ids) => ids.contains(project),
        }
    }
}

/// Collect deployments in `scope`, sorted by event time.
pub fn collect_deployments(
    snapshot: &GraphSnapshot,
    scope: &Scope,
    control: &ScanControl,
) -> crate::error::Result<Vec<Deployment>> {
    const OP: &str = "collect_deployments";
    let mut out = Vec::new();
    for (i, edge) in snapshot.edges_of_kind(EdgeKind::ProjectDeployedWith).enumerate() {
        control.step(i, OP)?;
        if !scope.contains(&edge.source) {
            continue;
        }
        let Some(record) = DeploymentRecord::from_properties(&edge.properties) else {
            continue;
        };
        let Some(ssg) = snapshot
            .node(&edge.target)
            .and_then(|n| n.str_property(keys::SSG))
        else {
            continue;
        };
        out.push(Deployment {
            project: edge.source.clone(),
            ssg: ssg.to_string(),
            success: record.success,
            at: edge.created_at,
            build_time_ms: record.build_time_ms,
        });
    }
    control.check(OP)?;
    out.sort_by(|a, b| {
        a.at.cmp(&b.at)
            .then_with(|| a.project.cmp(&b.project))
            .then_with(|| a.ssg.cmp(&b.ssg))
    });
    Ok(out)
}

/// Every SSG with a configuration node, sorted by name.
pub fn known_ssgs(snapshot: &GraphSnapshot) -> Vec<String> {
    snapshot
        .nodes()
        .iter()
        .filter(|n| n.kind == NodeKind::Configuration)
        .filter_map(|n| n.str_property(keys::SSG))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Read-only aggregation facade over a store.
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    store: Arc<dyn GraphStore>,
    config: AnalyticsSection,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<dyn GraphStore>, config: AnalyticsSection) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AnalyticsSection {
        &self.config
    }

    /// A control carrying the configured default deadline.
    pub fn control(&self) -> ScanControl {
        ScanControl::from_config(&self.config)
    }

    pub fn ssg_statistics(
        &self,
        ssg: &str,
        scope: &Scope,
        control: &ScanControl,
    ) -> crate::error::Result<SsgStatistics> {
        let snapshot = self.store.snapshot();
        let deployments = collect_deployments(&snapshot, scope, control)?;
        Ok(stats::ssg_statistics(&deployments, ssg))
    }

    /// Rank the given SSGs by success rate, sample size, then recency of
    /// their last success.
    #[instrument(skip_all, fields(count = ssgs.len()))]
    pub fn compare_ssgs(
        &self,
        ssgs: &[String],
        scope: &Scope,
        control: &ScanControl,
    ) -> crate::error::Result<Vec<SsgStatistics>> {
        let snapshot = self.store.snapshot();
        let deployments = collect_deployments(&snapshot, scope, control)?;
        let ranked = stats::compare_ssgs(&deployments, ssgs, control)?;
        debug!(ranked = ranked.len(), deployments = deployments.len(), "Compared SSGs");
        Ok(ranked)
    }

    /// Rank every SSG the graph knows about.
    pub fn rank_known_ssgs(
        &self,
        scope: &Scope,
        control: &ScanControl,
    ) -> crate::error::Result<Vec<SsgStatistics>> {
        let snapshot = self.store.snapshot();
        let ssgs = known_ssgs(&snapshot);
        let deployments = collect_deployments(&snapshot, scope, control)?;
        stats::compare_ssgs(&deployments, &ssgs, control)
    }

    pub fn health_report(&self, control: &ScanControl) -> crate::error::Result<HealthReport> {
        let snapshot = self.store.snapshot();
        let deployments = collect_deployments(&snapshot, &Scope::All, control)?;
        Ok(health::health_report(&deployments, &self.config, Utc::now()))
    }

    /// Composite health score in `[0, 100]`.
    pub fn health_score(&self, control: &ScanControl) -> crate::error::Result<u8> {
        Ok(self.health_report(control)?.score)
    }

    pub fn identify_trends(
        &self,
        period_days: u32,
        control: &ScanControl,
    ) -> crate::error::Result<TrendReport> {
        let snapshot = self.store.snapshot();
        let deployments = collect_deployments(&snapshot, &Scope::All, control)?;
        trends::identify_trends(&deployments, period_days, &self.config, Utc::now())
    }

    /// Projects similar to `project`, best match first.
    pub fn similar_projects(&self, project: &NodeId) -> Vec<SimilarProject> {
        similar_projects(&self.store.snapshot(), project)
    }
}
