// Deployment event recording with retry suppression.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::EventsSection;
use crate::contracts::{META_NAMESPACE, keys, normalize_ssg};
use crate::error::{StoreError, ValidationError};
use crate::store::GraphStore;
use crate::store::schema::{ConfigurationRecord, DeploymentRecord, PropertyRecord};
use crate::types::{Edge, EdgeKind, Node, NodeId, NodeKind, Properties};

/// Caller-supplied details about one deployment attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentMetadata {
    /// When the attempt happened; defaults to the time of recording.
    pub timestamp: Option<DateTime<Utc>>,
    pub build_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub deployment_url: Option<String>,
    /// Free-form extras, stored under the `meta.` namespace.
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct EventTracker {
    store: Arc<dyn GraphStore>,
    config: EventsSection,
}

impl EventTracker {
    pub fn new(store: Arc<dyn GraphStore>, config: EventsSection) -> Self {
        Self { store, config }
    }

    /// Find or lazily create the configuration node for an SSG.
    pub async fn ensure_configuration(&self, ssg: &str) -> crate::error::Result<Node> {
        ensure_configuration(self.store.as_ref(), ssg).await
    }

    /// Record a deployment attempt as a `project_deployed_with` edge.
    ///
    /// A retry carrying the same idempotency token within the dedup window,
    /// or a tokenless exact duplicate (same SSG, outcome and second), returns
    /// the edge already recorded instead of appending a new one.
    #[instrument(skip_all, fields(project = %project_id, ssg = %ssg))]
    pub async fn record_deployment(
        &self,
        project_id: &NodeId,
        ssg: &str,
        success: bool,
        metadata: DeploymentMetadata,
        idempotency_token: Option<&str>,
    ) -> crate::error::Result<Edge> {
        let snapshot = self.store.snapshot();
        match snapshot.node(project_id) {
            Some(node) if node.kind == NodeKind::Project => {}
            Some(node) => {
                return Err(ValidationError::InvalidValue {
                    field: project_id.to_string(),
                    reason: format!("expected a project node, found {}", node.kind),
                }
                .into());
            }
            None => return Err(StoreError::NodeNotFound(project_id.clone()).into()),
        }
        drop(snapshot);

        let configuration = self.ensure_configuration(ssg).await?;
        let timestamp = metadata.timestamp.unwrap_or_else(Utc::now);
        let token = idempotency_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let record = DeploymentRecord {
            success,
            timestamp,
            idempotency_token: token.clone(),
            build_time_ms: metadata.build_time_ms,
            error_message: metadata.error_message,
            deployment_url: metadata.deployment_url,
        };
        let mut properties = record.to_properties()?;
        for (key, value) in metadata.extra {
            properties.insert(format!("{META_NAMESPACE}{key}"), value);
        }

        let window = i64::try_from(self.config.dedup_window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let target = configuration.id.clone();
        let is_duplicate = move |edge: &Edge| match &token {
            Some(token) => is_token_retry(edge, token, timestamp, window),
            None => edge.target == target && is_exact_duplicate(edge, success, timestamp),
        };

        let outcome = self
            .store
            .add_edge_dedup(
                EdgeKind::ProjectDeployedWith,
                project_id,
                &configuration.id,
                properties,
                &is_duplicate,
            )
            .await?;

        if outcome.was_inserted() {
            info!(
                configuration = %configuration.id,
                success,
                "Recorded deployment"
            );
        } else {
            debug!(edge = %outcome.edge().id, "Suppressed duplicate deployment");
        }
        Ok(outcome.into_edge())
    }

    /// All deployments of a project, oldest first by event time.
    pub fn deployment_history(&self, project_id: &NodeId) -> Vec<Edge> {
        let snapshot = self.store.snapshot();
        let mut edges: Vec<Edge> = snapshot
            .edges_from(EdgeKind::ProjectDeployedWith, project_id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        edges
    }
}

/// Configuration nodes are created the first time an SSG is referenced and
/// never overwritten afterwards.
pub(crate) async fn ensure_configuration(
    store: &dyn GraphStore,
    ssg: &str,
) -> crate::error::Result<Node> {
    let ssg = checked_ssg(ssg)?;
    let mut lookup = Properties::new();
    lookup.insert(keys::SSG.into(), ssg.clone().into());
    if let Some(node) = store
        .snapshot()
        .node_by_natural_key(NodeKind::Configuration, &lookup)
    {
        return Ok(node.clone());
    }
    let record = ConfigurationRecord {
        ssg,
        first_seen: Utc::now(),
    };
    let outcome = store
        .find_or_create_node(NodeKind::Configuration, record.to_properties()?)
        .await?;
    if outcome.created {
        info!(configuration = %outcome.node.id, "Created configuration");
    }
    Ok(outcome.node)
}

pub(crate) fn checked_ssg(ssg: &str) -> Result<String, ValidationError> {
    let ssg = normalize_ssg(ssg);
    if ssg.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: keys::SSG.into(),
            reason: "must not be empty".into(),
        });
    }
    Ok(ssg)
}

fn is_token_retry(edge: &Edge, token: &str, timestamp: DateTime<Utc>, window: Duration) -> bool {
    let Some(existing) = DeploymentRecord::from_properties(&edge.properties) else {
        return false;
    };
    existing.idempotency_token.as_deref() == Some(token)
        && (existing.timestamp - timestamp).abs() <= window
}

fn is_exact_duplicate(edge: &Edge, success: bool, timestamp: DateTime<Utc>) -> bool {
    let Some(existing) = DeploymentRecord::from_properties(&edge.properties) else {
        return false;
    };
    existing.idempotency_token.is_none()
        && existing.success == success
        && truncate_to_second(existing.timestamp) == truncate_to_second(timestamp)
}

fn truncate_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::seconds(1)).unwrap_or(t)
}
