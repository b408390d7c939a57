use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::keys;

// ── Typed ID wrappers ──────────────────────────────────────────────

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

typed_id!(NodeId);
typed_id!(EdgeId);

/// Free-form property bag persisted with every node and edge.
///
/// A `BTreeMap` keeps serialization order stable so identical graphs produce
/// byte-identical documents.
pub type Properties = BTreeMap<String, serde_json::Value>;

// ── Node types ─────────────────────────────────────────────────────

/// Every entity docgraph tracks is a node of one of these types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A repository that has been analyzed at least once.
    Project,
    /// A static site generator, keyed by its normalized name.
    Configuration,
    /// A single repository analysis run.
    Analysis,
    /// A person whose SSG usage is tracked for preference learning.
    User,
}

impl NodeKind {
    pub const ALL: [Self; 4] = [Self::Project, Self::Configuration, Self::Analysis, Self::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Configuration => "configuration",
            Self::Analysis => "analysis",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    /// Never moves backwards, even if the wall clock does.
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Archived nodes are kept for analytics but hidden from default queries.
    pub fn is_archived(&self) -> bool {
        self.properties
            .get(keys::ARCHIVED_AT)
            .is_some_and(|v| !v.is_null())
    }

    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(serde_json::Value::as_str)
    }
}

// ── Edge types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Project → Analysis: the project was scanned by this analysis run.
    ProjectAnalyzedBy,
    /// Project → Configuration: a deployment attempt with its outcome.
    ProjectDeployedWith,
    /// Project → Configuration: a recommendation was issued for the project.
    ProjectRecommended,
    /// User → Configuration: the user has used this SSG.
    UserPrefers,
}

impl EdgeKind {
    pub const ALL: [Self; 4] = [
        Self::ProjectAnalyzedBy,
        Self::ProjectDeployedWith,
        Self::ProjectRecommended,
        Self::UserPrefers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectAnalyzedBy => "project_analyzed_by",
            Self::ProjectDeployedWith => "project_deployed_with",
            Self::ProjectRecommended => "project_recommended",
            Self::UserPrefers => "user_prefers",
        }
    }

    /// The `(source, target)` node types this edge type connects.
    pub fn endpoints(&self) -> (NodeKind, NodeKind) {
        match self {
            Self::ProjectAnalyzedBy => (NodeKind::Project, NodeKind::Analysis),
            Self::ProjectDeployedWith | Self::ProjectRecommended => {
                (NodeKind::Project, NodeKind::Configuration)
            }
            Self::UserPrefers => (NodeKind::User, NodeKind::Configuration),
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed relationship between two existing nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub source: NodeId,
    pub target: NodeId,
    pub properties: Properties,
    /// Authoritative event time. Analytics orders by this, never by storage order.
    pub created_at: DateTime<Utc>,
}

// ── Store query types ──────────────────────────────────────────────

/// Filter for finding nodes in the store. All set fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeFilter {
    /// Only return nodes of this type.
    pub kind: Option<NodeKind>,
    /// Only return nodes whose properties contain all of these exact values.
    pub properties: Properties,
    /// Only return nodes updated at or after this instant.
    pub updated_since: Option<DateTime<Utc>>,
    /// Include soft-archived nodes (excluded by default).
    pub include_archived: bool,
    /// Maximum number of results to return.
    pub limit: Option<usize>,
}

impl NodeFilter {
    pub fn of_kind(kind: NodeKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        if self.kind.is_some_and(|k| k != node.kind) {
            return false;
        }
        if !self.include_archived && node.is_archived() {
            return false;
        }
        if self.updated_since.is_some_and(|t| node.updated_at < t) {
            return false;
        }
        self.properties
            .iter()
            .all(|(k, v)| node.properties.get(k) == Some(v))
    }
}

/// Filter for finding edges in the store. All set fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeFilter {
    pub kind: Option<EdgeKind>,
    pub source: Option<NodeId>,
    pub target: Option<NodeId>,
    /// Only edges whose `created_at` is at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only edges whose `created_at` is strictly before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Only edges whose properties contain all of these exact values.
    pub properties: Properties,
    pub limit: Option<usize>,
}

impl EdgeFilter {
    pub fn of_kind(kind: EdgeKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn from_source(mut self, source: &NodeId) -> Self {
        self.source = Some(source.clone());
        self
    }

    #[must_use]
    pub fn to_target(mut self, target: &NodeId) -> Self {
        self.target = Some(target.clone());
        self
    }

    pub fn matches(&self, edge: &Edge) -> bool {
        if self.kind.is_some_and(|k| k != edge.kind) {
            return false;
        }
        if self.source.as_ref().is_some_and(|s| *s != edge.source) {
            return false;
        }
        if self.target.as_ref().is_some_and(|t| *t != edge.target) {
            return false;
        }
        if self.since.is_some_and(|t| edge.created_at < t) {
            return false;
        }
        if self.until.is_some_and(|t| edge.created_at >= t) {
            return false;
        }
        self.properties
            .iter()
            .all(|(k, v)| edge.properties.get(k) == Some(v))
    }
}

/// Summary statistics for the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_nodes: u64,
    pub total_edges: u64,
    pub archived_nodes: u64,
    /// Node count broken down by `NodeKind`.
    pub nodes_by_kind: BTreeMap<String, u64>,
    /// Edge count broken down by `EdgeKind`.
    pub edges_by_kind: BTreeMap<String, u64>,
    /// Graph file size in bytes (0 for in-memory stores).
    pub file_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: NodeKind, props: Properties) -> Node {
        let now = Utc::now();
        Node {
            id: NodeId::from("n1"),
            kind,
            properties: props,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&EdgeKind::ProjectDeployedWith).unwrap(),
            "\"project_deployed_with\""
        );
        assert_eq!(serde_json::to_string(&NodeKind::User).unwrap(), "\"user\"");
        for kind in EdgeKind::ALL {
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
    }

    #[test]
    fn node_serializes_with_storage_field_names() {
        let n = node(NodeKind::Project, Properties::new());
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "project");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
    }

    #[test]
    fn node_filter_hides_archived_by_default() {
        let mut props = Properties::new();
        props.insert(keys::ARCHIVED_AT.into(), serde_json::json!("2026-01-01T00:00:00Z"));
        let n = node(NodeKind::Project, props);

        assert!(!NodeFilter::of_kind(NodeKind::Project).matches(&n));
        let filter = NodeFilter {
            include_archived: true,
            ..NodeFilter::of_kind(NodeKind::Project)
        };
        assert!(filter.matches(&n));
    }

    #[test]
    fn node_filter_matches_property_values() {
        let mut props = Properties::new();
        props.insert("ssg".into(), serde_json::json!("hugo"));
        let n = node(NodeKind::Configuration, props);

        assert!(NodeFilter::default().with_property("ssg", "hugo").matches(&n));
        assert!(!NodeFilter::default().with_property("ssg", "jekyll").matches(&n));
        assert!(!NodeFilter::of_kind(NodeKind::User).matches(&n));
    }
}
