// Immutable committed view of the graph plus the indexes maintained on write.
//
// Writers clone the current snapshot, mutate the clone, persist it, then swap
// it in. Readers hold an `Arc<GraphSnapshot>` and never observe a partial write.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::keys;
use crate::error::StoreError;
use crate::types::{
    Edge, EdgeFilter, EdgeId, EdgeKind, Node, NodeFilter, NodeId, NodeKind, Properties, StoreStats,
};

use super::schema;

/// The versioned on-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub version: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    nodes: Vec<Node>,
    node_index: HashMap<NodeId, usize>,
    natural_index: HashMap<String, NodeId>,
    edges: Vec<Edge>,
    edge_index: HashMap<EdgeId, usize>,
    by_source: HashMap<(EdgeKind, NodeId), Vec<usize>>,
    by_kind: HashMap<EdgeKind, Vec<usize>>,
}

impl PartialEq for GraphSnapshot {
    /// Structural equality: same nodes and edges in the same order.
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl GraphSnapshot {
    // ── Reads ──────────────────────────────────────────────────────

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edge_index.get(id).map(|&i| &self.edges[i])
    }

    /// All nodes in insertion order, archived ones included.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edges of `kind` leaving `source`, via the `(kind, source)` index.
    pub fn edges_from<'a>(
        &'a self,
        kind: EdgeKind,
        source: &NodeId,
    ) -> impl Iterator<Item = &'a Edge> + use<'a> {
        self.by_source
            .get(&(kind, source.clone()))
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    pub fn find_nodes(&self, filter: &NodeFilter) -> Vec<Node> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        self.nodes
            .iter()
            .filter(|n| filter.matches(n))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn find_edges(&self, filter: &EdgeFilter) -> Vec<Edge> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        let candidates: Box<dyn Iterator<Item = &Edge> + '_> = match (filter.kind, &filter.source) {
            (Some(kind), Some(source)) => Box::new(self.edges_from(kind, source)),
            (Some(kind), None) => Box::new(self.edges_of_kind(kind)),
            _ => Box::new(self.edges.iter()),
        };
        candidates
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Look up an existing node by any of its natural keys.
    pub fn node_by_natural_key(&self, kind: NodeKind, props: &Properties) -> Option<&Node> {
        schema::natural_keys(kind, props)
            .iter()
            .find_map(|key| self.natural_index.get(key))
            .and_then(|id| self.node(id))
    }

    pub fn stats(&self) -> StoreStats {
        let mut nodes_by_kind: BTreeMap<String, u64> = BTreeMap::new();
        let mut archived = 0;
        for node in &self.nodes {
            *nodes_by_kind.entry(node.kind.to_string()).or_default() += 1;
            if node.is_archived() {
                archived += 1;
            }
        }
        let mut edges_by_kind: BTreeMap<String, u64> = BTreeMap::new();
        for edge in &self.edges {
            *edges_by_kind.entry(edge.kind.to_string()).or_default() += 1;
        }
        StoreStats {
            total_nodes: self.nodes.len() as u64,
            total_edges: self.edges.len() as u64,
            archived_nodes: archived,
            nodes_by_kind,
            edges_by_kind,
            file_size_bytes: 0,
        }
    }

    // ── Writes (only ever applied to a private clone) ──────────────

    pub(crate) fn insert_node(&mut self, node: Node) {
        for key in schema::natural_keys(node.kind, &node.properties) {
            self.natural_index.insert(key, node.id.clone());
        }
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    /// Replace an existing node in place, re-keying its natural index entries.
    pub(crate) fn replace_node(&mut self, node: Node) -> Result<(), StoreError> {
        let idx = *self
            .node_index
            .get(&node.id)
            .ok_or_else(|| StoreError::NodeNotFound(node.id.clone()))?;
        let old = &self.nodes[idx];
        for key in schema::natural_keys(old.kind, &old.properties) {
            if self.natural_index.get(&key) == Some(&old.id) {
                self.natural_index.remove(&key);
            }
        }
        for key in schema::natural_keys(node.kind, &node.properties) {
            self.natural_index.insert(key, node.id.clone());
        }
        self.nodes[idx] = node;
        Ok(())
    }

    /// Whether a natural key is held by a node other than `id`.
    pub(crate) fn natural_key_conflict(&self, id: &NodeId, node: &Node) -> Option<String> {
        schema::natural_keys(node.kind, &node.properties)
            .into_iter()
            .find(|key| self.natural_index.get(key).is_some_and(|owner| owner != id))
    }

    pub(crate) fn insert_edge(&mut self, edge: Edge) {
        let idx = self.edges.len();
        self.by_source
            .entry((edge.kind, edge.source.clone()))
            .or_default()
            .push(idx);
        self.by_kind.entry(edge.kind).or_default().push(idx);
        self.edge_index.insert(edge.id.clone(), idx);
        self.edges.push(edge);
    }

    // ── Persistence ────────────────────────────────────────────────

    /// Parse and verify a persisted document. Any structural problem fails
    /// closed with `Corruption`; nothing is partially loaded.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::Corruption {
            path: path.to_path_buf(),
            reason,
        };

        let raw: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| corrupt(format!("invalid JSON: {e}")))?;
        let version = raw
            .get("version")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| corrupt("missing `version` field".into()))?;
        let major = schema::major_version(version)
            .ok_or_else(|| corrupt(format!("unparseable version `{version}`")))?;
        if major > schema::SUPPORTED_MAJOR_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: version.to_string(),
                supported: schema::SUPPORTED_MAJOR_VERSION,
            });
        }

        let doc: GraphDocument =
            serde_json::from_value(raw).map_err(|e| corrupt(format!("invalid document: {e}")))?;

        let mut snapshot = Self::default();
        for node in doc.nodes {
            if snapshot.node_index.contains_key(&node.id) {
                return Err(corrupt(format!("duplicate node id {}", node.id)));
            }
            schema::validate_node(node.kind, &node.properties)
                .map_err(|e| corrupt(format!("node {}: {e}", node.id)))?;
            snapshot.insert_node(node);
        }
        for edge in doc.edges {
            if snapshot.edge_index.contains_key(&edge.id) {
                return Err(corrupt(format!("duplicate edge id {}", edge.id)));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !snapshot.node_index.contains_key(endpoint) {
                    return Err(corrupt(format!(
                        "edge {} references missing node {endpoint}",
                        edge.id
                    )));
                }
            }
            schema::validate_edge(edge.kind, &edge.properties)
                .map_err(|e| corrupt(format!("edge {}: {e}", edge.id)))?;
            snapshot.insert_edge(edge);
        }
        Ok(snapshot)
    }
}

/// Event time for a new edge: its `timestamp` property when present, else now.
pub(crate) fn edge_event_time(props: &Properties, now: DateTime<Utc>) -> DateTime<Utc> {
    props
        .get(keys::TIMESTAMP)
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or(now, |t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_node(ssg: &str) -> Node {
        let now = Utc::now();
        let mut properties = Properties::new();
        properties.insert("ssg".into(), json!(ssg));
        Node {
            id: NodeId(format!("configuration:{ssg}")),
            kind: NodeKind::Configuration,
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rejects_newer_major_version() {
        let doc = br#"{"version":"2.0","nodes":[],"edges":[],"shards":{}}"#;
        let err = GraphSnapshot::from_bytes(doc, Path::new("g.json")).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion { .. }));
    }

    #[test]
    fn rejects_garbage_as_corruption() {
        let err = GraphSnapshot::from_bytes(b"{not json", Path::new("g.json")).unwrap_err();
        assert!(matches!(err, StoreError::Corruption { .. }));

        let err = GraphSnapshot::from_bytes(br#"{"nodes":[]}"#, Path::new("g.json")).unwrap_err();
        assert!(matches!(err, StoreError::Corruption { .. }));
    }

    #[test]
    fn rejects_dangling_edges() {
        let doc = json!({
            "version": "1.0",
            "nodes": [],
            "edges": [{
                "id": "edge:1",
                "type": "user_prefers",
                "source": "user:a",
                "target": "configuration:hugo",
                "properties": {"timestamp": "2026-01-01T00:00:00Z"},
                "createdAt": "2026-01-01T00:00:00Z"
            }]
        });
        let err = GraphSnapshot::from_bytes(doc.to_string().as_bytes(), Path::new("g.json"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Corruption { ref reason, .. } if reason.contains("missing node")));
    }

    #[test]
    fn natural_index_follows_replacements() {
        let mut snap = GraphSnapshot::default();
        snap.insert_node(config_node("hugo"));

        let mut props = Properties::new();
        props.insert("ssg".into(), json!("hugo"));
        assert!(snap.node_by_natural_key(NodeKind::Configuration, &props).is_some());

        let mut renamed = config_node("hugo");
        renamed.properties.insert("ssg".into(), json!("zola"));
        snap.replace_node(renamed).unwrap();
        assert!(snap.node_by_natural_key(NodeKind::Configuration, &props).is_none());
    }

    #[test]
    fn edge_event_time_prefers_timestamp_property() {
        let now = Utc::now();
        let mut props = Properties::new();
        assert_eq!(edge_event_time(&props, now), now);
        props.insert("timestamp".into(), json!("2025-03-01T12:00:00Z"));
        assert_eq!(
            edge_event_time(&props, now).to_rfc3339(),
            "2025-03-01T12:00:00+00:00"
        );
    }
}
