use std::sync::Arc;

use crate::types::{Edge, EdgeFilter, EdgeId, EdgeKind, Node, NodeFilter, NodeId, NodeKind, Properties, StoreStats};

use super::snapshot::GraphSnapshot;

/// Outcome of [`GraphStore::add_edge_dedup`].
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeInsert {
    /// No duplicate existed; the edge was written.
    Inserted(Edge),
    /// A matching edge already existed; nothing was written.
    Existing(Edge),
}

impl EdgeInsert {
    pub fn edge(&self) -> &Edge {
        match self {
            Self::Inserted(e) | Self::Existing(e) => e,
        }
    }

    pub fn into_edge(self) -> Edge {
        match self {
            Self::Inserted(e) | Self::Existing(e) => e,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Computes a node's complete new property map from the node currently
/// matching the lookup key, or from `None` when there is no match.
pub type NodeEdit<'a> =
    Box<dyn for<'n> FnOnce(Option<&'n Node>) -> crate::error::Result<Properties> + Send + 'a>;

/// Outcome of [`GraphStore::upsert_node_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpsert {
    pub node: Node,
    /// No node matched the key; this one was created.
    pub created: bool,
    /// Whether anything was written.
    pub changed: bool,
}

/// The core store abstraction. Every component reads and writes through this trait.
///
/// Writes are serialized and durable before they return. Reads see the last
/// committed snapshot and never block on, or observe, an in-flight write.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync + std::fmt::Debug {
    /// The most recently committed graph. Cheap: clones an `Arc`.
    fn snapshot(&self) -> Arc<GraphSnapshot>;

    // ── Node operations ────────────────────────────────────────────

    /// Insert a node. `project`, `configuration` and `user` nodes upsert by
    /// natural key: an existing match has the given properties overlaid and
    /// is returned instead of creating a duplicate.
    async fn add_node(&self, kind: NodeKind, properties: Properties) -> crate::error::Result<Node>;

    /// Read-modify-write by natural key under the writer lock: the node
    /// matching `key` (or `None`) is handed to `edit`, and its result replaces
    /// the node's properties or becomes a new node. Concurrent callers never
    /// lose each other's edits.
    async fn upsert_node_with<'a>(
        &self,
        kind: NodeKind,
        key: Properties,
        edit: NodeEdit<'a>,
    ) -> crate::error::Result<NodeUpsert>;

    /// Return the node matching `properties` by natural key unchanged, or
    /// create it from `properties`.
    async fn find_or_create_node(&self, kind: NodeKind, properties: Properties) -> crate::error::Result<NodeUpsert> {
        let key = properties.clone();
        self.upsert_node_with(
            kind,
            key,
            Box::new(move |existing: Option<&Node>| -> crate::error::Result<Properties> {
                Ok(existing.map_or(properties, |node| node.properties.clone()))
            }),
        )
        .await
    }

    /// Replace a node's property map. Fails with `NodeNotFound` if absent.
    async fn update_node(&self, id: &NodeId, properties: Properties) -> crate::error::Result<Node>;

    /// Soft-archive a node. Archived nodes are never deleted.
    async fn archive_node(&self, id: &NodeId) -> crate::error::Result<Node>;

    // ── Edge operations ────────────────────────────────────────────

    /// Insert an edge between two existing nodes.
    async fn add_edge(
        &self,
        kind: EdgeKind,
        source: &NodeId,
        target: &NodeId,
        properties: Properties,
    ) -> crate::error::Result<Edge>;

    /// Insert an edge unless an existing `(kind, source)` edge satisfies
    /// `is_duplicate`. The check and the insert happen under the writer lock.
    async fn add_edge_dedup(
        &self,
        kind: EdgeKind,
        source: &NodeId,
        target: &NodeId,
        properties: Properties,
        is_duplicate: &(dyn for<'e> Fn(&'e Edge) -> bool + Send + Sync),
    ) -> crate::error::Result<EdgeInsert>;

    // ── Queries (default: served from the committed snapshot) ──────

    async fn get_node(&self, id: &NodeId) -> crate::error::Result<Option<Node>> {
        Ok(self.snapshot().node(id).cloned())
    }

    async fn get_edge(&self, id: &EdgeId) -> crate::error::Result<Option<Edge>> {
        Ok(self.snapshot().edge(id).cloned())
    }

    async fn find_nodes(&self, filter: &NodeFilter) -> crate::error::Result<Vec<Node>> {
        Ok(self.snapshot().find_nodes(filter))
    }

    async fn find_edges(&self, filter: &EdgeFilter) -> crate::error::Result<Vec<Edge>> {
        Ok(self.snapshot().find_edges(filter))
    }

    /// Full scan of live nodes; archived nodes are excluded.
    async fn all_nodes(&self) -> crate::error::Result<Vec<Node>> {
        Ok(self.snapshot().find_nodes(&NodeFilter::default()))
    }

    async fn all_edges(&self) -> crate::error::Result<Vec<Edge>> {
        Ok(self.snapshot().edges().to_vec())
    }

    /// Get summary statistics about the store.
    async fn stats(&self) -> crate::error::Result<StoreStats> {
        Ok(self.snapshot().stats())
    }
}
