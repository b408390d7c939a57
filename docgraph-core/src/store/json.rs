use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::StoreSection;
use crate::contracts::{ids, keys};
use crate::error::{StoreError, ValidationError};
use crate::types::{Edge, EdgeKind, Node, NodeId, NodeKind, Properties, StoreStats};

use super::schema;
use super::snapshot::{GraphSnapshot, edge_event_time};
use super::{EdgeInsert, GraphStore, NodeEdit, NodeUpsert, WriterLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// JSON-file-backed implementation of `GraphStore`.
///
/// Every committed write rewrites the whole document via temp file, fsync and
/// rename, so the file on disk is always either the previous or the next
/// complete graph.
#[derive(Debug)]
pub struct JsonGraphStore {
    file: Option<PathBuf>,
    committed: RwLock<Arc<GraphSnapshot>>,
    writer: tokio::sync::Mutex<()>,
    mode: AccessMode,
    _lock: Option<WriterLock>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: &'a str,
    nodes: &'a [Node],
    edges: &'a [Edge],
}

impl JsonGraphStore {
    /// Open (or create) a writable store in `dir`, taking the directory's writer lock.
    pub fn open(dir: &Path, config: &StoreSection) -> crate::error::Result<Self> {
        fs::create_dir_all(dir).map_err(StoreError::Io)?;
        let lock = WriterLock::acquire(&dir.join(&config.lock_file))?;
        let file = dir.join(&config.file_name);
        let snapshot = Self::load(&file)?;
        info!(
            path = %file.display(),
            nodes = snapshot.node_count(),
            edges = snapshot.edge_count(),
            "Opened graph store"
        );
        Ok(Self {
            file: Some(file),
            committed: RwLock::new(Arc::new(snapshot)),
            writer: tokio::sync::Mutex::new(()),
            mode: AccessMode::ReadWrite,
            _lock: Some(lock),
        })
    }

    /// Open a store for queries only. No lock is taken; writes fail with `ReadOnly`.
    pub fn open_read_only(dir: &Path, config: &StoreSection) -> crate::error::Result<Self> {
        let file = dir.join(&config.file_name);
        let snapshot = Self::load(&file)?;
        Ok(Self {
            file: Some(file),
            committed: RwLock::new(Arc::new(snapshot)),
            writer: tokio::sync::Mutex::new(()),
            mode: AccessMode::ReadOnly,
            _lock: None,
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Self {
        Self {
            file: None,
            committed: RwLock::new(Arc::new(GraphSnapshot::default())),
            writer: tokio::sync::Mutex::new(()),
            mode: AccessMode::ReadWrite,
            _lock: None,
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Re-read the graph file, picking up commits made by the writer process.
    /// Only meaningful for read-only handles.
    pub async fn refresh(&self) -> crate::error::Result<()> {
        let Some(file) = self.file.clone() else {
            return Ok(());
        };
        let _guard = self.writer.lock().await;
        let snapshot = tokio::task::spawn_blocking(move || Self::load(&file))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        self.swap(snapshot);
        Ok(())
    }

    /// A missing file is an empty graph; anything unreadable is corruption.
    fn load(file: &Path) -> Result<GraphSnapshot, StoreError> {
        if !file.exists() {
            return Ok(GraphSnapshot::default());
        }
        let bytes = fs::read(file).map_err(|e| StoreError::Corruption {
            path: file.to_path_buf(),
            reason: format!("unreadable: {e}"),
        })?;
        GraphSnapshot::from_bytes(&bytes, file)
    }

    fn swap(&self, snapshot: GraphSnapshot) {
        *self
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Run `op` against a private copy of the graph and commit it if it
    /// reports a change. Writers are serialized; a failed commit leaves the
    /// committed snapshot untouched.
    async fn mutate<T, F>(&self, op: F) -> crate::error::Result<T>
    where
        T: Send,
        F: FnOnce(&mut GraphSnapshot, DateTime<Utc>) -> crate::error::Result<(T, bool)> + Send,
    {
        if self.mode == AccessMode::ReadOnly {
            return Err(StoreError::ReadOnly.into());
        }
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        let (out, dirty) = op(&mut next, Utc::now())?;
        if dirty {
            self.commit(next).await?;
        }
        Ok(out)
    }

    async fn commit(&self, next: GraphSnapshot) -> Result<(), StoreError> {
        if let Some(path) = &self.file {
            let bytes = serde_json::to_vec_pretty(&DocumentRef {
                version: schema::FORMAT_VERSION,
                nodes: next.nodes(),
                edges: next.edges(),
            })?;
            let target = path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
                .await
                .map_err(|e| StoreError::Write {
                    path: path.clone(),
                    source: std::io::Error::other(e),
                })?
                .map_err(|source| StoreError::Write {
                    path: path.clone(),
                    source,
                })?;
            debug!(
                nodes = next.node_count(),
                edges = next.edge_count(),
                "Committed graph"
            );
        }
        self.swap(next);
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map_or_else(|| "graph".into(), |n| n.to_string_lossy().into_owned());
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        sync_parent(path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn new_node_id(kind: NodeKind, props: &Properties) -> NodeId {
    let get = |k: &str| props.get(k).and_then(serde_json::Value::as_str).unwrap_or_default();
    match kind {
        NodeKind::Project => ids::project(),
        NodeKind::Analysis => ids::analysis(),
        NodeKind::Configuration => ids::configuration(get(keys::SSG)),
        NodeKind::User => ids::user(get(keys::USER_ID)),
    }
}

fn create_node(
    graph: &mut GraphSnapshot,
    kind: NodeKind,
    properties: Properties,
    now: DateTime<Utc>,
) -> crate::error::Result<Node> {
    let node = Node {
        id: new_node_id(kind, &properties),
        kind,
        properties,
        created_at: now,
        updated_at: now,
    };
    if graph.node(&node.id).is_some() {
        return Err(ValidationError::InvalidValue {
            field: "id".into(),
            reason: format!("node {} already exists", node.id),
        }
        .into());
    }
    check_natural_key(graph, &node)?;
    graph.insert_node(node.clone());
    Ok(node)
}

fn check_natural_key(graph: &GraphSnapshot, node: &Node) -> Result<(), ValidationError> {
    match graph.natural_key_conflict(&node.id, node) {
        Some(key) => Err(ValidationError::InvalidValue {
            field: "natural key".into(),
            reason: format!("`{key}` already belongs to another node"),
        }),
        None => Ok(()),
    }
}

fn check_endpoints(
    graph: &GraphSnapshot,
    kind: EdgeKind,
    source: &NodeId,
    target: &NodeId,
) -> crate::error::Result<()> {
    let (source_kind, target_kind) = kind.endpoints();
    for (id, expected) in [(source, source_kind), (target, target_kind)] {
        let node = graph
            .node(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        if node.kind != expected {
            return Err(ValidationError::InvalidValue {
                field: id.to_string(),
                reason: format!("{kind} expects a {expected} node, found {}", node.kind),
            }
            .into());
        }
    }
    Ok(())
}

fn build_edge(
    kind: EdgeKind,
    source: &NodeId,
    target: &NodeId,
    properties: Properties,
    now: DateTime<Utc>,
) -> Edge {
    Edge {
        id: ids::edge(),
        kind,
        source: source.clone(),
        target: target.clone(),
        created_at: edge_event_time(&properties, now),
        properties,
    }
}

#[async_trait::async_trait]
impl GraphStore for JsonGraphStore {
    fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.committed.read().unwrap_or_else(PoisonError::into_inner))
    }

    async fn add_node(&self, kind: NodeKind, properties: Properties) -> crate::error::Result<Node> {
        schema::validate_node(kind, &properties)?;
        self.mutate(move |graph, now| {
            if let Some(existing) = graph.node_by_natural_key(kind, &properties) {
                let mut node = existing.clone();
                let before = node.properties.clone();
                node.properties.extend(properties);
                if node.properties == before {
                    return Ok((node, false));
                }
                schema::validate_node(kind, &node.properties)?;
                check_natural_key(graph, &node)?;
                node.updated_at = node.updated_at.max(now);
                graph.replace_node(node.clone())?;
                return Ok((node, true));
            }

            let node = create_node(graph, kind, properties, now)?;
            Ok((node, true))
        })
        .await
    }

    async fn upsert_node_with<'a>(
        &self,
        kind: NodeKind,
        key: Properties,
        edit: NodeEdit<'a>,
    ) -> crate::error::Result<NodeUpsert> {
        self.mutate(move |graph, now| {
            let existing = graph.node_by_natural_key(kind, &key).cloned();
            let properties = edit(existing.as_ref())?;
            schema::validate_node(kind, &properties)?;
            let Some(mut node) = existing else {
                let node = create_node(graph, kind, properties, now)?;
                return Ok((
                    NodeUpsert {
                        node,
                        created: true,
                        changed: true,
                    },
                    true,
                ));
            };
            if node.properties == properties {
                return Ok((
                    NodeUpsert {
                        node,
                        created: false,
                        changed: false,
                    },
                    false,
                ));
            }
            node.properties = properties;
            check_natural_key(graph, &node)?;
            node.updated_at = node.updated_at.max(now);
            graph.replace_node(node.clone())?;
            Ok((
                NodeUpsert {
                    node,
                    created: false,
                    changed: true,
                },
                true,
            ))
        })
        .await
    }

    async fn update_node(&self, id: &NodeId, properties: Properties) -> crate::error::Result<Node> {
        let id = id.clone();
        self.mutate(move |graph, now| {
            let mut node = graph
                .node(&id)
                .cloned()
                .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
            schema::validate_node(node.kind, &properties)?;
            if node.properties == properties {
                return Ok((node, false));
            }
            node.properties = properties;
            check_natural_key(graph, &node)?;
            node.updated_at = node.updated_at.max(now);
            graph.replace_node(node.clone())?;
            Ok((node, true))
        })
        .await
    }

    async fn archive_node(&self, id: &NodeId) -> crate::error::Result<Node> {
        let id = id.clone();
        self.mutate(move |graph, now| {
            let mut node = graph
                .node(&id)
                .cloned()
                .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
            if node.is_archived() {
                return Ok((node, false));
            }
            node.properties.insert(
                keys::ARCHIVED_AT.to_string(),
                serde_json::Value::String(now.to_rfc3339()),
            );
            node.updated_at = node.updated_at.max(now);
            graph.replace_node(node.clone())?;
            info!(node = %node.id, "Archived node");
            Ok((node, true))
        })
        .await
    }

    async fn add_edge(
        &self,
        kind: EdgeKind,
        source: &NodeId,
        target: &NodeId,
        properties: Properties,
    ) -> crate::error::Result<Edge> {
        schema::validate_edge(kind, &properties)?;
        let (source, target) = (source.clone(), target.clone());
        self.mutate(move |graph, now| {
            check_endpoints(graph, kind, &source, &target)?;
            let edge = build_edge(kind, &source, &target, properties, now);
            graph.insert_edge(edge.clone());
            Ok((edge, true))
        })
        .await
    }

    async fn add_edge_dedup(
        &self,
        kind: EdgeKind,
        source: &NodeId,
        target: &NodeId,
        properties: Properties,
        is_duplicate: &(dyn for<'e> Fn(&'e Edge) -> bool + Send + Sync),
    ) -> crate::error::Result<EdgeInsert> {
        schema::validate_edge(kind, &properties)?;
        let (source, target) = (source.clone(), target.clone());
        self.mutate(move |graph, now| {
            check_endpoints(graph, kind, &source, &target)?;
            if let Some(existing) = graph.edges_from(kind, &source).find(|e| is_duplicate(e)) {
                return Ok((EdgeInsert::Existing(existing.clone()), false));
            }
            let edge = build_edge(kind, &source, &target, properties, now);
            graph.insert_edge(edge.clone());
            Ok((EdgeInsert::Inserted(edge), true))
        })
        .await
    }

    async fn stats(&self) -> crate::error::Result<StoreStats> {
        let mut stats = self.snapshot().stats();
        if let Some(path) = &self.file {
            stats.file_size_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        }
        Ok(stats)
    }
}
