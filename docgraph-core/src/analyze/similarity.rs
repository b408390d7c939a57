// Project similarity: canonical-path identity or shared technology tags.
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use crate::store::GraphSnapshot;
use crate::store::schema::{ProjectRecord, PropertyRecord};
use crate::types::{NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarProject {
    pub project: NodeId,
    pub path: String,
    /// `1.0` for the same canonical project, otherwise the shared-tag ratio.
    pub score: f64,
    pub shared_tags: Vec<String>,
}

/// Score two projects.
///
/// The same canonical path scores `1.0`. Otherwise the score is
/// `shared / max(|tags_a|, |tags_b|)` over case-folded languages,
/// frameworks and ecosystem, and projects sharing no tag are not similar.
pub fn similarity(a: &ProjectRecord, b: &ProjectRecord) -> Option<(f64, Vec<String>)> {
    let tags_a = a.technology_tags();
    let tags_b = b.technology_tags();
    let shared: Vec<String> = tags_a.intersection(&tags_b).cloned().collect();
    if a.path_key == b.path_key {
        return Some((1.0, shared));
    }
    if shared.is_empty() {
        return None;
    }
    let denominator = tags_a.len().max(tags_b.len()) as f64;
    Some((shared.len() as f64 / denominator, shared))
}

/// Projects similar to `project`, the project itself first, then by score
/// desc and id asc. Unknown ids yield an empty list.
pub fn similar_projects(snapshot: &GraphSnapshot, project: &NodeId) -> Vec<SimilarProject> {
    let Some(subject) = snapshot
        .node(project)
        .filter(|n| n.kind == NodeKind::Project)
        .and_then(|n| ProjectRecord::from_properties(&n.properties))
    else {
        return Vec::new();
    };

    let mut out: Vec<SimilarProject> = snapshot
        .nodes()
        .iter()
        .filter(|n| n.kind == NodeKind::Project)
        .filter_map(|n| {
            let other = ProjectRecord::from_properties(&n.properties)?;
            let (score, shared_tags) = if n.id == *project {
                (1.0, subject.technology_tags().into_iter().collect())
            } else {
                similarity(&subject, &other)?
            };
            Some(SimilarProject {
                project: n.id.clone(),
                path: other.path,
                score,
                shared_tags,
            })
        })
        .collect();

    out.sort_by(|a, b| {
        (b.project == *project)
            .cmp(&(a.project == *project))
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| a.project.cmp(&b.project))
    });
    out
}
