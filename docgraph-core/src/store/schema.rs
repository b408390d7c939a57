// Property schema per node/edge type, validated on every write.
//
// Stored properties stay a plain JSON map so the on-disk document keeps its
// documented shape; core logic only ever reads them through the typed
// records below.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::contracts::{is_namespaced, keys};
use crate::error::{StoreError, ValidationError};
use crate::types::{EdgeKind, NodeKind, Properties};

/// Current on-disk format version. Loaders reject a higher major version.
pub const FORMAT_VERSION: &str = "1.0";
pub const SUPPORTED_MAJOR_VERSION: u32 = 1;

// ── Typed records ──────────────────────────────────────────────────

/// Conversion between a typed record and the persisted property map.
pub trait PropertyRecord: Serialize + DeserializeOwned {
    fn to_properties(&self) -> crate::error::Result<Properties> {
        match serde_json::to_value(self).map_err(StoreError::Serialization)? {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Ok(Properties::new()),
        }
    }

    /// Parse the known fields; namespaced extras are ignored.
    fn from_properties(props: &Properties) -> Option<Self> {
        let map: serde_json::Map<String, serde_json::Value> = props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).ok()
    }
}

/// One overwritten scalar on a project node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub field: String,
    pub old_value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Absolute, lexically normalized path as first observed.
    pub path: String,
    /// Case-folded `path`; the natural key when no analysis id is given.
    pub path_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_language: Option<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecosystem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub has_tests: bool,
    #[serde(default)]
    pub has_ci: bool,
    #[serde(default)]
    pub has_docs: bool,
    #[serde(default)]
    pub analysis_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_analyzed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<AuditEntry>,
}

impl ProjectRecord {
    /// Case-folded technology tags used for similarity scoring.
    pub fn technology_tags(&self) -> std::collections::BTreeSet<String> {
        self.languages
            .iter()
            .chain(self.frameworks.iter())
            .chain(self.ecosystem.iter())
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    pub ssg: String,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub total_files: u64,
}

/// One tracked use of an SSG by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub ssg: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    #[serde(default)]
    pub usage: Vec<UsageEvent>,
    #[serde(default)]
    pub preferred_ssgs: Vec<String>,
    #[serde(default = "default_auto_apply")]
    pub auto_apply: bool,
}

fn default_auto_apply() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedRecord {
    pub ssg: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Properties of `project_analyzed_by` and `user_prefers` edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub timestamp: DateTime<Utc>,
}

impl PropertyRecord for ProjectRecord {}
impl PropertyRecord for ConfigurationRecord {}
impl PropertyRecord for AnalysisRecord {}
impl PropertyRecord for UserRecord {}
impl PropertyRecord for DeploymentRecord {}
impl PropertyRecord for RecommendedRecord {}
impl PropertyRecord for LinkRecord {}

// ── Validation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    String,
    Bool,
    UInt,
    Number,
    StringList,
    Timestamp,
    Array,
}

impl FieldType {
    fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Bool => "a boolean",
            Self::UInt => "a non-negative integer",
            Self::Number => "a number",
            Self::StringList => "an array of strings",
            Self::Timestamp => "an RFC 3339 timestamp",
            Self::Array => "an array",
        }
    }

    fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::UInt => value.is_u64(),
            Self::Number => value.is_number(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(serde_json::Value::is_string)),
            Self::Timestamp => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            Self::Array => value.is_array(),
        }
    }
}

struct Field {
    name: &'static str,
    ty: FieldType,
    required: bool,
}

const fn req(name: &'static str, ty: FieldType) -> Field {
    Field {
        name,
        ty,
        required: true,
    }
}

const fn opt(name: &'static str, ty: FieldType) -> Field {
    Field {
        name,
        ty,
        required: false,
    }
}

const PROJECT_FIELDS: &[Field] = &[
    req(keys::PATH, FieldType::String),
    req(keys::PATH_KEY, FieldType::String),
    opt(keys::ANALYSIS_ID, FieldType::String),
    opt(keys::NAME, FieldType::String),
    opt(keys::LANGUAGES, FieldType::StringList),
    opt(keys::PRIMARY_LANGUAGE, FieldType::String),
    opt(keys::FRAMEWORKS, FieldType::StringList),
    opt(keys::DEPENDENCIES, FieldType::StringList),
    opt(keys::ECOSYSTEM, FieldType::String),
    opt(keys::PROJECT_TYPE, FieldType::String),
    opt(keys::COMPLEXITY, FieldType::String),
    opt(keys::TOTAL_FILES, FieldType::UInt),
    opt(keys::HAS_TESTS, FieldType::Bool),
    opt(keys::HAS_CI, FieldType::Bool),
    opt(keys::HAS_DOCS, FieldType::Bool),
    opt(keys::ANALYSIS_COUNT, FieldType::UInt),
    opt(keys::LAST_ANALYZED, FieldType::Timestamp),
    opt(keys::HISTORY, FieldType::Array),
    opt(keys::ARCHIVED_AT, FieldType::Timestamp),
];

const CONFIGURATION_FIELDS: &[Field] = &[
    req(keys::SSG, FieldType::String),
    opt(keys::FIRST_SEEN, FieldType::Timestamp),
    opt(keys::ARCHIVED_AT, FieldType::Timestamp),
];

const ANALYSIS_FIELDS: &[Field] = &[
    req(keys::ANALYSIS_ID, FieldType::String),
    req(keys::TIMESTAMP, FieldType::Timestamp),
    opt(keys::PATH, FieldType::String),
    opt(keys::LANGUAGES, FieldType::StringList),
    opt(keys::TOTAL_FILES, FieldType::UInt),
    opt(keys::ARCHIVED_AT, FieldType::Timestamp),
];

const USER_FIELDS: &[Field] = &[
    req(keys::USER_ID, FieldType::String),
    opt(keys::USAGE, FieldType::Array),
    opt(keys::PREFERRED_SSGS, FieldType::StringList),
    opt(keys::AUTO_APPLY, FieldType::Bool),
    opt(keys::ARCHIVED_AT, FieldType::Timestamp),
];

const LINK_FIELDS: &[Field] = &[req(keys::TIMESTAMP, FieldType::Timestamp)];

const DEPLOYMENT_FIELDS: &[Field] = &[
    req(keys::SUCCESS, FieldType::Bool),
    req(keys::TIMESTAMP, FieldType::Timestamp),
    opt(keys::IDEMPOTENCY_TOKEN, FieldType::String),
    opt(keys::BUILD_TIME_MS, FieldType::UInt),
    opt(keys::ERROR_MESSAGE, FieldType::String),
    opt(keys::DEPLOYMENT_URL, FieldType::String),
];

const RECOMMENDED_FIELDS: &[Field] = &[
    req(keys::SSG, FieldType::String),
    req(keys::CONFIDENCE, FieldType::Number),
    req(keys::TIMESTAMP, FieldType::Timestamp),
];

fn node_fields(kind: NodeKind) -> &'static [Field] {
    match kind {
        NodeKind::Project => PROJECT_FIELDS,
        NodeKind::Configuration => CONFIGURATION_FIELDS,
        NodeKind::Analysis => ANALYSIS_FIELDS,
        NodeKind::User => USER_FIELDS,
    }
}

fn edge_fields(kind: EdgeKind) -> &'static [Field] {
    match kind {
        EdgeKind::ProjectAnalyzedBy | EdgeKind::UserPrefers => LINK_FIELDS,
        EdgeKind::ProjectDeployedWith => DEPLOYMENT_FIELDS,
        EdgeKind::ProjectRecommended => RECOMMENDED_FIELDS,
    }
}

fn check(kind: &str, fields: &[Field], props: &Properties) -> Result<(), ValidationError> {
    for field in fields {
        match props.get(field.name) {
            None | Some(serde_json::Value::Null) if field.required => {
                return Err(ValidationError::MissingField {
                    kind: kind.to_string(),
                    field: field.name.to_string(),
                });
            }
            Some(value) if !value.is_null() && !field.ty.accepts(value) => {
                return Err(ValidationError::InvalidType {
                    kind: kind.to_string(),
                    field: field.name.to_string(),
                    expected: field.ty.describe(),
                });
            }
            _ => {}
        }
    }

    for key in props.keys() {
        if !fields.iter().any(|f| f.name == key) && !is_namespaced(key) {
            return Err(ValidationError::UnknownProperty {
                kind: kind.to_string(),
                field: key.clone(),
            });
        }
    }
    Ok(())
}

fn require_non_empty(props: &Properties, field: &str) -> Result<(), ValidationError> {
    if props
        .get(field)
        .and_then(serde_json::Value::as_str)
        .is_some_and(|s| s.trim().is_empty())
    {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}

pub fn validate_node(kind: NodeKind, props: &Properties) -> Result<(), ValidationError> {
    check(kind.as_str(), node_fields(kind), props)?;
    match kind {
        NodeKind::Project => require_non_empty(props, keys::PATH_KEY),
        NodeKind::Configuration => require_non_empty(props, keys::SSG),
        NodeKind::Analysis => require_non_empty(props, keys::ANALYSIS_ID),
        NodeKind::User => require_non_empty(props, keys::USER_ID),
    }
}

pub fn validate_edge(kind: EdgeKind, props: &Properties) -> Result<(), ValidationError> {
    check(kind.as_str(), edge_fields(kind), props)?;
    if kind == EdgeKind::ProjectRecommended {
        require_non_empty(props, keys::SSG)?;
        let confidence = props
            .get(keys::CONFIDENCE)
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(-1.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::InvalidValue {
                field: keys::CONFIDENCE.into(),
                reason: format!("{confidence} is outside [0, 1]"),
            });
        }
    }
    Ok(())
}

/// Natural key for upsert-by-key node types, derived from validated properties.
///
/// Projects key on their analysis id when present, otherwise on the
/// case-folded path. Analysis nodes key on their analysis id.
pub fn natural_keys(kind: NodeKind, props: &Properties) -> Vec<String> {
    let get = |k: &str| props.get(k).and_then(serde_json::Value::as_str);
    match kind {
        NodeKind::Project => {
            let mut out = Vec::new();
            if let Some(id) = get(keys::ANALYSIS_ID) {
                out.push(format!("project#analysis:{id}"));
            }
            if let Some(path) = get(keys::PATH_KEY) {
                out.push(format!("project#path:{path}"));
            }
            out
        }
        NodeKind::Configuration => get(keys::SSG)
            .map(|s| vec![format!("configuration#{s}")])
            .unwrap_or_default(),
        NodeKind::User => get(keys::USER_ID)
            .map(|u| vec![format!("user#{u}")])
            .unwrap_or_default(),
        NodeKind::Analysis => get(keys::ANALYSIS_ID)
            .map(|a| vec![format!("analysis#{a}")])
            .unwrap_or_default(),
    }
}

/// Parse the major component of a `major.minor` version string.
pub fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, serde_json::Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn deployment_requires_success_and_timestamp() {
        let err = validate_edge(
            EdgeKind::ProjectDeployedWith,
            &props(&[("timestamp", json!("2026-01-01T00:00:00Z"))]),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field, .. } if field == "success"));

        validate_edge(
            EdgeKind::ProjectDeployedWith,
            &props(&[
                ("success", json!(true)),
                ("timestamp", json!("2026-01-01T00:00:00Z")),
            ]),
        )
        .unwrap();
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = validate_edge(
            EdgeKind::ProjectDeployedWith,
            &props(&[
                ("success", json!("yes")),
                ("timestamp", json!("2026-01-01T00:00:00Z")),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidType { .. }));

        let err = validate_node(
            NodeKind::Project,
            &props(&[
                ("path", json!("/a")),
                ("path_key", json!("/a")),
                ("total_files", json!(-3)),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidType { ref field, .. } if field == "total_files"));
    }

    #[test]
    fn extra_properties_must_be_namespaced() {
        let base = [("ssg", json!("hugo"))];
        let mut p = props(&base);
        p.insert("region".into(), json!("eu"));
        assert!(matches!(
            validate_node(NodeKind::Configuration, &p),
            Err(ValidationError::UnknownProperty { .. })
        ));

        let mut p = props(&base);
        p.insert("ext.region".into(), json!("eu"));
        validate_node(NodeKind::Configuration, &p).unwrap();
    }

    #[test]
    fn empty_ssg_is_invalid() {
        let err = validate_node(NodeKind::Configuration, &props(&[("ssg", json!("  "))])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }

    #[test]
    fn recommendation_confidence_must_be_a_probability() {
        let p = props(&[
            ("ssg", json!("hugo")),
            ("confidence", json!(1.4)),
            ("timestamp", json!("2026-01-01T00:00:00Z")),
        ]);
        assert!(validate_edge(EdgeKind::ProjectRecommended, &p).is_err());
    }

    #[test]
    fn project_natural_keys_prefer_analysis_id() {
        let p = props(&[
            ("path", json!("/Repo")),
            ("path_key", json!("/repo")),
            ("analysis_id", json!("a-1")),
        ]);
        assert_eq!(
            natural_keys(NodeKind::Project, &p),
            vec!["project#analysis:a-1".to_string(), "project#path:/repo".to_string()]
        );
        assert_eq!(natural_keys(NodeKind::Analysis, &p), vec!["analysis#a-1".to_string()]);
    }

    #[test]
    fn records_ignore_namespaced_extras() {
        let mut p = DeploymentRecord {
            success: true,
            timestamp: Utc::now(),
            idempotency_token: None,
            build_time_ms: Some(1200),
            error_message: None,
            deployment_url: None,
        }
        .to_properties()
        .unwrap();
        p.insert("meta.region".into(), json!("eu"));

        let parsed = DeploymentRecord::from_properties(&p).unwrap();
        assert_eq!(parsed.build_time_ms, Some(1200));
        assert!(!p.contains_key(keys::IDEMPOTENCY_TOKEN));
    }

    #[test]
    fn versions_parse_major_component() {
        assert_eq!(major_version("1.0"), Some(1));
        assert_eq!(major_version("2.3.1"), Some(2));
        assert_eq!(major_version("x"), None);
    }
}
