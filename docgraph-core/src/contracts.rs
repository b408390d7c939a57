//! Canonical property keys and id conventions shared by every component.
//!
//! Core logic reads node and edge properties only through these names.
//! Anything outside this list must be namespaced (contain a `.`) and is
//! carried through storage untouched.

use crate::types::{EdgeId, NodeId};

/// Canonical property keys.
pub mod keys {
    // Shared
    pub const ARCHIVED_AT: &str = "archived_at";
    pub const TIMESTAMP: &str = "timestamp";

    // Project
    pub const PATH: &str = "path";
    pub const PATH_KEY: &str = "path_key";
    pub const ANALYSIS_ID: &str = "analysis_id";
    pub const NAME: &str = "name";
    pub const LANGUAGES: &str = "languages";
    pub const PRIMARY_LANGUAGE: &str = "primary_language";
    pub const FRAMEWORKS: &str = "frameworks";
    pub const DEPENDENCIES: &str = "dependencies";
    pub const ECOSYSTEM: &str = "ecosystem";
    pub const PROJECT_TYPE: &str = "project_type";
    pub const COMPLEXITY: &str = "complexity";
    pub const TOTAL_FILES: &str = "total_files";
    pub const HAS_TESTS: &str = "has_tests";
    pub const HAS_CI: &str = "has_ci";
    pub const HAS_DOCS: &str = "has_docs";
    pub const ANALYSIS_COUNT: &str = "analysis_count";
    pub const LAST_ANALYZED: &str = "last_analyzed";
    pub const HISTORY: &str = "history";

    // Configuration
    pub const SSG: &str = "ssg";
    pub const FIRST_SEEN: &str = "first_seen";

    // User
    pub const USER_ID: &str = "user_id";
    pub const USAGE: &str = "usage";
    pub const PREFERRED_SSGS: &str = "preferred_ssgs";
    pub const AUTO_APPLY: &str = "auto_apply";

    // Deployment edge
    pub const SUCCESS: &str = "success";
    pub const IDEMPOTENCY_TOKEN: &str = "idempotency_token";
    pub const BUILD_TIME_MS: &str = "build_time_ms";
    pub const ERROR_MESSAGE: &str = "error_message";
    pub const DEPLOYMENT_URL: &str = "deployment_url";

    // Recommendation edge
    pub const CONFIDENCE: &str = "confidence";
}

/// Namespace applied to caller-supplied deployment metadata.
pub const META_NAMESPACE: &str = "meta.";

/// A property key is namespaced when it contains a `.` separator.
pub fn is_namespaced(key: &str) -> bool {
    key.split_once('.')
        .is_some_and(|(ns, rest)| !ns.is_empty() && !rest.is_empty())
}

/// Id constructors. Configuration and user nodes have natural ids so the
/// same SSG or user always maps to the same node.
pub mod ids {
    use super::{EdgeId, NodeId};

    pub fn project() -> NodeId {
        NodeId(format!("project:{}", uuid::Uuid::new_v4()))
    }

    pub fn analysis() -> NodeId {
        NodeId(format!("analysis:{}", uuid::Uuid::new_v4()))
    }

    pub fn configuration(ssg: &str) -> NodeId {
        NodeId(format!("configuration:{ssg}"))
    }

    pub fn user(user_id: &str) -> NodeId {
        NodeId(format!("user:{user_id}"))
    }

    pub fn edge() -> EdgeId {
        EdgeId(format!("edge:{}", uuid::Uuid::new_v4()))
    }
}

/// Normalize an SSG name: trimmed and lowercased.
pub fn normalize_ssg(ssg: &str) -> String {
    ssg.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_keys_need_both_parts() {
        assert!(is_namespaced("meta.region"));
        assert!(is_namespaced("scanner.has_docker"));
        assert!(!is_namespaced("region"));
        assert!(!is_namespaced(".region"));
        assert!(!is_namespaced("meta."));
    }

    #[test]
    fn natural_ids_are_stable() {
        assert_eq!(ids::configuration("hugo"), ids::configuration("hugo"));
        assert_eq!(ids::user("alice").as_str(), "user:alice");
        assert_ne!(ids::project(), ids::project());
    }

    #[test]
    fn ssg_names_are_case_folded() {
        assert_eq!(normalize_ssg("  Docusaurus "), "docusaurus");
    }
}
