// Baseline SSG selection from ecosystem and framework signals.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::schema::ProjectRecord;

/// Static site generators the heuristics know how to suggest.
pub const KNOWN_SSGS: &[&str] = &["docusaurus", "eleventy", "hugo", "jekyll", "mkdocs"];

pub const BASELINE_CONFIDENCE: f64 = 0.85;
pub const FRAMEWORK_CONFIDENCE: f64 = 0.80;
pub const DEFAULT_CONFIDENCE: f64 = 0.60;
pub const EXPLICIT_SSG_CONFIDENCE: f64 = 0.90;
pub const PRIORITY_CONFIDENCE: f64 = 0.80;
/// Heuristic scores of the ranked alternatives, best first.
pub const ALTERNATIVE_SCORES: [f64; 2] = [0.70, 0.60];

/// A candidate SSG with the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub ssg: &'static str,
    pub confidence: f64,
    pub reason: String,
    pub alternatives: [&'static str; 2],
}

struct Rule {
    ecosystems: &'static [&'static str],
    label: &'static str,
    ssg: &'static str,
    alternatives: [&'static str; 2],
}

const ECOSYSTEM_RULES: &[Rule] = &[
    Rule {
        ecosystems: &["python"],
        label: "Python",
        ssg: "mkdocs",
        alternatives: ["hugo", "docusaurus"],
    },
    Rule {
        ecosystems: &["javascript", "node", "nodejs", "npm"],
        label: "JavaScript",
        ssg: "docusaurus",
        alternatives: ["eleventy", "hugo"],
    },
    Rule {
        ecosystems: &["typescript"],
        label: "TypeScript",
        ssg: "docusaurus",
        alternatives: ["eleventy", "hugo"],
    },
    Rule {
        ecosystems: &["go", "golang"],
        label: "Go",
        ssg: "hugo",
        alternatives: ["mkdocs", "docusaurus"],
    },
    Rule {
        ecosystems: &["ruby"],
        label: "Ruby",
        ssg: "jekyll",
        alternatives: ["hugo", "mkdocs"],
    },
];

const FRAMEWORK_RULES: &[(&str, &str, [&str; 2])] = &[
    ("react", "docusaurus", ["eleventy", "hugo"]),
    ("next", "docusaurus", ["eleventy", "hugo"]),
    ("vue", "docusaurus", ["eleventy", "hugo"]),
    ("django", "mkdocs", ["hugo", "docusaurus"]),
    ("flask", "mkdocs", ["hugo", "docusaurus"]),
    ("rails", "jekyll", ["hugo", "mkdocs"]),
];

const DEFAULT_SSG: &str = "jekyll";
const DEFAULT_ALTERNATIVES: [&str; 2] = ["hugo", "mkdocs"];

/// Stage 1: pick a baseline from the first matching signal.
///
/// An explicit ecosystem wins over the project's detected ecosystem, which
/// wins over its primary language, which wins over framework signals.
pub fn baseline(project: Option<&ProjectRecord>, explicit_ecosystem: Option<&str>) -> Baseline {
    let ecosystem_signals = explicit_ecosystem
        .into_iter()
        .chain(project.and_then(|p| p.ecosystem.as_deref()))
        .chain(project.and_then(|p| p.primary_language.as_deref()));

    for signal in ecosystem_signals {
        let signal = signal.trim().to_lowercase();
        if let Some(rule) = ECOSYSTEM_RULES.iter().find(|r| r.ecosystems.iter().any(|e| *e == signal)) {
            return Baseline {
                ssg: rule.ssg,
                confidence: BASELINE_CONFIDENCE,
                reason: format!("{} ecosystem detected", rule.label),
                alternatives: rule.alternatives,
            };
        }
    }

    if let Some(project) = project {
        for framework in &project.frameworks {
            let framework = framework.to_lowercase();
            if let Some((name, ssg, alternatives)) = FRAMEWORK_RULES
                .iter()
                .find(|(name, _, _)| framework == *name || framework.starts_with(&format!("{name}.")))
            {
                return Baseline {
                    ssg: *ssg,
                    confidence: FRAMEWORK_CONFIDENCE,
                    reason: format!("{name} framework detected"),
                    alternatives: *alternatives,
                };
            }
        }
    }

    Baseline {
        ssg: DEFAULT_SSG,
        confidence: DEFAULT_CONFIDENCE,
        reason: "No ecosystem signal detected; using the general-purpose default".into(),
        alternatives: DEFAULT_ALTERNATIVES,
    }
}

/// What the caller cares about most, used by Stage 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Performance,
    Simplicity,
    Features,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Simplicity => "simplicity",
            Self::Features => "features",
        }
    }

    pub fn ssg(&self) -> &'static str {
        match self {
            Self::Performance => "hugo",
            Self::Simplicity => "jekyll",
            Self::Features => "docusaurus",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "performance" => Ok(Self::Performance),
            "simplicity" => Ok(Self::Simplicity),
            "features" => Ok(Self::Features),
            other => Err(format!(
                "unknown priority `{other}` (expected performance, simplicity or features)"
            )),
        }
    }
}
