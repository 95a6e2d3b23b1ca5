use serde::{Deserialize, Serialize};

use crate::error::RulesError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleSet {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<PatternRule>,
}

impl RuleSet {
    pub fn from_toml(text: &str) -> Result<Self, RulesError> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternRule {
    /// Stable identifier, reported in audit records.
    pub id: String,

    /// Regular expression, matched case-insensitively in multi-line mode.
    pub pattern: String,

    #[serde(default)]
    pub severity: Severity,

    // "en" | "de" | unset for language-neutral markers
    #[serde(default)]
    pub locale: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}
