use std::collections::HashSet;

use regex::{RegexSet, RegexSetBuilder};

use crate::error::RulesError;
use crate::normalize::for_rules;
use crate::types::{PatternRule, RuleSet, Severity};

/// Upper bound on rules per set; keeps the compiled automaton small.
pub const MAX_RULES: usize = 256;
pub const MAX_PATTERN_LEN: usize = 512;

/// One rule that matched a scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternHit {
    pub id: String,
    pub severity: Severity,
    pub locale: Option<String>,
}

/// A rule set compiled once into a single `RegexSet`.
#[derive(Debug, Clone)]
pub struct PatternIndex {
    name: String,
    set: RegexSet,
    rules: Vec<PatternRule>,
}

impl PatternIndex {
    pub fn compile(rule_set: &RuleSet) -> Result<Self, RulesError> {
        if rule_set.rules.len() > MAX_RULES {
            return Err(RulesError::TooManyRules {
                count: rule_set.rules.len(),
                limit: MAX_RULES,
            });
        }

        let mut seen = HashSet::new();
        for rule in &rule_set.rules {
            validate_rule(rule)?;
            if !seen.insert(rule.id.as_str()) {
                return Err(RulesError::DuplicateRule(rule.id.clone()));
            }
        }

        let set = RegexSetBuilder::new(rule_set.rules.iter().map(|r| r.pattern.as_str()))
            .case_insensitive(true)
            .multi_line(true)
            .build()?;

        tracing::debug!(
            rule_set = %rule_set.name,
            version = %rule_set.version,
            rules = rule_set.rules.len(),
            "compiled pattern index"
        );

        Ok(Self {
            name: rule_set.name.clone(),
            set,
            rules: rule_set.rules.clone(),
        })
    }

    /// An index that never matches.
    pub fn empty() -> Self {
        Self {
            name: "empty".into(),
            set: RegexSet::empty(),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Return every rule matching `text`, in rule-set order.
    pub fn scan(&self, text: &str) -> Vec<PatternHit> {
        if self.rules.is_empty() {
            return Vec::new();
        }
        let normalized = for_rules(text);
        self.set
            .matches(&normalized)
            .into_iter()
            .map(|i| {
                let rule = &self.rules[i];
                PatternHit {
                    id: rule.id.clone(),
                    severity: rule.severity,
                    locale: rule.locale.clone(),
                }
            })
            .collect()
    }
}

/// Highest severity among `hits`, if any.
pub fn max_severity(hits: &[PatternHit]) -> Option<Severity> {
    hits.iter().map(|h| h.severity).max()
}

fn validate_rule(rule: &PatternRule) -> Result<(), RulesError> {
    let invalid = |reason| RulesError::InvalidRule {
        id: rule.id.clone(),
        reason,
    };
    if rule.id.is_empty() || rule.id.len() > 64 {
        return Err(invalid("id must be 1..=64 characters"));
    }
    if !rule
        .id
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
    {
        return Err(invalid("id may only contain [a-z0-9_-]"));
    }
    if rule.pattern.trim().is_empty() {
        return Err(invalid("pattern is empty"));
    }
    if rule.pattern.len() > MAX_PATTERN_LEN {
        return Err(invalid("pattern is longer than 512 bytes"));
    }
    Ok(())
}
