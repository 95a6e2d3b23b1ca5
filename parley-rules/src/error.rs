use thiserror::Error;

/// Errors raised while parsing or compiling a rule set.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RulesError {
    #[error("rule set is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid rule `{id}`: {reason}")]
    InvalidRule { id: String, reason: &'static str },
    #[error("duplicate rule id `{0}`")]
    DuplicateRule(String),
    #[error("rule set has {count} rules, limit is {limit}")]
    TooManyRules { count: usize, limit: usize },
    #[error("pattern failed to compile: {0}")]
    Regex(#[from] regex::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every variant is produced by parsing or compiling; file access lives
    // with the caller that reads the rule directory.
    #[test]
    fn compile_failures_map_to_their_variants() {
        let err = crate::compile_rules_toml("not = [valid").unwrap_err();
        assert!(matches!(err, RulesError::Parse(_)));
        assert!(err.to_string().starts_with("rule set is not valid TOML"));

        let err = RulesError::TooManyRules { count: 3, limit: 2 };
        assert_eq!(err.to_string(), "rule set has 3 rules, limit is 2");
    }
}
