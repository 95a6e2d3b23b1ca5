// Public modules so parley-core can use them
pub mod assets;
pub mod error;
pub mod index;
pub mod normalize;
pub mod types;

pub use assets::{default_rules_text, load_rule_set, read_verified_or_embedded, write_default_rules};
pub use error::RulesError;
pub use index::{PatternHit, PatternIndex};
pub use normalize::for_rules as normalize_for_rules;
pub use types::{PatternRule, RuleSet, Severity};

/// --- Pure Rust API for parley-core ---
pub fn compile_rules_toml(text: &str) -> Result<PatternIndex, RulesError> {
    let set = RuleSet::from_toml(text)?;
    PatternIndex::compile(&set)
}
