// src/runtime.rs
//! Data-root bootstrap and wiring.
//!
//! `ensure_initialized` seeds a data root idempotently; `Runtime::open` loads
//! its config and rule file and assembles a [`ChatOrchestrator`].

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parley_rules::{load_rule_set, write_default_rules, PatternIndex};

use crate::config::CoreConfig;
use crate::services::audit::{AuditSink, FanoutAudit, JsonlAudit, NoopAudit, TracingAudit};
use crate::services::backend::GenerationBackend;
use crate::services::limiter::SystemClock;
use crate::services::orchestrator::ChatOrchestrator;
use crate::services::store::{SqliteTurnStore, TurnStore};

#[derive(Debug, Clone)]
pub struct InitReport {
    pub root: PathBuf,
    pub created: Vec<String>,
    pub existed: Vec<String>,
}

/// Data root: `PARLEY_ROOT` if set, else `.parley`.
pub fn parley_root() -> PathBuf {
    std::env::var_os("PARLEY_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".parley"))
}

/// Create the data-root layout and default files that are missing. Existing
/// files are never touched.
pub fn ensure_initialized(root: &Path) -> Result<InitReport> {
    let mut created = Vec::new();
    let mut existed = Vec::new();

    ensure_dir(root, "", &mut created, &mut existed)?;
    ensure_dir(root, "data", &mut created, &mut existed)?;
    ensure_dir(root, "logbook", &mut created, &mut existed)?;
    ensure_file(root, "config.toml", DEFAULT_CONFIG_TOML, &mut created, &mut existed)?;

    let rules_dir = root.join("rules");
    let seeded = write_default_rules(&rules_dir)?;
    for name in parley_rules::assets::DEFAULT_RULE_FILES {
        let rel = format!("rules/{}", name);
        if seeded.iter().any(|s| s == name) {
            created.push(rel);
        } else {
            existed.push(rel);
        }
    }

    tracing::debug!(root = %root.display(), created = created.len(), "data root ready");
    Ok(InitReport {
        root: root.to_path_buf(),
        created,
        existed,
    })
}

fn ensure_dir(base: &Path, rel: &str, created: &mut Vec<String>, existed: &mut Vec<String>) -> Result<()> {
    let p = if rel.is_empty() { base.to_path_buf() } else { base.join(rel) };
    let label = if rel.is_empty() { ".".to_string() } else { rel.to_string() };
    if p.exists() {
        existed.push(label);
        return Ok(());
    }
    fs::create_dir_all(&p).with_context(|| format!("create_dir_all({:?})", p))?;
    created.push(label);
    Ok(())
}

fn ensure_file(
    base: &Path,
    rel_file: &str,
    content: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = base.join(rel_file);
    if p.exists() {
        existed.push(rel_file.to_string());
        return Ok(());
    }
    write_atomic(&p, content.as_bytes())?;
    created.push(rel_file.to_string());
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("open temp file {:?}", tmp))?;
        f.write_all(bytes)?;
        f.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

/// A configured pipeline rooted at one data directory.
pub struct Runtime {
    pub root: PathBuf,
    pub config: CoreConfig,
    pub store: Arc<SqliteTurnStore>,
    pub orchestrator: ChatOrchestrator,
}

impl Runtime {
    /// Seed `root` if needed, load its config and rules, open the store.
    pub fn open(root: &Path, backend: Arc<dyn GenerationBackend>) -> Result<Self> {
        ensure_initialized(root)?;
        let config = CoreConfig::load(root)?;

        let rule_set = load_rule_set(&config.rules.path, config.rules.locked)?;
        let rules = PatternIndex::compile(&rule_set)
            .with_context(|| format!("compiling rules from {:?}", config.rules.path))?;
        tracing::info!(rule_set = rules.name(), rules = rules.len(), "injection rules loaded");

        let store = Arc::new(SqliteTurnStore::open(&config.store.path)?);
        let audit = audit_sink(&config);

        let orchestrator = ChatOrchestrator::new(
            &config,
            Arc::new(rules),
            backend,
            store.clone() as Arc<dyn TurnStore>,
            audit,
            Arc::new(SystemClock),
        );

        Ok(Self {
            root: root.to_path_buf(),
            config,
            store,
            orchestrator,
        })
    }
}

fn audit_sink(config: &CoreConfig) -> Arc<dyn AuditSink> {
    if !config.audit.enabled {
        return Arc::new(NoopAudit);
    }
    Arc::new(FanoutAudit::new(vec![
        Arc::new(TracingAudit),
        Arc::new(JsonlAudit::new(config.audit.log_path.clone())),
    ]))
}

// Paths are relative to the data root.
const DEFAULT_CONFIG_TOML: &str = r#"# parley configuration

[intake]
min_chars = 1
max_chars = 2000
search_max_chars = 200
name_max_chars = 100
email_max_chars = 254

[limits]
max_attempts = 10
window_ms = 60000
namespace = "chat"

[stream]
backend_timeout_ms = 30000
history_turns = 10

[audit]
enabled = true
preview_chars = 100
identity_prefix = 4
log_path = "logbook/audit.jsonl"

[store]
path = "data/turns.db"

[rules]
path = "rules/injection.toml"
locked = false
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_config_parses_to_defaults() {
        let cfg = CoreConfig::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(cfg.intake.max_chars, 2000);
        assert_eq!(cfg.limits.max_attempts, 10);
        assert_eq!(cfg.limits.namespace, "chat");
        assert_eq!(cfg.stream.backend_timeout_ms, 30_000);
        assert_eq!(cfg.store.path, PathBuf::from("data/turns.db"));
        assert!(!cfg.rules.locked);
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");

        let first = ensure_initialized(&root).unwrap();
        assert!(first.created.contains(&"config.toml".to_string()));
        assert!(first.created.contains(&"rules/injection.toml".to_string()));
        assert!(root.join("logbook").is_dir());

        fs::write(root.join("config.toml"), "[limits]\nmax_attempts = 3\n").unwrap();
        let second = ensure_initialized(&root).unwrap();
        assert!(second.created.is_empty());
        assert!(second.existed.contains(&"rules/injection.toml".to_string()));
        let kept = fs::read_to_string(root.join("config.toml")).unwrap();
        assert!(kept.contains("max_attempts = 3"));
    }
}
