use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

impl CoreConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Self::from_toml(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!(
                "No config file found at {}. Using CoreConfig::default().",
                path.display()
            );
            CoreConfig::default()
        };
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str::<CoreConfig>(text)?)
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.audit.log_path = absolutize(root, &self.audit.log_path);
        self.store.path = absolutize(root, &self.store.path);
        self.rules.path = absolutize(root, &self.rules.path);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "IntakeConfig::default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "IntakeConfig::default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "IntakeConfig::default_search_max_chars")]
    pub search_max_chars: usize,
    #[serde(default = "IntakeConfig::default_name_max_chars")]
    pub name_max_chars: usize,
    #[serde(default = "IntakeConfig::default_email_max_chars")]
    pub email_max_chars: usize,
}

impl IntakeConfig {
    fn default_min_chars() -> usize {
        1
    }

    fn default_max_chars() -> usize {
        2000
    }

    fn default_search_max_chars() -> usize {
        200
    }

    fn default_name_max_chars() -> usize {
        100
    }

    fn default_email_max_chars() -> usize {
        254
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            min_chars: Self::default_min_chars(),
            max_chars: Self::default_max_chars(),
            search_max_chars: Self::default_search_max_chars(),
            name_max_chars: Self::default_name_max_chars(),
            email_max_chars: Self::default_email_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "LimitsConfig::default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "LimitsConfig::default_window_ms")]
    pub window_ms: u64,
    /// Prefix joined to identities so several policies can share one limiter.
    #[serde(default = "LimitsConfig::default_namespace")]
    pub namespace: String,
}

impl LimitsConfig {
    fn default_max_attempts() -> usize {
        10
    }

    fn default_window_ms() -> u64 {
        60_000
    }

    fn default_namespace() -> String {
        "chat".to_string()
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            window_ms: Self::default_window_ms(),
            namespace: Self::default_namespace(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "StreamConfig::default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
    #[serde(default = "StreamConfig::default_history_turns")]
    pub history_turns: usize,
}

impl StreamConfig {
    fn default_backend_timeout_ms() -> u64 {
        30_000
    }

    fn default_history_turns() -> usize {
        10
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend_timeout_ms: Self::default_backend_timeout_ms(),
            history_turns: Self::default_history_turns(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "AuditConfig::default_true")]
    pub enabled: bool,
    #[serde(default = "AuditConfig::default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "AuditConfig::default_identity_prefix")]
    pub identity_prefix: usize,
    #[serde(default = "AuditConfig::default_log_path")]
    pub log_path: PathBuf,
}

impl AuditConfig {
    fn default_true() -> bool {
        true
    }

    fn default_preview_chars() -> usize {
        100
    }

    fn default_identity_prefix() -> usize {
        4
    }

    fn default_log_path() -> PathBuf {
        PathBuf::from("logbook/audit.jsonl")
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preview_chars: Self::default_preview_chars(),
            identity_prefix: Self::default_identity_prefix(),
            log_path: Self::default_log_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "StoreConfig::default_path")]
    pub path: PathBuf,
}

impl StoreConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("data/turns.db")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "RulesConfig::default_path")]
    pub path: PathBuf,
    /// Restore the canonical rule file when the on-disk copy was edited.
    #[serde(default)]
    pub locked: bool,
}

impl RulesConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("rules/injection.toml")
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            locked: false,
        }
    }
}

fn absolutize(root: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        root.join(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_chat_policy() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.intake.max_chars, 2000);
        assert_eq!(cfg.limits.max_attempts, 10);
        assert_eq!(cfg.limits.window_ms, 60_000);
        assert_eq!(cfg.limits.namespace, "chat");
        assert_eq!(cfg.audit.preview_chars, 100);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg = CoreConfig::from_toml("[limits]\nmax_attempts = 3\n").unwrap();
        assert_eq!(cfg.limits.max_attempts, 3);
        assert_eq!(cfg.limits.window_ms, 60_000);
        assert_eq!(cfg.intake.min_chars, 1);
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[store]\npath = \"db/t.db\"\n").unwrap();
        let cfg = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.store.path, dir.path().join("db/t.db"));
        assert_eq!(cfg.rules.path, dir.path().join("rules/injection.toml"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.stream.backend_timeout_ms, 30_000);
    }
}
