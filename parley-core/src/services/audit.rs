//! services/audit.rs
//! Observability sink for security-relevant intake events.
//!
//! - Records carry a redacted identity and a truncated content preview only.
//! - `JsonlAudit` appends one JSON object per line; write failures never reach the caller.
//! - `MemoryAudit` keeps records in memory for assertions.

use chrono::{DateTime, Utc};
use parley_rules::Severity;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::AuditConfig;
use crate::utils::logbook::append_jsonl;
use crate::utils::redact::{preview, redact_identity, Preview};

/// What happened. Serialized with an `event` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    InjectionSuspected {
        rules: Vec<String>,
        max_severity: Severity,
    },
    RateLimited {
        remaining: usize,
        retry_after_ms: u64,
    },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::InjectionSuspected { .. } => "injection_suspected",
            AuditEvent::RateLimited { .. } => "rate_limited",
        }
    }
}

/// A single privacy-safe audit entry.
///
/// # Fields
/// - `timestamp`: when the event was observed.
/// - `identity`: redacted identity (short prefix + hash tag), never the full key.
/// - `event`: the tagged event payload.
/// - `preview`: optional truncated view of the message content.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub identity: String,
    #[serde(flatten)]
    pub event: AuditEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Preview>,
}

/// How much of an identity and of the content a record may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redaction {
    pub preview_chars: usize,
    pub identity_prefix: usize,
}

impl Default for Redaction {
    fn default() -> Self {
        Self {
            preview_chars: 100,
            identity_prefix: 4,
        }
    }
}

impl From<&AuditConfig> for Redaction {
    fn from(cfg: &AuditConfig) -> Self {
        Self {
            preview_chars: cfg.preview_chars,
            identity_prefix: cfg.identity_prefix,
        }
    }
}

impl Redaction {
    pub fn record(&self, identity: &str, event: AuditEvent, content: Option<&str>) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            identity: redact_identity(identity, self.identity_prefix),
            event,
            preview: content.map(|c| preview(c, self.preview_chars)),
        }
    }
}

/// Receives audit records. Implementations must not block for long; the
/// pipeline calls `record` inline.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Emits each record as a warn-level tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, record: AuditRecord) {
        let details = serde_json::to_string(&record.event).unwrap_or_default();
        tracing::warn!(
            target: "parley::audit",
            event = record.event.name(),
            identity = %record.identity,
            details = %details,
            preview = record.preview.as_ref().map(|p| p.text.as_str()).unwrap_or(""),
            "audit record"
        );
    }
}

/// Appends records to a JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlAudit {
    path: PathBuf,
}

impl JsonlAudit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl AuditSink for JsonlAudit {
    fn record(&self, record: AuditRecord) {
        if let Err(e) = append_jsonl(&self.path, &record) {
            tracing::debug!(path = %self.path.display(), error = %e, "audit write failed");
        }
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}

/// Forwards every record to each inner sink.
#[derive(Clone, Default)]
pub struct FanoutAudit {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAudit {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAudit {
    fn record(&self, record: AuditRecord) {
        for sink in &self.sinks {
            sink.record(record.clone());
        }
    }
}

/// Drops everything; used when auditing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

impl AuditSink for NoopAudit {
    fn record(&self, _record: AuditRecord) {}
}
