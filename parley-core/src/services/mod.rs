// src/services/mod.rs

pub mod audit;        // observability sink: injection + rate-limit records
pub mod backend;      // generation backend contract (streamed chunks)
pub mod language;     // two-locale heuristic detector + localized strings
pub mod limiter;      // sliding-window log, keyed by identity
pub mod orchestrator; // end-to-end turn handling
pub mod sanitizer;    // normalization + advisory injection scan
pub mod store;        // persistence contract (SQLite / in-memory)
pub mod stream;       // per-turn chunk accumulator
pub mod validator;    // parametrized length/format policies

// Public API
pub use audit::{
    AuditEvent, AuditRecord, AuditSink, FanoutAudit, JsonlAudit, MemoryAudit, NoopAudit, Redaction,
    TracingAudit,
};
pub use backend::{ChunkStream, GenerationBackend, GenerationRequest};
pub use language::{LanguageDetector, Locale};
pub use limiter::{Clock, ManualClock, RatePolicy, RateLimiter, SystemClock};
pub use orchestrator::{ChatOrchestrator, TurnOutcome};
pub use sanitizer::{sanitize, SanitizedText, Sanitizer};
pub use store::{ConversationTurn, MemoryTurnStore, SqliteTurnStore, TurnStore};
pub use stream::{StreamAggregator, StreamEvent, StreamSink, StreamState, TurnResult};
pub use validator::{FormatCheck, InputPolicy, ValidationOutcome};
