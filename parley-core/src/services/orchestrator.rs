// src/services/orchestrator.rs
//! End-to-end turn processing.
//!
//! sanitize → validate → admit → detect locale → dispatch → aggregate → persist.
//! Every path ends in a [`TurnOutcome`]; backend failures become a localized
//! fallback and persistence runs detached so it can never fail a turn.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parley_rules::PatternIndex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{CoreConfig, StreamConfig};
use crate::error::{BackendError, ValidationError};
use crate::services::audit::{AuditEvent, AuditSink, Redaction};
use crate::services::backend::{compose_instructions, GenerationBackend, GenerationRequest};
use crate::services::language::{LanguageDetector, Locale};
use crate::services::limiter::{Clock, RatePolicy, RateLimiter};
use crate::services::sanitizer::Sanitizer;
use crate::services::store::{ConversationTurn, TurnStore};
use crate::services::stream::{StreamAggregator, StreamEvent, StreamSink, TurnResult};
use crate::services::validator::{InputPolicy, ValidationOutcome};
use crate::utils::redact::redact_identity;

/// What the caller gets back for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Input failed validation. `message` is localized for the user.
    Rejected {
        #[serde(serialize_with = "serialize_code")]
        error: ValidationError,
        message: String,
    },
    /// Too many admissions in the current window.
    RateLimited {
        remaining: usize,
        retry_after_ms: u64,
        message: String,
    },
    /// The turn produced an answer. `fallback` marks the localized substitute.
    Completed {
        turn_id: Uuid,
        text: String,
        locale: Locale,
        fallback: bool,
    },
    /// The caller abandoned the turn; nothing was stored.
    Cancelled { turn_id: Uuid },
}

fn serialize_code<S: serde::Serializer>(error: &ValidationError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(error.code())
}

impl TurnOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            TurnOutcome::Completed { text, .. } => Some(text.as_str()),
            TurnOutcome::Rejected { message, .. } | TurnOutcome::RateLimited { message, .. } => Some(message.as_str()),
            TurnOutcome::Cancelled { .. } => None,
        }
    }
}

pub struct ChatOrchestrator {
    sanitizer: Sanitizer,
    policy: InputPolicy,
    limiter: Arc<RateLimiter>,
    rate: RatePolicy,
    detector: LanguageDetector,
    backend: Arc<dyn GenerationBackend>,
    store: Arc<dyn TurnStore>,
    audit: Arc<dyn AuditSink>,
    redaction: Redaction,
    stream: StreamConfig,
    pending: TaskTracker,
}

impl ChatOrchestrator {
    pub fn new(
        cfg: &CoreConfig,
        rules: Arc<PatternIndex>,
        backend: Arc<dyn GenerationBackend>,
        store: Arc<dyn TurnStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let redaction = Redaction::from(&cfg.audit);
        Self {
            sanitizer: Sanitizer::new(rules, audit.clone(), redaction)
                .with_scan_limit(cfg.intake.max_chars.saturating_mul(4)),
            policy: InputPolicy::chat(&cfg.intake),
            limiter: Arc::new(RateLimiter::new(clock)),
            rate: RatePolicy::from(&cfg.limits),
            detector: LanguageDetector::new(),
            backend,
            store,
            audit,
            redaction,
            stream: cfg.stream.clone(),
            pending: TaskTracker::new(),
        }
    }

    /// Share a limiter with other policies (keys are namespaced).
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn store(&self) -> &Arc<dyn TurnStore> {
        &self.store
    }

    /// Admissions left for `identity` under the chat policy.
    pub fn remaining(&self, identity: &str) -> usize {
        self.limiter
            .remaining(&self.rate.key(identity), self.rate.max_attempts, self.rate.window_ms)
    }

    pub async fn handle_turn<S>(&self, raw: &str, identity: &str, sink: S) -> TurnOutcome
    where
        S: FnMut(StreamEvent) + Send,
    {
        self.handle_turn_cancellable(raw, identity, sink, CancellationToken::new())
            .await
    }

    /// Like [`handle_turn`](Self::handle_turn); cancelling `cancel` stops chunk
    /// application, emits `StreamEvent::Cancelled` and skips persistence.
    pub async fn handle_turn_cancellable<S>(
        &self,
        raw: &str,
        identity: &str,
        mut sink: S,
        cancel: CancellationToken,
    ) -> TurnOutcome
    where
        S: FnMut(StreamEvent) + Send,
    {
        let clean = self.sanitizer.sanitize(raw, identity);

        let text = match self.policy.validate(raw) {
            ValidationOutcome::Accepted(text) => text,
            ValidationOutcome::Rejected(error) => {
                let locale = self.detector.detect(clean.as_str());
                tracing::debug!(code = error.code(), "input rejected");
                return TurnOutcome::Rejected {
                    message: locale.rejection_message(&error),
                    error,
                };
            }
        };

        let key = self.rate.key(identity);
        let (max, window) = (self.rate.max_attempts, self.rate.window_ms);
        if !self.limiter.admit(&key, max, window) {
            let remaining = self.limiter.remaining(&key, max, window);
            let retry_after_ms = self.limiter.retry_after_ms(&key, max, window);
            self.audit.record(self.redaction.record(
                identity,
                AuditEvent::RateLimited {
                    remaining,
                    retry_after_ms,
                },
                Some(text.as_str()),
            ));
            let locale = self.detector.detect(text.as_str());
            return TurnOutcome::RateLimited {
                remaining,
                retry_after_ms,
                message: locale.rate_limited_message(retry_after_ms),
            };
        }

        let locale = self.detector.detect(text.as_str());
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "turn",
            %turn_id,
            identity = %redact_identity(identity, self.redaction.identity_prefix),
            locale = locale.code(),
        );

        let result = self
            .dispatch(turn_id, identity, text.as_str(), locale, &mut sink, &cancel)
            .instrument(span.clone())
            .await;

        let Some(result) = result else {
            return TurnOutcome::Cancelled { turn_id };
        };

        let turn = ConversationTurn {
            turn_id,
            identity: identity.to_string(),
            user_text: text.into_string(),
            response_text: result.text.clone(),
            locale,
            created_at: chrono::Utc::now(),
            fallback: result.fallback,
        };
        let store = self.store.clone();
        self.pending.spawn(
            async move {
                if let Err(e) = store.append(turn).await {
                    tracing::warn!(error = %e, "persisting turn failed");
                }
            }
            .instrument(span),
        );

        TurnOutcome::Completed {
            turn_id,
            text: result.text,
            locale,
            fallback: result.fallback,
        }
    }

    /// Wait for detached persistence writes started so far.
    pub async fn drain_pending(&self) {
        self.pending.close();
        self.pending.wait().await;
        self.pending.reopen();
    }

    // None when cancelled.
    async fn dispatch(
        &self,
        turn_id: Uuid,
        identity: &str,
        user_text: &str,
        locale: Locale,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Option<TurnResult> {
        let mut agg = StreamAggregator::new(turn_id, locale, sink);
        let timeout = Duration::from_millis(self.stream.backend_timeout_ms);
        // The history read shares the backend's deadline and cancellation:
        // a wedged store must not hold the turn open.
        let exchange = async {
            let history = self.history(identity).await;
            let request = GenerationRequest {
                turn_id,
                instructions: compose_instructions(locale, &history),
                history,
                user_text: user_text.to_string(),
                locale,
            };
            pump(self.backend.as_ref(), request, &mut agg).await
        };
        let pumped = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = tokio::time::timeout(timeout, exchange) => Some(r),
        };

        let result = match pumped {
            None => {
                agg.cancel();
                tracing::info!(chunks = agg.chunks(), "turn cancelled");
                return None;
            }
            Some(Err(_elapsed)) => {
                let err = BackendError::Timeout {
                    after_ms: self.stream.backend_timeout_ms,
                };
                tracing::warn!(error = %err, chunks = agg.chunks(), "backend timed out; using fallback");
                agg.fail(&err)
            }
            Some(Ok(Err(err))) => {
                tracing::warn!(error = %err, chunks = agg.chunks(), "backend failed; using fallback");
                agg.fail(&err)
            }
            Some(Ok(Ok(()))) => {
                let r = agg.complete();
                if r.as_ref().is_some_and(|r| r.fallback) {
                    tracing::warn!("backend returned no text; using fallback");
                }
                r
            }
        };

        // complete/fail only return None after a terminal transition, which
        // cannot have happened yet on this path.
        Some(result.unwrap_or_else(|| TurnResult {
            text: locale.fallback_message().to_string(),
            fallback: true,
        }))
    }

    async fn history(&self, identity: &str) -> Vec<ConversationTurn> {
        if self.stream.history_turns == 0 {
            return Vec::new();
        }
        match self.store.list_recent(identity, self.stream.history_turns).await {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(error = %e, "reading history failed; continuing without it");
                Vec::new()
            }
        }
    }
}

async fn pump(
    backend: &dyn GenerationBackend,
    request: GenerationRequest,
    agg: &mut StreamAggregator<'_>,
) -> Result<(), BackendError> {
    let mut chunks = backend.generate(request).await?;
    while let Some(chunk) = chunks.next().await {
        agg.consume(&chunk?);
    }
    Ok(())
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("sanitizer", &self.sanitizer)
            .field("policy", &self.policy)
            .field("rate", &self.rate)
            .field("pending", &self.pending.len())
            .finish()
    }
}
