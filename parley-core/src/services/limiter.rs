//! Sliding-window-log admission control keyed by identity.
//!
//! Each identity owns an ordered log of admission timestamps. The log lives in
//! a sharded [`DashMap`]; `admit` holds the shard's write guard for the whole
//! prune-check-append sequence, so two admissions for one identity cannot both
//! see room in the window.
//!
//! Every [`SWEEP_EVERY`] admissions the map is swept of identities whose
//! newest entry has left the widest window seen so far, so idle identities do
//! not accumulate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::LimitsConfig;

/// Millisecond time source for the limiter.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock (UTC milliseconds since the epoch).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A named admission policy. Keys are namespaced so several policies can
/// share one [`RateLimiter`] without colliding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_attempts: usize,
    pub window_ms: u64,
    pub namespace: String,
}

impl RatePolicy {
    pub fn key(&self, identity: &str) -> String {
        format!("{}:{}", self.namespace, identity)
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for RatePolicy {
    fn from(cfg: &LimitsConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            window_ms: cfg.window_ms,
            namespace: cfg.namespace.clone(),
        }
    }
}

/// Admission calls between automatic sweeps.
pub const SWEEP_EVERY: u64 = 256;

pub struct RateLimiter {
    windows: DashMap<String, VecDeque<u64>>,
    clock: Arc<dyn Clock>,
    calls: AtomicU64,
    widest_window_ms: AtomicU64,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
            calls: AtomicU64::new(0),
            widest_window_ms: AtomicU64::new(0),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Record an admission for `identity` if fewer than `max_attempts` are
    /// retained in the trailing `window_ms`. A refused attempt is not logged.
    pub fn admit(&self, identity: &str, max_attempts: usize, window_ms: u64) -> bool {
        self.widest_window_ms.fetch_max(window_ms, Ordering::Relaxed);
        // Must run before the entry guard below is taken: `retain` locks every shard.
        if self.calls.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(self.widest_window_ms.load(Ordering::Relaxed));
        }
        if max_attempts == 0 {
            return false;
        }

        let now = self.clock.now_ms();
        let mut log = self.windows.entry(identity.to_string()).or_default();
        prune(&mut log, now, window_ms);
        if log.len() >= max_attempts {
            return false;
        }
        log.push_back(now);
        true
    }

    /// Admissions left in the current window. Does not modify the log.
    pub fn remaining(&self, identity: &str, max_attempts: usize, window_ms: u64) -> usize {
        max_attempts.saturating_sub(self.live_count(identity, window_ms))
    }

    /// Milliseconds until the oldest retained admission leaves the window;
    /// 0 when another admission would be accepted now.
    pub fn retry_after_ms(&self, identity: &str, max_attempts: usize, window_ms: u64) -> u64 {
        let now = self.clock.now_ms();
        let cutoff = now.saturating_sub(window_ms);
        let Some(log) = self.windows.get(identity) else {
            return 0;
        };
        let mut live = log.iter().filter(|&&t| t >= cutoff);
        if live.clone().count() < max_attempts {
            return 0;
        }
        match live.next() {
            Some(&oldest) => (oldest + window_ms + 1).saturating_sub(now),
            None => 0,
        }
    }

    /// Drop every identity with no admission inside the trailing `window_ms`.
    /// Returns how many were dropped.
    pub fn sweep(&self, window_ms: u64) -> usize {
        let cutoff = self.clock.now_ms().saturating_sub(window_ms);
        let before = self.windows.len();
        self.windows.retain(|_, log| log.back().is_some_and(|&t| t >= cutoff));
        let dropped = before.saturating_sub(self.windows.len());
        if dropped > 0 {
            tracing::debug!(dropped, "swept idle rate-limit logs");
        }
        dropped
    }

    /// Identities currently holding a log.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    pub fn reset(&self, identity: &str) {
        self.windows.remove(identity);
    }

    pub fn clear_all(&self) {
        self.windows.clear();
    }

    fn live_count(&self, identity: &str, window_ms: u64) -> usize {
        let cutoff = self.clock.now_ms().saturating_sub(window_ms);
        self.windows
            .get(identity)
            .map(|log| log.iter().filter(|&&t| t >= cutoff).count())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("identities", &self.windows.len())
            .field("widest_window_ms", &self.widest_window_ms.load(Ordering::Relaxed))
            .finish()
    }
}

// Timestamps are appended in clock order, so expired entries sit at the front.
fn prune(log: &mut VecDeque<u64>, now: u64, window_ms: u64) {
    let cutoff = now.saturating_sub(window_ms);
    while log.front().is_some_and(|&t| t < cutoff) {
        log.pop_front();
    }
}
