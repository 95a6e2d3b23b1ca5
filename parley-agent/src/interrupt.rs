// parley-agent/src/interrupt.rs
//! Ctrl-C routing: one process-wide listener that cancels the turn in flight,
//! or exits when nothing is running.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exit status after an interrupt with no turn running.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct TurnInterrupts {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl TurnInterrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new turn and hand back its cancellation token.
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        token
    }

    pub fn end(&self) {
        self.slot().take();
    }

    /// Cancel the turn in flight. Returns `false` when there was none.
    pub fn interrupt(&self) -> bool {
        match self.slot().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Install the single Ctrl-C listener for the process.
    pub fn listen(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if this.interrupt() {
                    tracing::info!("turn interrupted");
                    continue;
                }
                tracing::info!("interrupted with no turn running; exiting");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        })
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
