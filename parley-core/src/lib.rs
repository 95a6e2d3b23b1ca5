//! Parley core: the message-intake pipeline that sits between a chat surface
//! and a text-generation backend.
//!
//! A turn flows sanitize → validate → admit → detect language → dispatch, with
//! the backend's chunk stream assembled by a per-turn [`services::StreamAggregator`].
//! Entry point is [`services::ChatOrchestrator::handle_turn`].

pub mod config;
pub mod error;
pub mod runtime;
pub mod services;
pub mod utils;

pub use config::CoreConfig;
pub use error::{BackendError, StoreError, ValidationError};
pub use runtime::{ensure_initialized, parley_root, InitReport, Runtime};
