pub mod logbook;
pub mod redact;

pub use redact::{preview, redact_identity, Preview};
