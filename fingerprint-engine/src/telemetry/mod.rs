//! Logging setup (spec.md section 2 ambient stack: structured logging via
//! `tracing`).

mod tracing;

pub use tracing::init_tracing;
