//! Shared utilities.
//!
//! Tracing bootstrap, cancellation signals and the retry engine.

pub mod bootstrap;
pub mod cancel;
pub mod retry;
