//! End-to-end scenarios for the command layer.
//!
//! Each scenario drives the public [`CommandDispatcher`](mgam::CommandDispatcher)
//! against the in-memory store and scripted site controller from
//! `mgam::test_utils`.

mod money;
mod replay;
mod session;
