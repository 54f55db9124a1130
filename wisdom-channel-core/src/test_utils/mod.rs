//! Test utilities for wisdom-channel
//!
//! Shared by the unit tests and the integration tests under `tests/`:
//! scripted handlers, a flaky mailbox wrapper, paired-node fixtures and
//! async polling helpers.

pub mod async_helpers;
pub mod fixtures;
pub mod handlers;

pub use async_helpers::*;
pub use fixtures::*;
pub use handlers::*;
