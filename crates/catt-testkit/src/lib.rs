//! Test support for the CVP2 authentication test tool.
//!
//! - [`ScriptedClient`] replays canned transcripts and records invocations
//! - [`FakeClientScript`] writes an executable fake `openssl` (unix only)
//! - [`fixtures`] holds transcripts for the common client behaviours
//! - [`init_test_tracing`] installs a once-only test subscriber

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_panics_doc)]

#[cfg(unix)]
mod fake_client;
pub mod fixtures;
mod scripted;
mod tracing_config;

#[cfg(unix)]
pub use fake_client::*;
pub use scripted::*;
pub use tracing_config::*;
