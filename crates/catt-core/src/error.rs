//! Error types for the CVP2 authentication test engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while driving the external handshake client.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The client binary could not be started (not found, not executable).
    #[error("failed to start handshake client {}: {source}", program.display())]
    Spawn {
        /// Program that was being started.
        program: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A standard stream of the child was not captured.
    #[error("handshake client {0} pipe unavailable")]
    PipeUnavailable(&'static str),

    /// Reading output or waiting for the child failed.
    #[error("failed while collecting handshake client output: {0}")]
    Collect(#[source] io::Error),
}

/// Conditions that invalidate a case's verdict because the harness itself is
/// misconfigured.
///
/// These are reported as `ENVIRONMENT_ERROR`, never as a compliance failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentError {
    /// The client rejected the `-dtcp` options.
    #[error(
        "handshake client does not support the -dtcp options; make sure it is the CVP2 OpenSSL build"
    )]
    UnsupportedExtension,

    /// The client's DTCP supplemental-data hook never ran.
    #[error(
        "handshake client is set up incorrectly; validate_dtcp_suppdata() in s_client.c must ALWAYS return 0, including in error conditions (test builds only)"
    )]
    AuthHookNotEngaged,

    /// The client could not be started at all.
    #[error("{0}")]
    ClientUnavailable(String),

    /// Output collection failed part way.
    #[error("{0}")]
    Collection(String),

    /// The per-case transcript log could not be written.
    #[error("failed to write log {}: {message}", path.display())]
    LogUnwritable {
        /// Log file path.
        path: PathBuf,
        /// Underlying error text.
        message: String,
    },
}

impl From<RunnerError> for EnvironmentError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Spawn { .. } => Self::ClientUnavailable(err.to_string()),
            RunnerError::PipeUnavailable(_) | RunnerError::Collect(_) => {
                Self::Collection(err.to_string())
            }
        }
    }
}

/// Errors returned by configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// TOML syntax or shape error.
    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// `main.client` is empty.
    #[error("missing required setting: main.client")]
    MissingClient,

    /// `main.timeout_secs` is zero.
    #[error("main.timeout_secs must be greater than zero")]
    ZeroTimeout,

    /// A `[markers]` key does not name a known marker.
    #[error("unknown marker `{0}` in [markers]")]
    UnknownMarker(String),

    /// A marker override could not be compiled.
    #[error("invalid rule for marker `{marker}`: {message}")]
    InvalidMarkerRule {
        /// Marker id.
        marker: String,
        /// Why the rule was rejected.
        message: String,
    },
}
