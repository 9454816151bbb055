//! CVP2 authentication test engine.
//!
//! Drives a DTCP-enabled `openssl s_client` build against a server, captures
//! each handshake transcript, and judges the server's behaviour:
//!
//! - [`ProcessRunner`] runs the client under a time limit and merges its
//!   output into a [`Transcript`]
//! - [`EvidenceExtractor`] finds the HTTP status line and diagnostic
//!   [`Marker`]s
//! - [`EnvironmentSanityChecker`] rejects runs made with a misconfigured
//!   client
//! - [`SuiteRunner`] executes a [`TestSuite`] in order and returns a
//!   [`SuiteReport`]
//!
//! # Example
//!
//! ```rust,ignore
//! let config = CattConfig::load(Path::new("catt.toml"))?;
//! let target = HandshakeTarget::new("dut.local", 443).with_ca_file(config.main.ca_file.clone());
//! let settings = SuiteSettings::new(&config.main.client, target, &config.main.log_path)
//!     .with_time_limit(config.time_limit());
//! let runner = SuiteRunner::new(ProcessRunner::new(), settings)
//!     .with_extractor(EvidenceExtractor::new(config.marker_registry()?));
//! let report = runner.run(&config.standard_suite()).await;
//! print!("{}", render_report(&report, false));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod case;
pub mod config;
pub mod error;
pub mod evidence;
pub mod report;
pub mod sanity;
pub mod server_verify;
mod stage;
pub mod suite;
pub mod transcript;
pub mod verdict;

pub use case::{CaseKind, CredentialTestCase, HandshakeTarget};
pub use config::CattConfig;
pub use error::{ConfigError, EnvironmentError, RunnerError};
pub use evidence::{
    EvidenceExtractor, ExtractedEvidence, Marker, MarkerRegistry, MarkerRule, StatusLine,
};
pub use report::{
    CaseRecord, SuiteReport, Summary, render_case, render_case_header, render_case_outcome,
    render_report, render_summary,
};
pub use sanity::EnvironmentSanityChecker;
pub use server_verify::GenericTrust;
pub use stage::{StageKind, StageRecord};
pub use suite::{
    CaseResult, STANDARD_SCENARIOS, Scenario, SuiteEvent, SuiteRunner, SuiteSettings, TestSuite,
};
pub use transcript::{
    DEFAULT_TIME_LIMIT, HandshakeClient, Invocation, ProcessRunner, TERMINATED_EXIT_CODE,
    Transcript,
};
pub use verdict::{Verdict, VerdictKind};
