//! Verdicts and the expectation rule.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EnvironmentError;
use crate::evidence::ExtractedEvidence;

/// Terminal classification of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictKind {
    /// Required input was not supplied.
    Skipped,
    /// The harness or client is set up wrongly; nothing was judged.
    EnvironmentError,
    Pass,
    Fail,
}

impl VerdictKind {
    /// Final narration line for this kind.
    #[must_use]
    pub const fn banner(self) -> &'static str {
        match self {
            Self::Skipped => "TEST SKIPPED",
            Self::EnvironmentError => "ENVIRONMENT ERROR",
            Self::Pass => "TEST SUCCEEDED",
            Self::Fail => "TEST FAILED",
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Skipped => "SKIPPED",
            Self::EnvironmentError => "ENVIRONMENT_ERROR",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        };
        f.write_str(label)
    }
}

/// A verdict with its human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub reason: String,
}

impl Verdict {
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            kind: VerdictKind::Skipped,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn environment_error(error: &EnvironmentError) -> Self {
        Self {
            kind: VerdictKind::EnvironmentError,
            reason: error.to_string(),
        }
    }

    #[must_use]
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            kind: VerdictKind::Pass,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            kind: VerdictKind::Fail,
            reason: reason.into(),
        }
    }

    /// Judge a connection outcome against the declared expectation.
    ///
    /// A clean exit with no response line is always a failure, whatever was
    /// expected.
    #[must_use]
    pub fn evaluate(expected_success: bool, evidence: &ExtractedEvidence) -> Self {
        if evidence.missing_response() {
            return Self::fail(
                "no response despite apparent success: connection succeeded, but there is no HTTP/1.x response header",
            );
        }

        let actual_success = evidence.connection_succeeded();
        let timeout_note = if evidence.timed_out {
            " (client timed out)"
        } else {
            ""
        };
        match (expected_success, actual_success) {
            (true, true) => Self::pass("connection succeeded as expected"),
            (false, false) => Self::pass(format!("connection failed as expected{timeout_note}")),
            (true, false) => Self::fail(format!(
                "connection failed when it should have succeeded{timeout_note}"
            )),
            (false, true) => Self::fail("connection succeeded when it should have failed"),
        }
    }

    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self.kind, VerdictKind::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}
