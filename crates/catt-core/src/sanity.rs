//! Harness self-checks run before any verdict is computed.

use crate::error::EnvironmentError;
use crate::evidence::{ExtractedEvidence, Marker};

/// Detects a misconfigured handshake client from the evidence of a
/// protocol-specific run.
///
/// Two conditions invalidate a run:
/// 1. the client does not know the `-dtcp` options, and
/// 2. the client's DTCP validation hook is not forced to succeed, which would
///    let the client's own defensive logic decide accept/reject instead of
///    the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentSanityChecker;

impl EnvironmentSanityChecker {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the first failed invariant, if any.
    #[must_use]
    pub fn check(&self, evidence: &ExtractedEvidence) -> Option<EnvironmentError> {
        if evidence.has(Marker::UnsupportedExtension) {
            return Some(EnvironmentError::UnsupportedExtension);
        }
        if !evidence.has(Marker::AuthHookEngaged) {
            return Some(EnvironmentError::AuthHookNotEngaged);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceExtractor;
    use crate::transcript::Transcript;

    fn evidence(raw: &str, exit_code: i32) -> ExtractedEvidence {
        EvidenceExtractor::default().extract(&Transcript::completed(raw.as_bytes(), exit_code))
    }

    #[test]
    fn healthy_client_passes() {
        let evidence = evidence("Inside DTCPIPAuth_SignData\nHTTP/1.1 200 OK\r\n", 0);
        assert_eq!(EnvironmentSanityChecker::new().check(&evidence), None);
    }

    #[test]
    fn unknown_option_wins_over_missing_hook() {
        let evidence = evidence("s_client: unknown option -dtcp\nusage: s_client ...\n", 1);
        assert_eq!(
            EnvironmentSanityChecker::new().check(&evidence),
            Some(EnvironmentError::UnsupportedExtension)
        );
    }

    #[test]
    fn missing_hook_is_fatal_even_on_clean_exit() {
        let evidence = evidence("CONNECTED\nHTTP/1.1 200 OK\r\n", 0);
        assert_eq!(
            EnvironmentSanityChecker::new().check(&evidence),
            Some(EnvironmentError::AuthHookNotEngaged)
        );
    }

    #[test]
    fn hook_marker_after_response_does_not_count() {
        let evidence = evidence("CONNECTED\nHTTP/1.1 200 OK\r\n\r\nInside DTCPIPAuth_SignData\n", 0);
        assert_eq!(
            EnvironmentSanityChecker::new().check(&evidence),
            Some(EnvironmentError::AuthHookNotEngaged)
        );
    }
}
