//! Two-stage verification of the server's own certificate.
//!
//! Stage one connects with generic trust-chain verification only. If the
//! chain verifies, the certificate is accepted on that path alone. Otherwise
//! stage two repeats the handshake with the DTCP options and requires the
//! DTCP library to both verify the remote certificate and report the CVP2
//! bit.
//!
//! When stage one accepts the certificate the CVP2 bit is never examined.
//! This is recorded as a note on the result rather than silently treated as
//! verified.

use std::path::Path;

use tracing::{error, info};

use crate::case::HandshakeTarget;
use crate::evidence::{ExtractedEvidence, Marker};
use crate::sanity::EnvironmentSanityChecker;
use crate::stage::{LogMode, StageContext, StageKind, StageRecord};
use crate::transcript::{HandshakeClient, Invocation};
use crate::verdict::Verdict;

/// Note attached when the capability flag is not checked.
pub const FLAG_NOT_CHECKED_NOTE: &str =
    "CVP2 bit not checked: the certificate was accepted by generic trust-chain verification";

/// Outcome of the generic trust-chain stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericTrust {
    /// The chain verified; no DTCP check is needed.
    Accepted,
    /// The chain did not verify; the DTCP stage must decide.
    NeedsDeepCheck(String),
}

impl GenericTrust {
    #[must_use]
    pub fn assess(evidence: &ExtractedEvidence) -> Self {
        if evidence.has(Marker::GenericVerifyOk) {
            Self::Accepted
        } else if evidence.timed_out {
            Self::NeedsDeepCheck("generic verification timed out".to_string())
        } else {
            Self::NeedsDeepCheck("no successful verify return code in transcript".to_string())
        }
    }
}

/// Inputs for the server-verification step.
pub(crate) struct ServerVerification<'a> {
    pub program: &'a Path,
    pub target: &'a HandshakeTarget,
    pub library: &'a Path,
    pub credential_dir: &'a Path,
    pub sanity: &'a EnvironmentSanityChecker,
}

impl ServerVerification<'_> {
    pub async fn run<C: HandshakeClient + ?Sized>(
        &self,
        ctx: &StageContext<'_, C>,
    ) -> (Verdict, Vec<StageRecord>) {
        let generic = Invocation::new(self.program, self.target.generic_trust_args());
        let first = match ctx
            .execute(StageKind::GenericTrust, &generic, LogMode::Truncate)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "generic trust stage could not run");
                return (Verdict::environment_error(&err), Vec::new());
            }
        };

        let connection = Verdict::evaluate(true, &first.evidence);
        let mut first_record = first.record;

        let reason = match GenericTrust::assess(&first.evidence) {
            GenericTrust::Accepted => {
                first_record
                    .notes
                    .push("Server X.509 certificate verification succeeded".to_string());
                first_record.notes.push(FLAG_NOT_CHECKED_NOTE.to_string());
                info!("server certificate accepted by generic verification");
                let verdict = if connection.is_pass() {
                    Verdict::pass(
                        "server certificate accepted by generic trust-chain verification",
                    )
                } else {
                    connection
                };
                return (verdict, vec![first_record]);
            }
            GenericTrust::NeedsDeepCheck(reason) => reason,
        };

        first_record.notes.push(
            "Server's X.509 certificate did not verify, checking DTCP certificate".to_string(),
        );
        info!(%reason, "falling back to DTCP certificate check");

        let deep = Invocation::new(
            self.program,
            self.target.deep_check_args(self.library, self.credential_dir),
        );
        let second = match ctx
            .execute(StageKind::DeepCheck, &deep, LogMode::Append)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "DTCP stage could not run");
                return (Verdict::environment_error(&err), vec![first_record]);
            }
        };
        let mut second_record = second.record;

        if let Some(err) = self.sanity.check(&second.evidence) {
            error!(error = %err, "environment check failed");
            return (
                Verdict::environment_error(&err),
                vec![first_record, second_record],
            );
        }

        let mut failures = Vec::new();
        if !connection.is_pass() {
            failures.push(format!("generic stage: {}", connection.reason));
        }
        let deep_connection = Verdict::evaluate(true, &second.evidence);
        if !deep_connection.is_pass() {
            failures.push(format!("DTCP stage: {}", deep_connection.reason));
        }

        if second.evidence.has(Marker::RemoteCertVerified) {
            second_record
                .notes
                .push("Server's DTCP certificate is valid".to_string());
        } else {
            second_record
                .notes
                .push("Server's DTCP certificate is invalid".to_string());
            failures.push("server's DTCP certificate is invalid".to_string());
        }

        if second.evidence.has(Marker::CapabilityFlagSet) {
            second_record
                .notes
                .push("CVP2 bit is set in remote certificate".to_string());
        } else {
            second_record
                .notes
                .push("CVP2 bit is NOT set in remote certificate".to_string());
            failures.push("CVP2 bit is not set in remote certificate".to_string());
        }

        let verdict = if failures.is_empty() {
            Verdict::pass("server's DTCP certificate is valid and has the CVP2 bit set")
        } else {
            Verdict::fail(failures.join("; "))
        };
        (verdict, vec![first_record, second_record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceExtractor;
    use crate::transcript::Transcript;

    fn assess(transcript: &Transcript) -> GenericTrust {
        GenericTrust::assess(&EvidenceExtractor::default().extract(transcript))
    }

    #[test]
    fn verify_ok_accepts() {
        let transcript = Transcript::completed(
            "---\nVerify return code: 0 (ok)\n---\nHTTP/1.1 200 OK\r\n",
            0,
        );
        assert_eq!(assess(&transcript), GenericTrust::Accepted);
    }

    #[test]
    fn other_verify_codes_need_deep_check() {
        let transcript = Transcript::completed(
            "Verify return code: 21 (unable to verify the first certificate)\nHTTP/1.1 200 OK\r\n",
            0,
        );
        assert!(matches!(assess(&transcript), GenericTrust::NeedsDeepCheck(_)));
    }

    #[test]
    fn verify_ok_in_response_body_is_not_trusted() {
        let transcript = Transcript::completed(
            "CONNECTED\nHTTP/1.1 200 OK\r\n\r\nVerify return code: 0 (ok)\n",
            0,
        );
        assert!(matches!(assess(&transcript), GenericTrust::NeedsDeepCheck(_)));
    }

    #[test]
    fn timeout_reason_is_specific() {
        let transcript = Transcript::timed_out(Vec::new());
        assert_eq!(
            assess(&transcript),
            GenericTrust::NeedsDeepCheck("generic verification timed out".to_string())
        );
    }
}
