//! Evidence extraction from handshake transcripts.
//!
//! Two kinds of evidence are pulled out of a transcript: the HTTP status line
//! of the synthetic request, and a set of named diagnostic markers printed by
//! the CVP2 client build. Marker matching rules live in a [`MarkerRegistry`]
//! so the phrasing the client uses can change without touching verdict logic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::transcript::Transcript;

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m-u)^HTTP/[1-9]\.[0-9]+ ([0-9]+) (.*)$").expect("valid status line pattern")
});

/// Diagnostic markers the harness looks for in client output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// The client rejected `-dtcp`.
    UnsupportedExtension,
    /// The always-succeed DTCP signing hook ran.
    AuthHookEngaged,
    /// Generic X.509 verification returned `0 (ok)`.
    GenericVerifyOk,
    /// The DTCP library verified the remote certificate.
    RemoteCertVerified,
    /// The CVP2 bit was set on the remote certificate.
    CapabilityFlagSet,
}

impl Marker {
    pub const ALL: [Self; 5] = [
        Self::UnsupportedExtension,
        Self::AuthHookEngaged,
        Self::GenericVerifyOk,
        Self::RemoteCertVerified,
        Self::CapabilityFlagSet,
    ];

    /// Stable identifier used in configuration and reports.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::UnsupportedExtension => "unsupported_extension",
            Self::AuthHookEngaged => "auth_hook_engaged",
            Self::GenericVerifyOk => "generic_verify_ok",
            Self::RemoteCertVerified => "remote_cert_verified",
            Self::CapabilityFlagSet => "capability_flag_set",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|marker| marker.id() == id)
    }

    /// Text the CVP2 OpenSSL build prints for this marker.
    #[must_use]
    pub const fn default_text(self) -> &'static str {
        match self {
            Self::UnsupportedExtension => "unknown option -dtcp",
            Self::AuthHookEngaged => "Inside DTCPIPAuth_SignData",
            Self::GenericVerifyOk => "Verify return code: 0 (ok)",
            Self::RemoteCertVerified => "DTCPIPAuth_VerifyRemoteCert returning 0",
            Self::CapabilityFlagSet => "CVP2_DTCIP_VerifyRemoteCert(): CVP2 bit set",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How a marker is recognised in a transcript.
#[derive(Debug, Clone)]
pub enum MarkerRule {
    /// Exact text occurring anywhere.
    Substring(String),
    /// Byte regular expression.
    Pattern(Regex),
    /// Raw byte sequence occurring anywhere.
    Bytes(Vec<u8>),
}

impl MarkerRule {
    #[must_use]
    pub fn matches(&self, haystack: &[u8]) -> bool {
        match self {
            Self::Substring(text) => contains_bytes(haystack, text.as_bytes()),
            Self::Pattern(regex) => regex.is_match(haystack),
            Self::Bytes(bytes) => contains_bytes(haystack, bytes),
        }
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Marker → rule table.
#[derive(Debug, Clone)]
pub struct MarkerRegistry {
    rules: BTreeMap<Marker, MarkerRule>,
}

impl MarkerRegistry {
    /// Replace the rule for one marker.
    #[must_use]
    pub fn with_rule(mut self, marker: Marker, rule: MarkerRule) -> Self {
        self.rules.insert(marker, rule);
        self
    }

    #[must_use]
    pub fn rule(&self, marker: Marker) -> Option<&MarkerRule> {
        self.rules.get(&marker)
    }

    /// Every marker whose rule matches `haystack`.
    #[must_use]
    pub fn find_all(&self, haystack: &[u8]) -> BTreeSet<Marker> {
        self.rules
            .iter()
            .filter(|(_, rule)| rule.matches(haystack))
            .map(|(marker, _)| *marker)
            .collect()
    }
}

impl Default for MarkerRegistry {
    fn default() -> Self {
        Self {
            rules: Marker::ALL
                .into_iter()
                .map(|marker| (marker, MarkerRule::Substring(marker.default_text().to_string())))
                .collect(),
        }
    }
}

/// Parsed `HTTP/x.y CODE PHRASE` response line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    /// The whole line, without a trailing CR.
    pub line: String,
    pub code: u32,
    pub phrase: String,
}

impl StatusLine {
    /// `CODE PHRASE`, as narrated after "HTTP Status:".
    #[must_use]
    pub fn status(&self) -> String {
        format!("{} {}", self.code, self.phrase)
    }
}

/// Evidence pulled from one transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEvidence {
    pub status: Option<StatusLine>,
    pub markers: BTreeSet<Marker>,
    /// Transcript bytes before the status line (all of it when there is none).
    pub pre_response: Vec<u8>,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ExtractedEvidence {
    #[must_use]
    pub fn has(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    /// The client reported a clean exit.
    #[must_use]
    pub const fn exited_cleanly(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Clean exit and a parsable response: the connection was accepted.
    #[must_use]
    pub const fn connection_succeeded(&self) -> bool {
        self.exited_cleanly() && self.status.is_some()
    }

    /// Clean exit but no response line: the interaction was malformed.
    #[must_use]
    pub const fn missing_response(&self) -> bool {
        self.exited_cleanly() && self.status.is_none()
    }
}

/// Scans transcripts with a [`MarkerRegistry`].
#[derive(Debug, Clone, Default)]
pub struct EvidenceExtractor {
    registry: MarkerRegistry,
}

impl EvidenceExtractor {
    #[must_use]
    pub const fn new(registry: MarkerRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn extract(&self, transcript: &Transcript) -> ExtractedEvidence {
        let raw = transcript.raw();
        let (status, split_at) = match find_status_line(raw) {
            Some((status, start)) => (Some(status), start),
            None => (None, raw.len()),
        };
        // Markers are only searched before the response so the server's body
        // cannot fake client diagnostics.
        let pre_response = raw[..split_at].to_vec();
        let markers = self.registry.find_all(&pre_response);

        ExtractedEvidence {
            status,
            markers,
            pre_response,
            exit_code: transcript.exit_code(),
            timed_out: transcript.is_timed_out(),
        }
    }
}

fn find_status_line(raw: &[u8]) -> Option<(StatusLine, usize)> {
    STATUS_LINE.captures_iter(raw).find_map(|caps| {
        let whole = caps.get(0)?;
        let code = std::str::from_utf8(caps.get(1)?.as_bytes())
            .ok()?
            .parse::<u32>()
            .ok()?;
        let phrase = String::from_utf8_lossy(caps.get(2)?.as_bytes())
            .trim_end_matches('\r')
            .to_string();
        let line = String::from_utf8_lossy(whole.as_bytes())
            .trim_end_matches('\r')
            .to_string();
        Some((StatusLine { line, code, phrase }, whole.start()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(raw: &str, exit_code: i32) -> ExtractedEvidence {
        EvidenceExtractor::default().extract(&Transcript::completed(raw.as_bytes(), exit_code))
    }

    #[test]
    fn finds_status_line_and_splits_transcript() {
        let evidence = extract(
            "CONNECTED(00000003)\nInside DTCPIPAuth_SignData\n---\nHTTP/1.1 200 OK\r\nServer: x\r\n",
            0,
        );
        let status = evidence.status.as_ref().expect("status line");
        assert_eq!(status.code, 200);
        assert_eq!(status.phrase, "OK");
        assert_eq!(status.line, "HTTP/1.1 200 OK");
        assert_eq!(status.status(), "200 OK");
        assert!(evidence.pre_response.ends_with(b"---\n"));
        assert!(evidence.has(Marker::AuthHookEngaged));
        assert!(evidence.connection_succeeded());
    }

    #[test]
    fn markers_in_response_body_are_ignored() {
        let evidence = extract(
            "CONNECTED\nHTTP/1.0 200 OK\r\n\r\nVerify return code: 0 (ok)\nInside DTCPIPAuth_SignData\n",
            0,
        );
        assert!(evidence.status.is_some());
        assert!(!evidence.has(Marker::GenericVerifyOk));
        assert!(!evidence.has(Marker::AuthHookEngaged));
    }

    #[test]
    fn non_utf8_reason_phrase_still_counts_as_response() {
        let transcript = Transcript::completed(
            b"CONNECTED\nInside DTCPIPAuth_SignData\nHTTP/1.1 200 OK\xe9\r\n\r\nbody".to_vec(),
            0,
        );
        let evidence = EvidenceExtractor::default().extract(&transcript);
        let status = evidence.status.as_ref().expect("status line");
        assert_eq!(status.code, 200);
        assert_eq!(status.phrase, "OK\u{fffd}");
        assert!(evidence.connection_succeeded());
        assert!(!evidence.missing_response());
    }

    #[test]
    fn status_must_start_a_line() {
        let evidence = extract("echo: xHTTP/1.1 200 OK\n", 0);
        assert!(evidence.status.is_none());
    }

    #[test]
    fn clean_exit_without_status_is_missing_response() {
        let evidence = extract("CONNECTED\nInside DTCPIPAuth_SignData\n", 0);
        assert!(evidence.missing_response());
        assert!(!evidence.connection_succeeded());
        assert_eq!(
            evidence.pre_response,
            b"CONNECTED\nInside DTCPIPAuth_SignData\n".to_vec()
        );
    }

    #[test]
    fn failed_exit_is_not_missing_response() {
        let evidence = extract("connect:errno=111\n", 1);
        assert!(!evidence.missing_response());
        assert!(!evidence.connection_succeeded());
    }

    #[test]
    fn timed_out_with_status_is_not_success() {
        let transcript = Transcript::timed_out(b"HTTP/1.1 200 OK\r\n".to_vec());
        let evidence = EvidenceExtractor::default().extract(&transcript);
        assert!(evidence.status.is_some());
        assert!(!evidence.connection_succeeded());
        assert!(!evidence.missing_response());
    }

    #[test]
    fn registry_rules_are_swappable() {
        let registry = MarkerRegistry::default()
            .with_rule(
                Marker::CapabilityFlagSet,
                MarkerRule::Pattern(Regex::new(r"CVP2 bit (is )?set").expect("regex")),
            )
            .with_rule(
                Marker::AuthHookEngaged,
                MarkerRule::Bytes(vec![0xde, 0xad, 0xbe, 0xef]),
            );
        let found = registry.find_all(b"remote: CVP2 bit is set \xde\xad\xbe\xef");
        assert!(found.contains(&Marker::CapabilityFlagSet));
        assert!(found.contains(&Marker::AuthHookEngaged));
        assert!(!found.contains(&Marker::GenericVerifyOk));
    }

    #[test]
    fn marker_ids_round_trip() {
        for marker in Marker::ALL {
            assert_eq!(Marker::from_id(marker.id()), Some(marker));
        }
        assert_eq!(Marker::from_id("nope"), None);
    }
}
