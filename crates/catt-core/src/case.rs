//! Test case declarations and the handshake-client argument contract.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How a case is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    /// One DTCP handshake presenting a client credential.
    ClientCredential,
    /// Two-stage check of the server's own certificate.
    ServerVerification,
}

/// A named scenario: a library/credential pairing and the connection outcome
/// the server is expected to produce for it.
///
/// An absent library or credential directory means the input was never
/// supplied, and the case is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialTestCase {
    name: String,
    log_id: String,
    library: Option<PathBuf>,
    credential_dir: Option<PathBuf>,
    expected_success: bool,
    kind: CaseKind,
}

impl CredentialTestCase {
    /// A client-credential case.
    #[must_use]
    pub fn client_credential(
        name: impl Into<String>,
        log_id: impl Into<String>,
        library: Option<PathBuf>,
        credential_dir: Option<PathBuf>,
        expected_success: bool,
    ) -> Self {
        Self {
            name: name.into(),
            log_id: log_id.into(),
            library,
            credential_dir,
            expected_success,
            kind: CaseKind::ClientCredential,
        }
    }

    /// The server-certificate case. The server is always expected to be
    /// reachable and to present a valid certificate.
    #[must_use]
    pub fn server_verification(
        name: impl Into<String>,
        log_id: impl Into<String>,
        library: Option<PathBuf>,
        credential_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            log_id: log_id.into(),
            library,
            credential_dir,
            expected_success: true,
            kind: CaseKind::ServerVerification,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    #[must_use]
    pub fn library(&self) -> Option<&Path> {
        self.library.as_deref()
    }

    #[must_use]
    pub fn credential_dir(&self) -> Option<&Path> {
        self.credential_dir.as_deref()
    }

    #[must_use]
    pub const fn expected_success(&self) -> bool {
        self.expected_success
    }

    #[must_use]
    pub const fn kind(&self) -> CaseKind {
        self.kind
    }

    /// `<log_dir>/<log_id>.log`
    #[must_use]
    pub fn log_file(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(format!("{}.log", self.log_id))
    }

    /// Why the case cannot run, if an input is missing.
    #[must_use]
    pub fn missing_input(&self) -> Option<&'static str> {
        if self.credential_dir.is_none() {
            Some("required credential directory not configured")
        } else if self.library.is_none() {
            Some("required DTCP library not configured")
        } else {
            None
        }
    }
}

/// The server under test and the request sent to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeTarget {
    host: String,
    port: u16,
    path: String,
    ca_file: Option<PathBuf>,
}

impl HandshakeTarget {
    pub const DEFAULT_PORT: u16 = 443;

    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: "/".to_string(),
            ca_file: None,
        }
    }

    /// Request path; a leading `/` is added when missing.
    #[must_use]
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = normalize_request_path(path);
        self
    }

    #[must_use]
    pub fn with_ca_file(mut self, ca_file: Option<PathBuf>) -> Self {
        self.ca_file = ca_file;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn ca_file(&self) -> Option<&Path> {
        self.ca_file.as_deref()
    }

    /// `GET <path> HTTP/1.0` followed by the blank-line terminator.
    #[must_use]
    pub fn request_payload(&self) -> Vec<u8> {
        format!("GET {} HTTP/1.0\r\n\r\n", self.path).into_bytes()
    }

    /// Arguments for a client-credential handshake.
    #[must_use]
    pub fn client_credential_args(&self, library: &Path, credential_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "s_client".to_string(),
            "-host".to_string(),
            self.host.clone(),
            "-ign_eof".to_string(),
        ];
        self.push_ca_file(&mut args);
        args.extend(["-port".to_string(), self.port.to_string()]);
        args.extend(dtcp_args(library, credential_dir));
        args.extend(["-purpose".to_string(), "any".to_string()]);
        args
    }

    /// Arguments for the generic trust-chain stage of server verification.
    #[must_use]
    pub fn generic_trust_args(&self) -> Vec<String> {
        let mut args = vec![
            "s_client".to_string(),
            "-host".to_string(),
            self.host.clone(),
            "-ign_eof".to_string(),
            "-port".to_string(),
            self.port.to_string(),
        ];
        self.push_ca_file(&mut args);
        args.extend(["-purpose".to_string(), "any".to_string()]);
        args
    }

    /// Arguments for the DTCP stage of server verification: the generic
    /// arguments with the DTCP options appended.
    #[must_use]
    pub fn deep_check_args(&self, library: &Path, credential_dir: &Path) -> Vec<String> {
        let mut args = self.generic_trust_args();
        args.extend(dtcp_args(library, credential_dir));
        args
    }

    fn push_ca_file(&self, args: &mut Vec<String>) {
        if let Some(ca_file) = &self.ca_file {
            args.push("-CAfile".to_string());
            args.push(ca_file.display().to_string());
        }
    }
}

fn dtcp_args(library: &Path, credential_dir: &Path) -> [String; 5] {
    [
        "-dtcp".to_string(),
        "-dtcp_dll_path".to_string(),
        library.display().to_string(),
        "-dtcp_key_storage_dir".to_string(),
        credential_dir.display().to_string(),
    ]
}

/// Prefix `/` unless already present.
#[must_use]
pub fn normalize_request_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> HandshakeTarget {
        HandshakeTarget::new("dut.local", 8443).with_ca_file(Some(PathBuf::from("/certs/ca.pem")))
    }

    #[test]
    fn client_credential_argument_order() {
        let args = target().client_credential_args(Path::new("/lib/prod.so"), Path::new("/keys/prod"));
        assert_eq!(
            args.join(" "),
            "s_client -host dut.local -ign_eof -CAfile /certs/ca.pem -port 8443 -dtcp \
             -dtcp_dll_path /lib/prod.so -dtcp_key_storage_dir /keys/prod -purpose any"
        );
    }

    #[test]
    fn server_stages_share_a_prefix() {
        let target = target();
        let generic = target.generic_trust_args();
        assert_eq!(
            generic.join(" "),
            "s_client -host dut.local -ign_eof -port 8443 -CAfile /certs/ca.pem -purpose any"
        );
        assert!(!generic.iter().any(|arg| arg == "-dtcp"));

        let deep = target.deep_check_args(Path::new("/lib/prod.so"), Path::new("/keys/prod"));
        assert_eq!(&deep[..generic.len()], generic.as_slice());
        assert_eq!(
            &deep[generic.len()..],
            ["-dtcp", "-dtcp_dll_path", "/lib/prod.so", "-dtcp_key_storage_dir", "/keys/prod"]
        );
    }

    #[test]
    fn ca_file_is_optional() {
        let target = HandshakeTarget::new("dut.local", 443);
        assert!(!target.generic_trust_args().iter().any(|arg| arg == "-CAfile"));
        assert!(
            !target
                .client_credential_args(Path::new("l"), Path::new("k"))
                .iter()
                .any(|arg| arg == "-CAfile")
        );
    }

    #[test]
    fn request_path_gets_leading_slash() {
        let target = HandshakeTarget::new("h", 443).with_path("index.html");
        assert_eq!(target.path(), "/index.html");
        assert_eq!(target.request_payload(), b"GET /index.html HTTP/1.0\r\n\r\n".to_vec());
        assert_eq!(normalize_request_path("/a"), "/a");
    }

    #[test]
    fn missing_inputs_are_reported() {
        let no_key = CredentialTestCase::client_credential("c", "c", Some("/lib".into()), None, false);
        assert_eq!(
            no_key.missing_input(),
            Some("required credential directory not configured")
        );

        let no_lib = CredentialTestCase::client_credential("c", "c", None, Some("/k".into()), false);
        assert_eq!(no_lib.missing_input(), Some("required DTCP library not configured"));

        let full = CredentialTestCase::server_verification("s", "server-verify", Some("/l".into()), Some("/k".into()));
        assert_eq!(full.missing_input(), None);
        assert!(full.expected_success());
        assert_eq!(full.log_file(Path::new("logs")), PathBuf::from("logs/server-verify.log"));
    }
}
