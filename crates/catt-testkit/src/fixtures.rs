//! Canned handshake client transcripts.
//!
//! Texts mimic the CVP2 `openssl s_client` build closely enough for the
//! default marker rules to match.

use catt_core::Transcript;

const CONNECTED: &str = "CONNECTED(00000003)\n";
const HOOK: &str = "Inside DTCPIPAuth_SignData\n";
const HANDSHAKE_DONE: &str = "---\nSSL handshake has read 2210 bytes and written 1042 bytes\n---\n";
const RESPONSE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nok";

/// Flagged production credential accepted by the server.
#[must_use]
pub fn accepted() -> Transcript {
    Transcript::completed(format!("{CONNECTED}{HOOK}{HANDSHAKE_DONE}{RESPONSE}"), 0)
}

/// Credential rejected by the server during the handshake.
#[must_use]
pub fn rejected() -> Transcript {
    Transcript::completed(
        format!(
            "{CONNECTED}{HOOK}140231:error:14094410:SSL routines:ssl3_read_bytes:sslv3 alert handshake failure\n"
        ),
        1,
    )
}

/// Client build without the DTCP options.
#[must_use]
pub fn unsupported_extension() -> Transcript {
    Transcript::completed("s_client: unknown option -dtcp\nusage: s_client args\n", 1)
}

/// Client whose validation hook is not forced to succeed.
#[must_use]
pub fn hook_not_engaged() -> Transcript {
    Transcript::completed(format!("{CONNECTED}{HANDSHAKE_DONE}{RESPONSE}"), 0)
}

/// Clean exit without any HTTP response.
#[must_use]
pub fn no_response() -> Transcript {
    Transcript::completed(format!("{CONNECTED}{HOOK}{HANDSHAKE_DONE}closed\n"), 0)
}

/// Client killed at the deadline after partial output.
#[must_use]
pub fn timed_out() -> Transcript {
    Transcript::timed_out(format!("{CONNECTED}{HOOK}").into_bytes())
}

/// Generic stage where the X.509 chain verified.
#[must_use]
pub fn generic_verify_ok() -> Transcript {
    Transcript::completed(
        format!("{CONNECTED}{HANDSHAKE_DONE}Verify return code: 0 (ok)\n---\n{RESPONSE}"),
        0,
    )
}

/// Generic stage where the X.509 chain did not verify.
#[must_use]
pub fn generic_verify_failed() -> Transcript {
    Transcript::completed(
        format!(
            "{CONNECTED}{HANDSHAKE_DONE}Verify return code: 21 (unable to verify the first certificate)\n---\n{RESPONSE}"
        ),
        0,
    )
}

/// DTCP stage: remote certificate verified with the CVP2 bit.
#[must_use]
pub fn dtcp_server_valid() -> Transcript {
    dtcp_server(true, true)
}

/// DTCP stage with chosen verification and flag markers.
#[must_use]
pub fn dtcp_server(cert_verified: bool, flag_set: bool) -> Transcript {
    let mut text = format!("{CONNECTED}{HOOK}");
    if flag_set {
        text.push_str("CVP2_DTCIP_VerifyRemoteCert(): CVP2 bit set\n");
    }
    if cert_verified {
        text.push_str("DTCPIPAuth_VerifyRemoteCert returning 0\n");
    } else {
        text.push_str("DTCPIPAuth_VerifyRemoteCert returning -1\n");
    }
    text.push_str(HANDSHAKE_DONE);
    text.push_str(RESPONSE);
    Transcript::completed(text, 0)
}
