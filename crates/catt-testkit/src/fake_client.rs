//! Executable stand-ins for the handshake client.
//!
//! Each script lives in its own temporary directory. It appends its argument
//! list to `calls.log`, saves stdin to `request.bin`, then prints a canned
//! transcript and exits with a chosen code. Output can differ depending on
//! whether `-dtcp` was passed, which is enough to drive both stages of
//! server verification.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tempfile::TempDir;

const SCRIPT: &str = "openssl";
const CALLS: &str = "calls.log";
const REQUEST: &str = "request.bin";
const PLAIN_OUT: &str = "plain.out";
const DTCP_OUT: &str = "dtcp.out";

/// A fake `openssl` shell script in a temporary directory.
#[derive(Debug)]
pub struct FakeClientScript {
    dir: TempDir,
}

impl FakeClientScript {
    /// Same output whatever the arguments.
    ///
    /// # Errors
    /// Returns an IO error if the script cannot be written.
    pub fn fixed(output: &str, exit_code: i32) -> io::Result<Self> {
        Self::split((output, exit_code), (output, exit_code))
    }

    /// `plain` without `-dtcp`, `dtcp` with it.
    ///
    /// # Errors
    /// Returns an IO error if the script cannot be written.
    pub fn split(plain: (&str, i32), dtcp: (&str, i32)) -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(PLAIN_OUT), plain.0)?;
        fs::write(dir.path().join(DTCP_OUT), dtcp.0)?;

        let base = dir.path().display();
        let body = format!(
            "case \" $* \" in\n  *\" -dtcp \"*) cat \"{base}/{DTCP_OUT}\"; exit {} ;;\n  *) cat \"{base}/{PLAIN_OUT}\"; exit {} ;;\nesac\n",
            dtcp.1, plain.1
        );
        Self::write_script(dir, &body)
    }

    /// Runs `body` after recording the call and consuming stdin.
    ///
    /// # Errors
    /// Returns an IO error if the script cannot be written.
    pub fn from_body(body: &str) -> io::Result<Self> {
        Self::write_script(tempfile::tempdir()?, body)
    }

    fn write_script(dir: TempDir, body: &str) -> io::Result<Self> {
        let base = dir.path().display().to_string();
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$*\" >> \"{base}/{CALLS}\"\ncat > \"{base}/{REQUEST}\"\n{body}"
        );
        let path = dir.path().join(SCRIPT);
        {
            let mut file = fs::File::create(&path)?;
            file.write_all(script.as_bytes())?;
            file.sync_all()?;
        }
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(Self { dir })
    }

    /// Path to pass as the client executable.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.path().join(SCRIPT)
    }

    /// Argument lines, one per invocation.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join(CALLS))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Bytes received on stdin by the most recent invocation.
    #[must_use]
    pub fn last_request(&self) -> Vec<u8> {
        fs::read(self.dir.path().join(REQUEST)).unwrap_or_default()
    }
}
