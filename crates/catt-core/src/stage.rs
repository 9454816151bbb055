//! One handshake run inside a case: invoke, persist, extract.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EnvironmentError;
use crate::evidence::{EvidenceExtractor, ExtractedEvidence, Marker, StatusLine};
use crate::transcript::{HandshakeClient, Invocation};

/// Which handshake a stage record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Client-credential DTCP handshake.
    Handshake,
    /// Server verification, generic trust-chain stage.
    GenericTrust,
    /// Server verification, DTCP stage.
    DeepCheck,
}

/// What one handshake run showed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub command_line: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub status: Option<StatusLine>,
    pub markers: BTreeSet<Marker>,
    /// Clean exit without a response line.
    pub missing_response: bool,
    /// Stage-specific findings, narrated after the connection outcome.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl StageRecord {
    fn new(stage: StageKind, invocation: &Invocation, evidence: &ExtractedEvidence) -> Self {
        Self {
            stage,
            command_line: invocation.command_line(),
            exit_code: evidence.exit_code,
            timed_out: evidence.timed_out,
            status: evidence.status.clone(),
            markers: evidence.markers.clone(),
            missing_response: evidence.missing_response(),
            notes: Vec::new(),
        }
    }
}

/// Whether a stage starts the case log or extends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogMode {
    Truncate,
    Append,
}

pub(crate) struct StageOutcome {
    pub evidence: ExtractedEvidence,
    pub record: StageRecord,
}

/// Everything a stage needs that is fixed for the whole case.
pub(crate) struct StageContext<'a, C: ?Sized> {
    pub client: &'a C,
    pub extractor: &'a EvidenceExtractor,
    pub payload: &'a [u8],
    pub time_limit: Duration,
    pub log_path: &'a Path,
}

impl<C: HandshakeClient + ?Sized> StageContext<'_, C> {
    /// Run the client once and persist its transcript before extracting
    /// evidence from it.
    pub async fn execute(
        &self,
        stage: StageKind,
        invocation: &Invocation,
        mode: LogMode,
    ) -> Result<StageOutcome, EnvironmentError> {
        let transcript = match self
            .client
            .run(invocation, self.payload, self.time_limit)
            .await
        {
            Ok(transcript) => transcript,
            Err(err) => {
                let err = EnvironmentError::from(err);
                // The log still records why there is no transcript.
                let note = format!("catt: {err}\n");
                if let Err(log_err) = self.write_log(note.as_bytes(), mode) {
                    warn!(error = %log_err, "could not record client failure in case log");
                }
                return Err(err);
            }
        };

        self.write_log(transcript.raw(), mode)?;

        let evidence = self.extractor.extract(&transcript);
        debug!(
            ?stage,
            exit_code = evidence.exit_code,
            timed_out = evidence.timed_out,
            status = evidence.status.as_ref().map(|status| status.line.as_str()),
            markers = ?evidence.markers,
            "evidence extracted"
        );
        let record = StageRecord::new(stage, invocation, &evidence);
        Ok(StageOutcome { evidence, record })
    }

    fn write_log(&self, bytes: &[u8], mode: LogMode) -> Result<(), EnvironmentError> {
        let mut options = OpenOptions::new();
        match mode {
            LogMode::Truncate => options.write(true).create(true).truncate(true),
            LogMode::Append => options.append(true).create(true),
        };
        options
            .open(self.log_path)
            .and_then(|mut file| file.write_all(bytes))
            .map_err(|err| EnvironmentError::LogUnwritable {
                path: self.log_path.to_path_buf(),
                message: err.to_string(),
            })
    }
}
