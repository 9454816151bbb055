//! Suite results, console narration, and the JSON Lines report.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stage::StageRecord;
use crate::suite::CaseResult;
use crate::verdict::VerdictKind;

/// Exit status when every case passed or was skipped.
pub const EXIT_OK: i32 = 0;
/// Exit status when any case failed.
pub const EXIT_FAILED: i32 = 1;
/// Exit status when nothing failed but the environment was broken.
pub const EXIT_ENVIRONMENT: i32 = 2;
/// Exit status when the run could not be set up or its outputs could not be
/// written: bad arguments, unreadable config, unusable log or report path.
pub const EXIT_SETUP: i32 = 3;

/// Verdict tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub environment_errors: usize,
}

impl Summary {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.environment_errors
    }
}

/// Ordered results of a suite run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteReport {
    results: Vec<CaseResult>,
}

impl SuiteReport {
    #[must_use]
    pub const fn new(results: Vec<CaseResult>) -> Self {
        Self { results }
    }

    #[must_use]
    pub fn results(&self) -> &[CaseResult] {
        &self.results
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        self.results
            .iter()
            .fold(Summary::default(), |mut summary, result| {
                match result.verdict.kind {
                    VerdictKind::Pass => summary.passed += 1,
                    VerdictKind::Fail => summary.failed += 1,
                    VerdictKind::Skipped => summary.skipped += 1,
                    VerdictKind::EnvironmentError => summary.environment_errors += 1,
                }
                summary
            })
    }

    /// Process exit status for this report.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let summary = self.summary();
        if summary.failed > 0 {
            EXIT_FAILED
        } else if summary.environment_errors > 0 {
            EXIT_ENVIRONMENT
        } else {
            EXIT_OK
        }
    }

    /// One [`CaseRecord`] per result, sharing `run_id`.
    #[must_use]
    pub fn records(&self, run_id: Uuid) -> Vec<CaseRecord> {
        self.results
            .iter()
            .map(|result| CaseRecord::from_result(run_id, result))
            .collect()
    }

    /// Write one JSON object per case.
    ///
    /// # Errors
    /// Returns an IO error if writing fails or a record cannot be serialized.
    pub fn write_json_lines<W: Write>(&self, run_id: Uuid, mut writer: W) -> io::Result<()> {
        for record in self.records(run_id) {
            let line = serde_json::to_string(&record)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
            writeln!(writer, "{line}")?;
        }
        writer.flush()
    }
}

/// JSON Lines report record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub run_id: Uuid,
    /// RFC 3339 start time (UTC).
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub log_id: String,
    pub log_path: PathBuf,
    pub verdict: VerdictKind,
    pub reason: String,
    pub duration_ms: u64,
    pub stages: Vec<StageRecord>,
}

impl CaseRecord {
    #[must_use]
    pub fn from_result(run_id: Uuid, result: &CaseResult) -> Self {
        Self {
            run_id,
            timestamp: result.started_at,
            name: result.name.clone(),
            log_id: result.log_id.clone(),
            log_path: result.log_path.clone(),
            verdict: result.verdict.kind,
            reason: result.verdict.reason.clone(),
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            stages: result.stages.clone(),
        }
    }
}

/// Narration for one case, ending with a blank line.
#[must_use]
pub fn render_case(result: &CaseResult, debug: bool) -> String {
    let mut out = render_case_header(&result.name, &result.log_path);
    out.push_str(&render_case_outcome(result, debug));
    out
}

/// First line of a case's narration, printed before it runs.
#[must_use]
pub fn render_case_header(name: &str, log_path: &Path) -> String {
    format!("Testing: {name} (log: {})\n", log_path.display())
}

/// Everything after the header: stages, verdict detail and banner.
#[must_use]
pub fn render_case_outcome(result: &CaseResult, debug: bool) -> String {
    let mut out = String::new();
    for stage in &result.stages {
        render_stage(&mut out, stage, debug);
    }

    match result.verdict.kind {
        VerdictKind::Pass => {}
        VerdictKind::Skipped => {
            let _ = writeln!(out, "{}", capitalize(&result.verdict.reason));
        }
        VerdictKind::EnvironmentError => {
            let _ = writeln!(out, "ERROR: {}", result.verdict.reason);
        }
        VerdictKind::Fail => {
            let _ = writeln!(out, "Reason: {}", result.verdict.reason);
        }
    }
    let _ = writeln!(out, "{}", result.verdict.kind.banner());
    out.push('\n');
    out
}

fn render_stage(out: &mut String, stage: &StageRecord, debug: bool) {
    if debug {
        let _ = writeln!(out, "Running: {}", stage.command_line);
    }
    if stage.timed_out {
        let _ = writeln!(out, "Connection failed (client timed out)");
    } else if stage.exit_code == 0 {
        let _ = writeln!(out, "Connection succeeded");
    } else {
        let _ = writeln!(out, "Connection failed");
    }
    if let Some(status) = &stage.status {
        let _ = writeln!(out, "HTTP Status: {}", status.status());
    } else if stage.missing_response {
        let _ = writeln!(
            out,
            "ERROR: Connection succeeded, but there is no HTTP/1.x response header"
        );
    }
    for note in &stage.notes {
        let _ = writeln!(out, "{note}");
    }
}

/// Tally line printed after all cases.
#[must_use]
pub fn render_summary(summary: &Summary) -> String {
    format!(
        "{} tests: {} passed, {} failed, {} skipped, {} environment errors",
        summary.total(),
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.environment_errors
    )
}

/// Full narration: every case followed by the tally.
#[must_use]
pub fn render_report(report: &SuiteReport, debug: bool) -> String {
    let mut out: String = report
        .results()
        .iter()
        .map(|result| render_case(result, debug))
        .collect();
    out.push_str(&render_summary(&report.summary()));
    out.push('\n');
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
