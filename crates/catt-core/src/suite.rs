//! Ordered suite execution.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, Instrument};

use crate::case::{CaseKind, CredentialTestCase, HandshakeTarget};
use crate::evidence::EvidenceExtractor;
use crate::report::SuiteReport;
use crate::sanity::EnvironmentSanityChecker;
use crate::server_verify::ServerVerification;
use crate::stage::{LogMode, StageContext, StageKind, StageRecord};
use crate::transcript::{DEFAULT_TIME_LIMIT, HandshakeClient, Invocation};
use crate::verdict::Verdict;

/// One row of the standard scenario catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
    pub log_id: &'static str,
    /// `[libraries]` key of the DTCP library.
    pub library_key: &'static str,
    /// `[keys]` key of the credential directory.
    pub credential_key: &'static str,
    pub expected_success: bool,
    pub kind: CaseKind,
}

/// The five CVP2 scenarios, server verification first, then client
/// credentials in increasing strictness.
pub const STANDARD_SCENARIOS: [Scenario; 5] = [
    Scenario {
        name: "Verify Server's X.509 or DTCP certificate",
        log_id: "server-verify",
        library_key: "production_lib_cvp2",
        credential_key: "production_key_cvp2",
        expected_success: true,
        kind: CaseKind::ServerVerification,
    },
    Scenario {
        name: "Client DTCP Production Key With CVP2 Bit",
        log_id: "production-cvp2",
        library_key: "production_lib_cvp2",
        credential_key: "production_key_cvp2",
        expected_success: true,
        kind: CaseKind::ClientCredential,
    },
    Scenario {
        name: "Client DTCP Production Key Without CVP2 Bit",
        log_id: "production-no-cvp2",
        library_key: "production_lib_no_cvp2",
        credential_key: "production_key_no_cvp2",
        expected_success: false,
        kind: CaseKind::ClientCredential,
    },
    Scenario {
        name: "Client DTCP Test Key With CVP2 Bit",
        log_id: "test-cvp2",
        library_key: "test_lib_cvp2",
        credential_key: "test_key_cvp2",
        expected_success: false,
        kind: CaseKind::ClientCredential,
    },
    Scenario {
        name: "Client DTCP Test Key Without CVP2 Bit",
        log_id: "test-no-cvp2",
        library_key: "test_lib_no_cvp2",
        credential_key: "test_key_no_cvp2",
        expected_success: false,
        kind: CaseKind::ClientCredential,
    },
];

impl Scenario {
    /// Build the case with whatever inputs are available.
    #[must_use]
    pub fn to_case(&self, library: Option<PathBuf>, credential_dir: Option<PathBuf>) -> CredentialTestCase {
        match self.kind {
            CaseKind::ServerVerification => {
                CredentialTestCase::server_verification(self.name, self.log_id, library, credential_dir)
            }
            CaseKind::ClientCredential => CredentialTestCase::client_credential(
                self.name,
                self.log_id,
                library,
                credential_dir,
                self.expected_success,
            ),
        }
    }
}

/// An ordered list of cases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSuite {
    cases: Vec<CredentialTestCase>,
}

impl TestSuite {
    #[must_use]
    pub const fn new(cases: Vec<CredentialTestCase>) -> Self {
        Self { cases }
    }

    /// The standard catalogue, resolving library and credential paths by
    /// their configuration key.
    pub fn standard<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<PathBuf>,
    {
        let cases = STANDARD_SCENARIOS
            .iter()
            .map(|scenario| {
                let library = lookup(scenario.library_key);
                let credential_dir = lookup(scenario.credential_key);
                scenario.to_case(library, credential_dir)
            })
            .collect();
        Self { cases }
    }

    #[must_use]
    pub fn cases(&self) -> &[CredentialTestCase] {
        &self.cases
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Keep only the named log ids, in declared order.
    #[must_use]
    pub fn only<S: AsRef<str>>(mut self, log_ids: &[S]) -> Self {
        if !log_ids.is_empty() {
            self.cases
                .retain(|case| log_ids.iter().any(|id| id.as_ref() == case.log_id()));
        }
        self
    }
}

/// Settings fixed for a whole suite run.
#[derive(Debug, Clone)]
pub struct SuiteSettings {
    /// Handshake client executable.
    pub client: PathBuf,
    pub target: HandshakeTarget,
    pub log_dir: PathBuf,
    pub time_limit: Duration,
}

impl SuiteSettings {
    #[must_use]
    pub fn new(client: impl Into<PathBuf>, target: HandshakeTarget, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: client.into(),
            target,
            log_dir: log_dir.into(),
            time_limit: DEFAULT_TIME_LIMIT,
        }
    }

    #[must_use]
    pub const fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }
}

/// Terminal result of one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub name: String,
    pub log_id: String,
    pub log_path: PathBuf,
    pub verdict: Verdict,
    /// Handshakes run for this case, in order. Empty when skipped.
    pub stages: Vec<StageRecord>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Progress notifications from [`SuiteRunner::run_observed`].
#[derive(Debug, Clone, Copy)]
pub enum SuiteEvent<'a> {
    /// About to run `case`; nothing has been written to `log_path` yet.
    Started {
        case: &'a CredentialTestCase,
        log_path: &'a Path,
    },
    /// The case reached its verdict.
    Finished(&'a CaseResult),
}

/// Runs cases one at a time against a handshake client.
pub struct SuiteRunner<C> {
    client: C,
    settings: SuiteSettings,
    extractor: EvidenceExtractor,
    sanity: EnvironmentSanityChecker,
}

impl<C: HandshakeClient> SuiteRunner<C> {
    #[must_use]
    pub fn new(client: C, settings: SuiteSettings) -> Self {
        Self {
            client,
            settings,
            extractor: EvidenceExtractor::default(),
            sanity: EnvironmentSanityChecker::new(),
        }
    }

    /// Use a custom marker registry.
    #[must_use]
    pub fn with_extractor(mut self, extractor: EvidenceExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &SuiteSettings {
        &self.settings
    }

    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    pub async fn run(&self, suite: &TestSuite) -> SuiteReport {
        self.run_observed(suite, |_| {}).await
    }

    /// Run every case in order, telling `observe` when each case starts and
    /// again as soon as its result is final.
    pub async fn run_observed<F>(&self, suite: &TestSuite, mut observe: F) -> SuiteReport
    where
        F: FnMut(SuiteEvent<'_>),
    {
        let mut results = Vec::with_capacity(suite.len());
        for case in suite.cases() {
            let log_path = case.log_file(&self.settings.log_dir);
            observe(SuiteEvent::Started {
                case,
                log_path: &log_path,
            });
            let result = self.run_case(case).await;
            observe(SuiteEvent::Finished(&result));
            results.push(result);
        }
        SuiteReport::new(results)
    }

    /// Run a single case to its verdict. Never fails.
    pub async fn run_case(&self, case: &CredentialTestCase) -> CaseResult {
        let span = info_span!("case", case = case.name(), log_id = case.log_id());
        self.run_case_inner(case).instrument(span).await
    }

    async fn run_case_inner(&self, case: &CredentialTestCase) -> CaseResult {
        let log_path = case.log_file(&self.settings.log_dir);
        let started_at = Utc::now();
        let started = Instant::now();

        let (verdict, stages) = match (case.library(), case.credential_dir()) {
            (Some(library), Some(credential_dir)) => {
                self.evaluate(case, library, credential_dir, &log_path).await
            }
            _ => {
                let reason = case.missing_input().unwrap_or("required input not configured");
                info!(reason, "case skipped");
                (Verdict::skipped(reason), Vec::new())
            }
        };

        info!(verdict = %verdict.kind, reason = %verdict.reason, "case finished");
        CaseResult {
            name: case.name().to_string(),
            log_id: case.log_id().to_string(),
            log_path,
            verdict,
            stages,
            started_at,
            duration: started.elapsed(),
        }
    }

    async fn evaluate(
        &self,
        case: &CredentialTestCase,
        library: &Path,
        credential_dir: &Path,
        log_path: &Path,
    ) -> (Verdict, Vec<StageRecord>) {
        let payload = self.settings.target.request_payload();
        let ctx = StageContext {
            client: &self.client,
            extractor: &self.extractor,
            payload: &payload,
            time_limit: self.settings.time_limit,
            log_path,
        };

        match case.kind() {
            CaseKind::ServerVerification => {
                ServerVerification {
                    program: &self.settings.client,
                    target: &self.settings.target,
                    library,
                    credential_dir,
                    sanity: &self.sanity,
                }
                .run(&ctx)
                .await
            }
            CaseKind::ClientCredential => {
                let invocation = Invocation::new(
                    &self.settings.client,
                    self.settings
                        .target
                        .client_credential_args(library, credential_dir),
                );
                let outcome = match ctx
                    .execute(StageKind::Handshake, &invocation, LogMode::Truncate)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(error = %err, "handshake could not run");
                        return (Verdict::environment_error(&err), Vec::new());
                    }
                };
                let verdict = match self.sanity.check(&outcome.evidence) {
                    Some(err) => {
                        error!(error = %err, "environment check failed");
                        Verdict::environment_error(&err)
                    }
                    None => Verdict::evaluate(case.expected_success(), &outcome.evidence),
                };
                (verdict, vec![outcome.record])
            }
        }
    }
}
