//! In-memory handshake client that replays queued transcripts.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catt_core::{HandshakeClient, Invocation, RunnerError, Transcript};
use tokio::sync::Mutex;

/// One call seen by a [`ScriptedClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub invocation: Invocation,
    pub input: Vec<u8>,
    pub time_limit: Duration,
}

impl RecordedRun {
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.invocation.args()
    }

    /// True if the DTCP options were passed.
    #[must_use]
    pub fn uses_dtcp(&self) -> bool {
        self.args().iter().any(|arg| arg == "-dtcp")
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Transcript(Transcript),
    SpawnFailure,
}

/// Replays queued replies in order and records every invocation.
///
/// When the queue is empty, `run` fails with a collection error, so an
/// unexpected extra run shows up as an environment error in the verdict.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClient {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    runs: Arc<Mutex<Vec<RecordedRun>>>,
}

impl ScriptedClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Client answering with `transcripts` in order.
    #[must_use]
    pub fn replying<I>(transcripts: I) -> Self
    where
        I: IntoIterator<Item = Transcript>,
    {
        transcripts
            .into_iter()
            .fold(Self::new(), Self::then_reply)
    }

    /// Queue a transcript.
    #[must_use]
    pub fn then_reply(self, transcript: Transcript) -> Self {
        self.push(Reply::Transcript(transcript))
    }

    /// Queue a failure to start the client.
    #[must_use]
    pub fn then_spawn_failure(self) -> Self {
        self.push(Reply::SpawnFailure)
    }

    fn push(self, reply: Reply) -> Self {
        self.replies
            .try_lock()
            .expect("scripted client is not in use while being configured")
            .push_back(reply);
        self
    }

    /// Every run so far.
    pub async fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().await.clone()
    }

    pub async fn run_count(&self) -> usize {
        self.runs.lock().await.len()
    }

    /// Replies not consumed yet.
    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait]
impl HandshakeClient for ScriptedClient {
    async fn run(
        &self,
        invocation: &Invocation,
        input: &[u8],
        time_limit: Duration,
    ) -> Result<Transcript, RunnerError> {
        self.runs.lock().await.push(RecordedRun {
            invocation: invocation.clone(),
            input: input.to_vec(),
            time_limit,
        });

        match self.replies.lock().await.pop_front() {
            Some(Reply::Transcript(transcript)) => Ok(transcript),
            Some(Reply::SpawnFailure) => Err(RunnerError::Spawn {
                program: PathBuf::from(invocation.program()),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            }),
            None => Err(RunnerError::Collect(io::Error::other(
                "scripted client has no reply left",
            ))),
        }
    }
}
