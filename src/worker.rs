//! Adapters between the serverless runtime and the [`Handler`].
//!
//! The runtime itself (queueing, dispatch, scaling) is external. These
//! adapters only move job payloads in and results out:
//!
//! * [`run_lines`]: one JSON job per input line, one JSON reply per output
//!   line. Useful for local testing and for runtimes that pipe jobs over stdio.
//! * [`HttpJobSource`] + [`poll`]: fetch jobs from a runtime-provided URL and
//!   post results back.

use crate::error::WorkerError;
use crate::handler::Handler;
use crate::job::{job_id, JobResult};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// A result tagged with the id of the job it answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReply {
    pub id: Option<String>,
    #[serde(flatten)]
    pub result: JobResult,
}

/// Counters reported when a worker loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub handled: usize,
    pub failed: usize,
}

impl WorkerStats {
    fn record(&mut self, result: &JobResult) {
        self.handled += 1;
        if result.is_error() {
            self.failed += 1;
        }
    }
}

fn reply_id(job: &Value) -> Option<String> {
    job.get("id").cloned().and_then(job_id)
}

/// Handle one job per line of `reader`, writing one reply per line to `writer`.
///
/// Lines are read as raw bytes. Blank lines are skipped. A line that is not
/// JSON (including one that is not UTF-8) yields an error reply with a null
/// id; the loop keeps going until `reader` is exhausted.
pub async fn run_lines<R, W>(handler: &Handler, reader: R, mut writer: W) -> Result<WorkerStats, WorkerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = SplitStream::new(reader.split(b'\n'));
    let mut stats = WorkerStats::default();

    while let Some(line) = lines.next().await {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let reply = match serde_json::from_slice::<Value>(&line) {
            Ok(job) => JobReply {
                id: reply_id(&job),
                result: handler.handle_value(&job).await,
            },
            Err(e) => JobReply {
                id: None,
                result: JobResult::failure("Handler error", format!("invalid job JSON: {e}")),
            },
        };
        stats.record(&reply.result);

        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    info!("Input closed: {} jobs handled, {} failed", stats.handled, stats.failed);
    Ok(stats)
}

/// Fetches jobs from, and returns results to, the runtime over HTTP.
#[derive(Debug, Clone)]
pub struct HttpJobSource {
    client: reqwest::Client,
    job_url: String,
    /// Result URL; `{job_id}` is replaced with the job's id.
    result_url: String,
}

impl HttpJobSource {
    pub fn new(job_url: impl Into<String>, result_url: impl Into<String>) -> Result<Self, WorkerError> {
        let job_url = job_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| WorkerError::Transport {
                url: job_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            job_url,
            result_url: result_url.into(),
        })
    }

    /// Fetch the next job. `None` when the runtime has nothing queued
    /// (HTTP 204 or an empty body).
    pub async fn next_job(&self) -> Result<Option<Value>, WorkerError> {
        let transport = |reason: String| WorkerError::Transport {
            url: self.job_url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.job_url)
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(transport(format!("HTTP {}", response.status())));
        }

        let body = response.bytes().await.map_err(|e| transport(e.to_string()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// Post a result for `job_id`.
    pub async fn submit(&self, job_id: Option<&str>, result: &JobResult) -> Result<(), WorkerError> {
        let url = result_url_for(&self.result_url, job_id.unwrap_or(""));
        let response = self
            .client
            .post(&url)
            .json(result)
            .send()
            .await
            .map_err(|e| WorkerError::Transport {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(WorkerError::Transport {
                url,
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(())
    }
}

fn result_url_for(template: &str, job_id: &str) -> String {
    template.replace("{job_id}", job_id)
}

/// Poll `source` for jobs until `shutdown` resolves.
///
/// Transport failures are logged and followed by an idle wait; they never
/// stop the loop.
pub async fn poll<F>(
    handler: &Handler,
    source: &HttpJobSource,
    idle: Duration,
    shutdown: F,
) -> WorkerStats
where
    F: std::future::Future<Output = ()>,
{
    let mut stats = WorkerStats::default();
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            _ = &mut shutdown => break,
            next = source.next_job() => next,
        };

        let job = match next {
            Ok(job) => job,
            Err(e) => {
                warn!("Fetching job failed: {}", e);
                None
            }
        };
        let Some(job) = job else {
            debug!("No job; idling {:?}", idle);
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(idle) => {}
            }
            continue;
        };

        let id = reply_id(&job);
        let result = handler.handle_value(&job).await;
        stats.record(&result);

        if let Err(e) = source.submit(id.as_deref(), &result).await {
            warn!("Submitting result for job {:?} failed: {}", id, e);
        }
    }

    info!("Shutting down: {} jobs handled, {} failed", stats.handled, stats.failed);
    stats
}
