use crate::adapter::{ColumnMeta, QueryOptions};
use crate::connection_manager::{ConnectionHandle, ConnectionManager};
use crate::error::{CoreError, Result};
use crate::event_hub::{EventHub, EventPayload};
use crate::result_store::{ResultStore, StoredResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{AbortHandle, Abortable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
    Canceled,
}

/// Caller-supplied execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Requested row cap; unset or non-positive falls back to the default.
    pub max_rows: Option<i64>,
}

/// One asynchronous query execution and its lifecycle:
/// `running -> {success, failed, canceled}`. Terminal states are final;
/// failed jobs are resubmitted, never retried in place.
#[derive(Debug, Clone, Serialize)]
pub struct QueryJob {
    pub id: String,
    pub target: String,
    pub query: String,
    pub params: Vec<serde_json::Value>,
    /// Effective row cap after normalization and clamping.
    pub max_rows: usize,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A read-only, row-sliced window over a stored result.
#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub job_id: String,
    pub status: JobStatus,
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub total_rows: usize,
    pub offset: usize,
    /// Whether the underlying execution was truncated by its row cap;
    /// pagination never changes this.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

struct ActiveJob {
    job: QueryJob,
    abort: AbortHandle,
}

/// Normalize a requested row cap: unset or non-positive falls back to
/// `default`, and nothing exceeds `ceiling`.
fn normalize_max_rows(requested: Option<i64>, default: usize, ceiling: usize) -> usize {
    match requested {
        Some(n) if n > 0 => (n as usize).min(ceiling),
        _ => default.min(ceiling),
    }
}

/// Runs queries against connected targets as cancellable background jobs.
///
/// `exec` never suspends the caller; results (including failures) land in
/// the result store and completion is announced on the event hub.
pub struct QueryScheduler {
    connections: Arc<ConnectionManager>,
    results: Arc<ResultStore>,
    hub: Arc<EventHub>,
    active: DashMap<String, ActiveJob>,
    default_max_rows: usize,
    hard_max_rows: usize,
}

impl QueryScheduler {
    pub fn new(
        connections: Arc<ConnectionManager>,
        results: Arc<ResultStore>,
        hub: Arc<EventHub>,
        default_max_rows: usize,
        hard_max_rows: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            connections,
            results,
            hub,
            active: DashMap::new(),
            default_max_rows,
            hard_max_rows,
        })
    }

    /// Submit a query for asynchronous execution. Returns the job record
    /// immediately in status `Running`.
    pub fn exec(
        self: &Arc<Self>,
        target: &str,
        query: &str,
        params: Vec<serde_json::Value>,
        options: ExecOptions,
    ) -> Result<QueryJob> {
        let handle =
            self.connections
                .connection(target)
                .ok_or_else(|| CoreError::ConnectionUnavailable {
                    target: target.to_string(),
                })?;

        let max_rows =
            normalize_max_rows(options.max_rows, self.default_max_rows, self.hard_max_rows);
        let now = Utc::now();
        let job = QueryJob {
            id: Uuid::new_v4().to_string(),
            target: target.to_string(),
            query: query.to_string(),
            params,
            max_rows,
            status: JobStatus::Running,
            created_at: now,
            started_at: now,
            finished_at: None,
            duration_ms: None,
            error: None,
        };

        let (abort, registration) = AbortHandle::new_pair();
        self.active.insert(
            job.id.clone(),
            ActiveJob {
                job: job.clone(),
                abort,
            },
        );
        info!(
            "Job {} started on '{}' (max_rows {})",
            job.id, target, max_rows
        );

        let scheduler = Arc::clone(self);
        let task_job = job.clone();
        tokio::spawn(async move {
            let run = Abortable::new(scheduler.clone().run_job(task_job, handle), registration);
            if run.await.is_err() {
                // Aborted: bookkeeping and events are handled by stop().
                debug!("Job execution task aborted");
            }
        });

        Ok(job)
    }

    async fn run_job(self: Arc<Self>, job: QueryJob, handle: Arc<ConnectionHandle>) {
        let started = Utc::now();
        let outcome = handle
            .adapter
            .execute_query(
                &job.query,
                &job.params,
                &QueryOptions {
                    max_rows: job.max_rows,
                },
            )
            .await;
        let finished = Utc::now();
        let duration_ms = (finished - started).num_milliseconds();

        let (status, error, result) = match outcome {
            Ok(output) => {
                debug!(
                    "Job {} succeeded with {} row(s) in {}ms",
                    job.id,
                    output.rows.len(),
                    duration_ms
                );
                (
                    JobStatus::Success,
                    None,
                    StoredResult {
                        job_id: job.id.clone(),
                        target: job.target.clone(),
                        status: JobStatus::Success,
                        columns: output.columns,
                        rows: output.rows,
                        rows_affected: output.rows_affected,
                        truncated: output.truncated,
                        error: None,
                        started_at: started,
                        finished_at: finished,
                        duration_ms,
                    },
                )
            }
            Err(e) => {
                let text = format!("{e:#}");
                warn!("Job {} failed: {}", job.id, text);
                // A failed job still stores a rowless result so lookups stay
                // uniform between success and failure.
                (
                    JobStatus::Failed,
                    Some(text.clone()),
                    StoredResult {
                        job_id: job.id.clone(),
                        target: job.target.clone(),
                        status: JobStatus::Failed,
                        columns: Vec::new(),
                        rows: Vec::new(),
                        rows_affected: None,
                        truncated: false,
                        error: Some(text),
                        started_at: started,
                        finished_at: finished,
                        duration_ms,
                    },
                )
            }
        };

        self.results.add(result).await;
        self.active.remove(&job.id);
        self.hub.publish(EventPayload::QueryJobCompleted {
            job_id: job.id.clone(),
            target: job.target.clone(),
            status,
            finished_at: finished,
            duration_ms,
            error,
            stored: true,
        });
    }

    /// Look up a job: active jobs first, then terminal jobs reconstructed
    /// from their stored result.
    pub async fn job(&self, job_id: &str) -> Result<QueryJob> {
        if let Some(active) = self.active.get(job_id) {
            return Ok(active.job.clone());
        }
        let stored = self
            .results
            .get(job_id)
            .await
            .ok_or_else(|| CoreError::JobNotFound {
                id: job_id.to_string(),
            })?;
        Ok(QueryJob {
            id: stored.job_id,
            target: stored.target,
            query: String::new(),
            params: Vec::new(),
            max_rows: 0,
            status: stored.status,
            created_at: stored.started_at,
            started_at: stored.started_at,
            finished_at: Some(stored.finished_at),
            duration_ms: Some(stored.duration_ms),
            error: stored.error,
        })
    }

    pub fn running_jobs(&self) -> Vec<QueryJob> {
        self.active.iter().map(|entry| entry.value().job.clone()).collect()
    }

    pub fn running_count(&self) -> usize {
        self.active.len()
    }

    /// Build a paginated view over a stored result. The window
    /// `[offset, offset + limit)` is clamped to the row count; an offset past
    /// the end yields zero rows without error.
    pub async fn result_view(
        &self,
        job_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<ResultView> {
        if let Some(o) = offset {
            if o < 0 {
                return Err(CoreError::InvalidPaginationArgument {
                    reason: format!("offset must be >= 0, got {o}"),
                });
            }
        }
        if let Some(l) = limit {
            if l <= 0 {
                return Err(CoreError::InvalidPaginationArgument {
                    reason: format!("limit must be > 0, got {l}"),
                });
            }
        }

        let stored = self
            .results
            .get(job_id)
            .await
            .ok_or_else(|| CoreError::ResultNotFound {
                id: job_id.to_string(),
            })?;

        let total_rows = stored.rows.len();
        let start = (offset.unwrap_or(0) as usize).min(total_rows);
        let end = match limit {
            Some(l) => (start + l as usize).min(total_rows),
            None => total_rows,
        };

        Ok(ResultView {
            job_id: stored.job_id,
            status: stored.status,
            columns: stored.columns,
            rows: stored.rows[start..end].to_vec(),
            total_rows,
            offset: start,
            truncated: stored.truncated,
            rows_affected: stored.rows_affected,
            error: stored.error,
            duration_ms: stored.duration_ms,
        })
    }

    /// Cancel every running job. Used for orderly shutdown; each canceled
    /// job gets a terminal stamp and a completion event (nothing is stored).
    pub fn stop(&self) {
        let ids: Vec<String> = self.active.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, mut active)) = self.active.remove(&id) {
                active.abort.abort();
                let finished = Utc::now();
                active.job.status = JobStatus::Canceled;
                active.job.finished_at = Some(finished);
                active.job.duration_ms =
                    Some((finished - active.job.started_at).num_milliseconds());
                info!("Job {} canceled", id);
                self.hub.publish(EventPayload::QueryJobCompleted {
                    job_id: id.clone(),
                    target: active.job.target.clone(),
                    status: JobStatus::Canceled,
                    finished_at: finished,
                    duration_ms: active.job.duration_ms.unwrap_or(0),
                    error: None,
                    stored: false,
                });
            }
        }
    }
}
