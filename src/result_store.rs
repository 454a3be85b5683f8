use crate::adapter::ColumnMeta;
use crate::query_scheduler::JobStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

/// Immutable outcome of a finished job, success or failure. Failed jobs
/// store a rowless result too so lookups behave the same either way.
#[derive(Debug, Clone, Serialize)]
pub struct StoredResult {
    pub job_id: String,
    pub target: String,
    pub status: JobStatus,
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// Whether the execution hit its row cap.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

struct StoredEntry {
    result: StoredResult,
    stored_at: Instant,
}

/// Size- and age-bounded cache of finished query results.
///
/// Memory is bounded by a cumulative row budget across all entries;
/// eviction walks oldest-stored-first but never touches a result younger
/// than the minimum retention age — age protection beats the budget, so the
/// store can temporarily run over. Both the ordering and the age floor use
/// the insert-time stamp, so re-adding a result renews its protection.
pub struct ResultStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    row_budget: usize,
    min_age: Duration,
}

impl ResultStore {
    pub fn new(row_budget: usize, min_age: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            row_budget,
            min_age,
        }
    }

    /// Insert or overwrite by job ID, then run cleanup.
    pub async fn add(&self, result: StoredResult) {
        let mut entries = self.entries.write().await;
        info!(
            "Storing result for job {} ({} row(s), status {:?})",
            result.job_id,
            result.rows.len(),
            result.status
        );
        entries.insert(
            result.job_id.clone(),
            StoredEntry {
                result,
                stored_at: Instant::now(),
            },
        );
        Self::cleanup(&mut entries, self.row_budget, self.min_age);
    }

    pub async fn get(&self, job_id: &str) -> Option<StoredResult> {
        self.entries
            .read()
            .await
            .get(job_id)
            .map(|entry| entry.result.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn total_rows(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| entry.result.rows.len())
            .sum()
    }

    fn cleanup(entries: &mut HashMap<String, StoredEntry>, row_budget: usize, min_age: Duration) {
        let mut total_rows: usize = entries
            .values()
            .map(|entry| entry.result.rows.len())
            .sum();
        if total_rows <= row_budget {
            return;
        }

        let mut candidates: Vec<(String, Instant)> = entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.stored_at))
            .collect();
        candidates.sort_by_key(|(_, stored_at)| *stored_at);

        for (job_id, stored_at) in candidates {
            if total_rows <= row_budget {
                break;
            }
            if stored_at.elapsed() < min_age {
                // Everything later in the walk is younger still; stop even
                // if over budget.
                debug!(
                    "Result eviction stopped at job {} (younger than retention floor)",
                    job_id
                );
                break;
            }
            let evicted = entries.remove(&job_id);
            if let Some(evicted) = evicted {
                total_rows = total_rows.saturating_sub(evicted.result.rows.len());
                debug!(
                    "Evicted result for job {} ({} row(s))",
                    job_id,
                    evicted.result.rows.len()
                );
            }
        }
    }
}
