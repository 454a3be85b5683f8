use crate::adapter::AdapterFactory;
use crate::adapter_registry::AdapterRegistry;
use crate::config::DaemonConfig;
use crate::connection_manager::{ConnectOutcome, ConnectionManager};
use crate::error::Result;
use crate::event_hub::{Event, EventHub, Unsubscribe};
use crate::logging::init_logging;
use crate::protocol::{
    job_to_payload, node_to_payload, view_to_payload, JobPayload, NodePayload, ResultViewPayload,
};
use crate::query_scheduler::{ExecOptions, QueryJob, QueryScheduler};
use crate::result_store::ResultStore;
use crate::schema_cache::SchemaCache;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::info;

/// Snapshot of daemon-wide state for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub connected_targets: Vec<String>,
    pub cached_schema_targets: Vec<String>,
    pub running_jobs: usize,
    pub stored_results: usize,
    pub stored_rows: usize,
    pub event_subscribers: usize,
}

/// The session and metadata layer: owns every subsystem and is the only
/// type embedding applications (or a transport layer) need to hold.
pub struct DbDaemon {
    config: Arc<DaemonConfig>,
    hub: Arc<EventHub>,
    connections: Arc<ConnectionManager>,
    schema: Arc<SchemaCache>,
    results: Arc<ResultStore>,
    scheduler: Arc<QueryScheduler>,
}

impl DbDaemon {
    pub fn new(config: DaemonConfig) -> Self {
        init_logging("info");

        let config = Arc::new(config);
        let limits = &config.limits;
        let hub = EventHub::new();
        let registry = Arc::new(AdapterRegistry::new());
        let connections =
            ConnectionManager::new(Arc::clone(&config), registry, Arc::clone(&hub));
        let schema = SchemaCache::new(Arc::clone(&connections), limits.max_nodes_per_request);
        let results = Arc::new(ResultStore::new(
            limits.result_row_budget,
            Duration::from_secs(limits.result_min_age_secs),
        ));
        let scheduler = QueryScheduler::new(
            Arc::clone(&connections),
            Arc::clone(&results),
            Arc::clone(&hub),
            limits.default_max_rows,
            limits.hard_max_rows,
        );

        info!(
            "Daemon initialized with {} configured target(s)",
            config.targets.len()
        );
        Self {
            config,
            hub,
            connections,
            schema,
            results,
            scheduler,
        }
    }

    pub fn register_adapter(&self, engine: &str, factory: AdapterFactory) {
        self.connections.registry().register(engine, factory);
    }

    /// Ensure a target is connected; progress and terminal states arrive on
    /// the event hub.
    pub async fn connect(&self, target: &str) -> ConnectOutcome {
        self.connections.connect(target).await
    }

    /// Fetch schema nodes (empty `node_ids` means the roots), hydrating on
    /// demand. Edge lists are truncated to the configured per-response limit
    /// here, at the API boundary.
    pub async fn get_nodes(&self, target: &str, node_ids: &[String]) -> Result<Vec<NodePayload>> {
        let nodes = self.schema.get_nodes(target, node_ids).await?;
        let edge_limit = self.config.limits.edge_items;
        Ok(nodes
            .iter()
            .map(|node| node_to_payload(node, edge_limit))
            .collect())
    }

    /// Drop a target's cached schema graph; the next `get_nodes` rebuilds it.
    pub fn invalidate_schema(&self, target: &str) {
        self.schema.invalidate(target);
    }

    pub fn exec(
        &self,
        target: &str,
        query: &str,
        params: Vec<serde_json::Value>,
        options: ExecOptions,
    ) -> Result<QueryJob> {
        self.scheduler.exec(target, query, params, options)
    }

    pub async fn job(&self, job_id: &str) -> Result<JobPayload> {
        let job = self.scheduler.job(job_id).await?;
        Ok(job_to_payload(&job))
    }

    pub async fn result_view(
        &self,
        job_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<ResultViewPayload> {
        let view = self.scheduler.result_view(job_id, limit, offset).await?;
        Ok(view_to_payload(view))
    }

    pub fn subscribe(&self) -> (mpsc::Receiver<Event>, Unsubscribe) {
        self.hub.subscribe()
    }

    pub async fn status(&self) -> DaemonStatus {
        DaemonStatus {
            connected_targets: self.connections.connected_targets(),
            cached_schema_targets: self.schema.cached_targets(),
            running_jobs: self.scheduler.running_count(),
            stored_results: self.results.len().await,
            stored_rows: self.results.total_rows().await,
            event_subscribers: self.hub.subscriber_count(),
        }
    }

    /// Orderly shutdown: cancel running jobs, then close every connection.
    pub async fn shutdown(&self) {
        info!("Daemon shutting down");
        self.scheduler.stop();
        self.connections.disconnect_all().await;
    }
}
