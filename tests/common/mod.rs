// Shared mock adapter and rig helpers for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use dbnav_daemon::adapter::{
    AdapterFactory, ColumnInfo, ColumnMeta, ConnectionAdapter, ConstraintInfo, FactoryParams,
    IndexInfo, QueryOptions, QueryOutput, RelationInfo, TriggerInfo,
};
use dbnav_daemon::{
    ConnectionManager, ConnectionState, DaemonConfig, Event, EventHub, EventPayload, RelationType,
    Scope, TargetConfig,
};
use dbnav_daemon::adapter_registry::AdapterRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

pub const TARGET: &str = "db1";
pub const ENGINE: &str = "mock";

/// Scripted adapter: introspection data is installed up front, every call is
/// counted, and failure/delay knobs simulate slow or broken engines.
#[derive(Default)]
pub struct MockAdapter {
    pub scopes: Mutex<Vec<Scope>>,
    pub relations: Mutex<HashMap<Scope, Vec<RelationInfo>>>,
    pub columns: Mutex<HashMap<String, Vec<ColumnInfo>>>,
    pub constraints: Mutex<HashMap<String, Vec<ConstraintInfo>>>,
    pub indexes: Mutex<HashMap<String, Vec<IndexInfo>>>,
    pub triggers: Mutex<HashMap<String, Vec<TriggerInfo>>>,

    pub fail_ping: AtomicBool,
    pub fail_query: AtomicBool,
    pub fail_relations_once: AtomicBool,
    pub relations_delay_ms: AtomicUsize,
    pub query_delay_ms: AtomicUsize,
    /// Rows the simulated engine would produce before the row cap.
    pub query_rows: AtomicUsize,

    pub connect_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub get_scopes_calls: AtomicUsize,
    pub get_relations_calls: AtomicUsize,
    pub get_columns_calls: AtomicUsize,
    pub execute_calls: AtomicUsize,
    pub last_max_rows: AtomicUsize,
}

impl MockAdapter {
    pub fn single_database(database: &str) -> Arc<Self> {
        let adapter = Self::default();
        adapter
            .scopes
            .lock()
            .unwrap()
            .push(Scope::database(database));
        adapter.query_rows.store(3, Ordering::SeqCst);
        Arc::new(adapter)
    }

    pub fn set_relations(&self, scope: &Scope, relations: Vec<RelationInfo>) {
        self.relations
            .lock()
            .unwrap()
            .insert(scope.clone(), relations);
    }

    pub fn set_columns(&self, relation: &str, columns: Vec<ColumnInfo>) {
        self.columns
            .lock()
            .unwrap()
            .insert(relation.to_string(), columns);
    }
}

#[async_trait]
impl ConnectionAdapter for MockAdapter {
    async fn connect(&self) -> anyhow::Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        if self.fail_ping.load(Ordering::SeqCst) {
            anyhow::bail!("simulated ping failure");
        }
        Ok(())
    }

    async fn execute_query(
        &self,
        _query: &str,
        _params: &[serde_json::Value],
        options: &QueryOptions,
    ) -> anyhow::Result<QueryOutput> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.last_max_rows.store(options.max_rows, Ordering::SeqCst);

        let delay = self.query_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_query.load(Ordering::SeqCst) {
            anyhow::bail!("simulated query failure");
        }

        let available = self.query_rows.load(Ordering::SeqCst);
        let produced = available.min(options.max_rows);
        Ok(QueryOutput {
            columns: vec![ColumnMeta {
                name: "value".to_string(),
                data_type: "integer".to_string(),
            }],
            rows: (0..produced)
                .map(|i| vec![serde_json::json!(i)])
                .collect(),
            rows_affected: None,
            truncated: available > options.max_rows,
        })
    }

    async fn get_scopes(&self) -> anyhow::Result<Vec<Scope>> {
        self.get_scopes_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scopes.lock().unwrap().clone())
    }

    async fn get_relations(&self, scope: &Scope) -> anyhow::Result<Vec<RelationInfo>> {
        self.get_relations_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.relations_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_relations_once.swap(false, Ordering::SeqCst) {
            anyhow::bail!("simulated introspection failure");
        }
        Ok(self
            .relations
            .lock()
            .unwrap()
            .get(scope)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_columns(
        &self,
        _scope: &Scope,
        relation: &str,
    ) -> anyhow::Result<Vec<ColumnInfo>> {
        self.get_columns_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .columns
            .lock()
            .unwrap()
            .get(relation)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_constraints(
        &self,
        _scope: &Scope,
        relation: &str,
    ) -> anyhow::Result<Vec<ConstraintInfo>> {
        Ok(self
            .constraints
            .lock()
            .unwrap()
            .get(relation)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_indexes(
        &self,
        _scope: &Scope,
        relation: &str,
    ) -> anyhow::Result<Vec<IndexInfo>> {
        Ok(self
            .indexes
            .lock()
            .unwrap()
            .get(relation)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_triggers(
        &self,
        _scope: &Scope,
        relation: &str,
    ) -> anyhow::Result<Vec<TriggerInfo>> {
        Ok(self
            .triggers
            .lock()
            .unwrap()
            .get(relation)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn table(name: &str) -> RelationInfo {
    RelationInfo {
        name: name.to_string(),
        relation_type: RelationType::Table,
        partition_of: None,
        table_type: Some("ordinary".to_string()),
        definition: None,
    }
}

pub fn view(name: &str) -> RelationInfo {
    RelationInfo {
        name: name.to_string(),
        relation_type: RelationType::View,
        partition_of: None,
        table_type: None,
        definition: Some(format!("SELECT * FROM {name}_source")),
    }
}

pub fn partition(name: &str, parent: &str) -> RelationInfo {
    RelationInfo {
        name: name.to_string(),
        relation_type: RelationType::Table,
        partition_of: Some(parent.to_string()),
        table_type: Some("partition".to_string()),
        definition: None,
    }
}

pub fn column(name: &str, data_type: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: true,
        default_value: None,
        ordinal: None,
    }
}

pub fn factory_for(adapter: &Arc<MockAdapter>) -> AdapterFactory {
    let adapter = Arc::clone(adapter);
    Arc::new(move |_params: FactoryParams| {
        Ok(Arc::clone(&adapter) as Arc<dyn ConnectionAdapter>)
    })
}

pub fn config_with_target(target: &str, engine: &str) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.targets.insert(
        target.to_string(),
        TargetConfig {
            engine: engine.to_string(),
            params: Default::default(),
            base_dir: None,
        },
    );
    config
}

/// Manager + hub wired to a single mock target.
pub fn manager_with(adapter: &Arc<MockAdapter>) -> (Arc<ConnectionManager>, Arc<EventHub>) {
    let hub = EventHub::new();
    let registry = Arc::new(AdapterRegistry::new());
    registry.register(ENGINE, factory_for(adapter));
    let manager = ConnectionManager::new(
        Arc::new(config_with_target(TARGET, ENGINE)),
        registry,
        Arc::clone(&hub),
    );
    (manager, hub)
}

/// Pull events until a connection-state event for `target` reaches a
/// terminal state (connected/failed); returns every state seen on the way.
pub async fn wait_for_terminal_state(
    rx: &mut mpsc::Receiver<Event>,
    target: &str,
) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    let deadline = Duration::from_secs(5);
    loop {
        let event = timeout(deadline, rx.recv())
            .await
            .expect("timed out waiting for connection event")
            .expect("event channel closed");
        if let EventPayload::ConnectionState {
            target: event_target,
            state,
            ..
        } = event.payload
        {
            if event_target == target {
                states.push(state);
                if matches!(state, ConnectionState::Connected | ConnectionState::Failed) {
                    return states;
                }
            }
        }
    }
}

/// Connect a target and block until the background attempt lands.
pub async fn connect_and_wait(manager: &Arc<ConnectionManager>, hub: &Arc<EventHub>) {
    let (mut rx, _unsub) = hub.subscribe();
    manager.connect(TARGET).await;
    let states = wait_for_terminal_state(&mut rx, TARGET).await;
    assert_eq!(
        states.last(),
        Some(&ConnectionState::Connected),
        "target failed to connect: {states:?}"
    );
}

/// Wait for the next job-completion event for `job_id`.
pub async fn wait_for_job_completion(
    rx: &mut mpsc::Receiver<Event>,
    job_id: &str,
) -> EventPayload {
    let deadline = Duration::from_secs(5);
    loop {
        let event = timeout(deadline, rx.recv())
            .await
            .expect("timed out waiting for job completion")
            .expect("event channel closed");
        if let EventPayload::QueryJobCompleted {
            job_id: event_job, ..
        } = &event.payload
        {
            if event_job == job_id {
                return event.payload;
            }
        }
    }
}
