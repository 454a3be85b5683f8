// dbnav-daemon library
// Session and schema-metadata layer for database browsing tools.

// Core data model
pub mod error;
pub mod node_types;
pub mod scope;

// Collaborator seams
pub mod adapter;
pub mod adapter_registry;
pub mod config;
pub mod protocol;

// Subsystems
pub mod connection_manager;
pub mod event_hub;
pub mod query_scheduler;
pub mod result_store;
pub mod schema_cache;

// Wiring
pub mod daemon;
pub mod logging;

// Re-export commonly used types
pub use adapter::{
    AdapterFactory, ColumnInfo, ColumnMeta, ConnectionAdapter, ConstraintInfo, FactoryParams,
    IndexInfo, QueryOptions, QueryOutput, RelationInfo, TriggerInfo,
};
pub use config::{DaemonConfig, LimitsConfig, TargetConfig};
pub use connection_manager::{ConnectOutcome, ConnectResult, ConnectionHandle, ConnectionManager};
pub use daemon::{DaemonStatus, DbDaemon};
pub use error::{CoreError, Result};
pub use event_hub::{ConnectionState, Event, EventHub, EventPayload, Unsubscribe};
pub use node_types::{Edge, Node, NodeAttrs, NodeKind, RelationType};
pub use protocol::{
    job_to_payload, node_to_payload, view_to_payload, JobPayload, NodePayload, ResultViewPayload,
};
pub use query_scheduler::{ExecOptions, JobStatus, QueryJob, QueryScheduler, ResultView};
pub use result_store::{ResultStore, StoredResult};
pub use schema_cache::SchemaCache;
pub use scope::Scope;
