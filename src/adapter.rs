use crate::config::TargetConfig;
use crate::node_types::{ConstraintKind, ForeignKeyRef, RelationType};
use crate::scope::Scope;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Inputs handed to an adapter factory when a target connects.
#[derive(Debug, Clone)]
pub struct FactoryParams {
    pub target_name: String,
    pub target_config: TargetConfig,
    /// Directory relative paths in the target config resolve against.
    pub base_dir: Option<PathBuf>,
}

/// Constructor for engine adapters, registered per engine-type string.
pub type AdapterFactory =
    Arc<dyn Fn(FactoryParams) -> anyhow::Result<Arc<dyn ConnectionAdapter>> + Send + Sync>;

/// Row cap applied by an adapter when executing a statement.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub max_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
}

/// Raw outcome of one statement execution as reported by an adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOutput {
    #[serde(default)]
    pub columns: Vec<ColumnMeta>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Affected-row count for statements that return no rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// True when the adapter hit the row cap and cut the result short.
    #[serde(default)]
    pub truncated: bool,
}

/// One relation (table or view) discovered within a scope.
#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub name: String,
    pub relation_type: RelationType,
    /// Set when the relation is a partition child of another table.
    pub partition_of: Option<String>,
    pub table_type: Option<String>,
    pub definition: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub ordinal: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ConstraintInfo {
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
    pub definition: Option<String>,
    pub foreign_key: Option<ForeignKeyRef>,
}

#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    pub definition: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TriggerInfo {
    pub name: String,
    pub timing: Option<String>,
    pub event: Option<String>,
    pub definition: Option<String>,
}

/// Contract every engine adapter implements: lifecycle, statement execution,
/// and the introspection calls the schema cache hydrates from.
///
/// Errors are opaque to the daemon; engine-specific classification stays on
/// the adapter side.
#[async_trait]
pub trait ConnectionAdapter: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
    async fn ping(&self) -> anyhow::Result<()>;

    async fn execute_query(
        &self,
        query: &str,
        params: &[serde_json::Value],
        options: &QueryOptions,
    ) -> anyhow::Result<QueryOutput>;

    /// List the namespaces this target exposes. Called once per cache
    /// bootstrap; an empty list is a bootstrap failure.
    async fn get_scopes(&self) -> anyhow::Result<Vec<Scope>>;

    async fn get_relations(&self, scope: &Scope) -> anyhow::Result<Vec<RelationInfo>>;

    async fn get_columns(&self, scope: &Scope, relation: &str)
        -> anyhow::Result<Vec<ColumnInfo>>;

    async fn get_constraints(
        &self,
        scope: &Scope,
        relation: &str,
    ) -> anyhow::Result<Vec<ConstraintInfo>>;

    async fn get_indexes(&self, scope: &Scope, relation: &str)
        -> anyhow::Result<Vec<IndexInfo>>;

    async fn get_triggers(
        &self,
        scope: &Scope,
        relation: &str,
    ) -> anyhow::Result<Vec<TriggerInfo>>;
}

impl std::fmt::Debug for dyn ConnectionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConnectionAdapter")
    }
}
