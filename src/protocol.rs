use crate::adapter::ColumnMeta;
use crate::node_types::{Node, NodeAttrs, NodeKind};
use crate::query_scheduler::{JobStatus, QueryJob, ResultView};
use crate::scope::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire-facing copy of an edge. `node_ids` may be a truncated slice of the
/// cached edge; `truncated` says so.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgePayload {
    pub node_ids: Vec<String>,
    pub loaded: bool,
    pub truncated: bool,
}

/// Wire-facing copy of a schema graph node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePayload {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub scope: Scope,
    pub hydrated: bool,
    pub edges: BTreeMap<String, EdgePayload>,
    pub attrs: NodeAttrs,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPayload {
    pub id: String,
    pub target: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultViewPayload {
    pub job_id: String,
    pub status: JobStatus,
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub total_rows: usize,
    pub offset: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

/// Convert a cached node into its outward payload, applying the per-response
/// edge-items limit. A positive `edge_limit` smaller than an edge slices the
/// ID list and flips `truncated`; the cached node is never altered.
pub fn node_to_payload(node: &Node, edge_limit: usize) -> NodePayload {
    let mut edges = BTreeMap::new();
    for (name, edge) in &node.edges {
        let over_limit = edge_limit > 0 && edge.node_ids.len() > edge_limit;
        let node_ids = if over_limit {
            edge.node_ids[..edge_limit].to_vec()
        } else {
            edge.node_ids.clone()
        };
        edges.insert(
            name.clone(),
            EdgePayload {
                node_ids,
                loaded: edge.loaded,
                truncated: over_limit || edge.truncated,
            },
        );
    }
    NodePayload {
        id: node.id.clone(),
        name: node.name.clone(),
        kind: node.kind,
        scope: node.scope.clone(),
        hydrated: node.hydrated,
        edges,
        attrs: node.attrs.clone(),
    }
}

pub fn job_to_payload(job: &QueryJob) -> JobPayload {
    JobPayload {
        id: job.id.clone(),
        target: job.target.clone(),
        status: job.status,
        created_at: job.created_at,
        finished_at: job.finished_at,
        duration_ms: job.duration_ms,
        error: job.error.clone(),
    }
}

pub fn view_to_payload(view: ResultView) -> ResultViewPayload {
    ResultViewPayload {
        job_id: view.job_id,
        status: view.status,
        columns: view.columns,
        rows: view.rows,
        total_rows: view.total_rows,
        offset: view.offset,
        truncated: view.truncated,
        rows_affected: view.rows_affected,
        error: view.error,
        duration_ms: view.duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_types::EDGE_COLUMNS;

    fn node_with_edge(items: usize) -> Node {
        let mut node = Node::new(
            NodeKind::Table,
            Scope::database("app"),
            "orders",
            NodeAttrs::None,
        );
        node.set_edge(
            EDGE_COLUMNS,
            (0..items).map(|i| format!("col{i}")).collect(),
        );
        node
    }

    #[test]
    fn edge_limit_truncates_and_flags() {
        let node = node_with_edge(5);
        let payload = node_to_payload(&node, 2);
        let edge = &payload.edges[EDGE_COLUMNS];
        assert_eq!(edge.node_ids, vec!["col0", "col1"]);
        assert!(edge.truncated);
        // The cached node keeps the full edge.
        assert_eq!(node.edge(EDGE_COLUMNS).unwrap().node_ids.len(), 5);
        assert!(!node.edge(EDGE_COLUMNS).unwrap().truncated);
    }

    #[test]
    fn zero_or_large_limit_returns_everything() {
        let node = node_with_edge(5);
        for limit in [0, 5, 50] {
            let payload = node_to_payload(&node, limit);
            let edge = &payload.edges[EDGE_COLUMNS];
            assert_eq!(edge.node_ids.len(), 5);
            assert!(!edge.truncated, "limit {limit} must not truncate");
        }
    }
}
