mod common;

use common::*;
use dbnav_daemon::node_types::{EDGE_COLUMNS, EDGE_TABLES};
use dbnav_daemon::{ConnectionState, DbDaemon, ExecOptions, JobStatus, NodeKind, Scope};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn daemon_with(adapter: &Arc<MockAdapter>) -> DbDaemon {
    let mut config = config_with_target(TARGET, ENGINE);
    config.limits.edge_items = 5;
    let daemon = DbDaemon::new(config);
    daemon.register_adapter(ENGINE, factory_for(adapter));
    daemon
}

async fn connect(daemon: &DbDaemon) {
    let (mut rx, _unsub) = daemon.subscribe();
    daemon.connect(TARGET).await;
    let states = wait_for_terminal_state(&mut rx, TARGET).await;
    assert_eq!(states.last(), Some(&ConnectionState::Connected));
}

#[tokio::test]
async fn browse_truncates_edges_at_the_api_boundary() {
    let adapter = MockAdapter::single_database("app");
    let scope = Scope::database("app");
    adapter.set_relations(&scope, (0..8).map(|i| table(&format!("t{i}"))).collect());
    let daemon = daemon_with(&adapter);
    connect(&daemon).await;

    let roots = daemon.get_nodes(TARGET, &[]).await.unwrap();
    assert_eq!(roots.len(), 1);
    let root = &roots[0];
    assert_eq!(root.kind, NodeKind::Database);

    // 8 tables against an edge_items limit of 5.
    let tables = &root.edges[EDGE_TABLES];
    assert_eq!(tables.node_ids.len(), 5);
    assert!(tables.truncated);

    // A second fetch sees the full edge again: truncation happened on the
    // payload, not in the cache.
    let again = daemon.get_nodes(TARGET, &[]).await.unwrap();
    assert_eq!(again[0].edges[EDGE_TABLES].node_ids.len(), 5);
    assert_eq!(adapter.get_relations_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn drill_down_reaches_columns() {
    let adapter = MockAdapter::single_database("app");
    let scope = Scope::database("app");
    adapter.set_relations(&scope, vec![table("orders")]);
    adapter.set_columns("orders", vec![column("id", "integer")]);
    let daemon = daemon_with(&adapter);
    connect(&daemon).await;

    let roots = daemon.get_nodes(TARGET, &[]).await.unwrap();
    let table_id = roots[0].edges[EDGE_TABLES].node_ids[0].clone();

    let tables = daemon.get_nodes(TARGET, &[table_id]).await.unwrap();
    let col_id = tables[0].edges[EDGE_COLUMNS].node_ids[0].clone();

    let cols = daemon.get_nodes(TARGET, &[col_id]).await.unwrap();
    assert_eq!(cols[0].kind, NodeKind::Column);
    assert_eq!(cols[0].name, "id");
}

#[tokio::test]
async fn invalidate_forces_a_fresh_bootstrap() {
    let adapter = MockAdapter::single_database("app");
    let daemon = daemon_with(&adapter);
    connect(&daemon).await;

    daemon.get_nodes(TARGET, &[]).await.unwrap();
    daemon.invalidate_schema(TARGET);
    daemon.get_nodes(TARGET, &[]).await.unwrap();
    assert_eq!(adapter.get_scopes_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exec_roundtrip_through_the_daemon() {
    let adapter = MockAdapter::single_database("app");
    let daemon = daemon_with(&adapter);
    connect(&daemon).await;

    let (mut rx, _unsub) = daemon.subscribe();
    let job = daemon
        .exec(TARGET, "SELECT 1", Vec::new(), ExecOptions::default())
        .unwrap();
    wait_for_job_completion(&mut rx, &job.id).await;

    let view = daemon.result_view(&job.id, None, None).await.unwrap();
    assert_eq!(view.status, JobStatus::Success);
    assert_eq!(view.rows.len(), 3);

    let looked_up = daemon.job(&job.id).await.unwrap();
    assert_eq!(looked_up.id, job.id);
    assert_eq!(looked_up.status, JobStatus::Success);
    assert!(looked_up.finished_at.is_some());
}

#[tokio::test]
async fn status_counts_every_subsystem() {
    let adapter = MockAdapter::single_database("app");
    let daemon = daemon_with(&adapter);
    connect(&daemon).await;

    let (mut rx, _unsub) = daemon.subscribe();
    let job = daemon
        .exec(TARGET, "SELECT 1", Vec::new(), ExecOptions::default())
        .unwrap();
    wait_for_job_completion(&mut rx, &job.id).await;
    daemon.get_nodes(TARGET, &[]).await.unwrap();

    let status = daemon.status().await;
    assert_eq!(status.connected_targets, vec![TARGET.to_string()]);
    assert_eq!(status.cached_schema_targets, vec![TARGET.to_string()]);
    assert_eq!(status.running_jobs, 0);
    assert_eq!(status.stored_results, 1);
    assert_eq!(status.stored_rows, 3);
    assert!(status.event_subscribers >= 1);
}

#[tokio::test]
async fn shutdown_cancels_jobs_and_closes_connections() {
    let adapter = MockAdapter::single_database("app");
    adapter.query_delay_ms.store(5_000, Ordering::SeqCst);
    let daemon = daemon_with(&adapter);
    connect(&daemon).await;

    let (mut rx, _unsub) = daemon.subscribe();
    let job = daemon
        .exec(TARGET, "SELECT slow", Vec::new(), ExecOptions::default())
        .unwrap();
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    daemon.shutdown().await;
    let payload = wait_for_job_completion(&mut rx, &job.id).await;
    assert!(matches!(
        payload,
        dbnav_daemon::EventPayload::QueryJobCompleted {
            status: JobStatus::Canceled,
            ..
        }
    ));
    assert_eq!(adapter.close_calls.load(Ordering::SeqCst), 1);
    assert!(daemon.status().await.connected_targets.is_empty());
}
