use crate::connection_manager::{ConnectionHandle, ConnectionManager};
use crate::error::{CoreError, Result};
use crate::node_types::{
    node_id, ColumnAttrs, ConstraintAttrs, IndexAttrs, Node, NodeAttrs, NodeKind, RelationAttrs,
    RelationType, TriggerAttrs, EDGE_COLUMNS, EDGE_CONSTRAINTS, EDGE_INDEXES, EDGE_PARTITIONS,
    EDGE_TABLES, EDGE_TRIGGERS, EDGE_VIEWS,
};
use crate::scope::Scope;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Result type for hydration broadcast (must be cloneable, so errors travel
/// as strings).
#[derive(Debug, Clone)]
enum HydrationBroadcast {
    Done,
    Failed(String),
}

type HydrationKey = (String, String);

/// One target's schema graph: node map plus ordered root IDs.
///
/// `generation` is the `connected_at` stamp of the handle the graph was
/// bootstrapped from; a replaced connection makes the whole graph stale.
struct TargetGraph {
    nodes: HashMap<String, Node>,
    roots: Vec<String>,
    generation: DateTime<Utc>,
}

/// Lazily hydrated, deduplicated schema graph per target.
///
/// Callers always receive clones; the cache never leaks references to its
/// internal nodes, so no lock outlives a call. Hydration of any one
/// `(target, node)` key runs at most once concurrently — waiters block on
/// the owner's broadcast and then re-read.
pub struct SchemaCache {
    connections: Arc<ConnectionManager>,
    graphs: DashMap<String, Arc<RwLock<TargetGraph>>>,
    /// Active hydrations: (target, node_id) -> broadcast channel.
    inflight: DashMap<HydrationKey, broadcast::Sender<HydrationBroadcast>>,
    max_nodes_per_request: usize,
}

impl SchemaCache {
    pub fn new(connections: Arc<ConnectionManager>, max_nodes_per_request: usize) -> Arc<Self> {
        Arc::new(Self {
            connections,
            graphs: DashMap::new(),
            inflight: DashMap::new(),
            max_nodes_per_request,
        })
    }

    /// Fetch nodes by ID, bootstrapping the target's graph on first touch and
    /// hydrating any requested node that has no children loaded yet.
    ///
    /// An empty `node_ids` asks for the current roots. Requested IDs are
    /// de-duplicated preserving first occurrence; results come back as clones
    /// in request order.
    pub async fn get_nodes(&self, target: &str, node_ids: &[String]) -> Result<Vec<Node>> {
        let handle =
            self.connections
                .connection(target)
                .ok_or_else(|| CoreError::ConnectionUnavailable {
                    target: target.to_string(),
                })?;

        if node_ids.len() > self.max_nodes_per_request {
            return Err(CoreError::NodeLimitExceeded {
                requested: node_ids.len(),
                limit: self.max_nodes_per_request,
            });
        }

        let graph = self.graph_for(target, &handle).await?;

        let requested: Vec<String> = if node_ids.is_empty() {
            graph.read().await.roots.clone()
        } else {
            let mut seen = HashSet::new();
            node_ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .cloned()
                .collect()
        };

        for id in &requested {
            let needs_hydration = {
                let g = graph.read().await;
                let node = g.nodes.get(id).ok_or_else(|| CoreError::UnknownNode {
                    id: id.clone(),
                })?;
                !node.hydrated
            };
            if needs_hydration {
                self.hydrate(target, id, &handle, &graph).await?;
            }
        }

        let g = graph.read().await;
        requested
            .iter()
            .map(|id| {
                g.nodes
                    .get(id)
                    .cloned()
                    .ok_or_else(|| CoreError::UnknownNode { id: id.clone() })
            })
            .collect()
    }

    /// Drop a target's graph entirely. The next `get_nodes` re-bootstraps.
    pub fn invalidate(&self, target: &str) {
        if self.graphs.remove(target).is_some() {
            info!("Schema graph for '{}' invalidated", target);
        }
    }

    pub fn cached_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.graphs.iter().map(|e| e.key().clone()).collect();
        targets.sort();
        targets
    }

    /// Return the existing graph for this connection generation, or
    /// bootstrap a fresh one from the adapter's scopes.
    async fn graph_for(
        &self,
        target: &str,
        handle: &Arc<ConnectionHandle>,
    ) -> Result<Arc<RwLock<TargetGraph>>> {
        if let Some(existing) = self.graphs.get(target).map(|e| e.value().clone()) {
            if existing.read().await.generation == handle.connected_at {
                return Ok(existing);
            }
            debug!(
                "Connection for '{}' was replaced; discarding stale graph",
                target
            );
            self.graphs.remove(target);
        }

        let scopes = handle
            .adapter
            .get_scopes()
            .await
            .with_context(|| format!("listing scopes for target '{target}'"))?;
        if scopes.is_empty() {
            return Err(CoreError::NoScopesFound {
                target: target.to_string(),
            });
        }

        let mut nodes = HashMap::new();
        let mut roots = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let root = Node::root_for_scope(scope);
            roots.push(root.id.clone());
            nodes.insert(root.id.clone(), root);
        }
        info!(
            "Bootstrapped schema graph for '{}' with {} root(s)",
            target,
            roots.len()
        );

        let fresh = Arc::new(RwLock::new(TargetGraph {
            nodes,
            roots,
            generation: handle.connected_at,
        }));
        // A racing bootstrap may have installed first; keep whichever won.
        let graph = self
            .graphs
            .entry(target.to_string())
            .or_insert(fresh)
            .clone();
        Ok(graph)
    }

    /// Single-flight hydration keyed by (target, node). The owning caller
    /// runs the adapter calls; everyone else subscribes to its broadcast.
    /// An RAII guard clears the key when the owner finishes or its future is
    /// dropped mid-flight, so an abandoned hydration never wedges later
    /// attempts.
    async fn hydrate(
        &self,
        target: &str,
        node_id: &str,
        handle: &Arc<ConnectionHandle>,
        graph: &Arc<RwLock<TargetGraph>>,
    ) -> Result<()> {
        let key: HydrationKey = (target.to_string(), node_id.to_string());

        loop {
            // Claim the key or subscribe to whoever holds it. The map entry
            // must not be held across an await.
            let claim = match self.inflight.entry(key.clone()) {
                Entry::Occupied(entry) => Err(entry.get().subscribe()),
                Entry::Vacant(entry) => {
                    let (tx, _) = broadcast::channel(16);
                    entry.insert(tx.clone());
                    Ok(tx)
                }
            };

            let tx = match claim {
                Err(mut rx) => match rx.recv().await {
                    Ok(HydrationBroadcast::Done) => {
                        debug!("Hydration of {} reused another caller's work", node_id);
                        return Ok(());
                    }
                    Ok(HydrationBroadcast::Failed(err)) => {
                        return Err(CoreError::Adapter(anyhow!(err)));
                    }
                    Err(_) => {
                        // Owner went away without broadcasting; retry.
                        continue;
                    }
                },
                Ok(tx) => tx,
            };

            let _guard = InflightGuard { cache: self, key };
            let result = self.run_hydration(target, node_id, handle, graph).await;
            let _ = tx.send(match &result {
                Ok(()) => HydrationBroadcast::Done,
                Err(e) => HydrationBroadcast::Failed(format!("{e:#}")),
            });
            return result;
        }
    }

    async fn run_hydration(
        &self,
        target: &str,
        id: &str,
        handle: &Arc<ConnectionHandle>,
        graph: &Arc<RwLock<TargetGraph>>,
    ) -> Result<()> {
        // Race guard: the node may have been hydrated between the caller's
        // check and this call owning the key.
        let (kind, scope, name) = {
            let g = graph.read().await;
            let node = g
                .nodes
                .get(id)
                .ok_or_else(|| CoreError::UnknownNode { id: id.to_string() })?;
            if node.hydrated {
                return Ok(());
            }
            (node.kind, node.scope.clone(), node.name.clone())
        };

        match kind {
            NodeKind::Database | NodeKind::Schema => {
                self.hydrate_scope_node(target, id, &scope, handle, graph)
                    .await
            }
            NodeKind::Table | NodeKind::View => {
                self.hydrate_relation_node(target, id, &scope, &name, handle, graph)
                    .await
            }
            _ => {
                // Terminal leaf: nothing to discover.
                let mut g = graph.write().await;
                if let Some(node) = g.nodes.get_mut(id) {
                    node.hydrated = true;
                }
                Ok(())
            }
        }
    }

    /// Discover the relations of a database/schema node, routing partition
    /// children into their parent table's "partitions" edge.
    async fn hydrate_scope_node(
        &self,
        target: &str,
        id: &str,
        scope: &Scope,
        handle: &Arc<ConnectionHandle>,
        graph: &Arc<RwLock<TargetGraph>>,
    ) -> Result<()> {
        let relations = handle
            .adapter
            .get_relations(scope)
            .await
            .with_context(|| format!("listing relations in '{}' for target '{target}'", scope.display_name()))?;

        let mut children: Vec<Node> = Vec::with_capacity(relations.len());
        let mut tables: Vec<String> = Vec::new();
        let mut views: Vec<String> = Vec::new();
        // Partition children grouped by parent table ID. Built as a
        // post-pass map because the parent may appear before or after its
        // partitions in adapter output.
        let mut partitions: HashMap<String, Vec<String>> = HashMap::new();

        for rel in &relations {
            let kind = match rel.relation_type {
                RelationType::Table => NodeKind::Table,
                RelationType::View => NodeKind::View,
            };
            let child = Node::new(
                kind,
                scope.clone(),
                rel.name.clone(),
                NodeAttrs::Relation(RelationAttrs {
                    table_type: rel.table_type.clone(),
                    partition_of: rel.partition_of.clone(),
                    definition: rel.definition.clone(),
                }),
            );

            match rel.relation_type {
                RelationType::View => views.push(child.id.clone()),
                RelationType::Table => match &rel.partition_of {
                    Some(parent) => {
                        let parent_id = node_id(scope, NodeKind::Table, parent);
                        partitions.entry(parent_id).or_default().push(child.id.clone());
                    }
                    None => tables.push(child.id.clone()),
                },
            }
            children.push(child);
        }

        for child in children.iter_mut() {
            if let Some(ids) = partitions.remove(&child.id) {
                child.set_edge(EDGE_PARTITIONS, ids);
            }
        }
        // A partition whose parent is not in this scope's listing stays
        // visible at the top level instead of disappearing.
        for (parent_id, ids) in partitions {
            warn!(
                "Partition parent {} missing from scope listing; keeping {} child(ren) top-level",
                parent_id,
                ids.len()
            );
            tables.extend(ids);
        }

        debug!(
            "Hydrated {} with {} table(s), {} view(s)",
            id,
            tables.len(),
            views.len()
        );

        let mut g = graph.write().await;
        for child in children {
            g.nodes.entry(child.id.clone()).or_insert(child);
        }
        if let Some(node) = g.nodes.get_mut(id) {
            node.set_edge(EDGE_TABLES, tables);
            node.set_edge(EDGE_VIEWS, views);
            node.hydrated = true;
        }
        Ok(())
    }

    /// Discover columns, constraints, indexes, and triggers of a relation.
    async fn hydrate_relation_node(
        &self,
        target: &str,
        id: &str,
        scope: &Scope,
        relation: &str,
        handle: &Arc<ConnectionHandle>,
        graph: &Arc<RwLock<TargetGraph>>,
    ) -> Result<()> {
        let context = |what: &str| {
            format!("listing {what} of '{relation}' in '{}' for target '{target}'", scope.display_name())
        };

        let columns = handle
            .adapter
            .get_columns(scope, relation)
            .await
            .with_context(|| context("columns"))?;
        let constraints = handle
            .adapter
            .get_constraints(scope, relation)
            .await
            .with_context(|| context("constraints"))?;
        let indexes = handle
            .adapter
            .get_indexes(scope, relation)
            .await
            .with_context(|| context("indexes"))?;
        let triggers = handle
            .adapter
            .get_triggers(scope, relation)
            .await
            .with_context(|| context("triggers"))?;

        let mut children: Vec<Node> = Vec::new();
        let qualifier = |name: &str| format!("{relation}.{name}");

        let mut column_ids = Vec::with_capacity(columns.len());
        for col in columns {
            let node = Node::with_qualified_id(
                NodeKind::Column,
                scope.clone(),
                col.name.clone(),
                &qualifier(&col.name),
            )
            .with_attrs(NodeAttrs::Column(ColumnAttrs {
                data_type: col.data_type,
                nullable: col.nullable,
                default_value: col.default_value,
                ordinal: col.ordinal,
            }));
            column_ids.push(node.id.clone());
            children.push(node);
        }

        let mut constraint_ids = Vec::with_capacity(constraints.len());
        for con in constraints {
            let node = Node::with_qualified_id(
                NodeKind::Constraint,
                scope.clone(),
                con.name.clone(),
                &qualifier(&con.name),
            )
            .with_attrs(NodeAttrs::Constraint(ConstraintAttrs {
                constraint_kind: con.kind,
                columns: con.columns,
                definition: con.definition,
                foreign_key: con.foreign_key,
            }));
            constraint_ids.push(node.id.clone());
            children.push(node);
        }

        let mut index_ids = Vec::with_capacity(indexes.len());
        for idx in indexes {
            let node = Node::with_qualified_id(
                NodeKind::Index,
                scope.clone(),
                idx.name.clone(),
                &qualifier(&idx.name),
            )
            .with_attrs(NodeAttrs::Index(IndexAttrs {
                unique: idx.unique,
                columns: idx.columns,
                definition: idx.definition,
            }));
            index_ids.push(node.id.clone());
            children.push(node);
        }

        let mut trigger_ids = Vec::with_capacity(triggers.len());
        for trg in triggers {
            let node = Node::with_qualified_id(
                NodeKind::Trigger,
                scope.clone(),
                trg.name.clone(),
                &qualifier(&trg.name),
            )
            .with_attrs(NodeAttrs::Trigger(TriggerAttrs {
                timing: trg.timing,
                event: trg.event,
                definition: trg.definition,
            }));
            trigger_ids.push(node.id.clone());
            children.push(node);
        }

        debug!(
            "Hydrated {} with {} column(s), {} constraint(s), {} index(es), {} trigger(s)",
            id,
            column_ids.len(),
            constraint_ids.len(),
            index_ids.len(),
            trigger_ids.len()
        );

        let mut g = graph.write().await;
        for child in children {
            g.nodes.entry(child.id.clone()).or_insert(child);
        }
        if let Some(node) = g.nodes.get_mut(id) {
            node.set_edge(EDGE_COLUMNS, column_ids);
            node.set_edge(EDGE_CONSTRAINTS, constraint_ids);
            node.set_edge(EDGE_INDEXES, index_ids);
            node.set_edge(EDGE_TRIGGERS, trigger_ids);
            node.hydrated = true;
        }
        Ok(())
    }
}

/// Clears an in-flight hydration key on drop. Dropping the sender alongside
/// it wakes waiters with a closed channel, and they retry from scratch.
struct InflightGuard<'a> {
    cache: &'a SchemaCache,
    key: HydrationKey,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.cache.inflight.remove(&self.key);
    }
}
