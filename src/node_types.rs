use crate::scope::{slugify, Scope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const EDGE_TABLES: &str = "tables";
pub const EDGE_VIEWS: &str = "views";
pub const EDGE_PARTITIONS: &str = "partitions";
pub const EDGE_COLUMNS: &str = "columns";
pub const EDGE_CONSTRAINTS: &str = "constraints";
pub const EDGE_INDEXES: &str = "indexes";
pub const EDGE_TRIGGERS: &str = "triggers";

/// The closed set of vertex kinds in a target's schema graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Database,
    Schema,
    Table,
    View,
    Column,
    Constraint,
    Index,
    Trigger,
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Database => "database",
            NodeKind::Schema => "schema",
            NodeKind::Table => "table",
            NodeKind::View => "view",
            NodeKind::Column => "column",
            NodeKind::Constraint => "constraint",
            NodeKind::Index => "index",
            NodeKind::Trigger => "trigger",
        }
    }

    /// Container kinds carry edges and hydrate into children; the rest are
    /// terminal leaves.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Database | NodeKind::Schema | NodeKind::Table | NodeKind::View
        )
    }
}

/// A named, ordered list of child node IDs attached to a container node.
///
/// `truncated` is only ever set on copies handed out at the API boundary;
/// the cached edge always holds the full list with `truncated == false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub node_ids: Vec<String>,
    pub loaded: bool,
    pub truncated: bool,
}

impl Edge {
    pub fn loaded(node_ids: Vec<String>) -> Self {
        Self {
            node_ids,
            loaded: true,
            truncated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Table,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    Exclusion,
    Other,
}

/// Foreign-key reference details carried on `ConstraintKind::ForeignKey`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub referenced_scope: Option<Scope>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationAttrs {
    pub table_type: Option<String>,
    /// Name of the parent table when this relation is a partition child.
    pub partition_of: Option<String>,
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnAttrs {
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub ordinal: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintAttrs {
    pub constraint_kind: ConstraintKind,
    pub columns: Vec<String>,
    pub definition: Option<String>,
    pub foreign_key: Option<ForeignKeyRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexAttrs {
    pub unique: bool,
    pub columns: Vec<String>,
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerAttrs {
    pub timing: Option<String>,
    pub event: Option<String>,
    pub definition: Option<String>,
}

/// Variant-specific payload for each node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeAttrs {
    None,
    Relation(RelationAttrs),
    Column(ColumnAttrs),
    Constraint(ConstraintAttrs),
    Index(IndexAttrs),
    Trigger(TriggerAttrs),
}

/// A vertex in the per-target schema graph.
///
/// The ID is a deterministic slug derived from scope + kind + name, so
/// rebuilding the same node during a repeated hydration yields the same ID.
/// Only `edges` and `hydrated` ever mutate, and only inside the owning cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub scope: Scope,
    pub kind: NodeKind,
    pub hydrated: bool,
    pub edges: BTreeMap<String, Edge>,
    pub attrs: NodeAttrs,
}

/// Deterministic node ID: `scope_slug:kind:name`.
pub fn node_id(scope: &Scope, kind: NodeKind, name: &str) -> String {
    format!("{}:{}:{}", scope.slug(), kind.tag(), slugify(name))
}

impl Node {
    pub fn new(kind: NodeKind, scope: Scope, name: impl Into<String>, attrs: NodeAttrs) -> Self {
        let name = name.into();
        Self {
            id: node_id(&scope, kind, &name),
            name,
            scope,
            kind,
            hydrated: false,
            edges: BTreeMap::new(),
            attrs,
        }
    }

    /// Build a node whose ID is derived from a qualifier other than its
    /// display name. Relation children (columns, constraints, indexes,
    /// triggers) qualify with their relation so same-named children of
    /// different tables never collide.
    pub fn with_qualified_id(
        kind: NodeKind,
        scope: Scope,
        name: impl Into<String>,
        qualifier: &str,
    ) -> Self {
        let name = name.into();
        Self {
            id: node_id(&scope, kind, qualifier),
            name,
            scope,
            kind,
            hydrated: false,
            edges: BTreeMap::new(),
            attrs: NodeAttrs::None,
        }
    }

    /// Root node for a scope discovered at bootstrap: a `Database` node for
    /// schema-less scopes, a `Schema` node otherwise.
    pub fn root_for_scope(scope: Scope) -> Self {
        let kind = if scope.schema_name().is_some() {
            NodeKind::Schema
        } else {
            NodeKind::Database
        };
        let name = scope.display_name();
        Node::new(kind, scope, name, NodeAttrs::None)
    }

    pub fn with_attrs(mut self, attrs: NodeAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn set_edge(&mut self, name: &str, node_ids: Vec<String>) {
        self.edges.insert(name.to_string(), Edge::loaded(node_ids));
    }

    pub fn edge(&self, name: &str) -> Option<&Edge> {
        self.edges.get(name)
    }
}
