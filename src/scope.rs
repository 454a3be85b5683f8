use serde::{Deserialize, Serialize};

/// A namespace within a target: either a bare database (SQLite, MySQL style)
/// or a database + schema pair (Postgres style).
///
/// Scopes are immutable values; their slug is the stable prefix for every
/// node ID minted under them, so slug derivation must stay deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Database { database: String },
    Schema { database: String, schema: String },
}

impl Scope {
    pub fn database(database: impl Into<String>) -> Self {
        Scope::Database {
            database: database.into(),
        }
    }

    pub fn schema(database: impl Into<String>, schema: impl Into<String>) -> Self {
        Scope::Schema {
            database: database.into(),
            schema: schema.into(),
        }
    }

    pub fn database_name(&self) -> &str {
        match self {
            Scope::Database { database } => database,
            Scope::Schema { database, .. } => database,
        }
    }

    pub fn schema_name(&self) -> Option<&str> {
        match self {
            Scope::Database { .. } => None,
            Scope::Schema { schema, .. } => Some(schema),
        }
    }

    /// Human-readable name: `db` or `db.schema`.
    pub fn display_name(&self) -> String {
        match self {
            Scope::Database { database } => database.clone(),
            Scope::Schema { database, schema } => format!("{database}.{schema}"),
        }
    }

    /// Stable slug used as the node ID prefix for this namespace.
    pub fn slug(&self) -> String {
        match self {
            Scope::Database { database } => slugify(database),
            Scope::Schema { database, schema } => {
                format!("{}.{}", slugify(database), slugify(schema))
            }
        }
    }
}

/// Lowercase and replace anything outside `[a-z0-9_]` with `-` so slugs are
/// safe to embed in IDs regardless of how exotic the identifier is.
pub fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_deterministic_and_lowercase() {
        let scope = Scope::schema("Sales", "Public");
        assert_eq!(scope.slug(), "sales.public");
        assert_eq!(scope.slug(), scope.slug());
    }

    #[test]
    fn slug_escapes_odd_characters() {
        assert_eq!(slugify("my db (copy)"), "my-db--copy-");
        assert_eq!(slugify("orders_2024"), "orders_2024");
    }

    #[test]
    fn display_name_joins_schema() {
        assert_eq!(Scope::database("app").display_name(), "app");
        assert_eq!(Scope::schema("app", "public").display_name(), "app.public");
    }
}
