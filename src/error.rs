use thiserror::Error;

/// Convenience alias used across the daemon's public surface.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the session, cache, and query subsystems.
///
/// Adapter-level failures (network, SQL) are carried opaquely through the
/// `Adapter` variant; the daemon never interprets engine-specific codes.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no live connection for target '{target}'")]
    ConnectionUnavailable { target: String },

    #[error("no adapter factory registered for engine '{engine}'")]
    UnsupportedEngine { engine: String },

    #[error("target '{target}' is not configured")]
    UnknownTarget { target: String },

    #[error("requested {requested} nodes in one call, limit is {limit}")]
    NodeLimitExceeded { requested: usize, limit: usize },

    #[error("unknown node '{id}' (hydrate its parent first)")]
    UnknownNode { id: String },

    #[error("adapter reported no scopes for target '{target}'")]
    NoScopesFound { target: String },

    #[error("no job with id '{id}'")]
    JobNotFound { id: String },

    #[error("no stored result for job '{id}'")]
    ResultNotFound { id: String },

    #[error("invalid pagination argument: {reason}")]
    InvalidPaginationArgument { reason: String },

    #[error(transparent)]
    Adapter(#[from] anyhow::Error),
}
