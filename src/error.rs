use thiserror::Error;

/// Errors returned by the nested-set APIs.
#[derive(Debug, Error)]
pub enum NestedSetError {
    #[error("nested-set supports PostgreSQL and SQLite connections only")]
    UnsupportedBackend,

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("nested-set invariant violation: {0}")]
    Invariant(String),
}

impl NestedSetError {
    pub fn not_found(entity: impl Into<String>, id: &impl std::fmt::Debug) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: format!("{id:?}"),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidOperation(detail.into())
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }
}
