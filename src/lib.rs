//! SeaORM-centric nested set (modified preorder tree traversal) implementation.
//!
//! Each participating table stores `parent_id`, `left`, `right` and `depth` per row. Subtree
//! reads are single range scans; inserts, moves and deletes shift bounds with bulk updates
//! inside one locked transaction. PostgreSQL and SQLite are supported.

pub mod config;
pub mod error;
pub mod invariant;
pub mod lock;
pub mod repository;
pub mod traits;
pub mod tree;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{AdvisoryLockStrategy, NestedSetConfig, NestedSetOptions};
    pub use crate::repository::NestedSetRepository;
    pub use crate::traits::NestedSetModel;
    pub use crate::tree::TreeNode;
}

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

pub use config::{AdvisoryLockKey, AdvisoryLockStrategy, NestedSetConfig, NestedSetOptions};
pub use error::NestedSetError;
pub use invariant::{NodeBounds, Violation};
pub use nested_set_macros::NestedSetModel as NestedSetModelDerive;
#[doc(hidden)]
pub use nested_set_macros::NestedSetModel;
pub use repository::NestedSetRepository;
pub use traits::NestedSetModel;
pub use tree::TreeNode;
