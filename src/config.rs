use crc32fast::Hasher;

/// Static configuration describing how a SeaORM model is kept as a nested set.
#[derive(Clone, Debug)]
pub struct NestedSetConfig {
    entity_name: String,
    table_name: String,
    advisory_lock_strategy: AdvisoryLockStrategy,
    verify_writes: bool,
}

impl NestedSetConfig {
    /// Create a new configuration using the logical entity name and its backing table.
    pub fn new(entity_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        let table_name = table_name.into();

        let default_lock = AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::derived_from(
            &entity_name,
            &table_name,
        ));

        Self {
            entity_name,
            table_name,
            advisory_lock_strategy: default_lock,
            verify_writes: cfg!(debug_assertions),
        }
    }

    /// Merge options produced by [`NestedSetOptions`].
    pub(crate) fn apply_options(mut self, options: NestedSetOptions) -> Self {
        if let Some(strategy) = options.advisory_lock_strategy {
            self.advisory_lock_strategy = strategy;
        }
        if let Some(verify) = options.verify_writes {
            self.verify_writes = verify;
        }
        self
    }

    /// Human-readable Rust struct name for the entity.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Table holding the `left`/`right`/`depth` columns.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Lock taken around every mutation (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }

    /// Whether mutations re-check the whole table before committing.
    pub fn verify_writes(&self) -> bool {
        self.verify_writes
    }
}

/// Builder-style options consumed by the derive macro.
#[derive(Clone, Debug, Default)]
pub struct NestedSetOptions {
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
    verify_writes: Option<bool>,
}

impl NestedSetOptions {
    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn lock_key(self, key: impl Into<String>) -> Self {
        self.advisory_lock_strategy(AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::new(key)))
    }

    pub fn verify_writes(mut self, verify: bool) -> Self {
        self.verify_writes = Some(verify);
        self
    }

    pub fn apply(self, base: NestedSetConfig) -> NestedSetConfig {
        base.apply_options(self)
    }
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(entity: &str, table: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(entity.as_bytes());
        hasher.update(b"/");
        hasher.update(table.as_bytes());
        let crc = hasher.finalize();
        Self(format!("nested-set::{entity}::{table}::{crc:x}"))
    }
}

/// Configuration describing how to serialize writers on one table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvisoryLockStrategy {
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}
