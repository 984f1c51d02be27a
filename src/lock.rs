use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, Statement, TransactionTrait, Value,
};
use tracing::trace;

use crate::config::NestedSetConfig;
use crate::error::NestedSetError;

/// A transaction that holds the table's write lock until it commits or rolls back.
///
/// On PostgreSQL the lock is a transaction-scoped advisory lock, so it is released by the
/// server together with the transaction and cannot leak onto a pooled connection. On SQLite
/// the first statement is a write that matches nothing, which takes the database write lock
/// before any read; a second writer then waits out `busy_timeout` instead of failing on a
/// read-to-write upgrade.
pub struct LockedTransaction {
    txn: DatabaseTransaction,
}

impl LockedTransaction {
    pub async fn acquire<C>(config: &NestedSetConfig, db: &C) -> Result<Self, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let backend = db.get_database_backend();
        ensure_supported(backend)?;

        let txn = db.begin().await?;

        let locked = match (backend, config.advisory_lock_strategy().key()) {
            (DbBackend::Postgres, Some(key)) => {
                trace!(key = key.as_str(), "waiting for advisory lock");
                acquire_lock(&txn, key.as_str()).await
            }
            (DbBackend::Sqlite, _) => {
                trace!(table = config.table_name(), "waiting for sqlite write lock");
                reserve_sqlite(&txn, config.table_name()).await
            }
            _ => Ok(()),
        };
        if let Err(err) = locked {
            let _ = txn.rollback().await;
            return Err(err);
        }
        trace!(table = config.table_name(), "write lock granted");

        Ok(Self { txn })
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), NestedSetError> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), NestedSetError> {
        self.txn.rollback().await?;
        Ok(())
    }

    /// Commit on success, roll back on failure, and hand the result through.
    pub async fn finish<T>(
        self,
        result: Result<T, NestedSetError>,
    ) -> Result<T, NestedSetError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.rollback().await;
                Err(err)
            }
        }
    }
}

pub(crate) fn ensure_supported(backend: DbBackend) -> Result<(), NestedSetError> {
    match backend {
        DbBackend::Postgres | DbBackend::Sqlite => Ok(()),
        _ => Err(NestedSetError::UnsupportedBackend),
    }
}

async fn acquire_lock(txn: &DatabaseTransaction, key: &str) -> Result<(), NestedSetError> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1), 0)",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}

async fn reserve_sqlite(txn: &DatabaseTransaction, table: &str) -> Result<(), NestedSetError> {
    txn.execute(Statement::from_string(
        DbBackend::Sqlite,
        format!(r#"DELETE FROM "{}" WHERE 0 = 1"#, table.replace('"', r#""""#)),
    ))
    .await?;
    Ok(())
}
