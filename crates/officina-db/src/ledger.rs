//! # Ledger Transactions
//!
//! Every ledger mutation runs inside one [`LedgerTransaction`]: named
//! in-process locks plus one SQLite transaction. The locks serialize writers
//! that would otherwise read the same "last number" or the same client
//! balance; the transaction makes the operation all-or-nothing.
//!
//! ## Acquisition Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Sort and dedup the requested LockKeys                              │
//! │  2. Await each lock in that order         (no connection held yet)     │
//! │  3. pool.begin()                          (take a connection)          │
//! │  4. ... reads and writes on the transaction ...                        │
//! │  5. commit, then release the locks        (drop = rollback + release)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A global key order rules out lock-order deadlocks, and taking every lock
//! before the connection means a writer never waits on a lock while holding
//! a connection, even on a single-connection pool.
//!
//! ## Lock Keys
//! - `Sequence { family, period }`: the allocator's mutual exclusion for one
//!   numbering space. Invoices and credit notes never contend.
//! - `ClientLedger(client_id)`: exposure, open balances and deposits of one
//!   billing party.
//!
//! Locks are process-local. Other processes writing the same file are caught
//! by the UNIQUE constraints and surface as conflicts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use officina_core::numbering::DocumentNumber;
use officina_core::DocumentFamily;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{DbError, DbResult};

// =============================================================================
// Lock Keys
// =============================================================================

/// Name of a transaction-scoped mutual-exclusion lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Sequence { family: DocumentFamily, period: i32 },
    ClientLedger(String),
}

impl LockKey {
    pub fn sequence(family: DocumentFamily, period: i32) -> Self {
        LockKey::Sequence { family, period }
    }

    pub fn client(client_id: impl Into<String>) -> Self {
        LockKey::ClientLedger(client_id.into())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Hands out named locks. One registry per [`crate::Database`].
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry::default()
    }

    fn handle(&self, key: &LockKey) -> DbResult<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| DbError::Internal("lock registry poisoned".to_string()))?;

        // Forget locks nobody holds or waits for.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        Ok(locks.entry(key.clone()).or_default().clone())
    }

    /// Acquires every key in canonical order.
    pub async fn acquire(&self, mut keys: Vec<LockKey>) -> DbResult<LockSet> {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = self.handle(key)?;
            debug!(key = ?key, "Acquiring ledger lock");
            guards.push(lock.lock_owned().await);
        }

        Ok(LockSet { keys, _guards: guards })
    }
}

/// Locks held for the lifetime of one ledger transaction.
#[derive(Debug)]
pub struct LockSet {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    pub fn holds(&self, key: &LockKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// One atomic ledger operation.
///
/// Dropping it without [`commit`](Self::commit) rolls back every write and
/// releases the locks.
pub struct LedgerTransaction {
    tx: Transaction<'static, Sqlite>,
    locks: LockSet,
}

impl LedgerTransaction {
    /// Takes `keys`, then opens the transaction.
    pub async fn begin(pool: &SqlitePool, registry: &LockRegistry, keys: Vec<LockKey>) -> DbResult<Self> {
        let locks = registry.acquire(keys).await?;
        let tx = pool.begin().await?;
        Ok(LedgerTransaction { tx, locks })
    }

    /// The transaction's connection, for repository calls.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Issues the next number of `(family, period)`.
    ///
    /// The caller must hold `LockKey::Sequence { family, period }`: the read
    /// of the last number and the insert of the new document must not
    /// interleave with another writer's.
    pub async fn next_number(&mut self, family: DocumentFamily, period: i32) -> DbResult<DocumentNumber> {
        if !self.locks.holds(&LockKey::sequence(family, period)) {
            return Err(DbError::Internal(format!(
                "{} numbering for {} requested without its sequence lock",
                family, period
            )));
        }

        let sql = match family {
            DocumentFamily::Invoice => "SELECT MAX(sequence) FROM invoices WHERE period = ?",
            DocumentFamily::CreditNote => "SELECT MAX(sequence) FROM credit_notes WHERE period = ?",
        };

        let last: Option<i64> = sqlx::query_scalar(sql)
            .bind(period)
            .fetch_one(&mut *self.tx)
            .await?;

        let last = last
            .map(u32::try_from)
            .transpose()
            .map_err(|_| DbError::Internal(format!("corrupt {} sequence for {}", family, period)))?;

        let number = DocumentNumber::next_after(family, period, last)?;
        debug!(number = %number, "Allocated document number");
        Ok(number)
    }

    /// Commits the writes, then releases the locks.
    pub async fn commit(self) -> DbResult<()> {
        let LedgerTransaction { tx, locks } = self;
        tx.commit().await?;
        drop(locks);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let registry = Arc::new(LockRegistry::new());
        let first = registry
            .acquire(vec![LockKey::sequence(DocumentFamily::Invoice, 2026)])
            .await
            .unwrap();

        let contender = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .acquire(vec![LockKey::sequence(DocumentFamily::Invoice, 2026)])
                    .await
                    .map(|_| ())
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_families_do_not_contend() {
        let registry = LockRegistry::new();
        let _invoices = registry
            .acquire(vec![LockKey::sequence(DocumentFamily::Invoice, 2026)])
            .await
            .unwrap();
        let credit_notes = tokio::time::timeout(
            Duration::from_millis(200),
            registry.acquire(vec![LockKey::sequence(DocumentFamily::CreditNote, 2026)]),
        )
        .await;
        assert!(credit_notes.is_ok());
    }

    #[tokio::test]
    async fn test_lock_set_reports_held_keys() {
        let registry = LockRegistry::new();
        let set = registry
            .acquire(vec![
                LockKey::client("c-2"),
                LockKey::sequence(DocumentFamily::Invoice, 2026),
                LockKey::client("c-2"),
            ])
            .await
            .unwrap();
        assert!(set.holds(&LockKey::client("c-2")));
        assert!(set.holds(&LockKey::sequence(DocumentFamily::Invoice, 2026)));
        assert!(!set.holds(&LockKey::sequence(DocumentFamily::Invoice, 2025)));
    }
}
