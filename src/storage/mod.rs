// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Embedded relational storage backed by **redb** (pure Rust, ACID).
//!
//! Each relation lives in its own table and is accessed through a typed
//! repository borrowing the shared [`Database`] handle:
//!
//! ```text
//! users          id → User (JSON)
//! user_emails    email → id            (unique constraint)
//! tokens         sha256(plaintext) → StoredToken (JSON)
//! permissions    id ⇒ {code, ...}      (multimap)
//! module_infos   id → ModuleInfo (JSON)
//! departments    id → DepartmentInfo (JSON)
//! sequences      name → next id
//! ```
//!
//! ## Concurrency
//!
//! redb serializes write transactions, so every read-check-write sequence
//! that runs inside a single write transaction (duplicate email checks,
//! version compare-and-swap) is atomic with respect to other writers.
//!
//! Repositories are synchronous. Async callers go through [`Database::call`],
//! which runs the closure on the blocking pool under an absolute deadline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{ReadableTable, TableDefinition, WriteTransaction};

pub mod departments;
pub mod modules;
pub mod permissions;
pub mod tokens;
pub mod users;

pub use departments::{DepartmentInfo, DepartmentRepository, NewDepartmentInfo};
pub use modules::{ModuleInfo, ModuleRepository, NewModuleInfo};
pub use permissions::{PermissionRepository, Permissions};
pub use tokens::{StoredToken, TokenRepository};
pub use users::{NewUser, User, UserRepository};

// =============================================================================
// Table Definitions
// =============================================================================

/// Sequence counters: sequence name → last issued id.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Default absolute deadline for a single storage call.
pub const STORAGE_DEADLINE: Duration = Duration::from_secs(3);

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("token generation failed: {0}")]
    Token(#[from] crate::auth::token::TokenError),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate email: {0}")]
    DuplicateEmail(String),

    #[error("edit conflict: {0}")]
    EditConflict(String),

    #[error("storage deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the embedded database.
///
/// Cloning is cheap; all clones refer to the same redb file.
#[derive(Clone)]
pub struct Database {
    db: Arc<redb::Database>,
    deadline: Duration,
    #[cfg(test)]
    stall: Duration,
}

impl Database {
    /// Open (or create) the database at the given path and make sure every
    /// table exists so later read transactions don't fail.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = redb::Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SEQUENCES)?;
            let _ = write_txn.open_table(users::USERS)?;
            let _ = write_txn.open_table(users::USER_EMAILS)?;
            let _ = write_txn.open_table(tokens::TOKENS)?;
            let _ = write_txn.open_multimap_table(permissions::PERMISSIONS)?;
            let _ = write_txn.open_table(modules::MODULE_INFOS)?;
            let _ = write_txn.open_table(departments::DEPARTMENTS)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            deadline: STORAGE_DEADLINE,
            #[cfg(test)]
            stall: Duration::ZERO,
        })
    }

    /// Override the per-call deadline used by [`Database::call`].
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Delay every [`Database::call`] closure, to drive the deadline path.
    #[cfg(test)]
    pub(crate) fn with_stall(mut self, stall: Duration) -> Self {
        self.stall = stall;
        self
    }

    pub(crate) fn raw(&self) -> &redb::Database {
        &self.db
    }

    /// Run a synchronous storage closure on the blocking pool.
    ///
    /// The call fails with [`StoreError::Timeout`] when the deadline passes,
    /// which callers must treat as a storage failure and never as "not found".
    pub async fn call<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        let task = tokio::task::spawn_blocking(move || {
            #[cfg(test)]
            std::thread::sleep(db.stall);
            f(&db)
        });

        match tokio::time::timeout(self.deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(StoreError::Task(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.deadline)),
        }
    }
}

/// Allocate the next id of a named sequence inside an open write transaction.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> StoreResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(sequence)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next)?;
    Ok(next)
}
