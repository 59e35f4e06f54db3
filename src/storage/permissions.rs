// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Permission grants: an append-only set of codes per user.

use redb::{MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, WriteTransaction};

use super::{Database, StoreResult};

/// Multimap: user id ⇒ permission codes.
pub(crate) const PERMISSIONS: MultimapTableDefinition<u64, &str> =
    MultimapTableDefinition::new("permissions");

/// Read access to module records.
pub const MODULES_READ: &str = "modules:read";

/// Permission codes granted to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }
}

pub(crate) fn grant_in(txn: &WriteTransaction, user_id: u64, codes: &[&str]) -> StoreResult<()> {
    let mut table = txn.open_multimap_table(PERMISSIONS)?;
    for code in codes {
        table.insert(user_id, *code)?;
    }
    Ok(())
}

pub struct PermissionRepository<'a> {
    db: &'a Database,
}

impl<'a> PermissionRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Grant `codes` to `user_id`. Granting an existing code is a no-op.
    pub fn add_for_user(&self, user_id: u64, codes: &[&str]) -> StoreResult<()> {
        let write_txn = self.db.raw().begin_write()?;
        grant_in(&write_txn, user_id, codes)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Every code granted to `user_id`, in lexical order.
    pub fn get_all_for_user(&self, user_id: u64) -> StoreResult<Permissions> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_multimap_table(PERMISSIONS)?;

        let mut codes = Vec::new();
        for value in table.get(user_id)? {
            codes.push(value?.value().to_string());
        }
        Ok(Permissions(codes))
    }
}
