// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token repository.
//!
//! Rows are keyed by `SHA-256(plaintext)`; the plaintext itself is never
//! written. Expiry is enforced at lookup time, so the table may transiently
//! hold logically dead rows until they are deleted by activation, login
//! cleanup or the activation sweeper.

use chrono::{DateTime, Duration, Utc};
use redb::{ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};

use super::users::{decode_user, User, USERS};
use super::{Database, StoreError, StoreResult};
use crate::auth::token::{hash_plaintext, Token, TokenScope};

/// Primary table: sha256(plaintext) → serialized StoredToken (JSON bytes).
pub(crate) const TOKENS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tokens");

/// Persisted form of a token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredToken {
    pub user_id: u64,
    pub scope: TokenScope,
    pub expiry: DateTime<Utc>,
}

pub(crate) fn decode_token(bytes: &[u8]) -> StoreResult<StoredToken> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Remove every token row accepted by `predicate` inside an open write
/// transaction. Returns the number of rows removed.
pub(crate) fn remove_matching<F>(txn: &WriteTransaction, predicate: F) -> StoreResult<usize>
where
    F: Fn(&StoredToken) -> bool,
{
    let mut table = txn.open_table(TOKENS)?;

    let mut doomed = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        if predicate(&decode_token(value.value())?) {
            doomed.push(key.value().to_vec());
        }
    }

    for key in &doomed {
        table.remove(key.as_slice())?;
    }
    Ok(doomed.len())
}

/// Write `token` inside an open write transaction.
pub(crate) fn insert_in(txn: &WriteTransaction, token: &Token) -> StoreResult<()> {
    let stored = StoredToken {
        user_id: token.user_id,
        scope: token.scope,
        expiry: token.expiry,
    };
    let json = serde_json::to_vec(&stored)?;
    let mut table = txn.open_table(TOKENS)?;
    table.insert(token.hash.as_slice(), json.as_slice())?;
    Ok(())
}

/// Repository for token rows.
pub struct TokenRepository<'a> {
    db: &'a Database,
}

impl<'a> TokenRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Issue and persist a token for `user_id`, returning it with the
    /// plaintext populated. This is the only time the plaintext exists.
    pub fn new_token(&self, user_id: u64, ttl: Duration, scope: TokenScope) -> StoreResult<Token> {
        let token = Token::generate(user_id, ttl, scope)?;
        self.insert(&token)?;
        Ok(token)
    }

    pub fn insert(&self, token: &Token) -> StoreResult<()> {
        let write_txn = self.db.raw().begin_write()?;
        insert_in(&write_txn, token)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Replace every token of `user_id` with a fresh activation token.
    ///
    /// Removal and insert commit together; on any failure the old rows stay.
    pub fn reissue_activation(&self, user_id: u64, ttl: Duration) -> StoreResult<Token> {
        self.reissue_with(user_id, || {
            Ok(Token::generate(user_id, ttl, TokenScope::Activation)?)
        })
    }

    pub(crate) fn reissue_with<F>(&self, user_id: u64, issue: F) -> StoreResult<Token>
    where
        F: FnOnce() -> StoreResult<Token>,
    {
        let write_txn = self.db.raw().begin_write()?;
        remove_matching(&write_txn, |t| t.user_id == user_id)?;
        let token = issue()?;
        insert_in(&write_txn, &token)?;
        write_txn.commit()?;
        Ok(token)
    }

    /// Resolve a plaintext token of the given scope to its owner.
    ///
    /// An unknown token, a token of another scope and an expired token all
    /// produce the same `NotFound`.
    pub fn get_user_for_token(&self, scope: TokenScope, plaintext: &str) -> StoreResult<User> {
        self.get_user_for_token_at(scope, plaintext, Utc::now())
    }

    pub fn get_user_for_token_at(
        &self,
        scope: TokenScope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let hash = hash_plaintext(plaintext);
        let not_found = || StoreError::NotFound(format!("{scope} token"));

        let read_txn = self.db.raw().begin_read()?;
        let tokens = read_txn.open_table(TOKENS)?;
        let stored = match tokens.get(hash.as_slice())? {
            Some(value) => decode_token(value.value())?,
            None => return Err(not_found()),
        };

        if stored.scope != scope || stored.expiry <= now {
            return Err(not_found());
        }

        let users = read_txn.open_table(USERS)?;
        match users.get(stored.user_id)? {
            Some(value) => decode_user(value.value()),
            None => Err(not_found()),
        }
    }

    /// Delete every token of `scope` owned by `user_id`. Succeeds when
    /// nothing matches.
    pub fn delete_all_for_user(&self, scope: TokenScope, user_id: u64) -> StoreResult<()> {
        let write_txn = self.db.raw().begin_write()?;
        remove_matching(&write_txn, |t| t.user_id == user_id && t.scope == scope)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Delete every token owned by `user_id`, whatever its scope.
    ///
    /// Used by the activation sweeper before reissuing: it also clears any
    /// authentication tokens the unactivated account may hold.
    pub fn delete_all_tokens_for_user(&self, user_id: u64) -> StoreResult<usize> {
        let write_txn = self.db.raw().begin_write()?;
        let removed = remove_matching(&write_txn, |t| t.user_id == user_id)?;
        write_txn.commit()?;
        Ok(removed)
    }

    /// All token rows owned by `user_id`, expired ones included.
    pub fn list_for_user(&self, user_id: u64) -> StoreResult<Vec<StoredToken>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(TOKENS)?;

        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let stored = decode_token(value.value())?;
            if stored.user_id == user_id {
                result.push(stored);
            }
        }
        Ok(result)
    }
}
