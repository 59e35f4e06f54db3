// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository.
//!
//! Emails are unique through the `user_emails` index table, maintained in the
//! same write transaction as the user row. Updates are optimistic: the caller
//! supplies the version it read, and the write only lands if the stored
//! version still matches.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use redb::{ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};

use super::permissions::{self, PERMISSIONS};
use super::{next_id, tokens, Database, StoreError, StoreResult};
use crate::auth::{Role, Token, TokenScope};

/// Primary table: id → serialized User (JSON bytes).
pub(crate) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

/// Unique index: email → id.
pub(crate) const USER_EMAILS: TableDefinition<&str, u64> = TableDefinition::new("user_emails");

const USER_SEQUENCE: &str = "users";

/// User account as stored.
///
/// Carries the password hash, so it is never returned by the API directly;
/// handlers convert it into `UserResponse`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub activated: bool,
    pub version: u32,
}

/// Fields supplied when creating a user; id, timestamps and version are
/// assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub activated: bool,
}

pub(crate) fn decode_user(bytes: &[u8]) -> StoreResult<User> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Repository for user rows.
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new user, failing with `DuplicateEmail` if the address is taken.
    pub fn insert(&self, new: NewUser) -> StoreResult<User> {
        let write_txn = self.db.raw().begin_write()?;
        let user = insert_in(&write_txn, new)?;
        write_txn.commit()?;
        Ok(user)
    }

    /// Registration write: the user row, its permission grants and a fresh
    /// activation token, committed as one transaction.
    pub fn register(
        &self,
        new: NewUser,
        codes: &[&str],
        activation_ttl: Duration,
    ) -> StoreResult<(User, Token)> {
        let write_txn = self.db.raw().begin_write()?;
        let user = insert_in(&write_txn, new)?;
        permissions::grant_in(&write_txn, user.id, codes)?;
        let token = Token::generate(user.id, activation_ttl, TokenScope::Activation)?;
        tokens::insert_in(&write_txn, &token)?;
        write_txn.commit()?;
        Ok((user, token))
    }

    pub fn get(&self, id: u64) -> StoreResult<User> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(id)? {
            Some(value) => decode_user(value.value()),
            None => Err(StoreError::NotFound(format!("User {id}"))),
        }
    }

    pub fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let read_txn = self.db.raw().begin_read()?;
        let emails = read_txn.open_table(USER_EMAILS)?;
        let id = emails
            .get(email)?
            .map(|v| v.value())
            .ok_or_else(|| StoreError::NotFound(format!("User with email {email}")))?;

        let users = read_txn.open_table(USERS)?;
        match users.get(id)? {
            Some(value) => decode_user(value.value()),
            None => Err(StoreError::NotFound(format!("User {id}"))),
        }
    }

    /// All users ordered by id.
    pub fn list(&self) -> StoreResult<Vec<User>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(USERS)?;

        let mut users = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            users.push(decode_user(value.value())?);
        }
        Ok(users)
    }

    /// Compare-and-swap update.
    ///
    /// Persists every mutable field of `user` if the stored version equals
    /// `expected_version`, returning the stored row with its version bumped by
    /// one. A missing row or a version mismatch is an `EditConflict`; changing
    /// the email to one owned by another user is a `DuplicateEmail`.
    pub fn update(&self, user: &User, expected_version: u32) -> StoreResult<User> {
        let write_txn = self.db.raw().begin_write()?;
        let updated = update_in(&write_txn, user, expected_version)?;
        write_txn.commit()?;
        Ok(updated)
    }

    /// Mark `user` activated and consume all of its activation tokens.
    ///
    /// Same compare-and-swap as [`UserRepository::update`]; the flag and the
    /// token removal commit together or not at all.
    pub fn activate(&self, user: &User, expected_version: u32) -> StoreResult<User> {
        let mut activated = user.clone();
        activated.activated = true;

        let write_txn = self.db.raw().begin_write()?;
        let updated = update_in(&write_txn, &activated, expected_version)?;
        tokens::remove_matching(&write_txn, |t| {
            t.user_id == updated.id && t.scope == TokenScope::Activation
        })?;
        write_txn.commit()?;
        Ok(updated)
    }

    /// Delete a user together with its tokens and permissions.
    pub fn delete(&self, id: u64) -> StoreResult<()> {
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let removed = users.remove(id)?.map(|v| v.value().to_vec());
            let user = match removed {
                Some(bytes) => decode_user(&bytes)?,
                None => return Err(StoreError::NotFound(format!("User {id}"))),
            };

            let mut emails = write_txn.open_table(USER_EMAILS)?;
            emails.remove(user.email.as_str())?;

            let mut permissions = write_txn.open_multimap_table(PERMISSIONS)?;
            permissions.remove_all(id)?;

            tokens::remove_matching(&write_txn, |stored| stored.user_id == id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Unactivated users holding at least one activation token that expired
    /// before `now`.
    pub fn find_unactivated_with_expired_activation(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<User>> {
        let read_txn = self.db.raw().begin_read()?;
        let token_table = read_txn.open_table(tokens::TOKENS)?;

        let mut stale_owners = HashSet::new();
        for entry in token_table.iter()? {
            let (_, value) = entry?;
            let stored = tokens::decode_token(value.value())?;
            if stored.scope == TokenScope::Activation && stored.expiry < now {
                stale_owners.insert(stored.user_id);
            }
        }

        let users = read_txn.open_table(USERS)?;
        let mut result = Vec::new();
        for id in stale_owners {
            if let Some(value) = users.get(id)? {
                let user = decode_user(value.value())?;
                if !user.activated {
                    result.push(user);
                }
            }
        }
        result.sort_by_key(|u| u.id);
        Ok(result)
    }
}

fn insert_in(txn: &WriteTransaction, new: NewUser) -> StoreResult<User> {
    let mut emails = txn.open_table(USER_EMAILS)?;
    if emails.get(new.email.as_str())?.is_some() {
        return Err(StoreError::DuplicateEmail(new.email));
    }

    let id = next_id(txn, USER_SEQUENCE)?;
    let now = Utc::now();
    let user = User {
        id,
        created_at: now,
        updated_at: now,
        name: new.name,
        surname: new.surname,
        email: new.email,
        password_hash: new.password_hash,
        role: new.role,
        activated: new.activated,
        version: 1,
    };

    let json = serde_json::to_vec(&user)?;
    let mut users = txn.open_table(USERS)?;
    users.insert(id, json.as_slice())?;
    emails.insert(user.email.as_str(), id)?;
    Ok(user)
}

/// Version-checked user write inside an open write transaction.
fn update_in(txn: &WriteTransaction, user: &User, expected_version: u32) -> StoreResult<User> {
    let mut users = txn.open_table(USERS)?;
    let current = match users.get(user.id)? {
        Some(value) => decode_user(value.value())?,
        None => return Err(StoreError::EditConflict(format!("User {}", user.id))),
    };

    if current.version != expected_version {
        return Err(StoreError::EditConflict(format!(
            "User {} is at version {}, expected {expected_version}",
            user.id, current.version
        )));
    }

    let mut emails = txn.open_table(USER_EMAILS)?;
    if current.email != user.email {
        let owner = emails.get(user.email.as_str())?.map(|v| v.value());
        if owner.is_some_and(|owner| owner != user.id) {
            return Err(StoreError::DuplicateEmail(user.email.clone()));
        }
        emails.remove(current.email.as_str())?;
        emails.insert(user.email.as_str(), user.id)?;
    }

    let updated = User {
        id: current.id,
        created_at: current.created_at,
        updated_at: Utc::now(),
        name: user.name.clone(),
        surname: user.surname.clone(),
        email: user.email.clone(),
        password_hash: user.password_hash.clone(),
        role: user.role,
        activated: user.activated,
        version: current.version + 1,
    };

    let json = serde_json::to_vec(&updated)?;
    users.insert(updated.id, json.as_slice())?;
    Ok(updated)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::test_support::temp_db;
    use crate::storage::TokenRepository;

    pub(crate) fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            email: email.to_string(),
            password_hash: "$2b$04$notarealhashbutfineforstorage".to_string(),
            role: Role::User,
            activated: false,
        }
    }

    #[test]
    fn insert_assigns_id_and_version() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let first = repo.insert(new_user("ada@example.com")).unwrap();
        let second = repo.insert(new_user("grace@example.com")).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.version, 1);
        assert_eq!(repo.get(1).unwrap(), first);
        assert_eq!(repo.get_by_email("grace@example.com").unwrap(), second);
    }

    #[test]
    fn duplicate_email_rejected() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        repo.insert(new_user("ada@example.com")).unwrap();
        let result = repo.insert(new_user("ada@example.com"));
        assert!(matches!(result, Err(StoreError::DuplicateEmail(_))));
    }

    #[test]
    fn update_bumps_version() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let mut user = repo.insert(new_user("ada@example.com")).unwrap();
        user.activated = true;
        let updated = repo.update(&user, user.version).unwrap();

        assert_eq!(updated.version, 2);
        assert!(updated.activated);
        assert_eq!(repo.get(user.id).unwrap(), updated);
    }

    #[test]
    fn stale_version_is_edit_conflict() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let user = repo.insert(new_user("ada@example.com")).unwrap();
        repo.update(&user, 1).unwrap();

        let result = repo.update(&user, 1);
        assert!(matches!(result, Err(StoreError::EditConflict(_))));
    }

    #[test]
    fn concurrent_updates_from_same_version_exactly_one_wins() {
        let (db, _dir) = temp_db();
        let user = UserRepository::new(&db)
            .insert(new_user("ada@example.com"))
            .unwrap();

        let handles: Vec<_> = ["First", "Second"]
            .into_iter()
            .map(|name| {
                let db = db.clone();
                let mut edit = user.clone();
                edit.name = name.to_string();
                std::thread::spawn(move || UserRepository::new(&db).update(&edit, 1))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::EditConflict(_))))
            .count();

        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(UserRepository::new(&db).get(user.id).unwrap().version, 2);
    }

    #[test]
    fn update_to_taken_email_is_duplicate() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        repo.insert(new_user("ada@example.com")).unwrap();
        let mut grace = repo.insert(new_user("grace@example.com")).unwrap();
        grace.email = "ada@example.com".to_string();

        let result = repo.update(&grace, grace.version);
        assert!(matches!(result, Err(StoreError::DuplicateEmail(_))));
    }

    #[test]
    fn update_moves_email_index() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let mut user = repo.insert(new_user("ada@example.com")).unwrap();
        user.email = "countess@example.com".to_string();
        repo.update(&user, user.version).unwrap();

        assert!(matches!(
            repo.get_by_email("ada@example.com"),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(repo.get_by_email("countess@example.com").unwrap().id, user.id);
        // the old address is free again
        repo.insert(new_user("ada@example.com")).unwrap();
    }

    #[test]
    fn delete_cascades_to_tokens() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        let tokens = TokenRepository::new(&db);

        let user = repo.insert(new_user("ada@example.com")).unwrap();
        let token = tokens
            .new_token(user.id, Duration::hours(1), TokenScope::Authentication)
            .unwrap();

        repo.delete(user.id).unwrap();

        assert!(matches!(repo.get(user.id), Err(StoreError::NotFound(_))));
        assert!(tokens.list_for_user(user.id).unwrap().is_empty());
        assert!(matches!(
            tokens.get_user_for_token(TokenScope::Authentication, &token.plaintext),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(repo.delete(user.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn finds_only_unactivated_users_with_expired_activation() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        let tokens = TokenRepository::new(&db);

        let stale = repo.insert(new_user("stale@example.com")).unwrap();
        let fresh = repo.insert(new_user("fresh@example.com")).unwrap();
        let mut active = repo.insert(new_user("active@example.com")).unwrap();
        active.activated = true;
        repo.update(&active, active.version).unwrap();

        tokens
            .new_token(stale.id, Duration::seconds(-5), TokenScope::Activation)
            .unwrap();
        tokens
            .new_token(fresh.id, Duration::days(3), TokenScope::Activation)
            .unwrap();
        tokens
            .new_token(active.id, Duration::seconds(-5), TokenScope::Activation)
            .unwrap();

        let found = repo
            .find_unactivated_with_expired_activation(Utc::now())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, stale.id);
    }

    #[test]
    fn activate_consumes_activation_tokens_only() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        let tokens = TokenRepository::new(&db);

        let user = repo.insert(new_user("ada@example.com")).unwrap();
        let activation = tokens
            .new_token(user.id, Duration::days(3), TokenScope::Activation)
            .unwrap();
        let auth = tokens
            .new_token(user.id, Duration::hours(1), TokenScope::Authentication)
            .unwrap();

        let activated = repo.activate(&user, user.version).unwrap();

        assert!(activated.activated);
        assert_eq!(activated.version, user.version + 1);
        assert!(matches!(
            tokens.get_user_for_token(TokenScope::Activation, &activation.plaintext),
            Err(StoreError::NotFound(_))
        ));
        assert!(tokens
            .get_user_for_token(TokenScope::Authentication, &auth.plaintext)
            .is_ok());
    }

    #[test]
    fn conflicting_activation_keeps_token_valid() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        let tokens = TokenRepository::new(&db);

        let user = repo.insert(new_user("ada@example.com")).unwrap();
        let activation = tokens
            .new_token(user.id, Duration::days(3), TokenScope::Activation)
            .unwrap();
        repo.update(&user, user.version).unwrap();

        let result = repo.activate(&user, user.version);
        assert!(matches!(result, Err(StoreError::EditConflict(_))));

        assert!(!repo.get(user.id).unwrap().activated);
        assert_eq!(
            tokens
                .get_user_for_token(TokenScope::Activation, &activation.plaintext)
                .unwrap()
                .id,
            user.id
        );
    }

    #[test]
    fn register_writes_user_grants_and_activation_token() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let (user, token) = repo
            .register(
                new_user("ada@example.com"),
                &[crate::storage::permissions::MODULES_READ],
                Duration::days(3),
            )
            .unwrap();

        assert_eq!(token.scope, TokenScope::Activation);
        assert_eq!(
            TokenRepository::new(&db)
                .get_user_for_token(TokenScope::Activation, &token.plaintext)
                .unwrap()
                .id,
            user.id
        );
        assert!(crate::storage::PermissionRepository::new(&db)
            .get_all_for_user(user.id)
            .unwrap()
            .includes(crate::storage::permissions::MODULES_READ));
    }

    #[test]
    fn duplicate_registration_writes_nothing() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);
        let (first, _) = repo
            .register(new_user("ada@example.com"), &[], Duration::days(3))
            .unwrap();

        let result = repo.register(new_user("ada@example.com"), &[], Duration::days(3));
        assert!(matches!(result, Err(StoreError::DuplicateEmail(_))));
        assert_eq!(repo.list().unwrap(), vec![repo.get(first.id).unwrap()]);
        assert_eq!(TokenRepository::new(&db).list_for_user(first.id).unwrap().len(), 1);
    }
}
