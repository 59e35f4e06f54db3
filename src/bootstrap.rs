// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup seeding.

use crate::{
    auth::{password, Role},
    config::SeedAdmin,
    storage::{
        permissions::MODULES_READ, Database, NewUser, PermissionRepository, StoreError,
        UserRepository,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to hash admin password: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("failed to spawn hashing task: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create the configured admin account. Returns `false` if the email is taken.
pub async fn seed_admin(db: &Database, admin: &SeedAdmin) -> Result<bool, BootstrapError> {
    let plaintext = admin.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || password::hash(&plaintext)).await??;

    let new = NewUser {
        name: "Admin".to_string(),
        surname: "Admin".to_string(),
        email: admin.email.clone(),
        password_hash,
        role: Role::Admin,
        activated: true,
    };
    let result = db
        .call(move |db| {
            let user = UserRepository::new(db).insert(new)?;
            PermissionRepository::new(db).add_for_user(user.id, &[MODULES_READ])?;
            Ok(user)
        })
        .await;

    match result {
        Ok(user) => {
            tracing::info!(user_id = user.id, email = %user.email, "seeded admin account");
            Ok(true)
        }
        Err(StoreError::DuplicateEmail(email)) => {
            tracing::debug!(%email, "admin account already present");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
