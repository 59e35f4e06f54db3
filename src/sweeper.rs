// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Activation Sweeper
//!
//! Background task that re-sends activation emails to accounts that never
//! activated and whose activation token has expired.
//!
//! ## Strategy
//!
//! Every `interval` (default one hour) the sweeper:
//! 1. Lists unactivated users holding an expired activation token.
//! 2. For each, deletes every token the user owns (all scopes), mints a new
//!    activation token valid for three days and queues a `user_welcome`
//!    email on the background task set. Deletion and the new token commit
//!    in one write transaction, so a failed reissue leaves the user
//!    discoverable by the next sweep.
//!
//! The read and the reissue are separate transactions; a user activating
//! between the two still receives one extra email.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`. A storage failure while listing
//! candidates ends the loop; the server keeps running without the sweeper.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::auth::token::ACTIVATION_TTL_DAYS;
use crate::background::BackgroundTasks;
use crate::mailer::USER_WELCOME_TEMPLATE;
use crate::storage::{Database, StoreResult, TokenRepository, UserRepository};

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub struct ActivationSweeper {
    db: Database,
    tasks: BackgroundTasks,
    interval: Duration,
}

impl ActivationSweeper {
    pub fn new(db: Database, tasks: BackgroundTasks) -> Self {
        Self {
            db,
            tasks,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweeper loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Activation sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Activation sweeper shutting down");
                return;
            }

            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "Activation sweeper: listing candidates failed, stopping");
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Activation sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep. Returns the number of activation emails queued.
    ///
    /// Only a failure to list candidates is returned; per-user failures are
    /// logged and skipped.
    pub async fn sweep_once(&self) -> StoreResult<usize> {
        let users = self
            .db
            .call(|db| {
                UserRepository::new(db).find_unactivated_with_expired_activation(chrono::Utc::now())
            })
            .await?;

        if users.is_empty() {
            return Ok(0);
        }

        info!(
            count = users.len(),
            "Activation sweeper: reissuing expired activation tokens"
        );

        let mut queued = 0;
        for user in users {
            let user_id = user.id;
            let reissued = self
                .db
                .call(move |db| {
                    TokenRepository::new(db)
                        .reissue_activation(user_id, chrono::Duration::days(ACTIVATION_TTL_DAYS))
                })
                .await;

            let token = match reissued {
                Ok(token) => token,
                Err(e) => {
                    warn!(user_id, error = %e, "Activation sweeper: failed to reissue token");
                    continue;
                }
            };

            self.tasks.send_email(
                user.email,
                USER_WELCOME_TEMPLATE,
                serde_json::json!({
                    "activationToken": token.plaintext,
                    "userInfoID": user_id,
                }),
            );
            queued += 1;
        }
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenScope;
    use crate::mailer::tests::RecordingMailer;
    use crate::storage::test_support::temp_db;
    use crate::storage::users::tests::new_user;
    use crate::storage::StoredToken;
    use std::sync::Arc;

    /// Insert a user holding an activation token that expired a minute ago.
    fn user_with_expired_activation(db: &Database, email: &str, activated: bool) -> u64 {
        let mut new = new_user(email);
        new.activated = activated;
        let user = UserRepository::new(db).insert(new).unwrap();
        TokenRepository::new(db)
            .new_token(user.id, chrono::Duration::minutes(-1), TokenScope::Activation)
            .unwrap();
        user.id
    }

    #[tokio::test]
    async fn sweep_reissues_one_token_and_one_mail() {
        let (db, _dir) = temp_db();
        let mailer = Arc::new(RecordingMailer::default());
        let tasks = BackgroundTasks::new(mailer.clone(), 4);

        let stale = user_with_expired_activation(&db, "ada@example.com", false);
        TokenRepository::new(&db)
            .new_token(stale, chrono::Duration::hours(1), TokenScope::Authentication)
            .unwrap();

        let sweeper = ActivationSweeper::new(db.clone(), tasks.clone());
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        tasks.shutdown().await;

        let remaining: Vec<StoredToken> = TokenRepository::new(&db).list_for_user(stale).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].scope, TokenScope::Activation);
        assert!(remaining[0].expiry > chrono::Utc::now() + chrono::Duration::days(2));

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert_eq!(sent[0].template, USER_WELCOME_TEMPLATE);
        assert_eq!(sent[0].data["userInfoID"], stale);

        let plaintext = sent[0].data["activationToken"].as_str().unwrap();
        let owner = TokenRepository::new(&db)
            .get_user_for_token(TokenScope::Activation, plaintext)
            .unwrap();
        assert_eq!(owner.id, stale);
    }

    #[tokio::test]
    async fn sweep_skips_activated_and_unexpired() {
        let (db, _dir) = temp_db();
        let mailer = Arc::new(RecordingMailer::default());
        let tasks = BackgroundTasks::new(mailer.clone(), 4);

        user_with_expired_activation(&db, "done@example.com", true);
        let pending = UserRepository::new(&db)
            .insert(new_user("pending@example.com"))
            .unwrap();
        TokenRepository::new(&db)
            .new_token(pending.id, chrono::Duration::days(3), TokenScope::Activation)
            .unwrap();

        let sweeper = ActivationSweeper::new(db.clone(), tasks.clone());
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        tasks.shutdown().await;
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (db, _dir) = temp_db();
        let tasks = BackgroundTasks::new(Arc::new(RecordingMailer::default()), 1);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(
            ActivationSweeper::new(db, tasks)
                .with_interval(Duration::from_secs(3600))
                .run(shutdown.clone()),
        );
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
