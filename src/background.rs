// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded, drainable set of background email sends.
//!
//! Each send is a tracked task holding a semaphore permit, so at most
//! `max_concurrent` deliveries run at once. On shutdown the set is closed and
//! [`BackgroundTasks::shutdown`] waits for in-flight sends to finish.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::mailer::Mailer;

#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    mailer: Arc<dyn Mailer>,
}

impl BackgroundTasks {
    pub fn new(mailer: Arc<dyn Mailer>, max_concurrent: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            mailer,
        }
    }

    /// Queue an email. Failures are logged inside the task and never retried.
    pub fn send_email(&self, to: String, template: &'static str, data: Value) {
        if self.tracker.is_closed() {
            error!(to_email = %to, template, "background tasks closed, email dropped");
            return;
        }

        let permits = self.permits.clone();
        let mailer = self.mailer.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                error!(to_email = %to, template, "email semaphore closed");
                return;
            };

            let recipient = to.clone();
            let result =
                tokio::task::spawn_blocking(move || mailer.send(&recipient, template, &data)).await;

            match result {
                Ok(Ok(())) => debug!(to_email = %to, template, "email sent"),
                Ok(Err(e)) => error!(to_email = %to, template, error = %e, "email send failed"),
                Err(e) => error!(to_email = %to, template, error = %e, "email task panicked"),
            }
        });
    }

    /// Number of sends queued or in flight.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Stop accepting work and wait for every queued send to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::tests::RecordingMailer;
    use crate::mailer::USER_WELCOME_TEMPLATE;

    #[tokio::test]
    async fn shutdown_drains_queued_sends() {
        let mailer = Arc::new(RecordingMailer::default());
        let tasks = BackgroundTasks::new(mailer.clone(), 2);

        for i in 0..5 {
            tasks.send_email(
                format!("user{i}@example.com"),
                USER_WELCOME_TEMPLATE,
                serde_json::json!({"userInfoID": i}),
            );
        }
        tasks.shutdown().await;

        assert!(tasks.is_empty());
        assert_eq!(mailer.sent().len(), 5);
    }

    #[tokio::test]
    async fn sends_after_shutdown_are_dropped() {
        let mailer = Arc::new(RecordingMailer::default());
        let tasks = BackgroundTasks::new(mailer.clone(), 1);
        tasks.shutdown().await;

        tasks.send_email(
            "late@example.com".to_string(),
            USER_WELCOME_TEMPLATE,
            Value::Null,
        );
        assert!(mailer.sent().is_empty());
    }
}
