// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::background::BackgroundTasks;
use crate::config::Config;
use crate::mailer::Mailer;
use crate::ratelimit::RateLimiter;
use crate::storage::Database;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub tasks: BackgroundTasks,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config, db: Database, mailer: Arc<dyn Mailer>) -> Self {
        let tasks = BackgroundTasks::new(mailer, config.max_concurrent_emails);
        let limiter = RateLimiter::new(config.limiter);
        Self {
            config: Arc::new(config),
            db,
            tasks,
            limiter,
        }
    }
}
