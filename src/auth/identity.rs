// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request identity.

use crate::storage::User;

/// Who is making the request.
///
/// Inserted into the request extensions by [`super::authenticate`]; every
/// request that passed through it carries exactly one `Identity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No `Authorization` header was sent
    Anonymous,
    /// A valid authentication token resolved to this user
    Authenticated(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use chrono::Utc;

    #[test]
    fn anonymous_has_no_user() {
        assert!(Identity::Anonymous.is_anonymous());
        assert!(Identity::Anonymous.user().is_none());
    }

    #[test]
    fn authenticated_exposes_user() {
        let now = Utc::now();
        let user = User {
            id: 7,
            created_at: now,
            updated_at: now,
            name: "Ada".into(),
            surname: "Lovelace".into(),
            email: "ada@example.com".into(),
            password_hash: "x".into(),
            role: Role::User,
            activated: true,
            version: 1,
        };
        let identity = Identity::Authenticated(user);
        assert!(!identity.is_anonymous());
        assert_eq!(identity.user().map(|u| u.id), Some(7));
    }
}
