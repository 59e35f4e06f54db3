// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Opaque bearer token codec.
//!
//! A token is 16 bytes from the system CSPRNG, encoded as unpadded RFC 4648
//! base32 (26 characters). Only `SHA-256(plaintext)` is ever persisted; the
//! plaintext leaves the server exactly once, in the issuing response or the
//! activation email.

use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Number of random bytes behind every token.
const TOKEN_ENTROPY_BYTES: usize = 16;

/// Length of the base32 plaintext produced from [`TOKEN_ENTROPY_BYTES`].
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

/// Lifetime of activation tokens, in days.
pub const ACTIVATION_TTL_DAYS: i64 = 3;

/// Lifetime of authentication tokens, in hours.
pub const AUTHENTICATION_TTL_HOURS: i64 = 24;

const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648 { padding: false };

/// What a token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    /// Single-use token mailed after registration.
    Activation,
    /// Bearer token for the `Authorization` header.
    Authentication,
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenScope::Activation => write!(f, "activation"),
            TokenScope::Authentication => write!(f, "authentication"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("system random number generator unavailable")]
    Entropy,

    #[error("token must be {TOKEN_PLAINTEXT_LEN} characters long")]
    Length,

    #[error("token contains characters outside the base32 alphabet")]
    Charset,
}

/// A freshly issued token. The plaintext is only held in memory.
#[derive(Debug, Clone)]
pub struct Token {
    pub plaintext: String,
    pub hash: [u8; 32],
    pub user_id: u64,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl Token {
    /// Generate a token for `user_id` valid for `ttl` from now.
    pub fn generate(user_id: u64, ttl: Duration, scope: TokenScope) -> Result<Self, TokenError> {
        let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| TokenError::Entropy)?;

        let plaintext = base32::encode(BASE32, &bytes);
        let hash = hash_plaintext(&plaintext);

        Ok(Self {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        })
    }
}

/// SHA-256 over the plaintext bytes; the only form used for storage lookups.
pub fn hash_plaintext(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Reject anything that cannot have been produced by [`Token::generate`].
pub fn validate_plaintext(plaintext: &str) -> Result<(), TokenError> {
    if plaintext.len() != TOKEN_PLAINTEXT_LEN {
        return Err(TokenError::Length);
    }
    if !plaintext
        .bytes()
        .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
    {
        return Err(TokenError::Charset);
    }
    Ok(())
}
