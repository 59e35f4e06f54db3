// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password hashing (bcrypt).

/// bcrypt work factor.
pub const BCRYPT_COST: u32 = 12;

/// Hash a plaintext password for storage.
pub fn hash(plaintext: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plaintext, BCRYPT_COST)
}

/// Check a plaintext password against a stored hash.
///
/// A malformed stored hash is reported as an error rather than a mismatch.
pub fn matches(plaintext: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(plaintext, hash)
}
