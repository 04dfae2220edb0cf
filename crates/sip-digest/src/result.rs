// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Outcome codes returned to callers of the authentication engine.

use std::fmt;

/// Result of a single authentication step (`pre_auth` / `post_auth`).
///
/// Every internal failure is folded into one of these values; callers branch
/// on the variant (or on [`AuthResult::code`]) and never see an error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthResult {
    /// The nonce was valid but its replay record rejects this use.
    NonceReused,
    /// No credentials for the requested realm were found.
    NoCredentials,
    /// The nonce is authentic but outside its validity window.
    StaleNonce,
    /// Internal failure; the caller should answer with a 5xx.
    Error,
    /// The nonce or the digest response did not verify.
    NotAuthenticated,
    /// The nonce checks passed; the caller must verify the response now.
    DoAuthentication,
    /// The request is authenticated.
    Authenticated,
    /// The credentials are structurally invalid.
    BadCredentials,
    /// Reserved for AKA challenge creation. Never produced by this crate.
    CreateChallenge,
    /// Reserved for AKA resynchronization. Never produced by this crate.
    DoResynchronization,
}

impl AuthResult {
    /// Stable integer code for this outcome.
    pub fn code(self) -> i32 {
        match self {
            AuthResult::NonceReused => -5,
            AuthResult::NoCredentials => -4,
            AuthResult::StaleNonce => -3,
            AuthResult::Error => -2,
            AuthResult::NotAuthenticated => -1,
            AuthResult::DoAuthentication => 0,
            AuthResult::Authenticated => 1,
            AuthResult::BadCredentials => 2,
            AuthResult::CreateChallenge => 3,
            AuthResult::DoResynchronization => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -5 => AuthResult::NonceReused,
            -4 => AuthResult::NoCredentials,
            -3 => AuthResult::StaleNonce,
            -2 => AuthResult::Error,
            -1 => AuthResult::NotAuthenticated,
            0 => AuthResult::DoAuthentication,
            1 => AuthResult::Authenticated,
            2 => AuthResult::BadCredentials,
            3 => AuthResult::CreateChallenge,
            4 => AuthResult::DoResynchronization,
            _ => return None,
        })
    }

    /// Whether the caller should answer with a fresh 401/407 challenge.
    pub fn needs_challenge(self) -> bool {
        matches!(
            self,
            AuthResult::NotAuthenticated
                | AuthResult::NoCredentials
                | AuthResult::StaleNonce
                | AuthResult::NonceReused
        )
    }

    /// Outcomes that belong to the AKA extension.
    pub fn is_aka_reserved(self) -> bool {
        matches!(
            self,
            AuthResult::CreateChallenge | AuthResult::DoResynchronization
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthResult::NonceReused => "nonce-reused",
            AuthResult::NoCredentials => "no-credentials",
            AuthResult::StaleNonce => "stale-nonce",
            AuthResult::Error => "error",
            AuthResult::NotAuthenticated => "not-authenticated",
            AuthResult::DoAuthentication => "do-authentication",
            AuthResult::Authenticated => "authenticated",
            AuthResult::BadCredentials => "bad-credentials",
            AuthResult::CreateChallenge => "create-challenge",
            AuthResult::DoResynchronization => "do-resynchronization",
        }
    }
}

impl fmt::Display for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final verdict of a complete authentication run
/// ([`AuthOrchestrator::authenticate`](crate::AuthOrchestrator::authenticate)).
///
/// Unlike [`AuthResult`] this distinguishes an unknown user from a wrong
/// password so routing logic can decide between 401, 403 and 400 answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStatus {
    Ok,
    Error,
    InvalidPassword,
    UserUnknown,
    StaleNonce,
    NoCredentials,
    NonceReused,
    InvalidNonce,
    BadCredentials,
}

impl AuthStatus {
    pub fn code(self) -> i32 {
        match self {
            AuthStatus::Ok => 1,
            AuthStatus::Error => -1,
            AuthStatus::InvalidPassword => -2,
            AuthStatus::UserUnknown => -3,
            AuthStatus::StaleNonce => -4,
            AuthStatus::NoCredentials => -5,
            AuthStatus::NonceReused => -6,
            AuthStatus::InvalidNonce => -7,
            AuthStatus::BadCredentials => -8,
        }
    }

    pub fn is_ok(self) -> bool {
        self == AuthStatus::Ok
    }

    /// Whether the caller should send a fresh challenge, and if so whether it
    /// should carry `stale=true`.
    pub fn challenge(self) -> Option<bool> {
        match self {
            AuthStatus::StaleNonce => Some(true),
            AuthStatus::InvalidPassword
            | AuthStatus::NoCredentials
            | AuthStatus::NonceReused
            | AuthStatus::InvalidNonce => Some(false),
            AuthStatus::Ok
            | AuthStatus::Error
            | AuthStatus::UserUnknown
            | AuthStatus::BadCredentials => None,
        }
    }
}

impl From<AuthResult> for AuthStatus {
    fn from(result: AuthResult) -> Self {
        match result {
            AuthResult::Authenticated => AuthStatus::Ok,
            AuthResult::NonceReused => AuthStatus::NonceReused,
            AuthResult::NoCredentials => AuthStatus::NoCredentials,
            AuthResult::StaleNonce => AuthStatus::StaleNonce,
            AuthResult::NotAuthenticated => AuthStatus::InvalidNonce,
            AuthResult::BadCredentials => AuthStatus::BadCredentials,
            AuthResult::Error
            | AuthResult::DoAuthentication
            | AuthResult::CreateChallenge
            | AuthResult::DoResynchronization => AuthStatus::Error,
        }
    }
}
