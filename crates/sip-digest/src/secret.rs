// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! MAC keys used to sign nonces.

use rand::{thread_rng, RngCore};
use std::fmt;

/// Length of randomly generated secrets.
pub const RAND_SECRET_LEN: usize = 32;

/// The two nonce keys: `primary` signs the timestamps and replay id,
/// `extra` signs the request-binding fields.
///
/// Nodes of a cluster must share both values for nonces minted on one node
/// to validate on another.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    primary: Vec<u8>,
    extra: Vec<u8>,
}

impl Secrets {
    pub fn new(primary: impl Into<Vec<u8>>, extra: impl Into<Vec<u8>>) -> Self {
        Self {
            primary: primary.into(),
            extra: extra.into(),
        }
    }

    /// Generates two independent random secrets.
    pub fn generate() -> Self {
        Self {
            primary: random_secret(),
            extra: random_secret(),
        }
    }

    /// Uses the configured values, generating any that are missing or empty.
    pub fn from_config(primary: Option<&str>, extra: Option<&str>) -> Self {
        let pick = |value: Option<&str>| match value {
            Some(v) if !v.is_empty() => v.as_bytes().to_vec(),
            _ => random_secret(),
        };
        Self {
            primary: pick(primary),
            extra: pick(extra),
        }
    }

    pub fn primary(&self) -> &[u8] {
        &self.primary
    }

    pub fn extra(&self) -> &[u8] {
        &self.extra
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("primary", &format_args!("<{} bytes>", self.primary.len()))
            .field("extra", &format_args!("<{} bytes>", self.extra.len()))
            .finish()
    }
}

fn random_secret() -> Vec<u8> {
    let mut bytes = vec![0u8; RAND_SECRET_LEN];
    thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_independent() {
        let secrets = Secrets::generate();
        assert_eq!(secrets.primary().len(), RAND_SECRET_LEN);
        assert_eq!(secrets.extra().len(), RAND_SECRET_LEN);
        assert_ne!(secrets.primary(), secrets.extra());
    }

    #[test]
    fn configured_values_are_kept() {
        let secrets = Secrets::from_config(Some("s1"), Some(""));
        assert_eq!(secrets.primary(), b"s1");
        assert_eq!(secrets.extra().len(), RAND_SECRET_LEN);
    }

    #[test]
    fn debug_does_not_leak() {
        let secrets = Secrets::new("topsecret", "other");
        let printed = format!("{:?}", secrets);
        assert!(!printed.contains("topsecret"));
    }
}
