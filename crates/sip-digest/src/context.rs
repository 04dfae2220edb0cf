// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared engine state: configuration, secrets, replay tables and the clock.

use std::sync::Arc;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::{AuthConfig, ConfigError};
use crate::mac::ExtraChecks;
use crate::replay::ReplayGuard;
use crate::request::RequestClass;
use crate::secret::Secrets;

/// Everything the challenge builder and orchestrator read.
///
/// Immutable after construction except for the atomic replay tables, so one
/// instance is shared as `Arc<AuthContext>` across all workers.
#[derive(Debug)]
pub struct AuthContext {
    config: AuthConfig,
    secrets: Secrets,
    replay: ReplayGuard,
    clock: Arc<dyn Clock>,
    up_since: u32,
}

impl AuthContext {
    pub fn new(config: AuthConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Validates `config`, resolves secrets and allocates the replay tables.
    pub fn with_clock(config: AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        let secrets = Secrets::from_config(config.secret1.as_deref(), config.secret2.as_deref());
        let replay = ReplayGuard::new(
            config.nid_pool_no,
            config.nonce_count.then_some(config.nc_array_size),
            config.one_time_nonce.then_some(config.otn_in_flight_no),
        );
        let up_since = clock.now();

        info!(
            nonce_expire = config.nonce_expire,
            nonce_count = config.nonce_count,
            one_time_nonce = config.one_time_nonce,
            pools = config.nid_pool_no,
            "digest auth context initialized"
        );

        Ok(Self {
            config,
            secrets,
            replay,
            clock,
            up_since,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    pub fn replay(&self) -> &ReplayGuard {
        &self.replay
    }

    pub fn now(&self) -> u32 {
        self.clock.now()
    }

    /// Time the context was created. Nonces with replay ids minted before
    /// this are unknown to the tables.
    pub fn up_since(&self) -> u32 {
        self.up_since
    }

    /// Removes the configured realm prefix, if present.
    pub fn strip_realm<'a>(&self, realm: &'a str) -> &'a str {
        let prefix = self.config.realm_prefix.as_str();
        if prefix.is_empty() {
            return realm;
        }
        realm.strip_prefix(prefix).unwrap_or(realm)
    }

    pub fn checks_for(&self, class: RequestClass) -> ExtraChecks {
        self.config.checks_for(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn builds_tables_from_config() {
        let config = AuthConfig::default()
            .with_nonce_count(true)
            .with_nc_array_size(100)
            .with_pools(2);
        let ctx = AuthContext::new(config).expect("context");
        assert!(ctx.replay().nc_enabled());
        assert!(!ctx.replay().otn_enabled());
        assert_eq!(ctx.replay().pools().len(), 2);
        assert_eq!(ctx.config().nc_array_size, 128);
    }

    #[test]
    fn records_start_time() {
        let clock = Arc::new(ManualClock::new(5000));
        let ctx = AuthContext::with_clock(AuthConfig::default(), clock.clone()).expect("context");
        clock.advance(10);
        assert_eq!(ctx.up_since(), 5000);
        assert_eq!(ctx.now(), 5010);
    }

    #[test]
    fn strips_realm_prefix() {
        let config = AuthConfig::default().with_realm_prefix("sip.");
        let ctx = AuthContext::new(config).expect("context");
        assert_eq!(ctx.strip_realm("sip.example.com"), "example.com");
        assert_eq!(ctx.strip_realm("example.com"), "example.com");
        let plain = AuthContext::new(AuthConfig::default()).expect("context");
        assert_eq!(plain.strip_realm("sip.example.com"), "sip.example.com");
    }

    #[test]
    fn uses_configured_secrets() {
        let config = AuthConfig::default().with_secrets("s1", "s2");
        let ctx = AuthContext::new(config).expect("context");
        assert_eq!(ctx.secrets().primary(), b"s1");
        assert_eq!(ctx.secrets().extra(), b"s2");
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(AuthContext::new(AuthConfig::default().with_nonce_expire(0)).is_err());
    }
}
