// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Authentication engine configuration.
//!
//! Loaded from JSON or built in code with the `with_*` methods. Every field
//! has a default, so a config file only needs the values it changes:
//!
//! ```json
//! { "secret1": "cluster-wide", "nonce_count": true, "qop": "auth" }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::digest::QopPolicy;
use crate::mac::ExtraChecks;
use crate::pool::MAX_POOLS;
use crate::request::{HeaderKind, RequestClass};

pub const DEFAULT_NONCE_EXPIRE: u32 = 300;
pub const DEFAULT_MAX_DRIFT: u32 = 3;
pub const DEFAULT_NC_ARRAY_SIZE: usize = 1 << 20;
pub const DEFAULT_OTN_IN_FLIGHT: usize = 1 << 19;

/// Largest accepted table order; bigger tables are not sensible in memory.
const MAX_TABLE_ORDER: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("nonce_expire must be greater than zero")]
    ZeroNonceExpire,
    #[error("nid_pool_no must be between 1 and {max}, got {value}")]
    InvalidPoolCount { value: usize, max: usize },
    #[error("{name} order {order} is too large")]
    OrderTooLarge { name: &'static str, order: u32 },
    #[error("{name} of {size} is smaller than the {pools} nonce id pools")]
    TableTooSmall {
        name: &'static str,
        size: usize,
        pools: usize,
    },
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Key for the timestamp MAC. Random when unset.
    pub secret1: Option<String>,
    /// Key for the request-binding MAC. Random when unset.
    pub secret2: Option<String>,
    /// Nonce lifetime in seconds.
    pub nonce_expire: u32,
    /// Clock skew tolerated between cluster nodes, in seconds.
    pub nonce_auth_max_drift: u32,
    pub auth_checks_register: ExtraChecks,
    pub auth_checks_no_dlg: ExtraChecks,
    pub auth_checks_in_dlg: ExtraChecks,
    /// Enables the nonce-count ratchet.
    pub nonce_count: bool,
    pub nc_array_size: usize,
    /// When set, the nc table holds `2^order` slots and `nc_array_size` is ignored.
    pub nc_array_order: Option<u32>,
    /// Enables single-use nonces.
    pub one_time_nonce: bool,
    pub otn_in_flight_no: usize,
    pub otn_in_flight_order: Option<u32>,
    pub nid_pool_no: usize,
    pub qop: QopPolicy,
    /// Stripped from realms before credential lookup and challenges.
    pub realm_prefix: String,
    pub www_challenge_header: String,
    pub proxy_challenge_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret1: None,
            secret2: None,
            nonce_expire: DEFAULT_NONCE_EXPIRE,
            nonce_auth_max_drift: DEFAULT_MAX_DRIFT,
            auth_checks_register: ExtraChecks::NONE,
            auth_checks_no_dlg: ExtraChecks::NONE,
            auth_checks_in_dlg: ExtraChecks::NONE,
            nonce_count: false,
            nc_array_size: DEFAULT_NC_ARRAY_SIZE,
            nc_array_order: None,
            one_time_nonce: false,
            otn_in_flight_no: DEFAULT_OTN_IN_FLIGHT,
            otn_in_flight_order: None,
            nid_pool_no: 1,
            qop: QopPolicy::Auth,
            realm_prefix: String::new(),
            www_challenge_header: HeaderKind::Www.challenge_header().to_string(),
            proxy_challenge_header: HeaderKind::Proxy.challenge_header().to_string(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &Option<String>| s.as_ref().map(|_| "<redacted>");
        f.debug_struct("AuthConfig")
            .field("secret1", &redact(&self.secret1))
            .field("secret2", &redact(&self.secret2))
            .field("nonce_expire", &self.nonce_expire)
            .field("nonce_auth_max_drift", &self.nonce_auth_max_drift)
            .field("auth_checks_register", &self.auth_checks_register)
            .field("auth_checks_no_dlg", &self.auth_checks_no_dlg)
            .field("auth_checks_in_dlg", &self.auth_checks_in_dlg)
            .field("nonce_count", &self.nonce_count)
            .field("nc_array_size", &self.nc_array_size)
            .field("nc_array_order", &self.nc_array_order)
            .field("one_time_nonce", &self.one_time_nonce)
            .field("otn_in_flight_no", &self.otn_in_flight_no)
            .field("otn_in_flight_order", &self.otn_in_flight_order)
            .field("nid_pool_no", &self.nid_pool_no)
            .field("qop", &self.qop)
            .field("realm_prefix", &self.realm_prefix)
            .field("www_challenge_header", &self.www_challenge_header)
            .field("proxy_challenge_header", &self.proxy_challenge_header)
            .finish()
    }
}

impl AuthConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AuthConfig =
            serde_json::from_str(json).context("failed to parse auth config JSON")?;
        Ok(config.validate()?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read auth config {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("invalid auth config {}", path.display()))
    }

    /// Checks ranges and normalizes table geometry: pool count and table
    /// sizes become powers of two, orders are resolved into sizes, and
    /// unknown extra-check bits are dropped.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.nonce_expire == 0 {
            return Err(ConfigError::ZeroNonceExpire);
        }
        if self.nid_pool_no == 0 || self.nid_pool_no > MAX_POOLS {
            return Err(ConfigError::InvalidPoolCount {
                value: self.nid_pool_no,
                max: MAX_POOLS,
            });
        }
        self.nid_pool_no = self.nid_pool_no.next_power_of_two();

        self.nc_array_size =
            table_size("nc_array_size", self.nc_array_size, self.nc_array_order, self.nid_pool_no)?;
        self.nc_array_order = None;
        self.otn_in_flight_no = table_size(
            "otn_in_flight_no",
            self.otn_in_flight_no,
            self.otn_in_flight_order,
            self.nid_pool_no,
        )?;
        self.otn_in_flight_order = None;

        self.auth_checks_register = ExtraChecks::from_bits(self.auth_checks_register.bits());
        self.auth_checks_no_dlg = ExtraChecks::from_bits(self.auth_checks_no_dlg.bits());
        self.auth_checks_in_dlg = ExtraChecks::from_bits(self.auth_checks_in_dlg.bits());
        Ok(self)
    }

    /// Extra checks bound into nonces for a request class.
    pub fn checks_for(&self, class: RequestClass) -> ExtraChecks {
        match class {
            RequestClass::Register => self.auth_checks_register,
            RequestClass::InDialog => self.auth_checks_in_dlg,
            RequestClass::OutOfDialog => self.auth_checks_no_dlg,
        }
    }

    /// Response header name used for challenges of `kind`.
    pub fn challenge_header(&self, kind: HeaderKind) -> &str {
        match kind {
            HeaderKind::Www => &self.www_challenge_header,
            HeaderKind::Proxy => &self.proxy_challenge_header,
        }
    }

    pub fn with_secrets(mut self, secret1: impl Into<String>, secret2: impl Into<String>) -> Self {
        self.secret1 = Some(secret1.into());
        self.secret2 = Some(secret2.into());
        self
    }

    pub fn with_nonce_expire(mut self, secs: u32) -> Self {
        self.nonce_expire = secs;
        self
    }

    pub fn with_max_drift(mut self, secs: u32) -> Self {
        self.nonce_auth_max_drift = secs;
        self
    }

    pub fn with_checks(mut self, class: RequestClass, checks: ExtraChecks) -> Self {
        match class {
            RequestClass::Register => self.auth_checks_register = checks,
            RequestClass::InDialog => self.auth_checks_in_dlg = checks,
            RequestClass::OutOfDialog => self.auth_checks_no_dlg = checks,
        }
        self
    }

    pub fn with_nonce_count(mut self, enabled: bool) -> Self {
        self.nonce_count = enabled;
        self
    }

    pub fn with_nc_array_size(mut self, size: usize) -> Self {
        self.nc_array_size = size;
        self.nc_array_order = None;
        self
    }

    pub fn with_one_time_nonce(mut self, enabled: bool) -> Self {
        self.one_time_nonce = enabled;
        self
    }

    pub fn with_otn_in_flight(mut self, size: usize) -> Self {
        self.otn_in_flight_no = size;
        self.otn_in_flight_order = None;
        self
    }

    pub fn with_pools(mut self, pools: usize) -> Self {
        self.nid_pool_no = pools;
        self
    }

    pub fn with_qop(mut self, qop: QopPolicy) -> Self {
        self.qop = qop;
        self
    }

    pub fn with_realm_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.realm_prefix = prefix.into();
        self
    }

    pub fn with_challenge_headers(
        mut self,
        www: impl Into<String>,
        proxy: impl Into<String>,
    ) -> Self {
        self.www_challenge_header = www.into();
        self.proxy_challenge_header = proxy.into();
        self
    }
}

fn table_size(
    name: &'static str,
    size: usize,
    order: Option<u32>,
    pools: usize,
) -> Result<usize, ConfigError> {
    let size = match order {
        Some(order) if order > MAX_TABLE_ORDER => {
            return Err(ConfigError::OrderTooLarge { name, order });
        }
        Some(order) => 1usize << order,
        None => size.next_power_of_two(),
    };
    if size < pools || size == 0 {
        return Err(ConfigError::TableTooSmall { name, size, pools });
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AuthConfig::default().validate().expect("valid");
        assert_eq!(config.nonce_expire, 300);
        assert_eq!(config.nonce_auth_max_drift, 3);
        assert_eq!(config.nc_array_size, 1 << 20);
        assert_eq!(config.otn_in_flight_no, 1 << 19);
        assert_eq!(config.qop, QopPolicy::Auth);
        assert_eq!(config.www_challenge_header, "WWW-Authenticate");
        assert!(!config.nonce_count);
    }

    #[test]
    fn parses_partial_json() {
        let config = AuthConfig::from_json_str(
            r#"{
                "secret1": "a",
                "nonce_count": true,
                "nc_array_order": 10,
                "otn_in_flight_no": 1000,
                "nid_pool_no": 3,
                "auth_checks_no_dlg": 3,
                "qop": "auth-int",
                "realm_prefix": "sip."
            }"#,
        )
        .expect("config");
        assert_eq!(config.secret1.as_deref(), Some("a"));
        assert!(config.nonce_count);
        assert_eq!(config.nc_array_size, 1024);
        assert_eq!(config.otn_in_flight_no, 1024);
        assert_eq!(config.nid_pool_no, 4);
        assert_eq!(
            config.checks_for(RequestClass::OutOfDialog),
            ExtraChecks::FULL_URI | ExtraChecks::CALL_ID
        );
        assert_eq!(config.checks_for(RequestClass::Register), ExtraChecks::NONE);
        assert_eq!(config.qop, QopPolicy::AuthInt);
        assert_eq!(config.realm_prefix, "sip.");
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            AuthConfig::default().with_nonce_expire(0).validate().unwrap_err(),
            ConfigError::ZeroNonceExpire
        );
        assert!(matches!(
            AuthConfig::default().with_pools(65).validate(),
            Err(ConfigError::InvalidPoolCount { value: 65, .. })
        ));
        assert!(matches!(
            AuthConfig::default().with_pools(8).with_nc_array_size(4).validate(),
            Err(ConfigError::TableTooSmall { name: "nc_array_size", .. })
        ));
        let mut config = AuthConfig::default();
        config.otn_in_flight_order = Some(40);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OrderTooLarge { order: 40, .. })
        ));
        assert!(AuthConfig::from_json_str("{\"nonce_expire\": -1}").is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AuthConfig::default().with_secrets("hunter2", "hunter3");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn loads_from_file() {
        let name = format!("sip-digest-config-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, r#"{"nonce_expire": 60, "one_time_nonce": true}"#).expect("write");
        let config = AuthConfig::from_json_file(&path).expect("config");
        std::fs::remove_file(&path).ok();
        assert_eq!(config.nonce_expire, 60);
        assert!(config.one_time_nonce);
        assert!(AuthConfig::from_json_file("/nonexistent/auth.json").is_err());
    }
}
