// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Parsed digest credentials and the lookup that finds them in a request.

use smol_str::SmolStr;
use thiserror::Error;
use tracing::debug;

use crate::digest::{Algorithm, Qop, HASH_HEX_LEN};
use crate::request::{HeaderKind, SipRequest};

const MAX_PARAM_USERNAME_LEN: usize = 256;
const MAX_PARAM_REALM_LEN: usize = 256;
const MAX_PARAM_NONCE_LEN: usize = 128;
const MAX_PARAM_URI_LEN: usize = 2048;
const MAX_PARAM_CNONCE_LEN: usize = 256;
const MAX_PARAM_OPAQUE_LEN: usize = 256;
const NC_LEN: usize = 8;

/// Reasons credentials are rejected as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialsError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("{0} too long")]
    TooLong(&'static str),
    #[error("{0} contains invalid characters")]
    InvalidCharacters(&'static str),
    #[error("response must be 32 hex characters")]
    InvalidResponse,
    #[error("nc must be 8 hex digits")]
    InvalidNc,
    #[error("unsupported qop {0}")]
    UnsupportedQop(SmolStr),
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(SmolStr),
}

/// Digest credentials taken from an `Authorization` or `Proxy-Authorization`
/// header.
///
/// Required fields are empty when the client omitted them;
/// [`Credentials::validate`] reports that. `stale` and `nonce_retries` are
/// written by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: SmolStr,
    pub realm: SmolStr,
    pub nonce: SmolStr,
    pub uri: SmolStr,
    pub response: SmolStr,
    pub algorithm: Option<SmolStr>,
    pub qop: Option<SmolStr>,
    pub nc: Option<SmolStr>,
    pub cnonce: Option<SmolStr>,
    pub opaque: Option<SmolStr>,
    pub stale: bool,
    pub nonce_retries: u32,
}

impl Credentials {
    /// Parses a credentials header value. Returns `None` for schemes other
    /// than Digest or an empty value.
    pub fn from_header_value(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        let (scheme, remainder) = match trimmed.split_once(char::is_whitespace) {
            Some((scheme, rest)) => (scheme, rest),
            None => (trimmed, ""),
        };
        if !scheme.eq_ignore_ascii_case("Digest") {
            return None;
        }

        let mut creds = Credentials::default();
        for part in split_quoted_commas(remainder) {
            let Some((name, val)) = part.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let val = SmolStr::new(val.trim().trim_matches('"'));
            match name.to_ascii_lowercase().as_str() {
                "username" => creds.username = val,
                "realm" => creds.realm = val,
                "nonce" => creds.nonce = val,
                "uri" => creds.uri = val,
                "response" => creds.response = val,
                "algorithm" => creds.algorithm = Some(val),
                "qop" => creds.qop = Some(val),
                "nc" => creds.nc = Some(val),
                "cnonce" => creds.cnonce = Some(val),
                "opaque" => creds.opaque = Some(val),
                _ => {}
            }
        }
        Some(creds)
    }

    /// Checks that all required fields are present and well formed.
    pub fn validate(&self) -> Result<(), CredentialsError> {
        validate_required("username", &self.username, MAX_PARAM_USERNAME_LEN)?;
        validate_required("realm", &self.realm, MAX_PARAM_REALM_LEN)?;
        validate_required("nonce", &self.nonce, MAX_PARAM_NONCE_LEN)?;
        validate_required("uri", &self.uri, MAX_PARAM_URI_LEN)?;
        validate_required("response", &self.response, HASH_HEX_LEN)?;
        if self.response.len() != HASH_HEX_LEN
            || !self.response.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(CredentialsError::InvalidResponse);
        }

        if let Some(opaque) = &self.opaque {
            validate_param("opaque", opaque, MAX_PARAM_OPAQUE_LEN)?;
        }
        self.algorithm()?;

        if self.qop()?.is_some() {
            match &self.cnonce {
                Some(cnonce) if !cnonce.is_empty() => {
                    validate_param("cnonce", cnonce, MAX_PARAM_CNONCE_LEN)?
                }
                _ => return Err(CredentialsError::Missing("cnonce")),
            }
            if self.nc.as_deref().map_or(true, str::is_empty) {
                return Err(CredentialsError::Missing("nc"));
            }
            if self.nc_value().is_none() {
                return Err(CredentialsError::InvalidNc);
            }
        }
        Ok(())
    }

    /// The algorithm the client used; MD5 when the parameter is absent.
    pub fn algorithm(&self) -> Result<Algorithm, CredentialsError> {
        match self.algorithm.as_deref() {
            None | Some("") => Ok(Algorithm::Md5),
            Some(value) => Algorithm::parse(value)
                .ok_or_else(|| CredentialsError::UnsupportedAlgorithm(SmolStr::new(value))),
        }
    }

    /// The qop the client used. The token is hashed into the response as
    /// sent, so only the lowercase spelling is accepted.
    pub fn qop(&self) -> Result<Option<Qop>, CredentialsError> {
        match self.qop.as_deref() {
            None | Some("") => Ok(None),
            Some(value) => Qop::parse(value)
                .filter(|qop| qop.as_str() == value)
                .map(Some)
                .ok_or_else(|| CredentialsError::UnsupportedQop(SmolStr::new(value))),
        }
    }

    /// Nonce-count as a number, when present and exactly 8 hex digits.
    pub fn nc_value(&self) -> Option<u32> {
        let nc = self.nc.as_deref()?;
        if nc.len() != NC_LEN {
            return None;
        }
        u32::from_str_radix(nc, 16).ok()
    }

    /// Nonce-count covered by the response hash. Without qop the response
    /// does not include `nc`, so any value sent alongside is ignored.
    pub fn bound_nc(&self) -> Option<u32> {
        match self.qop() {
            Ok(Some(_)) => self.nc_value(),
            _ => None,
        }
    }
}

fn validate_required(
    name: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), CredentialsError> {
    if value.is_empty() {
        return Err(CredentialsError::Missing(name));
    }
    validate_param(name, value, max_len)
}

fn validate_param(
    name: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), CredentialsError> {
    if value.len() > max_len {
        return Err(CredentialsError::TooLong(name));
    }
    if value.contains('\0') || value.contains('\n') || value.contains('\r') {
        return Err(CredentialsError::InvalidCharacters(name));
    }
    Ok(())
}

pub(crate) fn split_quoted_commas(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                let part = input[start..idx].trim();
                if !part.is_empty() {
                    parts.push(part);
                }
                start = idx + 1;
            }
            _ => {}
        }
    }
    let tail = input[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Finds the credentials a request presents for a realm.
pub trait CredentialLookup: Send + Sync {
    fn lookup(
        &self,
        request: &dyn SipRequest,
        realm: &str,
        kind: HeaderKind,
    ) -> Option<Credentials>;
}

/// Scans `Authorization`/`Proxy-Authorization` headers for Digest
/// credentials whose realm matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderCredentialLookup;

impl CredentialLookup for HeaderCredentialLookup {
    fn lookup(
        &self,
        request: &dyn SipRequest,
        realm: &str,
        kind: HeaderKind,
    ) -> Option<Credentials> {
        let found = request
            .header_values(kind.authorization_header())
            .into_iter()
            .filter_map(Credentials::from_header_value)
            .find(|creds| creds.realm.as_str() == realm);
        if found.is_none() {
            debug!(
                realm = %realm,
                header = kind.authorization_header(),
                "no digest credentials for realm"
            );
        }
        found
    }
}
