// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! RFC 2617 digest computation (HA1, HA2, request-digest).

use serde::Deserialize;
use smol_str::SmolStr;
use std::fmt;
use subtle::ConstantTimeEq;

/// Length of a hex encoded MD5 digest.
pub const HASH_HEX_LEN: usize = 32;

/// Lowercase hex encoded MD5 digest.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HashHex(String);

impl HashHex {
    fn from_digest(digest: md5::Digest) -> Self {
        Self(hex::encode(digest.0))
    }

    /// Accepts 32 hex characters in either case.
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() != HASH_HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for HashHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for HashHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashHex({})", self.0)
    }
}

/// Digest algorithm per RFC 2617.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Md5,
    Md5Sess,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Md5Sess => "MD5-sess",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("MD5") {
            Some(Algorithm::Md5)
        } else if s.eq_ignore_ascii_case("MD5-sess") {
            Some(Algorithm::Md5Sess)
        } else {
            None
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

/// Quality of Protection (qop) options per RFC 2617.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    Auth,
    AuthInt,
}

impl Qop {
    pub fn as_str(&self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("auth") {
            Some(Qop::Auth)
        } else if s.eq_ignore_ascii_case("auth-int") {
            Some(Qop::AuthInt)
        } else {
            None
        }
    }
}

impl std::str::FromStr for Qop {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

/// Which qop the server offers in its challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QopPolicy {
    None,
    #[default]
    Auth,
    AuthInt,
}

impl QopPolicy {
    pub fn qop(self) -> Option<Qop> {
        match self {
            QopPolicy::None => None,
            QopPolicy::Auth => Some(Qop::Auth),
            QopPolicy::AuthInt => Some(Qop::AuthInt),
        }
    }
}

/// MD5 over the `:`-joined parts.
fn md5_joined(parts: &[&[u8]]) -> HashHex {
    let mut ctx = md5::Context::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            ctx.consume(b":");
        }
        ctx.consume(part);
    }
    HashHex::from_digest(ctx.compute())
}

/// HA1 for the given algorithm. `nonce` and `cnonce` are only used by MD5-sess.
pub fn calc_ha1(
    algorithm: Algorithm,
    username: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    cnonce: &str,
) -> HashHex {
    let ha1 = md5_joined(&[
        username.as_bytes(),
        realm.as_bytes(),
        password.as_bytes(),
    ]);
    match algorithm {
        Algorithm::Md5 => ha1,
        Algorithm::Md5Sess => session_ha1(&ha1, nonce, cnonce),
    }
}

/// Turns a stored `MD5(username:realm:password)` into the MD5-sess HA1.
pub fn session_ha1(ha1: &HashHex, nonce: &str, cnonce: &str) -> HashHex {
    md5_joined(&[ha1.as_bytes(), nonce.as_bytes(), cnonce.as_bytes()])
}

/// `H(entity-body)` for qop=auth-int.
pub fn entity_hash(body: &[u8]) -> HashHex {
    HashHex::from_digest(md5::compute(body))
}

pub fn calc_ha2(method: &str, uri: &str, entity: Option<&HashHex>) -> HashHex {
    match entity {
        Some(entity) => md5_joined(&[method.as_bytes(), uri.as_bytes(), entity.as_bytes()]),
        None => md5_joined(&[method.as_bytes(), uri.as_bytes()]),
    }
}

/// Request-digest. Without qop this is the RFC 2069 form and `nc`/`cnonce`
/// are ignored. `entity_hash` is only used for qop=auth-int.
#[allow(clippy::too_many_arguments)]
pub fn calc_response(
    ha1: &HashHex,
    nonce: &str,
    nc: &str,
    cnonce: &str,
    qop: Option<Qop>,
    method: &str,
    uri: &str,
    entity_hash: Option<&HashHex>,
) -> HashHex {
    let auth_int = qop == Some(Qop::AuthInt);
    let ha2 = calc_ha2(method, uri, if auth_int { entity_hash } else { None });
    match qop {
        Some(qop) => md5_joined(&[
            ha1.as_bytes(),
            nonce.as_bytes(),
            nc.as_bytes(),
            cnonce.as_bytes(),
            qop.as_str().as_bytes(),
            ha2.as_bytes(),
        ]),
        None => md5_joined(&[ha1.as_bytes(), nonce.as_bytes(), ha2.as_bytes()]),
    }
}

/// Compares the client's response with the expected digest.
pub fn check_response(received: &str, computed: &HashHex) -> bool {
    if received.len() != HASH_HEX_LEN {
        return false;
    }
    received.as_bytes().ct_eq(computed.as_bytes()).into()
}

/// Parameters of a response check, borrowed from parsed credentials.
#[derive(Debug, Clone)]
pub struct ResponseParams<'a> {
    pub algorithm: Algorithm,
    pub nonce: &'a str,
    pub nc: &'a str,
    pub cnonce: &'a str,
    pub qop: Option<Qop>,
    pub method: &'a str,
    pub uri: &'a str,
    pub body: &'a [u8],
}

/// Full server-side check against a stored `MD5(username:realm:password)`.
pub fn verify_response(stored_ha1: &HashHex, params: &ResponseParams<'_>, received: &str) -> bool {
    let ha1 = match params.algorithm {
        Algorithm::Md5 => stored_ha1.clone(),
        Algorithm::Md5Sess => session_ha1(stored_ha1, params.nonce, params.cnonce),
    };
    let entity = match params.qop {
        Some(Qop::AuthInt) => Some(entity_hash(params.body)),
        _ => None,
    };
    let expected = calc_response(
        &ha1,
        params.nonce,
        params.nc,
        params.cnonce,
        params.qop,
        params.method,
        params.uri,
        entity.as_ref(),
    );
    check_response(received, &expected)
}

/// Renders an `nc` value the way clients send it.
pub fn format_nc(nc: u32) -> SmolStr {
    SmolStr::new(format!("{:08x}", nc))
}
