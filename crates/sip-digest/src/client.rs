// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UAC side: reading challenges and answering them.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use smol_str::SmolStr;

use crate::credentials::split_quoted_commas;
use crate::digest::{calc_ha1, calc_response, entity_hash, format_nc, Algorithm, Qop};
use crate::request::Method;

/// Parameters of a received `WWW-Authenticate` / `Proxy-Authenticate` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    pub realm: SmolStr,
    pub nonce: SmolStr,
    pub qop: Option<SmolStr>,
    pub algorithm: Option<SmolStr>,
    pub opaque: Option<SmolStr>,
    pub stale: bool,
}

impl Challenge {
    /// Parses a Digest challenge. Accepts either the header value or a full
    /// `Name: value\r\n` line.
    pub fn parse(input: &str) -> Option<Self> {
        let mut value = input.trim();
        if let Some((name, rest)) = value.split_once(':') {
            if !name.contains(char::is_whitespace) && !name.contains('=') {
                value = rest.trim();
            }
        }
        let (scheme, remainder) = value.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("Digest") {
            return None;
        }

        let mut challenge = Challenge::default();
        for part in split_quoted_commas(remainder) {
            let Some((name, val)) = part.split_once('=') else {
                continue;
            };
            let val = SmolStr::new(val.trim().trim_matches('"'));
            match name.trim().to_ascii_lowercase().as_str() {
                "realm" => challenge.realm = val,
                "nonce" => challenge.nonce = val,
                "qop" => challenge.qop = Some(val),
                "algorithm" => challenge.algorithm = Some(val),
                "opaque" => challenge.opaque = Some(val),
                "stale" => challenge.stale = val.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }
        if challenge.realm.is_empty() {
            return None;
        }
        Some(challenge)
    }

    /// First offered qop this client supports, preferring `auth`.
    pub fn preferred_qop(&self) -> Option<Qop> {
        let offered = self.qop.as_deref()?;
        let options: Vec<Qop> = offered.split(',').filter_map(|q| Qop::parse(q.trim())).collect();
        if options.contains(&Qop::Auth) {
            Some(Qop::Auth)
        } else {
            options.first().copied()
        }
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        match self.algorithm.as_deref() {
            None => Some(Algorithm::Md5),
            Some(alg) => Algorithm::parse(alg),
        }
    }
}

/// Builds `Authorization` values for one user, counting nonce uses.
#[derive(Debug, Clone)]
pub struct DigestClient {
    username: SmolStr,
    password: SmolStr,
    nc: u32,
    last_nonce: SmolStr,
}

impl DigestClient {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: SmolStr::new(username),
            password: SmolStr::new(password),
            nc: 0,
            last_nonce: SmolStr::default(),
        }
    }

    /// Answers `challenge`. The nonce count restarts whenever the nonce changes.
    pub fn authorize(
        &mut self,
        challenge: &Challenge,
        method: &Method,
        uri: &str,
        body: &[u8],
    ) -> Option<String> {
        let cnonce: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        self.authorize_with_cnonce(challenge, method, uri, body, &cnonce)
    }

    /// Same as [`DigestClient::authorize`] with a caller-chosen cnonce.
    pub fn authorize_with_cnonce(
        &mut self,
        challenge: &Challenge,
        method: &Method,
        uri: &str,
        body: &[u8],
        cnonce: &str,
    ) -> Option<String> {
        let algorithm = challenge.algorithm()?;
        let qop = challenge.preferred_qop();
        if challenge.nonce != self.last_nonce {
            self.last_nonce = challenge.nonce.clone();
            self.nc = 0;
        }
        self.nc = self.nc.wrapping_add(1);
        let nc = format_nc(self.nc);

        let ha1 = calc_ha1(
            algorithm,
            &self.username,
            &challenge.realm,
            &self.password,
            &challenge.nonce,
            cnonce,
        );
        let entity = (qop == Some(Qop::AuthInt)).then(|| entity_hash(body));
        let response = calc_response(
            &ha1,
            &challenge.nonce,
            &nc,
            cnonce,
            qop,
            method.as_str(),
            uri,
            entity.as_ref(),
        );

        let mut auth = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm={}",
            self.username,
            challenge.realm,
            challenge.nonce,
            uri,
            response,
            algorithm.as_str()
        );
        if let Some(qop) = qop {
            auth.push_str(&format!(
                ", qop={}, nc={}, cnonce=\"{}\"",
                qop.as_str(),
                nc,
                cnonce
            ));
        }
        if let Some(opaque) = &challenge.opaque {
            auth.push_str(&format!(", opaque=\"{}\"", opaque));
        }
        Some(auth)
    }

    /// Forces the next request to use `nc`, for exercising replay handling.
    pub fn set_nc(&mut self, nc: u32) {
        self.nc = nc.wrapping_sub(1);
    }
}
