// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `WWW-Authenticate` / `Proxy-Authenticate` header rendering.

use thiserror::Error;
use tracing::info;

use crate::context::AuthContext;
use crate::digest::{Algorithm, QopPolicy};
use crate::mac;
use crate::nonce::{self, MAX_NONCE_LEN};
use crate::request::{HeaderKind, SipRequest};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("failed to allocate challenge header")]
    Allocation,
    #[error("nonce of {len} characters exceeds the {max} character limit")]
    NonceTooLong { len: usize, max: usize },
}

const DIGEST_REALM: &str = ": Digest realm=\"";
const NONCE_PARAM: &str = ", nonce=\"";
const QOP_PARAM: &str = ", qop=\"";
const STALE_PARAM: &str = ", stale=true";
const ALGORITHM_PARAM: &str = ", algorithm=";
const CRLF: &str = "\r\n";

/// Inputs for one challenge header.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeParams<'a> {
    pub realm: &'a str,
    pub kind: HeaderKind,
    pub stale: bool,
    /// Reused verbatim when set; otherwise a fresh nonce is minted.
    pub nonce: Option<&'a str>,
    /// Rendered only when set.
    pub algorithm: Option<Algorithm>,
    pub qop: QopPolicy,
}

impl<'a> ChallengeParams<'a> {
    pub fn new(realm: &'a str, kind: HeaderKind) -> Self {
        Self {
            realm,
            kind,
            stale: false,
            nonce: None,
            algorithm: None,
            qop: QopPolicy::Auth,
        }
    }

    pub fn with_stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }

    pub fn with_nonce(mut self, nonce: &'a str) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_qop(mut self, qop: QopPolicy) -> Self {
        self.qop = qop;
        self
    }
}

/// Mints nonces and renders challenges against a shared context.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeBuilder<'a> {
    ctx: &'a AuthContext,
}

impl<'a> ChallengeBuilder<'a> {
    pub fn new(ctx: &'a AuthContext) -> Self {
        Self { ctx }
    }

    /// Creates a signed nonce for `request`, valid from now for
    /// `nonce_expire` seconds.
    pub fn mint_nonce(&self, request: &dyn SipRequest, qop: QopPolicy) -> String {
        let now = self.ctx.now();
        let expire = now.saturating_add(self.ctx.config().nonce_expire);
        let replay = self.ctx.replay().mint(qop.qop().is_some());
        let checks = self.ctx.checks_for(request.class());
        let nonce = mac::sign(expire, now, replay, request, checks, self.ctx.secrets());
        nonce::encode(&nonce)
    }

    /// Renders `<Header>: Digest realm="..", nonce=".."` followed by the
    /// optional `qop`, `stale` and `algorithm` parameters and a CRLF.
    pub fn build(
        &self,
        request: &dyn SipRequest,
        params: &ChallengeParams<'_>,
    ) -> Result<String, ChallengeError> {
        if let Some(nonce) = params.nonce {
            if nonce.len() > MAX_NONCE_LEN {
                return Err(ChallengeError::NonceTooLong {
                    len: nonce.len(),
                    max: MAX_NONCE_LEN,
                });
            }
        }
        let minted;
        let nonce = match params.nonce {
            Some(nonce) => nonce,
            None => {
                minted = self.mint_nonce(request, params.qop);
                minted.as_str()
            }
        };

        let header = self.ctx.config().challenge_header(params.kind);
        let qop = params.qop.qop().map(|qop| qop.as_str());
        let algorithm = params.algorithm.map(|alg| alg.as_str());

        let capacity = header.len()
            + DIGEST_REALM.len()
            + params.realm.len()
            + 1
            + NONCE_PARAM.len()
            + nonce.len()
            + 1
            + qop.map_or(0, |q| QOP_PARAM.len() + q.len() + 1)
            + if params.stale { STALE_PARAM.len() } else { 0 }
            + algorithm.map_or(0, |a| ALGORITHM_PARAM.len() + a.len())
            + CRLF.len();

        let mut out = String::new();
        out.try_reserve_exact(capacity)
            .map_err(|_| ChallengeError::Allocation)?;

        out.push_str(header);
        out.push_str(DIGEST_REALM);
        out.push_str(params.realm);
        out.push('"');
        out.push_str(NONCE_PARAM);
        out.push_str(nonce);
        out.push('"');
        if let Some(qop) = qop {
            out.push_str(QOP_PARAM);
            out.push_str(qop);
            out.push('"');
        }
        if params.stale {
            out.push_str(STALE_PARAM);
        }
        if let Some(algorithm) = algorithm {
            out.push_str(ALGORITHM_PARAM);
            out.push_str(algorithm);
        }
        out.push_str(CRLF);

        info!(
            realm = %params.realm,
            proxy = params.kind == HeaderKind::Proxy,
            stale = params.stale,
            "issuing digest challenge"
        );
        Ok(out)
    }
}
