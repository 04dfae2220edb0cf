// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyed integrity tags embedded in nonces.
//!
//! `mac1` covers the timestamps and replay id under the primary secret.
//! `mac2` binds the nonce to parts of the request (URI, Call-ID, From-tag,
//! source address) under the extra secret, so a nonce captured from one
//! request cannot be replayed against another.

use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use subtle::ConstantTimeEq;

use crate::nonce::{Nonce, ReplayId, MAC_LEN};
use crate::request::SipRequest;
use crate::secret::Secrets;

/// Bit mask of request fields bound into `mac2`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraChecks(u8);

impl ExtraChecks {
    pub const NONE: ExtraChecks = ExtraChecks(0);
    pub const FULL_URI: ExtraChecks = ExtraChecks(0x01);
    pub const CALL_ID: ExtraChecks = ExtraChecks(0x02);
    pub const FROM_TAG: ExtraChecks = ExtraChecks(0x04);
    pub const SRC_IP: ExtraChecks = ExtraChecks(0x08);

    const ALL: u8 = 0x0f;

    /// Unknown bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ExtraChecks) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ExtraChecks {
    type Output = ExtraChecks;

    fn bitor(self, rhs: ExtraChecks) -> ExtraChecks {
        ExtraChecks(self.0 | rhs.0)
    }
}

/// `MD5(expire | since | [nonce_id | pool_flags] | secret1)`.
pub fn mac1(expire: u32, since: u32, replay: Option<ReplayId>, secret1: &[u8]) -> [u8; MAC_LEN] {
    let mut ctx = md5::Context::new();
    ctx.consume(expire.to_be_bytes());
    ctx.consume(since.to_be_bytes());
    if let Some(replay) = replay {
        ctx.consume(replay.nonce_id.to_be_bytes());
        ctx.consume([replay.flags.bits()]);
    }
    ctx.consume(secret1);
    ctx.compute().0
}

/// Canonical byte form of the request fields selected by `checks`.
///
/// The mask byte comes first, then every enabled field in bit order as a
/// big-endian u32 length and the field bytes. Missing fields have length 0.
pub fn extra_fields(request: &dyn SipRequest, checks: ExtraChecks) -> Vec<u8> {
    let mut out = vec![checks.bits()];
    let mut push = |field: &[u8]| {
        out.extend_from_slice(&(field.len() as u32).to_be_bytes());
        out.extend_from_slice(field);
    };
    if checks.contains(ExtraChecks::FULL_URI) {
        push(request.request_uri().as_bytes());
    }
    if checks.contains(ExtraChecks::CALL_ID) {
        push(request.call_id().unwrap_or_default().as_bytes());
    }
    if checks.contains(ExtraChecks::FROM_TAG) {
        push(request.from_tag().unwrap_or_default().as_bytes());
    }
    if checks.contains(ExtraChecks::SRC_IP) {
        push(request.source_ip().to_string().as_bytes());
    }
    out
}

/// `MD5(extra fields | secret2)`.
pub fn mac2(fields: &[u8], secret2: &[u8]) -> [u8; MAC_LEN] {
    let mut ctx = md5::Context::new();
    ctx.consume(fields);
    ctx.consume(secret2);
    ctx.compute().0
}

/// Builds a signed nonce. `mac2` is included only when `checks` is non-empty.
pub fn sign(
    expire: u32,
    since: u32,
    replay: Option<ReplayId>,
    request: &dyn SipRequest,
    checks: ExtraChecks,
    secrets: &Secrets,
) -> Nonce {
    let mac2 = if checks.is_empty() {
        None
    } else {
        Some(mac2(&extra_fields(request, checks), secrets.extra()))
    };
    Nonce {
        expire,
        since,
        mac1: mac1(expire, since, replay, secrets.primary()),
        mac2,
        replay,
    }
}

/// Recomputes the tags of a decoded nonce.
///
/// With a non-empty `checks` mask the nonce must carry `mac2` and it must
/// match the request. With an empty mask a present `mac2` is not consulted.
pub fn verify(
    nonce: &Nonce,
    request: &dyn SipRequest,
    checks: ExtraChecks,
    secrets: &Secrets,
) -> bool {
    let expected = mac1(nonce.expire, nonce.since, nonce.replay, secrets.primary());
    let mac1_ok: bool = expected[..].ct_eq(&nonce.mac1[..]).into();
    if checks.is_empty() {
        return mac1_ok;
    }
    let Some(received) = nonce.mac2 else {
        return false;
    };
    let expected = mac2(&extra_fields(request, checks), secrets.extra());
    let mac2_ok: bool = expected[..].ct_eq(&received[..]).into();
    mac1_ok & mac2_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::{decode, encode, PoolFlags};
    use crate::request::{Method, RequestInfo};
    use std::net::{IpAddr, Ipv4Addr};

    fn request() -> RequestInfo {
        RequestInfo::new(Method::Invite, "sip:bob@example.com")
            .with_call_id("call-1")
            .with_from_tag("ft")
            .with_source(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)))
    }

    #[test]
    fn signed_nonce_round_trips() {
        let secrets = Secrets::new("s1", "s2");
        let req = request();
        let nonce = sign(1300, 1000, None, &req, ExtraChecks::NONE, &secrets);
        let decoded = decode(&encode(&nonce)).expect("decode");
        assert_eq!(decoded.expire, 1300);
        assert_eq!(decoded.since, 1000);
        assert!(verify(&decoded, &req, ExtraChecks::NONE, &secrets));

        let other = Secrets::new("s1x", "s2");
        assert!(!verify(&decoded, &req, ExtraChecks::NONE, &other));
    }

    #[test]
    fn mac1_is_deterministic() {
        let replay = Some(ReplayId {
            nonce_id: 9,
            flags: PoolFlags::new(1, true, false),
        });
        assert_eq!(mac1(5, 4, replay, b"k"), mac1(5, 4, replay, b"k"));
        assert_ne!(mac1(5, 4, replay, b"k"), mac1(5, 4, None, b"k"));
        assert_ne!(mac1(5, 4, None, b"k"), mac1(6, 4, None, b"k"));
    }

    #[test]
    fn extra_fields_layout() {
        let req = request();
        let fields = extra_fields(&req, ExtraChecks::CALL_ID | ExtraChecks::SRC_IP);
        let mut expected = vec![0x0a];
        expected.extend_from_slice(&6u32.to_be_bytes());
        expected.extend_from_slice(b"call-1");
        expected.extend_from_slice(&9u32.to_be_bytes());
        expected.extend_from_slice(b"192.0.2.7");
        assert_eq!(fields, expected);

        let bare = RequestInfo::new(Method::Invite, "sip:x");
        assert_eq!(extra_fields(&bare, ExtraChecks::FROM_TAG), vec![0x04, 0, 0, 0, 0]);
    }

    #[test]
    fn mac2_binds_request() {
        let secrets = Secrets::new("s1", "s2");
        let checks = ExtraChecks::FULL_URI | ExtraChecks::CALL_ID | ExtraChecks::FROM_TAG;
        let req = request();
        let nonce = sign(1300, 1000, None, &req, checks, &secrets);
        assert!(nonce.mac2.is_some());
        assert!(verify(&nonce, &req, checks, &secrets));

        let moved = request().with_call_id("call-2");
        assert!(!verify(&nonce, &moved, checks, &secrets));

        let mut stripped = nonce;
        stripped.mac2 = None;
        assert!(!verify(&stripped, &req, checks, &secrets));
    }

    #[test]
    fn mac2_ignored_without_checks() {
        let secrets = Secrets::new("s1", "s2");
        let req = request();
        let nonce = sign(1300, 1000, None, &req, ExtraChecks::CALL_ID, &secrets);
        let moved = request().with_call_id("elsewhere");
        assert!(verify(&nonce, &moved, ExtraChecks::NONE, &secrets));
    }

    #[test]
    fn extra_checks_bits() {
        assert_eq!(ExtraChecks::from_bits(0xff).bits(), 0x0f);
        assert!(ExtraChecks::from_bits(3).contains(ExtraChecks::CALL_ID));
        assert!(!ExtraChecks::from_bits(3).contains(ExtraChecks::SRC_IP));
        assert!(ExtraChecks::default().is_empty());
    }
}
