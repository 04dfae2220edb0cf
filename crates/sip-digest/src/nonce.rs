// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary nonce layout and its base64 transport encoding.
//!
//! ```text
//! expire     u32 BE    end of validity (unix time)
//! since      u32 BE    creation time (unix time)
//! mac1       16 bytes  MD5(expire | since | [nonce_id | pool_flags] | secret1)
//! mac2       16 bytes  optional, MD5(extra checks | secret2)
//! nonce_id   u32 BE    optional, replay table index
//! pool_flags u8        optional, bit7 nc-valid, bit6 otn-valid, bits5..0 pool
//! ```
//!
//! All integers are big-endian so nonces minted on one cluster node decode
//! identically on another.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

pub const MAC_LEN: usize = 16;

const TIMESTAMPS_LEN: usize = 8;
const REPLAY_ID_LEN: usize = 5;

/// Longest token [`encode`] produces: base64 of the 45 byte full layout.
pub const MAX_NONCE_LEN: usize = NonceLayout::Full.encoded_len();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NonceError {
    #[error("nonce is not valid base64")]
    InvalidBase64,
    #[error("unsupported nonce length {0}")]
    InvalidLength(usize),
}

/// Which optional fields a nonce carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonceLayout {
    /// Timestamps and mac1.
    Basic,
    /// Adds mac2.
    WithExtra,
    /// Adds nonce id and pool flags.
    WithReplayId,
    /// All fields.
    Full,
}

impl NonceLayout {
    pub const fn raw_len(self) -> usize {
        match self {
            NonceLayout::Basic => TIMESTAMPS_LEN + MAC_LEN,
            NonceLayout::WithExtra => TIMESTAMPS_LEN + 2 * MAC_LEN,
            NonceLayout::WithReplayId => TIMESTAMPS_LEN + MAC_LEN + REPLAY_ID_LEN,
            NonceLayout::Full => TIMESTAMPS_LEN + 2 * MAC_LEN + REPLAY_ID_LEN,
        }
    }

    /// Length of the padded base64 form.
    pub const fn encoded_len(self) -> usize {
        (self.raw_len() + 2) / 3 * 4
    }

    pub fn from_raw_len(len: usize) -> Option<Self> {
        [
            NonceLayout::Basic,
            NonceLayout::WithExtra,
            NonceLayout::WithReplayId,
            NonceLayout::Full,
        ]
        .into_iter()
        .find(|layout| layout.raw_len() == len)
    }

    pub fn from_encoded_len(len: usize) -> Option<Self> {
        [
            NonceLayout::Basic,
            NonceLayout::WithExtra,
            NonceLayout::WithReplayId,
            NonceLayout::Full,
        ]
        .into_iter()
        .find(|layout| layout.encoded_len() == len)
    }

    pub fn has_extra(self) -> bool {
        matches!(self, NonceLayout::WithExtra | NonceLayout::Full)
    }

    pub fn has_replay_id(self) -> bool {
        matches!(self, NonceLayout::WithReplayId | NonceLayout::Full)
    }
}

/// Replay-protection flags stored in the last nonce byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolFlags(u8);

impl PoolFlags {
    pub const NC_VALID: u8 = 0x80;
    pub const OTN_VALID: u8 = 0x40;
    pub const POOL_MASK: u8 = 0x3f;

    pub fn new(pool: u8, nc_valid: bool, otn_valid: bool) -> Self {
        let mut bits = pool & Self::POOL_MASK;
        if nc_valid {
            bits |= Self::NC_VALID;
        }
        if otn_valid {
            bits |= Self::OTN_VALID;
        }
        Self(bits)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn pool(self) -> u8 {
        self.0 & Self::POOL_MASK
    }

    pub fn nc_valid(self) -> bool {
        self.0 & Self::NC_VALID != 0
    }

    pub fn otn_valid(self) -> bool {
        self.0 & Self::OTN_VALID != 0
    }
}

/// Replay table coordinates embedded in a nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplayId {
    pub nonce_id: u32,
    pub flags: PoolFlags,
}

/// Decoded nonce fields. The layout follows from which options are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce {
    pub expire: u32,
    pub since: u32,
    pub mac1: [u8; MAC_LEN],
    pub mac2: Option<[u8; MAC_LEN]>,
    pub replay: Option<ReplayId>,
}

impl Nonce {
    pub fn layout(&self) -> NonceLayout {
        match (self.mac2.is_some(), self.replay.is_some()) {
            (false, false) => NonceLayout::Basic,
            (true, false) => NonceLayout::WithExtra,
            (false, true) => NonceLayout::WithReplayId,
            (true, true) => NonceLayout::Full,
        }
    }

    /// Raw byte form, before base64.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.layout().raw_len());
        raw.extend_from_slice(&self.expire.to_be_bytes());
        raw.extend_from_slice(&self.since.to_be_bytes());
        raw.extend_from_slice(&self.mac1);
        if let Some(mac2) = &self.mac2 {
            raw.extend_from_slice(mac2);
        }
        if let Some(replay) = &self.replay {
            raw.extend_from_slice(&replay.nonce_id.to_be_bytes());
            raw.push(replay.flags.bits());
        }
        raw
    }

    /// Parses the raw byte form; the length alone selects the layout.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, NonceError> {
        let layout =
            NonceLayout::from_raw_len(raw.len()).ok_or(NonceError::InvalidLength(raw.len()))?;
        let mut reader = Reader { raw, pos: 0 };

        let expire = u32::from_be_bytes(reader.take()?);
        let since = u32::from_be_bytes(reader.take()?);
        let mac1 = reader.take()?;
        let mac2 = if layout.has_extra() {
            Some(reader.take()?)
        } else {
            None
        };
        let replay = if layout.has_replay_id() {
            let nonce_id = u32::from_be_bytes(reader.take()?);
            let [flags] = reader.take()?;
            Some(ReplayId {
                nonce_id,
                flags: PoolFlags::from_bits(flags),
            })
        } else {
            None
        };

        Ok(Self {
            expire,
            since,
            mac1,
            mac2,
            replay,
        })
    }
}

struct Reader<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], NonceError> {
        let end = self.pos + N;
        let bytes = self
            .raw
            .get(self.pos..end)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or(NonceError::InvalidLength(self.raw.len()))?;
        self.pos = end;
        Ok(bytes)
    }
}

/// Encodes a nonce as a padded standard-alphabet base64 token.
pub fn encode(nonce: &Nonce) -> String {
    STANDARD.encode(nonce.to_bytes())
}

/// Decodes a token produced by [`encode`].
///
/// The token length is checked against the four supported layouts before any
/// decoding so oversized attacker input is rejected up front.
pub fn decode(token: &str) -> Result<Nonce, NonceError> {
    if NonceLayout::from_encoded_len(token.len()).is_none() {
        return Err(NonceError::InvalidLength(token.len()));
    }
    let raw = STANDARD
        .decode(token)
        .map_err(|_| NonceError::InvalidBase64)?;
    Nonce::from_bytes(&raw)
}
