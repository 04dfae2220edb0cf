// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replay protection for nonces carrying a replay id.
//!
//! Both tables are fixed arenas of 64-bit slots holding `id << 32 | value`,
//! split evenly between the id pools. A nonce id maps to slot
//! `pool * partition + id % partition`. Since ids grow monotonically per pool,
//! a newer mint overwrites the oldest record sharing its slot, which a later
//! verify of the old nonce detects as an id mismatch.
//!
//! Every check-and-update is one CAS loop on one slot.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::nonce::{PoolFlags, ReplayId};
use crate::pool::NonceIdPools;

/// Outcome of a replay check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayVerdict {
    Accepted,
    /// nc did not advance, or the one-time nonce was already consumed.
    Replayed,
    /// The record was overwritten by a newer nonce.
    Evicted,
    /// Flags or pool index that this guard could not have minted.
    Invalid,
}

impl ReplayVerdict {
    pub fn is_accepted(self) -> bool {
        self == ReplayVerdict::Accepted
    }
}

fn pack(id: u32, value: u32) -> u64 {
    (u64::from(id) << 32) | u64::from(value)
}

fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

#[derive(Debug)]
struct SlotTable {
    slots: Box<[AtomicU64]>,
    partition: usize,
}

impl SlotTable {
    fn new(size: usize, pools: usize) -> Self {
        let partition = (size / pools).max(1);
        let slots = (0..partition * pools).map(|_| AtomicU64::new(0)).collect();
        Self { slots, partition }
    }

    fn slot(&self, pool: u8, id: u32) -> Option<&AtomicU64> {
        let index = pool as usize * self.partition + id as usize % self.partition;
        self.slots.get(index)
    }
}

/// Highest nonce-count seen per nonce.
#[derive(Debug)]
pub struct NonceCountTable {
    table: SlotTable,
}

impl NonceCountTable {
    pub fn new(size: usize, pools: usize) -> Self {
        Self {
            table: SlotTable::new(size, pools),
        }
    }

    pub fn len(&self) -> usize {
        self.table.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.slots.is_empty()
    }

    /// Starts tracking a freshly minted id at nc 0.
    pub fn register(&self, pool: u8, id: u32) -> bool {
        match self.table.slot(pool, id) {
            Some(slot) => {
                slot.store(pack(id, 0), Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Accepts `nc` only if it is above the highest value seen for `id`.
    pub fn check(&self, pool: u8, id: u32, nc: u32) -> ReplayVerdict {
        let Some(slot) = self.table.slot(pool, id) else {
            return ReplayVerdict::Invalid;
        };
        let result = slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            let (stored_id, stored_nc) = unpack(word);
            (stored_id == id && nc > stored_nc).then(|| pack(id, nc))
        });
        match result {
            Ok(_) => ReplayVerdict::Accepted,
            Err(word) if unpack(word).0 != id => ReplayVerdict::Evicted,
            Err(_) => ReplayVerdict::Replayed,
        }
    }
}

/// Single-use flags for nonces in flight.
#[derive(Debug)]
pub struct OneTimeNonceTable {
    table: SlotTable,
}

const IN_FLIGHT: u32 = 1;
const CONSUMED: u32 = 0;

impl OneTimeNonceTable {
    pub fn new(size: usize, pools: usize) -> Self {
        Self {
            table: SlotTable::new(size, pools),
        }
    }

    pub fn len(&self) -> usize {
        self.table.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.slots.is_empty()
    }

    pub fn register(&self, pool: u8, id: u32) -> bool {
        match self.table.slot(pool, id) {
            Some(slot) => {
                slot.store(pack(id, IN_FLIGHT), Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Consumes the nonce. Only the first caller succeeds.
    pub fn consume(&self, pool: u8, id: u32) -> ReplayVerdict {
        let Some(slot) = self.table.slot(pool, id) else {
            return ReplayVerdict::Invalid;
        };
        match slot.compare_exchange(
            pack(id, IN_FLIGHT),
            pack(id, CONSUMED),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => ReplayVerdict::Accepted,
            Err(word) if unpack(word).0 != id => ReplayVerdict::Evicted,
            Err(_) => ReplayVerdict::Replayed,
        }
    }
}

/// Id pools plus whichever replay tables are enabled.
#[derive(Debug)]
pub struct ReplayGuard {
    pools: NonceIdPools,
    nc: Option<NonceCountTable>,
    otn: Option<OneTimeNonceTable>,
}

impl ReplayGuard {
    /// `nc_size` / `otn_size` of `None` disable the table.
    pub fn new(pools: usize, nc_size: Option<usize>, otn_size: Option<usize>) -> Self {
        let pools = NonceIdPools::new(pools);
        let count = pools.len();
        Self {
            nc: nc_size.map(|size| NonceCountTable::new(size, count)),
            otn: otn_size.map(|size| OneTimeNonceTable::new(size, count)),
            pools,
        }
    }

    pub fn disabled() -> Self {
        Self::new(1, None, None)
    }

    /// True when minted nonces carry a replay id.
    pub fn is_enabled(&self) -> bool {
        self.nc.is_some() || self.otn.is_some()
    }

    pub fn nc_enabled(&self) -> bool {
        self.nc.is_some()
    }

    pub fn otn_enabled(&self) -> bool {
        self.otn.is_some()
    }

    pub fn pools(&self) -> &NonceIdPools {
        &self.pools
    }

    /// Reserves an id for a new nonce and registers it in the enabled tables.
    ///
    /// `nc_usable` is false when challenges carry no qop, in which case
    /// clients never send nc and the ratchet is skipped for this nonce.
    pub fn mint(&self, nc_usable: bool) -> Option<ReplayId> {
        if !self.is_enabled() {
            return None;
        }
        let (pool, nonce_id) = self.pools.allocate();
        let nc_valid = match &self.nc {
            Some(table) if nc_usable => table.register(pool, nonce_id),
            _ => false,
        };
        let otn_valid = match &self.otn {
            Some(table) => table.register(pool, nonce_id),
            None => false,
        };
        Some(ReplayId {
            nonce_id,
            flags: PoolFlags::new(pool, nc_valid, otn_valid),
        })
    }

    /// Checks a verified nonce's replay id against the tables.
    ///
    /// `nc` must be one the response hash covers (qop present). nc-valid
    /// nonces used with an nc go through the ratchet; otherwise an otn-valid
    /// nonce is consumed. A nonce with neither flag is a plain time-limited
    /// nonce.
    pub fn check(&self, replay: &ReplayId, nc: Option<u32>) -> ReplayVerdict {
        let flags = replay.flags;
        let pool = flags.pool();
        if pool as usize >= self.pools.len() {
            warn!(pool, "nonce pool index out of range");
            return ReplayVerdict::Invalid;
        }

        let verdict = if flags.nc_valid() && nc.is_some() {
            match (&self.nc, nc) {
                (Some(table), Some(nc)) => table.check(pool, replay.nonce_id, nc),
                _ => ReplayVerdict::Invalid,
            }
        } else if flags.otn_valid() {
            match &self.otn {
                Some(table) => table.consume(pool, replay.nonce_id),
                None => ReplayVerdict::Invalid,
            }
        } else if flags.nc_valid() {
            // nc-only nonce used without an nc
            ReplayVerdict::Invalid
        } else {
            ReplayVerdict::Accepted
        };

        if !verdict.is_accepted() {
            debug!(
                nonce_id = replay.nonce_id,
                pool,
                ?verdict,
                "nonce replay check failed"
            );
        }
        verdict
    }
}
