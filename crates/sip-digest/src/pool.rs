// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Nonce id counters.
//!
//! Ids are handed out from a small set of independent pools so concurrent
//! minting spreads over several counters instead of contending on one.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Upper bound on pools; the index must fit the 6-bit pool field.
pub const MAX_POOLS: usize = 64;

#[derive(Debug)]
pub struct NonceIdPools {
    counters: Box<[AtomicU32]>,
    next_pool: AtomicUsize,
}

impl NonceIdPools {
    /// `count` is rounded up to a power of two and clamped to 1..=64.
    pub fn new(count: usize) -> Self {
        let count = count.clamp(1, MAX_POOLS).next_power_of_two();
        let counters = (0..count).map(|_| AtomicU32::new(0)).collect();
        Self {
            counters,
            next_pool: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Picks the next pool round-robin.
    pub fn select(&self) -> u8 {
        let n = self.next_pool.fetch_add(1, Ordering::Relaxed);
        (n & (self.counters.len() - 1)) as u8
    }

    /// Selects a pool and takes its next id. Ids wrap at `u32::MAX`.
    pub fn allocate(&self) -> (u8, u32) {
        let pool = self.select();
        let counter = &self.counters[pool as usize];
        let id = counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        (pool, id)
    }
}
