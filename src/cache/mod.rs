// Copyright 2024 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The TTL-bounded response cache.
//!
//! The cache holds two tables of raw upstream responses: the forward
//! table, keyed by the queried domain name, and the reverse table,
//! keyed by the textual IPv4 addresses found in those responses. Each
//! entry carries an absolute expiry time; an entry is valid only while
//! its expiry is strictly later than the current time.
//!
//! [`Tables`] implements the table operations without any locking.
//! [`Cache`] wraps the tables in a single mutex together with an
//! optional on-disk [`Snapshot`], so that every mutation and the write
//! of the snapshot reflecting it happen in one critical section.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error};

use crate::message::{self, reader};

mod snapshot;

pub use snapshot::{Error as SnapshotError, Snapshot};

////////////////////////////////////////////////////////////////////////
// TIMESTAMPS AND ENTRIES                                             //
////////////////////////////////////////////////////////////////////////

/// An absolute point in time, in whole seconds since the Unix epoch.
pub type Timestamp = u64;

/// Returns the current time as a [`Timestamp`].
pub fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_secs())
}

/// A cached response and the time at which it expires.
///
/// The payload is reference-counted so that the forward entry and the
/// reverse entries created from one upstream response share the same
/// octets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheEntry {
    pub expires: Timestamp,
    pub payload: Arc<[u8]>,
}

impl CacheEntry {
    /// Returns whether the entry may still be served at `now`.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.expires > now
    }
}

////////////////////////////////////////////////////////////////////////
// TABLES                                                             //
////////////////////////////////////////////////////////////////////////

/// The forward and reverse tables of the cache.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Tables {
    forward: HashMap<String, CacheEntry>,
    reverse: HashMap<String, CacheEntry>,
}

impl Tables {
    /// Creates empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payload cached for `domain`, if there is one and it
    /// has not expired at `now`. Expired entries are left in place for
    /// [`Tables::prune`] to remove.
    pub fn lookup(&self, domain: &str, now: Timestamp) -> Option<Arc<[u8]>> {
        self.forward
            .get(domain)
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.payload.clone())
    }

    /// Inserts a forward entry, replacing any existing entry for
    /// `domain` (including its expiry).
    pub fn insert_forward(&mut self, domain: String, payload: Arc<[u8]>, expires: Timestamp) {
        self.forward.insert(domain, CacheEntry { expires, payload });
    }

    /// Inserts a reverse entry, replacing any existing entry for
    /// `addr`.
    pub fn insert_reverse(&mut self, addr: String, payload: Arc<[u8]>, expires: Timestamp) {
        self.reverse.insert(addr, CacheEntry { expires, payload });
    }

    /// Removes every entry in both tables that is no longer valid at
    /// `now`. Returns whether anything was removed.
    pub fn prune(&mut self, now: Timestamp) -> bool {
        let before = self.len();
        self.forward.retain(|_, entry| entry.is_valid_at(now));
        self.reverse.retain(|_, entry| entry.is_valid_at(now));
        self.len() != before
    }

    /// Caches an upstream `response` to a query for `domain`.
    ///
    /// The answers are extracted from the response. The forward entry
    /// expires after the smallest TTL among the IN A records, or, if
    /// there are none, the smallest TTL among all answers. Every IN A
    /// record also gets a reverse entry sharing the forward entry's
    /// payload and expiry. A response without answers, or whose
    /// smallest TTL is zero, is not cached.
    ///
    /// Returns whether anything was cached. On error, the tables are
    /// left untouched.
    pub fn cache_response(
        &mut self,
        domain: &str,
        response: &[u8],
        now: Timestamp,
    ) -> Result<bool, reader::Error> {
        let answers = message::extract_answers(response)?;
        let addrs: Vec<(Ipv4Addr, u32)> = answers
            .iter()
            .filter_map(|answer| answer.ipv4_addr().map(|addr| (addr, answer.ttl)))
            .collect();
        let min_ttl = addrs
            .iter()
            .map(|(_, ttl)| *ttl)
            .min()
            .or_else(|| answers.iter().map(|answer| answer.ttl).min());

        let expires = match min_ttl {
            Some(ttl) if ttl > 0 => now + ttl as Timestamp,
            _ => return Ok(false),
        };
        let payload: Arc<[u8]> = Arc::from(response);
        self.insert_forward(domain.to_owned(), payload.clone(), expires);
        for (addr, _) in addrs {
            self.insert_reverse(addr.to_string(), payload.clone(), expires);
        }
        Ok(true)
    }

    /// Returns the forward table.
    pub fn forward(&self) -> &HashMap<String, CacheEntry> {
        &self.forward
    }

    /// Returns the reverse table.
    pub fn reverse(&self) -> &HashMap<String, CacheEntry> {
        &self.reverse
    }

    /// Returns the total number of entries in both tables.
    pub fn len(&self) -> usize {
        self.forward.len() + self.reverse.len()
    }

    /// Returns whether both tables are empty.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////
// CACHE                                                              //
////////////////////////////////////////////////////////////////////////

/// The shared cache: [`Tables`] behind a mutex, mirrored to an optional
/// [`Snapshot`].
///
/// All reads, mutations, and snapshot writes are serialized by the one
/// mutex, so at every lock release the tables and the snapshot agree.
/// None of the methods block on network I/O.
#[derive(Debug, Default)]
pub struct Cache {
    tables: Mutex<Tables>,
    snapshot: Option<Snapshot>,
}

impl Cache {
    /// Creates an empty cache that is not persisted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache persisted to `snapshot`, loading its current
    /// contents. Entries that have expired at `now` are discarded. If
    /// the snapshot cannot be loaded, the failure is logged and the
    /// cache starts out empty.
    pub fn open(snapshot: Snapshot, now: Timestamp) -> Self {
        let tables = match snapshot.load(now) {
            Ok(tables) => tables,
            Err(e) => {
                error!(
                    "Failed to load the cache from {}; starting empty: {}",
                    snapshot.path().display(),
                    e,
                );
                Tables::new()
            }
        };
        Self {
            tables: Mutex::new(tables),
            snapshot: Some(snapshot),
        }
    }

    /// Returns the payload cached for `domain`, if it is valid at
    /// `now`.
    pub fn lookup(&self, domain: &str, now: Timestamp) -> Option<Arc<[u8]>> {
        self.lock().lookup(domain, now)
    }

    /// Caches an upstream `response` to a query for `domain` (see
    /// [`Tables::cache_response`]) and writes the snapshot if anything
    /// was cached, all under the cache lock.
    pub fn cache_response(
        &self,
        domain: &str,
        response: &[u8],
        now: Timestamp,
    ) -> Result<bool, reader::Error> {
        let mut tables = self.lock();
        let cached = tables.cache_response(domain, response, now)?;
        if cached {
            self.persist(&tables);
        }
        Ok(cached)
    }

    /// Prunes entries that have expired at `now`, writing the snapshot
    /// if anything was removed. Returns whether anything was removed.
    pub fn sweep(&self, now: Timestamp) -> bool {
        let mut tables = self.lock();
        let before = tables.len();
        let changed = tables.prune(now);
        if changed {
            debug!(
                "Swept {} expired cache entries; {} remain.",
                before - tables.len(),
                tables.len(),
            );
            self.persist(&tables);
        }
        changed
    }

    /// Writes the snapshot, if the cache is persisted.
    pub fn save(&self) -> Result<(), SnapshotError> {
        match self.snapshot {
            Some(ref snapshot) => snapshot.save(&self.lock()),
            None => Ok(()),
        }
    }

    /// Returns a copy of the current tables.
    pub fn tables(&self) -> Tables {
        self.lock().clone()
    }

    /// Locks the tables. Every mutation leaves the tables consistent, so
    /// a panic elsewhere while the lock was held does not invalidate
    /// them and poisoning is ignored.
    fn lock(&self) -> MutexGuard<Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes `tables` to the snapshot, logging any failure. The caller
    /// must hold the cache lock.
    fn persist(&self, tables: &Tables) {
        if let Some(ref snapshot) = self.snapshot {
            if let Err(e) = snapshot.save(tables) {
                error!(
                    "Failed to save the cache to {}: {}",
                    snapshot.path().display(),
                    e,
                );
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
