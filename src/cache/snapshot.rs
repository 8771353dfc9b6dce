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

//! Persistence of the cache to a snapshot file.
//!
//! The snapshot is a TOML document with a `forward` table and a
//! `reverse` table. Each maps a key (a domain name or an address) to
//! the entry's expiry, in seconds since the Unix epoch, and its payload
//! in base64:
//!
//! ```toml
//! [forward."example.com."]
//! expires = 1700000300
//! response = "EjSBgAABAAEAAAAAB2V4YW1wbGUDY29tAAABAAE..."
//! ```
//!
//! Snapshots are written to a temporary file next to the target, which
//! is then renamed over the target.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{error, info};
use serde::{Deserialize, Serialize};

use super::{CacheEntry, Tables, Timestamp};

////////////////////////////////////////////////////////////////////////
// SNAPSHOTS                                                          //
////////////////////////////////////////////////////////////////////////

/// A snapshot file holding the cache's tables.
#[derive(Clone, Debug)]
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    /// Creates a `Snapshot` stored at `path`. Nothing is read or
    /// written until [`Snapshot::load`] or [`Snapshot::save`] is
    /// called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the tables from the snapshot file.
    ///
    /// A missing file is not an error; it yields empty tables. Entries
    /// that have expired at `now` are discarded, and if there were any,
    /// the filtered tables are immediately written back. (A failure to
    /// write them back is logged but does not fail the load.)
    pub fn load(&self, now: Timestamp) -> Result<Tables> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(
                    "No cache snapshot at {}; starting empty.",
                    self.path.display()
                );
                return Ok(Tables::new());
            }
            Err(e) => return Err(e.into()),
        };
        let file: SnapshotFile = toml::from_slice(&raw).map_err(Error::Parse)?;

        let mut tables = Tables::new();
        for (domain, stored) in file.forward {
            let entry = stored.into_entry()?;
            tables.insert_forward(domain, entry.payload, entry.expires);
        }
        for (addr, stored) in file.reverse {
            let entry = stored.into_entry()?;
            tables.insert_reverse(addr, entry.payload, entry.expires);
        }

        let loaded = tables.len();
        if tables.prune(now) {
            info!(
                "Discarded {} expired entries from the cache snapshot.",
                loaded - tables.len(),
            );
            if let Err(e) = self.save(&tables) {
                error!(
                    "Failed to rewrite the cache snapshot at {}: {}",
                    self.path.display(),
                    e,
                );
            }
        }
        info!(
            "Loaded {} cache entries from {}.",
            tables.len(),
            self.path.display(),
        );
        Ok(tables)
    }

    /// Writes `tables` to the snapshot file, replacing its previous
    /// contents.
    pub fn save(&self, tables: &Tables) -> Result<()> {
        let file = SnapshotFile {
            forward: to_stored(tables.forward()),
            reverse: to_stored(tables.reverse()),
        };
        let text = toml::to_string(&file).map_err(Error::Serialize)?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, text)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Returns the path of the temporary file used while saving.
    fn temp_path(&self) -> PathBuf {
        let mut path = OsString::from(self.path.as_os_str());
        path.push(".tmp");
        path.into()
    }
}

////////////////////////////////////////////////////////////////////////
// SNAPSHOT FILE STRUCTURE                                            //
////////////////////////////////////////////////////////////////////////

/// The complete snapshot file. [`BTreeMap`]s keep the output ordered.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct SnapshotFile {
    #[serde(default)]
    forward: BTreeMap<String, StoredEntry>,
    #[serde(default)]
    reverse: BTreeMap<String, StoredEntry>,
}

/// A [`CacheEntry`] as it is stored in the snapshot file.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct StoredEntry {
    expires: Timestamp,
    response: String,
}

impl StoredEntry {
    fn into_entry(self) -> Result<CacheEntry> {
        let payload = BASE64
            .decode(self.response)
            .map_err(Error::InvalidPayload)?;
        Ok(CacheEntry {
            expires: self.expires,
            payload: Arc::from(payload),
        })
    }
}

fn to_stored(table: &HashMap<String, CacheEntry>) -> BTreeMap<String, StoredEntry> {
    table
        .iter()
        .map(|(key, entry)| {
            let stored = StoredEntry {
                expires: entry.expires,
                response: BASE64.encode(&entry.payload),
            };
            (key.clone(), stored)
        })
        .collect()
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that the snapshot could not be read or written.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    InvalidPayload(base64::DecodeError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Parse(err) => write!(f, "failed to parse the snapshot: {}", err),
            Self::Serialize(err) => write!(f, "failed to serialize the snapshot: {}", err),
            Self::InvalidPayload(err) => write!(f, "invalid response payload: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Serialize(err) => Some(err),
            Self::InvalidPayload(err) => Some(err),
        }
    }
}

/// The type returned by fallible [`Snapshot`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
