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

//! Burrow is a small caching DNS forwarder.
//!
//! Queries arrive over UDP and are answered from an in-memory cache
//! when possible; otherwise they are relayed to a single upstream
//! resolver, and the answer is cached for as long as its records
//! allow. The cache can be snapshotted to disk so that it survives
//! restarts.
//!
//! The pieces fit together as follows. [`server::Server`] implements
//! the handling of a single query on top of a [`cache::Cache`] and an
//! [`upstream::Upstream`]. The [`io`] module drives a server from a UDP
//! socket and periodically sweeps expired entries out of the cache.

pub mod cache;
pub mod io;
pub mod message;
pub mod name;
pub mod rr;
pub mod server;
pub mod upstream;

#[cfg(test)]
mod test_util;
