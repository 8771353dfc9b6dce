// Copyright 2022 Matthew Ingwersen.
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

//! The request-handling logic of the caching forwarder.
//!
//! The [`Server`] structure is the heart of this module; see its
//! documentation for details.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, warn};

use crate::cache::{unix_now, Cache};
use crate::message;
use crate::upstream::Upstream;

/// A caching DNS forwarder, abstracted from any underlying network I/O
/// provider.
///
/// The [`Server`] receives raw queries through
/// [`Server::handle_query`] and produces the response to send, if any.
/// An I/O provider (see [`crate::io`]) is responsible for receiving
/// queries from the network and sending back the responses.
///
/// Each query is handled as follows:
///
/// 1. The question is decoded. If that fails, the query is dropped
///    without a response.
/// 2. If the [`Cache`] holds a valid response for the QNAME, that
///    response is returned exactly as it was cached. In particular, its
///    ID is the ID of the query that caused it to be cached.
/// 3. Otherwise the query is forwarded unmodified to the [`Upstream`].
///    Its response is cached (see [`Cache::cache_response`]) and
///    returned unmodified.
/// 4. If the upstream fails, a failure response is synthesized with
///    [`message::build_failure`]. Nothing is cached.
pub struct Server<U> {
    cache: Arc<Cache>,
    upstream: U,
}

impl<U> Server<U> {
    /// Creates a new `Server` answering from `cache` and forwarding
    /// misses to `upstream`.
    pub fn new(cache: Arc<Cache>, upstream: U) -> Self {
        Self { cache, upstream }
    }

    /// Returns the server's cache.
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Returns the server's upstream.
    pub fn upstream(&self) -> &U {
        &self.upstream
    }
}

impl<U: Upstream> Server<U> {
    /// Handles a query received from `source`, returning the response
    /// to send back.
    pub async fn handle_query(&self, query: &[u8], source: SocketAddr) -> Response {
        let domain = match message::decode_question(query) {
            Ok((domain, _)) => domain,
            Err(e) => {
                error!("Dropping malformed query from {}: {}", source, e);
                return Response::None;
            }
        };

        if let Some(payload) = self.cache.lookup(&domain, unix_now()) {
            debug!("Cache hit for {} (from {}).", domain, source);
            return Response::Single(payload.to_vec());
        }
        debug!("Cache miss for {} (from {}); forwarding.", domain, source);

        match self.upstream.forward(query).await {
            Ok(response) => {
                match self.cache.cache_response(&domain, &response, unix_now()) {
                    Ok(true) => debug!("Cached the response for {}.", domain),
                    Ok(false) => debug!("Not caching the answerless response for {}.", domain),
                    Err(e) => warn!(
                        "Relaying an unparseable upstream response for {} uncached: {}",
                        domain, e,
                    ),
                }
                Response::Single(response)
            }
            Err(e) => {
                warn!("Upstream failed for {}; answering with a failure: {}", domain, e);
                match message::build_failure(query) {
                    Ok(failure) => Response::Single(failure),
                    Err(_) => Response::None,
                }
            }
        }
    }
}

/// Indicates to the caller of [`Server::handle_query`] what kind of
/// response needs to be sent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// A single response is to be sent.
    Single(Vec<u8>),

    /// No response is to be sent.
    None,
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_util::*;
    use crate::upstream::Error;

    /// An [`Upstream`] answering every query with the same A record, or
    /// failing every query.
    struct FakeUpstream {
        answer: Option<(u32, [u8; 4])>,
        calls: AtomicUsize,
    }

    impl FakeUpstream {
        fn answering(ttl: u32, addr: [u8; 4]) -> Self {
            Self {
                answer: Some((ttl, addr)),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                answer: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Upstream for FakeUpstream {
        async fn forward(&self, query: &[u8]) -> Result<Vec<u8>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (ttl, addr) = self.answer.ok_or(Error::Timeout)?;
            let id = u16::from_be_bytes([query[0], query[1]]);
            let (_, question) = message::decode_question(query).unwrap();
            let qname_len = question.len() - 4;
            Ok(a_response(id, &question[..qname_len], &[(ttl, addr)]))
        }
    }

    fn source() -> SocketAddr {
        SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 5353)
    }

    #[tokio::test]
    async fn cache_miss_forwards_and_caches() {
        let server = Server::new(
            Arc::new(Cache::new()),
            FakeUpstream::answering(300, [93, 184, 216, 34]),
        );
        let query = a_query(0x1234, EXAMPLE_COM_WIRE);
        let expected = a_response(0x1234, EXAMPLE_COM_WIRE, &[(300, [93, 184, 216, 34])]);

        let before = unix_now();
        let response = server.handle_query(&query, source()).await;
        let after = unix_now();
        assert_eq!(response, Response::Single(expected.clone()));
        assert_eq!(server.upstream().calls(), 1);

        let tables = server.cache().tables();
        let forward = &tables.forward()["example.com."];
        assert!(forward.expires >= before + 300 && forward.expires <= after + 300);
        assert_eq!(&*forward.payload, expected.as_slice());
        assert_eq!(tables.reverse()["93.184.216.34"].expires, forward.expires);
    }

    #[tokio::test]
    async fn cache_hit_skips_upstream() {
        let server = Server::new(
            Arc::new(Cache::new()),
            FakeUpstream::answering(300, [93, 184, 216, 34]),
        );
        let first = a_query(0x1234, EXAMPLE_COM_WIRE);
        let second = a_query(0x5678, EXAMPLE_COM_WIRE);
        let expected = a_response(0x1234, EXAMPLE_COM_WIRE, &[(300, [93, 184, 216, 34])]);

        server.handle_query(&first, source()).await;
        let response = server.handle_query(&second, source()).await;

        // The cached payload is served as-is, ID included.
        assert_eq!(response, Response::Single(expected));
        assert_eq!(server.upstream().calls(), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = Arc::new(Cache::new());
        let stale = a_response(0x0001, EXAMPLE_COM_WIRE, &[(300, [192, 0, 2, 1])]);
        cache
            .cache_response("example.com.", &stale, unix_now() - 400)
            .unwrap();
        let server = Server::new(cache, FakeUpstream::answering(60, [192, 0, 2, 2]));

        let query = a_query(0x0002, EXAMPLE_COM_WIRE);
        let response = server.handle_query(&query, source()).await;
        assert_eq!(
            response,
            Response::Single(a_response(0x0002, EXAMPLE_COM_WIRE, &[(60, [192, 0, 2, 2])]))
        );
        assert_eq!(server.upstream().calls(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_synthesizes_failure_response() {
        let server = Server::new(Arc::new(Cache::new()), FakeUpstream::failing());
        let query = a_query(0xabcd, EXAMPLE_COM_WIRE);

        let response = server.handle_query(&query, source()).await;
        let mut expected = b"\xab\xcd\x81\x83\x00\x01\x00\x00\x00\x00\x00\x00".to_vec();
        expected.extend_from_slice(&query[12..]);
        assert_eq!(response, Response::Single(expected));
        assert!(server.cache().tables().is_empty());
    }

    #[tokio::test]
    async fn malformed_query_is_dropped() {
        let server = Server::new(
            Arc::new(Cache::new()),
            FakeUpstream::answering(300, [192, 0, 2, 1]),
        );
        let mut query = a_query(0x1234, EXAMPLE_COM_WIRE);
        query[12] = 63;
        assert_eq!(server.handle_query(&query, source()).await, Response::None);
        assert_eq!(
            server.handle_query(b"\x12\x34\x01", source()).await,
            Response::None
        );
        assert_eq!(server.upstream().calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_for_distinct_domains() {
        let server = Arc::new(Server::new(
            Arc::new(Cache::new()),
            FakeUpstream::answering(300, [10, 0, 0, 1]),
        ));
        let mut tasks = Vec::new();
        for i in 0..16u16 {
            let server = server.clone();
            tasks.push(tokio::spawn(async move {
                let label = format!("host{}", i);
                let mut wire = vec![label.len() as u8];
                wire.extend_from_slice(label.as_bytes());
                wire.push(0);
                let query = a_query(i, &wire);
                let response = server.handle_query(&query, source()).await;
                (label, response)
            }));
        }

        for task in tasks {
            let (label, response) = task.await.unwrap();
            let domain = format!("{}.", label);
            let cached = server.cache().lookup(&domain, unix_now()).unwrap();
            assert_eq!(Response::Single(cached.to_vec()), response);
        }
        assert_eq!(server.cache().tables().forward().len(), 16);
    }
}
