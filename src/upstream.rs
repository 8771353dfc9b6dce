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

//! Forwarding of queries to the upstream resolver.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::message::MAX_UDP_MESSAGE_SIZE;

/// The upstream resolver used when none is configured.
pub const DEFAULT_UPSTREAM: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53);

/// How long to wait for the upstream resolver's reply by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Something that can answer a raw DNS query.
///
/// The [`Server`](crate::server::Server) is generic over this trait so
/// that the request-handling logic can be exercised without a network.
pub trait Upstream {
    /// Sends `query` as-is and returns the raw response.
    fn forward(&self, query: &[u8]) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;
}

/// An [`Upstream`] that sends each query in a single UDP datagram from
/// a fresh socket and waits a bounded time for a single reply.
///
/// There is no retrying and no connection reuse.
#[derive(Clone, Debug)]
pub struct UdpUpstream {
    addr: SocketAddr,
    timeout: Duration,
}

impl UdpUpstream {
    /// Creates a `UdpUpstream` for the resolver at `addr`, waiting at
    /// most `timeout` for each reply.
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Returns the address of the upstream resolver.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn exchange(&self, query: &[u8]) -> io::Result<Vec<u8>> {
        let local_addr = if self.addr.is_ipv6() {
            SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)
        } else {
            SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
        };
        let socket = UdpSocket::bind(local_addr).await?;

        // Connecting makes the socket discard datagrams from anyone but
        // the upstream resolver.
        socket.connect(self.addr).await?;
        socket.send(query).await?;
        let mut buf = vec![0; MAX_UDP_MESSAGE_SIZE];
        let len = socket.recv(&mut buf).await?;
        buf.truncate(len);
        Ok(buf)
    }
}

impl Default for UdpUpstream {
    fn default() -> Self {
        Self::new(DEFAULT_UPSTREAM, DEFAULT_TIMEOUT)
    }
}

impl Upstream for UdpUpstream {
    async fn forward(&self, query: &[u8]) -> Result<Vec<u8>, Error> {
        match timeout(self.timeout, self.exchange(query)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that the upstream resolver did not answer.
#[derive(Debug)]
pub enum Error {
    /// No reply arrived within the timeout.
    Timeout,

    /// A transport error occurred.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out waiting for the upstream resolver"),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timeout => None,
            Self::Io(err) => Some(err),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
