//! Upstream DNS relay trait and implementation.
//!
//! Queries that no rule blocks are shipped to a real resolver and the
//! raw reply is handed back for re-framing. The trait seam keeps the
//! interception loop testable without network access.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::error::{NetworkError, Result};

/// Largest upstream reply we accept over UDP.
pub const MAX_REPLY_SIZE: usize = 1024;

/// Trait for relaying a DNS message to an upstream resolver.
///
/// Takes the bare DNS message (no IP/UDP framing) and returns the
/// resolver's reply bytes verbatim. An error means the query is dropped;
/// the original sender retries on its own UDP timeout.
pub trait DnsRelay: Send + Sync + 'static {
    fn relay(&self, query: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Relay over one long-lived UDP socket to a fixed public resolver.
///
/// The socket must be exempted from the tunnel's routing or forwarded
/// queries would loop straight back into the interception path. Access
/// is serialized: a second query waits until the previous send/receive
/// pair finishes, so unrelated replies are never interleaved on the
/// connectionless channel. Device-local DNS volume is low enough that
/// the lost throughput does not matter.
pub struct UpstreamRelay {
    socket: Mutex<UdpSocket>,
    upstream: SocketAddr,
    timeout: Duration,
}

impl UpstreamRelay {
    /// Wrap an already-exempted socket.
    pub fn from_std(
        socket: std::net::UdpSocket,
        upstream: SocketAddr,
        timeout: Duration,
    ) -> Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket: Mutex::new(UdpSocket::from_std(socket)?),
            upstream,
            timeout,
        })
    }

    /// Bind a fresh socket; for hosts where no exemption is needed.
    pub async fn bind(upstream: SocketAddr, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            socket: Mutex::new(socket),
            upstream,
            timeout,
        })
    }

    /// The resolver this relay forwards to.
    pub const fn upstream(&self) -> SocketAddr {
        self.upstream
    }
}

impl DnsRelay for UpstreamRelay {
    async fn relay(&self, query: &[u8]) -> Result<Vec<u8>> {
        let socket = self.socket.lock().await;

        socket.send_to(query, self.upstream).await?;

        let mut reply = [0u8; MAX_REPLY_SIZE];
        let (len, _) = tokio::time::timeout(self.timeout, socket.recv_from(&mut reply))
            .await
            .map_err(|_| NetworkError::UpstreamTimeout)??;

        Ok(reply[..len].to_vec())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Mock relay for testing the loop without a resolver.
    #[derive(Clone, Default)]
    pub struct MockRelay {
        /// Reply returned for every query; `None` simulates a timeout.
        pub reply: Option<Vec<u8>>,
        /// Count of relay calls.
        pub calls: Arc<AtomicU64>,
    }

    impl MockRelay {
        pub fn answering(reply: Vec<u8>) -> Self {
            Self {
                reply: Some(reply),
                calls: Arc::default(),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: None,
                calls: Arc::default(),
            }
        }

        pub fn call_count(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DnsRelay for MockRelay {
        async fn relay(&self, _query: &[u8]) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(NetworkError::UpstreamTimeout.into()),
            }
        }
    }

    #[tokio::test]
    async fn should_relay_through_a_local_resolver() {
        // Stand-in resolver that echoes the query with one byte flipped.
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_REPLY_SIZE];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            buf[2] |= 0x80;
            server.send_to(&buf[..len], peer).await.unwrap();
        });

        let relay = UpstreamRelay::bind(server_addr, Duration::from_secs(1))
            .await
            .unwrap();

        let reply = relay.relay(&[0x12, 0x34, 0x01, 0x00]).await.unwrap();
        assert_eq!(reply, vec![0x12, 0x34, 0x81, 0x00]);
    }

    #[tokio::test]
    async fn should_time_out_when_resolver_is_silent() {
        // Bound but never reads: the relay must give up on its own.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let relay = UpstreamRelay::bind(addr, Duration::from_millis(50))
            .await
            .unwrap();

        let result = relay.relay(&[0u8; 12]).await;
        assert!(matches!(
            result,
            Err(crate::error::Error::Network(NetworkError::UpstreamTimeout))
        ));
    }

    #[tokio::test]
    async fn mock_relay_counts_calls_and_fails_on_demand() {
        let relay = MockRelay::failing();
        assert!(relay.relay(&[0u8; 12]).await.is_err());
        assert_eq!(relay.call_count(), 1);

        let relay = MockRelay::answering(vec![1, 2, 3]);
        assert_eq!(relay.relay(&[0u8; 12]).await.unwrap(), vec![1, 2, 3]);
    }
}
