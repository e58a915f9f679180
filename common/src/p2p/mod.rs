mod error;
mod message;
mod peer;

pub use error::P2pError;
pub use message::*;
pub use peer::Peer;

use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, info, warn};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;

use crate::{block::EncodedBlock, crypto::KeyPair, network::Network};

/// Operator supplied `{address, port}` of a node to publish to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub address: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl Display for PeerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

// Accepts `host:port`, `1.2.3.4:port` and `[::ffff:1.2.3.4]:port`
impl FromStr for PeerAddress {
    type Err = P2pError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| P2pError::InvalidAddress(s.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| P2pError::InvalidAddress(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(P2pError::InvalidAddress(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

/// Outcome of publishing one block to every ready peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Raw block publication to the gossip network.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Connect to the given peers, returning how many are ready to publish to.
    async fn connect(&self, peers: &[PeerAddress], grace_period: Duration) -> usize;

    /// Send the block to every ready peer. A failing peer is counted,
    /// it never aborts the publication to the others.
    async fn publish(&self, block: &EncodedBlock) -> PublishOutcome;

    async fn peer_count(&self) -> usize;
}

/// Set of handshaked peers sharing one random node identity.
pub struct PeerSet {
    network: Network,
    node_id: KeyPair,
    peers: RwLock<Vec<Arc<Peer>>>,
}

impl PeerSet {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            node_id: KeyPair::generate(),
            peers: RwLock::new(Vec::new()),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Connect to every address concurrently, each attempt bounded by
    /// `grace_period`. Returns how many peers are ready.
    pub async fn connect_all(&self, addresses: &[PeerAddress], grace_period: Duration) -> usize {
        let attempts = addresses.iter().map(|address| async move {
            let result = Peer::connect(address, self.network, &self.node_id, grace_period).await;
            (address, result)
        });

        let mut ready = Vec::new();
        for (address, result) in join_all(attempts).await {
            match result {
                Ok(peer) => {
                    info!("Connected to {}", address);
                    ready.push(Arc::new(peer));
                }
                Err(e) => warn!("Peer {} unavailable: {}", address, e),
            }
        }

        let mut peers = self.peers.write().await;
        peers.extend(ready);
        gauge!("nano_p2p_ready_peers").set(peers.len() as f64);
        peers.len()
    }
}

#[async_trait]
impl Publisher for PeerSet {
    async fn connect(&self, peers: &[PeerAddress], grace_period: Duration) -> usize {
        self.connect_all(peers, grace_period).await
    }

    async fn publish(&self, block: &EncodedBlock) -> PublishOutcome {
        let frame = publish_frame(self.network, block);
        let peers = self.peers.read().await;
        let mut outcome = PublishOutcome::default();
        for peer in peers.iter() {
            match peer.send(&frame).await {
                Ok(()) => {
                    outcome.delivered += 1;
                    counter!("nano_p2p_published").increment(1u64);
                }
                Err(e) => {
                    outcome.failed += 1;
                    counter!("nano_p2p_publish_failures").increment(1u64);
                    if log::log_enabled!(log::Level::Debug) {
                        debug!("Publish to {} failed: {}", peer, e);
                    }
                }
            }
        }
        outcome
    }

    async fn peer_count(&self) -> usize {
        self.peers
            .read()
            .await
            .iter()
            .filter(|peer| peer.is_alive())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    #[test]
    fn test_peer_address_parsing() {
        let peer: PeerAddress = "[::ffff:116.202.107.97]:54000".parse().unwrap();
        assert_eq!(peer, PeerAddress::new("::ffff:116.202.107.97", 54000));
        assert_eq!(peer.to_string(), "[::ffff:116.202.107.97]:54000");

        let peer: PeerAddress = "localhost:7075".parse().unwrap();
        assert_eq!(peer.to_string(), "localhost:7075");

        assert!("localhost".parse::<PeerAddress>().is_err());
        assert!("localhost:port".parse::<PeerAddress>().is_err());
        assert!(":7075".parse::<PeerAddress>().is_err());
    }

    // Minimal node side of the legacy handshake, then records what it receives
    async fn fake_node(listener: TcpListener, network: Network) -> Vec<u8> {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut header = [0u8; HEADER_SIZE];
        socket.read_exact(&mut header).await.unwrap();
        let header = MessageHeader::from_bytes(&header).unwrap();
        let mut cookie = vec![0u8; NodeIdHandshake::payload_size(header.extensions)];
        socket.read_exact(&mut cookie).await.unwrap();

        let node = KeyPair::generate();
        let reply = NodeIdHandshake {
            query: Some([9; COOKIE_SIZE]),
            response: Some((*node.public_key(), node.sign(&cookie))),
        };
        socket.write_all(&reply.to_frame(network)).await.unwrap();

        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();
        received
    }

    #[tokio::test]
    async fn test_connect_and_publish() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let node = tokio::spawn(fake_node(listener, Network::Dev));

        let set = PeerSet::new(Network::Dev);
        let ready = set
            .connect(
                &[PeerAddress::new("127.0.0.1", port), PeerAddress::new("127.0.0.1", 1)],
                Duration::from_secs(2),
            )
            .await;
        assert_eq!(ready, 1);
        assert_eq!(set.peer_count().await, 1);

        let block = crate::block::StateBlock::change(
            crate::crypto::PublicKey::from_bytes([1; 32]),
            crate::crypto::Hash::new([2; 32]),
            crate::crypto::PublicKey::from_bytes([3; 32]),
            4,
        )
        .encode();
        let outcome = set.publish(&block).await;
        assert_eq!(outcome, PublishOutcome { delivered: 1, failed: 0 });
        drop(set);

        let received = node.await.unwrap();
        // Our handshake response, then the publish frame
        let response_size = HEADER_SIZE + NodeIdHandshake::payload_size(0x0002);
        assert_eq!(received.len(), response_size + HEADER_SIZE + 216);
        assert_eq!(received[response_size + 5], MessageType::Publish as u8);
        assert_eq!(&received[response_size + HEADER_SIZE..], block.as_bytes());
    }
}
