use log::{debug, trace};
use std::{
    fmt::{Display, Formatter},
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::Mutex,
    task::JoinHandle,
    time::timeout,
};

use super::{message::*, P2pError, PeerAddress};
use crate::{crypto::KeyPair, network::Network};

const READ_BUFFER_SIZE: usize = 4096;

// A Peer is an established, handshaked TCP connection to a node.
// The benchmark only writes to it; everything the node sends after the
// handshake is read and dropped so the socket buffers never fill up.
pub struct Peer {
    // resolved remote address
    addr: SocketAddr,
    // write side shared by concurrent publishers
    writer: Mutex<OwnedWriteHalf>,
    // cleared by the reader task once the node closes the connection
    alive: Arc<AtomicBool>,
    // drains inbound bytes
    reader: JoinHandle<()>,
}

impl Peer {
    /// Connect and perform the node id handshake, both bounded by `deadline`.
    pub async fn connect(
        address: &PeerAddress,
        network: Network,
        node_id: &KeyPair,
        deadline: Duration,
    ) -> Result<Self, P2pError> {
        let peer = address.to_string();
        let stream = timeout(deadline, TcpStream::connect((address.address.as_str(), address.port)))
            .await
            .map_err(|_| P2pError::Connect {
                peer: peer.clone(),
                reason: "connection timed out".to_string(),
            })?
            .map_err(|e| P2pError::Connect {
                peer: peer.clone(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        let addr = stream.peer_addr()?;
        let (mut reader, mut writer) = stream.into_split();

        timeout(deadline, handshake(&mut reader, &mut writer, network, node_id, &peer))
            .await
            .map_err(|_| P2pError::HandshakeTimeout(peer.clone()))??;

        debug!("Handshake completed with {}", addr);
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(drain(reader, addr, Arc::clone(&alive)));

        Ok(Self {
            addr,
            writer: Mutex::new(writer),
            alive,
            reader,
        })
    }

    pub fn addr(&self) -> &SocketAddr {
        &self.addr
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Returns once the bytes are handed to the OS, not once the node got them.
    pub async fn send(&self, frame: &[u8]) -> Result<(), P2pError> {
        if !self.is_alive() {
            return Err(P2pError::Closed(self.addr.to_string()));
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        Ok(())
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Display for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Peer[{}]", self.addr)
    }
}

// Legacy node id handshake:
// we send a query with our cookie, the node answers with its own query and
// its signature of our cookie, then we sign its cookie.
async fn handshake(
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    network: Network,
    node_id: &KeyPair,
    peer: &str,
) -> Result<(), P2pError> {
    let cookie: [u8; COOKIE_SIZE] = rand::random();
    let query = NodeIdHandshake {
        query: Some(cookie),
        response: None,
    };
    writer.write_all(&query.to_frame(network)).await?;

    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let header = MessageHeader::from_bytes(&header)?;
    if header.message_type != MessageType::NodeIdHandshake {
        return Err(P2pError::InvalidHandshake {
            peer: peer.to_string(),
            reason: format!("expected a handshake, got {:?}", header.message_type),
        });
    }
    if header.network != network.magic_byte() {
        return Err(P2pError::InvalidHandshake {
            peer: peer.to_string(),
            reason: format!("peer is on network '{}'", header.network as char),
        });
    }

    let mut payload = vec![0u8; NodeIdHandshake::payload_size(header.extensions)];
    reader.read_exact(&mut payload).await?;
    let received = NodeIdHandshake::from_payload(header.extensions, &payload)?;

    let their_cookie = received.query.ok_or_else(|| P2pError::InvalidHandshake {
        peer: peer.to_string(),
        reason: "missing handshake query".to_string(),
    })?;
    let response = NodeIdHandshake {
        query: None,
        response: Some((*node_id.public_key(), node_id.sign(&their_cookie))),
    };
    writer.write_all(&response.to_frame(network)).await?;
    Ok(())
}

async fn drain(mut reader: OwnedReadHalf, addr: SocketAddr, alive: Arc<AtomicBool>) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                debug!("{} closed the connection", addr);
                break;
            }
            Ok(n) => trace!("Discarding {} bytes from {}", n, addr),
            Err(e) => {
                debug!("Read error from {}: {}", addr, e);
                break;
            }
        }
    }
    alive.store(false, Ordering::Release);
}
