use crate::{
    block::{EncodedBlock, ENCODED_BLOCK_SIZE},
    crypto::{PublicKey, Signature, HASH_SIZE, PUBLIC_KEY_SIZE, SIGNATURE_SIZE},
    network::Network,
};

use super::P2pError;

pub const HEADER_SIZE: usize = 8;
pub const HEADER_MAGIC: u8 = b'R';

pub const PROTOCOL_VERSION_MAX: u8 = 0x14;
pub const PROTOCOL_VERSION_USING: u8 = 0x14;
pub const PROTOCOL_VERSION_MIN: u8 = 0x12;

pub const COOKIE_SIZE: usize = HASH_SIZE;

// Block type lives in bits 8..12 of the extensions
const BLOCK_TYPE_STATE: u16 = 6;
const BLOCK_TYPE_SHIFT: u16 = 8;

const HANDSHAKE_QUERY_FLAG: u16 = 0x0001;
const HANDSHAKE_RESPONSE_FLAG: u16 = 0x0002;
const HANDSHAKE_RESPONSE_SIZE: usize = PUBLIC_KEY_SIZE + SIGNATURE_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Keepalive = 0x02,
    Publish = 0x03,
    ConfirmReq = 0x04,
    ConfirmAck = 0x05,
    NodeIdHandshake = 0x0a,
}

impl TryFrom<u8> for MessageType {
    type Error = P2pError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x02 => Self::Keepalive,
            0x03 => Self::Publish,
            0x04 => Self::ConfirmReq,
            0x05 => Self::ConfirmAck,
            0x0a => Self::NodeIdHandshake,
            other => {
                return Err(P2pError::InvalidHeader(format!(
                    "unsupported message type {:#04x}",
                    other
                )))
            }
        })
    }
}

/// 8 bytes header prefixed to every message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub network: u8,
    pub version_max: u8,
    pub version_using: u8,
    pub version_min: u8,
    pub message_type: MessageType,
    pub extensions: u16,
}

impl MessageHeader {
    pub fn new(network: Network, message_type: MessageType, extensions: u16) -> Self {
        Self {
            network: network.magic_byte(),
            version_max: PROTOCOL_VERSION_MAX,
            version_using: PROTOCOL_VERSION_USING,
            version_min: PROTOCOL_VERSION_MIN,
            message_type,
            extensions,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let extensions = self.extensions.to_le_bytes();
        [
            HEADER_MAGIC,
            self.network,
            self.version_max,
            self.version_using,
            self.version_min,
            self.message_type as u8,
            extensions[0],
            extensions[1],
        ]
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self, P2pError> {
        if bytes[0] != HEADER_MAGIC {
            return Err(P2pError::InvalidHeader(format!("bad magic {:#04x}", bytes[0])));
        }
        Ok(Self {
            network: bytes[1],
            version_max: bytes[2],
            version_using: bytes[3],
            version_min: bytes[4],
            message_type: MessageType::try_from(bytes[5])?,
            extensions: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// Header and payload of a `publish` message carrying one state block.
pub fn publish_frame(network: Network, block: &EncodedBlock) -> Vec<u8> {
    let header = MessageHeader::new(
        network,
        MessageType::Publish,
        BLOCK_TYPE_STATE << BLOCK_TYPE_SHIFT,
    );
    let mut frame = Vec::with_capacity(HEADER_SIZE + ENCODED_BLOCK_SIZE);
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(block.as_bytes());
    frame
}

/// Node id handshake: a query carries a random cookie, a response carries
/// the responder node id and its signature of the peer's cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdHandshake {
    pub query: Option<[u8; COOKIE_SIZE]>,
    pub response: Option<(PublicKey, Signature)>,
}

impl NodeIdHandshake {
    pub fn extensions(&self) -> u16 {
        let mut extensions = 0;
        if self.query.is_some() {
            extensions |= HANDSHAKE_QUERY_FLAG;
        }
        if self.response.is_some() {
            extensions |= HANDSHAKE_RESPONSE_FLAG;
        }
        extensions
    }

    /// Payload size announced by the header extensions.
    pub fn payload_size(extensions: u16) -> usize {
        let mut size = 0;
        if extensions & HANDSHAKE_QUERY_FLAG != 0 {
            size += COOKIE_SIZE;
        }
        if extensions & HANDSHAKE_RESPONSE_FLAG != 0 {
            size += HANDSHAKE_RESPONSE_SIZE;
        }
        size
    }

    pub fn to_frame(&self, network: Network) -> Vec<u8> {
        let header = MessageHeader::new(network, MessageType::NodeIdHandshake, self.extensions());
        let mut frame = Vec::with_capacity(HEADER_SIZE + Self::payload_size(self.extensions()));
        frame.extend_from_slice(&header.to_bytes());
        if let Some(cookie) = &self.query {
            frame.extend_from_slice(cookie);
        }
        if let Some((node_id, signature)) = &self.response {
            frame.extend_from_slice(node_id.as_bytes());
            frame.extend_from_slice(signature.as_bytes());
        }
        frame
    }

    pub fn from_payload(extensions: u16, payload: &[u8]) -> Result<Self, P2pError> {
        let expected = Self::payload_size(extensions);
        if payload.len() != expected {
            return Err(P2pError::InvalidHeader(format!(
                "handshake payload of {} bytes, expected {}",
                payload.len(),
                expected
            )));
        }

        let mut offset = 0;
        let query = if extensions & HANDSHAKE_QUERY_FLAG != 0 {
            let mut cookie = [0u8; COOKIE_SIZE];
            cookie.copy_from_slice(&payload[..COOKIE_SIZE]);
            offset += COOKIE_SIZE;
            Some(cookie)
        } else {
            None
        };

        let response = if extensions & HANDSHAKE_RESPONSE_FLAG != 0 {
            let mut node_id = [0u8; PUBLIC_KEY_SIZE];
            node_id.copy_from_slice(&payload[offset..offset + PUBLIC_KEY_SIZE]);
            let mut signature = [0u8; SIGNATURE_SIZE];
            signature.copy_from_slice(&payload[offset + PUBLIC_KEY_SIZE..]);
            Some((PublicKey::from_bytes(node_id), Signature::from_bytes(signature)))
        } else {
            None
        };

        Ok(Self { query, response })
    }
}
