//! Message framing for network transport
//!
//! Packet layout:
//! - 1 byte: flags (bit 0 = sealed)
//! - plain body: 1 byte message tag, N bytes payload
//! - sealed body: 8 bytes nonce counter (big-endian), AEAD(tag || payload)
//!
//! Handshake messages always travel plain. Once a connection has a session
//! cipher, every other message must be sealed.

use crate::crypto::{CryptoError, SessionCipher};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum packet size (16 MB)
const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

const FLAG_SEALED: u8 = 0b0000_0001;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Packet too large: {0} bytes (max {MAX_PACKET_SIZE})")]
    TooLarge(usize),
    #[error("Packet truncated")]
    Truncated,
    #[error("Unknown packet flags: {0:#04x}")]
    UnknownFlags(u8),
    #[error("Unknown message type: {0}")]
    UnknownType(u8),
    #[error("Plain {0:?} packet on an encrypted connection")]
    PlaintextAfterHandshake(MessageType),
    #[error("Sealed packet before a session key exists")]
    SealedWithoutKey,
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Failures that point at tampering rather than a buggy peer
    pub fn is_security_failure(&self) -> bool {
        matches!(self, FrameError::Crypto(_) | FrameError::PlaintextAfterHandshake(_)) && !self.is_replay()
    }

    /// A sealed packet whose counter was already accepted
    pub fn is_replay(&self) -> bool {
        matches!(self, FrameError::Crypto(CryptoError::Replayed(_)))
    }
}

/// Message types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Server certificate and key exchange material
    CertificateHail = 0,
    /// Client key exchange material
    HailResponse = 1,
    /// Server accepted the handshake
    Greetings = 2,
    ConnectionRequest = 3,
    /// Carries the full object snapshot
    ConnectionApproved = 4,
    AddObject = 5,
    AddObjects = 6,
    DestroyObject = 7,
    SwitchScene = 8,
    ClientSwitchSceneCompleted = 9,
    ChangeOwner = 10,
    NetworkedVarDelta = 11,
    NetworkedVarUpdate = 12,
    ServerRpc = 13,
    ServerRpcRequest = 14,
    ServerRpcResponse = 15,
    ClientRpc = 16,
    ClientRpcRequest = 17,
    ClientRpcResponse = 18,
    CustomMessage = 19,
    TimeSync = 20,
}

impl MessageType {
    /// Messages exchanged before a session key exists
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            MessageType::CertificateHail | MessageType::HailResponse | MessageType::Greetings
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::CertificateHail,
            1 => Self::HailResponse,
            2 => Self::Greetings,
            3 => Self::ConnectionRequest,
            4 => Self::ConnectionApproved,
            5 => Self::AddObject,
            6 => Self::AddObjects,
            7 => Self::DestroyObject,
            8 => Self::SwitchScene,
            9 => Self::ClientSwitchSceneCompleted,
            10 => Self::ChangeOwner,
            11 => Self::NetworkedVarDelta,
            12 => Self::NetworkedVarUpdate,
            13 => Self::ServerRpc,
            14 => Self::ServerRpcRequest,
            15 => Self::ServerRpcResponse,
            16 => Self::ClientRpc,
            17 => Self::ClientRpcRequest,
            18 => Self::ClientRpcResponse,
            19 => Self::CustomMessage,
            20 => Self::TimeSync,
            _ => return Err(FrameError::UnknownType(value)),
        })
    }
}

/// A framed message: raw tag plus payload
///
/// The tag stays raw so the dispatcher, not the framing layer, decides what
/// an unknown tag means.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            tag: message_type as u8,
            payload,
        }
    }

    pub fn message_type(&self) -> Result<MessageType, FrameError> {
        MessageType::try_from(self.tag)
    }

    fn is_handshake(&self) -> bool {
        self.message_type().map(|t| t.is_handshake()).unwrap_or(false)
    }

    /// Encode into a packet, sealing unless this is a handshake message
    pub fn encode_packet(&self, cipher: Option<&mut SessionCipher>) -> Result<Bytes, FrameError> {
        let body_len = 1 + self.payload.len();
        if body_len + 1 > MAX_PACKET_SIZE {
            return Err(FrameError::TooLarge(body_len + 1));
        }

        let mut packet = BytesMut::with_capacity(body_len + 32);
        match cipher {
            Some(cipher) if !self.is_handshake() => {
                let mut body = Vec::with_capacity(body_len);
                body.push(self.tag);
                body.extend_from_slice(&self.payload);
                let (counter, sealed) = cipher.seal(&body, &[FLAG_SEALED])?;
                packet.put_u8(FLAG_SEALED);
                packet.put_u64(counter);
                packet.put_slice(&sealed);
            }
            _ => {
                packet.put_u8(0);
                packet.put_u8(self.tag);
                packet.put_slice(&self.payload);
            }
        }
        Ok(packet.freeze())
    }

    /// Decode a packet, opening it if sealed
    pub fn decode_packet(packet: &[u8], cipher: Option<&mut SessionCipher>) -> Result<Frame, FrameError> {
        if packet.len() > MAX_PACKET_SIZE {
            return Err(FrameError::TooLarge(packet.len()));
        }
        let mut buf = packet;
        if !buf.has_remaining() {
            return Err(FrameError::Truncated);
        }
        let flags = buf.get_u8();
        match flags {
            0 => {
                if !buf.has_remaining() {
                    return Err(FrameError::Truncated);
                }
                let tag = buf.get_u8();
                let frame = Frame {
                    tag,
                    payload: buf.to_vec(),
                };
                if cipher.is_some() {
                    if let Ok(message_type) = frame.message_type() {
                        if !message_type.is_handshake() {
                            return Err(FrameError::PlaintextAfterHandshake(message_type));
                        }
                    }
                }
                Ok(frame)
            }
            FLAG_SEALED => {
                let cipher = cipher.ok_or(FrameError::SealedWithoutKey)?;
                if buf.remaining() < 8 {
                    return Err(FrameError::Truncated);
                }
                let counter = buf.get_u64();
                let body = cipher.open(counter, buf, &[FLAG_SEALED])?;
                let (tag, payload) = body.split_first().ok_or(FrameError::Truncated)?;
                Ok(Frame {
                    tag: *tag,
                    payload: payload.to_vec(),
                })
            }
            other => Err(FrameError::UnknownFlags(other)),
        }
    }
}

/// Codec for length-prefixed packets on byte-stream transports
///
/// Wire format:
/// - 4 bytes: packet length (big-endian)
/// - N bytes: packet
#[derive(Debug, Default)]
pub struct PacketCodec;

impl PacketCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for PacketCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        // Peek at length
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > MAX_PACKET_SIZE {
            return Err(FrameError::TooLarge(length));
        }
        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<Bytes> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_PACKET_SIZE {
            return Err(FrameError::TooLarge(item.len()));
        }
        dst.reserve(4 + item.len());
        dst.put_u32(item.len() as u32);
        dst.put_slice(&item);
        Ok(())
    }
}
