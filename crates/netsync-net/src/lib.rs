//! Networking primitives for the netsync protocol
//!
//! This crate provides:
//! - Identity keys, ephemeral key exchange and session ciphers
//! - Server certificates and the hail handshake
//! - Message tags, packet sealing and wire messages
//! - Per-peer connection state and the transport abstraction

pub mod certificate;
pub mod crypto;
pub mod framing;
pub mod handshake;
pub mod messages;
pub mod peer;
pub mod transport;

pub use certificate::{Certificate, ServerIdentity, TrustAnchor};
pub use crypto::{KeyPair, SessionCipher, SessionKey, SessionRole};
pub use framing::{Frame, FrameError, MessageType, PacketCodec};
pub use handshake::{ClientHandshake, HandshakeConfig, HandshakeError, ServerHandshake};
pub use messages::{WireContext, WireMessage};
pub use peer::{ConnectionState, PeerConnection};
pub use transport::{
    ChannelId, LoopbackHub, LoopbackTransport, Transport, TransportError, TransportEvent,
};
