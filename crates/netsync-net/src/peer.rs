//! Per-peer connection state

use crate::crypto::{CryptoError, SessionCipher, SessionKey, SessionRole};
use crate::framing::{Frame, FrameError};
use crate::handshake::{ClientHandshake, ServerHandshake};
use bytes::Bytes;
use netsync_core::PeerId;
use std::fmt;

/// Where a connection is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Client: waiting for the server's certificate hail
    AwaitingHail,
    /// Client: key derived, waiting for the server's greeting
    AwaitingGreeting,
    /// Server: hail sent, waiting for the client's response
    AwaitingHailResponse,
    /// Handshake done (or skipped), connection request outstanding
    PendingConnection,
    /// Connection approved
    Connected,
}

/// Handshake that has not produced a key yet
enum PendingHandshake {
    Server(ServerHandshake),
    Client(ClientHandshake),
}

/// A connection to one remote peer
pub struct PeerConnection {
    pub id: PeerId,
    pub state: ConnectionState,
    handshake: Option<PendingHandshake>,
    cipher: Option<SessionCipher>,
    /// Last activity (unix millis)
    pub last_seen: u64,
}

impl PeerConnection {
    pub fn new(id: PeerId, state: ConnectionState) -> Self {
        let mut conn = Self {
            id,
            state,
            handshake: None,
            cipher: None,
            last_seen: 0,
        };
        conn.touch();
        conn
    }

    /// Server side of a connection whose hail was just sent
    pub fn with_server_handshake(id: PeerId, handshake: ServerHandshake) -> Self {
        let mut conn = Self::new(id, ConnectionState::AwaitingHailResponse);
        conn.handshake = Some(PendingHandshake::Server(handshake));
        conn
    }

    /// Client side of a connection waiting for the hail
    pub fn with_client_handshake(id: PeerId, handshake: ClientHandshake) -> Self {
        let mut conn = Self::new(id, ConnectionState::AwaitingHail);
        conn.handshake = Some(PendingHandshake::Client(handshake));
        conn
    }

    /// Take the server handshake out; it never goes back in
    pub fn take_server_handshake(&mut self) -> Option<ServerHandshake> {
        match self.handshake.take() {
            Some(PendingHandshake::Server(handshake)) => Some(handshake),
            other => {
                self.handshake = other;
                None
            }
        }
    }

    pub fn take_client_handshake(&mut self) -> Option<ClientHandshake> {
        match self.handshake.take() {
            Some(PendingHandshake::Client(handshake)) => Some(handshake),
            other => {
                self.handshake = other;
                None
            }
        }
    }

    /// Build the traffic cipher; the key is dropped (and wiped) here
    pub fn install_key(&mut self, key: SessionKey, role: SessionRole) -> Result<(), CryptoError> {
        self.cipher = Some(SessionCipher::new(&key, role)?);
        self.handshake = None;
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Encode a frame for this peer, sealing when a key exists
    pub fn seal(&mut self, frame: &Frame) -> Result<Bytes, FrameError> {
        frame.encode_packet(self.cipher.as_mut())
    }

    /// Decode a packet from this peer
    pub fn open(&mut self, packet: &[u8]) -> Result<Frame, FrameError> {
        Frame::decode_packet(packet, self.cipher.as_mut())
    }

    /// Update last seen time
    pub fn touch(&mut self) {
        use std::time::{SystemTime, UNIX_EPOCH};
        self.last_seen = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("handshake_pending", &self.handshake.is_some())
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::MessageType;
    use crate::handshake::HandshakeConfig;

    const UNSIGNED: HandshakeConfig = HandshakeConfig {
        enable_encryption: true,
        sign_key_exchange: false,
    };

    #[test]
    fn test_handshake_is_taken_once() {
        let (handshake, _) = ServerHandshake::begin(UNSIGNED, None).unwrap().unwrap();
        let mut conn = PeerConnection::with_server_handshake(PeerId(1), handshake);
        assert_eq!(conn.state, ConnectionState::AwaitingHailResponse);

        assert!(conn.take_client_handshake().is_none());
        assert!(conn.take_server_handshake().is_some());
        assert!(conn.take_server_handshake().is_none());
    }

    #[test]
    fn test_key_install_seals_traffic() {
        let (server_hs, hail) = ServerHandshake::begin(UNSIGNED, None).unwrap().unwrap();
        let client_hs = ClientHandshake::new(UNSIGNED, None).unwrap();
        let mut server = PeerConnection::with_server_handshake(PeerId(1), server_hs);
        let mut client = PeerConnection::with_client_handshake(PeerId::SERVER, client_hs);

        let (response, client_key) = client.take_client_handshake().unwrap().on_hail(&hail).unwrap();
        client.install_key(client_key, SessionRole::Client).unwrap();
        let server_key = server.take_server_handshake().unwrap().complete(&response).unwrap();
        server.install_key(server_key, SessionRole::Server).unwrap();
        assert!(server.is_encrypted() && client.is_encrypted());

        let frame = Frame::new(MessageType::ChangeOwner, vec![1, 2]);
        let packet = server.seal(&frame).unwrap();
        assert_eq!(packet[0], 1);
        assert_eq!(client.open(&packet).unwrap(), frame);
        assert!(client.open(&packet).unwrap_err().is_replay());
    }

    #[test]
    fn test_plain_connection() {
        let mut conn = PeerConnection::new(PeerId(2), ConnectionState::PendingConnection);
        assert!(!conn.is_encrypted());
        assert!(!conn.is_connected());
        let frame = Frame::new(MessageType::ConnectionRequest, vec![]);
        let packet = conn.seal(&frame).unwrap();
        assert_eq!(conn.open(&packet).unwrap(), frame);
        assert!(conn.last_seen > 0);
    }
}
