//! Cryptographic primitives for the handshake and traffic layer
//!
//! Provides identity keys, ECDH, session key derivation and the directional
//! AEAD used for all traffic after the handshake.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public, SharedSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// HKDF info label for the session key
const SESSION_INFO: &[u8] = b"netsync-session-v1";
/// HKDF info label for the client's hail proof key
const PROOF_INFO: &[u8] = b"netsync-hail-proof";
const CLIENT_TO_SERVER: &[u8] = b"client_to_server";
const SERVER_TO_CLIENT: &[u8] = b"server_to_client";

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Signature verification failed")]
    SignatureVerificationFailed,
    #[error("AEAD encryption failed")]
    EncryptionFailed,
    #[error("AEAD decryption failed")]
    DecryptionFailed,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("Peer key exchange contribution is degenerate")]
    NonContributory,
    #[error("Nonce counter exhausted")]
    NonceExhausted,
    #[error("Nonce counter {0} already used")]
    Replayed(u64),
}

/// Ed25519 keypair for signing and identity
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from seed bytes (for deterministic testing)
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Get the public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify a signature against a public key
    pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::InvalidKeyLength)?;
        let signature: [u8; 64] = signature
            .try_into()
            .map_err(|_| CryptoError::SignatureVerificationFailed)?;
        let sig = Signature::from_bytes(&signature);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", hex::encode(&self.public_key()[..8]))
    }
}

/// SHA-256 digest helper
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Compare two byte strings in constant time
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// X25519 ephemeral key exchange
pub struct EphemeralKeyExchange {
    secret: EphemeralSecret,
    public: X25519Public,
}

impl EphemeralKeyExchange {
    /// Generate new ephemeral keypair
    pub fn new() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    /// Get the public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Perform key exchange, consuming the secret
    pub fn exchange(self, their_public: &[u8; 32]) -> Result<SharedSecret, CryptoError> {
        let their_public = X25519Public::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        if !shared.was_contributory() {
            return Err(CryptoError::NonContributory);
        }
        Ok(shared)
    }
}

impl Default for EphemeralKeyExchange {
    fn default() -> Self {
        Self::new()
    }
}

/// Symmetric key shared by both ends of a connection
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// `HKDF-SHA256(salt = SHA-256(server_pub || client_pub), ikm = shared)`
    pub fn derive(
        shared: &SharedSecret,
        server_public: &[u8; 32],
        client_public: &[u8; 32],
    ) -> Result<Self, CryptoError> {
        let mut transcript = [0u8; 64];
        transcript[..32].copy_from_slice(server_public);
        transcript[32..].copy_from_slice(client_public);
        let salt = sha256(&transcript);

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared.as_bytes());
        let mut key = Self([0u8; 32]);
        hkdf.expand(SESSION_INFO, &mut key.0)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Ownership proof the client attaches to its hail response.
///
/// `BLAKE3_keyed(HKDF(shared, "netsync-hail-proof"), SHA-256(client_public))`
pub fn hail_proof(shared: &SharedSecret, client_public: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut proof_key = Zeroizing::new([0u8; 32]);
    hkdf.expand(PROOF_INFO, &mut proof_key[..])
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(*blake3::keyed_hash(&proof_key, &sha256(client_public)).as_bytes())
}

/// Which end of the connection a cipher belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRole {
    Client,
    Server,
}

/// Sliding window over received nonce counters
#[derive(Clone, Copy, Debug, Default)]
struct ReplayWindow {
    highest: Option<u64>,
    /// Bit `n` set means `highest - n` was accepted
    seen: u64,
}

impl ReplayWindow {
    const WIDTH: u64 = 64;

    fn check(&self, counter: u64) -> Result<(), CryptoError> {
        let Some(highest) = self.highest else {
            return Ok(());
        };
        if counter > highest {
            return Ok(());
        }
        let age = highest - counter;
        if age >= Self::WIDTH || self.seen & (1 << age) != 0 {
            return Err(CryptoError::Replayed(counter));
        }
        Ok(())
    }

    /// Only called once the packet authenticated
    fn accept(&mut self, counter: u64) {
        match self.highest {
            Some(highest) if counter <= highest => self.seen |= 1 << (highest - counter),
            Some(highest) => {
                let shift = counter - highest;
                self.seen = if shift >= Self::WIDTH { 0 } else { self.seen << shift };
                self.seen |= 1;
                self.highest = Some(counter);
            }
            None => {
                self.seen = 1;
                self.highest = Some(counter);
            }
        }
    }
}

/// Directional AEAD state derived from a [`SessionKey`]
pub struct SessionCipher {
    seal: ChaCha20Poly1305,
    open: ChaCha20Poly1305,
    /// Nonce counter for outgoing packets
    send_counter: u64,
    received: ReplayWindow,
}

impl SessionCipher {
    pub fn new(key: &SessionKey, role: SessionRole) -> Result<Self, CryptoError> {
        let hkdf = Hkdf::<Sha256>::new(None, key.as_bytes());
        let mut client_key = Zeroizing::new([0u8; 32]);
        let mut server_key = Zeroizing::new([0u8; 32]);
        hkdf.expand(CLIENT_TO_SERVER, &mut client_key[..])
            .map_err(|_| CryptoError::KeyDerivationFailed)?;
        hkdf.expand(SERVER_TO_CLIENT, &mut server_key[..])
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        let (seal_key, open_key) = match role {
            SessionRole::Client => (&client_key, &server_key),
            SessionRole::Server => (&server_key, &client_key),
        };
        let seal = ChaCha20Poly1305::new_from_slice(seal_key.as_slice())
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        let open = ChaCha20Poly1305::new_from_slice(open_key.as_slice())
            .map_err(|_| CryptoError::InvalidKeyLength)?;

        Ok(Self {
            seal,
            open,
            send_counter: 0,
            received: ReplayWindow::default(),
        })
    }

    fn nonce(counter: u64) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[4..12].copy_from_slice(&counter.to_le_bytes());
        nonce
    }

    /// Encrypt an outgoing packet body; returns the nonce counter used
    pub fn seal(&mut self, plaintext: &[u8], associated_data: &[u8]) -> Result<(u64, Vec<u8>), CryptoError> {
        let counter = self.send_counter;
        self.send_counter = counter.checked_add(1).ok_or(CryptoError::NonceExhausted)?;
        let nonce_bytes = Self::nonce(counter);
        let ciphertext = self
            .seal
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok((counter, ciphertext))
    }

    /// Decrypt an incoming packet body, refusing counters already accepted
    pub fn open(&mut self, counter: u64, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.received.check(counter)?;
        let nonce_bytes = Self::nonce(counter);
        let plaintext = self
            .open
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;
        self.received.accept(counter);
        Ok(plaintext)
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher")
            .field("send_counter", &self.send_counter)
            .field("highest_received", &self.received.highest)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agreed_keys() -> (SessionKey, SessionKey) {
        let server = EphemeralKeyExchange::new();
        let client = EphemeralKeyExchange::new();
        let server_pub = server.public_key();
        let client_pub = client.public_key();

        let server_shared = server.exchange(&client_pub).unwrap();
        let client_shared = client.exchange(&server_pub).unwrap();
        (
            SessionKey::derive(&server_shared, &server_pub, &client_pub).unwrap(),
            SessionKey::derive(&client_shared, &server_pub, &client_pub).unwrap(),
        )
    }

    #[test]
    fn test_keypair_sign_verify() {
        let kp = KeyPair::generate();
        let msg = b"hello world";
        let sig = kp.sign(msg);

        assert!(KeyPair::verify(&kp.public_key(), msg, &sig).is_ok());
        assert!(KeyPair::verify(&kp.public_key(), b"other", &sig).is_err());
        assert!(KeyPair::verify(&kp.public_key(), msg, &sig[..10]).is_err());
    }

    #[test]
    fn test_session_key_agreement() {
        let (server_key, client_key) = agreed_keys();
        assert_eq!(server_key.as_bytes(), client_key.as_bytes());
    }

    #[test]
    fn test_degenerate_public_rejected() {
        let exchange = EphemeralKeyExchange::new();
        assert!(matches!(
            exchange.exchange(&[0u8; 32]),
            Err(CryptoError::NonContributory)
        ));
    }

    #[test]
    fn test_directional_ciphers() {
        let (server_key, client_key) = agreed_keys();
        let mut server = SessionCipher::new(&server_key, SessionRole::Server).unwrap();
        let mut client = SessionCipher::new(&client_key, SessionRole::Client).unwrap();

        let (n, sealed) = client.seal(b"to server", b"aad").unwrap();
        assert_eq!(server.open(n, &sealed, b"aad").unwrap(), b"to server");
        // a peer cannot open its own direction
        assert!(client.open(n, &sealed, b"aad").is_err());

        let (n, sealed) = server.seal(b"to client", b"aad").unwrap();
        assert_eq!(client.open(n, &sealed, b"aad").unwrap(), b"to client");
        assert!(client.open(n, &sealed, b"different").is_err());
    }

    #[test]
    fn test_nonce_advances() {
        let (key, _) = agreed_keys();
        let mut cipher = SessionCipher::new(&key, SessionRole::Client).unwrap();
        let (a, _) = cipher.seal(b"x", b"").unwrap();
        let (b, _) = cipher.seal(b"x", b"").unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn test_session_key_zeroize() {
        let (mut key, _) = agreed_keys();
        assert_ne!(key.as_bytes(), &[0u8; 32]);
        key.zeroize();
        assert_eq!(key.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_replayed_counter_rejected() {
        let (server_key, client_key) = agreed_keys();
        let mut server = SessionCipher::new(&server_key, SessionRole::Server).unwrap();
        let mut client = SessionCipher::new(&client_key, SessionRole::Client).unwrap();

        let (n, sealed) = client.seal(b"change owner", b"").unwrap();
        assert!(server.open(n, &sealed, b"").is_ok());
        assert!(matches!(
            server.open(n, &sealed, b""),
            Err(CryptoError::Replayed(c)) if c == n
        ));
    }

    #[test]
    fn test_reordered_counters_accepted_once() {
        let (server_key, client_key) = agreed_keys();
        let mut server = SessionCipher::new(&server_key, SessionRole::Server).unwrap();
        let mut client = SessionCipher::new(&client_key, SessionRole::Client).unwrap();

        let first = client.seal(b"a", b"").unwrap();
        let second = client.seal(b"b", b"").unwrap();
        assert!(server.open(second.0, &second.1, b"").is_ok());
        assert!(server.open(first.0, &first.1, b"").is_ok());
        assert!(server.open(first.0, &first.1, b"").is_err());
        assert!(server.open(second.0, &second.1, b"").is_err());
    }

    #[test]
    fn test_failed_open_does_not_burn_counter() {
        let (server_key, client_key) = agreed_keys();
        let mut server = SessionCipher::new(&server_key, SessionRole::Server).unwrap();
        let mut client = SessionCipher::new(&client_key, SessionRole::Client).unwrap();

        let (n, sealed) = client.seal(b"x", b"").unwrap();
        let mut forged = sealed.clone();
        forged[0] ^= 0xff;
        assert!(matches!(server.open(n, &forged, b""), Err(CryptoError::DecryptionFailed)));
        assert_eq!(server.open(n, &sealed, b"").unwrap(), b"x");
    }

    #[test]
    fn test_counter_outside_window_rejected() {
        let mut window = ReplayWindow::default();
        window.accept(0);
        window.accept(ReplayWindow::WIDTH + 5);
        assert!(window.check(0).is_err());
        assert!(window.check(5).is_err());
        assert!(window.check(6).is_ok());
        assert!(window.check(ReplayWindow::WIDTH + 6).is_ok());
    }
}
