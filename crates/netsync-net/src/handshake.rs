//! Hail handshake
//!
//! Server: send [`CertificateHail`] on connect, verify the client's
//! [`HailResponse`], derive the session key.
//! Client: verify the hail against its [`TrustAnchor`], answer with its own
//! ephemeral key and proof, derive the same session key.
//!
//! Both handshake objects are consumed when the key is derived, taking the
//! ephemeral secret with them.

use crate::certificate::{CertificateError, ServerIdentity, TrustAnchor};
use crate::crypto::{
    constant_time_eq, hail_proof, sha256, CryptoError, EphemeralKeyExchange, KeyPair, SessionKey,
};
use crate::messages::{CertificateHail, HailResponse};
use netsync_core::NetworkConfig;
use thiserror::Error;
use tracing::{debug, warn};

/// Handshake errors
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("certificate rejected: {0}")]
    Certificate(#[from] CertificateError),
    #[error("key exchange signature is invalid")]
    InvalidSignature,
    #[error("hail proof does not match")]
    ProofMismatch,
    #[error("hail is missing {0}")]
    Missing(&'static str),
    #[error("signed key exchange requires a server identity")]
    MissingIdentity,
    #[error("signed key exchange requires a trust anchor")]
    MissingTrustAnchor,
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("encryption is disabled")]
    EncryptionDisabled,
}

impl HandshakeError {
    /// Failures caused by what the remote sent, as opposed to local setup
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            HandshakeError::Certificate(_)
                | HandshakeError::InvalidSignature
                | HandshakeError::ProofMismatch
                | HandshakeError::Missing(_)
                | HandshakeError::Crypto(_)
        )
    }
}

/// The configuration bits the handshake depends on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub enable_encryption: bool,
    pub sign_key_exchange: bool,
}

impl From<&NetworkConfig> for HandshakeConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            enable_encryption: config.enable_encryption,
            sign_key_exchange: config.sign_key_exchange,
        }
    }
}

/// Server half of a handshake in progress
pub struct ServerHandshake {
    config: HandshakeConfig,
    exchange: EphemeralKeyExchange,
    server_public: [u8; 32],
}

impl ServerHandshake {
    /// Start a handshake for a newly connected peer.
    ///
    /// Returns `None` when encryption is off: the peer goes straight to the
    /// connection request.
    pub fn begin(
        config: HandshakeConfig,
        identity: Option<&ServerIdentity>,
    ) -> Result<Option<(Self, CertificateHail)>, HandshakeError> {
        if !config.enable_encryption {
            return Ok(None);
        }

        let exchange = EphemeralKeyExchange::new();
        let server_public = exchange.public_key();
        let hail = if config.sign_key_exchange {
            let identity = identity.ok_or(HandshakeError::MissingIdentity)?;
            let signature = identity.signing_key.sign(&sha256(&server_public));
            CertificateHail {
                certificate: Some(identity.certificate.clone()),
                server_public,
                signature: Some(signature.to_vec()),
            }
        } else {
            warn!("key exchange is unauthenticated");
            CertificateHail {
                certificate: None,
                server_public,
                signature: None,
            }
        };

        Ok(Some((
            Self {
                config,
                exchange,
                server_public,
            },
            hail,
        )))
    }

    /// Check the client's response and derive the session key
    pub fn complete(self, response: &HailResponse) -> Result<SessionKey, HandshakeError> {
        let shared = self.exchange.exchange(&response.client_public)?;

        if self.config.sign_key_exchange {
            let proof = response.proof.ok_or(HandshakeError::Missing("proof"))?;
            let expected = hail_proof(&shared, &response.client_public)?;
            if !constant_time_eq(&proof, &expected) {
                return Err(HandshakeError::ProofMismatch);
            }
        }

        let key = SessionKey::derive(&shared, &self.server_public, &response.client_public)?;
        debug!("server session key derived");
        Ok(key)
    }
}

/// Client half of a handshake, waiting for the server's hail
#[derive(Debug)]
pub struct ClientHandshake {
    config: HandshakeConfig,
    anchor: Option<TrustAnchor>,
}

impl ClientHandshake {
    pub fn new(config: HandshakeConfig, anchor: Option<TrustAnchor>) -> Result<Self, HandshakeError> {
        if !config.enable_encryption {
            return Err(HandshakeError::EncryptionDisabled);
        }
        if config.sign_key_exchange && anchor.is_none() {
            return Err(HandshakeError::MissingTrustAnchor);
        }
        Ok(Self { config, anchor })
    }

    /// Verify the hail and produce our response plus the session key.
    ///
    /// The certificate and signature are checked before any key material
    /// of our own is generated.
    pub fn on_hail(self, hail: &CertificateHail) -> Result<(HailResponse, SessionKey), HandshakeError> {
        if self.config.sign_key_exchange {
            let anchor = self.anchor.as_ref().ok_or(HandshakeError::MissingTrustAnchor)?;
            let certificate = hail
                .certificate
                .as_ref()
                .ok_or(HandshakeError::Missing("certificate"))?;
            certificate.verify(&anchor.hostname, &anchor.authority_key)?;

            let signature = hail
                .signature
                .as_deref()
                .ok_or(HandshakeError::Missing("signature"))?;
            KeyPair::verify(&certificate.subject_key, &sha256(&hail.server_public), signature)
                .map_err(|_| HandshakeError::InvalidSignature)?;
            debug!(fingerprint = %certificate.fingerprint(), "server certificate accepted");
        } else {
            warn!("key exchange is unauthenticated");
        }

        let exchange = EphemeralKeyExchange::new();
        let client_public = exchange.public_key();
        let shared = exchange.exchange(&hail.server_public)?;
        let proof = if self.config.sign_key_exchange {
            Some(hail_proof(&shared, &client_public)?)
        } else {
            None
        };
        let key = SessionKey::derive(&shared, &hail.server_public, &client_public)?;

        Ok((
            HailResponse {
                client_public,
                proof,
            },
            key,
        ))
    }
}
