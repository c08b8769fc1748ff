//! Server certificates
//!
//! A certificate binds a hostname to the server's ed25519 signing key and is
//! signed by an authority the clients trust. Clients check it during the hail
//! before trusting the server's key exchange material.

use crate::crypto::KeyPair;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain prefix for certificate signatures
const DOMAIN_CERT_SIG: &[u8] = b"netsync-cert";

/// Certificate errors
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate issued for {actual}, expected {expected}")]
    HostnameMismatch { expected: String, actual: String },
    #[error("certificate issuer is not trusted")]
    UntrustedIssuer,
    #[error("certificate signature is invalid")]
    InvalidSignature,
    #[error("certificate encoding error: {0}")]
    Encoding(#[from] postcard::Error),
}

/// Signed binding of hostname to server signing key
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    pub hostname: String,
    /// Server ed25519 public key
    pub subject_key: [u8; 32],
    /// Authority ed25519 public key
    pub issuer_key: [u8; 32],
    /// Ed25519 signature over ("netsync-cert" || canonical_bytes(body))
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct CertificateBody<'a> {
    hostname: &'a str,
    subject_key: &'a [u8; 32],
    issuer_key: &'a [u8; 32],
}

impl Certificate {
    /// Issue a certificate for `hostname` signed by `authority`
    pub fn issue(
        authority: &KeyPair,
        hostname: impl Into<String>,
        subject_key: [u8; 32],
    ) -> Result<Self, CertificateError> {
        let hostname = hostname.into();
        let issuer_key = authority.public_key();
        let bytes = Self::sign_bytes(&hostname, &subject_key, &issuer_key)?;
        let signature = authority.sign(&bytes).to_vec();
        Ok(Self {
            hostname,
            subject_key,
            issuer_key,
            signature,
        })
    }

    fn sign_bytes(
        hostname: &str,
        subject_key: &[u8; 32],
        issuer_key: &[u8; 32],
    ) -> Result<Vec<u8>, CertificateError> {
        let body = postcard::to_allocvec(&CertificateBody {
            hostname,
            subject_key,
            issuer_key,
        })?;
        let mut bytes = Vec::with_capacity(DOMAIN_CERT_SIG.len() + body.len());
        bytes.extend_from_slice(DOMAIN_CERT_SIG);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Check hostname, issuer and signature
    pub fn verify(&self, expected_hostname: &str, trusted_issuer: &[u8; 32]) -> Result<(), CertificateError> {
        if !self.hostname.eq_ignore_ascii_case(expected_hostname) {
            return Err(CertificateError::HostnameMismatch {
                expected: expected_hostname.to_string(),
                actual: self.hostname.clone(),
            });
        }
        if &self.issuer_key != trusted_issuer {
            return Err(CertificateError::UntrustedIssuer);
        }
        let bytes = Self::sign_bytes(&self.hostname, &self.subject_key, &self.issuer_key)?;
        KeyPair::verify(&self.issuer_key, &bytes, &self.signature)
            .map_err(|_| CertificateError::InvalidSignature)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CertificateError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// Short hex fingerprint for logs
    pub fn fingerprint(&self) -> String {
        hex::encode(&blake3::hash(&self.subject_key).as_bytes()[..8])
    }
}

/// Server-side certificate and matching signing key
#[derive(Clone, Debug)]
pub struct ServerIdentity {
    pub certificate: Certificate,
    pub signing_key: KeyPair,
}

impl ServerIdentity {
    /// Generate a signing key and have `authority` certify it
    pub fn issue(authority: &KeyPair, hostname: impl Into<String>) -> Result<Self, CertificateError> {
        let signing_key = KeyPair::generate();
        let certificate = Certificate::issue(authority, hostname, signing_key.public_key())?;
        Ok(Self {
            certificate,
            signing_key,
        })
    }
}

/// What a client checks the server certificate against
#[derive(Clone, Debug)]
pub struct TrustAnchor {
    /// Hostname the client connected to
    pub hostname: String,
    /// Public key of the trusted authority
    pub authority_key: [u8; 32],
}
