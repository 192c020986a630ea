//! Signed requests.
//!
//! A principal is the hex encoding of an ed25519 verifying key. Every write
//! to the ledger node carries four headers: the principal, the signing time
//! in unix milliseconds, a random nonce, and a signature over
//! [`signing_message`]. The node checks the signature, rejects stale or
//! replayed requests, and only then acts as that principal.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

pub const PRINCIPAL_HEADER: &str = "x-escrow-principal";
pub const ISSUED_AT_HEADER: &str = "x-escrow-issued-at";
pub const NONCE_HEADER: &str = "x-escrow-nonce";
pub const SIGNATURE_HEADER: &str = "x-escrow-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("principal must be a 32-byte ed25519 public key in hex")]
    MalformedPrincipal,
    #[error("secret key must be a 32-byte seed in hex")]
    MalformedSecret,
    #[error("signature must be 64 bytes in hex")]
    MalformedSignature,
    #[error("signature does not match principal {0}")]
    BadSignature(String),
}

/// Bytes covered by the signature: method, path, time, nonce, then the raw body.
pub fn signing_message(method: &str, path: &str, issued_at: i64, nonce: u64, body: &[u8]) -> Vec<u8> {
    let mut message = format!("{method}\n{path}\n{issued_at}\n{nonce}\n").into_bytes();
    message.extend_from_slice(body);
    message
}

pub fn parse_principal(principal: &str) -> Result<VerifyingKey, AuthError> {
    let bytes = hex::decode(principal).map_err(|_| AuthError::MalformedPrincipal)?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| AuthError::MalformedPrincipal)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| AuthError::MalformedPrincipal)
}

pub fn verify(
    principal: &str,
    signature: &str,
    method: &str,
    path: &str,
    issued_at: i64,
    nonce: u64,
    body: &[u8],
) -> Result<(), AuthError> {
    let key = parse_principal(principal)?;
    let bytes = hex::decode(signature).map_err(|_| AuthError::MalformedSignature)?;
    let bytes: [u8; 64] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| AuthError::MalformedSignature)?;
    let signature = Signature::from_bytes(&bytes);
    key.verify(&signing_message(method, path, issued_at, nonce, body), &signature)
        .map_err(|_| AuthError::BadSignature(principal.to_string()))
}

/// Headers to attach to one signed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedHeaders {
    pub principal: String,
    pub issued_at: i64,
    pub nonce: u64,
    pub signature: String,
}

impl SignedHeaders {
    pub fn pairs(&self) -> [(&'static str, String); 4] {
        [
            (PRINCIPAL_HEADER, self.principal.clone()),
            (ISSUED_AT_HEADER, self.issued_at.to_string()),
            (NONCE_HEADER, self.nonce.to_string()),
            (SIGNATURE_HEADER, self.signature.clone()),
        ]
    }
}

/// A signing identity. `Debug` shows the principal only.
#[derive(Clone)]
pub struct Credential {
    key: SigningKey,
}

impl Credential {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn from_hex(secret: &str) -> Result<Self, AuthError> {
        let bytes = hex::decode(secret.trim()).map_err(|_| AuthError::MalformedSecret)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::MalformedSecret)?;
        Ok(Self::from_seed(seed))
    }

    pub fn principal(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    pub fn sign(&self, method: &str, path: &str, body: &[u8], issued_at: i64, nonce: u64) -> SignedHeaders {
        let signature = self
            .key
            .sign(&signing_message(method, path, issued_at, nonce, body));
        SignedHeaders {
            principal: self.principal(),
            issued_at,
            nonce,
            signature: hex::encode(signature.to_bytes()),
        }
    }

    /// Sign with the current time and a fresh random nonce.
    pub fn sign_now(&self, method: &str, path: &str, body: &[u8]) -> SignedHeaders {
        self.sign(
            method,
            path,
            body,
            chrono::Utc::now().timestamp_millis(),
            rand::random(),
        )
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("principal", &self.principal())
            .finish_non_exhaustive()
    }
}
