// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attestation signing.
//!
//! An attestation signature is a secp256k1 signature over the personal-message
//! digest of the raw message:
//!
//! ```text
//! digest = keccak256("\x19Ethereum Signed Message:\n" || len(h) || h)
//!     h  = keccak256(raw_message)
//! ```
//!
//! The 65-byte result is `r || s || v` with `v` in the legacy `{27, 28}` range,
//! which is what on-chain `ecrecover`-based verifiers expect.
//!
//! Key material comes either as a hex string or as a PEM file (SEC1 or
//! PKCS#8).

use alloy::{
    primitives::{keccak256, Address, Bytes, Signature, B256},
    signers::{local::PrivateKeySigner, SignerSync},
};
use k256::SecretKey;

/// Stamp prepended to the message hash; the hash length follows it in decimal.
pub const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Length of an encoded attestation signature.
pub const SIGNATURE_LEN: usize = 65;

const LEGACY_RECOVERY_OFFSET: u8 = 27;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
}

/// Compute the digest that gets signed for `raw_message`.
pub fn personal_message_digest(raw_message: &[u8]) -> B256 {
    let message_hash = keccak256(raw_message);
    let stamp = format!("{PERSONAL_MESSAGE_PREFIX}{}", message_hash.len());

    let mut prefixed = Vec::with_capacity(stamp.len() + message_hash.len());
    prefixed.extend_from_slice(stamp.as_bytes());
    prefixed.extend_from_slice(message_hash.as_slice());
    keccak256(&prefixed)
}

/// Map a raw recovery id (0 or 1) onto the legacy 27/28 convention.
///
/// Anything else is passed through untouched.
pub fn normalize_recovery_id(v: u8) -> u8 {
    match v {
        0 | 1 => v + LEGACY_RECOVERY_OFFSET,
        other => other,
    }
}

/// Recover the address that produced `signature` over `raw_message`.
pub fn recover_attestor(raw_message: &[u8], signature: &[u8]) -> Result<Address, SignerError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SignerError::InvalidSignature(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }
    let signature = Signature::try_from(signature)
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    signature
        .recover_address_from_prehash(&personal_message_digest(raw_message))
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))
}

/// Holds the attestor key and signs raw messages.
#[derive(Clone)]
pub struct AttestationSigner {
    signer: PrivateKeySigner,
}

impl std::fmt::Debug for AttestationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl AttestationSigner {
    /// Build a signer from a hex-encoded key, with or without `0x`.
    pub fn from_hex(private_key_hex: &str) -> Result<Self, SignerError> {
        let trimmed = private_key_hex.trim();
        let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let key_bytes = alloy::hex::decode(hex)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;

        let signer = PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Build a signer from a PEM-encoded key (SEC1 or PKCS#8).
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, SignerError> {
        let secret_key = parse_pem_secret_key(pem_bytes)?;
        let signer = PrivateKeySigner::from_slice(secret_key.to_bytes().as_slice())
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Address that verifiers will recover from our signatures.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign `raw_message`, returning the 65-byte `r || s || v` encoding.
    pub fn sign(&self, raw_message: &[u8]) -> Result<Bytes, SignerError> {
        let digest = personal_message_digest(raw_message);
        let signature = self
            .signer
            .sign_hash_sync(&digest)
            .map_err(|e| SignerError::Signing(e.to_string()))?;

        let mut encoded = Vec::with_capacity(SIGNATURE_LEN);
        encoded.extend_from_slice(&signature.r().to_be_bytes::<32>());
        encoded.extend_from_slice(&signature.s().to_be_bytes::<32>());
        encoded.push(normalize_recovery_id(u8::from(signature.v())));
        Ok(Bytes::from(encoded))
    }
}

fn parse_pem_secret_key(pem_bytes: &[u8]) -> Result<SecretKey, SignerError> {
    use k256::pkcs8::DecodePrivateKey;

    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| SignerError::InvalidPrivateKey(format!("Invalid UTF-8: {e}")))?;
    let pem = pem::parse(pem_str)
        .map_err(|e| SignerError::InvalidPrivateKey(format!("Invalid PEM: {e}")))?;

    SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| SecretKey::from_pkcs8_der(pem.contents()))
        .map_err(|e| SignerError::InvalidPrivateKey(format!("Invalid key format: {e}")))
}
