// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Attestation Data Models
//!
//! [`Attestation`] is the unit produced by the service and owned by the
//! store. [`Receipt`] is its wire form on the receipts endpoint: addresses
//! in lower-case hex, amount as a decimal string, message and signature as
//! `0x`-prefixed hex.

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::codec::{address_to_hex, Envelope};

/// Store-assigned identifier; increases with insertion order.
pub type AttestationId = u64;

/// A signed message observed on the source chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub nonce: u64,
    pub sender: Address,
    pub recipient: Address,
    pub source_domain: u32,
    pub dest_domain: u32,
    pub amount: U256,
    pub raw_message: Bytes,
    pub signature: Bytes,
}

impl Attestation {
    /// Assemble an attestation from a decoded envelope and its signature.
    pub fn from_envelope(envelope: &Envelope, raw_message: &[u8], signature: Bytes) -> Self {
        Self {
            nonce: envelope.nonce,
            sender: envelope.sender,
            recipient: envelope.recipient,
            source_domain: envelope.source_domain,
            dest_domain: envelope.dest_domain,
            amount: envelope.burn.amount,
            raw_message: Bytes::copy_from_slice(raw_message),
            signature,
        }
    }
}

// =============================================================================
// API Models
// =============================================================================

/// Attestation as returned to relayers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Receipt {
    /// Message nonce, unique per source domain.
    pub nonce: u64,
    /// Message sender (lower-case hex).
    pub sender: String,
    /// Message recipient (lower-case hex).
    pub receiver: String,
    /// Originating domain.
    pub source_domain: u32,
    /// Destination domain.
    pub dest_domain: u32,
    /// Burned amount as a decimal string.
    pub amount: String,
    /// Raw message bytes, `0x` hex.
    pub message: String,
    /// 65-byte attestation signature, `0x` hex.
    pub signature: String,
}

impl From<&Attestation> for Receipt {
    fn from(attestation: &Attestation) -> Self {
        Self {
            nonce: attestation.nonce,
            sender: address_to_hex(&attestation.sender),
            receiver: address_to_hex(&attestation.recipient),
            source_domain: attestation.source_domain,
            dest_domain: attestation.dest_domain,
            amount: attestation.amount.to_string(),
            message: format!("0x{}", alloy::hex::encode(&attestation.raw_message)),
            signature: format!("0x{}", alloy::hex::encode(&attestation.signature)),
        }
    }
}

/// Response to an accepted attestation request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AttestResponse {
    /// Identifier of the stored attestation (unchanged on resubmission).
    pub id: AttestationId,
    /// Source transaction, when the caller supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_uses_canonical_text_forms() {
        let attestation = Attestation {
            nonce: 7,
            sender: "0xAbCdEf0000000000000000000000000000000001".parse().unwrap(),
            recipient: "0x798D4BA9BAF0064EC19EB4F0A1A45785AE9D6DFC".parse().unwrap(),
            source_domain: 1,
            dest_domain: 2,
            amount: U256::from(1_000_000_000_000_000_000u128),
            raw_message: Bytes::from_static(&[0xDE, 0xAD]),
            signature: Bytes::from_static(&[0xBE, 0xEF]),
        };

        let receipt = Receipt::from(&attestation);
        assert_eq!(receipt.sender, "0xabcdef0000000000000000000000000000000001");
        assert_eq!(receipt.receiver, "0x798d4ba9baf0064ec19eb4f0a1a45785ae9d6dfc");
        assert_eq!(receipt.amount, "1000000000000000000");
        assert_eq!(receipt.message, "0xdead");
        assert_eq!(receipt.signature, "0xbeef");
    }

    #[test]
    fn attest_response_omits_missing_tx_hash() {
        let body = serde_json::to_string(&AttestResponse { id: 3, tx_hash: None }).unwrap();
        assert_eq!(body, r#"{"id":3}"#);
    }
}
