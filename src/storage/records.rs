// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted attestation row.
//!
//! Every column is plain text or an integer so the row stays readable with
//! any JSON tool: addresses in lower-case hex, amount in decimal, message and
//! signature as `0x` hex.

use std::str::FromStr;

use alloy::primitives::{Address, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::codec::address_to_hex;
use crate::models::{Attestation, AttestationId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredAttestation {
    pub id: AttestationId,
    pub nonce: u64,
    pub sender: String,
    pub receiver: String,
    pub source_domain: u32,
    pub dest_domain: u32,
    pub amount: String,
    pub message: String,
    pub signature: String,
    pub created_at: DateTime<Utc>,
}

impl StoredAttestation {
    pub fn new(id: AttestationId, attestation: &Attestation) -> Self {
        Self {
            id,
            nonce: attestation.nonce,
            sender: address_to_hex(&attestation.sender),
            receiver: address_to_hex(&attestation.recipient),
            source_domain: attestation.source_domain,
            dest_domain: attestation.dest_domain,
            amount: attestation.amount.to_string(),
            message: encode_hex(&attestation.raw_message),
            signature: encode_hex(&attestation.signature),
            created_at: Utc::now(),
        }
    }

    /// Whether this row holds exactly `raw_message`.
    pub fn has_message(&self, raw_message: &[u8]) -> bool {
        self.message == encode_hex(raw_message)
    }

    pub fn to_attestation(&self) -> Result<Attestation, StoreError> {
        Ok(Attestation {
            nonce: self.nonce,
            sender: parse_address(&self.sender, self.id)?,
            recipient: parse_address(&self.receiver, self.id)?,
            source_domain: self.source_domain,
            dest_domain: self.dest_domain,
            amount: U256::from_str_radix(&self.amount, 10)
                .map_err(|e| corrupt(self.id, "amount", e))?,
            raw_message: decode_hex(&self.message, self.id, "message")?,
            signature: decode_hex(&self.signature, self.id, "signature")?,
        })
    }
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", alloy::hex::encode(bytes))
}

fn decode_hex(value: &str, id: AttestationId, column: &str) -> Result<Bytes, StoreError> {
    alloy::hex::decode(value)
        .map(Bytes::from)
        .map_err(|e| corrupt(id, column, e))
}

fn parse_address(value: &str, id: AttestationId) -> Result<Address, StoreError> {
    Address::from_str(value).map_err(|e| corrupt(id, "address", e))
}

fn corrupt(id: AttestationId, column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("attestation {id}: bad {column}: {err}"))
}
