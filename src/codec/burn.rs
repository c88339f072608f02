// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Burn payload: the body of an envelope describing the burned amount.

use alloy::primitives::{Address, U256};

use super::{address_word, read_address_word, read_u32, CodecError, WORD_LEN};

/// Fixed size of an encoded burn payload.
pub const BURN_PAYLOAD_LEN: usize = 132;

const VERSION_OFFSET: usize = 0;
const BURN_TOKEN_OFFSET: usize = 4;
const MINT_RECIPIENT_OFFSET: usize = 36;
const AMOUNT_OFFSET: usize = 68;
const SENDER_OFFSET: usize = 100;

/// Decoded burn payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnPayload {
    /// Burn payload format version.
    pub version: u32,
    /// Token contract burned on the source chain.
    pub burn_token: Address,
    /// Mint target on the destination chain.
    pub mint_recipient: Address,
    /// Burned quantity in source-chain units.
    pub amount: U256,
    /// Original burn initiator.
    pub sender: Address,
}

impl BurnPayload {
    /// Decode a burn payload.
    ///
    /// Bytes past the fixed 132-byte layout are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < BURN_PAYLOAD_LEN {
            return Err(CodecError::MalformedBurnPayload(format!(
                "expected at least {BURN_PAYLOAD_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let address_at = |offset: usize, field: &str| {
            read_address_word(bytes, offset).ok_or_else(|| {
                CodecError::MalformedBurnPayload(format!("{field} word has non-zero padding"))
            })
        };

        Ok(Self {
            version: read_u32(bytes, VERSION_OFFSET),
            burn_token: address_at(BURN_TOKEN_OFFSET, "burn token")?,
            mint_recipient: address_at(MINT_RECIPIENT_OFFSET, "mint recipient")?,
            amount: U256::from_be_slice(&bytes[AMOUNT_OFFSET..AMOUNT_OFFSET + WORD_LEN]),
            sender: address_at(SENDER_OFFSET, "sender")?,
        })
    }

    /// Encode into the fixed 132-byte layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BURN_PAYLOAD_LEN);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(address_word(&self.burn_token).as_slice());
        out.extend_from_slice(address_word(&self.mint_recipient).as_slice());
        out.extend_from_slice(&self.amount.to_be_bytes::<32>());
        out.extend_from_slice(address_word(&self.sender).as_slice());
        out
    }
}
