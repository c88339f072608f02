// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Message envelope: routing header plus the burn payload it carries.

use alloy::primitives::{Address, Bytes};

use super::{address_word, read_address_word, read_u32, read_u64, BurnPayload, CodecError};

/// Fixed size of the envelope header; the payload starts here.
pub const ENVELOPE_HEADER_LEN: usize = 84;

const VERSION_OFFSET: usize = 0;
const SOURCE_DOMAIN_OFFSET: usize = 4;
const DEST_DOMAIN_OFFSET: usize = 8;
const NONCE_OFFSET: usize = 12;
const SENDER_OFFSET: usize = 20;
const RECIPIENT_OFFSET: usize = 52;

/// Decoded message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Message format version.
    pub message_version: u32,
    /// Domain of the originating chain.
    pub source_domain: u32,
    /// Domain of the destination chain.
    pub dest_domain: u32,
    /// Per-source-domain message nonce.
    pub nonce: u64,
    /// Message sender on the source chain.
    pub sender: Address,
    /// Message recipient on the destination chain.
    pub recipient: Address,
    /// Raw payload bytes exactly as carried after the header.
    pub payload: Bytes,
    /// The payload decoded as a burn.
    pub burn: BurnPayload,
}

impl Envelope {
    /// Build an envelope whose payload is exactly the encoded `burn`.
    pub fn new(
        message_version: u32,
        source_domain: u32,
        dest_domain: u32,
        nonce: u64,
        sender: Address,
        recipient: Address,
        burn: BurnPayload,
    ) -> Self {
        Self {
            message_version,
            source_domain,
            dest_domain,
            nonce,
            sender,
            recipient,
            payload: Bytes::from(burn.encode()),
            burn,
        }
    }

    /// Decode an envelope and the burn payload it carries.
    ///
    /// Fails with [`CodecError::MalformedEnvelope`] on a short header or
    /// dirty address padding, and with [`CodecError::MalformedBurnPayload`]
    /// when the payload itself does not decode.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < ENVELOPE_HEADER_LEN {
            return Err(CodecError::MalformedEnvelope(format!(
                "expected at least {ENVELOPE_HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let address_at = |offset: usize, field: &str| {
            read_address_word(bytes, offset).ok_or_else(|| {
                CodecError::MalformedEnvelope(format!("{field} word has non-zero padding"))
            })
        };

        let sender = address_at(SENDER_OFFSET, "sender")?;
        let recipient = address_at(RECIPIENT_OFFSET, "recipient")?;

        let payload = &bytes[ENVELOPE_HEADER_LEN..];
        let burn = BurnPayload::decode(payload)?;

        Ok(Self {
            message_version: read_u32(bytes, VERSION_OFFSET),
            source_domain: read_u32(bytes, SOURCE_DOMAIN_OFFSET),
            dest_domain: read_u32(bytes, DEST_DOMAIN_OFFSET),
            nonce: read_u64(bytes, NONCE_OFFSET),
            sender,
            recipient,
            payload: Bytes::copy_from_slice(payload),
            burn,
        })
    }

    /// Encode header followed by the raw payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.message_version.to_be_bytes());
        out.extend_from_slice(&self.source_domain.to_be_bytes());
        out.extend_from_slice(&self.dest_domain.to_be_bytes());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(address_word(&self.sender).as_slice());
        out.extend_from_slice(address_word(&self.recipient).as_slice());
        out.extend_from_slice(&self.payload);
        out
    }
}
