// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wire Codec
//!
//! Decoders and encoders for the two fixed-layout structures carried by a
//! `MessageSent` event:
//!
//! ```text
//! Envelope (84-byte header)                BurnPayload (132 bytes)
//! [0:4]    message version  u32            [0:4]     version         u32
//! [4:8]    source domain    u32            [4:36]    burn token      bytes32
//! [8:12]   dest domain      u32            [36:68]   mint recipient  bytes32
//! [12:20]  nonce            u64            [68:100]  amount          uint256
//! [20:52]  sender           bytes32        [100:132] sender          bytes32
//! [52:84]  recipient        bytes32
//! [84:]    payload          bytes  ──────▶ BurnPayload
//! ```
//!
//! All integers are big-endian. Address words carry a 20-byte address in
//! their low-order bytes; the 12 high-order bytes must be zero.

pub mod burn;
pub mod envelope;

use alloy::primitives::{Address, B256};

pub use burn::{BurnPayload, BURN_PAYLOAD_LEN};
pub use envelope::{Envelope, ENVELOPE_HEADER_LEN};

/// Size of one ABI word.
pub const WORD_LEN: usize = 32;

/// Zero padding in front of an address inside a 32-byte word.
const ADDRESS_PADDING_LEN: usize = WORD_LEN - 20;

/// Decode failures. Never retried: the input itself is wrong.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("malformed burn payload: {0}")]
    MalformedBurnPayload(String),
}

/// Canonical text form of an address: `0x` followed by 40 lower-case hex digits.
pub fn address_to_hex(address: &Address) -> String {
    format!("0x{}", alloy::hex::encode(address))
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_be_bytes(buf)
}

/// Extract the address held in the word at `offset`.
///
/// Returns `None` when the padding bytes are not zero.
pub(crate) fn read_address_word(bytes: &[u8], offset: usize) -> Option<Address> {
    let word = &bytes[offset..offset + WORD_LEN];
    let (padding, address) = word.split_at(ADDRESS_PADDING_LEN);
    if padding.iter().any(|b| *b != 0) {
        return None;
    }
    Some(Address::from_slice(address))
}

pub(crate) fn address_word(address: &Address) -> B256 {
    address.into_word()
}
