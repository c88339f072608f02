// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CCTP Attestor - Burn-and-Mint Message Attestation Service
//!
//! Watches `MessageSent` events on a source chain, signs every message with
//! the attestor key and serves the signed attestations to relayers, which
//! present them to the destination chain to authorize the mint.
//!
//! ## Modules
//!
//! - `codec` - Envelope and burn payload wire format
//! - `signer` - Personal-message signing with the attestor key
//! - `storage` - Append-only attestation store (redb)
//! - `service` - Decode, sign and persist pipeline
//! - `relay` - Chain event subscription and forwarding
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod relay;
pub mod service;
pub mod signer;
pub mod state;
pub mod storage;
pub mod telemetry;
