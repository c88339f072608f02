// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Attestation Storage
//!
//! Append-only storage for attestations. There is no update and no delete.
//!
//! ## Identity
//!
//! An attestation is identified by `(source_domain, nonce)`. Inserting the
//! same key twice:
//!
//! - with byte-identical raw messages returns the id of the first row;
//! - with different raw messages fails with [`StoreError::DuplicateNonce`]
//!   and leaves the first row untouched.
//!
//! Both implementations make the duplicate check and the insert a single
//! serialized step (a redb write transaction, or one mutex critical section)
//! so concurrent inserts for the same key cannot race.
//!
//! ## Relay Cursor
//!
//! Both stores also keep the relay's scan position per event source, so a
//! restarted relay resumes where the previous process stopped.
//!
//! ## Implementations
//!
//! - [`AttestationDb`]: embedded redb database, used in production.
//! - [`InMemoryAttestationStore`]: process-local, used by tests and tooling.

pub mod attestation_db;
pub mod memory;
pub mod records;

use alloy::primitives::Address;

use crate::models::{Attestation, AttestationId};

pub use attestation_db::AttestationDb;
pub use memory::InMemoryAttestationStore;
pub use records::StoredAttestation;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("nonce {nonce} of source domain {source_domain} is already attested with a different message")]
    DuplicateNonce { source_domain: u32, nonce: u64 },

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable owner of attestations.
///
/// Calls may block on I/O; async callers should run them on a blocking
/// thread.
pub trait AttestationStore: Send + Sync {
    /// Append `attestation`, or return the existing id for an identical resubmission.
    fn insert(&self, attestation: &Attestation) -> StoreResult<AttestationId>;

    /// All attestations for a source domain and recipient, in insertion order.
    fn query(&self, source_domain: u32, recipient: &Address) -> StoreResult<Vec<Attestation>>;

    /// Number of stored attestations.
    fn count(&self) -> StoreResult<u64>;
}

/// Persistent scan position of the event relay, keyed by event source.
pub trait RelayCursorStore: Send + Sync {
    /// Next block to scan for `source`, if one was ever recorded.
    fn relay_cursor(&self, source: &str) -> StoreResult<Option<u64>>;

    fn set_relay_cursor(&self, source: &str, next_block: u64) -> StoreResult<()>;
}
