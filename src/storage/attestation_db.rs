// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded attestation database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `attestations`: id → serialized StoredAttestation (JSON bytes)
//! - `nonce_index`: composite key (source_domain|nonce) → id; the uniqueness
//!   constraint on attestation identity
//! - `recipient_index`: composite key (source_domain|recipient|id) → id, for
//!   insertion-ordered range scans per domain and recipient
//! - `relay_state`: event source key → next block to scan
//!
//! ## Write Serialization
//!
//! redb admits one write transaction at a time, so the lookup in
//! `nonce_index` and the insert that follows it are atomic with respect to
//! every other writer. The same rule also serializes inserts for *different*
//! `(source_domain, nonce)` keys: they queue behind each other for the length
//! of one short commit instead of proceeding in parallel. Readers are never
//! blocked.

use std::path::Path;

use alloy::primitives::Address;
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};

use super::records::StoredAttestation;
use super::{AttestationStore, RelayCursorStore, StoreError, StoreResult};
use crate::models::{Attestation, AttestationId};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: id → serialized StoredAttestation (JSON bytes).
const ATTESTATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("attestations");

/// Identity index: `source_domain_be | nonce_be` → id.
const NONCE_INDEX: TableDefinition<&[u8], u64> = TableDefinition::new("nonce_index");

/// Query index: `source_domain_be | recipient | id_be` → id.
const RECIPIENT_INDEX: TableDefinition<&[u8], u64> = TableDefinition::new("recipient_index");

/// Relay checkpoints: event source key → next block to scan.
const RELAY_STATE: TableDefinition<&str, u64> = TableDefinition::new("relay_state");

// =============================================================================
// Index Key Helpers
// =============================================================================

fn nonce_key(source_domain: u32, nonce: u64) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..4].copy_from_slice(&source_domain.to_be_bytes());
    key[4..].copy_from_slice(&nonce.to_be_bytes());
    key
}

/// Big-endian id suffix keeps a recipient's entries in insertion order.
fn recipient_key(source_domain: u32, recipient: &Address, id: AttestationId) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..4].copy_from_slice(&source_domain.to_be_bytes());
    key[4..24].copy_from_slice(recipient.as_slice());
    key[24..].copy_from_slice(&id.to_be_bytes());
    key
}

enum InsertOutcome {
    Created(AttestationId),
    Existing(AttestationId),
}

// =============================================================================
// AttestationDb
// =============================================================================

/// Embedded ACID attestation database.
pub struct AttestationDb {
    db: Database,
}

impl AttestationDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ATTESTATIONS)?;
            let _ = write_txn.open_table(NONCE_INDEX)?;
            let _ = write_txn.open_table(RECIPIENT_INDEX)?;
            let _ = write_txn.open_table(RELAY_STATE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    #[cfg(test)]
    fn get(&self, id: AttestationId) -> StoreResult<Option<StoredAttestation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ATTESTATIONS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn insert_in(write_txn: &WriteTransaction, attestation: &Attestation) -> StoreResult<InsertOutcome> {
        let mut rows = write_txn.open_table(ATTESTATIONS)?;
        let mut nonces = write_txn.open_table(NONCE_INDEX)?;
        let mut recipients = write_txn.open_table(RECIPIENT_INDEX)?;

        let identity = nonce_key(attestation.source_domain, attestation.nonce);
        let existing_id = nonces.get(identity.as_slice())?.map(|v| v.value());

        if let Some(existing_id) = existing_id {
            let existing_bytes = rows
                .get(existing_id)?
                .ok_or_else(|| {
                    StoreError::Corrupt(format!("nonce index points at missing row {existing_id}"))
                })?
                .value()
                .to_vec();
            let existing: StoredAttestation = serde_json::from_slice(&existing_bytes)?;

            return if existing.has_message(&attestation.raw_message) {
                Ok(InsertOutcome::Existing(existing_id))
            } else {
                Err(StoreError::DuplicateNonce {
                    source_domain: attestation.source_domain,
                    nonce: attestation.nonce,
                })
            };
        }

        let id = rows.last()?.map(|(key, _)| key.value() + 1).unwrap_or(1);
        let json = serde_json::to_vec(&StoredAttestation::new(id, attestation))?;

        rows.insert(id, json.as_slice())?;
        nonces.insert(identity.as_slice(), id)?;
        let index_key = recipient_key(attestation.source_domain, &attestation.recipient, id);
        recipients.insert(index_key.as_slice(), id)?;

        Ok(InsertOutcome::Created(id))
    }
}

impl AttestationStore for AttestationDb {
    fn insert(&self, attestation: &Attestation) -> StoreResult<AttestationId> {
        let write_txn = self.db.begin_write()?;
        match Self::insert_in(&write_txn, attestation) {
            Ok(InsertOutcome::Created(id)) => {
                write_txn.commit()?;
                tracing::debug!(
                    attestation_id = id,
                    source_domain = attestation.source_domain,
                    nonce = attestation.nonce,
                    "Stored attestation"
                );
                Ok(id)
            }
            Ok(InsertOutcome::Existing(id)) => {
                write_txn.abort()?;
                tracing::debug!(
                    attestation_id = id,
                    source_domain = attestation.source_domain,
                    nonce = attestation.nonce,
                    "Attestation already stored, resubmission ignored"
                );
                Ok(id)
            }
            Err(e) => {
                if let Err(abort_err) = write_txn.abort() {
                    tracing::warn!(error = %abort_err, "Failed to abort attestation write");
                }
                Err(e)
            }
        }
    }

    fn query(&self, source_domain: u32, recipient: &Address) -> StoreResult<Vec<Attestation>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(RECIPIENT_INDEX)?;
        let rows = read_txn.open_table(ATTESTATIONS)?;

        let start = recipient_key(source_domain, recipient, 0);
        let end = recipient_key(source_domain, recipient, AttestationId::MAX);

        let mut results = Vec::new();
        for entry in index.range(start.as_slice()..=end.as_slice())? {
            let (_, id) = entry?;
            let id = id.value();
            match rows.get(id)? {
                Some(value) => {
                    let stored: StoredAttestation = serde_json::from_slice(value.value())?;
                    results.push(stored.to_attestation()?);
                }
                None => {
                    return Err(StoreError::Corrupt(format!(
                        "recipient index points at missing row {id}"
                    )))
                }
            }
        }
        Ok(results)
    }

    fn count(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ATTESTATIONS)?;
        Ok(table.len()?)
    }
}

impl RelayCursorStore for AttestationDb {
    fn relay_cursor(&self, source: &str) -> StoreResult<Option<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RELAY_STATE)?;
        Ok(table.get(source)?.map(|v| v.value()))
    }

    fn set_relay_cursor(&self, source: &str, next_block: u64) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(RELAY_STATE)?;
            table.insert(source, next_block)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use alloy::primitives::{Bytes, U256};

    fn temp_db() -> (AttestationDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = AttestationDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn sample(source_domain: u32, nonce: u64, recipient: Address) -> Attestation {
        Attestation {
            nonce,
            sender: Address::repeat_byte(0x11),
            recipient,
            source_domain,
            dest_domain: 2,
            amount: U256::from(5u64),
            raw_message: Bytes::from(format!("message {source_domain}/{nonce}").into_bytes()),
            signature: Bytes::from(vec![0x1C; 65]),
        }
    }

    #[test]
    fn insert_and_get() {
        let (db, _dir) = temp_db();
        let attestation = sample(1, 0, Address::repeat_byte(0x22));
        let id = db.insert(&attestation).unwrap();
        assert_eq!(id, 1);

        let stored = db.get(id).unwrap().unwrap();
        assert_eq!(stored.to_attestation().unwrap(), attestation);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn identical_resubmission_returns_same_id() {
        let (db, _dir) = temp_db();
        let attestation = sample(1, 4, Address::repeat_byte(0x22));

        let first = db.insert(&attestation).unwrap();
        let second = db.insert(&attestation).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.count().unwrap(), 1);
        assert_eq!(db.query(1, &attestation.recipient).unwrap().len(), 1);
    }

    #[test]
    fn conflicting_message_is_duplicate_nonce() {
        let (db, _dir) = temp_db();
        let original = sample(1, 4, Address::repeat_byte(0x22));
        let id = db.insert(&original).unwrap();

        let mut forged = original.clone();
        forged.raw_message = Bytes::from_static(b"different bytes");
        forged.amount = U256::from(1_000_000u64);

        let err = db.insert(&forged).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateNonce { source_domain: 1, nonce: 4 }
        ));

        let stored = db.get(id).unwrap().unwrap().to_attestation().unwrap();
        assert_eq!(stored, original);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn same_nonce_on_other_domain_is_independent() {
        let (db, _dir) = temp_db();
        let recipient = Address::repeat_byte(0x22);
        let a = db.insert(&sample(1, 9, recipient)).unwrap();
        let b = db.insert(&sample(2, 9, recipient)).unwrap();
        assert_ne!(a, b);
        assert_eq!(db.query(1, &recipient).unwrap().len(), 1);
        assert_eq!(db.query(2, &recipient).unwrap().len(), 1);
    }

    #[test]
    fn query_returns_insertion_order() {
        let (db, _dir) = temp_db();
        let recipient = Address::repeat_byte(0x22);
        for nonce in [30, 10, 20] {
            db.insert(&sample(1, nonce, recipient)).unwrap();
        }
        db.insert(&sample(1, 40, Address::repeat_byte(0x33))).unwrap();

        let nonces: Vec<u64> = db
            .query(1, &recipient)
            .unwrap()
            .into_iter()
            .map(|a| a.nonce)
            .collect();
        assert_eq!(nonces, vec![30, 10, 20]);
    }

    #[test]
    fn query_unknown_recipient_is_empty() {
        let (db, _dir) = temp_db();
        db.insert(&sample(1, 0, Address::repeat_byte(0x22))).unwrap();
        assert!(db.query(1, &Address::repeat_byte(0x99)).unwrap().is_empty());
        assert!(db.query(7, &Address::repeat_byte(0x22)).unwrap().is_empty());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.redb");
        let recipient = Address::repeat_byte(0x22);
        {
            let db = AttestationDb::open(&path).unwrap();
            db.insert(&sample(1, 1, recipient)).unwrap();
        }
        let db = AttestationDb::open(&path).unwrap();
        assert_eq!(db.query(1, &recipient).unwrap().len(), 1);
        assert_eq!(db.insert(&sample(1, 2, recipient)).unwrap(), 2);
    }

    #[test]
    fn concurrent_identical_inserts_store_one_row() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        let attestation = sample(5, 77, Address::repeat_byte(0x44));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let attestation = attestation.clone();
                std::thread::spawn(move || db.insert(&attestation).unwrap())
            })
            .collect();
        let ids: Vec<AttestationId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn relay_cursor_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.redb");
        {
            let db = AttestationDb::open(&path).unwrap();
            assert_eq!(db.relay_cursor("0xaa").unwrap(), None);
            db.set_relay_cursor("0xaa", 100).unwrap();
            db.set_relay_cursor("0xaa", 2100).unwrap();
            db.set_relay_cursor("0xbb", 7).unwrap();
        }
        let db = AttestationDb::open(&path).unwrap();
        assert_eq!(db.relay_cursor("0xaa").unwrap(), Some(2100));
        assert_eq!(db.relay_cursor("0xbb").unwrap(), Some(7));
    }

    #[test]
    fn recipient_keys_sort_by_id() {
        let recipient = Address::repeat_byte(0x01);
        assert!(recipient_key(1, &recipient, 2) < recipient_key(1, &recipient, 10));
        assert!(recipient_key(1, &recipient, u64::MAX) < recipient_key(2, &recipient, 0));
    }
}
