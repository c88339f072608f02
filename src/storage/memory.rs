// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process-local attestation store.
//!
//! Holds everything behind one mutex; the identity lookup and the append
//! happen inside the same critical section.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use alloy::primitives::Address;

use super::{AttestationStore, RelayCursorStore, StoreError, StoreResult};
use crate::models::{Attestation, AttestationId};

#[derive(Default)]
struct MemoryState {
    rows: Vec<Attestation>,
    by_identity: HashMap<(u32, u64), usize>,
    relay_cursors: HashMap<String, u64>,
}

#[derive(Default)]
pub struct InMemoryAttestationStore {
    state: Mutex<MemoryState>,
}

impl InMemoryAttestationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Corrupt("in-memory store lock poisoned".to_string()))
    }
}

fn id_for(index: usize) -> AttestationId {
    index as AttestationId + 1
}

impl AttestationStore for InMemoryAttestationStore {
    fn insert(&self, attestation: &Attestation) -> StoreResult<AttestationId> {
        let mut state = self.lock()?;
        let identity = (attestation.source_domain, attestation.nonce);

        if let Some(&index) = state.by_identity.get(&identity) {
            return if state.rows[index].raw_message == attestation.raw_message {
                Ok(id_for(index))
            } else {
                Err(StoreError::DuplicateNonce {
                    source_domain: attestation.source_domain,
                    nonce: attestation.nonce,
                })
            };
        }

        let index = state.rows.len();
        state.rows.push(attestation.clone());
        state.by_identity.insert(identity, index);
        Ok(id_for(index))
    }

    fn query(&self, source_domain: u32, recipient: &Address) -> StoreResult<Vec<Attestation>> {
        let state = self.lock()?;
        Ok(state
            .rows
            .iter()
            .filter(|a| a.source_domain == source_domain && &a.recipient == recipient)
            .cloned()
            .collect())
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.lock()?.rows.len() as u64)
    }
}

impl RelayCursorStore for InMemoryAttestationStore {
    fn relay_cursor(&self, source: &str) -> StoreResult<Option<u64>> {
        Ok(self.lock()?.relay_cursors.get(source).copied())
    }

    fn set_relay_cursor(&self, source: &str, next_block: u64) -> StoreResult<()> {
        self.lock()?.relay_cursors.insert(source.to_string(), next_block);
        Ok(())
    }
}
