// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end: relayed event → service → redb → receipts.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cctp_attestor::{
    codec::{BurnPayload, Envelope},
    relay::{
        EventRelay, EventSource, EventStream, ForwardTarget, RelayConfig, RelayError, RelayEvent,
        StreamItem,
    },
    service::{AttestError, AttestationService},
    signer::{recover_attestor, AttestationSigner},
    storage::AttestationDb,
};

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn burn_message(source_domain: u32, nonce: u64, recipient: Address, amount: U256) -> Vec<u8> {
    let burn = BurnPayload {
        version: 0,
        burn_token: Address::repeat_byte(0x0C),
        mint_recipient: recipient,
        amount,
        sender: Address::repeat_byte(0x5E),
    };
    Envelope::new(0, source_domain, 2, nonce, Address::repeat_byte(0x5E), recipient, burn).encode()
}

fn service(dir: &tempfile::TempDir) -> AttestationService {
    let store = Arc::new(AttestationDb::open(&dir.path().join("attestor.redb")).unwrap());
    AttestationService::new(store, AttestationSigner::from_hex(DEV_KEY).unwrap())
}

/// Replays a fixed list of events once, then fails every resubscription.
struct OneShotSource(VecDeque<RelayEvent>);

impl EventSource for OneShotSource {
    async fn subscribe(&mut self, _shutdown: CancellationToken) -> Result<EventStream, RelayError> {
        if self.0.is_empty() {
            return Err(RelayError::Subscription("no more events".into()));
        }
        let (tx, rx) = mpsc::channel(self.0.len());
        for event in self.0.drain(..) {
            tx.send(Ok(StreamItem::Event(event))).await.unwrap();
        }
        Ok(rx)
    }
}

#[tokio::test]
async fn attested_message_is_listed_and_verifiable() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let recipient: Address = "0x798d4ba9baf0064ec19eb4f0a1a45785ae9d6dfc".parse().unwrap();
    let raw = burn_message(1, 0, recipient, U256::from(5u64));

    service.attest(&raw).await.unwrap();

    let rows = service
        .list_attestations("1", "0x798D4BA9BAF0064EC19EB4F0A1A45785AE9D6DFC")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.nonce, 0);
    assert_eq!(row.sender, Address::repeat_byte(0x5E));
    assert_eq!(row.recipient, recipient);
    assert_eq!(row.source_domain, 1);
    assert_eq!(row.dest_domain, 2);
    assert_eq!(row.amount, U256::from(5u64));
    assert_eq!(row.raw_message.as_ref(), raw.as_slice());
    assert_eq!(
        recover_attestor(&raw, &row.signature).unwrap(),
        service.attestor_address()
    );
}

#[tokio::test]
async fn duplicate_nonce_leaves_original_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let recipient = Address::repeat_byte(0x22);

    let original = burn_message(3, 9, recipient, U256::from(100u64));
    let id = service.attest(&original).await.unwrap();
    assert_eq!(service.attest(&original).await.unwrap(), id);

    let forged = burn_message(3, 9, recipient, U256::from(1_000_000u64));
    assert!(matches!(
        service.attest(&forged).await,
        Err(AttestError::DuplicateNonce {
            source_domain: 3,
            nonce: 9
        })
    ));

    let rows = service
        .list_attestations("3", &format!("{recipient:#x}"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].raw_message.as_ref(), original.as_slice());
}

#[tokio::test]
async fn relay_feeds_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let recipient = Address::repeat_byte(0x33);

    let events: VecDeque<RelayEvent> = (0..3u64)
        .map(|nonce| RelayEvent {
            message: Bytes::from(burn_message(1, nonce, recipient, U256::from(nonce + 1))),
            tx_hash: B256::with_last_byte(nonce as u8),
        })
        .chain(std::iter::once(RelayEvent {
            message: Bytes::from_static(b"not an envelope"),
            tx_hash: B256::with_last_byte(0xFF),
        }))
        .collect();

    let config = RelayConfig {
        max_resubscribe_attempts: 1,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        ..RelayConfig::default()
    };
    let mut relay = EventRelay::with_config(
        OneShotSource(events),
        ForwardTarget::Local(service.clone()),
        config,
    );
    assert!(matches!(
        relay.run(CancellationToken::new()).await,
        Err(RelayError::RetriesExhausted { .. })
    ));

    let nonces: Vec<u64> = service
        .list_attestations("1", &format!("{recipient:#x}"))
        .await
        .unwrap()
        .iter()
        .map(|a| a.nonce)
        .collect();
    assert_eq!(nonces, vec![0, 1, 2]);
}
