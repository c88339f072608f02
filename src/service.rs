// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Attestation Service
//!
//! Decode, sign and persist raw messages; serve stored attestations back.
//!
//! A request either stores a complete attestation or stores nothing. Signing
//! and storage run on blocking threads under a deadline. Inserts are retried
//! with exponential backoff (an identical resubmission is idempotent), except
//! for [`AttestError::DuplicateNonce`], which is surfaced immediately.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes};

use crate::codec::{address_to_hex, CodecError, Envelope};
use crate::models::{Attestation, AttestationId};
use crate::signer::AttestationSigner;
use crate::storage::{AttestationStore, StoreError};

/// Default deadline for a single signing or storage call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_INSERT_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum AttestError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("malformed burn payload: {0}")]
    MalformedBurnPayload(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("nonce {nonce} of source domain {source_domain} was already attested with a different message")]
    DuplicateNonce { source_domain: u32, nonce: u64 },

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl AttestError {
    /// Whether the caller sent something we cannot accept.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::MalformedEnvelope(_)
                | Self::MalformedBurnPayload(_)
                | Self::InvalidQuery(_)
                | Self::DuplicateNonce { .. }
        )
    }
}

impl From<CodecError> for AttestError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MalformedEnvelope(msg) => Self::MalformedEnvelope(msg),
            CodecError::MalformedBurnPayload(msg) => Self::MalformedBurnPayload(msg),
        }
    }
}

impl From<StoreError> for AttestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateNonce {
                source_domain,
                nonce,
            } => Self::DuplicateNonce {
                source_domain,
                nonce,
            },
            other => Self::StorageFailure(other.to_string()),
        }
    }
}

/// Tuning knobs for deadlines and insert retries.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub call_timeout: Duration,
    pub insert_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            insert_attempts: DEFAULT_INSERT_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

#[derive(Clone)]
pub struct AttestationService {
    store: Arc<dyn AttestationStore>,
    signer: Arc<AttestationSigner>,
    config: ServiceConfig,
}

impl AttestationService {
    pub fn new(store: Arc<dyn AttestationStore>, signer: AttestationSigner) -> Self {
        Self::with_config(store, signer, ServiceConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn AttestationStore>,
        signer: AttestationSigner,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            signer: Arc::new(signer),
            config,
        }
    }

    pub fn attestor_address(&self) -> Address {
        self.signer.address()
    }

    /// Decode, sign and persist `raw_message`.
    ///
    /// Returns the id of the stored attestation; resubmitting identical bytes
    /// returns the same id.
    pub async fn attest(&self, raw_message: &[u8]) -> Result<AttestationId, AttestError> {
        let envelope = Envelope::decode(raw_message).map_err(|e| {
            tracing::warn!(error = %e, len = raw_message.len(), "Rejected raw message");
            AttestError::from(e)
        })?;
        log_envelope(&envelope);

        let raw = Bytes::copy_from_slice(raw_message);
        let signature = self.sign(raw.clone()).await?;
        let attestation = Attestation::from_envelope(&envelope, &raw, signature);

        let id = self.insert_with_retry(attestation).await?;
        tracing::info!(
            attestation_id = id,
            source_domain = envelope.source_domain,
            nonce = envelope.nonce,
            "Attestation stored"
        );
        Ok(id)
    }

    /// Attestations for `source_domain` and `recipient`, in insertion order.
    ///
    /// Both arguments arrive as text from the boundary; the domain must be a
    /// u32 and the recipient a 20-byte hex address (any case).
    pub async fn list_attestations(
        &self,
        source_domain: &str,
        recipient: &str,
    ) -> Result<Vec<Attestation>, AttestError> {
        let source_domain = source_domain.trim();
        let recipient = recipient.trim();
        if source_domain.is_empty() || recipient.is_empty() {
            return Err(AttestError::InvalidQuery(
                "sourceDomain and recipient must be specified".to_string(),
            ));
        }

        let source_domain: u32 = source_domain.parse().map_err(|_| {
            AttestError::InvalidQuery(format!(
                "sourceDomain must be an unsigned 32-bit integer, got {source_domain:?}"
            ))
        })?;
        let recipient = Address::from_str(recipient).map_err(|e| {
            AttestError::InvalidQuery(format!("recipient is not an address: {e}"))
        })?;

        let store = self.store.clone();
        self.blocking_store_call(move || store.query(source_domain, &recipient))
            .await
    }

    /// Number of stored attestations.
    pub async fn attestation_count(&self) -> Result<u64, AttestError> {
        let store = self.store.clone();
        self.blocking_store_call(move || store.count()).await
    }

    async fn sign(&self, raw: Bytes) -> Result<Bytes, AttestError> {
        let signer = self.signer.clone();
        let task = tokio::task::spawn_blocking(move || signer.sign(&raw));

        match tokio::time::timeout(self.config.call_timeout, task).await {
            Ok(Ok(Ok(signature))) => Ok(signature),
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "Signing failed");
                Err(AttestError::SigningFailure(e.to_string()))
            }
            Ok(Err(join_err)) => {
                tracing::error!(error = %join_err, "Signing task failed");
                Err(AttestError::SigningFailure(join_err.to_string()))
            }
            Err(_) => {
                tracing::error!(timeout = ?self.config.call_timeout, "Signing timed out");
                Err(AttestError::SigningFailure(format!(
                    "timed out after {:?}",
                    self.config.call_timeout
                )))
            }
        }
    }

    async fn insert_with_retry(&self, attestation: Attestation) -> Result<AttestationId, AttestError> {
        let attestation = Arc::new(attestation);
        let mut attempts = 0;

        loop {
            let store = self.store.clone();
            let row = attestation.clone();
            match self.blocking_store_call(move || store.insert(&row)).await {
                Ok(id) => return Ok(id),
                Err(AttestError::DuplicateNonce {
                    source_domain,
                    nonce,
                }) => {
                    tracing::error!(
                        source_domain,
                        nonce,
                        "Conflicting message for an already attested nonce"
                    );
                    return Err(AttestError::DuplicateNonce {
                        source_domain,
                        nonce,
                    });
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.config.insert_attempts {
                        tracing::error!(
                            attempts,
                            error = %e,
                            "Storing attestation failed, giving up"
                        );
                        return Err(e);
                    }
                    let delay = self.config.retry_base_delay * 2u32.pow(attempts - 1);
                    tracing::warn!(
                        attempt = attempts,
                        max = self.config.insert_attempts,
                        error = %e,
                        "Storing attestation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn blocking_store_call<T, F>(&self, call: F) -> Result<T, AttestError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(call);
        match tokio::time::timeout(self.config.call_timeout, task).await {
            Ok(Ok(result)) => result.map_err(AttestError::from),
            Ok(Err(join_err)) => Err(AttestError::StorageFailure(join_err.to_string())),
            Err(_) => Err(AttestError::StorageFailure(format!(
                "timed out after {:?}",
                self.config.call_timeout
            ))),
        }
    }
}

fn log_envelope(envelope: &Envelope) {
    tracing::info!(
        message_version = envelope.message_version,
        source_domain = envelope.source_domain,
        dest_domain = envelope.dest_domain,
        nonce = envelope.nonce,
        sender = %address_to_hex(&envelope.sender),
        recipient = %address_to_hex(&envelope.recipient),
        burn_version = envelope.burn.version,
        burn_token = %address_to_hex(&envelope.burn.burn_token),
        mint_recipient = %address_to_hex(&envelope.burn.mint_recipient),
        amount = %envelope.burn.amount,
        burn_sender = %address_to_hex(&envelope.burn.sender),
        "Decoded message"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use alloy::primitives::U256;

    use crate::codec::BurnPayload;
    use crate::signer::recover_attestor;
    use crate::storage::{InMemoryAttestationStore, StoreResult};

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn service_with(store: Arc<dyn AttestationStore>) -> AttestationService {
        let config = ServiceConfig {
            call_timeout: Duration::from_secs(5),
            insert_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
        };
        AttestationService::with_config(store, AttestationSigner::from_hex(DEV_KEY).unwrap(), config)
    }

    fn service() -> AttestationService {
        service_with(Arc::new(InMemoryAttestationStore::new()))
    }

    fn message(nonce: u64, amount: u64) -> Vec<u8> {
        let recipient = Address::repeat_byte(0xAB);
        let burn = BurnPayload {
            version: 0,
            burn_token: Address::repeat_byte(0x0C),
            mint_recipient: recipient,
            amount: U256::from(amount),
            sender: Address::repeat_byte(0x5E),
        };
        Envelope::new(0, 1, 2, nonce, Address::repeat_byte(0x5E), recipient, burn).encode()
    }

    /// Fails the first `failures` inserts, then delegates.
    struct FlakyStore {
        inner: InMemoryAttestationStore,
        failures: AtomicU32,
    }

    impl AttestationStore for FlakyStore {
        fn insert(&self, attestation: &Attestation) -> StoreResult<AttestationId> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Corrupt("disk hiccup".to_string()));
            }
            self.inner.insert(attestation)
        }

        fn query(&self, source_domain: u32, recipient: &Address) -> StoreResult<Vec<Attestation>> {
            self.inner.query(source_domain, recipient)
        }

        fn count(&self) -> StoreResult<u64> {
            self.inner.count()
        }
    }

    #[tokio::test]
    async fn attest_then_list() {
        let service = service();
        let raw = message(0, 5);
        let id = service.attest(&raw).await.unwrap();
        assert_eq!(id, 1);

        let rows = service
            .list_attestations("1", "0xABABABABABABABABABABABABABABABABABABABAB")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, U256::from(5u64));
        assert_eq!(rows[0].raw_message.as_ref(), raw.as_slice());
        assert_eq!(
            recover_attestor(&raw, &rows[0].signature).unwrap(),
            service.attestor_address()
        );
    }

    #[tokio::test]
    async fn resubmission_returns_same_id() {
        let service = service();
        let raw = message(3, 7);
        let first = service.attest(&raw).await.unwrap();
        let second = service.attest(&raw).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.attestation_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn conflicting_message_is_duplicate_nonce() {
        let service = service();
        service.attest(&message(3, 7)).await.unwrap();
        let err = service.attest(&message(3, 8)).await.unwrap_err();
        assert!(matches!(
            err,
            AttestError::DuplicateNonce {
                source_domain: 1,
                nonce: 3
            }
        ));
        assert!(err.is_client_fault());
    }

    #[tokio::test]
    async fn malformed_input_is_not_persisted() {
        let service = service();
        let err = service.attest(&[0u8; 40]).await.unwrap_err();
        assert!(matches!(err, AttestError::MalformedEnvelope(_)));

        let mut short_payload = message(1, 1);
        short_payload.truncate(84 + 100);
        let err = service.attest(&short_payload).await.unwrap_err();
        assert!(matches!(err, AttestError::MalformedBurnPayload(_)));

        assert_eq!(service.attestation_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_validates_arguments() {
        let service = service();
        for (domain, recipient) in [
            ("", "0xabababababababababababababababababababab"),
            ("1", "  "),
            ("-1", "0xabababababababababababababababababababab"),
            ("4294967296", "0xabababababababababababababababababababab"),
            ("one", "0xabababababababababababababababababababab"),
            ("1", "0xabc"),
        ] {
            let err = service.list_attestations(domain, recipient).await.unwrap_err();
            assert!(matches!(err, AttestError::InvalidQuery(_)), "{domain} {recipient}");
        }
    }

    #[tokio::test]
    async fn transient_insert_failure_is_retried() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryAttestationStore::new(),
            failures: AtomicU32::new(2),
        });
        let service = service_with(store);
        assert_eq!(service.attest(&message(1, 1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn persistent_insert_failure_is_storage_failure() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryAttestationStore::new(),
            failures: AtomicU32::new(10),
        });
        let service = service_with(store);
        let err = service.attest(&message(1, 1)).await.unwrap_err();
        assert!(matches!(err, AttestError::StorageFailure(_)));
        assert!(!err.is_client_fault());
    }
}
