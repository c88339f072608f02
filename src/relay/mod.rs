// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Event Relay
//!
//! Long-lived task that moves `MessageSent` events from an [`EventSource`]
//! into an [`AttestationSink`].
//!
//! ## States
//!
//! ```text
//! Subscribed ──event──▶ Forwarding ──done──▶ Subscribed
//!     │
//!     └─subscription error─▶ backoff ─▶ resubscribe ─(retries exhausted)─▶ Failed
//! ```
//!
//! ## Delivery
//!
//! Checkpoints from the source are committed only after every event before
//! them has been forwarded. A message the sink rejects as invalid
//! ([`RelayError::Rejected`]) is logged and skipped. Any other forward
//! failure breaks the subscription, so the next one replays from the last
//! committed checkpoint; resubmitting an already attested message is a
//! no-op.
//!
//! ## Retries
//!
//! A broken subscription is retried with exponential backoff and jitter.
//! The retry budget counts consecutive failures only: it resets when a
//! checkpoint is committed, and when a subscription that stayed up for
//! [`RelayConfig::healthy_after`] breaks. Once the budget is spent the relay
//! enters `Failed` and returns the error to its supervisor.

pub mod sink;
pub mod source;

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use sink::{AttestationSink, ForwardTarget, HttpAttestationSink};
pub use source::{cursor_key, ChainLogSource, EventSource, EventStream, RelayEvent, StreamItem};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("subscription failed: {0}")]
    Subscription(String),

    #[error("event stream closed")]
    StreamClosed,

    #[error("forwarding failed: {0}")]
    Forward(String),

    /// The sink refused the message itself; retrying cannot help.
    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("checkpoint store failed: {0}")]
    Checkpoint(String),

    #[error("gave up after {attempts} failed subscriptions, last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Subscribed,
    Forwarding,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Consecutive failed subscriptions tolerated before giving up.
    pub max_resubscribe_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// A subscription that lasted this long before breaking counts as healthy.
    pub healthy_after: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_resubscribe_attempts: 8,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            healthy_after: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Backoff before resubscription number `attempt` (1-based), before jitter.
    fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Base delay plus up to 50% random jitter.
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let max_jitter_ms = (base.as_millis() / 2) as u64;
        let jitter_ms = if max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_jitter_ms)
        };
        base + Duration::from_millis(jitter_ms)
    }
}

enum StreamEnd {
    Shutdown,
    Broken(RelayError),
}

pub struct EventRelay<S, K> {
    source: S,
    sink: K,
    config: RelayConfig,
    state: RelayState,
}

impl<S, K> EventRelay<S, K>
where
    S: EventSource,
    K: AttestationSink,
{
    pub fn new(source: S, sink: K) -> Self {
        Self::with_config(source, sink, RelayConfig::default())
    }

    pub fn with_config(source: S, sink: K, config: RelayConfig) -> Self {
        Self {
            source,
            sink,
            config,
            state: RelayState::Subscribed,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Run until `shutdown` fires (`Ok`) or resubscription retries run out (`Err`).
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), RelayError> {
        tracing::info!("Event relay starting");
        let mut failures: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Event relay shutting down");
                return Ok(());
            }

            let subscription = shutdown.child_token();
            let error = match self.source.subscribe(subscription.clone()).await {
                Ok(mut stream) => {
                    self.state = RelayState::Subscribed;
                    let subscribed_at = Instant::now();
                    let end = self.pump(&mut stream, &shutdown, &mut failures).await;
                    subscription.cancel();
                    match end {
                        StreamEnd::Shutdown => {
                            tracing::info!("Event relay shutting down");
                            return Ok(());
                        }
                        StreamEnd::Broken(e) => {
                            if subscribed_at.elapsed() >= self.config.healthy_after {
                                failures = 0;
                            }
                            e
                        }
                    }
                }
                Err(e) => e,
            };

            failures += 1;
            if failures > self.config.max_resubscribe_attempts {
                self.state = RelayState::Failed;
                tracing::error!(
                    attempts = failures,
                    error = %error,
                    "Event subscription failed, retries exhausted"
                );
                return Err(RelayError::RetriesExhausted {
                    attempts: failures,
                    last: error.to_string(),
                });
            }

            let delay = self.config.jittered_delay(failures);
            tracing::warn!(
                attempt = failures,
                max = self.config.max_resubscribe_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Event subscription broken, resubscribing"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Event relay shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn pump(
        &mut self,
        stream: &mut EventStream,
        shutdown: &CancellationToken,
        failures: &mut u32,
    ) -> StreamEnd {
        loop {
            let item = tokio::select! {
                _ = shutdown.cancelled() => return StreamEnd::Shutdown,
                item = stream.recv() => item,
            };

            match item {
                Some(Ok(StreamItem::Event(event))) => {
                    self.state = RelayState::Forwarding;
                    tracing::info!(
                        tx_hash = %event.tx_hash,
                        len = event.message.len(),
                        "Forwarding message"
                    );
                    let result = self.sink.forward(&event).await;
                    self.state = RelayState::Subscribed;
                    match result {
                        Ok(()) => {}
                        Err(e @ RelayError::Rejected(_)) => {
                            tracing::warn!(tx_hash = %event.tx_hash, error = %e, "Message rejected, skipping");
                        }
                        Err(e) => {
                            tracing::warn!(tx_hash = %event.tx_hash, error = %e, "Forwarding failed");
                            return StreamEnd::Broken(e);
                        }
                    }
                }
                Some(Ok(StreamItem::Checkpoint(next_block))) => {
                    if let Err(e) = self.source.checkpoint(next_block).await {
                        return StreamEnd::Broken(e);
                    }
                    *failures = 0;
                }
                Some(Err(e)) => return StreamEnd::Broken(e),
                None => return StreamEnd::Broken(RelayError::StreamClosed),
            }
        }
    }
}
