// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Event sources feeding the relay.
//!
//! A subscription is a channel of `Result<StreamItem, RelayError>`: an `Err`
//! item or a closed channel means the subscription is broken and the relay
//! must subscribe again.
//!
//! Sources interleave [`StreamItem::Checkpoint`] markers with the events. A
//! checkpoint says every event below that block has been sent; the relay
//! hands it back through [`EventSource::checkpoint`] once those events are
//! forwarded, and a new subscription resumes from the last committed one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, B256},
    providers::Provider,
    rpc::types::{Filter, Log},
    sol,
    sol_types::SolEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::RelayError;
use crate::storage::{RelayCursorStore, StoreResult};

sol! {
    #[derive(Debug)]
    event MessageSent(bytes message);
}

/// Default block chunk size per `eth_getLogs` query.
const DEFAULT_CHUNK_SIZE: u64 = 2000;

/// Default poll interval when caught up to chain head.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const CHANNEL_CAPACITY: usize = 256;

/// Raw message bytes plus the transaction that emitted them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEvent {
    pub message: Bytes,
    pub tx_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Event(RelayEvent),
    /// All events below this block have been sent.
    Checkpoint(u64),
}

pub type EventStream = mpsc::Receiver<Result<StreamItem, RelayError>>;

pub trait EventSource: Send {
    /// Open a new subscription. The subscription stops when `shutdown` fires.
    fn subscribe(
        &mut self,
        shutdown: CancellationToken,
    ) -> impl Future<Output = Result<EventStream, RelayError>> + Send;

    /// Record that scanning may resume at `next_block`.
    fn checkpoint(&mut self, next_block: u64) -> impl Future<Output = Result<(), RelayError>> + Send {
        let _ = next_block;
        std::future::ready(Ok(()))
    }
}

// =============================================================================
// Chain Log Source
// =============================================================================

/// Cursor key of one transporter contract.
pub fn cursor_key(transporter: &Address) -> String {
    format!("{transporter:#x}")
}

/// Polls `eth_getLogs` for `MessageSent` events of one contract.
///
/// The scan position is kept in a [`RelayCursorStore`], so both a broken
/// subscription and a restarted process resume at the last checkpoint.
pub struct ChainLogSource<P> {
    provider: P,
    transporter: Address,
    start_block: Option<u64>,
    cursors: Arc<dyn RelayCursorStore>,
    poll_interval: Duration,
    chunk_size: u64,
}

impl<P> ChainLogSource<P>
where
    P: Provider + Clone + 'static,
{
    /// Without a stored cursor, start at `start_block`, or at the chain head
    /// when `None`.
    pub fn new(
        provider: P,
        transporter: Address,
        start_block: Option<u64>,
        cursors: Arc<dyn RelayCursorStore>,
    ) -> Self {
        Self {
            provider,
            transporter,
            start_block,
            cursors,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn cursor_call<T, F>(&self, f: F) -> Result<T, RelayError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RelayCursorStore, &str) -> StoreResult<T> + Send + 'static,
    {
        let cursors = self.cursors.clone();
        let key = cursor_key(&self.transporter);
        tokio::task::spawn_blocking(move || f(cursors.as_ref(), key.as_str()))
            .await
            .map_err(|e| RelayError::Checkpoint(e.to_string()))?
            .map_err(|e| RelayError::Checkpoint(e.to_string()))
    }
}

impl<P> EventSource for ChainLogSource<P>
where
    P: Provider + Clone + 'static,
{
    async fn subscribe(&mut self, shutdown: CancellationToken) -> Result<EventStream, RelayError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| RelayError::Subscription(e.to_string()))?;

        let next_block = match self.cursor_call(|c, key| c.relay_cursor(key)).await? {
            Some(block) => block,
            None => {
                let block = self.start_block.unwrap_or(head + 1);
                self.checkpoint(block).await?;
                block
            }
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let poller = LogPoller {
            provider: self.provider.clone(),
            transporter: self.transporter,
            poll_interval: self.poll_interval,
            chunk_size: self.chunk_size,
            next_block,
        };
        tokio::spawn(poller.run(tx, shutdown));

        tracing::info!(
            transporter = %self.transporter,
            head,
            from_block = next_block,
            "Subscribed to MessageSent logs"
        );
        Ok(rx)
    }

    async fn checkpoint(&mut self, next_block: u64) -> Result<(), RelayError> {
        self.cursor_call(move |c, key| c.set_relay_cursor(key, next_block))
            .await?;
        tracing::debug!(next_block, "Relay checkpoint stored");
        Ok(())
    }
}

struct LogPoller<P> {
    provider: P,
    transporter: Address,
    poll_interval: Duration,
    chunk_size: u64,
    next_block: u64,
}

impl<P> LogPoller<P>
where
    P: Provider + Clone + 'static,
{
    async fn run(mut self, tx: mpsc::Sender<Result<StreamItem, RelayError>>, shutdown: CancellationToken) {
        loop {
            if let Err(e) = self.poll_step(&tx).await {
                // The receiver treats this as a broken subscription.
                let _ = tx.send(Err(e)).await;
                return;
            }
            if tx.is_closed() {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => return,
            }
        }
    }

    async fn poll_step(&mut self, tx: &mpsc::Sender<Result<StreamItem, RelayError>>) -> Result<(), RelayError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| RelayError::Subscription(e.to_string()))?;

        while self.next_block <= head {
            let from = self.next_block;
            let to = from.saturating_add(self.chunk_size - 1).min(head);
            let filter = Filter::new()
                .address(self.transporter)
                .event_signature(MessageSent::SIGNATURE_HASH)
                .from_block(from)
                .to_block(to);

            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| RelayError::Subscription(e.to_string()))?;

            for log in &logs {
                match decode_message_sent(log) {
                    Some(event) => {
                        if tx.send(Ok(StreamItem::Event(event))).await.is_err() {
                            return Ok(());
                        }
                    }
                    None => tracing::warn!(
                        block_number = ?log.block_number,
                        "Skipping undecodable MessageSent log"
                    ),
                }
            }

            if !logs.is_empty() {
                tracing::debug!(from_block = from, to_block = to, events = logs.len(), "Fetched MessageSent logs");
            }
            self.next_block = to + 1;
            if tx.send(Ok(StreamItem::Checkpoint(self.next_block))).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

fn decode_message_sent(log: &Log) -> Option<RelayEvent> {
    let tx_hash = log.transaction_hash?;
    let decoded = MessageSent::decode_log(&log.inner).ok()?;
    Some(RelayEvent {
        message: decoded.data.message,
        tx_hash,
    })
}
