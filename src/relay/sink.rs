// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Forwarding targets for relayed messages.
//!
//! The relay hands over opaque message bytes; interpretation happens behind
//! the sink, in [`AttestationService::attest`].
//!
//! Sinks report a message that can never be attested as
//! [`RelayError::Rejected`] and anything worth retrying as
//! [`RelayError::Forward`].

use std::future::Future;
use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client, StatusCode};

use super::{RelayError, RelayEvent};
use crate::service::AttestationService;

/// Path of the transaction-scoped attest route on a remote attestor.
pub const ATTEST_PATH: &str = "/api/v1/attestor/attest";

pub trait AttestationSink: Send + Sync {
    fn forward(&self, event: &RelayEvent) -> impl Future<Output = Result<(), RelayError>> + Send;
}

impl AttestationSink for AttestationService {
    async fn forward(&self, event: &RelayEvent) -> Result<(), RelayError> {
        let id = self.attest(&event.message).await.map_err(|e| {
            if e.is_client_fault() {
                RelayError::Rejected(e.to_string())
            } else {
                RelayError::Forward(e.to_string())
            }
        })?;
        tracing::debug!(tx_hash = %event.tx_hash, attestation_id = id, "Attested relayed message");
        Ok(())
    }
}

/// Posts messages to a remote attestor over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAttestationSink {
    base_url: String,
    http: Client,
}

impl HttpAttestationSink {
    pub fn new(base_url: &url::Url, timeout: Duration) -> Result<Self, RelayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Forward(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn attest_url(&self, event: &RelayEvent) -> String {
        format!("{}{ATTEST_PATH}/{:#x}", self.base_url, event.tx_hash)
    }
}

impl AttestationSink for HttpAttestationSink {
    async fn forward(&self, event: &RelayEvent) -> Result<(), RelayError> {
        let response = self
            .http
            .post(self.attest_url(event))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(event.message.to_vec())
            .send()
            .await
            .map_err(|e| RelayError::Forward(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = format!("attestor responded {status}: {body}");
            return Err(if is_permanent(status) {
                RelayError::Rejected(reason)
            } else {
                RelayError::Forward(reason)
            });
        }
        Ok(())
    }
}

/// 4xx answers other than timeouts and throttling.
fn is_permanent(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

/// The sink chosen at start-up.
#[derive(Clone)]
pub enum ForwardTarget {
    Local(AttestationService),
    Remote(HttpAttestationSink),
}

impl AttestationSink for ForwardTarget {
    async fn forward(&self, event: &RelayEvent) -> Result<(), RelayError> {
        match self {
            Self::Local(service) => service.forward(event).await,
            Self::Remote(http) => http.forward(event).await,
        }
    }
}
