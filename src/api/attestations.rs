// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attestation endpoints used by relayers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{AttestResponse, Receipt},
    state::AppState,
};

/// Attest a raw message.
///
/// The body is the message exactly as emitted on the source chain.
/// Resubmitting identical bytes returns the original id.
#[utoipa::path(
    post,
    path = "/api/v1/attestor/attest",
    tag = "Attestations",
    request_body(content = Vec<u8>, content_type = "application/octet-stream", description = "Raw message bytes"),
    responses(
        (status = 200, description = "Message attested", body = AttestResponse),
        (status = 400, description = "Malformed message"),
        (status = 409, description = "Nonce already attested with a different message"),
        (status = 500, description = "Signing or storage failure")
    )
)]
pub async fn attest(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AttestResponse>, ApiError> {
    let id = state.service.attest(&body).await?;
    Ok(Json(AttestResponse { id, tx_hash: None }))
}

/// Attest a raw message emitted by the given source transaction.
///
/// The transaction hash is used for log correlation only.
#[utoipa::path(
    post,
    path = "/api/v1/attestor/attest/{tx_hash}",
    tag = "Attestations",
    params(
        ("tx_hash" = String, Path, description = "Source chain transaction hash")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream", description = "Raw message bytes"),
    responses(
        (status = 200, description = "Message attested", body = AttestResponse),
        (status = 400, description = "Malformed message"),
        (status = 409, description = "Nonce already attested with a different message"),
        (status = 500, description = "Signing or storage failure")
    )
)]
pub async fn attest_tx(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
    body: Bytes,
) -> Result<Json<AttestResponse>, ApiError> {
    tracing::info!(tx_hash = %tx_hash, len = body.len(), "Attestation requested");
    let id = state.service.attest(&body).await.map_err(|e| {
        tracing::warn!(tx_hash = %tx_hash, error = %e, "Attestation rejected");
        e
    })?;
    Ok(Json(AttestResponse {
        id,
        tx_hash: Some(tx_hash),
    }))
}

/// List attestations for a recipient on a source domain, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/attestor/receipts/{source_domain}/{recipient}",
    tag = "Attestations",
    params(
        ("source_domain" = u32, Path, description = "Source domain"),
        ("recipient" = String, Path, description = "Recipient address (0x + 40 hex chars, any case)")
    ),
    responses(
        (status = 200, description = "Attestations for the recipient", body = Vec<Receipt>),
        (status = 400, description = "Invalid source domain or recipient"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn list_receipts(
    State(state): State<AppState>,
    Path((source_domain, recipient)): Path<(String, String)>,
) -> Result<Json<Vec<Receipt>>, ApiError> {
    let attestations = state
        .service
        .list_attestations(&source_domain, &recipient)
        .await?;
    Ok(Json(attestations.iter().map(Receipt::from).collect()))
}
