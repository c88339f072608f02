// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{AttestResponse, Receipt},
    state::AppState,
};

pub mod attestations;
pub mod health;

pub fn router(state: AppState) -> Router {
    let attestor_routes = Router::new()
        .route("/attest", post(attestations::attest))
        .route("/attest/{tx_hash}", post(attestations::attest_tx))
        .route(
            "/receipts/{source_domain}/{recipient}",
            get(attestations::list_receipts),
        );

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/api/v1/attestor", attestor_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        attestations::attest,
        attestations::attest_tx,
        attestations::list_receipts,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            AttestResponse,
            Receipt,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Attestations", description = "Message attestation and receipts"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use alloy::primitives::{Address, U256};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::codec::{BurnPayload, Envelope};
    use crate::service::AttestationService;
    use crate::signer::{recover_attestor, AttestationSigner};
    use crate::storage::InMemoryAttestationStore;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const RECIPIENT: &str = "0x798d4ba9baf0064ec19eb4f0a1a45785ae9d6dfc";

    fn app() -> Router {
        let service = AttestationService::new(
            Arc::new(InMemoryAttestationStore::new()),
            AttestationSigner::from_hex(DEV_KEY).unwrap(),
        );
        router(AppState::new(service))
    }

    fn message(nonce: u64, amount: u64) -> Vec<u8> {
        let recipient: Address = RECIPIENT.parse().unwrap();
        let burn = BurnPayload {
            version: 0,
            burn_token: Address::repeat_byte(0x0C),
            mint_recipient: recipient,
            amount: U256::from(amount),
            sender: Address::repeat_byte(0x5E),
        };
        Envelope::new(0, 1, 2, nonce, Address::repeat_byte(0x5E), recipient, burn).encode()
    }

    fn post_bytes(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn attest_and_fetch_receipt() {
        let app = app();
        let raw = message(0, 5);

        let response = app
            .clone()
            .oneshot(post_bytes("/api/v1/attestor/attest", raw.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["id"], 1);

        let uri = format!("/api/v1/attestor/receipts/1/{}", RECIPIENT.to_uppercase().replacen("0X", "0x", 1));
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let receipts = json_body(response).await;
        let receipts = receipts.as_array().unwrap();
        assert_eq!(receipts.len(), 1);
        let receipt = &receipts[0];
        assert_eq!(receipt["nonce"], 0);
        assert_eq!(receipt["receiver"], RECIPIENT);
        assert_eq!(receipt["source_domain"], 1);
        assert_eq!(receipt["dest_domain"], 2);
        assert_eq!(receipt["amount"], "5");
        assert_eq!(receipt["message"], format!("0x{}", alloy::hex::encode(&raw)));

        let signature = alloy::hex::decode(receipt["signature"].as_str().unwrap()).unwrap();
        let attestor: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(recover_attestor(&raw, &signature).unwrap(), attestor);
    }

    #[tokio::test]
    async fn tx_scoped_attest_echoes_hash() {
        let tx_hash = format!("0x{}", "ab".repeat(32));
        let response = app()
            .oneshot(post_bytes(
                &format!("/api/v1/attestor/attest/{tx_hash}"),
                message(1, 1),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["tx_hash"], tx_hash);
    }

    #[tokio::test]
    async fn malformed_message_is_bad_request() {
        let response = app()
            .oneshot(post_bytes("/api/v1/attestor/attest", vec![0u8; 10]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("malformed envelope"));
    }

    #[tokio::test]
    async fn conflicting_message_is_conflict() {
        let app = app();
        let first = app
            .clone()
            .oneshot(post_bytes("/api/v1/attestor/attest", message(4, 1)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post_bytes("/api/v1/attestor/attest", message(4, 2)))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn bad_source_domain_is_bad_request() {
        let response = app()
            .oneshot(
                Request::get(format!("/api/v1/attestor/receipts/abc/{RECIPIENT}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_recipient_has_no_receipts() {
        let response = app()
            .oneshot(
                Request::get(format!("/api/v1/attestor/receipts/1/{RECIPIENT}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn health_reports_attestor() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["attestor"], "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert_eq!(body["checks"]["attestations"], 0);
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let response = app()
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}
