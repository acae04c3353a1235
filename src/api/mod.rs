// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
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
    models::{
        BatchMintRequest, BindingResponse, CheckAccessResponse, MintRequest, MintResponse,
        MintStatus, VerifyResponse,
    },
    relay::{BatchSummary, BatchTxResult, BatchTxStatus},
    state::AppState,
    storage::Role,
    verification::VerifyStatus,
};

pub mod admin;
pub mod health;
pub mod relay;
pub mod secret;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let routes = Router::new()
        .route("/secret/get-binding", get(secret::get_binding))
        .route("/secret/verify", get(secret::verify))
        .route("/relay/mint", post(relay::mint))
        .route("/api/admin/check-access", get(admin::check_access))
        .route("/api/admin/batch-mint", post(admin::batch_mint))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        secret::get_binding,
        secret::verify,
        relay::mint,
        admin::check_access,
        admin::batch_mint,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            BindingResponse,
            VerifyResponse,
            VerifyStatus,
            MintRequest,
            MintResponse,
            MintStatus,
            Role,
            CheckAccessResponse,
            BatchMintRequest,
            BatchSummary,
            BatchTxResult,
            BatchTxStatus,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Secret", description = "Code bindings and on-chain verification"),
        (name = "Relay", description = "Gas-relayed minting"),
        (name = "Admin", description = "Publisher-only operations"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
