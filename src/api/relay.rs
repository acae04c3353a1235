// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::ApiError,
    models::{MintRequest, MintResponse, MintStatus},
    relay::RedeemOutcome,
    state::AppState,
};

/// Redeem a code: mint to its bound address with relayer-paid gas.
///
/// Answers 202 when the transaction was broadcast but not confirmed before
/// the request deadline.
#[utoipa::path(
    post,
    path = "/relay/mint",
    request_body = MintRequest,
    tag = "Relay",
    responses(
        (status = 200, description = "Mint confirmed", body = MintResponse),
        (status = 202, description = "Mint broadcast, confirmation pending", body = MintResponse),
        (status = 400, description = "Malformed code or address"),
        (status = 402, description = "Relayer cannot cover gas"),
        (status = 404, description = "Unknown code"),
        (status = 409, description = "Code already claimed or consumed"),
        (status = 502, description = "Fee query failed, rejected or reverted"),
        (status = 503, description = "Vault store unavailable"),
        (status = 504, description = "Broadcast retries exhausted")
    )
)]
pub async fn mint(
    State(state): State<AppState>,
    Json(request): Json<MintRequest>,
) -> Result<(StatusCode, Json<MintResponse>), ApiError> {
    let outcome = state
        .orchestrator
        .redeem(&request.code_hash, &request.dest)
        .await?;

    let (status, mint_status) = match outcome {
        RedeemOutcome::Confirmed { .. } => (StatusCode::OK, MintStatus::Confirmed),
        RedeemOutcome::Pending { .. } => (StatusCode::ACCEPTED, MintStatus::Pending),
    };

    Ok((
        status,
        Json(MintResponse {
            tx_hash: outcome.tx_hash().to_string(),
            status: mint_status,
            role: outcome.role(),
        }),
    ))
}
