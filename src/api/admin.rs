// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Publisher-only endpoints. Access is granted by presenting a publisher
//! code; the code is looked up, never claimed.

use alloy::primitives::U256;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::ApiError,
    models::{BatchMintRequest, CheckAccessResponse},
    relay::{BatchRequest, BatchSummary},
    state::AppState,
    storage::{normalize_code_hash, CodeState, Role},
};

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AccessQuery {
    pub code_hash: String,
}

fn require_publisher(state: &AppState, code_raw: &str) -> Result<Role, ApiError> {
    let code_hash =
        normalize_code_hash(code_raw).ok_or_else(|| ApiError::not_found("Unknown code"))?;
    let record = state.store.get(&code_hash)?;

    if record.role != Role::Publisher || record.state == CodeState::Expired {
        tracing::warn!(code_hash = %code_hash, role = %record.role, "Admin access denied");
        return Err(ApiError::forbidden("Publisher access required"));
    }
    Ok(record.role)
}

#[utoipa::path(
    get,
    path = "/api/admin/check-access",
    params(AccessQuery),
    tag = "Admin",
    responses(
        (status = 200, body = CheckAccessResponse),
        (status = 403, description = "Not a publisher code"),
        (status = 404, description = "Unknown code")
    )
)]
pub async fn check_access(
    State(state): State<AppState>,
    Query(params): Query<AccessQuery>,
) -> Result<Json<CheckAccessResponse>, ApiError> {
    let role = require_publisher(&state, &params.code_hash)?;
    Ok(Json(CheckAccessResponse { ok: true, role }))
}

/// Run a batch of mints from the relayer account.
#[utoipa::path(
    post,
    path = "/api/admin/batch-mint",
    request_body = BatchMintRequest,
    tag = "Admin",
    responses(
        (status = 200, body = BatchSummary),
        (status = 400, description = "Count, concurrency or quantity out of range"),
        (status = 403, description = "Not a publisher code"),
        (status = 404, description = "Unknown code"),
        (status = 502, description = "Fee query failed")
    )
)]
pub async fn batch_mint(
    State(state): State<AppState>,
    Json(request): Json<BatchMintRequest>,
) -> Result<Json<BatchSummary>, ApiError> {
    require_publisher(&state, &request.code_hash)?;

    let quantity = request
        .quantity
        .map(U256::from)
        .unwrap_or(state.mint_quantity);
    let summary = state
        .batch
        .run(BatchRequest {
            count: request.count,
            concurrency: request.concurrency,
            quantity,
        })
        .await?;
    Ok(Json(summary))
}
