// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::ApiError,
    models::{BindingResponse, VerifyResponse},
    state::AppState,
    storage::normalize_code_hash,
};

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct BindingQuery {
    pub code_hash: String,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQuery {
    pub code_hash: String,
    /// Address the holder claims received the mint.
    pub address: String,
}

/// Look up the address a code will mint to.
#[utoipa::path(
    get,
    path = "/secret/get-binding",
    params(BindingQuery),
    tag = "Secret",
    responses(
        (status = 200, body = BindingResponse),
        (status = 404, description = "Unknown code")
    )
)]
pub async fn get_binding(
    State(state): State<AppState>,
    Query(params): Query<BindingQuery>,
) -> Result<Json<BindingResponse>, ApiError> {
    // A string that cannot be a code is simply not a known code
    let code_hash =
        normalize_code_hash(&params.code_hash).ok_or_else(|| ApiError::not_found("Unknown code"))?;
    let binding = state.store.get_binding(&code_hash)?;
    Ok(Json(BindingResponse {
        address: binding.address,
    }))
}

/// Check on-chain that a code's mint landed at `address`.
#[utoipa::path(
    get,
    path = "/secret/verify",
    params(VerifyQuery),
    tag = "Secret",
    responses(
        (status = 200, body = VerifyResponse),
        (status = 400, description = "Malformed address"),
        (status = 502, description = "Chain unreachable")
    )
)]
pub async fn verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyQuery>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let result = state
        .verifier
        .verify(&params.code_hash, &params.address)
        .await?;
    Ok(Json(VerifyResponse {
        status: result.status,
        role: result.role,
    }))
}
