// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gas-relayed minting: single redemptions and relayer batch runs.

pub mod batch;
pub mod error;
pub mod orchestrator;

pub use batch::{BatchMinter, BatchRequest, BatchSummary, BatchTxResult, BatchTxStatus};
pub use error::RelayError;
pub use orchestrator::{parse_address, RedeemOutcome, RelayOrchestrator, RelaySettings};
