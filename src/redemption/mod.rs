// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Redemption code lifecycle: claim guards and the lapsed-lease sweep.

pub mod machine;
pub mod sweeper;

pub use machine::{Reconciliation, RedemptionStateMachine};
pub use sweeper::{LeaseSweeper, SweepReport};
