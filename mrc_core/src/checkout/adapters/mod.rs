// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Context adapters for the checkout aggregator.
//!
//! Each adapter should be defined by the user of the library based on their
//! specific backing, whether that is an in-process simulation, a forked chain
//! or a test harness. This modular design keeps the reconciliation and
//! dispatch algorithm independent of how rounds are actually invoked and how
//! balances are actually stored.

mod checkpoint;
mod ledger;
mod round;

pub use checkpoint::Checkpoint;
pub use ledger::{Erc20Ledger, NativeLedger};
pub use round::RoundCall;
