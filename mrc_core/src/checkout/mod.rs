// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The `checkout` module provides the aggregator that dispatches one batched
//! multi-round payment atomically.
//!
//! This module is the primary interface for callers checking out across many
//! rounds at once. The [`MultiRoundCheckout`] struct reconciles the declared
//! amounts, then dispatches to each round in caller order under the chosen
//! payment rail, rolling everything back on the first failure.
//!
//! The aggregator uses user-defined adapters (see [adapters]) for round
//! invocation, balance handling and the transaction boundary, letting the
//! same algorithm run against any backing.

pub mod adapters;
mod aggregator;

pub use aggregator::{CheckoutSummary, MultiRoundCheckout, PaymentRail, RoundSettled};
