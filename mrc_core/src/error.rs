// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use alloy::primitives::{Address, U256};
use mrc_permit::PermitError;
use mrc_vote::VoteError;

/// Errors raised by the checkout aggregator.
///
/// Every category is fatal to the enclosing call: nothing is retried and the
/// whole batch is discarded, leaving all balances as they were.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Declared per-round amounts do not sum to the attached or declared
    /// total. Rejected before any ledger effect.
    #[error("declared per-round amounts sum to {declared_total}, expected {expected_total}")]
    AmountMismatch {
        declared_total: U256,
        expected_total: U256,
    },

    /// The amount words of a round's votes do not sum to the amount
    /// attributed to that round.
    #[error("votes for round {round} at index {index} carry {votes_total}, but {declared} was attributed to it")]
    RoundAmountMismatch {
        index: usize,
        round: Address,
        declared: U256,
        votes_total: U256,
    },

    /// The parallel input sequences do not agree on the number of rounds
    #[error("parallel checkout inputs disagree on round count: {vote_sets} vote sets, {rounds} rounds, {amounts} amounts")]
    LengthMismatch {
        vote_sets: usize,
        rounds: usize,
        amounts: usize,
    },

    /// Summing the declared per-round amounts overflows uint256
    #[error("summing declared amounts overflows uint256")]
    AmountOverflow,

    /// Permit signature invalid, expired, or its nonce already consumed.
    /// Rejected before any fund movement.
    #[error("permit rejected: {reason}")]
    PermitRejected { reason: String },

    /// A downstream round reverted; surfaced with the failing index and
    /// address for caller diagnosis
    #[error("round call failed at index {index} ({round}): {source_error_message}")]
    RoundCallFailed {
        index: usize,
        round: Address,
        source_error_message: String,
    },

    /// The fund pull from the caller failed
    #[error("pull of {required} from {owner} failed: {source_error_message}")]
    InsufficientAllowanceOrBalance {
        owner: Address,
        required: U256,
        source_error_message: String,
    },

    /// The aggregator would retain a balance after dispatch. Any balance
    /// present when a call begins belongs to that call's accounting and must
    /// be fully disbursed, so the call reverts instead.
    #[error("aggregator retained {retained} after dispatch")]
    RetainedBalance { retained: U256 },

    #[error(transparent)]
    Vote(#[from] VoteError),

    #[error(transparent)]
    Permit(#[from] PermitError),

    /// Error from adapter
    #[error("error from adapter: {source_error}")]
    AdapterError { source_error: anyhow::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
