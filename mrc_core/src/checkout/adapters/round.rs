// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use mrc_vote::EncodedVote;

/// Invokes round contracts.
///
/// Rounds are external and untrusted: the aggregator assumes nothing about
/// them beyond the success or failure signal of the call itself.
///
/// # Example
///
/// For example code see [crate::context::memory::InMemoryChain]
#[async_trait]
pub trait RoundCall {
    /// Defines the user-specified error type.
    ///
    /// This error type should implement the `Error` and `Debug` traits from
    /// the standard library.
    /// Errors of this type are returned to the user when an operation fails.
    type AdapterError: std::error::Error + std::fmt::Debug + Send + Sync + 'static;

    /// Invokes `vote(bytes[] encodedVotes)` on `round`, forwarding `value`
    /// of native currency from `from` with the call.
    ///
    /// The payloads must reach the round untouched and in order. Any revert
    /// of the round must surface as an `AdapterError`; state the round
    /// mutated before reverting is discarded by the enclosing checkpoint.
    async fn call_vote(
        &self,
        round: Address,
        encoded_votes: &[EncodedVote],
        from: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError>;

    /// Returns the round's `votingStrategy()` address.
    ///
    /// Only the non-batched baseline path needs this, to route its separate
    /// ERC20 approval; the aggregator pushes tokens directly and never calls
    /// it.
    async fn voting_strategy(&self, round: Address) -> Result<Address, Self::AdapterError>;
}
