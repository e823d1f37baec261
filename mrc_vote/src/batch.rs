// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-round vote batches and the full checkout request
//!
//! A [`RoundBatch`] pairs one round address with the ordered votes destined
//! for it and the amount the aggregator will move to that round on dispatch.
//! A [`CheckoutRequest`] is the caller-side assembly of a whole batch; it is
//! built fresh for a single checkout call and never persisted.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{EncodedVote, Vote, VoteError};

/// One round address with its ordered votes and attributed amount
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundBatch {
    /// Round the votes are dispatched to
    pub round: Address,
    /// Votes forwarded verbatim, in caller order
    pub votes: Vec<EncodedVote>,
    /// Amount the aggregator attributes to this round
    pub amount: U256,
}

impl RoundBatch {
    /// Creates a batch with a caller-declared amount
    pub fn new(round: Address, votes: Vec<EncodedVote>, amount: U256) -> Self {
        Self {
            round,
            votes,
            amount,
        }
    }

    /// Encodes typed votes and attributes their summed amount to the round
    ///
    /// # Errors
    ///
    /// Returns [`VoteError::AmountOverflow`] if the vote amounts overflow
    /// uint256 when summed.
    pub fn from_votes(round: Address, votes: &[Vote]) -> Result<Self, VoteError> {
        let mut amount = U256::ZERO;
        for vote in votes {
            amount = amount
                .checked_add(vote.amount)
                .ok_or(VoteError::AmountOverflow)?;
        }
        Ok(Self {
            round,
            votes: votes.iter().map(Vote::encode).collect(),
            amount,
        })
    }

    /// Sums the amount words carried by the encoded votes.
    ///
    /// This is the aggregator's reconciliation source: the result must equal
    /// the declared [`RoundBatch::amount`] for the batch to be dispatched.
    pub fn votes_total(&self) -> Result<U256, VoteError> {
        let mut total = U256::ZERO;
        for vote in &self.votes {
            total = total
                .checked_add(vote.amount()?)
                .ok_or(VoteError::AmountOverflow)?;
        }
        Ok(total)
    }
}

/// Full batched checkout: ordered round batches for one call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutRequest {
    batches: Vec<RoundBatch>,
}

impl CheckoutRequest {
    pub fn new(batches: Vec<RoundBatch>) -> Self {
        Self { batches }
    }

    /// Appends a round batch, preserving dispatch order
    pub fn push(&mut self, batch: RoundBatch) {
        self.batches.push(batch);
    }

    pub fn batches(&self) -> &[RoundBatch] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Sums the declared per-round amounts.
    ///
    /// For the native rail this is the value that must be attached to the
    /// call; for the token rail it is the permit value.
    pub fn total(&self) -> Result<U256, VoteError> {
        let mut total = U256::ZERO;
        for batch in &self.batches {
            total = total
                .checked_add(batch.amount)
                .ok_or(VoteError::AmountOverflow)?;
        }
        Ok(total)
    }

    /// Splits the request into the parallel sequences the aggregator
    /// operations take: votes per round, round addresses, amounts per round.
    pub fn into_parallel(self) -> (Vec<Vec<EncodedVote>>, Vec<Address>, Vec<U256>) {
        let mut votes_by_round = Vec::with_capacity(self.batches.len());
        let mut rounds = Vec::with_capacity(self.batches.len());
        let mut amounts = Vec::with_capacity(self.batches.len());
        for batch in self.batches {
            votes_by_round.push(batch.votes);
            rounds.push(batch.round);
            amounts.push(batch.amount);
        }
        (votes_by_round, rounds, amounts)
    }
}

impl FromIterator<RoundBatch> for CheckoutRequest {
    fn from_iter<I: IntoIterator<Item = RoundBatch>>(iter: I) -> Self {
        Self {
            batches: iter.into_iter().collect(),
        }
    }
}
