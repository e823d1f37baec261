// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use alloy::primitives::{Address, U256};
use log::debug;
use mrc_permit::SignedPermit;
use mrc_vote::EncodedVote;
use serde::{Deserialize, Serialize};

use super::adapters::{Checkpoint, Erc20Ledger, NativeLedger, RoundCall};
use crate::{error::Result, Error};

/// Payment rail a checkout was dispatched under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentRail {
    /// Native currency attached to the call
    Native,
    /// EIP-2612 permit-authorized ERC20 token
    Erc20 { token: Address },
}

/// Per-round accounting for one successful checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSettled {
    /// Round the votes were dispatched to
    pub round: Address,
    /// Number of votes forwarded
    pub votes: usize,
    /// Value moved to the round
    pub amount: U256,
}

/// Accounting emitted on success, sufficient for callers to reconstruct how
/// much went where. Per-round entries are in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSummary {
    pub rail: PaymentRail,
    pub total: U256,
    pub rounds: Vec<RoundSettled>,
}

/// The checkout aggregator.
///
/// A pure dispatcher: it owns no funds beyond the lifetime of one call and
/// holds no state across calls apart from its own ledger address, which
/// permits must name as the spender.
pub struct MultiRoundCheckout<E> {
    /// Context that implements adapters
    context: E,

    /// Address the aggregator acts as on the ledger
    address: Address,
}

impl<E> MultiRoundCheckout<E> {
    /// Creates a new aggregator acting as `address` on the provided context
    pub fn new(context: E, address: Address) -> Self {
        Self { context, address }
    }

    /// The aggregator's ledger address, the required permit spender
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn context(&self) -> &E {
        &self.context
    }
}

/// Verifies the parallel input sequences agree in length, that the declared
/// per-round amounts sum to `expected_total`, and that each round's vote
/// amount words sum to the amount attributed to that round.
///
/// Runs before any ledger effect; a batch that fails here is rejected without
/// a single external call.
fn reconcile(
    votes_by_round: &[Vec<EncodedVote>],
    rounds: &[Address],
    amounts: &[U256],
    expected_total: U256,
) -> Result<()> {
    if votes_by_round.len() != rounds.len() || rounds.len() != amounts.len() {
        return Err(Error::LengthMismatch {
            vote_sets: votes_by_round.len(),
            rounds: rounds.len(),
            amounts: amounts.len(),
        });
    }

    let mut declared_total = U256::ZERO;
    for amount in amounts {
        declared_total = declared_total
            .checked_add(*amount)
            .ok_or(Error::AmountOverflow)?;
    }
    if declared_total != expected_total {
        return Err(Error::AmountMismatch {
            declared_total,
            expected_total,
        });
    }

    for (index, (votes, (&round, &amount))) in votes_by_round
        .iter()
        .zip(rounds.iter().zip(amounts))
        .enumerate()
    {
        let mut votes_total = U256::ZERO;
        for vote in votes {
            votes_total = votes_total
                .checked_add(vote.amount()?)
                .ok_or(Error::AmountOverflow)?;
        }
        if votes_total != amount {
            return Err(Error::RoundAmountMismatch {
                index,
                round,
                declared: amount,
                votes_total,
            });
        }
    }

    Ok(())
}

impl<E> MultiRoundCheckout<E>
where
    E: RoundCall + NativeLedger + Checkpoint,
{
    /// Dispatches a batched checkout under the native rail.
    ///
    /// `value` is the native value attached to the call and must equal the
    /// sum of `amounts`; round `i` observes exactly `amounts[i]` of forwarded
    /// value. Dispatch is strictly sequential in caller order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmountMismatch`] if the declared amounts do not sum
    /// to `value`, before any ledger effect.
    ///
    /// Returns [`Error::RoundCallFailed`] with the failing index and address
    /// if any round reverts; the whole batch is rolled back, including value
    /// already forwarded to earlier rounds.
    pub async fn checkout_native(
        &self,
        caller: Address,
        votes_by_round: &[Vec<EncodedVote>],
        rounds: &[Address],
        amounts: &[U256],
        value: U256,
    ) -> Result<CheckoutSummary> {
        reconcile(votes_by_round, rounds, amounts, value)?;

        let checkpoint = self
            .context
            .checkpoint()
            .await
            .map_err(|err| Error::AdapterError {
                source_error: anyhow::Error::new(err),
            })?;

        match self
            .dispatch_native(caller, votes_by_round, rounds, amounts, value)
            .await
        {
            Ok(summary) => {
                self.context
                    .commit(checkpoint)
                    .await
                    .map_err(|err| Error::AdapterError {
                        source_error: anyhow::Error::new(err),
                    })?;
                Ok(summary)
            }
            Err(err) => {
                self.context
                    .rollback(checkpoint)
                    .await
                    .map_err(|err| Error::AdapterError {
                        source_error: anyhow::Error::new(err),
                    })?;
                Err(err)
            }
        }
    }

    async fn dispatch_native(
        &self,
        caller: Address,
        votes_by_round: &[Vec<EncodedVote>],
        rounds: &[Address],
        amounts: &[U256],
        value: U256,
    ) -> Result<CheckoutSummary> {
        // The attached value moves to the aggregator first, then out per
        // round, so a mid-batch failure rolls back one coherent account.
        self.context
            .native_transfer(caller, self.address, value)
            .await
            .map_err(|err| Error::InsufficientAllowanceOrBalance {
                owner: caller,
                required: value,
                source_error_message: err.to_string(),
            })?;

        let mut settled = Vec::with_capacity(rounds.len());
        for (index, (votes, (&round, &amount))) in votes_by_round
            .iter()
            .zip(rounds.iter().zip(amounts))
            .enumerate()
        {
            debug!(
                "dispatching {} votes and {amount} native to round {round} ({} of {})",
                votes.len(),
                index + 1,
                rounds.len()
            );
            self.context
                .call_vote(round, votes, self.address, amount)
                .await
                .map_err(|err| Error::RoundCallFailed {
                    index,
                    round,
                    source_error_message: err.to_string(),
                })?;
            settled.push(RoundSettled {
                round,
                votes: votes.len(),
                amount,
            });
        }

        let retained = self
            .context
            .native_balance(self.address)
            .await
            .map_err(|err| Error::AdapterError {
                source_error: anyhow::Error::new(err),
            })?;
        if !retained.is_zero() {
            return Err(Error::RetainedBalance { retained });
        }

        Ok(CheckoutSummary {
            rail: PaymentRail::Native,
            total: value,
            rounds: settled,
        })
    }
}

impl<E> MultiRoundCheckout<E>
where
    E: RoundCall + Erc20Ledger + Checkpoint,
{
    /// Dispatches a batched checkout under the ERC20-permit rail.
    ///
    /// The permit must authorize this aggregator to pull exactly
    /// `total_amount` of `token` from `caller`, against the owner's current
    /// nonce and a deadline not yet elapsed. Authorization folds into the
    /// same call as the dispatch: no prior approval transaction exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermitRejected`] for a bad signature, wrong nonce,
    /// mismatched fields or an expired deadline, before any fund movement.
    ///
    /// Returns [`Error::InsufficientAllowanceOrBalance`] if the pull from
    /// the caller fails, and [`Error::RoundCallFailed`] if any round reverts;
    /// either way the whole batch rolls back, including the consumed permit
    /// nonce.
    pub async fn checkout_erc20_permit(
        &self,
        caller: Address,
        votes_by_round: &[Vec<EncodedVote>],
        rounds: &[Address],
        amounts: &[U256],
        total_amount: U256,
        token: Address,
        permit: &SignedPermit,
    ) -> Result<CheckoutSummary> {
        reconcile(votes_by_round, rounds, amounts, total_amount)?;
        self.authorize_permit(caller, total_amount, token, permit)
            .await?;

        let checkpoint = self
            .context
            .checkpoint()
            .await
            .map_err(|err| Error::AdapterError {
                source_error: anyhow::Error::new(err),
            })?;

        match self
            .dispatch_erc20(caller, votes_by_round, rounds, amounts, total_amount, token)
            .await
        {
            Ok(summary) => {
                self.context
                    .commit(checkpoint)
                    .await
                    .map_err(|err| Error::AdapterError {
                        source_error: anyhow::Error::new(err),
                    })?;
                Ok(summary)
            }
            Err(err) => {
                self.context
                    .rollback(checkpoint)
                    .await
                    .map_err(|err| Error::AdapterError {
                        source_error: anyhow::Error::new(err),
                    })?;
                Err(err)
            }
        }
    }

    /// Validates the permit against the execution-time clock and the token's
    /// current ledger state. Read-only: runs before the checkpoint opens.
    async fn authorize_permit(
        &self,
        caller: Address,
        total_amount: U256,
        token: Address,
        permit: &SignedPermit,
    ) -> Result<()> {
        let now = self
            .context
            .timestamp()
            .await
            .map_err(|err| Error::AdapterError {
                source_error: anyhow::Error::new(err),
            })?;
        if permit.is_expired(U256::from(now)) {
            return Err(Error::PermitRejected {
                reason: format!(
                    "deadline {} elapsed at execution time {now}",
                    permit.message.deadline
                ),
            });
        }
        if permit.message.owner != caller {
            return Err(Error::PermitRejected {
                reason: format!(
                    "owner {} is not the caller {caller}",
                    permit.message.owner
                ),
            });
        }
        if permit.message.spender != self.address {
            return Err(Error::PermitRejected {
                reason: format!(
                    "spender {} is not the aggregator {}",
                    permit.message.spender, self.address
                ),
            });
        }
        if permit.message.value != total_amount {
            return Err(Error::PermitRejected {
                reason: format!(
                    "permit value {} does not match total amount {total_amount}",
                    permit.message.value
                ),
            });
        }

        let nonce = self
            .context
            .nonce(token, caller)
            .await
            .map_err(|err| Error::AdapterError {
                source_error: anyhow::Error::new(err),
            })?;
        if permit.message.nonce != nonce {
            return Err(Error::PermitRejected {
                reason: format!(
                    "nonce {} does not match the owner's current nonce {nonce}",
                    permit.message.nonce
                ),
            });
        }

        let domain_separator =
            self.context
                .eip712_domain(token)
                .await
                .map_err(|err| Error::AdapterError {
                    source_error: anyhow::Error::new(err),
                })?;
        permit
            .verify(&domain_separator)
            .map_err(|err| Error::PermitRejected {
                reason: err.to_string(),
            })?;

        Ok(())
    }

    async fn dispatch_erc20(
        &self,
        caller: Address,
        votes_by_round: &[Vec<EncodedVote>],
        rounds: &[Address],
        amounts: &[U256],
        total_amount: U256,
        token: Address,
    ) -> Result<CheckoutSummary> {
        // Redeem, then a single pull followed by N pushes; equivalent to
        // pulling per round but keeps the accounting in one place.
        self.context
            .redeem_permit(token, caller, self.address, total_amount)
            .await
            .map_err(|err| Error::AdapterError {
                source_error: anyhow::Error::new(err),
            })?;

        self.context
            .token_transfer_from(token, self.address, caller, self.address, total_amount)
            .await
            .map_err(|err| Error::InsufficientAllowanceOrBalance {
                owner: caller,
                required: total_amount,
                source_error_message: err.to_string(),
            })?;

        let mut settled = Vec::with_capacity(rounds.len());
        for (index, (votes, (&round, &amount))) in votes_by_round
            .iter()
            .zip(rounds.iter().zip(amounts))
            .enumerate()
        {
            debug!(
                "dispatching {} votes and {amount} of {token} to round {round} ({} of {})",
                votes.len(),
                index + 1,
                rounds.len()
            );
            self.context
                .token_transfer(token, self.address, round, amount)
                .await
                .map_err(|err| Error::RoundCallFailed {
                    index,
                    round,
                    source_error_message: err.to_string(),
                })?;
            self.context
                .call_vote(round, votes, self.address, U256::ZERO)
                .await
                .map_err(|err| Error::RoundCallFailed {
                    index,
                    round,
                    source_error_message: err.to_string(),
                })?;
            settled.push(RoundSettled {
                round,
                votes: votes.len(),
                amount,
            });
        }

        let retained = self
            .context
            .token_balance(token, self.address)
            .await
            .map_err(|err| Error::AdapterError {
                source_error: anyhow::Error::new(err),
            })?;
        if !retained.is_zero() {
            return Err(Error::RetainedBalance { retained });
        }

        Ok(CheckoutSummary {
            rail: PaymentRail::Erc20 { token },
            total: total_amount,
            rounds: settled,
        })
    }
}
