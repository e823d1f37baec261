// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory context implementation for the checkout aggregator.
//!
//! This module provides an in-memory chain holding native and token balances,
//! allowances, permit nonces and registered round behaviours. It is useful
//! for testing and development purposes: reverting rounds exercise the
//! rollback path, and the ordered call log lets tests assert dispatch order.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use alloy::{
    dyn_abi::Eip712Domain,
    primitives::{Address, U256},
};
use async_trait::async_trait;
use mrc_permit::permit_eip712_domain;
use mrc_vote::EncodedVote;
use thiserror::Error;

use crate::checkout::adapters::{Checkpoint, Erc20Ledger, NativeLedger, RoundCall};

/// Hardhat's default local chain id, matching the usual bench environment
pub const DEFAULT_CHAIN_ID: u64 = 31337;

#[derive(Debug, Error)]
pub enum InMemoryError {
    #[error("no round deployed at {0}")]
    UnknownRound(Address),
    #[error("no token deployed at {0}")]
    UnknownToken(Address),
    #[error("{account} holds {balance}, needs {required}")]
    InsufficientBalance {
        account: Address,
        balance: U256,
        required: U256,
    },
    #[error("{spender} may spend {allowance} of {owner}'s tokens, needs {required}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: U256,
        required: U256,
    },
    #[error("round {round} reverted: {reason}")]
    RoundReverted { round: Address, reason: String },
    #[error("unknown checkpoint {0}")]
    UnknownCheckpoint(u64),
}

/// What a registered round does when its vote entry point is invoked
#[derive(Debug, Clone)]
pub enum RoundBehaviour {
    /// Processes the votes and keeps any forwarded value
    Accept,
    /// Reverts the call with the given reason
    Revert(String),
}

/// One `vote` invocation observed by a round, recorded in dispatch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCall {
    pub round: Address,
    pub caller: Address,
    pub encoded_votes: Vec<EncodedVote>,
    /// Native value forwarded with the call; zero on the token rail
    pub value: U256,
}

#[derive(Debug, Clone, Default)]
struct TokenState {
    name: String,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    nonces: HashMap<Address, U256>,
}

#[derive(Debug, Clone)]
struct RoundState {
    behaviour: RoundBehaviour,
    voting_strategy: Address,
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    native: HashMap<Address, U256>,
    tokens: HashMap<Address, TokenState>,
    rounds: HashMap<Address, RoundState>,
    calls: Vec<VoteCall>,
    timestamp: u64,
}

impl ChainState {
    fn debit_native(&mut self, account: Address, value: U256) -> Result<(), InMemoryError> {
        let balance = self.native.get(&account).copied().unwrap_or(U256::ZERO);
        let remaining = balance
            .checked_sub(value)
            .ok_or(InMemoryError::InsufficientBalance {
                account,
                balance,
                required: value,
            })?;
        self.native.insert(account, remaining);
        Ok(())
    }

    fn credit_native(&mut self, account: Address, value: U256) {
        let balance = self.native.entry(account).or_insert(U256::ZERO);
        *balance = balance.saturating_add(value);
    }

    fn token_mut(&mut self, token: Address) -> Result<&mut TokenState, InMemoryError> {
        self.tokens
            .get_mut(&token)
            .ok_or(InMemoryError::UnknownToken(token))
    }
}

impl TokenState {
    fn debit(&mut self, account: Address, value: U256) -> Result<(), InMemoryError> {
        let balance = self.balances.get(&account).copied().unwrap_or(U256::ZERO);
        let remaining = balance
            .checked_sub(value)
            .ok_or(InMemoryError::InsufficientBalance {
                account,
                balance,
                required: value,
            })?;
        self.balances.insert(account, remaining);
        Ok(())
    }

    fn credit(&mut self, account: Address, value: U256) {
        let balance = self.balances.entry(account).or_insert(U256::ZERO);
        *balance = balance.saturating_add(value);
    }
}

/// In-memory chain with rwlocked state to allow sharing with other
/// components as needed. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct InMemoryChain {
    chain_id: u64,
    state: Arc<RwLock<ChainState>>,
    snapshots: Arc<RwLock<Vec<ChainState>>>,
}

impl InMemoryChain {
    /// Creates an empty chain whose clock starts at `timestamp` (unix
    /// seconds), on the default local chain id
    pub fn new(timestamp: u64) -> Self {
        let state = ChainState {
            timestamp,
            ..ChainState::default()
        };
        InMemoryChain {
            chain_id: DEFAULT_CHAIN_ID,
            state: Arc::new(RwLock::new(state)),
            snapshots: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Registers a round at `round` with the given behaviour
    pub fn deploy_round(&self, round: Address, voting_strategy: Address, behaviour: RoundBehaviour) {
        let mut state = self.state.write().unwrap();
        state.rounds.insert(
            round,
            RoundState {
                behaviour,
                voting_strategy,
            },
        );
    }

    /// Replaces the behaviour of an already deployed round
    pub fn set_round_behaviour(&self, round: Address, behaviour: RoundBehaviour) {
        let mut state = self.state.write().unwrap();
        if let Some(round_state) = state.rounds.get_mut(&round) {
            round_state.behaviour = behaviour;
        }
    }

    /// Registers an EIP-2612 token at `token`; `name` anchors its EIP-712
    /// domain
    pub fn deploy_token(&self, token: Address, name: &str) {
        let mut state = self.state.write().unwrap();
        state.tokens.insert(
            token,
            TokenState {
                name: name.to_owned(),
                ..TokenState::default()
            },
        );
    }

    pub fn mint_native(&self, account: Address, value: U256) {
        self.state.write().unwrap().credit_native(account, value);
    }

    pub fn mint_token(
        &self,
        token: Address,
        account: Address,
        value: U256,
    ) -> Result<(), InMemoryError> {
        let mut state = self.state.write().unwrap();
        state.token_mut(token)?.credit(account, value);
        Ok(())
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.state.write().unwrap().timestamp = timestamp;
    }

    pub fn native_balance_of(&self, account: Address) -> U256 {
        self.state
            .read()
            .unwrap()
            .native
            .get(&account)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn token_balance_of(&self, token: Address, account: Address) -> U256 {
        self.state
            .read()
            .unwrap()
            .tokens
            .get(&token)
            .and_then(|t| t.balances.get(&account).copied())
            .unwrap_or(U256::ZERO)
    }

    pub fn allowance_of(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.state
            .read()
            .unwrap()
            .tokens
            .get(&token)
            .and_then(|t| t.allowances.get(&(owner, spender)).copied())
            .unwrap_or(U256::ZERO)
    }

    pub fn nonce_of(&self, token: Address, owner: Address) -> U256 {
        self.state
            .read()
            .unwrap()
            .tokens
            .get(&token)
            .and_then(|t| t.nonces.get(&owner).copied())
            .unwrap_or(U256::ZERO)
    }

    /// The vote calls rounds have observed so far, in dispatch order
    pub fn vote_calls(&self) -> Vec<VoteCall> {
        self.state.read().unwrap().calls.clone()
    }
}

#[async_trait]
impl RoundCall for InMemoryChain {
    type AdapterError = InMemoryError;

    async fn call_vote(
        &self,
        round: Address,
        encoded_votes: &[EncodedVote],
        from: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError> {
        let mut state = self.state.write().unwrap();
        let behaviour = state
            .rounds
            .get(&round)
            .map(|r| r.behaviour.clone())
            .ok_or(InMemoryError::UnknownRound(round))?;

        // Value moves with the call, before the round body runs; a revert
        // leaves it in place here and the enclosing checkpoint discards it,
        // as on chain.
        if !value.is_zero() {
            state.debit_native(from, value)?;
            state.credit_native(round, value);
        }

        match behaviour {
            RoundBehaviour::Revert(reason) => {
                Err(InMemoryError::RoundReverted { round, reason })
            }
            RoundBehaviour::Accept => {
                state.calls.push(VoteCall {
                    round,
                    caller: from,
                    encoded_votes: encoded_votes.to_vec(),
                    value,
                });
                Ok(())
            }
        }
    }

    async fn voting_strategy(&self, round: Address) -> Result<Address, Self::AdapterError> {
        self.state
            .read()
            .unwrap()
            .rounds
            .get(&round)
            .map(|r| r.voting_strategy)
            .ok_or(InMemoryError::UnknownRound(round))
    }
}

#[async_trait]
impl NativeLedger for InMemoryChain {
    type AdapterError = InMemoryError;

    async fn native_balance(&self, account: Address) -> Result<U256, Self::AdapterError> {
        Ok(self.native_balance_of(account))
    }

    async fn native_transfer(
        &self,
        from: Address,
        to: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError> {
        let mut state = self.state.write().unwrap();
        state.debit_native(from, value)?;
        state.credit_native(to, value);
        Ok(())
    }
}

#[async_trait]
impl Erc20Ledger for InMemoryChain {
    type AdapterError = InMemoryError;

    async fn token_balance(
        &self,
        token: Address,
        account: Address,
    ) -> Result<U256, Self::AdapterError> {
        let state = self.state.read().unwrap();
        let token_state = state
            .tokens
            .get(&token)
            .ok_or(InMemoryError::UnknownToken(token))?;
        Ok(token_state
            .balances
            .get(&account)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn token_transfer(
        &self,
        token: Address,
        from: Address,
        to: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError> {
        let mut state = self.state.write().unwrap();
        let token_state = state.token_mut(token)?;
        token_state.debit(from, value)?;
        token_state.credit(to, value);
        Ok(())
    }

    async fn token_transfer_from(
        &self,
        token: Address,
        spender: Address,
        owner: Address,
        to: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError> {
        let mut state = self.state.write().unwrap();
        let token_state = state.token_mut(token)?;

        let allowance = token_state
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(U256::ZERO);
        let remaining =
            allowance
                .checked_sub(value)
                .ok_or(InMemoryError::InsufficientAllowance {
                    owner,
                    spender,
                    allowance,
                    required: value,
                })?;
        token_state.allowances.insert((owner, spender), remaining);

        token_state.debit(owner, value)?;
        token_state.credit(to, value);
        Ok(())
    }

    async fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError> {
        let mut state = self.state.write().unwrap();
        state
            .token_mut(token)?
            .allowances
            .insert((owner, spender), value);
        Ok(())
    }

    async fn nonce(&self, token: Address, owner: Address) -> Result<U256, Self::AdapterError> {
        let state = self.state.read().unwrap();
        let token_state = state
            .tokens
            .get(&token)
            .ok_or(InMemoryError::UnknownToken(token))?;
        Ok(token_state
            .nonces
            .get(&owner)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn eip712_domain(&self, token: Address) -> Result<Eip712Domain, Self::AdapterError> {
        let state = self.state.read().unwrap();
        let token_state = state
            .tokens
            .get(&token)
            .ok_or(InMemoryError::UnknownToken(token))?;
        Ok(permit_eip712_domain(
            token_state.name.clone(),
            self.chain_id,
            token,
        ))
    }

    async fn redeem_permit(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError> {
        let mut state = self.state.write().unwrap();
        let token_state = state.token_mut(token)?;
        token_state.allowances.insert((owner, spender), value);
        let nonce = token_state.nonces.entry(owner).or_insert(U256::ZERO);
        *nonce = nonce.saturating_add(U256::from(1u64));
        Ok(())
    }

    async fn timestamp(&self) -> Result<u64, Self::AdapterError> {
        Ok(self.state.read().unwrap().timestamp)
    }
}

#[async_trait]
impl Checkpoint for InMemoryChain {
    type AdapterError = InMemoryError;

    async fn checkpoint(&self) -> Result<u64, Self::AdapterError> {
        let saved = self.state.read().unwrap().clone();
        let mut snapshots = self.snapshots.write().unwrap();
        snapshots.push(saved);
        Ok(snapshots.len() as u64 - 1)
    }

    async fn commit(&self, checkpoint: u64) -> Result<(), Self::AdapterError> {
        let mut snapshots = self.snapshots.write().unwrap();
        if checkpoint as usize >= snapshots.len() {
            return Err(InMemoryError::UnknownCheckpoint(checkpoint));
        }
        snapshots.truncate(checkpoint as usize);
        Ok(())
    }

    async fn rollback(&self, checkpoint: u64) -> Result<(), Self::AdapterError> {
        let saved = {
            let mut snapshots = self.snapshots.write().unwrap();
            if checkpoint as usize >= snapshots.len() {
                return Err(InMemoryError::UnknownCheckpoint(checkpoint));
            }
            snapshots.truncate(checkpoint as usize + 1);
            snapshots
                .pop()
                .ok_or(InMemoryError::UnknownCheckpoint(checkpoint))?
        };
        *self.state.write().unwrap() = saved;
        Ok(())
    }
}

#[cfg(test)]
mod memory_unit_test {
    use alloy::primitives::address;
    use rstest::*;

    use super::*;

    #[fixture]
    fn chain() -> InMemoryChain {
        InMemoryChain::new(1_700_000_000)
    }

    #[fixture]
    fn token() -> Address {
        address!("1234567890abcdef1234567890abcdef12345678")
    }

    #[rstest]
    #[tokio::test]
    async fn transfer_from_consumes_allowance(chain: InMemoryChain, token: Address) {
        let owner = address!("abababababababababababababababababababab");
        let spender = address!("deaddeaddeaddeaddeaddeaddeaddeaddeaddead");

        chain.deploy_token(token, "Test");
        chain.mint_token(token, owner, U256::from(10u64)).unwrap();
        chain
            .approve(token, owner, spender, U256::from(4u64))
            .await
            .unwrap();

        chain
            .token_transfer_from(token, spender, owner, spender, U256::from(3u64))
            .await
            .unwrap();
        assert_eq!(chain.allowance_of(token, owner, spender), U256::from(1u64));
        assert_eq!(chain.token_balance_of(token, spender), U256::from(3u64));

        let over = chain
            .token_transfer_from(token, spender, owner, spender, U256::from(2u64))
            .await;
        assert!(matches!(
            over,
            Err(InMemoryError::InsufficientAllowance { .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn rollback_restores_balances_and_nonces(chain: InMemoryChain, token: Address) {
        let owner = address!("abababababababababababababababababababab");
        let spender = address!("deaddeaddeaddeaddeaddeaddeaddeaddeaddead");

        chain.deploy_token(token, "Test");
        chain.mint_token(token, owner, U256::from(10u64)).unwrap();
        chain.mint_native(owner, U256::from(5u64));

        let checkpoint = chain.checkpoint().await.unwrap();

        chain
            .redeem_permit(token, owner, spender, U256::from(10u64))
            .await
            .unwrap();
        chain
            .native_transfer(owner, spender, U256::from(5u64))
            .await
            .unwrap();
        assert_eq!(chain.nonce_of(token, owner), U256::from(1u64));

        chain.rollback(checkpoint).await.unwrap();
        assert_eq!(chain.nonce_of(token, owner), U256::ZERO);
        assert_eq!(chain.allowance_of(token, owner, spender), U256::ZERO);
        assert_eq!(chain.native_balance_of(owner), U256::from(5u64));
        assert_eq!(chain.native_balance_of(spender), U256::ZERO);
    }

    #[rstest]
    #[tokio::test]
    async fn reverting_round_surfaces_its_reason(chain: InMemoryChain) {
        let round = address!("abababababababababababababababababababab");
        let caller = address!("deaddeaddeaddeaddeaddeaddeaddeaddeaddead");
        chain.deploy_round(
            round,
            Address::ZERO,
            RoundBehaviour::Revert("voting closed".to_owned()),
        );

        let result = chain.call_vote(round, &[], caller, U256::ZERO).await;
        assert!(
            matches!(result, Err(InMemoryError::RoundReverted { reason, .. }) if reason == "voting closed")
        );
        assert!(chain.vote_calls().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn voting_strategy_is_the_deployed_one(chain: InMemoryChain) {
        let round = address!("abababababababababababababababababababab");
        let strategy = address!("deaddeaddeaddeaddeaddeaddeaddeaddeaddead");
        chain.deploy_round(round, strategy, RoundBehaviour::Accept);

        assert_eq!(chain.voting_strategy(round).await.unwrap(), strategy);
        assert!(matches!(
            chain.voting_strategy(strategy).await,
            Err(InMemoryError::UnknownRound(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn commit_discards_the_snapshot(chain: InMemoryChain) {
        let account = address!("abababababababababababababababababababab");
        chain.mint_native(account, U256::from(1u64));

        let checkpoint = chain.checkpoint().await.unwrap();
        chain.commit(checkpoint).await.unwrap();

        // The handle is spent; neither commit nor rollback may reuse it
        assert!(matches!(
            chain.rollback(checkpoint).await,
            Err(InMemoryError::UnknownCheckpoint(_))
        ));
    }
}
