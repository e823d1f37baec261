// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use alloy::{
    dyn_abi::Eip712Domain,
    primitives::{Address, U256},
};
use async_trait::async_trait;

/// Native currency balances and transfers.
///
/// # Example
///
/// For example code see [crate::context::memory::InMemoryChain]
#[async_trait]
pub trait NativeLedger {
    /// Defines the user-specified error type.
    ///
    /// This error type should implement the `Error` and `Debug` traits from
    /// the standard library.
    /// Errors of this type are returned to the user when an operation fails.
    type AdapterError: std::error::Error + std::fmt::Debug + Send + Sync + 'static;

    async fn native_balance(&self, account: Address) -> Result<U256, Self::AdapterError>;

    /// Moves `value` of native currency from `from` to `to`, failing if the
    /// sender's balance does not cover it
    async fn native_transfer(
        &self,
        from: Address,
        to: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError>;
}

/// ERC20 state for tokens with EIP-2612 permit support.
///
/// Allowances and nonces are global, cross-call state owned entirely by the
/// token; the aggregator accesses them through this narrow interface and
/// never caches or shadows them.
///
/// # Example
///
/// For example code see [crate::context::memory::InMemoryChain]
#[async_trait]
pub trait Erc20Ledger {
    /// Defines the user-specified error type.
    ///
    /// This error type should implement the `Error` and `Debug` traits from
    /// the standard library.
    /// Errors of this type are returned to the user when an operation fails.
    type AdapterError: std::error::Error + std::fmt::Debug + Send + Sync + 'static;

    async fn token_balance(
        &self,
        token: Address,
        account: Address,
    ) -> Result<U256, Self::AdapterError>;

    /// Standard ERC20 `transfer`, spending `from`'s own balance
    async fn token_transfer(
        &self,
        token: Address,
        from: Address,
        to: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError>;

    /// Standard ERC20 `transferFrom`, consuming `spender`'s allowance from
    /// `owner`
    async fn token_transfer_from(
        &self,
        token: Address,
        spender: Address,
        owner: Address,
        to: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError>;

    /// Standard ERC20 `approve`. Used by the non-batched baseline path; the
    /// permit rail never issues a separate approval.
    async fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError>;

    /// EIP-2612 `nonces(owner)` for the given token
    async fn nonce(&self, token: Address, owner: Address) -> Result<U256, Self::AdapterError>;

    /// The token's EIP-712 domain separator
    /// `{name, version: "1", chainId, verifyingContract: token}`
    async fn eip712_domain(&self, token: Address) -> Result<Eip712Domain, Self::AdapterError>;

    /// Redeems an already-verified permit: grants `spender` a one-time
    /// allowance of `value` from `owner` and consumes the owner's nonce
    async fn redeem_permit(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        value: U256,
    ) -> Result<(), Self::AdapterError>;

    /// Execution-time clock permit deadlines are checked against, as a unix
    /// timestamp in seconds
    async fn timestamp(&self) -> Result<u64, Self::AdapterError>;
}
