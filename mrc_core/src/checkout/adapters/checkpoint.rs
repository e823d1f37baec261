// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

/// Transaction boundary for one checkout call.
///
/// The aggregator opens a checkpoint before its first ledger effect, rolls
/// back on any error and commits only once the whole batch has dispatched.
/// This is the in-process analogue of the all-or-nothing semantics of a
/// submitted transaction: a rolled back call leaves every balance, allowance
/// and nonce as it was.
///
/// # Example
///
/// For example code see [crate::context::memory::InMemoryChain]
#[async_trait]
pub trait Checkpoint {
    /// Defines the user-specified error type.
    ///
    /// This error type should implement the `Error` and `Debug` traits from
    /// the standard library.
    /// Errors of this type are returned to the user when an operation fails.
    type AdapterError: std::error::Error + std::fmt::Debug + Send + Sync + 'static;

    /// Records the current state, returning a handle to restore it
    async fn checkpoint(&self) -> Result<u64, Self::AdapterError>;

    /// Discards the checkpoint, making every effect since it permanent
    async fn commit(&self, checkpoint: u64) -> Result<(), Self::AdapterError>;

    /// Restores the state recorded at `checkpoint`, discarding every effect
    /// since
    async fn rollback(&self, checkpoint: u64) -> Result<(), Self::AdapterError>;
}
