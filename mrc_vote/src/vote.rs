// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Module containing the Vote type forwarded to round contracts
//!
//! A vote is created by the caller, ABI encoded and handed to the checkout
//! aggregator, which forwards it verbatim to the round it is destined for.
//! The aggregator treats the payload as opaque except for the `amount` word,
//! which it reads to reconcile the value attributed to each round.

use alloy::{
    primitives::{Bytes, U256},
    sol,
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

/// Word index of the `amount` field inside an ABI encoded vote.
///
/// This position (and its unit) is the only part of the vote layout the
/// aggregator relies on; everything else may evolve per round implementation.
pub const AMOUNT_WORD: usize = 1;

const WORD_SIZE: usize = 32;

sol! {
    /// Single grant vote, ABI encoded as the positional tuple
    /// `(address, uint256, address, bytes32, uint256)` expected by the
    /// round implementations.
    ///
    /// We use camelCase for field names to match the Ethereum ABI encoding
    #[derive(Debug, Serialize, Deserialize, Eq, PartialEq)]
    struct Vote {
        /// Token the vote is denominated in (zero address for native currency)
        address token;
        /// Value attached to this vote, reconciled by the aggregator
        uint256 amount;
        /// Grant recipient the round should credit
        address grantee;
        /// Opaque project identifier, meaningful only to the round
        bytes32 projectId;
        /// Opaque application index, meaningful only to the round
        uint256 applicationIndex;
    }
}

/// Errors raised while encoding votes or reading their amount word
#[derive(thiserror::Error, Debug)]
pub enum VoteError {
    #[error("encoded vote of {len} bytes is too short to carry an amount word")]
    MissingAmountWord { len: usize },
    #[error("summing vote amounts overflows uint256")]
    AmountOverflow,
}

/// ABI encoded vote payload, opaque to the checkout aggregator.
///
/// Payloads are forwarded to rounds untouched. The only semantic access the
/// aggregator has is [`EncodedVote::amount`], reading the word at
/// [`AMOUNT_WORD`]; round contracts own the meaning of every other byte.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct EncodedVote(Bytes);

impl EncodedVote {
    /// Wraps an already encoded payload without inspecting it
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Reads the declared amount word of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`VoteError::MissingAmountWord`] if the payload is shorter
    /// than the fixed amount word position.
    pub fn amount(&self) -> Result<U256, VoteError> {
        let start = AMOUNT_WORD * WORD_SIZE;
        let end = start + WORD_SIZE;
        if self.0.len() < end {
            return Err(VoteError::MissingAmountWord { len: self.0.len() });
        }
        Ok(U256::from_be_slice(&self.0[start..end]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vote> for EncodedVote {
    fn from(vote: Vote) -> Self {
        vote.encode()
    }
}

impl Vote {
    /// ABI encodes the vote into the opaque payload handed to the aggregator
    pub fn encode(&self) -> EncodedVote {
        EncodedVote(self.abi_encode().into())
    }
}
