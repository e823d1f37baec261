// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0
#![doc = include_str!("../README.md")]

mod batch;
mod vote;

pub use batch::{CheckoutRequest, RoundBatch};
pub use vote::{EncodedVote, Vote, VoteError};
