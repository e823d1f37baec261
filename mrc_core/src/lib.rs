// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0
#![doc = include_str!("../README.md")]
//! ## Getting started
//!
//! Take a look at the [`checkout`] module to see how to run a batched
//! checkout and implement the needed adapters, or at [`context::memory`]
//! for a ready-made in-memory backing.

pub mod checkout;
pub mod context;
mod error;

pub use error::{Error, Result};
