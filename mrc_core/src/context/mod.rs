// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ready-made contexts implementing the checkout adapters.

pub mod memory;
