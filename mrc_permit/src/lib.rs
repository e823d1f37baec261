// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0
#![doc = include_str!("../README.md")]

use std::borrow::Cow;

use alloy::{
    dyn_abi::Eip712Domain,
    primitives::{Address, Signature, B256, U256},
    signers::{local::PrivateKeySigner, SignerSync},
    sol,
    sol_types::SolStruct,
};
use serde::{Deserialize, Serialize};

/// Errors returned by signing and verifying permits
#[derive(thiserror::Error, Debug)]
pub enum PermitError {
    /// `alloy` wallet error
    #[error(transparent)]
    WalletError(#[from] alloy::signers::Error),

    /// `alloy` signature error
    #[error(transparent)]
    SignatureError(#[from] alloy::primitives::SignatureError),

    /// The recovered signer is not the permit owner
    #[error("permit signed by {recovered}, expected owner {owner}")]
    SignerMismatch { recovered: Address, owner: Address },
}

sol! {
    /// EIP-2612 permit message authorizing a spender to pull `value` of the
    /// owner's tokens without a prior approval transaction.
    ///
    /// Field names and order follow the standard typehash
    /// `Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)`.
    #[derive(Debug, Serialize, Deserialize, Eq, PartialEq)]
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }
}

/// The EIP-712 domain separator for an EIP-2612 token.
///
/// Per the standard the domain is anchored on the token itself:
/// - `name`: the token's ERC20 name
/// - `version`: "1"
/// - `chain_id`: the chain the token is deployed on
/// - `verifying_contract`: the token address
pub fn permit_eip712_domain(
    token_name: impl Into<Cow<'static, str>>,
    chain_id: u64,
    token: Address,
) -> Eip712Domain {
    Eip712Domain::new(
        Some(token_name.into()),
        Some(Cow::Borrowed("1")),
        Some(U256::from(chain_id)),
        Some(token),
        None,
    )
}

/// EIP-712 signed permit
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SignedPermit {
    /// Permit message that was signed
    pub message: Permit,
    /// ECDSA signature of the eip712 hash of the message
    pub signature: Signature,
}

impl SignedPermit {
    /// Signs the EIP-712 hash of `message` under the token's domain
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::WalletError`] if the wallet cannot sign
    pub fn new(
        domain_separator: &Eip712Domain,
        message: Permit,
        signing_wallet: &PrivateKeySigner,
    ) -> Result<Self, PermitError> {
        let recovery_message_hash = message.eip712_signing_hash(domain_separator);

        let signature = signing_wallet.sign_hash_sync(&recovery_message_hash)?;

        Ok(Self { message, signature })
    }

    /// Recovers and returns the signer of the permit from the signature.
    pub fn recover_signer(&self, domain_separator: &Eip712Domain) -> Result<Address, PermitError> {
        let recovery_message_hash = self.message.eip712_signing_hash(domain_separator);
        let recovered_address = self
            .signature
            .recover_address_from_prehash(&recovery_message_hash)?;
        Ok(recovered_address)
    }

    /// Checks that the permit was signed by its own `owner` field.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::SignerMismatch`] if the recovered address is
    /// not the owner.
    pub fn verify(&self, domain_separator: &Eip712Domain) -> Result<(), PermitError> {
        let recovered = self.recover_signer(domain_separator)?;
        if recovered != self.message.owner {
            return Err(PermitError::SignerMismatch {
                recovered,
                owner: self.message.owner,
            });
        }
        Ok(())
    }

    /// True if the permit deadline has elapsed at time `now`
    pub fn is_expired(&self, now: U256) -> bool {
        now > self.message.deadline
    }

    /// Splits the signature into the `(v, r, s)` triple taken by
    /// `permit(owner, spender, value, deadline, v, r, s)` on chain.
    pub fn split_signature(&self) -> (u8, B256, B256) {
        let v = 27 + u8::from(self.signature.v());
        let r = B256::from(self.signature.r().to_be_bytes::<32>());
        let s = B256::from(self.signature.s().to_be_bytes::<32>());
        (v, r, s)
    }
}
