// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Atomicity of a checkout across both rails: a failure anywhere in the batch
//! leaves every balance, allowance and nonce exactly as before the call.

use alloy::{
    primitives::{address, keccak256, Address, U256},
    signers::local::PrivateKeySigner,
};
use mrc_core::{
    checkout::MultiRoundCheckout,
    context::memory::{InMemoryChain, RoundBehaviour, DEFAULT_CHAIN_ID},
    Error,
};
use mrc_permit::{permit_eip712_domain, Permit, SignedPermit};
use mrc_vote::{EncodedVote, Vote};
use rstest::*;

const AGGREGATOR: Address = address!("00000000000000000000000000000000a66e6a70");
const CALLER: Address = address!("00000000000000000000000000000000ca11e500");
const TOKEN: Address = address!("000000000000000000000000000000000070ce00");
const TOKEN_NAME: &str = "TestToken";
const NOW: u64 = 1_700_000_000;

fn encoded_votes(amounts: &[u64]) -> Vec<EncodedVote> {
    amounts
        .iter()
        .map(|&amount| {
            Vote {
                token: TOKEN,
                amount: U256::from(amount),
                grantee: address!("beefbeefbeefbeefbeefbeefbeefbeefbeefbeef"),
                projectId: keccak256(amount.to_be_bytes()),
                applicationIndex: U256::ZERO,
            }
            .encode()
        })
        .collect()
}

fn rounds_with_middle_revert(chain: &InMemoryChain) -> Vec<Address> {
    let rounds = vec![
        address!("4000000000000000000000000000000000000000"),
        address!("4000000000000000000000000000000000000001"),
        address!("4000000000000000000000000000000000000002"),
    ];
    chain.deploy_round(rounds[0], Address::ZERO, RoundBehaviour::Accept);
    chain.deploy_round(
        rounds[1],
        Address::ZERO,
        RoundBehaviour::Revert("application window closed".to_owned()),
    );
    chain.deploy_round(rounds[2], Address::ZERO, RoundBehaviour::Accept);
    rounds
}

#[fixture]
fn chain() -> InMemoryChain {
    InMemoryChain::new(NOW)
}

#[rstest]
#[tokio::test]
async fn native_mid_batch_revert_unwinds_earlier_rounds(chain: InMemoryChain) {
    let rounds = rounds_with_middle_revert(&chain);
    chain.mint_native(CALLER, U256::from(10u64));

    let votes = vec![
        encoded_votes(&[3]),
        encoded_votes(&[3]),
        encoded_votes(&[4]),
    ];
    let amounts = vec![U256::from(3u64), U256::from(3u64), U256::from(4u64)];
    let aggregator = MultiRoundCheckout::new(chain.clone(), AGGREGATOR);

    let result = aggregator
        .checkout_native(CALLER, &votes, &rounds, &amounts, U256::from(10u64))
        .await;
    assert!(matches!(
        result,
        Err(Error::RoundCallFailed { index: 1, round, ref source_error_message })
            if round == rounds[1] && source_error_message.contains("application window closed")
    ));

    // Round 0 was paid and called before the failure; none of it survives
    assert_eq!(chain.native_balance_of(CALLER), U256::from(10u64));
    for &round in &rounds {
        assert_eq!(chain.native_balance_of(round), U256::ZERO);
    }
    assert_eq!(chain.native_balance_of(AGGREGATOR), U256::ZERO);
    assert!(chain.vote_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn erc20_mid_batch_revert_unwinds_transfers_and_nonce(chain: InMemoryChain) {
    let rounds = rounds_with_middle_revert(&chain);
    let wallet = PrivateKeySigner::random();
    let caller = wallet.address();
    chain.deploy_token(TOKEN, TOKEN_NAME);
    chain.mint_token(TOKEN, caller, U256::from(10u64)).unwrap();

    let votes = vec![
        encoded_votes(&[3]),
        encoded_votes(&[3]),
        encoded_votes(&[4]),
    ];
    let amounts = vec![U256::from(3u64), U256::from(3u64), U256::from(4u64)];
    let aggregator = MultiRoundCheckout::new(chain.clone(), AGGREGATOR);

    let domain = permit_eip712_domain(TOKEN_NAME, DEFAULT_CHAIN_ID, TOKEN);
    let permit = SignedPermit::new(
        &domain,
        Permit {
            owner: caller,
            spender: AGGREGATOR,
            value: U256::from(10u64),
            nonce: U256::ZERO,
            deadline: U256::from(NOW + 3600),
        },
        &wallet,
    )
    .unwrap();

    let result = aggregator
        .checkout_erc20_permit(
            caller,
            &votes,
            &rounds,
            &amounts,
            U256::from(10u64),
            TOKEN,
            &permit,
        )
        .await;
    assert!(matches!(
        result,
        Err(Error::RoundCallFailed { index: 1, .. })
    ));

    assert_eq!(chain.token_balance_of(TOKEN, caller), U256::from(10u64));
    for &round in &rounds {
        assert_eq!(chain.token_balance_of(TOKEN, round), U256::ZERO);
    }
    assert_eq!(chain.token_balance_of(TOKEN, AGGREGATOR), U256::ZERO);
    assert_eq!(chain.nonce_of(TOKEN, caller), U256::ZERO);
    assert_eq!(chain.allowance_of(TOKEN, caller, AGGREGATOR), U256::ZERO);
    assert!(chain.vote_calls().is_empty());

    // The same permit still redeems once the batch is viable again
    chain.set_round_behaviour(rounds[1], RoundBehaviour::Accept);
    aggregator
        .checkout_erc20_permit(
            caller,
            &votes,
            &rounds,
            &amounts,
            U256::from(10u64),
            TOKEN,
            &permit,
        )
        .await
        .unwrap();
    assert_eq!(chain.token_balance_of(TOKEN, caller), U256::ZERO);
    assert_eq!(chain.nonce_of(TOKEN, caller), U256::from(1u64));
}

#[rstest]
#[tokio::test]
async fn aggregator_may_not_retain_pre_existing_dust(chain: InMemoryChain) {
    let round = address!("4000000000000000000000000000000000000000");
    chain.deploy_round(round, Address::ZERO, RoundBehaviour::Accept);
    chain.mint_native(CALLER, U256::from(5u64));
    // Dust someone sent the aggregator outside any checkout
    chain.mint_native(AGGREGATOR, U256::from(1u64));

    let aggregator = MultiRoundCheckout::new(chain.clone(), AGGREGATOR);
    let votes = vec![encoded_votes(&[5])];
    let result = aggregator
        .checkout_native(
            CALLER,
            &votes,
            &[round],
            &[U256::from(5u64)],
            U256::from(5u64),
        )
        .await;

    assert!(matches!(
        result,
        Err(Error::RetainedBalance { retained }) if retained == U256::from(1u64)
    ));
    // Rolled back, dust included
    assert_eq!(chain.native_balance_of(CALLER), U256::from(5u64));
    assert_eq!(chain.native_balance_of(AGGREGATOR), U256::from(1u64));
    assert_eq!(chain.native_balance_of(round), U256::ZERO);
}

#[rstest]
#[tokio::test]
async fn sequential_checkouts_do_not_interfere(chain: InMemoryChain) {
    let rounds = vec![
        address!("4000000000000000000000000000000000000000"),
        address!("4000000000000000000000000000000000000001"),
    ];
    for &round in &rounds {
        chain.deploy_round(round, Address::ZERO, RoundBehaviour::Accept);
    }
    chain.mint_native(CALLER, U256::from(6u64));
    let other = address!("0000000000000000000000000000000000007e40");
    chain.mint_native(other, U256::from(4u64));

    let aggregator = MultiRoundCheckout::new(chain.clone(), AGGREGATOR);

    aggregator
        .checkout_native(
            CALLER,
            &[encoded_votes(&[2]), encoded_votes(&[4])],
            &rounds,
            &[U256::from(2u64), U256::from(4u64)],
            U256::from(6u64),
        )
        .await
        .unwrap();
    aggregator
        .checkout_native(
            other,
            &[encoded_votes(&[4]), encoded_votes(&[0])],
            &rounds,
            &[U256::from(4u64), U256::ZERO],
            U256::from(4u64),
        )
        .await
        .unwrap();

    assert_eq!(chain.native_balance_of(rounds[0]), U256::from(6u64));
    assert_eq!(chain.native_balance_of(rounds[1]), U256::from(4u64));
    assert_eq!(chain.vote_calls().len(), 4);
}
