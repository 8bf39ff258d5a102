// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use alloy::primitives::U256;
use bonding_ledger::{
    BondingError, DelegatorData, DelegatorStateService, DelegatorStatus, StaticResolver,
    TranscoderData, TranscoderStatus,
};
use bonding_test_utils::{actor, FailingResolver, MockChain};
use tracing_test::traced_test;

fn service(chain: &Arc<MockChain>) -> DelegatorStateService {
    let resolver = StaticResolver::new().with_name("alice.eth", actor(1));
    DelegatorStateService::new(chain.clone(), Arc::new(resolver))
}

fn bonded_delegator(chain: &MockChain, next_unbonding_lock_id: u64) {
    chain.set_delegator(
        actor(1),
        DelegatorData {
            bonded_amount: U256::from(100),
            fees: U256::from(3),
            delegate_address: actor(100),
            delegated_amount: U256::ZERO,
            start_round: 2,
            last_claim_round: 9,
            next_unbonding_lock_id,
        },
    );
    chain.set_delegator_status(actor(1), 1);
    chain.set_pending_stake(actor(1), U256::from(120));
    chain.set_pending_fees(actor(1), U256::from(4));
    chain.set_allowance(actor(1), U256::from(1_000));
}

#[tokio::test]
#[traced_test]
async fn composite_delegator_view() -> anyhow::Result<()> {
    let chain = Arc::new(MockChain::new());
    chain.set_current_round(10);
    bonded_delegator(&chain, 0);

    let delegator = service(&chain).get_delegator("alice.eth").await?;

    assert_eq!(delegator.address, actor(1));
    assert_eq!(delegator.status, DelegatorStatus::Bonded);
    assert_eq!(delegator.bonded_amount, U256::from(100));
    assert_eq!(delegator.delegate_address, Some(actor(100)));
    assert_eq!(delegator.pending_stake, U256::from(120));
    assert_eq!(delegator.pending_fees, U256::from(4));
    assert_eq!(delegator.allowance, U256::from(1_000));
    assert_eq!(delegator.last_claim_round, 9);
    assert_eq!(delegator.withdraw_round, 0);
    assert_eq!(chain.pending_stake_reads(), vec![(actor(1), 10)]);
    Ok(())
}

#[tokio::test]
async fn latest_pending_lock_means_unbonding() -> anyhow::Result<()> {
    let chain = Arc::new(MockChain::new());
    chain.set_current_round(10);
    bonded_delegator(&chain, 2);
    chain.set_unbonding_lock(actor(1), 0, U256::ZERO, 0);
    chain.set_unbonding_lock(actor(1), 1, U256::from(25), 12);

    let service = service(&chain);
    let delegator = service.get_delegator(&format!("{}", actor(1))).await?;
    assert_eq!(delegator.status, DelegatorStatus::Unbonding);
    assert_eq!(delegator.withdraw_round, 12);
    assert_eq!(delegator.withdraw_amount, U256::from(25));

    chain.set_current_round(12);
    assert_eq!(service.get_delegator_status(actor(1)).await?, DelegatorStatus::Bonded);

    let locks = service.get_delegator_unbonding_locks(actor(1)).await?;
    let ids: Vec<_> = locks.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![1, 0]);
    Ok(())
}

#[tokio::test]
async fn addresses_are_not_resolved() -> anyhow::Result<()> {
    let chain = Arc::new(MockChain::new());
    bonded_delegator(&chain, 0);
    let service = DelegatorStateService::new(chain.clone(), Arc::new(FailingResolver));

    let delegator = service.get_delegator("0x0000000000000000000000000000000000000001").await?;
    assert_eq!(delegator.address, actor(1));

    let err = service.get_delegator("alice.eth").await.unwrap_err();
    assert!(matches!(err, BondingError::ChainRead { call: "resolveName", .. }));
    Ok(())
}

#[tokio::test]
async fn undefined_name_is_not_found() {
    let chain = Arc::new(MockChain::new());
    let err = service(&chain).get_delegator("bob.eth").await.unwrap_err();
    assert!(matches!(err, BondingError::NotFound(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn pending_reads_default_to_current_round() -> anyhow::Result<()> {
    let chain = Arc::new(MockChain::new());
    chain.set_current_round(42);
    bonded_delegator(&chain, 0);
    let service = service(&chain);

    assert_eq!(service.get_pending_stake(actor(1), None).await?, U256::from(120));
    assert_eq!(service.get_pending_stake(actor(1), Some(7)).await?, U256::from(120));
    assert_eq!(chain.pending_stake_reads(), vec![(actor(1), 42), (actor(1), 7)]);
    assert_eq!(service.get_pending_fees(actor(1), None).await?, U256::from(4));
    Ok(())
}

#[tokio::test]
async fn read_failures_are_wrapped() {
    let chain = Arc::new(MockChain::new());
    bonded_delegator(&chain, 0);
    chain.fail("pendingFees", "execution reverted");

    let service = service(&chain);
    let err = service.get_pending_fees(actor(1), Some(1)).await.unwrap_err();
    assert_eq!(err.to_string(), "Error: getPendingFees: execution reverted");

    let err = service.get_delegator("alice.eth").await.unwrap_err();
    assert!(matches!(err, BondingError::ChainRead { call: "pendingFees", .. }));
}

#[tokio::test]
async fn transcoder_pool_walk() -> anyhow::Result<()> {
    let chain = Arc::new(MockChain::new());
    for (n, stake, active) in [(100u64, 500u64, true), (101, 300, true), (102, 10, false)] {
        chain.add_transcoder(
            actor(n),
            TranscoderData {
                reward_cut: U256::from(2_500),
                fee_share: U256::from(5_000),
                last_reward_round: 8,
                ..Default::default()
            },
            U256::from(stake),
            active,
        );
    }
    let service = service(&chain);

    let transcoders = service.get_transcoders().await?;
    let addresses: Vec<_> = transcoders.iter().map(|t| t.address).collect();
    assert_eq!(addresses, vec![actor(100), actor(101), actor(102)]);
    assert!(transcoders[1].active);
    assert!(!transcoders[2].active);
    assert_eq!(transcoders[0].total_stake, U256::from(500));
    assert_eq!(transcoders[0].status, TranscoderStatus::Registered);

    let unknown = service.get_transcoder(&format!("{}", actor(7))).await?;
    assert_eq!(unknown.status, TranscoderStatus::NotRegistered);
    Ok(())
}

#[tokio::test]
async fn looping_pool_is_an_error() {
    let chain = Arc::new(MockChain::new());
    chain.set_pool(vec![actor(100), actor(101), actor(100)]);

    let err = service(&chain).get_transcoders().await.unwrap_err();
    assert!(matches!(err, BondingError::ChainRead { call: "getNextTranscoderInPool", .. }));
}

#[tokio::test]
async fn current_round_info() -> anyhow::Result<()> {
    let chain = Arc::new(MockChain::new());
    chain.set_current_round(11);
    chain.set_round_info(true, 5_760, 11, 5_760);

    let info = service(&chain).get_current_round_info().await?;
    assert_eq!(info.id, 11);
    assert!(info.initialized);
    assert_eq!(info.last_initialized_round, 11);
    assert_eq!(info.length, 5_760);
    assert_eq!(info.start_block, 5_760);
    Ok(())
}
