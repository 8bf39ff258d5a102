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

use alloy::primitives::{Address, U256};
use bonding_ledger::{
    BondingError, BondingManagerVersion, BondingStore, DelegatorData, DelegatorRecord,
    EarningsPool, MemoryStore, RoundRewardAccountant, TranscoderData, STREAMFLOW_BLOCK,
    UNBONDING_LOCKS_BLOCK,
};
use bonding_test_utils::{actor, MockChain};
use futures_util::future::join_all;
use tracing_test::traced_test;

const ROUND: u64 = 5;

struct Ctx {
    chain: Arc<MockChain>,
    store: Arc<MemoryStore>,
    accountant: RoundRewardAccountant,
    delegator: Address,
    transcoder: Address,
}

async fn setup(bonded: u64, claimable: u64, reward_pool: u64) -> Ctx {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryStore::new());
    let delegator = actor(1);
    let transcoder = actor(100);

    let mut record = DelegatorRecord::new(delegator);
    record.delegate = Some(transcoder);
    record.bonded_amount = U256::from(bonded);
    record.pending_stake = U256::from(bonded);
    record.last_claim_round = ROUND - 1;
    store.upsert_delegator(&record).await.unwrap();

    chain.set_delegator(
        delegator,
        DelegatorData {
            bonded_amount: U256::from(bonded),
            delegate_address: transcoder,
            last_claim_round: ROUND - 1,
            ..Default::default()
        },
    );
    chain.set_earnings_pool(
        transcoder,
        ROUND,
        EarningsPool {
            reward_pool: U256::from(reward_pool),
            claimable_stake: U256::from(claimable),
            total_stake: U256::from(claimable),
            ..Default::default()
        },
    );

    let accountant = RoundRewardAccountant::new(chain.clone(), store.clone());
    Ctx { chain, store, accountant, delegator, transcoder }
}

async fn pending_stake(store: &MemoryStore, delegator: Address) -> U256 {
    store.delegator(delegator).await.unwrap().unwrap().pending_stake
}

#[tokio::test]
#[traced_test]
async fn current_formula_credits_pro_rata_share() {
    let ctx = setup(100, 100, 10).await;

    let share = ctx
        .accountant
        .compute_share(ctx.delegator, ctx.transcoder, STREAMFLOW_BLOCK, ROUND)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(share.reward_tokens, U256::from(10));
    assert_eq!(share.pool.transcoder, ctx.transcoder);
    assert_eq!(share.pool.round, ROUND);
    assert_eq!(pending_stake(&ctx.store, ctx.delegator).await, U256::from(110));
    assert_eq!(ctx.store.share(ctx.delegator, ROUND).await.unwrap(), Some(share));
}

#[tokio::test]
async fn replaying_a_round_credits_once() {
    let ctx = setup(100, 100, 10).await;

    for _ in 0..3 {
        let share = ctx
            .accountant
            .compute_share(ctx.delegator, ctx.transcoder, STREAMFLOW_BLOCK + 1, ROUND)
            .await
            .unwrap();
        assert_eq!(share.map(|s| s.reward_tokens), Some(U256::from(10)));
    }

    assert_eq!(pending_stake(&ctx.store, ctx.delegator).await, U256::from(110));
}

#[tokio::test]
async fn concurrent_computations_credit_once() {
    let ctx = setup(100, 100, 10).await;

    let results = join_all((0..8).map(|_| {
        ctx.accountant.compute_share(ctx.delegator, ctx.transcoder, STREAMFLOW_BLOCK, ROUND)
    }))
    .await;

    for result in results {
        assert!(result.unwrap().is_some());
    }
    assert_eq!(pending_stake(&ctx.store, ctx.delegator).await, U256::from(110));
}

#[tokio::test]
async fn legacy_formula_deducts_reward_cut() {
    let ctx = setup(50, 100, 100).await;
    ctx.chain.add_transcoder(
        ctx.transcoder,
        TranscoderData { reward_cut: U256::from(5_000), ..Default::default() },
        U256::from(100),
        true,
    );

    let share = ctx
        .accountant
        .compute_share(ctx.delegator, ctx.transcoder, STREAMFLOW_BLOCK - 1, ROUND)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(share.reward_tokens, U256::from(25));
    assert_eq!(pending_stake(&ctx.store, ctx.delegator).await, U256::from(75));
}

#[tokio::test]
async fn transcoder_earns_its_own_pool() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryStore::new());
    let transcoder = actor(100);

    let mut record = DelegatorRecord::new(transcoder);
    record.delegate = Some(transcoder);
    record.bonded_amount = U256::from(50);
    store.upsert_delegator(&record).await.unwrap();

    chain.set_delegator(
        transcoder,
        DelegatorData { bonded_amount: U256::from(50), delegate_address: transcoder, ..Default::default() },
    );
    chain.set_earnings_pool(
        transcoder,
        ROUND,
        EarningsPool {
            reward_pool: U256::from(10),
            claimable_stake: U256::from(100),
            transcoder_reward_pool: U256::from(7),
            ..Default::default()
        },
    );

    let accountant = RoundRewardAccountant::new(chain, store);
    let share = accountant
        .compute_share(transcoder, transcoder, STREAMFLOW_BLOCK, ROUND)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(share.reward_tokens, U256::from(12));
}

#[tokio::test]
async fn reads_are_pinned_to_the_trigger_block() {
    let ctx = setup(100, 100, 10).await;

    ctx.accountant
        .compute_share(ctx.delegator, ctx.transcoder, UNBONDING_LOCKS_BLOCK - 1, ROUND)
        .await
        .unwrap();
    ctx.accountant
        .compute_share(ctx.delegator, ctx.transcoder, UNBONDING_LOCKS_BLOCK, ROUND + 1)
        .await
        .unwrap();

    assert_eq!(
        ctx.chain.delegator_reads(),
        vec![
            (ctx.delegator, BondingManagerVersion::Genesis, Some(UNBONDING_LOCKS_BLOCK - 1)),
            (ctx.delegator, BondingManagerVersion::UnbondingLocks, Some(UNBONDING_LOCKS_BLOCK)),
        ]
    );
}

#[tokio::test]
async fn claimed_round_is_skipped() {
    let ctx = setup(100, 100, 10).await;
    // A claim landed in the same block as the reward; the indexed record has not seen it.
    ctx.chain.set_delegator_at(
        ctx.delegator,
        STREAMFLOW_BLOCK,
        DelegatorData {
            bonded_amount: U256::from(100),
            delegate_address: ctx.transcoder,
            last_claim_round: ROUND,
            ..Default::default()
        },
    );

    let share = ctx
        .accountant
        .compute_share(ctx.delegator, ctx.transcoder, STREAMFLOW_BLOCK, ROUND)
        .await
        .unwrap();

    assert_eq!(share, None);
    assert_eq!(ctx.store.share(ctx.delegator, ROUND).await.unwrap(), None);
    assert_eq!(pending_stake(&ctx.store, ctx.delegator).await, U256::from(100));
}

#[tokio::test]
async fn other_transcoder_is_a_no_op() {
    let ctx = setup(100, 100, 10).await;

    let share = ctx
        .accountant
        .compute_share(ctx.delegator, actor(200), STREAMFLOW_BLOCK, ROUND)
        .await
        .unwrap();

    assert_eq!(share, None);
    assert!(ctx.chain.delegator_reads().is_empty());
    assert_eq!(pending_stake(&ctx.store, ctx.delegator).await, U256::from(100));
}

#[tokio::test]
async fn unknown_delegator_is_not_found() {
    let ctx = setup(100, 100, 10).await;

    let err = ctx
        .accountant
        .compute_share(actor(2), ctx.transcoder, STREAMFLOW_BLOCK, ROUND)
        .await
        .unwrap_err();
    assert!(matches!(err, BondingError::NotFound(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn read_failures_name_the_call() {
    let ctx = setup(100, 100, 10).await;
    ctx.chain.fail("getTranscoderEarningsPoolForRound", "header not found");

    let err = ctx
        .accountant
        .compute_share(ctx.delegator, ctx.transcoder, STREAMFLOW_BLOCK, ROUND)
        .await
        .unwrap_err();

    assert!(matches!(err, BondingError::ChainRead { call: "getTranscoderEarningsPoolForRound", .. }));
    assert_eq!(err.to_string(), "Error: getTranscoderEarningsPoolForRound: header not found");
    assert_eq!(pending_stake(&ctx.store, ctx.delegator).await, U256::from(100));
}
