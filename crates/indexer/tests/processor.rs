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

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use alloy::primitives::{Address, U256};
use bonding_indexer::bonding::BondingEventProcessor;
use bonding_ledger::{
    BondingEvent, BondingStore, DelegatorData, EarningsPool, EventPosition, MemoryStore,
    TimestampedBondingEvent, STREAMFLOW_BLOCK,
};
use bonding_test_utils::{actor, MockChain};
use tracing_test::traced_test;

const BLOCK: u64 = STREAMFLOW_BLOCK + 1_000;

struct Ctx {
    chain: Arc<MockChain>,
    store: Arc<MemoryStore>,
    processor: BondingEventProcessor,
    log_index: AtomicU64,
}

impl Ctx {
    fn new() -> Self {
        let chain = Arc::new(MockChain::new());
        let store = Arc::new(MemoryStore::new());
        let processor = BondingEventProcessor::new(chain.clone(), store.clone());
        Self { chain, store, processor, log_index: Default::default() }
    }

    async fn apply(&self, block_number: u64, event: BondingEvent) -> anyhow::Result<()> {
        let log_index = self.log_index.fetch_add(1, Ordering::Relaxed);
        self.processor.process(&TimestampedBondingEvent { block_number, log_index, event }).await
    }

    async fn bond(
        &self,
        block: u64,
        delegator: Address,
        to: Address,
        bonded: u64,
    ) -> anyhow::Result<()> {
        self.apply(
            block,
            BondingEvent::Bond {
                new_delegate: to,
                old_delegate: Address::ZERO,
                delegator,
                additional_amount: U256::from(bonded),
                bonded_amount: U256::from(bonded),
            },
        )
        .await
    }
}

fn transcoder() -> Address {
    actor(100)
}

fn unbond(delegator: Address, unbonding_lock_id: u64, amount: u64) -> BondingEvent {
    BondingEvent::Unbond {
        delegate: transcoder(),
        delegator,
        unbonding_lock_id,
        amount: U256::from(amount),
        withdraw_round: 12,
    }
}

fn rebond(delegator: Address, unbonding_lock_id: u64, amount: u64) -> BondingEvent {
    BondingEvent::Rebond {
        delegate: transcoder(),
        delegator,
        unbonding_lock_id,
        amount: U256::from(amount),
    }
}

fn withdraw(delegator: Address, unbonding_lock_id: u64, amount: u64) -> BondingEvent {
    BondingEvent::WithdrawStake {
        delegator,
        unbonding_lock_id,
        amount: U256::from(amount),
        withdraw_round: 12,
    }
}

/// Script a reward of `reward_pool` over `claimable_stake` in `round` for a delegator that last
/// claimed in the round before.
fn script_reward(
    ctx: &Ctx,
    delegator: Address,
    bonded: u64,
    round: u64,
    reward_pool: u64,
    claimable_stake: u64,
) {
    ctx.chain.set_delegator(
        delegator,
        DelegatorData {
            bonded_amount: U256::from(bonded),
            delegate_address: transcoder(),
            last_claim_round: round - 1,
            ..Default::default()
        },
    );
    ctx.chain.set_earnings_pool(
        transcoder(),
        round,
        EarningsPool {
            reward_pool: U256::from(reward_pool),
            claimable_stake: U256::from(claimable_stake),
            total_stake: U256::from(claimable_stake),
            ..Default::default()
        },
    );
}

fn reward() -> BondingEvent {
    BondingEvent::Reward { transcoder: transcoder(), amount: U256::from(10) }
}

#[tokio::test]
#[traced_test]
async fn reward_credits_every_delegator_of_the_transcoder() -> anyhow::Result<()> {
    let ctx = Ctx::new();
    ctx.chain.set_round_from_block(BLOCK, 5);
    ctx.chain.set_round_from_block(BLOCK + 100, 6);

    ctx.bond(BLOCK, actor(1), transcoder(), 100).await?;
    ctx.bond(BLOCK, actor(2), transcoder(), 300).await?;
    ctx.bond(BLOCK, actor(3), actor(101), 50).await?;

    for (n, bonded) in [(1, 100u64), (2, 300)] {
        ctx.chain.set_delegator(
            actor(n),
            DelegatorData {
                bonded_amount: U256::from(bonded),
                delegate_address: transcoder(),
                last_claim_round: 5,
                ..Default::default()
            },
        );
    }
    ctx.chain.set_earnings_pool(
        transcoder(),
        6,
        EarningsPool {
            reward_pool: U256::from(40),
            claimable_stake: U256::from(400),
            total_stake: U256::from(400),
            ..Default::default()
        },
    );

    let reward = BondingEvent::Reward { transcoder: transcoder(), amount: U256::from(40) };
    ctx.apply(BLOCK + 100, reward.clone()).await?;

    let alice = ctx.store.delegator(actor(1)).await?.unwrap();
    assert_eq!(alice.start_round, 6);
    assert_eq!(alice.pending_stake, U256::from(110));
    assert_eq!(ctx.store.delegator(actor(2)).await?.unwrap().pending_stake, U256::from(330));
    assert_eq!(ctx.store.delegator(actor(3)).await?.unwrap().pending_stake, U256::from(50));
    assert_eq!(ctx.store.share(actor(2), 6).await?.map(|s| s.reward_tokens), Some(U256::from(30)));

    // Replayed logs do not credit twice.
    ctx.apply(BLOCK + 100, reward).await?;
    assert_eq!(ctx.store.delegator(actor(1)).await?.unwrap().pending_stake, U256::from(110));
    assert!(logs_contain("Processed reward"));
    Ok(())
}

#[tokio::test]
async fn unbond_withdraw_and_rebond() -> anyhow::Result<()> {
    let ctx = Ctx::new();
    ctx.chain.set_round_from_block(BLOCK, 5);
    ctx.chain.set_round_from_block(BLOCK + 500, 12);

    ctx.bond(BLOCK, actor(1), transcoder(), 100).await?;
    for (id, amount) in [(0u64, 40u64), (1, 20)] {
        ctx.apply(
            BLOCK + 1,
            BondingEvent::Unbond {
                delegate: transcoder(),
                delegator: actor(1),
                unbonding_lock_id: id,
                amount: U256::from(amount),
                withdraw_round: 12,
            },
        )
        .await?;
    }

    let record = ctx.store.delegator(actor(1)).await?.unwrap();
    assert_eq!(record.bonded_amount, U256::from(40));
    assert_eq!(record.pending_stake, U256::from(40));
    assert_eq!(record.next_unbonding_lock_id, 2);
    assert_eq!(ctx.store.unbonding_lock(actor(1), 1).await?.unwrap().amount, U256::from(20));

    ctx.apply(
        BLOCK + 500,
        BondingEvent::WithdrawStake {
            delegator: actor(1),
            unbonding_lock_id: 0,
            amount: U256::from(40),
            withdraw_round: 12,
        },
    )
    .await?;
    assert_eq!(ctx.store.unbonding_lock(actor(1), 0).await?.unwrap().amount, U256::ZERO);

    ctx.apply(
        BLOCK + 500,
        BondingEvent::Rebond {
            delegate: transcoder(),
            delegator: actor(1),
            unbonding_lock_id: 1,
            amount: U256::from(20),
        },
    )
    .await?;
    let record = ctx.store.delegator(actor(1)).await?.unwrap();
    assert_eq!(record.bonded_amount, U256::from(60));
    assert_eq!(record.delegate, Some(transcoder()));
    assert_eq!(record.last_claim_round, 12);
    assert_eq!(ctx.store.unbonding_lock(actor(1), 1).await?.unwrap().amount, U256::ZERO);
    Ok(())
}

#[tokio::test]
async fn full_unbond_clears_the_delegate() -> anyhow::Result<()> {
    let ctx = Ctx::new();
    ctx.chain.set_round_from_block(BLOCK, 5);

    ctx.bond(BLOCK, actor(1), transcoder(), 100).await?;
    ctx.apply(
        BLOCK + 1,
        BondingEvent::Unbond {
            delegate: transcoder(),
            delegator: actor(1),
            unbonding_lock_id: 0,
            amount: U256::from(100),
            withdraw_round: 12,
        },
    )
    .await?;

    let record = ctx.store.delegator(actor(1)).await?.unwrap();
    assert_eq!(record.delegate, None);
    assert!(ctx.store.delegators_of(transcoder()).await?.is_empty());
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn mined_withdrawals_are_recorded_before_the_indexed_round() -> anyhow::Result<()> {
    let ctx = Ctx::new();
    ctx.chain.set_round_from_block(BLOCK, 5);

    ctx.bond(BLOCK, actor(1), transcoder(), 100).await?;
    ctx.apply(BLOCK + 1, unbond(actor(1), 0, 10)).await?;
    ctx.apply(BLOCK + 2, withdraw(actor(1), 0, 10)).await?;

    assert_eq!(ctx.store.unbonding_lock(actor(1), 0).await?.unwrap().amount, U256::ZERO);
    assert!(logs_contain("Recording mined withdrawal"));

    // A lock the indexer never saw is skipped instead of failing the run.
    ctx.apply(BLOCK + 2, withdraw(actor(1), 5, 10)).await?;
    assert_eq!(ctx.store.unbonding_lock(actor(1), 5).await?, None);
    Ok(())
}

#[tokio::test]
async fn unbond_claims_credited_rewards() -> anyhow::Result<()> {
    let ctx = Ctx::new();
    ctx.chain.set_round_from_block(BLOCK, 5);
    ctx.chain.set_round_from_block(BLOCK + 100, 6);

    ctx.bond(BLOCK, actor(1), transcoder(), 100).await?;
    script_reward(&ctx, actor(1), 100, 6, 10, 100);
    ctx.apply(BLOCK + 100, reward()).await?;
    assert_eq!(ctx.store.delegator(actor(1)).await?.unwrap().pending_stake, U256::from(110));

    ctx.apply(BLOCK + 101, unbond(actor(1), 0, 40)).await?;
    let record = ctx.store.delegator(actor(1)).await?.unwrap();
    assert_eq!(record.bonded_amount, U256::from(70));
    assert_eq!(record.pending_stake, U256::from(70));
    assert_eq!(record.last_claim_round, 6);
    Ok(())
}

#[tokio::test]
async fn rebond_claims_credited_rewards() -> anyhow::Result<()> {
    let ctx = Ctx::new();
    ctx.chain.set_round_from_block(BLOCK, 5);
    ctx.chain.set_round_from_block(BLOCK + 100, 6);

    ctx.bond(BLOCK, actor(1), transcoder(), 100).await?;
    ctx.apply(BLOCK + 1, unbond(actor(1), 0, 40)).await?;

    script_reward(&ctx, actor(1), 60, 6, 6, 60);
    ctx.apply(BLOCK + 100, reward()).await?;
    assert_eq!(ctx.store.delegator(actor(1)).await?.unwrap().pending_stake, U256::from(66));

    ctx.apply(BLOCK + 101, rebond(actor(1), 0, 40)).await?;
    let record = ctx.store.delegator(actor(1)).await?.unwrap();
    assert_eq!(record.bonded_amount, U256::from(106));
    assert_eq!(record.pending_stake, U256::from(106));
    assert_eq!(record.last_claim_round, 6);
    Ok(())
}

#[tokio::test]
async fn lock_events_applied_twice_take_effect_once() -> anyhow::Result<()> {
    let ctx = Ctx::new();
    ctx.chain.set_round_from_block(BLOCK, 5);
    ctx.chain.set_round_from_block(BLOCK + 500, 12);

    ctx.bond(BLOCK, actor(1), transcoder(), 100).await?;
    for _ in 0..2 {
        ctx.apply(BLOCK + 1, unbond(actor(1), 0, 40)).await?;
    }
    let record = ctx.store.delegator(actor(1)).await?.unwrap();
    assert_eq!(record.bonded_amount, U256::from(60));
    assert_eq!(record.next_unbonding_lock_id, 1);
    assert_eq!(ctx.store.unbonding_lock(actor(1), 0).await?.unwrap().amount, U256::from(40));

    for _ in 0..2 {
        ctx.apply(BLOCK + 500, withdraw(actor(1), 0, 40)).await?;
    }
    assert_eq!(ctx.store.unbonding_lock(actor(1), 0).await?.unwrap().amount, U256::ZERO);

    ctx.apply(BLOCK + 501, unbond(actor(1), 1, 20)).await?;
    for _ in 0..2 {
        ctx.apply(BLOCK + 502, rebond(actor(1), 1, 20)).await?;
    }
    let record = ctx.store.delegator(actor(1)).await?.unwrap();
    assert_eq!(record.bonded_amount, U256::from(60));
    assert_eq!(record.next_unbonding_lock_id, 2);
    assert_eq!(ctx.store.unbonding_lock(actor(1), 1).await?.unwrap().amount, U256::ZERO);
    Ok(())
}

#[tokio::test]
async fn unbond_stores_the_emitted_lock_id() -> anyhow::Result<()> {
    let ctx = Ctx::new();
    ctx.chain.set_round_from_block(BLOCK, 5);

    ctx.bond(BLOCK, actor(1), transcoder(), 100).await?;
    ctx.apply(BLOCK + 1, unbond(actor(1), 3, 10)).await?;

    assert_eq!(ctx.store.unbonding_lock(actor(1), 3).await?.unwrap().amount, U256::from(10));
    assert_eq!(ctx.store.delegator(actor(1)).await?.unwrap().next_unbonding_lock_id, 4);
    Ok(())
}

#[tokio::test]
async fn events_at_or_before_the_saved_position_are_skipped() -> anyhow::Result<()> {
    let ctx = Ctx::new();
    ctx.chain.set_round_from_block(BLOCK, 5);

    let event = |log_index, bonded: u64| TimestampedBondingEvent {
        block_number: BLOCK,
        log_index,
        event: BondingEvent::Bond {
            new_delegate: transcoder(),
            old_delegate: Address::ZERO,
            delegator: actor(1),
            additional_amount: U256::from(bonded),
            bonded_amount: U256::from(bonded),
        },
    };

    ctx.processor.process(&event(4, 100)).await?;
    let position = EventPosition { block_number: BLOCK, log_index: 4 };
    assert_eq!(ctx.store.last_processed_event().await?, Some(position));

    ctx.processor.process(&event(4, 500)).await?;
    ctx.processor.process(&event(3, 500)).await?;
    assert_eq!(ctx.store.delegator(actor(1)).await?.unwrap().bonded_amount, U256::from(100));
    assert_eq!(ctx.store.last_processed_event().await?, Some(position));

    ctx.processor.process(&event(5, 150)).await?;
    assert_eq!(ctx.store.delegator(actor(1)).await?.unwrap().bonded_amount, U256::from(150));
    Ok(())
}
