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

//! Application of bonding manager events to indexed records.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use bonding_ledger::{
    BondingError, BondingEvent, BondingStoreObj, ChainReaderObj, DelegatorLocks, DelegatorRecord,
    InvalidState, RoundRewardAccountant, TimestampedBondingEvent, UnbondingLock,
    UnbondingLockLedger,
};
use futures_util::{stream, StreamExt, TryStreamExt};

/// Number of delegators whose shares are computed concurrently for one reward event.
const REWARD_CONCURRENCY: usize = 8;

/// Applies events in the order they were emitted.
pub struct BondingEventProcessor {
    chain: ChainReaderObj,
    store: BondingStoreObj,
    locks: Arc<DelegatorLocks>,
    accountant: RoundRewardAccountant,
    ledger: UnbondingLockLedger,
}

impl BondingEventProcessor {
    pub fn new(chain: ChainReaderObj, store: BondingStoreObj) -> Self {
        let locks = Arc::new(DelegatorLocks::default());
        let accountant =
            RoundRewardAccountant::new(chain.clone(), store.clone()).with_locks(locks.clone());
        let ledger = UnbondingLockLedger::new(store.clone()).with_locks(locks.clone());
        Self { chain, store, locks, accountant, ledger }
    }

    async fn round_at(&self, block: u64) -> Result<u64> {
        self.chain
            .current_round(Some(block))
            .await
            .with_context(|| format!("Failed to get current round at block {block}"))
    }

    async fn record_or_new(&self, delegator: Address) -> Result<DelegatorRecord> {
        Ok(self.store.delegator(delegator).await?.unwrap_or_else(|| DelegatorRecord::new(delegator)))
    }

    /// Apply `event` unless the store already recorded it as applied. Events must be passed in
    /// chain order.
    pub async fn process(&self, event: &TimestampedBondingEvent) -> Result<()> {
        let position = event.position();
        if let Some(last) = self.store.last_processed_event().await? {
            if position <= last {
                tracing::debug!(
                    block = position.block_number,
                    log_index = position.log_index,
                    "Event already applied, skipping"
                );
                return Ok(());
            }
        }

        self.apply(event).await?;
        self.store.set_last_processed_event(position).await?;
        Ok(())
    }

    // Every handler tolerates being applied twice, which happens when the process stops between
    // applying an event and saving its position.
    async fn apply(&self, event: &TimestampedBondingEvent) -> Result<()> {
        let block = event.block_number;
        match &event.event {
            BondingEvent::Bond { new_delegate, delegator, bonded_amount, .. } => {
                self.on_bond(block, *delegator, *new_delegate, *bonded_amount).await
            }
            BondingEvent::Unbond { delegator, unbonding_lock_id, amount, withdraw_round, .. } => {
                self.on_unbond(block, *delegator, *unbonding_lock_id, *amount, *withdraw_round).await
            }
            BondingEvent::Rebond { delegate, delegator, unbonding_lock_id, .. } => {
                self.on_rebond(block, *delegator, *delegate, *unbonding_lock_id).await
            }
            BondingEvent::WithdrawStake { delegator, unbonding_lock_id, .. } => {
                let round = self.round_at(block).await?;
                self.ledger.record_withdrawal(*delegator, *unbonding_lock_id, round).await?;
                Ok(())
            }
            BondingEvent::Reward { transcoder, .. } => self.on_reward(block, *transcoder).await,
        }
    }

    // Bonding claims every pending round, so the pending stake restarts from the bonded amount.
    async fn on_bond(
        &self,
        block: u64,
        delegator: Address,
        new_delegate: Address,
        bonded_amount: U256,
    ) -> Result<()> {
        let round = self.round_at(block).await?;
        let _guard = self.locks.lock(delegator).await;

        let mut record = self.record_or_new(delegator).await?;
        if record.delegate != Some(new_delegate) {
            record.start_round = round + 1;
        }
        record.delegate = Some(new_delegate);
        record.bonded_amount = bonded_amount;
        record.pending_stake = bonded_amount;
        record.last_claim_round = round;
        self.store.upsert_delegator(&record).await?;

        tracing::debug!(%delegator, %new_delegate, %bonded_amount, round, "Processed bond");
        Ok(())
    }

    // Unbonding claims pending rewards before the amount leaves the bonded stake.
    async fn on_unbond(
        &self,
        block: u64,
        delegator: Address,
        unbonding_lock_id: u64,
        amount: U256,
        withdraw_round: u64,
    ) -> Result<()> {
        let round = self.round_at(block).await?;
        let _guard = self.locks.lock(delegator).await;

        let mut record = self.record_or_new(delegator).await?;
        if unbonding_lock_id < record.next_unbonding_lock_id {
            tracing::debug!(%delegator, unbonding_lock_id, "Unbonding lock already indexed");
            return Ok(());
        }
        if unbonding_lock_id > record.next_unbonding_lock_id {
            tracing::warn!(
                %delegator,
                indexed = record.next_unbonding_lock_id,
                emitted = unbonding_lock_id,
                "Missed unbonding locks, skipping ahead"
            );
        }

        record.claim_pending();
        record.bonded_amount = record.bonded_amount.saturating_sub(amount);
        record.pending_stake = record.bonded_amount;
        record.last_claim_round = round;
        record.next_unbonding_lock_id = unbonding_lock_id.saturating_add(1);
        if record.bonded_amount.is_zero() {
            record.delegate = None;
            record.start_round = 0;
        }

        let lock = UnbondingLock { id: unbonding_lock_id, delegator, amount, withdraw_round };
        self.store.put_unbonding_lock(&lock, &record).await?;

        tracing::debug!(lock = %lock.key(), %amount, withdraw_round, "Processed unbond");
        Ok(())
    }

    async fn on_rebond(
        &self,
        block: u64,
        delegator: Address,
        delegate: Address,
        unbonding_lock_id: u64,
    ) -> Result<()> {
        let round = self.round_at(block).await?;
        {
            let _guard = self.locks.lock(delegator).await;
            let mut record = self.record_or_new(delegator).await?;
            if record.delegate != Some(delegate) {
                record.start_round = round + 1;
            }
            record.last_claim_round = round;
            self.store.upsert_delegator(&record).await?;
        }

        // The ledger claims pending rewards and moves the lock back into the bonded stake.
        match self.ledger.rebond(delegator, unbonding_lock_id, delegate).await {
            Ok(lock) => {
                tracing::debug!(lock = %lock.key(), %delegate, "Processed rebond");
                Ok(())
            }
            Err(BondingError::InvalidState(InvalidState::NothingToWithdraw)) => {
                tracing::debug!(%delegator, unbonding_lock_id, "Unbonding lock already rebonded");
                Ok(())
            }
            Err(BondingError::NotFound(what)) => {
                tracing::warn!(%delegator, %delegate, "Rebond of an unindexed lock: {what} not found");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn on_reward(&self, block: u64, transcoder: Address) -> Result<()> {
        let round = self.round_at(block).await?;
        let delegators = self.store.delegators_of(transcoder).await?;

        let shares: Vec<_> = stream::iter(delegators)
            .map(|delegator| self.accountant.compute_share(delegator, transcoder, block, round))
            .buffer_unordered(REWARD_CONCURRENCY)
            .try_collect()
            .await
            .with_context(|| format!("Failed to compute shares for {transcoder} in round {round}"))?;

        let credited = shares.iter().flatten().count();
        tracing::info!(%transcoder, round, block, credited, "Processed reward");
        Ok(())
    }
}
