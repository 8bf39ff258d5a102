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

//! Per-round reward share accounting.
//!
//! When a transcoder calls `reward`, each of its delegators earns a share of the round's reward
//! pool. The formula changed at [STREAMFLOW_BLOCK]; the version in force is selected from the
//! height of the block that emitted the event, so replaying old events reproduces old results.

use std::{collections::HashMap, sync::Arc};

use alloy::primitives::{Address, U256};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    chain::ChainReaderObj,
    errors::BondingError,
    numeric::{perc_of, perc_of_with_denom},
    store::BondingStoreObj,
    types::{EarningsPoolKey, Share},
    STREAMFLOW_BLOCK, UNBONDING_LOCKS_BLOCK,
};

/// Deployed revision of the bonding manager at a given block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondingManagerVersion {
    /// Before unbonding locks. `lastClaimRound` is the seventh field of the delegator getter.
    Genesis,
    /// Unbonding locks, legacy reward formula.
    UnbondingLocks,
    /// Current reward formula with a separately tracked transcoder reward pool.
    Streamflow,
}

impl BondingManagerVersion {
    pub const fn for_block(block_number: u64) -> Self {
        if block_number < UNBONDING_LOCKS_BLOCK {
            Self::Genesis
        } else if block_number < STREAMFLOW_BLOCK {
            Self::UnbondingLocks
        } else {
            Self::Streamflow
        }
    }

    pub const fn formula(self) -> RewardFormula {
        match self {
            Self::Genesis | Self::UnbondingLocks => RewardFormula::Legacy,
            Self::Streamflow => RewardFormula::Current,
        }
    }
}

/// Everything a reward formula needs to compute a delegator's share.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareInputs {
    pub reward_pool: U256,
    pub bonded_amount: U256,
    pub claimable_stake: U256,
    /// Transcoder reward cut in points of [crate::numeric::PERC_DIVISOR]. Legacy formula only.
    pub reward_cut: U256,
    /// Rewards set aside for the transcoder by the pool. Current formula only.
    pub transcoder_reward_pool: U256,
    /// Whether the delegator is the transcoder itself.
    pub is_transcoder: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardFormula {
    Legacy,
    Current,
}

impl RewardFormula {
    pub const fn for_block(block_number: u64) -> Self {
        BondingManagerVersion::for_block(block_number).formula()
    }

    /// Reward tokens credited to the delegator.
    pub fn reward_tokens(self, inputs: &ShareInputs) -> Result<U256, BondingError> {
        match self {
            Self::Legacy => legacy_rewards(inputs),
            Self::Current => current_rewards(inputs),
        }
    }
}

fn current_rewards(inputs: &ShareInputs) -> Result<U256, BondingError> {
    let delegator_rewards = if inputs.claimable_stake > U256::ZERO {
        perc_of_with_denom(inputs.reward_pool, inputs.bonded_amount, inputs.claimable_stake)?
    } else {
        U256::ZERO
    };

    if inputs.is_transcoder {
        delegator_rewards.checked_add(inputs.transcoder_reward_pool).ok_or(BondingError::Overflow)
    } else {
        Ok(delegator_rewards)
    }
}

fn legacy_rewards(inputs: &ShareInputs) -> Result<U256, BondingError> {
    let mut transcoder_rewards = U256::ZERO;
    let mut delegator_rewards = U256::ZERO;
    if inputs.claimable_stake > U256::ZERO {
        transcoder_rewards = perc_of(inputs.reward_pool, inputs.reward_cut)?;
        delegator_rewards = perc_of_with_denom(
            inputs.reward_pool.saturating_sub(transcoder_rewards),
            inputs.bonded_amount,
            inputs.claimable_stake,
        )?;
    }

    if inputs.is_transcoder {
        delegator_rewards.checked_add(transcoder_rewards).ok_or(BondingError::Overflow)
    } else {
        Ok(delegator_rewards)
    }
}

/// Async mutual exclusion scoped to a single delegator.
#[derive(Default)]
pub struct DelegatorLocks {
    locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl DelegatorLocks {
    pub async fn lock(&self, delegator: Address) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().await.entry(delegator).or_default().clone();
        lock.lock_owned().await
    }
}

/// Computes and records reward shares.
pub struct RoundRewardAccountant {
    chain: ChainReaderObj,
    store: BondingStoreObj,
    locks: Arc<DelegatorLocks>,
}

impl RoundRewardAccountant {
    pub fn new(chain: ChainReaderObj, store: BondingStoreObj) -> Self {
        Self { chain, store, locks: Arc::default() }
    }

    /// Share the accountant with other writers of the same store so every mutation of a
    /// delegator is serialized.
    pub fn with_locks(mut self, locks: Arc<DelegatorLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Compute the share `delegator` earned from `transcoder` calling reward in `trigger_round`,
    /// at block `trigger_block`.
    ///
    /// Returns `None` without touching any record when the delegator is not bonded to the
    /// transcoder, or when its claim round on chain already covers the round. Recomputing a round
    /// overwrites its share but credits `pending_stake` only once.
    pub async fn compute_share(
        &self,
        delegator: Address,
        transcoder: Address,
        trigger_block: u64,
        trigger_round: u64,
    ) -> Result<Option<Share>, BondingError> {
        let _guard = self.locks.lock(delegator).await;

        let mut record = self
            .store
            .delegator(delegator)
            .await
            .map_err(BondingError::Store)?
            .ok_or_else(|| BondingError::delegator_not_found(delegator))?;

        if record.delegate != Some(transcoder) {
            tracing::trace!(%delegator, %transcoder, "Delegator is not bonded to transcoder");
            return Ok(None);
        }

        let version = BondingManagerVersion::for_block(trigger_block);

        // The claim round is read from the chain: the indexed one is stale when the reward and
        // a claim land in the same block.
        let delegator_data = self
            .chain
            .get_delegator(delegator, version, Some(trigger_block))
            .await
            .map_err(BondingError::chain_read("getDelegator"))?;

        if trigger_round <= delegator_data.last_claim_round {
            tracing::debug!(
                %delegator,
                round = trigger_round,
                last_claim_round = delegator_data.last_claim_round,
                "Round already claimed, skipping share"
            );
            return Ok(None);
        }

        let pool = self
            .chain
            .get_transcoder_earnings_pool_for_round(
                transcoder,
                trigger_round,
                version,
                Some(trigger_block),
            )
            .await
            .map_err(BondingError::chain_read("getTranscoderEarningsPoolForRound"))?;

        let formula = version.formula();
        let reward_cut = match formula {
            RewardFormula::Legacy => {
                self.chain
                    .get_transcoder(transcoder, Some(trigger_block))
                    .await
                    .map_err(BondingError::chain_read("getTranscoder"))?
                    .reward_cut
            }
            RewardFormula::Current => U256::ZERO,
        };

        let inputs = ShareInputs {
            reward_pool: pool.reward_pool,
            bonded_amount: delegator_data.bonded_amount,
            claimable_stake: pool.claimable_stake,
            reward_cut,
            transcoder_reward_pool: pool.transcoder_reward_pool,
            is_transcoder: delegator == transcoder,
        };
        let reward_tokens = formula.reward_tokens(&inputs)?;

        let share = Share {
            delegator,
            round: trigger_round,
            pool: EarningsPoolKey { transcoder, round: trigger_round },
            reward_tokens,
        };

        let already_applied =
            self.store.share(delegator, trigger_round).await.map_err(BondingError::Store)?.is_some();
        if already_applied {
            tracing::debug!(share = %share.key(), "Share already applied, overwriting without crediting");
            self.store.put_share(&share).await.map_err(BondingError::Store)?;
            return Ok(Some(share));
        }

        record.pending_stake =
            record.pending_stake.checked_add(reward_tokens).ok_or(BondingError::Overflow)?;
        self.store.apply_share(&share, &record).await.map_err(BondingError::Store)?;

        tracing::debug!(
            share = %share.key(),
            pool = %share.pool,
            ?formula,
            %reward_tokens,
            "Applied reward share"
        );
        Ok(Some(share))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    #[test]
    fn version_boundaries() {
        assert_eq!(
            BondingManagerVersion::for_block(UNBONDING_LOCKS_BLOCK - 1),
            BondingManagerVersion::Genesis
        );
        assert_eq!(
            BondingManagerVersion::for_block(UNBONDING_LOCKS_BLOCK),
            BondingManagerVersion::UnbondingLocks
        );
        assert_eq!(RewardFormula::for_block(STREAMFLOW_BLOCK - 1), RewardFormula::Legacy);
        assert_eq!(RewardFormula::for_block(STREAMFLOW_BLOCK), RewardFormula::Current);
    }

    #[test]
    fn current_formula_is_pro_rata() {
        let inputs = ShareInputs {
            reward_pool: u(10),
            bonded_amount: u(100),
            claimable_stake: u(100),
            ..Default::default()
        };
        assert_eq!(RewardFormula::Current.reward_tokens(&inputs).unwrap(), u(10));
    }

    #[test]
    fn current_formula_truncates() {
        for (pool, bonded, claimable) in [(10u64, 1u64, 3u64), (7, 2, 3), (1_000_003, 17, 999)] {
            let inputs = ShareInputs {
                reward_pool: u(pool),
                bonded_amount: u(bonded),
                claimable_stake: u(claimable),
                ..Default::default()
            };
            assert_eq!(
                RewardFormula::Current.reward_tokens(&inputs).unwrap(),
                u(pool * bonded / claimable)
            );
        }
    }

    #[test]
    fn current_formula_adds_transcoder_pool() {
        let inputs = ShareInputs {
            reward_pool: u(10),
            bonded_amount: u(50),
            claimable_stake: u(100),
            transcoder_reward_pool: u(7),
            is_transcoder: true,
            ..Default::default()
        };
        assert_eq!(RewardFormula::Current.reward_tokens(&inputs).unwrap(), u(12));
    }

    #[test]
    fn legacy_formula_deducts_reward_cut() {
        let inputs = ShareInputs {
            reward_pool: u(100),
            bonded_amount: u(50),
            claimable_stake: u(100),
            reward_cut: u(5_000),
            ..Default::default()
        };
        assert_eq!(RewardFormula::Legacy.reward_tokens(&inputs).unwrap(), u(25));

        let transcoder = ShareInputs { is_transcoder: true, ..inputs };
        assert_eq!(RewardFormula::Legacy.reward_tokens(&transcoder).unwrap(), u(75));
    }

    #[test]
    fn empty_pool_stake_earns_nothing() {
        let inputs = ShareInputs {
            reward_pool: u(100),
            bonded_amount: u(50),
            reward_cut: u(5_000),
            transcoder_reward_pool: u(3),
            is_transcoder: true,
            ..Default::default()
        };
        assert_eq!(RewardFormula::Legacy.reward_tokens(&inputs).unwrap(), U256::ZERO);
        assert_eq!(RewardFormula::Current.reward_tokens(&inputs).unwrap(), u(3));
    }
}
