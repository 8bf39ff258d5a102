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

//! Composite views of protocol state.
//!
//! Every view is assembled from fresh chain reads. Independent reads of a single view are issued
//! concurrently, and nothing is cached between calls.

use std::{collections::HashSet, sync::Arc};

use alloy::primitives::{Address, U256};
use anyhow::anyhow;
use futures_util::{stream, StreamExt, TryFutureExt, TryStreamExt};

use crate::{
    chain::{ChainReaderObj, DelegatorData},
    errors::BondingError,
    resolver::{resolve_address, AddressResolver},
    rewards::BondingManagerVersion,
    types::{Delegator, DelegatorStatus, RoundInfo, Transcoder, TranscoderStatus, UnbondingLock},
    unbonding::{derive_delegator_status, LockIds},
};

/// Read-only query API over the chain.
#[derive(Clone)]
pub struct DelegatorStateService {
    chain: ChainReaderObj,
    resolver: Arc<dyn AddressResolver + Send + Sync>,
}

fn delegator_status(raw: u8) -> Result<DelegatorStatus, BondingError> {
    DelegatorStatus::from_raw(raw).ok_or_else(|| BondingError::ChainRead {
        call: "delegatorStatus",
        source: anyhow!("unknown delegator status {raw}"),
    })
}

fn transcoder_status(raw: u8) -> Result<TranscoderStatus, BondingError> {
    TranscoderStatus::from_raw(raw).ok_or_else(|| BondingError::ChainRead {
        call: "transcoderStatus",
        source: anyhow!("unknown transcoder status {raw}"),
    })
}

fn non_zero(address: Address) -> Option<Address> {
    (!address.is_zero()).then_some(address)
}

impl DelegatorStateService {
    pub fn new(chain: ChainReaderObj, resolver: Arc<dyn AddressResolver + Send + Sync>) -> Self {
        Self { chain, resolver }
    }

    async fn resolve(&self, address_or_name: &str, kind: &str) -> Result<Address, BondingError> {
        resolve_address(self.resolver.as_ref(), address_or_name)
            .await?
            .ok_or_else(|| BondingError::NotFound(format!("{kind} {address_or_name}")))
    }

    async fn delegator_data(&self, address: Address) -> Result<DelegatorData, BondingError> {
        self.chain
            .get_delegator(address, BondingManagerVersion::Streamflow, None)
            .await
            .map_err(BondingError::chain_read("getDelegator"))
    }

    /// Most recent unbonding lock of a delegator, if it ever unbonded.
    async fn latest_lock(
        &self,
        address: Address,
        next_unbonding_lock_id: u64,
    ) -> Result<Option<UnbondingLock>, BondingError> {
        match LockIds::new(next_unbonding_lock_id).next() {
            Some(id) => self.get_delegator_unbonding_lock(address, id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Composite view of a delegator, looked up by address or name.
    pub async fn get_delegator(&self, address_or_name: &str) -> Result<Delegator, BondingError> {
        let address = self.resolve(address_or_name, "delegator").await?;
        let current_round = self.get_current_round().await?;

        let (data, raw_status, pending_stake, pending_fees, allowance) = tokio::try_join!(
            self.delegator_data(address),
            self.chain
                .delegator_status(address)
                .map_err(BondingError::chain_read("delegatorStatus")),
            self.chain
                .pending_stake(address, current_round)
                .map_err(BondingError::chain_read("pendingStake")),
            self.chain
                .pending_fees(address, current_round)
                .map_err(BondingError::chain_read("pendingFees")),
            self.get_bonding_manager_allowance(address),
        )?;

        let latest_lock = self.latest_lock(address, data.next_unbonding_lock_id).await?;
        let status =
            derive_delegator_status(delegator_status(raw_status)?, latest_lock.as_ref(), current_round);

        Ok(Delegator {
            address,
            allowance,
            bonded_amount: data.bonded_amount,
            delegate_address: non_zero(data.delegate_address),
            delegated_amount: data.delegated_amount,
            fees: data.fees,
            last_claim_round: data.last_claim_round,
            pending_fees,
            pending_stake,
            start_round: data.start_round,
            status,
            withdraw_round: latest_lock.as_ref().map_or(0, |lock| lock.withdraw_round),
            withdraw_amount: latest_lock.as_ref().map_or(U256::ZERO, |lock| lock.amount),
            next_unbonding_lock_id: data.next_unbonding_lock_id,
        })
    }

    /// Status of a delegator, including [DelegatorStatus::Unbonding].
    pub async fn get_delegator_status(
        &self,
        address: Address,
    ) -> Result<DelegatorStatus, BondingError> {
        let (current_round, data, raw_status) = tokio::try_join!(
            self.get_current_round(),
            self.delegator_data(address),
            self.chain
                .delegator_status(address)
                .map_err(BondingError::chain_read("delegatorStatus")),
        )?;
        let latest_lock = self.latest_lock(address, data.next_unbonding_lock_id).await?;
        Ok(derive_delegator_status(delegator_status(raw_status)?, latest_lock.as_ref(), current_round))
    }

    /// Composite view of a transcoder, looked up by address or name.
    pub async fn get_transcoder(&self, address_or_name: &str) -> Result<Transcoder, BondingError> {
        let address = self.resolve(address_or_name, "transcoder").await?;
        self.transcoder(address).await
    }

    async fn transcoder(&self, address: Address) -> Result<Transcoder, BondingError> {
        let (data, raw_status, active, total_stake) = tokio::try_join!(
            self.chain
                .get_transcoder(address, None)
                .map_err(BondingError::chain_read("getTranscoder")),
            self.chain
                .transcoder_status(address)
                .map_err(BondingError::chain_read("transcoderStatus")),
            self.chain
                .is_active_transcoder(address)
                .map_err(BondingError::chain_read("isActiveTranscoder")),
            self.chain
                .transcoder_total_stake(address)
                .map_err(BondingError::chain_read("transcoderTotalStake")),
        )?;

        Ok(Transcoder {
            address,
            status: transcoder_status(raw_status)?,
            active,
            reward_cut: data.reward_cut,
            fee_share: data.fee_share,
            last_reward_round: data.last_reward_round,
            activation_round: data.activation_round,
            deactivation_round: data.deactivation_round,
            last_active_stake_update_round: data.last_active_stake_update_round,
            total_stake,
        })
    }

    /// Every transcoder of the pool, in pool order.
    pub async fn get_transcoders(&self) -> Result<Vec<Transcoder>, BondingError> {
        let mut addresses = Vec::new();
        let mut seen = HashSet::new();

        let mut current = self
            .chain
            .first_transcoder_in_pool()
            .await
            .map_err(BondingError::chain_read("getFirstTranscoderInPool"))?;
        while !current.is_zero() {
            if !seen.insert(current) {
                return Err(BondingError::ChainRead {
                    call: "getNextTranscoderInPool",
                    source: anyhow!("transcoder pool loops back to {current}"),
                });
            }
            addresses.push(current);
            current = self
                .chain
                .next_transcoder_in_pool(current)
                .await
                .map_err(BondingError::chain_read("getNextTranscoderInPool"))?;
        }

        stream::iter(addresses).then(|address| self.transcoder(address)).try_collect().await
    }

    /// Every unbonding lock of a delegator, most recent first.
    pub async fn get_delegator_unbonding_locks(
        &self,
        address: Address,
    ) -> Result<Vec<UnbondingLock>, BondingError> {
        let data = self.delegator_data(address).await?;
        stream::iter(LockIds::new(data.next_unbonding_lock_id))
            .then(|id| self.get_delegator_unbonding_lock(address, id))
            .try_collect()
            .await
    }

    pub async fn get_delegator_unbonding_lock(
        &self,
        address: Address,
        id: u64,
    ) -> Result<UnbondingLock, BondingError> {
        let lock = self
            .chain
            .get_delegator_unbonding_lock(address, id)
            .await
            .map_err(BondingError::chain_read("getDelegatorUnbondingLock"))?;
        Ok(UnbondingLock {
            id,
            delegator: address,
            amount: lock.amount,
            withdraw_round: lock.withdraw_round,
        })
    }

    /// Stake of a delegator including rewards up to `end_round`, the current round by default.
    pub async fn get_pending_stake(
        &self,
        address: Address,
        end_round: Option<u64>,
    ) -> Result<U256, BondingError> {
        let end_round = match end_round {
            Some(round) => round,
            None => self.get_current_round().await?,
        };
        self.chain
            .pending_stake(address, end_round)
            .await
            .map_err(BondingError::chain_read("getPendingStake"))
    }

    /// Fees of a delegator up to `end_round`, the current round by default.
    pub async fn get_pending_fees(
        &self,
        address: Address,
        end_round: Option<u64>,
    ) -> Result<U256, BondingError> {
        let end_round = match end_round {
            Some(round) => round,
            None => self.get_current_round().await?,
        };
        self.chain
            .pending_fees(address, end_round)
            .await
            .map_err(BondingError::chain_read("getPendingFees"))
    }

    pub async fn get_current_round(&self) -> Result<u64, BondingError> {
        self.chain.current_round(None).await.map_err(BondingError::chain_read("currentRound"))
    }

    pub async fn get_current_round_info(&self) -> Result<RoundInfo, BondingError> {
        let (id, initialized, last_initialized_round, length, start_block) = tokio::try_join!(
            self.get_current_round(),
            self.chain
                .current_round_initialized()
                .map_err(BondingError::chain_read("currentRoundInitialized")),
            self.chain
                .last_initialized_round()
                .map_err(BondingError::chain_read("lastInitializedRound")),
            self.chain.round_length().map_err(BondingError::chain_read("roundLength")),
            self.chain
                .current_round_start_block()
                .map_err(BondingError::chain_read("currentRoundStartBlock")),
        )?;
        Ok(RoundInfo { id, initialized, last_initialized_round, length, start_block })
    }

    /// Tokens `address` allows the bonding manager to transfer.
    pub async fn get_bonding_manager_allowance(&self, address: Address) -> Result<U256, BondingError> {
        self.chain
            .bonding_manager_allowance(address)
            .await
            .map_err(BondingError::chain_read("getBondingManagerAllowance"))
    }
}
