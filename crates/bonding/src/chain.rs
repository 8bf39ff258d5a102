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

//! Chain read and write collaborators.
//!
//! The engine only talks to the chain through [ChainReader] and [ChainWriter]. [ProviderChain]
//! implements both on top of an alloy [Provider].

use std::sync::Arc;

use alloy::{
    eips::BlockId,
    network::TransactionBuilder,
    primitives::{Address, TxHash, U256},
    providers::Provider,
    rpc::types::{TransactionReceipt, TransactionRequest},
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    contracts::{IBondingManager, IBondingManagerGenesis, ILivepeerToken, IRoundsManager},
    deployments::Deployment,
    rewards::BondingManagerVersion,
    submit::{BondingCall, TxOptions},
    types::EarningsPool,
};

pub type ChainReaderObj = Arc<dyn ChainReader + Send + Sync>;
pub type ChainWriterObj = Arc<dyn ChainWriter + Send + Sync>;

/// Delegator fields as stored by the bonding manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegatorData {
    pub bonded_amount: U256,
    pub fees: U256,
    /// Zero when the delegator has never bonded.
    pub delegate_address: Address,
    pub delegated_amount: U256,
    pub start_round: u64,
    pub last_claim_round: u64,
    pub next_unbonding_lock_id: u64,
}

/// Transcoder fields as stored by the bonding manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscoderData {
    pub last_reward_round: u64,
    pub reward_cut: U256,
    pub fee_share: U256,
    pub last_active_stake_update_round: u64,
    pub activation_round: u64,
    pub deactivation_round: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnbondingLockData {
    pub amount: U256,
    pub withdraw_round: u64,
}

/// The parts of a transaction receipt the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    /// `true` when the transaction executed successfully.
    pub status: bool,
}

impl From<TransactionReceipt> for Receipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            status: receipt.status(),
        }
    }
}

/// Read-only access to protocol state. Every call is idempotent and side-effect free.
///
/// Calls that take a `block` read the state as of that block, or the latest state when `None`.
#[async_trait]
pub trait ChainReader {
    async fn current_round(&self, block: Option<u64>) -> Result<u64>;

    async fn current_round_initialized(&self) -> Result<bool>;

    async fn current_round_start_block(&self) -> Result<u64>;

    async fn last_initialized_round(&self) -> Result<u64>;

    async fn round_length(&self) -> Result<u64>;

    /// Read a delegator, decoding the getter with the storage layout of `version`.
    async fn get_delegator(
        &self,
        delegator: Address,
        version: BondingManagerVersion,
        block: Option<u64>,
    ) -> Result<DelegatorData>;

    /// Raw status enum of a delegator.
    async fn delegator_status(&self, delegator: Address) -> Result<u8>;

    async fn get_delegator_unbonding_lock(
        &self,
        delegator: Address,
        unbonding_lock_id: u64,
    ) -> Result<UnbondingLockData>;

    async fn pending_stake(&self, delegator: Address, end_round: u64) -> Result<U256>;

    async fn pending_fees(&self, delegator: Address, end_round: u64) -> Result<U256>;

    async fn get_transcoder(&self, transcoder: Address, block: Option<u64>)
        -> Result<TranscoderData>;

    async fn get_transcoder_earnings_pool_for_round(
        &self,
        transcoder: Address,
        round: u64,
        version: BondingManagerVersion,
        block: Option<u64>,
    ) -> Result<EarningsPool>;

    /// Raw status enum of a transcoder.
    async fn transcoder_status(&self, transcoder: Address) -> Result<u8>;

    async fn transcoder_total_stake(&self, transcoder: Address) -> Result<U256>;

    async fn is_active_transcoder(&self, transcoder: Address) -> Result<bool>;

    /// Head of the transcoder pool, or the zero address when the pool is empty.
    async fn first_transcoder_in_pool(&self) -> Result<Address>;

    /// Successor of `transcoder` in the pool, or the zero address at the tail.
    async fn next_transcoder_in_pool(&self, transcoder: Address) -> Result<Address>;

    /// Token allowance `owner` granted to the bonding manager.
    async fn bonding_manager_allowance(&self, owner: Address) -> Result<U256>;
}

/// State-changing access to the protocol.
#[async_trait]
pub trait ChainWriter {
    /// Broadcast `call` and return the hash of the transaction.
    async fn send_transaction(&self, call: &BondingCall, options: &TxOptions) -> Result<TxHash>;

    /// Receipt of a transaction, or `None` while it is not mined.
    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<Receipt>>;

    /// Address the call is sent to.
    fn target(&self, call: &BondingCall) -> Address;
}

/// [ChainReader] and [ChainWriter] backed by an alloy provider.
#[derive(Clone)]
pub struct ProviderChain<P> {
    provider: P,
    deployment: Deployment,
}

impl<P: Provider + Clone> ProviderChain<P> {
    pub fn new(provider: P, deployment: Deployment) -> Self {
        Self { provider, deployment }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    fn bonding_manager(&self) -> IBondingManager::IBondingManagerInstance<&P> {
        IBondingManager::new(self.deployment.bonding_manager_address, &self.provider)
    }

    fn rounds_manager(&self) -> IRoundsManager::IRoundsManagerInstance<&P> {
        IRoundsManager::new(self.deployment.rounds_manager_address, &self.provider)
    }
}

fn block_id(block: Option<u64>) -> BlockId {
    block.map(BlockId::number).unwrap_or_else(BlockId::latest)
}

fn to_u64(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} does not fit in u64: {value}"))
}

#[async_trait]
impl<P> ChainReader for ProviderChain<P>
where
    P: Provider + Clone + Send + Sync,
{
    async fn current_round(&self, block: Option<u64>) -> Result<u64> {
        let round = self.rounds_manager().currentRound().block(block_id(block)).call().await?;
        to_u64(round, "currentRound")
    }

    async fn current_round_initialized(&self) -> Result<bool> {
        Ok(self.rounds_manager().currentRoundInitialized().call().await?)
    }

    async fn current_round_start_block(&self) -> Result<u64> {
        let block = self.rounds_manager().currentRoundStartBlock().call().await?;
        to_u64(block, "currentRoundStartBlock")
    }

    async fn last_initialized_round(&self) -> Result<u64> {
        let round = self.rounds_manager().lastInitializedRound().call().await?;
        to_u64(round, "lastInitializedRound")
    }

    async fn round_length(&self) -> Result<u64> {
        let length = self.rounds_manager().roundLength().call().await?;
        to_u64(length, "roundLength")
    }

    async fn get_delegator(
        &self,
        delegator: Address,
        version: BondingManagerVersion,
        block: Option<u64>,
    ) -> Result<DelegatorData> {
        if version == BondingManagerVersion::Genesis {
            let genesis =
                IBondingManagerGenesis::new(self.deployment.bonding_manager_address, &self.provider);
            let d = genesis.getDelegator(delegator).block(block_id(block)).call().await?;
            return Ok(DelegatorData {
                bonded_amount: d.bondedAmount,
                fees: d.fees,
                delegate_address: d.delegateAddress,
                delegated_amount: d.delegatedAmount,
                start_round: to_u64(d.startRound, "startRound")?,
                last_claim_round: to_u64(d.lastClaimRound, "lastClaimRound")?,
                next_unbonding_lock_id: 0,
            });
        }

        let d = self.bonding_manager().getDelegator(delegator).block(block_id(block)).call().await?;
        Ok(DelegatorData {
            bonded_amount: d.bondedAmount,
            fees: d.fees,
            delegate_address: d.delegateAddress,
            delegated_amount: d.delegatedAmount,
            start_round: to_u64(d.startRound, "startRound")?,
            last_claim_round: to_u64(d.lastClaimRound, "lastClaimRound")?,
            next_unbonding_lock_id: to_u64(d.nextUnbondingLockId, "nextUnbondingLockId")?,
        })
    }

    async fn delegator_status(&self, delegator: Address) -> Result<u8> {
        Ok(self.bonding_manager().delegatorStatus(delegator).call().await?)
    }

    async fn get_delegator_unbonding_lock(
        &self,
        delegator: Address,
        unbonding_lock_id: u64,
    ) -> Result<UnbondingLockData> {
        let lock = self
            .bonding_manager()
            .getDelegatorUnbondingLock(delegator, U256::from(unbonding_lock_id))
            .call()
            .await?;
        Ok(UnbondingLockData {
            amount: lock.amount,
            withdraw_round: to_u64(lock.withdrawRound, "withdrawRound")?,
        })
    }

    async fn pending_stake(&self, delegator: Address, end_round: u64) -> Result<U256> {
        Ok(self.bonding_manager().pendingStake(delegator, U256::from(end_round)).call().await?)
    }

    async fn pending_fees(&self, delegator: Address, end_round: u64) -> Result<U256> {
        Ok(self.bonding_manager().pendingFees(delegator, U256::from(end_round)).call().await?)
    }

    async fn get_transcoder(
        &self,
        transcoder: Address,
        block: Option<u64>,
    ) -> Result<TranscoderData> {
        let t = self.bonding_manager().getTranscoder(transcoder).block(block_id(block)).call().await?;
        Ok(TranscoderData {
            last_reward_round: to_u64(t.lastRewardRound, "lastRewardRound")?,
            reward_cut: t.rewardCut,
            fee_share: t.feeShare,
            last_active_stake_update_round: to_u64(
                t.lastActiveStakeUpdateRound,
                "lastActiveStakeUpdateRound",
            )?,
            activation_round: to_u64(t.activationRound, "activationRound")?,
            deactivation_round: to_u64(t.deactivationRound, "deactivationRound")?,
        })
    }

    async fn get_transcoder_earnings_pool_for_round(
        &self,
        transcoder: Address,
        round: u64,
        version: BondingManagerVersion,
        block: Option<u64>,
    ) -> Result<EarningsPool> {
        if version != BondingManagerVersion::Streamflow {
            let genesis =
                IBondingManagerGenesis::new(self.deployment.bonding_manager_address, &self.provider);
            let pool = genesis
                .getTranscoderEarningsPoolForRound(transcoder, U256::from(round))
                .block(block_id(block))
                .call()
                .await?;
            return Ok(EarningsPool {
                reward_pool: pool.rewardPool,
                fee_pool: pool.feePool,
                total_stake: pool.totalStake,
                claimable_stake: pool.claimableStake,
                transcoder_reward_pool: U256::ZERO,
            });
        }

        let pool = self
            .bonding_manager()
            .getTranscoderEarningsPoolForRound(transcoder, U256::from(round))
            .block(block_id(block))
            .call()
            .await?;
        Ok(EarningsPool {
            reward_pool: pool.rewardPool,
            fee_pool: pool.feePool,
            total_stake: pool.totalStake,
            claimable_stake: pool.claimableStake,
            transcoder_reward_pool: pool.transcoderRewardPool,
        })
    }

    async fn transcoder_status(&self, transcoder: Address) -> Result<u8> {
        Ok(self.bonding_manager().transcoderStatus(transcoder).call().await?)
    }

    async fn transcoder_total_stake(&self, transcoder: Address) -> Result<U256> {
        Ok(self.bonding_manager().transcoderTotalStake(transcoder).call().await?)
    }

    async fn is_active_transcoder(&self, transcoder: Address) -> Result<bool> {
        Ok(self.bonding_manager().isActiveTranscoder(transcoder).call().await?)
    }

    async fn first_transcoder_in_pool(&self) -> Result<Address> {
        Ok(self.bonding_manager().getFirstTranscoderInPool().call().await?)
    }

    async fn next_transcoder_in_pool(&self, transcoder: Address) -> Result<Address> {
        Ok(self.bonding_manager().getNextTranscoderInPool(transcoder).call().await?)
    }

    async fn bonding_manager_allowance(&self, owner: Address) -> Result<U256> {
        let token = ILivepeerToken::new(self.deployment.token_address, &self.provider);
        Ok(token.allowance(owner, self.deployment.bonding_manager_address).call().await?)
    }
}

#[async_trait]
impl<P> ChainWriter for ProviderChain<P>
where
    P: Provider + Clone + Send + Sync,
{
    async fn send_transaction(&self, call: &BondingCall, options: &TxOptions) -> Result<TxHash> {
        let mut tx = TransactionRequest::default()
            .with_to(self.target(call))
            .with_input(call.calldata());
        if let Some(from) = options.from {
            tx = tx.with_from(from);
        }
        if let Some(gas) = options.gas {
            tx = tx.with_gas_limit(gas);
        }

        tracing::trace!("Calling {}", call.name());
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .with_context(|| format!("failed to send {} transaction", call.name()))?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<Receipt>> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(Receipt::from))
    }

    fn target(&self, call: &BondingCall) -> Address {
        call.target(&self.deployment)
    }
}
