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

//! Records and views of bonded-stake accounts.

use std::fmt;

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Externally visible state of a delegator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DelegatorStatus {
    Pending,
    Bonded,
    Unbonded,
    Unbonding,
}

impl DelegatorStatus {
    /// Decode the status enum returned by the bonding manager. The contract never reports
    /// [DelegatorStatus::Unbonding]; it is derived from the delegator's unbonding locks.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Pending),
            1 => Some(Self::Bonded),
            2 => Some(Self::Unbonded),
            _ => None,
        }
    }
}

impl fmt::Display for DelegatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Bonded => "Bonded",
            Self::Unbonded => "Unbonded",
            Self::Unbonding => "Unbonding",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TranscoderStatus {
    NotRegistered,
    Registered,
}

impl TranscoderStatus {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::NotRegistered),
            1 => Some(Self::Registered),
            _ => None,
        }
    }
}

impl fmt::Display for TranscoderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered => f.write_str("NotRegistered"),
            Self::Registered => f.write_str("Registered"),
        }
    }
}

/// Indexed state of a delegator, maintained from bonding events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorRecord {
    pub address: Address,
    /// Transcoder the delegator is bonded to, if any.
    pub delegate: Option<Address>,
    pub bonded_amount: U256,
    /// Bonded amount plus every reward share folded in since the last claim.
    pub pending_stake: U256,
    pub last_claim_round: u64,
    pub start_round: u64,
    /// Id the next unbonding lock will receive. Never decreases.
    pub next_unbonding_lock_id: u64,
}

impl DelegatorRecord {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            delegate: None,
            bonded_amount: U256::ZERO,
            pending_stake: U256::ZERO,
            last_claim_round: 0,
            start_round: 0,
            next_unbonding_lock_id: 0,
        }
    }

    /// Fold the rewards credited since the last claim into the bonded amount, as the bonding
    /// manager does before every bond, unbond or rebond.
    pub fn claim_pending(&mut self) {
        self.bonded_amount = self.bonded_amount.max(self.pending_stake);
        self.pending_stake = self.bonded_amount;
    }
}

/// Composite view of a delegator assembled from chain reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegator {
    pub address: Address,
    /// Token allowance granted to the bonding manager.
    pub allowance: U256,
    pub bonded_amount: U256,
    pub delegate_address: Option<Address>,
    pub delegated_amount: U256,
    pub fees: U256,
    pub last_claim_round: u64,
    pub pending_fees: U256,
    pub pending_stake: U256,
    pub start_round: u64,
    pub status: DelegatorStatus,
    /// Withdraw round of the most recent unbonding lock.
    pub withdraw_round: u64,
    /// Amount of the most recent unbonding lock.
    pub withdraw_amount: U256,
    pub next_unbonding_lock_id: u64,
}

/// Composite view of a transcoder assembled from chain reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcoder {
    pub address: Address,
    pub status: TranscoderStatus,
    /// Whether the transcoder currently holds a slot in the active set.
    pub active: bool,
    pub reward_cut: U256,
    pub fee_share: U256,
    pub last_reward_round: u64,
    pub activation_round: u64,
    pub deactivation_round: u64,
    pub last_active_stake_update_round: u64,
    pub total_stake: U256,
}

/// A withdrawal of bonded stake that becomes claimable at `withdraw_round`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingLock {
    /// Id scoped to the delegator.
    pub id: u64,
    pub delegator: Address,
    pub amount: U256,
    pub withdraw_round: u64,
}

impl UnbondingLock {
    /// Store key, `<delegator>:<lockId>`.
    pub fn key(&self) -> String {
        lock_key(self.delegator, self.id)
    }
}

pub fn lock_key(delegator: Address, id: u64) -> String {
    format!("{delegator:#x}:{id}")
}

/// Identifies the earnings pool of a transcoder for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EarningsPoolKey {
    pub transcoder: Address,
    pub round: u64,
}

impl fmt::Display for EarningsPoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}-{}", self.transcoder, self.round)
    }
}

/// Snapshot of a transcoder's earnings pool for a round, as read from the chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsPool {
    pub reward_pool: U256,
    pub fee_pool: U256,
    pub total_stake: U256,
    pub claimable_stake: U256,
    /// Reward cut kept aside for the transcoder itself. Always zero before the current formula.
    pub transcoder_reward_pool: U256,
}

/// Reward tokens a delegator earned from a transcoder in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub delegator: Address,
    pub round: u64,
    pub pool: EarningsPoolKey,
    pub reward_tokens: U256,
}

impl Share {
    /// Store key, `<delegator>:<round>`.
    pub fn key(&self) -> String {
        share_key(self.delegator, self.round)
    }
}

pub fn share_key(delegator: Address, round: u64) -> String {
    format!("{delegator:#x}:{round}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub id: u64,
    pub initialized: bool,
    pub last_initialized_round: u64,
    pub length: u64,
    pub start_block: u64,
}
