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

//! Bonding manager event fetching and decoding.

use alloy::{
    primitives::{Address, B256, U256},
    providers::Provider,
    rpc::types::{BlockNumberOrTag, Filter, Log},
    sol_types::SolEvent,
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{contracts::IBondingManager, deployments::Deployment, LOG_QUERY_CHUNK_SIZE};

/// A decoded bonding manager event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondingEvent {
    Bond {
        new_delegate: Address,
        old_delegate: Address,
        delegator: Address,
        additional_amount: U256,
        bonded_amount: U256,
    },
    Unbond {
        delegate: Address,
        delegator: Address,
        unbonding_lock_id: u64,
        amount: U256,
        withdraw_round: u64,
    },
    Rebond {
        delegate: Address,
        delegator: Address,
        unbonding_lock_id: u64,
        amount: U256,
    },
    WithdrawStake {
        delegator: Address,
        unbonding_lock_id: u64,
        amount: U256,
        withdraw_round: u64,
    },
    Reward {
        transcoder: Address,
        amount: U256,
    },
}

/// A [BondingEvent] with its position in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedBondingEvent {
    pub block_number: u64,
    pub log_index: u64,
    pub event: BondingEvent,
}

impl TimestampedBondingEvent {
    pub fn position(&self) -> EventPosition {
        EventPosition { block_number: self.block_number, log_index: self.log_index }
    }
}

/// Position of a log in the chain. Orders by block, then by index in the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u64,
}

const TOPICS: [B256; 5] = [
    IBondingManager::Bond::SIGNATURE_HASH,
    IBondingManager::Unbond::SIGNATURE_HASH,
    IBondingManager::Rebond::SIGNATURE_HASH,
    IBondingManager::WithdrawStake::SIGNATURE_HASH,
    IBondingManager::Reward::SIGNATURE_HASH,
];

/// Query logs in chunks to avoid hitting provider limits
pub async fn query_logs_chunked<P: Provider>(
    provider: &P,
    filter: Filter,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<Log>> {
    let mut all_logs = Vec::new();

    let mut current_from = from_block;
    while current_from <= to_block {
        let current_to = current_from.saturating_add(LOG_QUERY_CHUNK_SIZE - 1).min(to_block);

        let chunk_filter = filter
            .clone()
            .from_block(BlockNumberOrTag::Number(current_from))
            .to_block(BlockNumberOrTag::Number(current_to));

        let logs = provider.get_logs(&chunk_filter).await?;
        tracing::trace!(from = current_from, to = current_to, count = logs.len(), "Fetched logs");
        all_logs.extend(logs);

        current_from = current_to + 1;
    }

    Ok(all_logs)
}

/// Fetch every bonding manager event in `[from_block, to_block]`, ordered as they were emitted.
pub async fn fetch_bonding_events<P: Provider>(
    provider: &P,
    deployment: &Deployment,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<TimestampedBondingEvent>> {
    let filter = Filter::new()
        .address(deployment.bonding_manager_address)
        .event_signature(TOPICS.to_vec());

    let logs = query_logs_chunked(provider, filter, from_block, to_block)
        .await
        .context("Failed to get bonding manager logs")?;

    let mut events = logs
        .iter()
        .filter_map(|log| decode_log(log).transpose())
        .collect::<Result<Vec<_>>>()?;
    sort_events(&mut events);

    tracing::debug!(from_block, to_block, count = events.len(), "Fetched bonding events");
    Ok(events)
}

pub(crate) fn sort_events(events: &mut [TimestampedBondingEvent]) {
    events.sort_by_key(TimestampedBondingEvent::position);
}

fn to_u64(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} does not fit in u64: {value}"))
}

/// Decode a bonding manager log. Returns `None` for events the engine does not track and for
/// logs that were removed by a reorg.
pub fn decode_log(log: &Log) -> Result<Option<TimestampedBondingEvent>> {
    if log.removed {
        return Ok(None);
    }
    let Some(topic) = log.topic0().copied() else {
        return Ok(None);
    };

    let event = match topic {
        t if t == IBondingManager::Bond::SIGNATURE_HASH => {
            let data = log.log_decode::<IBondingManager::Bond>()?.inner.data;
            BondingEvent::Bond {
                new_delegate: data.newDelegate,
                old_delegate: data.oldDelegate,
                delegator: data.delegator,
                additional_amount: data.additionalAmount,
                bonded_amount: data.bondedAmount,
            }
        }
        t if t == IBondingManager::Unbond::SIGNATURE_HASH => {
            let data = log.log_decode::<IBondingManager::Unbond>()?.inner.data;
            BondingEvent::Unbond {
                delegate: data.delegate,
                delegator: data.delegator,
                unbonding_lock_id: to_u64(data.unbondingLockId, "unbondingLockId")?,
                amount: data.amount,
                withdraw_round: to_u64(data.withdrawRound, "withdrawRound")?,
            }
        }
        t if t == IBondingManager::Rebond::SIGNATURE_HASH => {
            let data = log.log_decode::<IBondingManager::Rebond>()?.inner.data;
            BondingEvent::Rebond {
                delegate: data.delegate,
                delegator: data.delegator,
                unbonding_lock_id: to_u64(data.unbondingLockId, "unbondingLockId")?,
                amount: data.amount,
            }
        }
        t if t == IBondingManager::WithdrawStake::SIGNATURE_HASH => {
            let data = log.log_decode::<IBondingManager::WithdrawStake>()?.inner.data;
            BondingEvent::WithdrawStake {
                delegator: data.delegator,
                unbonding_lock_id: to_u64(data.unbondingLockId, "unbondingLockId")?,
                amount: data.amount,
                withdraw_round: to_u64(data.withdrawRound, "withdrawRound")?,
            }
        }
        t if t == IBondingManager::Reward::SIGNATURE_HASH => {
            let data = log.log_decode::<IBondingManager::Reward>()?.inner.data;
            BondingEvent::Reward { transcoder: data.transcoder, amount: data.amount }
        }
        _ => return Ok(None),
    };

    let block_number = log.block_number.context("log is missing its block number")?;
    let log_index = log.log_index.context("log is missing its log index")?;
    Ok(Some(TimestampedBondingEvent { block_number, log_index, event }))
}
