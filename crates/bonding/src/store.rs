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

//! Key-addressed persistence of indexed records.

use std::{collections::HashMap, sync::Arc};

use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    events::EventPosition,
    types::{DelegatorRecord, Share, UnbondingLock},
};

pub type BondingStoreObj = Arc<dyn BondingStore + Send + Sync>;

/// Storage of delegator, share and unbonding lock records.
///
/// Implementations must make each method atomic. Methods that take several records write all of
/// them or none.
#[async_trait]
pub trait BondingStore {
    /// Get a delegator record
    async fn delegator(&self, address: Address) -> Result<Option<DelegatorRecord>>;

    /// Insert or replace a delegator record
    async fn upsert_delegator(&self, record: &DelegatorRecord) -> Result<()>;

    /// Addresses of the delegators currently bonded to `transcoder`, in ascending order
    async fn delegators_of(&self, transcoder: Address) -> Result<Vec<Address>>;

    /// Get the share of a delegator for a round
    async fn share(&self, delegator: Address, round: u64) -> Result<Option<Share>>;

    /// Insert or replace a share without touching the delegator
    async fn put_share(&self, share: &Share) -> Result<()>;

    /// Insert or replace a share together with the delegator it was credited to
    async fn apply_share(&self, share: &Share, delegator: &DelegatorRecord) -> Result<()>;

    /// Get an unbonding lock
    async fn unbonding_lock(&self, delegator: Address, id: u64) -> Result<Option<UnbondingLock>>;

    /// Insert or replace an unbonding lock together with its owner
    async fn put_unbonding_lock(
        &self,
        lock: &UnbondingLock,
        delegator: &DelegatorRecord,
    ) -> Result<()>;

    /// Get the last block whose events were fully processed
    async fn last_processed_block(&self) -> Result<Option<u64>>;

    /// Set the last block whose events were fully processed
    async fn set_last_processed_block(&self, block: u64) -> Result<()>;

    /// Get the position of the last event applied
    async fn last_processed_event(&self) -> Result<Option<EventPosition>>;

    /// Set the position of the last event applied
    async fn set_last_processed_event(&self, position: EventPosition) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    delegators: HashMap<Address, DelegatorRecord>,
    shares: HashMap<(Address, u64), Share>,
    locks: HashMap<(Address, u64), UnbondingLock>,
    last_processed_block: Option<u64>,
    last_processed_event: Option<EventPosition>,
}

/// In-process [BondingStore].
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BondingStore for MemoryStore {
    async fn delegator(&self, address: Address) -> Result<Option<DelegatorRecord>> {
        Ok(self.state.read().await.delegators.get(&address).cloned())
    }

    async fn upsert_delegator(&self, record: &DelegatorRecord) -> Result<()> {
        self.state.write().await.delegators.insert(record.address, record.clone());
        Ok(())
    }

    async fn delegators_of(&self, transcoder: Address) -> Result<Vec<Address>> {
        let state = self.state.read().await;
        let mut delegators: Vec<Address> = state
            .delegators
            .values()
            .filter(|d| d.delegate == Some(transcoder))
            .map(|d| d.address)
            .collect();
        delegators.sort();
        Ok(delegators)
    }

    async fn share(&self, delegator: Address, round: u64) -> Result<Option<Share>> {
        Ok(self.state.read().await.shares.get(&(delegator, round)).cloned())
    }

    async fn put_share(&self, share: &Share) -> Result<()> {
        self.state.write().await.shares.insert((share.delegator, share.round), share.clone());
        Ok(())
    }

    async fn apply_share(&self, share: &Share, delegator: &DelegatorRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.shares.insert((share.delegator, share.round), share.clone());
        state.delegators.insert(delegator.address, delegator.clone());
        Ok(())
    }

    async fn unbonding_lock(&self, delegator: Address, id: u64) -> Result<Option<UnbondingLock>> {
        Ok(self.state.read().await.locks.get(&(delegator, id)).cloned())
    }

    async fn put_unbonding_lock(
        &self,
        lock: &UnbondingLock,
        delegator: &DelegatorRecord,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.locks.insert((lock.delegator, lock.id), lock.clone());
        state.delegators.insert(delegator.address, delegator.clone());
        Ok(())
    }

    async fn last_processed_block(&self) -> Result<Option<u64>> {
        Ok(self.state.read().await.last_processed_block)
    }

    async fn set_last_processed_block(&self, block: u64) -> Result<()> {
        self.state.write().await.last_processed_block = Some(block);
        Ok(())
    }

    async fn last_processed_event(&self) -> Result<Option<EventPosition>> {
        Ok(self.state.read().await.last_processed_event)
    }

    async fn set_last_processed_event(&self, position: EventPosition) -> Result<()> {
        self.state.write().await.last_processed_event = Some(position);
        Ok(())
    }
}
