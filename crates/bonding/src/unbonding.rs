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

//! Unbonding lock lifecycle.
//!
//! Unbonding creates a lock that becomes withdrawable at its withdraw round. Lock ids are dense
//! per delegator: every id in `[0, next_unbonding_lock_id)` names a lock, consumed locks included.

use std::{iter::FusedIterator, sync::Arc};

use alloy::primitives::{Address, U256};
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::{
    errors::{BondingError, InvalidState},
    rewards::DelegatorLocks,
    store::BondingStoreObj,
    types::{DelegatorRecord, DelegatorStatus, UnbondingLock},
};

/// Ids of a delegator's unbonding locks, most recent first.
#[derive(Debug, Clone)]
pub struct LockIds {
    // Exclusive upper bound of the ids still to yield from the front.
    next: u64,
    // Inclusive lower bound of the ids still to yield from the back.
    low: u64,
}

impl LockIds {
    pub fn new(next_unbonding_lock_id: u64) -> Self {
        Self { next: next_unbonding_lock_id, low: 0 }
    }
}

impl Iterator for LockIds {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next <= self.low {
            return None;
        }
        self.next -= 1;
        Some(self.next)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = usize::try_from(self.next - self.low).unwrap_or(usize::MAX);
        (len, Some(len))
    }
}

impl DoubleEndedIterator for LockIds {
    fn next_back(&mut self) -> Option<u64> {
        if self.next <= self.low {
            return None;
        }
        self.low += 1;
        Some(self.low - 1)
    }
}

impl ExactSizeIterator for LockIds {}

impl FusedIterator for LockIds {}

/// Check that `lock` can be withdrawn in `current_round`.
pub fn check_withdrawable(lock: &UnbondingLock, current_round: u64) -> Result<(), InvalidState> {
    if lock.withdraw_round > current_round {
        return Err(InvalidState::UnbondingPeriodNotElapsed {
            withdraw_round: lock.withdraw_round,
            current_round,
        });
    }
    if lock.amount.is_zero() {
        return Err(InvalidState::NothingToWithdraw);
    }
    Ok(())
}

/// Derive the visible status of a delegator from the status reported by the bonding manager and
/// its most recent unbonding lock.
pub fn derive_delegator_status(
    raw: DelegatorStatus,
    latest_lock: Option<&UnbondingLock>,
    current_round: u64,
) -> DelegatorStatus {
    match latest_lock {
        Some(lock) if lock.withdraw_round != 0 && current_round < lock.withdraw_round => {
            DelegatorStatus::Unbonding
        }
        _ => raw,
    }
}

/// Unbonding locks of indexed delegators.
pub struct UnbondingLockLedger {
    store: BondingStoreObj,
    locks: Arc<DelegatorLocks>,
}

impl UnbondingLockLedger {
    pub fn new(store: BondingStoreObj) -> Self {
        Self { store, locks: Arc::default() }
    }

    /// Share per-delegator serialization with other writers of the same store.
    pub fn with_locks(mut self, locks: Arc<DelegatorLocks>) -> Self {
        self.locks = locks;
        self
    }

    async fn record(&self, delegator: Address) -> Result<DelegatorRecord, BondingError> {
        self.store
            .delegator(delegator)
            .await
            .map_err(BondingError::Store)?
            .ok_or_else(|| BondingError::delegator_not_found(delegator))
    }

    async fn existing_lock(&self, delegator: Address, id: u64) -> Result<UnbondingLock, BondingError> {
        self.store
            .unbonding_lock(delegator, id)
            .await
            .map_err(BondingError::Store)?
            .ok_or_else(|| BondingError::NotFound(format!("unbonding lock {delegator:#x}:{id}")))
    }

    /// Allocate the next lock id of `delegator` and store a lock under it.
    pub async fn create_lock(
        &self,
        delegator: Address,
        amount: U256,
        withdraw_round: u64,
    ) -> Result<u64, BondingError> {
        let _guard = self.locks.lock(delegator).await;

        let mut record = self.record(delegator).await?;
        let id = record.next_unbonding_lock_id;
        record.next_unbonding_lock_id = id.checked_add(1).ok_or(BondingError::Overflow)?;

        let lock = UnbondingLock { id, delegator, amount, withdraw_round };
        self.store.put_unbonding_lock(&lock, &record).await.map_err(BondingError::Store)?;

        tracing::debug!(lock = %lock.key(), %amount, withdraw_round, "Created unbonding lock");
        Ok(id)
    }

    /// Get a single lock.
    pub async fn lock(&self, delegator: Address, id: u64) -> Result<UnbondingLock, BondingError> {
        self.existing_lock(delegator, id).await
    }

    /// All locks of `delegator`, most recent first. Each lock is fetched when the stream is polled.
    pub async fn list_locks(
        &self,
        delegator: Address,
    ) -> Result<BoxStream<'static, Result<UnbondingLock, BondingError>>, BondingError> {
        let record = self.record(delegator).await?;
        let store = self.store.clone();
        Ok(stream::iter(LockIds::new(record.next_unbonding_lock_id))
            .then(move |id| {
                let store = store.clone();
                async move {
                    store
                        .unbonding_lock(delegator, id)
                        .await
                        .map_err(BondingError::Store)?
                        .ok_or_else(|| {
                            BondingError::NotFound(format!("unbonding lock {delegator:#x}:{id}"))
                        })
                }
            })
            .boxed())
    }

    /// Consume a lock whose unbonding period has elapsed. Returns the lock as it was before it
    /// was consumed.
    pub async fn withdraw(
        &self,
        delegator: Address,
        id: u64,
        current_round: u64,
    ) -> Result<UnbondingLock, BondingError> {
        let _guard = self.locks.lock(delegator).await;

        let record = self.record(delegator).await?;
        let lock = self.existing_lock(delegator, id).await?;
        check_withdrawable(&lock, current_round)?;

        self.consume(&lock, &record).await?;
        Ok(lock)
    }

    /// Consume a lock whose withdrawal was already mined. Unlike [Self::withdraw] the
    /// withdrawal is not validated: an unknown or already consumed lock is left alone and
    /// `None` is returned.
    pub async fn record_withdrawal(
        &self,
        delegator: Address,
        id: u64,
        current_round: u64,
    ) -> Result<Option<UnbondingLock>, BondingError> {
        let _guard = self.locks.lock(delegator).await;

        let Some(lock) =
            self.store.unbonding_lock(delegator, id).await.map_err(BondingError::Store)?
        else {
            tracing::warn!(%delegator, id, "Withdrawal of an unindexed unbonding lock");
            return Ok(None);
        };
        if lock.amount.is_zero() {
            tracing::debug!(lock = %lock.key(), "Unbonding lock already withdrawn");
            return Ok(None);
        }
        if let Err(err) = check_withdrawable(&lock, current_round) {
            tracing::warn!(lock = %lock.key(), current_round, "Recording mined withdrawal: {err}");
        }

        let record = self.record(delegator).await?;
        self.consume(&lock, &record).await?;
        Ok(Some(lock))
    }

    async fn consume(
        &self,
        lock: &UnbondingLock,
        record: &DelegatorRecord,
    ) -> Result<(), BondingError> {
        let consumed = UnbondingLock { amount: U256::ZERO, withdraw_round: 0, ..lock.clone() };
        self.store.put_unbonding_lock(&consumed, record).await.map_err(BondingError::Store)?;

        tracing::debug!(lock = %lock.key(), amount = %lock.amount, "Withdrew unbonding lock");
        Ok(())
    }

    /// Move the stake of a pending lock back into the bonded stake of `delegator`, bonded to
    /// `delegate`. Pending rewards are claimed first. Returns the lock as it was before it was consumed.
    pub async fn rebond(
        &self,
        delegator: Address,
        id: u64,
        delegate: Address,
    ) -> Result<UnbondingLock, BondingError> {
        let _guard = self.locks.lock(delegator).await;

        let mut record = self.record(delegator).await?;
        let lock = self.existing_lock(delegator, id).await?;
        if lock.amount.is_zero() {
            return Err(InvalidState::NothingToWithdraw.into());
        }

        record.claim_pending();
        record.delegate = Some(delegate);
        record.bonded_amount =
            record.bonded_amount.checked_add(lock.amount).ok_or(BondingError::Overflow)?;
        record.pending_stake = record.bonded_amount;

        let consumed = UnbondingLock { amount: U256::ZERO, withdraw_round: 0, ..lock.clone() };
        self.store.put_unbonding_lock(&consumed, &record).await.map_err(BondingError::Store)?;

        tracing::debug!(lock = %lock.key(), %delegate, "Rebonded unbonding lock");
        Ok(lock)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    const DELEGATOR: Address = address!("0x00000000000000000000000000000000000000d1");

    fn lock(amount: u64, withdraw_round: u64) -> UnbondingLock {
        UnbondingLock { id: 0, delegator: DELEGATOR, amount: U256::from(amount), withdraw_round }
    }

    #[test]
    fn lock_ids_descend() {
        assert_eq!(LockIds::new(0).collect::<Vec<_>>(), Vec::<u64>::new());
        assert_eq!(LockIds::new(1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(LockIds::new(4).collect::<Vec<_>>(), vec![3, 2, 1, 0]);
        assert_eq!(LockIds::new(4).len(), 4);
    }

    #[test]
    fn lock_ids_from_both_ends() {
        let mut ids = LockIds::new(4);
        assert_eq!(ids.next(), Some(3));
        assert_eq!(ids.next_back(), Some(0));
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.rev().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn withdraw_round_boundary() {
        assert_eq!(
            check_withdrawable(&lock(10, 100), 99),
            Err(InvalidState::UnbondingPeriodNotElapsed { withdraw_round: 100, current_round: 99 })
        );
        assert_eq!(check_withdrawable(&lock(10, 100), 100), Ok(()));
        assert_eq!(check_withdrawable(&lock(10, 100), 101), Ok(()));
    }

    #[test]
    fn nothing_to_withdraw() {
        assert_eq!(check_withdrawable(&lock(0, 5), 10), Err(InvalidState::NothingToWithdraw));
    }

    #[test]
    fn status_derivation() {
        let pending = lock(10, 100);
        assert_eq!(
            derive_delegator_status(DelegatorStatus::Bonded, Some(&pending), 99),
            DelegatorStatus::Unbonding
        );
        assert_eq!(
            derive_delegator_status(DelegatorStatus::Bonded, Some(&pending), 100),
            DelegatorStatus::Bonded
        );
        assert_eq!(
            derive_delegator_status(DelegatorStatus::Unbonded, Some(&lock(0, 0)), 3),
            DelegatorStatus::Unbonded
        );
        assert_eq!(
            derive_delegator_status(DelegatorStatus::Pending, None, 3),
            DelegatorStatus::Pending
        );
    }
}
