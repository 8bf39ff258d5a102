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

//! Test utilities for the bonding ledger.
//!
//! This crate provides scriptable in-memory implementations of the chain collaborators and
//! fixtures shared by the tests of the other crates.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
};

use alloy::primitives::{address, keccak256, Address, TxHash, B256, U256};
use anyhow::{bail, Result};
use async_trait::async_trait;
use bonding_ledger::{
    AddressResolver, BondingCall, BondingManagerVersion, ChainReader, ChainWriter, DelegatorData,
    Deployment, EarningsPool, Receipt, ResolveError, TranscoderData, TxOptions, UnbondingLockData,
};

/// [Deployment] with fixed, easily recognisable addresses.
pub fn test_deployment() -> Deployment {
    Deployment::builder()
        .chain_id(31337u64)
        .controller_address(address!("0x00000000000000000000000000000000000c0001"))
        .bonding_manager_address(address!("0x00000000000000000000000000000000000c0002"))
        .rounds_manager_address(address!("0x00000000000000000000000000000000000c0003"))
        .token_address(address!("0x00000000000000000000000000000000000c0004"))
        .build()
        .unwrap()
}

/// Deterministic address for test actor `n`.
pub fn actor(n: u64) -> Address {
    Address::from_word(B256::from(U256::from(n)))
}

#[derive(Default)]
struct ChainState {
    current_round: u64,
    // Round in effect from a block onwards.
    rounds_from_block: BTreeMap<u64, u64>,
    round_initialized: bool,
    round_start_block: u64,
    last_initialized_round: u64,
    round_length: u64,
    delegators: HashMap<Address, DelegatorData>,
    delegators_at_block: HashMap<(Address, u64), DelegatorData>,
    delegator_statuses: HashMap<Address, u8>,
    locks: HashMap<(Address, u64), UnbondingLockData>,
    pending_stake: HashMap<Address, U256>,
    pending_fees: HashMap<Address, U256>,
    transcoders: HashMap<Address, TranscoderData>,
    transcoder_statuses: HashMap<Address, u8>,
    active: HashSet<Address>,
    total_stakes: HashMap<Address, U256>,
    pool: Vec<Address>,
    earnings_pools: HashMap<(Address, u64), EarningsPool>,
    allowances: HashMap<Address, U256>,
    failures: HashMap<&'static str, String>,
    delegator_reads: Vec<(Address, BondingManagerVersion, Option<u64>)>,
    pending_stake_reads: Vec<(Address, u64)>,
}

/// Scriptable in-memory [ChainReader].
///
/// Unknown accounts read as zeroed structs, like they do on chain. Any read can be made to fail
/// with [MockChain::fail], keyed by the Solidity name of the getter.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut ChainState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    fn check(&self, call: &'static str) -> Result<()> {
        match self.with(|s| s.failures.get(call).cloned()) {
            Some(message) => bail!(message),
            None => Ok(()),
        }
    }

    pub fn set_current_round(&self, round: u64) {
        self.with(|s| s.current_round = round);
    }

    /// Make `round` the current round for reads pinned at `block` or later.
    pub fn set_round_from_block(&self, block: u64, round: u64) {
        self.with(|s| s.rounds_from_block.insert(block, round));
    }

    pub fn set_round_info(&self, initialized: bool, start_block: u64, last_initialized: u64, length: u64) {
        self.with(|s| {
            s.round_initialized = initialized;
            s.round_start_block = start_block;
            s.last_initialized_round = last_initialized;
            s.round_length = length;
        });
    }

    pub fn set_delegator(&self, delegator: Address, data: DelegatorData) {
        self.with(|s| s.delegators.insert(delegator, data));
    }

    /// Delegator as read at exactly `block`. Other blocks fall back to [MockChain::set_delegator].
    pub fn set_delegator_at(&self, delegator: Address, block: u64, data: DelegatorData) {
        self.with(|s| s.delegators_at_block.insert((delegator, block), data));
    }

    pub fn set_delegator_status(&self, delegator: Address, status: u8) {
        self.with(|s| s.delegator_statuses.insert(delegator, status));
    }

    pub fn set_unbonding_lock(&self, delegator: Address, id: u64, amount: U256, withdraw_round: u64) {
        self.with(|s| s.locks.insert((delegator, id), UnbondingLockData { amount, withdraw_round }));
    }

    pub fn set_pending_stake(&self, delegator: Address, amount: U256) {
        self.with(|s| s.pending_stake.insert(delegator, amount));
    }

    pub fn set_pending_fees(&self, delegator: Address, amount: U256) {
        self.with(|s| s.pending_fees.insert(delegator, amount));
    }

    pub fn set_allowance(&self, owner: Address, amount: U256) {
        self.with(|s| s.allowances.insert(owner, amount));
    }

    /// Register a transcoder and append it to the pool.
    pub fn add_transcoder(&self, transcoder: Address, data: TranscoderData, total_stake: U256, active: bool) {
        self.with(|s| {
            s.transcoders.insert(transcoder, data);
            s.transcoder_statuses.insert(transcoder, 1);
            s.total_stakes.insert(transcoder, total_stake);
            if active {
                s.active.insert(transcoder);
            }
            s.pool.push(transcoder);
        });
    }

    /// Set the successor list of the pool directly.
    pub fn set_pool(&self, pool: Vec<Address>) {
        self.with(|s| s.pool = pool);
    }

    pub fn set_earnings_pool(&self, transcoder: Address, round: u64, pool: EarningsPool) {
        self.with(|s| s.earnings_pools.insert((transcoder, round), pool));
    }

    /// Fail every subsequent `call` with `message`.
    pub fn fail(&self, call: &'static str, message: impl Into<String>) {
        self.with(|s| s.failures.insert(call, message.into()));
    }

    /// Every `getDelegator` read issued so far.
    pub fn delegator_reads(&self) -> Vec<(Address, BondingManagerVersion, Option<u64>)> {
        self.with(|s| s.delegator_reads.clone())
    }

    /// Every `pendingStake` read issued so far.
    pub fn pending_stake_reads(&self) -> Vec<(Address, u64)> {
        self.with(|s| s.pending_stake_reads.clone())
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn current_round(&self, block: Option<u64>) -> Result<u64> {
        self.check("currentRound")?;
        Ok(self.with(|s| {
            block
                .and_then(|block| s.rounds_from_block.range(..=block).next_back().map(|(_, r)| *r))
                .unwrap_or(s.current_round)
        }))
    }

    async fn current_round_initialized(&self) -> Result<bool> {
        self.check("currentRoundInitialized")?;
        Ok(self.with(|s| s.round_initialized))
    }

    async fn current_round_start_block(&self) -> Result<u64> {
        self.check("currentRoundStartBlock")?;
        Ok(self.with(|s| s.round_start_block))
    }

    async fn last_initialized_round(&self) -> Result<u64> {
        self.check("lastInitializedRound")?;
        Ok(self.with(|s| s.last_initialized_round))
    }

    async fn round_length(&self) -> Result<u64> {
        self.check("roundLength")?;
        Ok(self.with(|s| s.round_length))
    }

    async fn get_delegator(
        &self,
        delegator: Address,
        version: BondingManagerVersion,
        block: Option<u64>,
    ) -> Result<DelegatorData> {
        self.check("getDelegator")?;
        Ok(self.with(|s| {
            s.delegator_reads.push((delegator, version, block));
            block
                .and_then(|block| s.delegators_at_block.get(&(delegator, block)))
                .or_else(|| s.delegators.get(&delegator))
                .cloned()
                .unwrap_or_default()
        }))
    }

    async fn delegator_status(&self, delegator: Address) -> Result<u8> {
        self.check("delegatorStatus")?;
        Ok(self.with(|s| s.delegator_statuses.get(&delegator).copied().unwrap_or_default()))
    }

    async fn get_delegator_unbonding_lock(
        &self,
        delegator: Address,
        unbonding_lock_id: u64,
    ) -> Result<UnbondingLockData> {
        self.check("getDelegatorUnbondingLock")?;
        Ok(self.with(|s| s.locks.get(&(delegator, unbonding_lock_id)).cloned().unwrap_or_default()))
    }

    async fn pending_stake(&self, delegator: Address, end_round: u64) -> Result<U256> {
        self.check("pendingStake")?;
        Ok(self.with(|s| {
            s.pending_stake_reads.push((delegator, end_round));
            s.pending_stake.get(&delegator).copied().unwrap_or_default()
        }))
    }

    async fn pending_fees(&self, delegator: Address, _end_round: u64) -> Result<U256> {
        self.check("pendingFees")?;
        Ok(self.with(|s| s.pending_fees.get(&delegator).copied().unwrap_or_default()))
    }

    async fn get_transcoder(&self, transcoder: Address, _block: Option<u64>) -> Result<TranscoderData> {
        self.check("getTranscoder")?;
        Ok(self.with(|s| s.transcoders.get(&transcoder).cloned().unwrap_or_default()))
    }

    async fn get_transcoder_earnings_pool_for_round(
        &self,
        transcoder: Address,
        round: u64,
        version: BondingManagerVersion,
        _block: Option<u64>,
    ) -> Result<EarningsPool> {
        self.check("getTranscoderEarningsPoolForRound")?;
        let mut pool =
            self.with(|s| s.earnings_pools.get(&(transcoder, round)).cloned().unwrap_or_default());
        if version != BondingManagerVersion::Streamflow {
            pool.transcoder_reward_pool = U256::ZERO;
        }
        Ok(pool)
    }

    async fn transcoder_status(&self, transcoder: Address) -> Result<u8> {
        self.check("transcoderStatus")?;
        Ok(self.with(|s| s.transcoder_statuses.get(&transcoder).copied().unwrap_or_default()))
    }

    async fn transcoder_total_stake(&self, transcoder: Address) -> Result<U256> {
        self.check("transcoderTotalStake")?;
        Ok(self.with(|s| s.total_stakes.get(&transcoder).copied().unwrap_or_default()))
    }

    async fn is_active_transcoder(&self, transcoder: Address) -> Result<bool> {
        self.check("isActiveTranscoder")?;
        Ok(self.with(|s| s.active.contains(&transcoder)))
    }

    async fn first_transcoder_in_pool(&self) -> Result<Address> {
        self.check("getFirstTranscoderInPool")?;
        Ok(self.with(|s| s.pool.first().copied().unwrap_or(Address::ZERO)))
    }

    async fn next_transcoder_in_pool(&self, transcoder: Address) -> Result<Address> {
        self.check("getNextTranscoderInPool")?;
        Ok(self.with(|s| {
            let idx = s.pool.iter().position(|t| *t == transcoder);
            idx.and_then(|i| s.pool.get(i + 1)).copied().unwrap_or(Address::ZERO)
        }))
    }

    async fn bonding_manager_allowance(&self, owner: Address) -> Result<U256> {
        self.check("allowance")?;
        Ok(self.with(|s| s.allowances.get(&owner).copied().unwrap_or_default()))
    }
}

/// In-memory [ChainWriter] that mines every transaction after a configurable number of polls.
pub struct MockWriter {
    deployment: Deployment,
    polls_before_mined: u32,
    status: bool,
    fail_send: Option<String>,
    sent: Mutex<Vec<(BondingCall, TxOptions)>>,
    polls: Mutex<HashMap<TxHash, u32>>,
    total_polls: AtomicU32,
}

impl Default for MockWriter {
    fn default() -> Self {
        Self {
            deployment: test_deployment(),
            polls_before_mined: 0,
            status: true,
            fail_send: None,
            sent: Mutex::default(),
            polls: Mutex::default(),
            total_polls: AtomicU32::new(0),
        }
    }
}

impl MockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the transaction as pending for the first `polls` receipt requests.
    pub fn with_polls_before_mined(self, polls: u32) -> Self {
        Self { polls_before_mined: polls, ..self }
    }

    /// Never mine any transaction.
    pub fn never_mined(self) -> Self {
        self.with_polls_before_mined(u32::MAX)
    }

    /// Mine every transaction with a failure status.
    pub fn reverting(self) -> Self {
        Self { status: false, ..self }
    }

    /// Reject every broadcast with `message`.
    pub fn failing_send(self, message: impl Into<String>) -> Self {
        Self { fail_send: Some(message.into()), ..self }
    }

    /// Calls broadcast so far, in order.
    pub fn sent(&self) -> Vec<(BondingCall, TxOptions)> {
        self.sent.lock().unwrap().clone()
    }

    /// Receipt requests served so far, across all transactions.
    pub fn total_polls(&self) -> u32 {
        self.total_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainWriter for MockWriter {
    async fn send_transaction(&self, call: &BondingCall, options: &TxOptions) -> Result<TxHash> {
        if let Some(message) = &self.fail_send {
            bail!(message.clone());
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((call.clone(), options.clone()));
        Ok(keccak256((sent.len() as u64).to_be_bytes()))
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<Receipt>> {
        self.total_polls.fetch_add(1, Ordering::SeqCst);
        let mut polls = self.polls.lock().unwrap();
        let seen = polls.entry(tx_hash).or_default();
        if *seen < self.polls_before_mined {
            *seen += 1;
            return Ok(None);
        }
        Ok(Some(Receipt {
            transaction_hash: tx_hash,
            block_number: Some(1),
            gas_used: 21_000,
            status: self.status,
        }))
    }

    fn target(&self, call: &BondingCall) -> Address {
        call.target(&self.deployment)
    }
}

/// [AddressResolver] whose backend is unreachable.
pub struct FailingResolver;

#[async_trait]
impl AddressResolver for FailingResolver {
    async fn resolve(&self, _name: &str) -> Result<Address, ResolveError> {
        Err(anyhow::anyhow!("resolver unreachable").into())
    }
}
