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

//! State-changing protocol calls.

use alloy::primitives::{Address, U256};

use crate::{
    active_set::{BondHints, Hint},
    chain::ChainReaderObj,
    deployments::Deployment,
    errors::BondingError,
    submit::{BondingCall, Submission, TxOptions, TxSubmitter},
    types::UnbondingLock,
    unbonding::check_withdrawable,
};

/// Mutation API of the bonding protocol.
///
/// Every call returns a [Submission]: the transaction hash when `fire_and_forget` is set,
/// otherwise the receipt of the mined transaction.
#[derive(Clone)]
pub struct BondingClient {
    chain: ChainReaderObj,
    submitter: TxSubmitter,
    deployment: Deployment,
}

impl BondingClient {
    pub fn new(chain: ChainReaderObj, submitter: TxSubmitter, deployment: Deployment) -> Self {
        Self { chain, submitter, deployment }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    async fn submit(
        &self,
        call: BondingCall,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submitter.submit(call, options).await
    }

    /// Allow the bonding manager to transfer `amount` tokens of the sender.
    pub async fn approve_bond_amount(
        &self,
        amount: U256,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        let spender = self.deployment.bonding_manager_address;
        self.submit(BondingCall::Approve { spender, amount }, options).await
    }

    pub async fn bond(
        &self,
        amount: U256,
        to: Address,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submit(BondingCall::Bond { amount, to }, options).await
    }

    pub async fn bond_with_hint(
        &self,
        amount: U256,
        to: Address,
        hints: BondHints,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submit(BondingCall::BondWithHint { amount, to, hints }, options).await
    }

    pub async fn unbond(&self, amount: U256, options: &TxOptions) -> Result<Submission, BondingError> {
        self.submit(BondingCall::Unbond { amount }, options).await
    }

    pub async fn unbond_with_hint(
        &self,
        amount: U256,
        hint: Hint,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submit(BondingCall::UnbondWithHint { amount, hint }, options).await
    }

    pub async fn rebond(
        &self,
        unbonding_lock_id: u64,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submit(BondingCall::Rebond { unbonding_lock_id }, options).await
    }

    pub async fn rebond_with_hint(
        &self,
        unbonding_lock_id: u64,
        hint: Hint,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submit(BondingCall::RebondWithHint { unbonding_lock_id, hint }, options).await
    }

    /// Rebond an unbonding lock of a fully unbonded delegator to `to`.
    pub async fn rebond_from_unbonded(
        &self,
        to: Address,
        unbonding_lock_id: u64,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submit(BondingCall::RebondFromUnbonded { to, unbonding_lock_id }, options).await
    }

    pub async fn rebond_from_unbonded_with_hint(
        &self,
        to: Address,
        unbonding_lock_id: u64,
        hint: Hint,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submit(BondingCall::RebondFromUnbondedWithHint { to, unbonding_lock_id, hint }, options)
            .await
    }

    pub async fn withdraw_stake(
        &self,
        unbonding_lock_id: u64,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submit(BondingCall::WithdrawStake { unbonding_lock_id }, options).await
    }

    /// Withdraw `lock` after checking against the current round that it can be withdrawn, so an
    /// early or empty withdrawal never reaches the chain.
    pub async fn withdraw_stake_with_lock(
        &self,
        lock: &UnbondingLock,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        let current_round = self
            .chain
            .current_round(None)
            .await
            .map_err(BondingError::chain_read("currentRound"))?;
        check_withdrawable(lock, current_round)?;
        self.withdraw_stake(lock.id, options).await
    }

    pub async fn withdraw_fees(&self, options: &TxOptions) -> Result<Submission, BondingError> {
        self.submit(BondingCall::WithdrawFees, options).await
    }

    /// Claim rewards and fees of the sender up to `end_round`.
    pub async fn claim_earnings(
        &self,
        end_round: u64,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        self.submit(BondingCall::ClaimEarnings { end_round }, options).await
    }

    pub async fn initialize_round(&self, options: &TxOptions) -> Result<Submission, BondingError> {
        self.submit(BondingCall::InitializeRound, options).await
    }
}
