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

//! Submission of state-changing calls and confirmation polling.

use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, TxHash, U256},
    sol_types::SolCall,
};
use serde::{Deserialize, Serialize};

use crate::{
    active_set::{BondHints, Hint},
    chain::{ChainWriterObj, Receipt},
    contracts::{IBondingManager, ILivepeerToken, IRoundsManager},
    deployments::Deployment,
    errors::{BondingError, ConfirmationFailure},
};

/// Interval between two receipt polls.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// A state-changing protocol call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondingCall {
    Bond { amount: U256, to: Address },
    BondWithHint { amount: U256, to: Address, hints: BondHints },
    Unbond { amount: U256 },
    UnbondWithHint { amount: U256, hint: Hint },
    Rebond { unbonding_lock_id: u64 },
    RebondWithHint { unbonding_lock_id: u64, hint: Hint },
    RebondFromUnbonded { to: Address, unbonding_lock_id: u64 },
    RebondFromUnbondedWithHint { to: Address, unbonding_lock_id: u64, hint: Hint },
    WithdrawStake { unbonding_lock_id: u64 },
    WithdrawFees,
    ClaimEarnings { end_round: u64 },
    /// Token approval for `spender`.
    Approve { spender: Address, amount: U256 },
    InitializeRound,
}

impl BondingCall {
    /// Solidity name of the called function.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bond { .. } => IBondingManager::bondCall::SIGNATURE,
            Self::BondWithHint { .. } => IBondingManager::bondWithHintCall::SIGNATURE,
            Self::Unbond { .. } => IBondingManager::unbondCall::SIGNATURE,
            Self::UnbondWithHint { .. } => IBondingManager::unbondWithHintCall::SIGNATURE,
            Self::Rebond { .. } => IBondingManager::rebondCall::SIGNATURE,
            Self::RebondWithHint { .. } => IBondingManager::rebondWithHintCall::SIGNATURE,
            Self::RebondFromUnbonded { .. } => IBondingManager::rebondFromUnbondedCall::SIGNATURE,
            Self::RebondFromUnbondedWithHint { .. } => {
                IBondingManager::rebondFromUnbondedWithHintCall::SIGNATURE
            }
            Self::WithdrawStake { .. } => IBondingManager::withdrawStakeCall::SIGNATURE,
            Self::WithdrawFees => IBondingManager::withdrawFeesCall::SIGNATURE,
            Self::ClaimEarnings { .. } => IBondingManager::claimEarningsCall::SIGNATURE,
            Self::Approve { .. } => ILivepeerToken::approveCall::SIGNATURE,
            Self::InitializeRound => IRoundsManager::initializeRoundCall::SIGNATURE,
        }
    }

    /// ABI encoded input of the call.
    pub fn calldata(&self) -> Bytes {
        match *self {
            Self::Bond { amount, to } => IBondingManager::bondCall { amount, to }.abi_encode(),
            Self::BondWithHint { amount, to, hints } => IBondingManager::bondWithHintCall {
                amount,
                to,
                oldDelegateNewPosPrev: hints.old_delegate.new_pos_prev,
                oldDelegateNewPosNext: hints.old_delegate.new_pos_next,
                currDelegateNewPosPrev: hints.curr_delegate.new_pos_prev,
                currDelegateNewPosNext: hints.curr_delegate.new_pos_next,
            }
            .abi_encode(),
            Self::Unbond { amount } => IBondingManager::unbondCall { amount }.abi_encode(),
            Self::UnbondWithHint { amount, hint } => IBondingManager::unbondWithHintCall {
                amount,
                newPosPrev: hint.new_pos_prev,
                newPosNext: hint.new_pos_next,
            }
            .abi_encode(),
            Self::Rebond { unbonding_lock_id } => {
                IBondingManager::rebondCall { unbondingLockId: U256::from(unbonding_lock_id) }
                    .abi_encode()
            }
            Self::RebondWithHint { unbonding_lock_id, hint } => IBondingManager::rebondWithHintCall {
                unbondingLockId: U256::from(unbonding_lock_id),
                newPosPrev: hint.new_pos_prev,
                newPosNext: hint.new_pos_next,
            }
            .abi_encode(),
            Self::RebondFromUnbonded { to, unbonding_lock_id } => {
                IBondingManager::rebondFromUnbondedCall {
                    to,
                    unbondingLockId: U256::from(unbonding_lock_id),
                }
                .abi_encode()
            }
            Self::RebondFromUnbondedWithHint { to, unbonding_lock_id, hint } => {
                IBondingManager::rebondFromUnbondedWithHintCall {
                    to,
                    unbondingLockId: U256::from(unbonding_lock_id),
                    newPosPrev: hint.new_pos_prev,
                    newPosNext: hint.new_pos_next,
                }
                .abi_encode()
            }
            Self::WithdrawStake { unbonding_lock_id } => IBondingManager::withdrawStakeCall {
                unbondingLockId: U256::from(unbonding_lock_id),
            }
            .abi_encode(),
            Self::WithdrawFees => IBondingManager::withdrawFeesCall {}.abi_encode(),
            Self::ClaimEarnings { end_round } => {
                IBondingManager::claimEarningsCall { endRound: U256::from(end_round) }.abi_encode()
            }
            Self::Approve { spender, amount } => {
                ILivepeerToken::approveCall { spender, value: amount }.abi_encode()
            }
            Self::InitializeRound => IRoundsManager::initializeRoundCall {}.abi_encode(),
        }
        .into()
    }

    /// Contract the call is sent to.
    pub fn target(&self, deployment: &Deployment) -> Address {
        match self {
            Self::Approve { .. } => deployment.token_address,
            Self::InitializeRound => deployment.rounds_manager_address,
            _ => deployment.bonding_manager_address,
        }
    }
}

/// Options of a submitted transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOptions {
    /// Sender, or the default account of the writer.
    pub from: Option<Address>,
    /// Gas limit, or an estimate of the writer.
    pub gas: Option<u64>,
    /// Return as soon as the transaction is broadcast.
    pub fire_and_forget: bool,
}

/// Outcome of [TxSubmitter::submit].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Submission {
    /// Broadcast without waiting for confirmation.
    Sent(TxHash),
    /// Mined successfully.
    Confirmed(Receipt),
}

impl Submission {
    pub fn tx_hash(&self) -> TxHash {
        match self {
            Self::Sent(tx_hash) => *tx_hash,
            Self::Confirmed(receipt) => receipt.transaction_hash,
        }
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        match self {
            Self::Sent(_) => None,
            Self::Confirmed(receipt) => Some(receipt),
        }
    }
}

/// Submits calls through a [crate::ChainWriter] and waits for their receipts.
#[derive(Clone)]
pub struct TxSubmitter {
    writer: ChainWriterObj,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl TxSubmitter {
    pub fn new(writer: ChainWriterObj) -> Self {
        Self { writer, poll_interval: RECEIPT_POLL_INTERVAL, timeout: None }
    }

    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self { poll_interval, ..self }
    }

    /// Give up waiting for a receipt after `timeout`. The transaction itself is not cancelled.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout: Some(timeout), ..self }
    }

    /// Broadcast `call` and, unless `options.fire_and_forget` is set, wait until it is mined.
    ///
    /// Broadcasting is never retried. A transaction mined with a failure status is returned as
    /// [BondingError::Confirmation].
    pub async fn submit(
        &self,
        call: BondingCall,
        options: &TxOptions,
    ) -> Result<Submission, BondingError> {
        let tx_hash = self
            .writer
            .send_transaction(&call, options)
            .await
            .map_err(BondingError::chain_read(call.name()))?;
        tracing::debug!(%tx_hash, call = call.name(), "Sent transaction");

        if options.fire_and_forget {
            return Ok(Submission::Sent(tx_hash));
        }

        let receipt = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.wait_for_receipt(tx_hash))
                .await
                .map_err(|_| {
                    tracing::warn!(%tx_hash, ?timeout, "Timed out waiting for receipt");
                    BondingError::Timeout(tx_hash)
                })??,
            None => self.wait_for_receipt(tx_hash).await?,
        };

        if !receipt.status {
            let to = self.writer.target(&call);
            let calldata = call.calldata();
            return Err(BondingError::Confirmation(Box::new(ConfirmationFailure {
                receipt,
                call,
                to,
                calldata,
            })));
        }

        tracing::info!(%tx_hash, gas_used = receipt.gas_used, "Transaction confirmed");
        Ok(Submission::Confirmed(receipt))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt, BondingError> {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            // The first tick completes immediately.
            interval.tick().await;
            let receipt = self
                .writer
                .transaction_receipt(tx_hash)
                .await
                .map_err(BondingError::chain_read("getTransactionReceipt"))?;
            match receipt {
                Some(receipt) => return Ok(receipt),
                None => tracing::trace!(%tx_hash, "Transaction not mined yet"),
            }
        }
    }
}
