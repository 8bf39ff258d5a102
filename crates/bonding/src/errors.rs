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

//! Error types returned by the accounting engine.

use alloy::primitives::{Address, Bytes};
use thiserror::Error;

use crate::{chain::Receipt, submit::BondingCall};

#[derive(Error, Debug)]
pub enum BondingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    InvalidState(#[from] InvalidState),

    #[error("Error: {call}: {source:#}")]
    ChainRead {
        call: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("transaction {} reverted", .0.receipt.transaction_hash)]
    Confirmation(Box<ConfirmationFailure>),

    #[error("timed out waiting for receipt of transaction {0}")]
    Timeout(alloy::primitives::TxHash),

    #[error("record store error: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("arithmetic overflow")]
    Overflow,
}

impl BondingError {
    /// Wrap a collaborator read failure with the name of the call that issued it.
    pub fn chain_read(call: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::ChainRead { call, source }
    }

    pub fn delegator_not_found(address: Address) -> Self {
        Self::NotFound(format!("delegator {address:#x}"))
    }
}

/// Operations rejected because of the current protocol state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidState {
    #[error("delegator must wait through unbonding period (withdraw round {withdraw_round}, current round {current_round})")]
    UnbondingPeriodNotElapsed { withdraw_round: u64, current_round: u64 },

    #[error("delegator does not have anything to withdraw")]
    NothingToWithdraw,
}

/// A transaction that was mined with a failure status.
#[derive(Debug, Clone)]
pub struct ConfirmationFailure {
    pub receipt: Receipt,
    /// The call that was submitted.
    pub call: BondingCall,
    /// Target contract of the call.
    pub to: Address,
    /// ABI encoded input of the submitted transaction.
    pub calldata: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_is_reported_once() {
        let err = anyhow::Error::from(BondingError::from(InvalidState::NothingToWithdraw));
        assert_eq!(format!("{err:#}"), "delegator does not have anything to withdraw");
    }
}
