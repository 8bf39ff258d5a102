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

//! Simulation of the ordered active transcoder set.
//!
//! The bonding manager keeps transcoders in a sorted linked list and accepts the neighbours of a
//! transcoder's new position as hints, so it does not have to walk the list on chain.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTranscoder {
    pub address: Address,
    pub total_stake: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeAction {
    /// Bond `amount` to `new_delegate`, moving away from `old_delegate` if it differs.
    Stake,
    /// Unbond `amount` from `old_delegate`.
    Unstake,
}

/// Neighbours of a transcoder in the list. [Address::ZERO] marks either end of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub new_pos_prev: Address,
    pub new_pos_next: Address,
}

impl Default for Hint {
    fn default() -> Self {
        Self { new_pos_prev: Address::ZERO, new_pos_next: Address::ZERO }
    }
}

/// Hints for both list updates performed by a bond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondHints {
    pub old_delegate: Hint,
    pub curr_delegate: Hint,
}

fn add_stake(set: &mut [ActiveTranscoder], address: Address, amount: U256) {
    if let Some(t) = set.iter_mut().find(|t| t.address == address) {
        t.total_stake = t.total_stake.saturating_add(amount);
    }
}

fn sub_stake(set: &mut [ActiveTranscoder], address: Address, amount: U256) {
    if let Some(t) = set.iter_mut().find(|t| t.address == address) {
        t.total_stake = t.total_stake.saturating_sub(amount);
    }
}

/// Order of `active_set` after applying `action` with `amount`.
///
/// Transcoders outside the set are ignored. The result is sorted by descending total stake;
/// transcoders with equal stake keep their relative order.
pub fn simulate(
    action: StakeAction,
    active_set: &[ActiveTranscoder],
    amount: U256,
    new_delegate: Option<Address>,
    old_delegate: Option<Address>,
) -> Vec<ActiveTranscoder> {
    let mut set = active_set.to_vec();

    match action {
        StakeAction::Stake => {
            if let Some(new_delegate) = new_delegate {
                add_stake(&mut set, new_delegate, amount);
                if let Some(old_delegate) = old_delegate.filter(|old| *old != new_delegate) {
                    sub_stake(&mut set, old_delegate, amount);
                }
            }
        }
        StakeAction::Unstake => {
            if let Some(old_delegate) = old_delegate {
                sub_stake(&mut set, old_delegate, amount);
            }
        }
    }

    // sort_by is stable
    set.sort_by(|lhs, rhs| rhs.total_stake.cmp(&lhs.total_stake));
    set
}

/// Neighbours of `operator` in `ordered`. Both ends are [Address::ZERO] when the operator is
/// absent.
pub fn get_hint(operator: Option<Address>, ordered: &[ActiveTranscoder]) -> Hint {
    let Some(idx) = operator.and_then(|op| ordered.iter().position(|t| t.address == op)) else {
        return Hint::default();
    };

    Hint {
        new_pos_prev: idx.checked_sub(1).map(|i| ordered[i].address).unwrap_or(Address::ZERO),
        new_pos_next: ordered.get(idx + 1).map(|t| t.address).unwrap_or(Address::ZERO),
    }
}

/// Hints for bonding `amount` to `new_delegate` by a delegator currently bonded to
/// `old_delegate`.
pub fn bond_hints(
    active_set: &[ActiveTranscoder],
    amount: U256,
    new_delegate: Address,
    old_delegate: Option<Address>,
) -> BondHints {
    let ordered =
        simulate(StakeAction::Stake, active_set, amount, Some(new_delegate), old_delegate);
    BondHints {
        old_delegate: get_hint(old_delegate, &ordered),
        curr_delegate: get_hint(Some(new_delegate), &ordered),
    }
}
