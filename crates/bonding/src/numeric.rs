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

//! Fixed-point percentage and pro-rata arithmetic.
//!
//! Every helper multiplies before dividing so results truncate exactly like the on-chain integer
//! math they mirror.

use alloy::primitives::U256;

use crate::errors::BondingError;

/// Denominator of every percentage expressed in points, e.g. a reward cut of `5000` is 50%.
pub const PERC_DIVISOR: U256 = U256::from_limbs([10_000, 0, 0, 0]);

/// `amount * frac_num / PERC_DIVISOR`
pub fn perc_of(amount: U256, frac_num: U256) -> Result<U256, BondingError> {
    perc_of_with_denom(amount, frac_num, PERC_DIVISOR)
}

/// `amount * frac_num / frac_denom`, or zero when the denominator is zero.
pub fn perc_of_with_denom(
    amount: U256,
    frac_num: U256,
    frac_denom: U256,
) -> Result<U256, BondingError> {
    if frac_denom.is_zero() {
        return Ok(U256::ZERO);
    }
    let product = amount.checked_mul(frac_num).ok_or(BondingError::Overflow)?;
    Ok(product / frac_denom)
}
