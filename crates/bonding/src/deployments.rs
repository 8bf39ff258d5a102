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

use alloy::primitives::{address, Address};
use alloy_chains::NamedChain;
use clap::Args;
use derive_builder::Builder;

/// Addresses of the protocol contracts on one network.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Builder, Args)]
#[group(
    requires = "bonding_manager_address",
    requires = "rounds_manager_address",
    requires = "token_address"
)]
pub struct Deployment {
    /// EIP-155 chain ID of the network.
    #[clap(long, env)]
    #[builder(setter(into, strip_option), default)]
    pub chain_id: Option<u64>,

    /// Address of the controller contract that registers every other protocol contract.
    #[clap(long, env, required = false)]
    #[builder(setter(into), default)]
    pub controller_address: Address,

    /// Address of the [IBondingManager] contract.
    ///
    /// [IBondingManager]: crate::contracts::IBondingManager
    #[clap(long, env, required = false, long_help = "Address of the BondingManager contract")]
    #[builder(setter(into))]
    pub bonding_manager_address: Address,

    /// Address of the [IRoundsManager] contract.
    ///
    /// [IRoundsManager]: crate::contracts::IRoundsManager
    #[clap(long, env, required = false, long_help = "Address of the RoundsManager contract")]
    #[builder(setter(into))]
    pub rounds_manager_address: Address,

    /// Address of the bonded token contract.
    #[clap(long, env, required = false, long_help = "Address of the LivepeerToken contract")]
    #[builder(setter(into))]
    pub token_address: Address,
}

impl Deployment {
    /// Create a new [DeploymentBuilder].
    pub fn builder() -> DeploymentBuilder {
        Default::default()
    }

    /// Lookup the [Deployment] for a named chain.
    pub const fn from_chain(chain: NamedChain) -> Option<Deployment> {
        match chain {
            NamedChain::Mainnet => Some(MAINNET),
            _ => None,
        }
    }

    /// Lookup the [Deployment] by chain ID.
    pub fn from_chain_id(chain_id: impl Into<u64>) -> Option<Deployment> {
        let chain = NamedChain::try_from(chain_id.into()).ok()?;
        Self::from_chain(chain)
    }
}

/// [Deployment] for Ethereum mainnet.
pub const MAINNET: Deployment = Deployment {
    chain_id: Some(NamedChain::Mainnet as u64),
    controller_address: address!("0xf96d54e490317c557a967abfa5d6e33006be69b3"),
    bonding_manager_address: address!("0x511bc4556d823ae99630ae8de28b9b80df90ea2e"),
    rounds_manager_address: address!("0x3984fc4ceeef1739135476f625d36d6c35c40dc3"),
    token_address: address!("0x58b6a8a3302369daec383334672404ee733ab239"),
};
