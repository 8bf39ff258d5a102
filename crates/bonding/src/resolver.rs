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

//! Resolution of human readable names to addresses.

use std::{collections::HashMap, str::FromStr};

use alloy::primitives::Address;
use async_trait::async_trait;
use thiserror::Error;

use crate::errors::BondingError;

#[derive(Error, Debug)]
pub enum ResolveError {
    /// The name has no address record.
    #[error("name not defined: {0}")]
    NotDefined(String),

    #[error("resolver error: {0:#}")]
    Other(#[from] anyhow::Error),
}

/// Name service collaborator.
#[async_trait]
pub trait AddressResolver {
    async fn resolve(&self, name: &str) -> Result<Address, ResolveError>;
}

/// [AddressResolver] over a fixed map of names.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    names: HashMap<String, Address>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>, address: Address) -> Self {
        self.names.insert(name.into(), address);
        self
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, name: &str) -> Result<Address, ResolveError> {
        self.names.get(name).copied().ok_or_else(|| ResolveError::NotDefined(name.to_string()))
    }
}

// Only `0x` followed by 40 hex digits is an address. Anything else goes to the resolver.
fn parse_prefixed_address(input: &str) -> Option<Address> {
    let hex = input.strip_prefix("0x")?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Address::from_str(input).ok()
}

/// Resolve `address_or_name`. Input of the form `0x` followed by 40 hex digits is returned as is without asking
/// the resolver, and a name without a record resolves to `None`.
pub async fn resolve_address<R>(
    resolver: &R,
    address_or_name: &str,
) -> Result<Option<Address>, BondingError>
where
    R: AddressResolver + ?Sized,
{
    if let Some(address) = parse_prefixed_address(address_or_name) {
        return Ok(Some(address));
    }

    match resolver.resolve(address_or_name).await {
        Ok(address) => Ok(Some(address)),
        Err(ResolveError::NotDefined(name)) => {
            tracing::debug!(%name, "Name not defined");
            Ok(None)
        }
        Err(ResolveError::Other(source)) => {
            Err(BondingError::ChainRead { call: "resolveName", source })
        }
    }
}
