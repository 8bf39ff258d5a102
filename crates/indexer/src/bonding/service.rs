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

use std::sync::Arc;

use alloy::{
    providers::{
        fillers::{ChainIdFiller, FillProvider, JoinFill},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::client::RpcClient,
    transports::layers::RetryBackoffLayer,
};
use alloy_chains::NamedChain;
use anyhow::{Context, Result};
use bonding_ledger::{
    fetch_bonding_events, BondingStoreObj, Deployment, ProviderChain, LOG_QUERY_CHUNK_SIZE,
    MAINNET_FROM_BLOCK,
};
use tokio::time::Duration;
use url::Url;

use super::BondingEventProcessor;
use crate::db::SqlStore;

#[derive(Clone)]
pub struct BondingIndexerServiceConfig {
    pub interval: Duration,
    pub retries: u32,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
}

type ProviderType = FillProvider<JoinFill<Identity, ChainIdFiller>, RootProvider>;

pub struct BondingIndexerService {
    provider: ProviderType,
    deployment: Deployment,
    store: BondingStoreObj,
    processor: BondingEventProcessor,
    config: BondingIndexerServiceConfig,
    chain_id: u64,
}

impl BondingIndexerService {
    pub async fn new(
        rpc_url: Url,
        deployment: Deployment,
        db_conn: &str,
        config: BondingIndexerServiceConfig,
    ) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .filler(ChainIdFiller::default())
            .connect_client(
                RpcClient::builder().layer(RetryBackoffLayer::new(3, 1000, 200)).http(rpc_url),
            );
        let chain_id = provider.get_chain_id().await?;
        let store: BondingStoreObj = Arc::new(SqlStore::new(db_conn).await?);
        let chain = Arc::new(ProviderChain::new(provider.clone(), deployment.clone()));
        let processor = BondingEventProcessor::new(chain, store.clone());

        Ok(Self { provider, deployment, store, processor, config, chain_id })
    }

    fn default_start_block(&self) -> u64 {
        match NamedChain::try_from(self.chain_id) {
            Ok(NamedChain::Mainnet) => MAINNET_FROM_BLOCK,
            _ => 0,
        }
    }

    /// Index every block between the cursor and the chain head (or the configured end block).
    pub async fn run(&mut self) -> Result<()> {
        let start_time = std::time::Instant::now();
        tracing::info!("Starting bonding indexer run");

        let from_block = match self.store.last_processed_block().await? {
            Some(block) => block + 1,
            None => self.config.start_block.unwrap_or_else(|| self.default_start_block()),
        };
        let head = self.provider.get_block_number().await.context("Failed to get block number")?;
        let to_block = self.config.end_block.map_or(head, |end| end.min(head));

        if from_block > to_block {
            tracing::info!(from_block, to_block, "No new blocks to index");
            return Ok(());
        }

        let mut chunk_from = from_block;
        while chunk_from <= to_block {
            let chunk_to = chunk_from.saturating_add(LOG_QUERY_CHUNK_SIZE - 1).min(to_block);

            let events =
                fetch_bonding_events(&self.provider, &self.deployment, chunk_from, chunk_to).await?;
            for event in &events {
                self.processor.process(event).await.with_context(|| {
                    format!(
                        "Failed to process event at block {} log {}",
                        event.block_number, event.log_index
                    )
                })?;
            }
            self.store.set_last_processed_block(chunk_to).await?;
            tracing::info!(
                from = chunk_from,
                to = chunk_to,
                events = events.len(),
                "Indexed block range"
            );

            chunk_from = chunk_to + 1;
        }

        tracing::info!("Bonding indexer run completed in {:?}", start_time.elapsed());
        Ok(())
    }
}
