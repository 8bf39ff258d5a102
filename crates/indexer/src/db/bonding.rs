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

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use bonding_ledger::{
    types::{lock_key, share_key},
    BondingStore, DelegatorRecord, EarningsPoolKey, EventPosition, Share, UnbondingLock,
};
use sqlx::{any::AnyPoolOptions, any::AnyRow, AnyPool, Any, Row, Transaction};

use super::DbError;

const LAST_BLOCK_KEY: &str = "last_processed_block";
const LAST_EVENT_KEY: &str = "last_processed_event";

/// Convert a U256 to a zero-padded string for proper database sorting
/// U256 max value has 78 decimal digits (2^256 ≈ 1.15 * 10^77)
fn pad_u256(value: U256) -> String {
    format!("{:0>78}", value)
}

/// Convert a zero-padded string back to U256
fn unpad_u256(s: &str) -> Result<U256, DbError> {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str(trimmed).map_err(|_| DbError::BadRecord(format!("Invalid U256 string: {s}")))
}

fn address_to_db(address: Address) -> String {
    format!("{address:#x}")
}

fn address_from_db(s: &str) -> Result<Address, DbError> {
    Address::from_str(s).map_err(|e| DbError::BadRecord(e.to_string()))
}

fn delegator_from_row(row: &AnyRow) -> Result<DelegatorRecord, DbError> {
    let delegate: Option<String> = row.try_get("delegate")?;
    Ok(DelegatorRecord {
        address: address_from_db(&row.try_get::<String, _>("address")?)?,
        delegate: delegate.as_deref().map(address_from_db).transpose()?,
        bonded_amount: unpad_u256(&row.try_get::<String, _>("bonded_amount")?)?,
        pending_stake: unpad_u256(&row.try_get::<String, _>("pending_stake")?)?,
        last_claim_round: row.try_get::<i64, _>("last_claim_round")? as u64,
        start_round: row.try_get::<i64, _>("start_round")? as u64,
        next_unbonding_lock_id: row.try_get::<i64, _>("next_unbonding_lock_id")? as u64,
    })
}

/// [BondingStore] over SQLite or Postgres.
pub struct SqlStore {
    pool: AnyPool,
}

impl SqlStore {
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(20).connect(database_url).await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    async fn upsert_delegator_in(
        tx: &mut Transaction<'_, Any>,
        record: &DelegatorRecord,
    ) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO delegators
            (address, delegate, bonded_amount, pending_stake, last_claim_round, start_round, next_unbonding_lock_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, CURRENT_TIMESTAMP)
            ON CONFLICT (address)
            DO UPDATE SET
                delegate = EXCLUDED.delegate,
                bonded_amount = EXCLUDED.bonded_amount,
                pending_stake = EXCLUDED.pending_stake,
                last_claim_round = EXCLUDED.last_claim_round,
                start_round = EXCLUDED.start_round,
                next_unbonding_lock_id = EXCLUDED.next_unbonding_lock_id,
                updated_at = CURRENT_TIMESTAMP
        "#;

        sqlx::query(query)
            .bind(address_to_db(record.address))
            .bind(record.delegate.map(address_to_db))
            .bind(pad_u256(record.bonded_amount))
            .bind(pad_u256(record.pending_stake))
            .bind(record.last_claim_round as i64)
            .bind(record.start_round as i64)
            .bind(record.next_unbonding_lock_id as i64)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn state(&self, key: &str) -> Result<Option<String>, DbError> {
        let query = "SELECT value FROM indexer_state WHERE key = $1";
        let row = sqlx::query(query).bind(key).fetch_optional(&self.pool).await?;
        Ok(row.map(|row| row.try_get::<String, _>("value")).transpose()?)
    }

    async fn set_state(&self, key: &str, value: String) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO indexer_state (key, value, updated_at)
            VALUES ($1, $2, CURRENT_TIMESTAMP)
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = CURRENT_TIMESTAMP
        "#;

        sqlx::query(query).bind(key).bind(value).execute(&self.pool).await?;
        Ok(())
    }

    async fn put_share_in(tx: &mut Transaction<'_, Any>, share: &Share) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO shares (id, delegator, round, transcoder, reward_tokens, updated_at)
            VALUES ($1, $2, $3, $4, $5, CURRENT_TIMESTAMP)
            ON CONFLICT (id)
            DO UPDATE SET
                transcoder = EXCLUDED.transcoder,
                reward_tokens = EXCLUDED.reward_tokens,
                updated_at = CURRENT_TIMESTAMP
        "#;

        sqlx::query(query)
            .bind(share.key())
            .bind(address_to_db(share.delegator))
            .bind(share.round as i64)
            .bind(address_to_db(share.pool.transcoder))
            .bind(pad_u256(share.reward_tokens))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BondingStore for SqlStore {
    async fn delegator(&self, address: Address) -> anyhow::Result<Option<DelegatorRecord>> {
        let query = r#"
            SELECT address, delegate, bonded_amount, pending_stake, last_claim_round, start_round, next_unbonding_lock_id
            FROM delegators
            WHERE address = $1
        "#;

        let row = sqlx::query(query)
            .bind(address_to_db(address))
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(row.as_ref().map(delegator_from_row).transpose()?)
    }

    async fn upsert_delegator(&self, record: &DelegatorRecord) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        Self::upsert_delegator_in(&mut tx, record).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn delegators_of(&self, transcoder: Address) -> anyhow::Result<Vec<Address>> {
        let query = "SELECT address FROM delegators WHERE delegate = $1 ORDER BY address";

        let rows = sqlx::query(query)
            .bind(address_to_db(transcoder))
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        let addresses = rows
            .iter()
            .map(|row| address_from_db(&row.try_get::<String, _>("address")?))
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(addresses)
    }

    async fn share(&self, delegator: Address, round: u64) -> anyhow::Result<Option<Share>> {
        let query = "SELECT delegator, round, transcoder, reward_tokens FROM shares WHERE id = $1";

        let row = sqlx::query(query)
            .bind(share_key(delegator, round))
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let round = row.try_get::<i64, _>("round").map_err(DbError::from)? as u64;
        let transcoder =
            address_from_db(&row.try_get::<String, _>("transcoder").map_err(DbError::from)?)?;
        Ok(Some(Share {
            delegator: address_from_db(
                &row.try_get::<String, _>("delegator").map_err(DbError::from)?,
            )?,
            round,
            pool: EarningsPoolKey { transcoder, round },
            reward_tokens: unpad_u256(
                &row.try_get::<String, _>("reward_tokens").map_err(DbError::from)?,
            )?,
        }))
    }

    async fn put_share(&self, share: &Share) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        Self::put_share_in(&mut tx, share).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn apply_share(&self, share: &Share, delegator: &DelegatorRecord) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        Self::put_share_in(&mut tx, share).await?;
        Self::upsert_delegator_in(&mut tx, delegator).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn unbonding_lock(
        &self,
        delegator: Address,
        id: u64,
    ) -> anyhow::Result<Option<UnbondingLock>> {
        let query = "SELECT lock_id, amount, withdraw_round FROM unbonding_locks WHERE id = $1";

        let row = sqlx::query(query)
            .bind(lock_key(delegator, id))
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(UnbondingLock {
            id: row.try_get::<i64, _>("lock_id").map_err(DbError::from)? as u64,
            delegator,
            amount: unpad_u256(&row.try_get::<String, _>("amount").map_err(DbError::from)?)?,
            withdraw_round: row.try_get::<i64, _>("withdraw_round").map_err(DbError::from)? as u64,
        }))
    }

    async fn put_unbonding_lock(
        &self,
        lock: &UnbondingLock,
        delegator: &DelegatorRecord,
    ) -> anyhow::Result<()> {
        let query = r#"
            INSERT INTO unbonding_locks (id, delegator, lock_id, amount, withdraw_round, updated_at)
            VALUES ($1, $2, $3, $4, $5, CURRENT_TIMESTAMP)
            ON CONFLICT (id)
            DO UPDATE SET
                amount = EXCLUDED.amount,
                withdraw_round = EXCLUDED.withdraw_round,
                updated_at = CURRENT_TIMESTAMP
        "#;

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        sqlx::query(query)
            .bind(lock.key())
            .bind(address_to_db(lock.delegator))
            .bind(lock.id as i64)
            .bind(pad_u256(lock.amount))
            .bind(lock.withdraw_round as i64)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;
        Self::upsert_delegator_in(&mut tx, delegator).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn last_processed_block(&self) -> anyhow::Result<Option<u64>> {
        let Some(value) = self.state(LAST_BLOCK_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(value.parse().map_err(|_| DbError::BadBlockNumb(value))?))
    }

    async fn set_last_processed_block(&self, block: u64) -> anyhow::Result<()> {
        self.set_state(LAST_BLOCK_KEY, block.to_string()).await?;
        Ok(())
    }

    async fn last_processed_event(&self) -> anyhow::Result<Option<EventPosition>> {
        let Some(value) = self.state(LAST_EVENT_KEY).await? else {
            return Ok(None);
        };
        let position = value
            .split_once(':')
            .and_then(|(block, log)| Some((block.parse().ok()?, log.parse().ok()?)))
            .map(|(block_number, log_index)| EventPosition { block_number, log_index })
            .ok_or_else(|| DbError::BadRecord(format!("Invalid event position: {value}")))?;
        Ok(Some(position))
    }

    async fn set_last_processed_event(&self, position: EventPosition) -> anyhow::Result<()> {
        let value = format!("{}:{}", position.block_number, position.log_index);
        self.set_state(LAST_EVENT_KEY, value).await?;
        Ok(())
    }
}
