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

//! Delegation and reward accounting for a bonded-stake protocol.
//!
//! Delegators bond stake to transcoders, transcoders distribute a per-round reward pool, and this
//! crate reconstructs the derived state of every account from chain events and contract reads.

// Declare modules
pub mod active_set;
pub mod chain;
pub mod client;
pub mod contracts;
pub mod deployments;
pub mod errors;
pub mod events;
pub mod numeric;
pub mod resolver;
pub mod rewards;
pub mod state;
pub mod store;
pub mod submit;
pub mod types;
pub mod unbonding;

// Re-export commonly used types
pub use active_set::{bond_hints, get_hint, simulate, ActiveTranscoder, BondHints, Hint, StakeAction};
pub use chain::{
    ChainReader, ChainReaderObj, ChainWriter, ChainWriterObj, DelegatorData, ProviderChain, Receipt,
    TranscoderData, UnbondingLockData,
};
pub use client::BondingClient;
pub use deployments::Deployment;
pub use errors::{BondingError, ConfirmationFailure, InvalidState};
pub use events::{
    decode_log, fetch_bonding_events, query_logs_chunked, BondingEvent, EventPosition,
    TimestampedBondingEvent,
};
pub use resolver::{resolve_address, AddressResolver, ResolveError, StaticResolver};
pub use rewards::{
    BondingManagerVersion, DelegatorLocks, RewardFormula, RoundRewardAccountant, ShareInputs,
};
pub use state::DelegatorStateService;
pub use store::{BondingStore, BondingStoreObj, MemoryStore};
pub use submit::{BondingCall, Submission, TxOptions, TxSubmitter, RECEIPT_POLL_INTERVAL};
pub use types::{
    Delegator, DelegatorRecord, DelegatorStatus, EarningsPool, EarningsPoolKey, RoundInfo, Share,
    Transcoder, TranscoderStatus, UnbondingLock,
};
pub use unbonding::{check_withdrawable, derive_delegator_status, LockIds, UnbondingLockLedger};

/// Block at which the bonding manager started tracking unbonding locks. Before it the delegator
/// getter returned `lastClaimRound` as its seventh field instead of its sixth.
pub const UNBONDING_LOCKS_BLOCK: u64 = 6_194_948;
/// Block at which the current reward formula replaced the legacy one.
pub const STREAMFLOW_BLOCK: u64 = 6_248_558;

/// Mainnet starting block for event queries
pub const MAINNET_FROM_BLOCK: u64 = 5_660_000;
/// Chunk size for log queries to avoid rate limiting
pub const LOG_QUERY_CHUNK_SIZE: u64 = 10_000;
