// Core data model of the round/term state machine.
//
// SAFETY INVARIANTS:
// 1. Round numbers strictly increase; term numbers advance gap-free.
// 2. A round's identity fingerprint covers only content that is immutable
//    for the lifetime of the round, so it stays stable while miners publish
//    and reveal inside it.
// 3. Miner maps are ordered by public key; iteration over them is
//    byte-identical on every node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Per-validator slot state within one round.
///
/// `out_value` is the commitment hash, `in_value` the revealed preimage.
/// A slot with no `out_value` at round close counts as a missed slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinerInRound {
    pub public_key: String,

    /// Fixed production-order index for the round, assigned at round
    /// creation. Canonical rounds use every index in `[0, n)` exactly once.
    pub order: u64,

    pub expected_mining_time: Option<DateTime<Utc>>,
    pub out_value: Option<String>,
    pub in_value: Option<String>,
    pub signature: Option<String>,
    pub previous_in_value: Option<String>,
    pub produced_blocks: u64,
    pub missed_time_slots: u64,
    pub promised_tiny_blocks: u64,
}

/// One full cycle through the current validator set's production order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub round_number: u64,

    /// Content fingerprint, fixed at construction. Stale proposals carry an
    /// id that no longer matches the ledger's current round.
    pub round_id: u64,

    pub blockchain_age: u64,
    pub extra_block_producer_of_previous_round: Option<String>,
    pub miners: BTreeMap<String, MinerInRound>,
}

impl Round {
    pub fn new(round_number: u64, miners: BTreeMap<String, MinerInRound>) -> Self {
        let mut round = Round {
            round_number,
            round_id: 0,
            blockchain_age: 0,
            extra_block_producer_of_previous_round: None,
            miners,
        };
        round.round_id = round.fingerprint();
        round
    }

    /// SHA-256-derived fingerprint over the round's immutable content:
    /// round number plus each slot's identity, order and expected time.
    fn fingerprint(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.round_number.to_le_bytes());
        for (public_key, miner) in &self.miners {
            hasher.update(public_key.as_bytes());
            hasher.update(miner.order.to_le_bytes());
            if let Some(time) = miner.expected_mining_time {
                hasher.update(time.timestamp_millis().to_le_bytes());
            }
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(prefix)
    }

    /// True when every slot order is unique and within `[0, n)`.
    pub fn has_canonical_orders(&self) -> bool {
        let count = self.miners.len() as u64;
        let orders: BTreeSet<u64> = self.miners.values().map(|m| m.order).collect();
        orders.len() == self.miners.len() && self.miners.values().all(|m| m.order < count)
    }

    /// Expected mining time of the first slot; the chain's start timestamp
    /// is derived from this on the genesis round.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.miners
            .values()
            .min_by_key(|m| m.order)
            .and_then(|m| m.expected_mining_time)
    }

    /// Milliseconds between the first two slots' expected times; 0 for
    /// degenerate rounds.
    pub fn mining_interval(&self) -> i64 {
        let mut by_order: Vec<&MinerInRound> = self.miners.values().collect();
        by_order.sort_by_key(|m| m.order);
        match (
            by_order.first().and_then(|m| m.expected_mining_time),
            by_order.get(1).and_then(|m| m.expected_mining_time),
        ) {
            (Some(first), Some(second)) => (second - first).num_milliseconds(),
            _ => 0,
        }
    }

    pub fn total_produced_blocks(&self) -> u64 {
        self.miners.values().map(|m| m.produced_blocks).sum()
    }
}

/// Validator set of one term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Miners {
    pub term_number: u64,
    pub public_keys: Vec<String>,
}

impl Miners {
    pub fn contains(&self, public_key: &str) -> bool {
        self.public_keys.iter().any(|k| k == public_key)
    }
}

/// A tenure of a fixed validator set. The term owns only its first two
/// rounds; later rounds of the tenure live purely in the round ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub term_number: u64,
    pub first_round: Round,
    pub second_round: Round,
    pub miners: Miners,
}

/// Caller-supplied proposal for advancing within a term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forwarding {
    pub next_round: Round,
}

/// A miner's commitment for the slot it owns in the current round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToPackage {
    pub round_id: u64,
    pub out_value: String,
    pub signature: String,
    pub previous_in_value: Option<String>,
    pub promised_tiny_blocks: u64,
}

/// A miner's reveal of the preimage for its earlier commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToBroadcast {
    pub round_id: u64,
    pub in_value: String,
}

/// Uniform result for state-mutating entry points. Expected failure modes
/// are reported here so the invoking transaction can be marked failed
/// without corrupting ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub error_message: String,
}

impl ActionResult {
    pub fn ok() -> Self {
        ActionResult {
            success: true,
            error_message: String::new(),
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        ActionResult {
            success: false,
            error_message: error_message.into(),
        }
    }
}
