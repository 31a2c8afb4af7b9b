// Cross-term miner history.
//
// `CandidateInHistory` is the only entity whose update is additive rather
// than replace-in-place: every write goes through `merge`, which folds a
// delta into the existing record and never drops accumulated counters.

use crate::consts;
use serde::{Deserialize, Serialize};

/// Durable, cross-term record per validator identity. Created lazily on
/// first observed activity; never deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInHistory {
    pub public_key: String,
    pub produced_blocks: u64,
    pub missed_time_slots: u64,

    /// Consecutive terms reappointed; reset to 0 on any gap.
    pub continual_appointment_count: u64,

    /// Total terms reappointed.
    pub reappointment_count: u64,

    /// Terms in which this candidate was appointed.
    pub terms: Vec<u64>,

    pub current_alias: String,
}

impl CandidateInHistory {
    /// Fresh record with zeroed counters.
    pub fn seeded(public_key: &str, alias: impl Into<String>) -> Self {
        CandidateInHistory {
            public_key: public_key.to_string(),
            current_alias: alias.into(),
            ..Default::default()
        }
    }
}

/// Additive update folded into a [`CandidateInHistory`] by [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryDelta {
    pub produced_blocks: u64,
    pub missed_time_slots: u64,

    /// Term to append to the appointment record, when the delta closes a
    /// term for this candidate.
    pub term: Option<u64>,

    /// Reappointment increment.
    pub reappointments: u64,

    /// Recomputed consecutive-appointment streak, when the delta carries
    /// one. The streak is the single non-additive field: it either extends
    /// or resets.
    pub continual_appointment_count: Option<u64>,
}

/// Merge `delta` into `old`, producing the updated record. Counters only
/// ever grow; nothing in `old` is overwritten except the streak.
pub fn merge(old: &CandidateInHistory, delta: &HistoryDelta) -> CandidateInHistory {
    let mut merged = old.clone();
    merged.produced_blocks += delta.produced_blocks;
    merged.missed_time_slots += delta.missed_time_slots;
    merged.reappointment_count += delta.reappointments;
    if let Some(term) = delta.term {
        merged.terms.push(term);
    }
    if let Some(streak) = delta.continual_appointment_count {
        merged.continual_appointment_count = streak;
    }
    merged
}

/// Fallback display alias: a fixed-length prefix of the identity.
pub fn default_alias(public_key: &str) -> String {
    public_key.chars().take(consts::ALIAS_LIMIT).collect()
}
