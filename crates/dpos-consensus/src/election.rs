// Election-side data read by the consensus core.
//
// Vote totals and the winning-candidate set are owned by the voting
// subsystem; the core only reads them at settlement time, plus creates
// zero-vote ticket records for victories it has never seen vote for.

use serde::{Deserialize, Serialize};

/// Vote total of one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tickets {
    pub public_key: String,
    pub obtained_tickets: u64,
}

/// The ordered set of currently-winning candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Victories {
    pub public_keys: Vec<String>,
}

/// Every announced candidate; backups are the candidates not in the active
/// miner set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidates {
    pub public_keys: Vec<String>,
}

/// One candidate's standing captured in a term snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInTerm {
    pub public_key: String,
    pub votes: u64,
}

/// Per-term snapshot, taken exactly once at term settlement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSnapshot {
    pub term_number: u64,
    pub end_round_number: u64,
    pub total_blocks: u64,
    pub candidates: Vec<CandidateInTerm>,
}
