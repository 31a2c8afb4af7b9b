// Fatal error tier of the consensus core.
//
// Expected business failures (duplicate snapshot, stale round id, missing
// round record on settlement paths) travel in `ActionResult` instead; a
// `ConsensusError` aborts the embedding transaction as a whole.

use dpos_ledger::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    /// The bootstrap term did not start at round 1.
    #[error("initial term must start at round 1, got round {0}")]
    InvalidInitialRound(u64),

    /// A round record the operation depends on is absent from the ledger.
    #[error("round {0} not found in the ledger")]
    RoundNotFound(u64),

    /// A proposed round does not supersede the current one.
    #[error("round {proposed} does not supersede current round {current}")]
    StaleRound { current: u64, proposed: u64 },

    /// A proposed round violates the canonical slot-order layout.
    #[error("round {round_number} carries non-canonical slot orders")]
    MalformedRound { round_number: u64 },

    /// Term numbering must advance gap-free, one term at a time.
    #[error("failed to update term number from {current} to {proposed}")]
    TermNumberUpdateFailed { current: u64, proposed: u64 },

    /// Round numbering must strictly increase.
    #[error("failed to update round number from {current} to {proposed}")]
    RoundNumberUpdateFailed { current: u64, proposed: u64 },

    /// The invoking identity owns no slot in the addressed round.
    #[error("{public_key} owns no slot in round {round_number}")]
    MinerNotFound {
        round_number: u64,
        public_key: String,
    },

    #[error("term number not found")]
    TermNumberNotFound,

    #[error("round number not found")]
    RoundNumberNotFound,

    #[error("blockchain age not found")]
    BlockAgeNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}
