// DPOS CONSENSUS CORE
// Round/term state machine, BFT finality rule and term settlement
//
// SAFETY INVARIANTS:
// 1. Every entry point is deterministic: the same call sequence produces
//    byte-identical ledger state on every validating node
// 2. Round numbers strictly increase; term numbers advance gap-free
// 3. Expected business failures never leave partial writes behind;
//    invariant violations abort the embedding transaction
// 4. All external collaboration (dividends, weight retention, LIB events)
//    is emitted as fire-and-forget effects, never invoked inline

pub mod consts;
pub mod effects;
pub mod election;
pub mod engine;
pub mod error;
pub mod finality;
pub mod history;
pub mod ledger;
pub mod settlement;
pub mod types;

pub use effects::Effect;
pub use election::{CandidateInTerm, Candidates, TermSnapshot, Tickets, Victories};
pub use engine::DposEngine;
pub use error::ConsensusError;
pub use history::{CandidateInHistory, HistoryDelta};
pub use ledger::ConsensusLedger;
pub use types::{
    ActionResult, Forwarding, MinerInRound, Miners, Round, Term, ToBroadcast, ToPackage,
};
