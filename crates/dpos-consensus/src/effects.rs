// Outbound effects.
//
// The core never invokes collaborators directly; it records fire-and-forget
// commands and events here, and the embedder drains them after the call.
// Failure to apply an effect is the embedder's problem, never retried from
// inside the consensus core.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Ask the dividend collaborator to retain the voting weights of a
    /// closing term.
    RetainWeights { term_number: u64 },

    /// Register the voter reward pool for a settled term.
    AddDividends { term_number: u64, amount: u128 },

    /// Pay a computed reward amount to one recipient.
    SendDividends { public_key: String, amount: u128 },

    /// A new last-irreversible-block offset was determined. Consumed by
    /// chain-pruning logic outside this core.
    LibFound { offset: u64 },
}
