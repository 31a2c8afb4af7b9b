// Last-irreversible-block calculation.
//
// SAFETY INVARIANTS:
// 1. The threshold is floor(2n/3) + 1 for an n-miner round.
// 2. The immediate path fires only on strictly MORE than threshold
//    confirmations in the current round; exactly threshold falls through
//    to the previous-round walk.
// 3. Absence of a determinable LIB is a normal None, never an error.

use crate::ledger::ConsensusLedger;
use crate::types::MinerInRound;
use dpos_ledger::{KvStore, StoreError};
use std::collections::BTreeSet;

/// Supermajority confirmation threshold for an `n`-miner round.
pub fn minimum_count(miners_count: u64) -> u64 {
    miners_count * 2 / 3 + 1
}

/// Compute the LIB offset from the confirmation pattern of the current and
/// previous rounds, relative to the invoking identity's slot.
///
/// The offset counts blocks back from the invoker's position: the invoker's
/// own order on the immediate path, or the current round's confirmation
/// count plus the number of previous-round slots walked otherwise.
pub fn calculate_lib<S: KvStore>(
    ledger: &ConsensusLedger<S>,
    sender_public_key: &str,
) -> Result<Option<u64>, StoreError> {
    let Some(current_round) = ledger.current_round()? else {
        return Ok(None);
    };

    let miners_count = current_round.miners.len() as u64;
    let threshold = minimum_count(miners_count);

    let confirmed: Vec<&MinerInRound> = current_round
        .miners
        .values()
        .filter(|m| m.out_value.is_some())
        .collect();
    let confirmed_current = confirmed.len() as u64;

    // Strictly greater than, not >=.
    if confirmed_current > threshold {
        return Ok(current_round
            .miners
            .get(sender_public_key)
            .map(|sender| sender.order));
    }

    // Not enough in the current round alone; walk the previous round in
    // descending production order, accumulating distinct publishers.
    let mut confirmed_keys: BTreeSet<&str> =
        confirmed.iter().map(|m| m.public_key.as_str()).collect();

    let Some(previous_round) = ledger.previous_round()? else {
        return Ok(None);
    };

    let mut previous_by_order: Vec<&MinerInRound> = previous_round.miners.values().collect();
    previous_by_order.sort_by(|a, b| b.order.cmp(&a.order));

    let mut traversed = confirmed_keys.len() as u64;
    for (steps, miner) in previous_by_order.iter().enumerate() {
        traversed += 1;
        if traversed > miners_count {
            return Ok(None);
        }

        if miner.out_value.is_some() {
            confirmed_keys.insert(miner.public_key.as_str());
        }

        if confirmed_keys.len() as u64 >= threshold {
            return Ok(Some(confirmed_current + steps as u64));
        }
    }

    Ok(None)
}
