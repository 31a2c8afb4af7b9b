// Typed key schema over the raw key/value store.
//
// The ledger handle is dependency-injected into every component; nothing in
// this crate reaches for a hidden singleton. All accessors are synchronous
// and either fully read or fully write one record.

use crate::election::{Candidates, TermSnapshot, Tickets, Victories};
use crate::history::CandidateInHistory;
use crate::types::{Miners, Round};
use chrono::{DateTime, Utc};
use dpos_ledger::{KvStore, StoreError, TypedStore};

mod keys {
    pub const TERM_NUMBER: &str = "chain/term-number";
    pub const ROUND_NUMBER: &str = "chain/round-number";
    pub const BLOCKCHAIN_AGE: &str = "chain/age";
    pub const START_TIMESTAMP: &str = "chain/start-timestamp";
    pub const MINING_INTERVAL: &str = "chain/mining-interval";
    pub const VICTORIES: &str = "election/victories";
    pub const CANDIDATES: &str = "election/candidates";

    pub fn round(round_number: u64) -> String {
        format!("round/{round_number}")
    }

    pub fn miners(term_number: u64) -> String {
        format!("term/{term_number}/miners")
    }

    pub fn first_round_of_term(term_number: u64) -> String {
        format!("term/{term_number}/first-round")
    }

    pub fn snapshot(term_number: u64) -> String {
        format!("term/{term_number}/snapshot")
    }

    pub fn history(public_key: &str) -> String {
        format!("history/{public_key}")
    }

    pub fn tickets(public_key: &str) -> String {
        format!("tickets/{public_key}")
    }

    pub fn alias(public_key: &str) -> String {
        format!("alias/{public_key}")
    }
}

/// Typed view of the consensus state held in a [`KvStore`].
#[derive(Debug)]
pub struct ConsensusLedger<S> {
    store: S,
}

impl<S: KvStore> ConsensusLedger<S> {
    pub fn new(store: S) -> Self {
        ConsensusLedger { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // Rounds

    pub fn round(&self, round_number: u64) -> Result<Option<Round>, StoreError> {
        self.store.get_typed(&keys::round(round_number))
    }

    pub fn set_round(&self, round: &Round) -> Result<(), StoreError> {
        self.store.put_typed(&keys::round(round.round_number), round)
    }

    pub fn current_round(&self) -> Result<Option<Round>, StoreError> {
        match self.round_number()? {
            Some(round_number) => self.round(round_number),
            None => Ok(None),
        }
    }

    pub fn previous_round(&self) -> Result<Option<Round>, StoreError> {
        match self.round_number()? {
            Some(round_number) if round_number > 1 => self.round(round_number - 1),
            _ => Ok(None),
        }
    }

    // Scalars

    pub fn term_number(&self) -> Result<Option<u64>, StoreError> {
        self.store.get_typed(keys::TERM_NUMBER)
    }

    pub fn set_term_number(&self, term_number: u64) -> Result<(), StoreError> {
        self.store.put_typed(keys::TERM_NUMBER, &term_number)
    }

    pub fn round_number(&self) -> Result<Option<u64>, StoreError> {
        self.store.get_typed(keys::ROUND_NUMBER)
    }

    pub fn set_round_number(&self, round_number: u64) -> Result<(), StoreError> {
        self.store.put_typed(keys::ROUND_NUMBER, &round_number)
    }

    /// Advance the term counter. Terms are gap-free: only `current + 1`
    /// commits; anything else leaves the counter unchanged.
    pub fn try_update_term_number(&self, new_term_number: u64) -> Result<bool, StoreError> {
        match self.term_number()? {
            Some(current) if new_term_number == current + 1 => {
                self.set_term_number(new_term_number)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Advance the round counter. Only strictly increasing values commit.
    pub fn try_update_round_number(&self, new_round_number: u64) -> Result<bool, StoreError> {
        match self.round_number()? {
            Some(current) if new_round_number > current => {
                self.set_round_number(new_round_number)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn blockchain_age(&self) -> Result<Option<u64>, StoreError> {
        self.store.get_typed(keys::BLOCKCHAIN_AGE)
    }

    pub fn set_blockchain_age(&self, age: u64) -> Result<(), StoreError> {
        self.store.put_typed(keys::BLOCKCHAIN_AGE, &age)
    }

    pub fn start_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.store.get_typed(keys::START_TIMESTAMP)
    }

    pub fn set_start_timestamp(&self, timestamp: DateTime<Utc>) -> Result<(), StoreError> {
        self.store.put_typed(keys::START_TIMESTAMP, &timestamp)
    }

    pub fn mining_interval(&self) -> Result<Option<i64>, StoreError> {
        self.store.get_typed(keys::MINING_INTERVAL)
    }

    pub fn set_mining_interval(&self, interval_ms: i64) -> Result<(), StoreError> {
        self.store.put_typed(keys::MINING_INTERVAL, &interval_ms)
    }

    // Terms

    pub fn miners(&self, term_number: u64) -> Result<Option<Miners>, StoreError> {
        self.store.get_typed(&keys::miners(term_number))
    }

    pub fn set_miners(&self, miners: &Miners) -> Result<(), StoreError> {
        self.store.put_typed(&keys::miners(miners.term_number), miners)
    }

    pub fn first_round_of_term(&self, term_number: u64) -> Result<Option<u64>, StoreError> {
        self.store.get_typed(&keys::first_round_of_term(term_number))
    }

    pub fn set_first_round_of_term(
        &self,
        term_number: u64,
        round_number: u64,
    ) -> Result<(), StoreError> {
        self.store
            .put_typed(&keys::first_round_of_term(term_number), &round_number)
    }

    pub fn snapshot(&self, term_number: u64) -> Result<Option<TermSnapshot>, StoreError> {
        self.store.get_typed(&keys::snapshot(term_number))
    }

    pub fn set_snapshot(&self, snapshot: &TermSnapshot) -> Result<(), StoreError> {
        self.store
            .put_typed(&keys::snapshot(snapshot.term_number), snapshot)
    }

    // Candidates

    pub fn history(&self, public_key: &str) -> Result<Option<CandidateInHistory>, StoreError> {
        self.store.get_typed(&keys::history(public_key))
    }

    pub fn set_history(&self, history: &CandidateInHistory) -> Result<(), StoreError> {
        self.store
            .put_typed(&keys::history(&history.public_key), history)
    }

    pub fn tickets(&self, public_key: &str) -> Result<Option<Tickets>, StoreError> {
        self.store.get_typed(&keys::tickets(public_key))
    }

    pub fn set_tickets(&self, tickets: &Tickets) -> Result<(), StoreError> {
        self.store
            .put_typed(&keys::tickets(&tickets.public_key), tickets)
    }

    pub fn victories(&self) -> Result<Option<Victories>, StoreError> {
        self.store.get_typed(keys::VICTORIES)
    }

    pub fn set_victories(&self, victories: &Victories) -> Result<(), StoreError> {
        self.store.put_typed(keys::VICTORIES, victories)
    }

    pub fn candidates(&self) -> Result<Option<Candidates>, StoreError> {
        self.store.get_typed(keys::CANDIDATES)
    }

    pub fn set_candidates(&self, candidates: &Candidates) -> Result<(), StoreError> {
        self.store.put_typed(keys::CANDIDATES, candidates)
    }

    pub fn alias(&self, public_key: &str) -> Result<Option<String>, StoreError> {
        self.store.get_typed(&keys::alias(public_key))
    }

    pub fn set_alias(&self, public_key: &str, alias: &str) -> Result<(), StoreError> {
        self.store.put_typed(&keys::alias(public_key), &alias)
    }
}
