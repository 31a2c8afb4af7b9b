// Term settlement: per-term snapshot, miner-history rollover and dividend
// computation. Runs once per term transition, after the new term's rounds
// are in place.
//
// All value transfer is effect emission; this module only computes amounts.

use crate::consts;
use crate::effects::Effect;
use crate::election::{CandidateInTerm, TermSnapshot, Tickets};
use crate::engine::DposEngine;
use crate::error::ConsensusError;
use crate::history::{self, CandidateInHistory, HistoryDelta};
use crate::types::ActionResult;
use dpos_ledger::KvStore;
use log::info;
use std::collections::BTreeMap;

/// Reward pool arithmetic. Integer-only: u128 intermediates and truncating
/// division, so every node settles identical amounts and rounding only
/// ever loses value.
pub mod rewards {
    use crate::consts;

    fn pool(mined_blocks: u64, ratio_percent: u128) -> u128 {
        mined_blocks as u128 * consts::TOKENS_PER_BLOCK as u128 * ratio_percent / 100
    }

    /// Flat share each miner of the round receives.
    pub fn for_every_miner(mined_blocks: u64, miner_count: u64) -> u128 {
        if miner_count == 0 {
            0
        } else {
            pool(mined_blocks, consts::MINER_BASIC_RATIO_PERCENT) / miner_count as u128
        }
    }

    /// Pool apportioned by obtained vote weight.
    pub fn for_tickets(mined_blocks: u64) -> u128 {
        pool(mined_blocks, consts::MINER_VOTES_RATIO_PERCENT)
    }

    /// Pool apportioned by consecutive-reappointment streak.
    pub fn for_reappointment(mined_blocks: u64) -> u128 {
        pool(mined_blocks, consts::MINER_REAPPOINTMENT_RATIO_PERCENT)
    }

    /// Pool split evenly among backup candidates.
    pub fn for_backup_nodes(mined_blocks: u64) -> u128 {
        pool(mined_blocks, consts::BACKUP_NODES_RATIO_PERCENT)
    }

    /// Pool handed to the dividend collaborator for voters.
    pub fn for_voters(mined_blocks: u64) -> u128 {
        pool(mined_blocks, consts::VOTERS_RATIO_PERCENT)
    }

    /// The full mint for the round, before pool splitting.
    pub fn total(mined_blocks: u64) -> u128 {
        mined_blocks as u128 * consts::TOKENS_PER_BLOCK as u128
    }
}

impl<S: KvStore> DposEngine<S> {
    /// Take the once-per-term snapshot used for candidate ranking.
    ///
    /// Duplicate requests for the same term are rejected, never
    /// overwritten.
    pub fn snapshot_for_term(
        &mut self,
        snapshot_term_number: u64,
        last_round_number: u64,
    ) -> Result<ActionResult, ConsensusError> {
        if self.ledger.snapshot(snapshot_term_number)?.is_some() {
            return Ok(ActionResult::failed(format!(
                "Snapshot of term {snapshot_term_number} already taken."
            )));
        }

        let Some(round) = self.ledger.round(last_round_number)? else {
            return Ok(ActionResult::failed(format!(
                "Failed to get information of round {last_round_number}."
            )));
        };
        let mined_blocks = round.total_produced_blocks();

        let mut candidates = Vec::new();
        if let Some(victories) = self.ledger.victories()? {
            for public_key in &victories.public_keys {
                match self.ledger.tickets(public_key)? {
                    Some(tickets) => candidates.push(CandidateInTerm {
                        public_key: public_key.clone(),
                        votes: tickets.obtained_tickets,
                    }),
                    None => {
                        // First sighting of this victory: give it a
                        // zero-vote ticket record.
                        self.ledger.set_tickets(&Tickets {
                            public_key: public_key.clone(),
                            obtained_tickets: 0,
                        })?;
                        candidates.push(CandidateInTerm {
                            public_key: public_key.clone(),
                            votes: 0,
                        });
                    }
                }
            }
        }

        let end_round_number = self
            .ledger
            .round_number()?
            .ok_or(ConsensusError::RoundNumberNotFound)?;
        self.ledger.set_snapshot(&TermSnapshot {
            term_number: snapshot_term_number,
            end_round_number,
            total_blocks: mined_blocks,
            candidates,
        })?;

        info!("snapshot of term {snapshot_term_number} taken");
        Ok(ActionResult::ok())
    }

    /// Roll the closing term's per-round counters into every active
    /// validator's durable history.
    pub fn snapshot_for_miners(
        &mut self,
        previous_term_number: u64,
        last_round_number: u64,
    ) -> Result<ActionResult, ConsensusError> {
        let round = self
            .ledger
            .round(last_round_number)?
            .ok_or(ConsensusError::RoundNotFound(last_round_number))?;

        // Duplicate guard over the whole validator set before any write,
        // so a rejected snapshot touches zero history records.
        for public_key in round.miners.keys() {
            if let Some(existing) = self.ledger.history(public_key)? {
                if existing.terms.contains(&previous_term_number) {
                    return Ok(ActionResult::failed(
                        "Snapshot for miners in previous term already taken.",
                    ));
                }
            }
        }

        let previous_term_miners = self.ledger.miners(previous_term_number)?;

        for (public_key, miner) in &round.miners {
            let reappointed = previous_term_miners
                .as_ref()
                .map(|m| m.contains(public_key))
                .unwrap_or(false);

            let merged = match self.ledger.history(public_key)? {
                Some(existing) => {
                    let streak = if reappointed {
                        existing.continual_appointment_count + 1
                    } else {
                        0
                    };
                    history::merge(
                        &existing,
                        &HistoryDelta {
                            produced_blocks: miner.produced_blocks,
                            missed_time_slots: miner.missed_time_slots,
                            term: Some(previous_term_number),
                            reappointments: 1,
                            continual_appointment_count: Some(streak),
                        },
                    )
                }
                None => CandidateInHistory {
                    public_key: public_key.clone(),
                    produced_blocks: miner.produced_blocks,
                    missed_time_slots: miner.missed_time_slots,
                    continual_appointment_count: 0,
                    reappointment_count: 0,
                    terms: vec![previous_term_number],
                    current_alias: history::default_alias(public_key),
                },
            };
            self.ledger.set_history(&merged)?;
        }

        Ok(ActionResult::ok())
    }

    /// Compute and emit the term's reward payouts.
    ///
    /// Each miner is paid from three pools: a flat share, a vote-weighted
    /// share and a loyalty share. The weighted shares divide by totals
    /// accumulated so far in iteration order, not a precomputed grand
    /// total: later slots dilute earlier pools. That running-denominator
    /// behavior is part of the settled protocol and pinned by test.
    pub fn send_dividends(
        &mut self,
        dividends_term_number: u64,
        last_round_number: u64,
    ) -> Result<ActionResult, ConsensusError> {
        let round = self
            .ledger
            .round(last_round_number)?
            .ok_or(ConsensusError::RoundNotFound(last_round_number))?;
        let mined_blocks = round.total_produced_blocks();

        self.effects.push(Effect::AddDividends {
            term_number: dividends_term_number,
            amount: rewards::for_voters(mined_blocks),
        });

        let miner_count = round.miners.len() as u64;
        let mut running_votes: u128 = 0;
        let mut running_streaks: u128 = 0;
        let mut streaks: BTreeMap<&str, u64> = BTreeMap::new();

        for (public_key, _) in &round.miners {
            let votes = self
                .ledger
                .tickets(public_key)?
                .map(|t| t.obtained_tickets)
                .unwrap_or(0);
            running_votes += votes as u128;

            if let Some(existing) = self.ledger.history(public_key)? {
                running_streaks += existing.continual_appointment_count as u128;
                streaks.insert(public_key.as_str(), existing.continual_appointment_count);
            }

            let vote_share = if running_votes == 0 {
                0
            } else {
                rewards::for_tickets(mined_blocks) * votes as u128 / running_votes
            };
            let streak = streaks.get(public_key.as_str()).copied().unwrap_or(0);
            let loyalty_share = if running_streaks == 0 {
                0
            } else {
                rewards::for_reappointment(mined_blocks) * streak as u128 / running_streaks
            };

            let amount =
                rewards::for_every_miner(mined_blocks, miner_count) + vote_share + loyalty_share;
            self.effects.push(Effect::SendDividends {
                public_key: public_key.clone(),
                amount,
            });
        }

        if let Some(candidates) = self.ledger.candidates()? {
            let backups: Vec<&String> = candidates
                .public_keys
                .iter()
                .filter(|k| !round.miners.contains_key(*k))
                .collect();
            let backup_count = backups.len() as u128;
            for backup in backups {
                let amount = rewards::for_backup_nodes(mined_blocks) / backup_count;
                self.effects.push(Effect::SendDividends {
                    public_key: backup.clone(),
                    amount,
                });
            }
        }

        Ok(ActionResult::ok())
    }
}
