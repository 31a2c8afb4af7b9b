// Protocol constants.
//
// Reward ratios are expressed in whole percent and applied with integer
// arithmetic only, so every node settles identical amounts.

/// Tokens minted per produced block, before pool splitting.
pub const TOKENS_PER_BLOCK: u64 = 10_000;

/// Share of the per-term mint split evenly among the miners of the round.
pub const MINER_BASIC_RATIO_PERCENT: u128 = 40;

/// Share apportioned to miners by obtained vote weight.
pub const MINER_VOTES_RATIO_PERCENT: u128 = 10;

/// Share apportioned to miners by consecutive-reappointment streak.
pub const MINER_REAPPOINTMENT_RATIO_PERCENT: u128 = 10;

/// Share split evenly among backup (non-miner) candidates.
pub const BACKUP_NODES_RATIO_PERCENT: u128 = 20;

/// Share handed to the dividend collaborator for voters.
pub const VOTERS_RATIO_PERCENT: u128 = 20;

/// Maximum length of a display alias; identities without a configured alias
/// fall back to an identity prefix of this length.
pub const ALIAS_LIMIT: usize = 20;

/// Display aliases handed out to the genesis miner set, in slot order.
pub const INITIAL_MINERS_ALIASES: &str = "YQ,SM,WK,CP,PG,SC,ZX,ZY,YS,MH,KJ,TY,RF,BJ,RB,QX,MS";

/// Message reported when a commitment targets a superseded round.
pub const ROUND_ID_NOT_MATCHED: &str = "Round Id not matched.";
