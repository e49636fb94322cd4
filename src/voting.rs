// 🗳️ Vote Tally Engine - one ballot per voter, weighted contest results
//
// A ballot's lifecycle has exactly two states: not started, then submitted.
// Submitted is terminal; there is no revision or retraction path. The
// one-ballot-per-voter guarantee lives in the storage layer (primary key on
// voter_id, see db.rs); the engine only maps the constraint violation to
// an `AlreadyVoted` outcome.
//
// Weighted score: 3 × first-place votes + 2 × second + 1 × third.

use anyhow::{bail, Result};
use chrono::Utc;
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::{self, Ballot, BallotInsert};

// ============================================================================
// SUBMIT OUTCOME
// ============================================================================

/// What happened to a submission attempt. These are domain outcomes, not
/// failures: persistence errors surface separately as `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmitOutcome {
    /// Ballot persisted.
    Accepted(Ballot),

    /// A ballot already exists for this voter identity.
    AlreadyVoted,

    /// All three choice slots were empty.
    NoSelection,

    /// The voting switch is off.
    VotingClosed,
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted(_))
    }
}

/// The same entry appeared in two rank slots of one ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateChoice(pub i64);

impl fmt::Display for DuplicateChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry {} occupies more than one rank in the ballot", self.0)
    }
}

impl std::error::Error for DuplicateChoice {}

// ============================================================================
// BALLOT DRAFT (pre-submission selection state machine)
// ============================================================================

/// Rank slots on a ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rank {
    First,
    Second,
    Third,
}

/// A ballot under construction: three optional entry references, mutable
/// only until submission.
///
/// Invariant (holds after every `toggle`): an entry occupies at most one
/// rank slot at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotDraft {
    pub first: Option<i64>,
    pub second: Option<i64>,
    pub third: Option<i64>,
}

impl BallotDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choice(&self, rank: Rank) -> Option<i64> {
        match rank {
            Rank::First => self.first,
            Rank::Second => self.second,
            Rank::Third => self.third,
        }
    }

    fn slot_mut(&mut self, rank: Rank) -> &mut Option<i64> {
        match rank {
            Rank::First => &mut self.first,
            Rank::Second => &mut self.second,
            Rank::Third => &mut self.third,
        }
    }

    /// Toggle `entry_id` into `rank`:
    /// - already in that rank → cleared (toggle-off),
    /// - currently holding a different rank → moved (old slot cleared),
    /// - otherwise → set, replacing whatever held the rank.
    pub fn toggle(&mut self, rank: Rank, entry_id: i64) {
        if self.choice(rank) == Some(entry_id) {
            *self.slot_mut(rank) = None;
            return;
        }

        for other in [Rank::First, Rank::Second, Rank::Third] {
            if self.choice(other) == Some(entry_id) {
                *self.slot_mut(other) = None;
            }
        }
        *self.slot_mut(rank) = Some(entry_id);
    }

    /// True when no slot is set (would be rejected as `NoSelection`).
    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.second.is_none() && self.third.is_none()
    }

    /// The set slots must be pairwise distinct. `toggle` preserves this;
    /// drafts built by hand (e.g. from an API payload) may not.
    fn duplicate_choice(&self) -> Option<i64> {
        let set: Vec<i64> = [self.first, self.second, self.third]
            .into_iter()
            .flatten()
            .collect();
        for (i, a) in set.iter().enumerate() {
            if set[i + 1..].contains(a) {
                return Some(*a);
            }
        }
        None
    }

    /// Freeze the draft into the immutable submitted form.
    pub fn into_ballot(self, voter_id: &str) -> Ballot {
        Ballot {
            voter_id: voter_id.to_string(),
            first_choice: self.first,
            second_choice: self.second,
            third_choice: self.third,
            submitted_at: Utc::now(),
        }
    }
}

// ============================================================================
// SUBMISSION
// ============================================================================

/// Existence check for a voter identity.
pub fn has_voted(conn: &Connection, voter_id: &str) -> Result<bool> {
    db::has_ballot(conn, voter_id)
}

/// Validate and persist one ballot.
///
/// Validation order: voting switch, then empty-ballot check, then the
/// duplicate-choice shape check (an error, not an outcome), then the
/// insert, where the storage-level voter_id constraint decides between
/// `Accepted` and `AlreadyVoted`.
pub fn submit_ballot(conn: &Connection, voter_id: &str, draft: BallotDraft) -> Result<SubmitOutcome> {
    let settings = db::read_voting_settings(conn)?;
    if !settings.enabled {
        return Ok(SubmitOutcome::VotingClosed);
    }

    if draft.is_empty() {
        return Ok(SubmitOutcome::NoSelection);
    }

    if let Some(id) = draft.duplicate_choice() {
        bail!(DuplicateChoice(id));
    }

    let ballot = draft.into_ballot(voter_id);
    match db::insert_ballot(conn, &ballot)? {
        BallotInsert::Inserted => {
            info!("ballot accepted for voter {}", voter_id);
            Ok(SubmitOutcome::Accepted(ballot))
        }
        BallotInsert::DuplicateVoter => Ok(SubmitOutcome::AlreadyVoted),
    }
}

// ============================================================================
// TALLY
// ============================================================================

/// Derived contest result for one costume entry. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestResult {
    pub costume_id: i64,
    pub costume_name: String,
    pub costume_image_url: String,
    pub first_place_votes: i64,
    pub second_place_votes: i64,
    pub third_place_votes: i64,
    /// 3 × first + 2 × second + 1 × third.
    pub score: i64,
}

/// Aggregate every ballot into per-entry results, sorted by score
/// descending, ties by entry id ascending.
///
/// Votes naming an entry that has since been deleted match nothing and are
/// silently excluded; a stale ballot never fails the whole tally.
pub fn tally(conn: &Connection) -> Result<Vec<ContestResult>> {
    let entries = db::list_costume_entries(conn)?;
    let ballots = db::list_ballots(conn)?;

    let mut results: Vec<ContestResult> = entries
        .into_iter()
        .map(|entry| {
            let first = count_matches(&ballots, entry.id, |b| b.first_choice);
            let second = count_matches(&ballots, entry.id, |b| b.second_choice);
            let third = count_matches(&ballots, entry.id, |b| b.third_choice);

            ContestResult {
                costume_id: entry.id,
                costume_name: entry.name,
                costume_image_url: entry.image_url,
                first_place_votes: first,
                second_place_votes: second,
                third_place_votes: third,
                score: 3 * first + 2 * second + third,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.costume_id.cmp(&b.costume_id))
    });

    Ok(results)
}

fn count_matches(ballots: &[Ballot], entry_id: i64, slot: impl Fn(&Ballot) -> Option<i64>) -> i64 {
    ballots.iter().filter(|b| slot(b) == Some(entry_id)).count() as i64
}

/// Total number of submitted ballots.
pub fn ballot_count(conn: &Connection) -> Result<i64> {
    db::ballot_count(conn)
}
