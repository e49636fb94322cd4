// House Cup Scoring System - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod db;
pub mod export;
pub mod identity;
pub mod images;
pub mod leaderboard;
pub mod ledger;
pub mod notify;
pub mod teams;
pub mod voting;

// Re-export commonly used types
pub use db::{
    ballot_count, delete_costume_entry, insert_costume_entry, list_ballots, list_costume_entries,
    open_database, read_ledger_state, read_voting_settings, setup_database, write_voting_settings,
    Ballot, BallotInsert, CostumeEntry, LedgerState, PointTransaction, VotingSettings,
};
pub use export::export_transactions_csv;
pub use identity::{
    fingerprint_hash, resolve_voter_id, FingerprintSignals, JsonFileStore, MemoryStore,
    StableStore, VOTER_ID_KEY,
};
pub use images::{ImageStore, LocalImageStore};
pub use leaderboard::{leading_house, standings, total_points, Standing};
pub use ledger::{
    apply_delta, current_state, recompute_totals, remove_capped, reset, verify_totals, TotalsDrift,
};
pub use notify::{ChangeNotifier, ChangeTopic, Subscription, POLL_FALLBACK};
pub use teams::{House, UnknownHouse};
pub use voting::{
    has_voted, submit_ballot, tally, BallotDraft, ContestResult, DuplicateChoice, Rank,
    SubmitOutcome,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
