// 🗄️ Persistence Layer - SQLite schema + stored records
//
// One database file holds both subsystems:
//   - the house-points ledger (cached totals + append-only transaction log)
//   - the costume contest (entries, ballots, voting switch)
//
// Totals are a cached projection of the log. Every consistency-sensitive
// mutation runs inside a single SQLite transaction (see ledger.rs), so a
// reader never observes totals that disagree with the log.
//
// Ballot uniqueness is enforced HERE, by the primary key on
// costume_votes.voter_id, not by an application-level existence check.
// Two concurrent submissions from the same voter race to the same row and
// the loser gets a constraint violation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::teams::House;

// ============================================================================
// STORED RECORDS
// ============================================================================

/// One immutable point-change fact. Created exactly once on successful
/// application; never mutated or deleted (except by a full ledger reset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: String,
    pub house: House,
    pub delta: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl PointTransaction {
    /// Build a fresh fact with a v4 UUID and the current time.
    pub fn new(house: House, delta: i64, reason: &str) -> Self {
        PointTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            house,
            delta,
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        }
    }
}

/// Snapshot of the whole ledger: cached totals plus the log they project.
///
/// The log is ordered by `occurred_at` descending (display order). Insertion
/// order in storage may differ under concurrent writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    pub totals: HashMap<House, i64>,
    pub log: Vec<PointTransaction>,
    pub last_updated: DateTime<Utc>,
}

impl LedgerState {
    /// Points for one house (0 if the row is somehow missing).
    pub fn points(&self, house: House) -> i64 {
        self.totals.get(&house).copied().unwrap_or(0)
    }
}

/// One costume in the contest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostumeEntry {
    pub id: i64,
    pub name: String,
    pub image_url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// One voter's ranked choices. At most one per voter id, ever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter_id: String,
    pub first_choice: Option<i64>,
    pub second_choice: Option<i64>,
    pub third_choice: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

/// Singleton switch gating ballot acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingSettings {
    pub enabled: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl VotingSettings {
    /// The fallback when no settings row exists yet: voting closed.
    pub fn absent() -> Self {
        VotingSettings {
            enabled: false,
            last_updated: None,
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) the database file and install the schema.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Ledger: cached totals + append-only transaction log
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS house_totals (
            house TEXT PRIMARY KEY,
            points INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS point_transactions (
            id TEXT PRIMARY KEY,
            house TEXT NOT NULL,
            delta INTEGER NOT NULL,
            reason TEXT NOT NULL,
            occurred_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_updated TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Costume contest: entries, ballots, voting switch
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS costume_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            image_url TEXT NOT NULL,
            uploaded_at TEXT NOT NULL
        )",
        [],
    )?;

    // voter_id PRIMARY KEY = the storage-level one-ballot-per-voter guard
    conn.execute(
        "CREATE TABLE IF NOT EXISTS costume_votes (
            voter_id TEXT PRIMARY KEY,
            first_choice INTEGER,
            second_choice INTEGER,
            third_choice INTEGER,
            submitted_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS voting_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            enabled INTEGER NOT NULL,
            last_updated TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_house ON point_transactions(house)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_occurred_at ON point_transactions(occurred_at)",
        [],
    )?;

    // Seed the four totals rows and the meta row so relative
    // `points = points + ?` updates always have a target.
    let now = Utc::now().to_rfc3339();
    for house in House::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO house_totals (house, points) VALUES (?1, 0)",
            params![house.as_str()],
        )?;
    }
    conn.execute(
        "INSERT OR IGNORE INTO ledger_meta (id, last_updated) VALUES (1, ?1)",
        params![now],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING HELPERS
// ============================================================================

fn column_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn column_house(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<House> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: crate::teams::UnknownHouse| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn map_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<PointTransaction> {
    Ok(PointTransaction {
        id: row.get(0)?,
        house: column_house(row, 1)?,
        delta: row.get(2)?,
        reason: row.get(3)?,
        occurred_at: column_timestamp(row, 4)?,
    })
}

fn map_costume_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CostumeEntry> {
    Ok(CostumeEntry {
        id: row.get(0)?,
        name: row.get(1)?,
        image_url: row.get(2)?,
        uploaded_at: column_timestamp(row, 3)?,
    })
}

fn map_ballot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ballot> {
    Ok(Ballot {
        voter_id: row.get(0)?,
        first_choice: row.get(1)?,
        second_choice: row.get(2)?,
        third_choice: row.get(3)?,
        submitted_at: column_timestamp(row, 4)?,
    })
}

// ============================================================================
// LEDGER READS
// ============================================================================

/// Read the full ledger snapshot: totals, log (newest first), last_updated.
pub fn read_ledger_state(conn: &Connection) -> Result<LedgerState> {
    let mut totals = HashMap::new();
    {
        let mut stmt = conn.prepare("SELECT house, points FROM house_totals")?;
        let rows = stmt.query_map([], |row| Ok((column_house(row, 0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (house, points) = row?;
            totals.insert(house, points);
        }
    }

    // Any house missing its row reads as zero
    for house in House::ALL {
        totals.entry(house).or_insert(0);
    }

    let mut stmt = conn.prepare(
        "SELECT id, house, delta, reason, occurred_at
         FROM point_transactions
         ORDER BY occurred_at DESC, id DESC",
    )?;
    let log = stmt
        .query_map([], map_transaction)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let last_updated = conn
        .query_row("SELECT last_updated FROM ledger_meta WHERE id = 1", [], |row| {
            column_timestamp(row, 0)
        })
        .optional()?
        .unwrap_or_else(Utc::now);

    Ok(LedgerState {
        totals,
        log,
        last_updated,
    })
}

/// Per-house sum of deltas over the log (the authoritative projection).
pub fn sum_log_by_house(conn: &Connection) -> Result<HashMap<House, i64>> {
    let mut sums: HashMap<House, i64> = House::ALL.iter().map(|h| (*h, 0)).collect();

    let mut stmt = conn.prepare(
        "SELECT house, COALESCE(SUM(delta), 0)
         FROM point_transactions
         GROUP BY house",
    )?;
    let rows = stmt.query_map([], |row| Ok((column_house(row, 0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (house, sum) = row?;
        sums.insert(house, sum);
    }

    Ok(sums)
}

// ============================================================================
// COSTUME ENTRIES
// ============================================================================

pub fn insert_costume_entry(conn: &Connection, name: &str, image_url: &str) -> Result<CostumeEntry> {
    let uploaded_at = Utc::now();
    conn.execute(
        "INSERT INTO costume_entries (name, image_url, uploaded_at) VALUES (?1, ?2, ?3)",
        params![name, image_url, uploaded_at.to_rfc3339()],
    )
    .context("Failed to insert costume entry")?;

    Ok(CostumeEntry {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        image_url: image_url.to_string(),
        uploaded_at,
    })
}

/// All entries, newest upload first.
pub fn list_costume_entries(conn: &Connection) -> Result<Vec<CostumeEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, image_url, uploaded_at
         FROM costume_entries
         ORDER BY uploaded_at DESC, id DESC",
    )?;
    let entries = stmt
        .query_map([], map_costume_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Returns false when no entry with that id exists.
///
/// Ballots referencing the deleted entry are left in place; the tally
/// simply stops matching them (see voting.rs).
pub fn delete_costume_entry(conn: &Connection, id: i64) -> Result<bool> {
    let affected = conn
        .execute("DELETE FROM costume_entries WHERE id = ?1", params![id])
        .context("Failed to delete costume entry")?;
    Ok(affected > 0)
}

// ============================================================================
// BALLOTS
// ============================================================================

/// Outcome of a ballot insert at the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotInsert {
    Inserted,
    /// A ballot for this voter id already exists (primary-key violation).
    DuplicateVoter,
}

/// Insert a ballot, mapping the voter_id primary-key violation to
/// `DuplicateVoter` instead of an error.
pub fn insert_ballot(conn: &Connection, ballot: &Ballot) -> Result<BallotInsert> {
    let result = conn.execute(
        "INSERT INTO costume_votes (voter_id, first_choice, second_choice, third_choice, submitted_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            ballot.voter_id,
            ballot.first_choice,
            ballot.second_choice,
            ballot.third_choice,
            ballot.submitted_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(BallotInsert::Inserted),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(BallotInsert::DuplicateVoter)
        }
        Err(e) => Err(e).context("Failed to insert ballot"),
    }
}

pub fn has_ballot(conn: &Connection, voter_id: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT voter_id FROM costume_votes WHERE voter_id = ?1",
            params![voter_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn list_ballots(conn: &Connection) -> Result<Vec<Ballot>> {
    let mut stmt = conn.prepare(
        "SELECT voter_id, first_choice, second_choice, third_choice, submitted_at
         FROM costume_votes",
    )?;
    let ballots = stmt
        .query_map([], map_ballot)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ballots)
}

pub fn ballot_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM costume_votes", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// VOTING SETTINGS
// ============================================================================

/// Absent settings row reads as "voting closed".
pub fn read_voting_settings(conn: &Connection) -> Result<VotingSettings> {
    let settings = conn
        .query_row(
            "SELECT enabled, last_updated FROM voting_settings WHERE id = 1",
            [],
            |row| {
                Ok(VotingSettings {
                    enabled: row.get::<_, i64>(0)? != 0,
                    last_updated: Some(column_timestamp(row, 1)?),
                })
            },
        )
        .optional()?
        .unwrap_or_else(VotingSettings::absent);
    Ok(settings)
}

pub fn write_voting_settings(conn: &Connection, enabled: bool) -> Result<VotingSettings> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO voting_settings (id, enabled, last_updated) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET enabled = ?1, last_updated = ?2",
        params![enabled as i64, now.to_rfc3339()],
    )
    .context("Failed to write voting settings")?;

    Ok(VotingSettings {
        enabled,
        last_updated: Some(now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_setup_seeds_four_zero_totals() {
        let conn = test_conn();
        let state = read_ledger_state(&conn).unwrap();

        assert_eq!(state.totals.len(), 4);
        for house in House::ALL {
            assert_eq!(state.points(house), 0, "{} should start at 0", house);
        }
        assert!(state.log.is_empty());
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_conn();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let state = read_ledger_state(&conn).unwrap();
        assert_eq!(state.totals.len(), 4);
    }

    #[test]
    fn test_ballot_uniqueness_enforced_by_storage() {
        let conn = test_conn();

        let ballot = Ballot {
            voter_id: "abc123".to_string(),
            first_choice: Some(1),
            second_choice: None,
            third_choice: None,
            submitted_at: Utc::now(),
        };

        assert_eq!(insert_ballot(&conn, &ballot).unwrap(), BallotInsert::Inserted);
        assert_eq!(
            insert_ballot(&conn, &ballot).unwrap(),
            BallotInsert::DuplicateVoter,
            "second insert for the same voter must hit the primary key"
        );
        assert_eq!(ballot_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_voting_settings_absent_means_closed() {
        let conn = test_conn();
        let settings = read_voting_settings(&conn).unwrap();

        assert!(!settings.enabled);
        assert!(settings.last_updated.is_none());
    }

    #[test]
    fn test_voting_settings_upsert() {
        let conn = test_conn();

        let on = write_voting_settings(&conn, true).unwrap();
        assert!(on.enabled);
        assert!(read_voting_settings(&conn).unwrap().enabled);

        write_voting_settings(&conn, false).unwrap();
        assert!(!read_voting_settings(&conn).unwrap().enabled);
    }

    #[test]
    fn test_costume_entry_lifecycle() {
        let conn = test_conn();

        let entry = insert_costume_entry(&conn, "Vampire", "/static/vampire.jpg").unwrap();
        assert!(entry.id > 0);

        let listed = list_costume_entries(&conn).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Vampire");

        assert!(delete_costume_entry(&conn, entry.id).unwrap());
        assert!(!delete_costume_entry(&conn, entry.id).unwrap());
        assert!(list_costume_entries(&conn).unwrap().is_empty());
    }
}
