// 📒 Point Ledger Engine - validate and apply point changes
//
// Every mutation is one SQLite transaction combining a RELATIVE update of
// the cached total (`points = points + ?`) with the append of the
// transaction fact and the last_updated bump. That makes the whole
// read-modify-write atomic on the storage side: two concurrent awards to
// the same house serialize in SQLite and both land, instead of the second
// overwriting the first's total while the log keeps both facts.
//
// Failure anywhere inside the transaction rolls everything back; the engine
// never retries on its own.

use anyhow::{ensure, Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use rusqlite::{params, Connection};

use crate::db::{self, LedgerState, PointTransaction};
use crate::teams::House;

// ============================================================================
// OPERATIONS
// ============================================================================

/// Apply a raw signed delta to one house.
///
/// `amount == 0` is an accepted no-op: nothing is written and no
/// transaction fact is recorded (an empty fact would add noise to the
/// audit trail). There is no clamp in either direction here, so generic
/// deltas can drive a total negative; the guarded path is
/// [`remove_capped`].
pub fn apply_delta(
    conn: &mut Connection,
    house: House,
    amount: i64,
    reason: &str,
) -> Result<LedgerState> {
    if amount == 0 {
        debug!("zero delta for {}, nothing to record", house.as_str());
        return current_state(conn);
    }

    let fact = PointTransaction::new(house, amount, reason);

    let tx = conn
        .transaction()
        .context("Failed to start ledger transaction")?;

    tx.execute(
        "UPDATE house_totals SET points = points + ?1 WHERE house = ?2",
        params![amount, house.as_str()],
    )?;
    append_fact(&tx, &fact)?;
    touch_last_updated(&tx)?;

    tx.commit().context("Failed to commit point delta")?;

    info!(
        "applied {:+} to {} ({})",
        amount,
        house.as_str(),
        fact.reason
    );

    current_state(conn)
}

/// Guarded subtraction: the new total is `max(0, current - amount)` and
/// the recorded fact carries the actual change, `min(amount, current)`.
/// This path never leaves a total below zero: a total at zero loses
/// nothing and records no fact, and a total already negative (via raw
/// deltas) is clamped up to zero with the correction recorded as a
/// positive delta.
///
/// The asymmetry with [`apply_delta`] is deliberate: the explicit
/// "remove points" control floors at zero, while quick-action buttons and
/// manual negative entries go through the unguarded primitive.
pub fn remove_capped(
    conn: &mut Connection,
    house: House,
    amount: i64,
    reason: &str,
) -> Result<LedgerState> {
    ensure!(
        amount >= 0,
        "remove_capped takes a non-negative amount, got {}",
        amount
    );

    let tx = conn
        .transaction()
        .context("Failed to start ledger transaction")?;

    // Safe to read inside the write transaction: SQLite serializes writers,
    // so the total cannot move between this read and the update below.
    let current: i64 = tx.query_row(
        "SELECT points FROM house_totals WHERE house = ?1",
        params![house.as_str()],
        |row| row.get(0),
    )?;

    let new_total = (current - amount).max(0);
    let actual_removed = current - new_total;
    if actual_removed == 0 {
        drop(tx);
        debug!("nothing to remove from {}", house.as_str());
        return current_state(conn);
    }

    let fact = PointTransaction::new(house, -actual_removed, reason);

    tx.execute(
        "UPDATE house_totals SET points = points - ?1 WHERE house = ?2",
        params![actual_removed, house.as_str()],
    )?;
    append_fact(&tx, &fact)?;
    touch_last_updated(&tx)?;

    tx.commit().context("Failed to commit point removal")?;

    info!(
        "recorded {:+} for {} via guarded removal ({})",
        fact.delta,
        house.as_str(),
        fact.reason
    );

    current_state(conn)
}

/// Zero every total and discard the entire log, atomically.
///
/// Destructive: the audit trail is deleted, not archived.
pub fn reset(conn: &mut Connection) -> Result<LedgerState> {
    let tx = conn
        .transaction()
        .context("Failed to start ledger transaction")?;

    tx.execute("UPDATE house_totals SET points = 0", [])?;
    tx.execute("DELETE FROM point_transactions", [])?;
    touch_last_updated(&tx)?;

    tx.commit().context("Failed to commit ledger reset")?;

    warn!("ledger reset: all totals zeroed, transaction log discarded");

    current_state(conn)
}

/// Pure read of the current snapshot.
pub fn current_state(conn: &Connection) -> Result<LedgerState> {
    db::read_ledger_state(conn)
}

fn append_fact(conn: &Connection, fact: &PointTransaction) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO point_transactions (id, house, delta, reason, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            fact.id,
            fact.house.as_str(),
            fact.delta,
            fact.reason,
            fact.occurred_at.to_rfc3339(),
        ],
    )
}

fn touch_last_updated(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE ledger_meta SET last_updated = ?1 WHERE id = 1",
        params![Utc::now().to_rfc3339()],
    )
}

// ============================================================================
// DRIFT DETECTION & RECOVERY
// ============================================================================

/// A cached total that disagrees with the sum of its log entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalsDrift {
    pub house: House,
    pub cached: i64,
    pub derived: i64,
}

impl TotalsDrift {
    pub fn difference(&self) -> i64 {
        self.cached - self.derived
    }
}

/// Compare every cached total against `SUM(delta)` over the log.
/// An empty result means the projection is consistent.
pub fn verify_totals(conn: &Connection) -> Result<Vec<TotalsDrift>> {
    let state = db::read_ledger_state(conn)?;
    let derived = db::sum_log_by_house(conn)?;

    let mut drifts = Vec::new();
    for house in House::ALL {
        let cached = state.points(house);
        let expected = derived.get(&house).copied().unwrap_or(0);
        if cached != expected {
            drifts.push(TotalsDrift {
                house,
                cached,
                derived: expected,
            });
        }
    }

    Ok(drifts)
}

/// Rewrite every cached total from the log. The log is the source of
/// truth, so on any detected mismatch this is the recovery direction:
/// recompute the cache, never "fix" the log.
pub fn recompute_totals(conn: &mut Connection) -> Result<LedgerState> {
    let derived = db::sum_log_by_house(conn)?;

    let tx = conn
        .transaction()
        .context("Failed to start ledger transaction")?;

    for house in House::ALL {
        let sum = derived.get(&house).copied().unwrap_or(0);
        tx.execute(
            "UPDATE house_totals SET points = ?1 WHERE house = ?2",
            params![sum, house.as_str()],
        )?;
    }
    touch_last_updated(&tx)?;

    tx.commit().context("Failed to commit totals recompute")?;

    info!("totals recomputed from transaction log");

    current_state(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn log_sum(state: &LedgerState, house: House) -> i64 {
        state
            .log
            .iter()
            .filter(|t| t.house == house)
            .map(|t| t.delta)
            .sum()
    }

    #[test]
    fn test_totals_always_equal_log_sum() {
        let mut conn = test_conn();

        apply_delta(&mut conn, House::Gryffindor, 50, "Quidditch win").unwrap();
        apply_delta(&mut conn, House::Gryffindor, -20, "Curfew violation").unwrap();
        apply_delta(&mut conn, House::Slytherin, 30, "Potions").unwrap();
        remove_capped(&mut conn, House::Gryffindor, 10, "Detention").unwrap();
        let state = remove_capped(&mut conn, House::Slytherin, 100, "Cheating").unwrap();

        for house in House::ALL {
            assert_eq!(
                state.points(house),
                log_sum(&state, house),
                "{} total must equal the sum of its log entries",
                house
            );
        }
        assert_eq!(state.points(House::Gryffindor), 20);
        assert_eq!(state.points(House::Slytherin), 0);
    }

    #[test]
    fn test_apply_delta_allows_negative_totals() {
        let mut conn = test_conn();

        let state = apply_delta(&mut conn, House::Hufflepuff, -40, "Incident").unwrap();
        assert_eq!(state.points(House::Hufflepuff), -40);
        assert_eq!(state.log.len(), 1);
    }

    #[test]
    fn test_remove_capped_floors_at_zero() {
        let mut conn = test_conn();

        apply_delta(&mut conn, House::Ravenclaw, 15, "Charms").unwrap();
        let state = remove_capped(&mut conn, House::Ravenclaw, 50, "Library damage").unwrap();

        assert_eq!(state.points(House::Ravenclaw), 0);
        // The recorded fact carries the capped amount, not the requested one
        let removal = state
            .log
            .iter()
            .find(|t| t.delta < 0)
            .expect("removal fact should exist");
        assert_eq!(removal.delta, -15);
    }

    #[test]
    fn test_remove_capped_on_empty_total_records_nothing() {
        let mut conn = test_conn();

        let state = remove_capped(&mut conn, House::Ravenclaw, 25, "Nothing there").unwrap();

        assert_eq!(state.points(House::Ravenclaw), 0);
        assert!(state.log.is_empty(), "no-op removal must not append a fact");
    }

    #[test]
    fn test_remove_capped_clamps_negative_total_up_to_zero() {
        let mut conn = test_conn();

        apply_delta(&mut conn, House::Slytherin, -10, "Sabotage").unwrap();
        let state = remove_capped(&mut conn, House::Slytherin, 5, "More trouble").unwrap();

        // A total below zero comes back up to the floor, and the
        // correction is a recorded fact like any other change
        assert_eq!(state.points(House::Slytherin), 0);
        assert_eq!(state.log.len(), 2);
        let correction = &state.log[0];
        assert_eq!(correction.delta, 10);
        assert_eq!(
            state.points(House::Slytherin),
            log_sum(&state, House::Slytherin),
            "clamped removal must keep totals equal to the log sum"
        );
    }

    #[test]
    fn test_remove_capped_rejects_negative_amount() {
        let mut conn = test_conn();
        assert!(remove_capped(&mut conn, House::Gryffindor, -5, "Bad input").is_err());
    }

    #[test]
    fn test_zero_delta_is_a_silent_noop() {
        let mut conn = test_conn();

        let state = apply_delta(&mut conn, House::Gryffindor, 0, "Nothing").unwrap();

        assert_eq!(state.points(House::Gryffindor), 0);
        assert!(state.log.is_empty());
    }

    #[test]
    fn test_reset_clears_totals_and_log() {
        let mut conn = test_conn();

        apply_delta(&mut conn, House::Gryffindor, 100, "Bravery").unwrap();
        apply_delta(&mut conn, House::Hufflepuff, 60, "Loyalty").unwrap();

        let state = reset(&mut conn).unwrap();
        for house in House::ALL {
            assert_eq!(state.points(house), 0);
        }
        assert!(state.log.is_empty());

        // A fresh log starts from one fact
        let state = apply_delta(&mut conn, House::Ravenclaw, 5, "Fresh start").unwrap();
        assert_eq!(state.log.len(), 1);
    }

    #[test]
    fn test_log_is_newest_first() {
        let mut conn = test_conn();

        apply_delta(&mut conn, House::Gryffindor, 10, "first").unwrap();
        apply_delta(&mut conn, House::Gryffindor, 20, "second").unwrap();
        let state = apply_delta(&mut conn, House::Gryffindor, 30, "third").unwrap();

        let reasons: Vec<&str> = state.log.iter().map(|t| t.reason.as_str()).collect();
        assert_eq!(reasons, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_verify_detects_and_recompute_repairs_drift() {
        let mut conn = test_conn();

        apply_delta(&mut conn, House::Gryffindor, 40, "Valid").unwrap();
        assert!(verify_totals(&conn).unwrap().is_empty());

        // Corrupt the cached total behind the engine's back
        conn.execute(
            "UPDATE house_totals SET points = 999 WHERE house = 'gryffindor'",
            [],
        )
        .unwrap();

        let drifts = verify_totals(&conn).unwrap();
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].house, House::Gryffindor);
        assert_eq!(drifts[0].cached, 999);
        assert_eq!(drifts[0].derived, 40);
        assert_eq!(drifts[0].difference(), 959);

        let state = recompute_totals(&mut conn).unwrap();
        assert_eq!(state.points(House::Gryffindor), 40);
        assert!(verify_totals(&conn).unwrap().is_empty());
    }
}
