// 📤 Audit Export - transaction log to CSV
//
// The reset operation discards the log for good, so admins export it
// first when they want a keepsake of the evening.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::io::Write;

use crate::db;

#[derive(Debug, Serialize)]
struct TransactionRow<'a> {
    id: &'a str,
    house: &'a str,
    delta: i64,
    reason: &'a str,
    occurred_at: String,
}

/// Write the full point-transaction log (newest first) as CSV.
/// Returns the number of rows written.
pub fn export_transactions_csv<W: Write>(conn: &Connection, writer: W) -> Result<usize> {
    let state = db::read_ledger_state(conn)?;

    let mut wtr = csv::Writer::from_writer(writer);
    for tx in &state.log {
        wtr.serialize(TransactionRow {
            id: &tx.id,
            house: tx.house.as_str(),
            delta: tx.delta,
            reason: &tx.reason,
            occurred_at: tx.occurred_at.to_rfc3339(),
        })
        .context("Failed to serialize transaction row")?;
    }
    wtr.flush().context("Failed to flush CSV output")?;

    Ok(state.log.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::ledger::apply_delta;
    use crate::teams::House;

    #[test]
    fn test_export_writes_header_and_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        apply_delta(&mut conn, House::Gryffindor, 10, "Bravery").unwrap();
        apply_delta(&mut conn, House::Slytherin, -5, "Mischief").unwrap();

        let mut out = Vec::new();
        let rows = export_transactions_csv(&conn, &mut out).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,house,delta,reason,occurred_at"
        );
        // Newest first
        assert!(lines.next().unwrap().contains("slytherin"));
        assert!(lines.next().unwrap().contains("gryffindor"));
    }

    #[test]
    fn test_export_of_empty_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut out = Vec::new();
        let rows = export_transactions_csv(&conn, &mut out).unwrap();
        assert_eq!(rows, 0);
    }
}
