// House Cup admin CLI
//
// Thin wrapper over the library: every command opens the database, calls
// one engine operation, and prints the result.

use anyhow::{bail, Result};
use std::env;
use std::fs::File;
use std::path::PathBuf;

use house_cup::{
    apply_delta, current_state, delete_costume_entry, export_transactions_csv,
    insert_costume_entry, leading_house, list_costume_entries, open_database,
    read_voting_settings, recompute_totals, remove_capped, reset, standings, tally, total_points,
    verify_totals, write_voting_settings, House, ImageStore, LedgerState, LocalImageStore,
};

fn db_path() -> PathBuf {
    env::var("HOUSE_CUP_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("house_cup.db"))
}

fn media_dir() -> PathBuf {
    env::var("HOUSE_CUP_MEDIA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("media"))
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("standings");

    match command {
        "init" => cmd_init(),
        "award" => cmd_points(&args[2..], true),
        "deduct" => cmd_points(&args[2..], false),
        "standings" => cmd_standings(),
        "history" => cmd_history(&args[2..]),
        "reset" => cmd_reset(&args[2..]),
        "verify" => cmd_verify(&args[2..]),
        "results" => cmd_results(),
        "costume" => cmd_costume(&args[2..]),
        "voting" => cmd_voting(&args[2..]),
        "export" => cmd_export(&args[2..]),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: house-cup <command>");
    eprintln!("  init                              create/upgrade the database");
    eprintln!("  award <house> <points> [reason]   add points");
    eprintln!("  deduct <house> <points> [reason]  remove points (floors at zero)");
    eprintln!("  standings                         show the leaderboard");
    eprintln!("  history [n]                       show recent transactions");
    eprintln!("  reset --yes                       zero totals and DISCARD the log");
    eprintln!("  verify [--fix]                    check totals against the log");
    eprintln!("  results                           costume contest tally");
    eprintln!("  costume add <name> <image-path>   store the photo and enter the contest");
    eprintln!("  costume list                      show all entries");
    eprintln!("  costume delete <id>               remove an entry (ballots stay)");
    eprintln!("  voting on|off                     open or close ballot submission");
    eprintln!("  export <path>                     write the log as CSV");
    eprintln!("\nDatabase path: $HOUSE_CUP_DB (default ./house_cup.db)");
}

fn cmd_init() -> Result<()> {
    let path = db_path();
    open_database(&path)?;
    println!("✓ Database ready at {:?}", path);
    Ok(())
}

fn cmd_points(args: &[String], award: bool) -> Result<()> {
    let (house_arg, points_arg) = match (args.first(), args.get(1)) {
        (Some(h), Some(p)) => (h, p),
        _ => {
            print_usage();
            bail!("expected: <house> <points> [reason]");
        }
    };

    let house: House = house_arg.parse()?;
    let points: i64 = points_arg.parse()?;
    let default_reason = if award { "Points awarded" } else { "Points removed" };
    let reason = args.get(2).map(String::as_str).unwrap_or(default_reason);

    let mut conn = open_database(&db_path())?;
    let state = if award {
        apply_delta(&mut conn, house, points, reason)?
    } else {
        remove_capped(&mut conn, house, points, reason)?
    };

    println!(
        "✓ {} now has {} points",
        house.display_name(),
        state.points(house)
    );
    Ok(())
}

fn print_board(state: &LedgerState) {
    println!("🏆 House Cup Standings");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for row in standings(state) {
        println!(
            "  {}. {:<12} {:>6}",
            row.rank,
            row.house.display_name(),
            row.points
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Total awarded: {}", total_points(state));
    match leading_house(state) {
        Some(house) => println!("  In the lead:   {}", house.display_name()),
        None => println!("  In the lead:   (no leader yet)"),
    }
}

fn cmd_standings() -> Result<()> {
    let conn = open_database(&db_path())?;
    let state = current_state(&conn)?;
    print_board(&state);
    Ok(())
}

fn cmd_history(args: &[String]) -> Result<()> {
    let limit: usize = match args.first() {
        Some(raw) => raw.parse()?,
        None => 20,
    };

    let conn = open_database(&db_path())?;
    let state = current_state(&conn)?;

    if state.log.is_empty() {
        println!("No transactions yet.");
        return Ok(());
    }

    println!("📒 Last {} transactions (newest first)", limit.min(state.log.len()));
    for tx in state.log.iter().take(limit) {
        println!(
            "  {}  {:<12} {:+5}  {}",
            tx.occurred_at.format("%H:%M:%S"),
            tx.house.display_name(),
            tx.delta,
            tx.reason
        );
    }
    Ok(())
}

fn cmd_reset(args: &[String]) -> Result<()> {
    if args.first().map(String::as_str) != Some("--yes") {
        bail!("reset discards the whole transaction log; pass --yes to confirm");
    }

    let mut conn = open_database(&db_path())?;
    reset(&mut conn)?;
    println!("✓ All totals zeroed, transaction log discarded");
    Ok(())
}

fn cmd_verify(args: &[String]) -> Result<()> {
    let fix = args.first().map(String::as_str) == Some("--fix");
    let mut conn = open_database(&db_path())?;

    let drifts = verify_totals(&conn)?;
    if drifts.is_empty() {
        println!("✓ Totals match the transaction log");
        return Ok(());
    }

    println!("⚠ Cached totals drifted from the log:");
    for drift in &drifts {
        println!(
            "  {:<12} cached {} vs derived {} (off by {:+})",
            drift.house.display_name(),
            drift.cached,
            drift.derived,
            drift.difference()
        );
    }

    if fix {
        recompute_totals(&mut conn)?;
        println!("✓ Totals recomputed from the log");
    } else {
        println!("Run `house-cup verify --fix` to recompute from the log.");
    }
    Ok(())
}

fn cmd_results() -> Result<()> {
    let conn = open_database(&db_path())?;
    let settings = read_voting_settings(&conn)?;
    let results = tally(&conn)?;
    let ballots = house_cup::ballot_count(&conn)?;

    println!(
        "🎃 Costume Contest ({}, {} ballots)",
        if settings.enabled { "voting OPEN" } else { "voting closed" },
        ballots
    );
    if results.is_empty() {
        println!("  No entries yet.");
        return Ok(());
    }
    for (idx, result) in results.iter().enumerate() {
        println!(
            "  {}. {:<20} {:>3} pts  (🥇{} 🥈{} 🥉{})",
            idx + 1,
            result.costume_name,
            result.score,
            result.first_place_votes,
            result.second_place_votes,
            result.third_place_votes
        );
    }
    Ok(())
}

fn cmd_costume(args: &[String]) -> Result<()> {
    let conn = open_database(&db_path())?;

    match args.first().map(String::as_str) {
        Some("add") => {
            let (name, image_path) = match (args.get(1), args.get(2)) {
                (Some(n), Some(p)) => (n, PathBuf::from(p)),
                _ => bail!("expected: costume add <name> <image-path>"),
            };

            let bytes = std::fs::read(&image_path)?;
            let original_name = image_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload");

            let store = LocalImageStore::new(media_dir());
            let image_url = store.store(&bytes, original_name)?;

            let entry = insert_costume_entry(&conn, name, &image_url)?;
            println!("✓ Entry {} ({}) at {}", entry.id, entry.name, entry.image_url);
        }
        Some("list") => {
            let entries = list_costume_entries(&conn)?;
            if entries.is_empty() {
                println!("No costume entries yet.");
                return Ok(());
            }
            for entry in entries {
                println!("  {:>3}  {:<20} {}", entry.id, entry.name, entry.image_url);
            }
        }
        Some("delete") => {
            let id: i64 = match args.get(1) {
                Some(raw) => raw.parse()?,
                None => bail!("expected: costume delete <id>"),
            };
            if delete_costume_entry(&conn, id)? {
                println!("✓ Entry {} deleted (existing ballots stay)", id);
            } else {
                bail!("no costume entry {}", id);
            }
        }
        _ => bail!("expected: costume add|list|delete"),
    }
    Ok(())
}

fn cmd_voting(args: &[String]) -> Result<()> {
    let conn = open_database(&db_path())?;

    match args.first().map(String::as_str) {
        Some("on") => {
            write_voting_settings(&conn, true)?;
            println!("✓ Voting is OPEN");
        }
        Some("off") => {
            write_voting_settings(&conn, false)?;
            println!("✓ Voting is closed");
        }
        _ => {
            let settings = read_voting_settings(&conn)?;
            println!(
                "Voting is {}",
                if settings.enabled { "OPEN" } else { "closed" }
            );
        }
    }
    Ok(())
}

fn cmd_export(args: &[String]) -> Result<()> {
    let path = match args.first() {
        Some(p) => PathBuf::from(p),
        None => bail!("expected: export <path>"),
    };

    let conn = open_database(&db_path())?;
    let file = File::create(&path)?;
    let rows = export_transactions_csv(&conn, file)?;
    println!("✓ Exported {} transactions to {:?}", rows, path);
    Ok(())
}
