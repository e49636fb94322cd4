// 🪪 Voter Identity Resolver - stable pseudo-identity per device
//
// No accounts: a voter id is a rolling hash over weakly-identifying client
// signals, cached in the client's stable store so the same device resolves
// to the same id across sessions.
//
// This is best-effort deduplication, NOT a security control. It is an
// accepted limitation that two devices can collide on a fingerprint and
// that clearing local storage mints a fresh identity. Keep callers behind
// the resolver so an authenticated scheme can replace it without touching
// the tally engine.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Storage key for the cached id in the stable store.
pub const VOTER_ID_KEY: &str = "costume_voter_id";

// ============================================================================
// FINGERPRINT SIGNALS
// ============================================================================

/// The fixed set of client signals folded into one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSignals {
    pub user_agent: String,
    pub language: String,
    /// Display geometry, e.g. "1920x1080".
    pub screen: String,
    /// Minutes offset from UTC.
    pub timezone_offset_min: i32,
    /// Rendering-surface capability string (canvas data URL on the client).
    pub canvas: String,
}

impl FingerprintSignals {
    /// Join the signals in their fixed order. The order is part of the
    /// identity contract: reordering would re-identify every voter.
    pub fn fingerprint(&self) -> String {
        [
            self.user_agent.as_str(),
            self.language.as_str(),
            self.screen.as_str(),
            &self.timezone_offset_min.to_string(),
            self.canvas.as_str(),
        ]
        .join("|")
    }
}

// ============================================================================
// ROLLING HASH
// ============================================================================

/// Fold each UTF-16 code unit into a wrapping 32-bit accumulator
/// (`h = h * 31 + code`), then base-36 encode the absolute value.
pub fn fingerprint_hash(input: &str) -> String {
    let mut hash: i32 = 0;
    for code in input.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(code as i32);
    }
    to_base36(hash.unsigned_abs())
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}

// ============================================================================
// STABLE STORE (client-local storage collaborator)
// ============================================================================

/// Key-value store that survives across sessions on the same client.
pub trait StableStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store, for tests and ephemeral callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StableStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a small JSON map on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl JsonFileStore {
    /// Load the map from `path`, starting empty when the file is absent.
    pub fn open(path: PathBuf) -> Result<Self> {
        let values = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt stable store at {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        Ok(JsonFileStore { path, values })
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write stable store at {:?}", self.path))
    }
}

impl StableStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Return the cached voter id for this client, or mint one from the
/// fingerprint signals and cache it.
pub fn resolve_voter_id<S: StableStore>(
    store: &mut S,
    signals: &FingerprintSignals,
) -> Result<String> {
    if let Some(cached) = store.get(VOTER_ID_KEY) {
        debug!("reusing cached voter id");
        return Ok(cached);
    }

    let voter_id = fingerprint_hash(&signals.fingerprint());
    store.set(VOTER_ID_KEY, &voter_id)?;
    debug!("minted voter id from fingerprint");
    Ok(voter_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signals() -> FingerprintSignals {
        FingerprintSignals {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
            language: "en-US".to_string(),
            screen: "1920x1080".to_string(),
            timezone_offset_min: 300,
            canvas: "data:image/png;base64,iVBORw0KGgo".to_string(),
        }
    }

    #[test]
    fn test_hash_is_deterministic_and_base36() {
        let a = fingerprint_hash("costume-voting");
        let b = fingerprint_hash("costume-voting");

        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_hash_known_values() {
        // h("a") = 97 -> "2p" in base 36
        assert_eq!(fingerprint_hash("a"), "2p");
        // h("ab") = 97*31 + 98 = 3105
        assert_eq!(fingerprint_hash("ab"), to_base36(3105));
        assert_eq!(fingerprint_hash(""), "0");
    }

    #[test]
    fn test_hash_wraps_instead_of_overflowing() {
        // Long input forces 32-bit wraparound; must not panic and must
        // stay stable.
        let long = "x".repeat(10_000);
        assert_eq!(fingerprint_hash(&long), fingerprint_hash(&long));
    }

    #[test]
    fn test_fingerprint_joins_in_fixed_order() {
        let f = sample_signals().fingerprint();
        let parts: Vec<&str> = f.split('|').collect();

        assert_eq!(parts.len(), 5);
        assert_eq!(parts[1], "en-US");
        assert_eq!(parts[3], "300");
    }

    #[test]
    fn test_resolver_reuses_cached_id() {
        let mut store = MemoryStore::new();

        let first = resolve_voter_id(&mut store, &sample_signals()).unwrap();
        // Even with different signals, the cached id wins (same device)
        let mut changed = sample_signals();
        changed.screen = "800x600".to_string();
        let second = resolve_voter_id(&mut store, &changed).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_cleared_store_mints_new_identity() {
        let mut store = MemoryStore::new();
        let first = resolve_voter_id(&mut store, &sample_signals()).unwrap();

        let mut fresh = MemoryStore::new();
        let mut changed = sample_signals();
        changed.user_agent = "Something else".to_string();
        let second = resolve_voter_id(&mut fresh, &changed).unwrap();

        // Documented limitation: clearing the store re-identifies the voter
        assert_ne!(first, second);
    }

    #[test]
    fn test_json_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client").join("store.json");

        {
            let mut store = JsonFileStore::open(path.clone()).unwrap();
            store.set(VOTER_ID_KEY, "1a2b3c").unwrap();
        }

        let store = JsonFileStore::open(path).unwrap();
        assert_eq!(store.get(VOTER_ID_KEY).as_deref(), Some("1a2b3c"));
    }
}
