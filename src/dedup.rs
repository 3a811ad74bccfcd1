//! Persistent already-sent store keyed by (chat, content key).
//!
//! Backed by a single JSON file, loaded whole at startup and rewritten after
//! every successful send. A store that cannot be read or written is fatal
//! for the run: without it dedup correctness cannot be guaranteed.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Deterministic identity of a post for dedup purposes. Computed over the
/// sanitized extracted fields, so incidental markup whitespace never changes
/// it. Changing any one field changes the key.
pub fn content_key(title: &str, summary: &str, source: &str) -> String {
    let title: String = title.chars().take(1024).collect();
    let summary: String = summary.chars().take(1024).collect();
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"||");
    hasher.update(summary.as_bytes());
    hasher.update(b"||");
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentRecord {
    pub chat: String,
    pub key: String,
    pub sent_at: DateTime<Utc>,
}

pub struct SentStore {
    path: PathBuf,
    index: HashMap<(String, String), DateTime<Utc>>,
}

impl SentStore {
    /// Load the store, creating an empty one when the file does not exist.
    /// Records older than `retention_days` are pruned on load; the store
    /// otherwise only ever grows.
    pub fn load(path: &Path, retention_days: i64) -> Result<Self> {
        let mut index = HashMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::persistence(format!("read {}: {e}", path.display())))?;
            let records: Vec<SentRecord> = serde_json::from_str(&content)
                .map_err(|e| Error::persistence(format!("parse {}: {e}", path.display())))?;

            let cutoff = Utc::now() - Duration::days(retention_days);
            let total = records.len();
            for r in records {
                if r.sent_at >= cutoff {
                    index.insert((r.chat, r.key), r.sent_at);
                }
            }
            if index.len() < total {
                info!(
                    kept = index.len(),
                    pruned = total - index.len(),
                    "pruned expired dedup records"
                );
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            index,
        })
    }

    pub fn seen(&self, chat: &str, key: &str) -> bool {
        self.index
            .contains_key(&(chat.to_string(), key.to_string()))
    }

    /// Upsert and persist. Called only after a dispatch reports success, so
    /// a failed send stays eligible for the next run.
    pub fn record(&mut self, chat: &str, key: &str, sent_at: DateTime<Utc>) -> Result<()> {
        self.index
            .insert((chat.to_string(), key.to_string()), sent_at);
        self.save()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn save(&self) -> Result<()> {
        let records: Vec<SentRecord> = self
            .index
            .iter()
            .map(|((chat, key), sent_at)| SentRecord {
                chat: chat.clone(),
                key: key.clone(),
                sent_at: *sent_at,
            })
            .collect();
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| Error::persistence(e.to_string()))?;
        std::fs::write(&self.path, json)
            .map_err(|e| Error::persistence(format!("write {}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_is_pure() {
        let a = content_key("Заголовок", "Текст", "@chan");
        let b = content_key("Заголовок", "Текст", "@chan");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn content_key_changes_with_any_field() {
        let base = content_key("t", "s", "@a");
        assert_ne!(base, content_key("t2", "s", "@a"));
        assert_ne!(base, content_key("t", "s2", "@a"));
        assert_ne!(base, content_key("t", "s", "@b"));
    }

    #[test]
    fn record_then_seen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");

        let mut store = SentStore::load(&path, 30).unwrap();
        assert!(!store.seen("@chat", "k1"));
        store.record("@chat", "k1", Utc::now()).unwrap();
        assert!(store.seen("@chat", "k1"));
        assert!(!store.seen("@other", "k1"));

        // reload from disk
        let store = SentStore::load(&path, 30).unwrap();
        assert!(store.seen("@chat", "k1"));
    }

    #[test]
    fn upsert_replaces_timestamp_without_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");

        let mut store = SentStore::load(&path, 30).unwrap();
        store.record("@chat", "k", Utc::now()).unwrap();
        store.record("@chat", "k", Utc::now()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn prunes_expired_records_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");

        let mut store = SentStore::load(&path, 30).unwrap();
        store
            .record("@chat", "old", Utc::now() - Duration::days(45))
            .unwrap();
        store.record("@chat", "new", Utc::now()).unwrap();

        let store = SentStore::load(&path, 30).unwrap();
        assert!(!store.seen("@chat", "old"));
        assert!(store.seen("@chat", "new"));
    }

    #[test]
    fn corrupt_store_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            SentStore::load(&path, 30),
            Err(Error::Persistence(_))
        ));
    }
}
