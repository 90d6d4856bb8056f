//! Durable per-user record store
//!
//! SQLite-backed storage for conversation summaries, extracted facts,
//! user settings and the append-only conversation history. Reads for an
//! unknown user return empty defaults, never an error; corrupt JSON in a
//! facts/settings column decodes to an empty default.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::memory::types::{ChatMessage, Role};

/// Facts kept per user; oldest entries are dropped past this bound
const MAX_FACTS: usize = 50;

const POOL_SIZE: u32 = 8;
const BUSY_TIMEOUT_MS: u32 = 30_000;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS user_records (
    user_id TEXT PRIMARY KEY,
    summary TEXT NOT NULL DEFAULT '',
    facts TEXT NOT NULL DEFAULT '[]',
    settings TEXT NOT NULL DEFAULT '{}',
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS conversation_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_user ON conversation_history(user_id);
";

/// Aggregate view of a user's record
#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    /// Free-text conversation summary, empty when none exists
    pub summary: String,
    /// Extracted facts, insertion-ordered
    pub facts: Vec<String>,
    /// Last write time, `None` for an unknown user
    pub updated_at: Option<DateTime<Utc>>,
}

/// One row of the append-only conversation history
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Role of the speaker
    pub role: Role,
    /// Content of the message
    pub content: String,
    /// When the row was written
    pub timestamp: DateTime<Utc>,
}

/// SQLite pragma customizer applied to every new pooled connection
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))?;
        Ok(())
    }
}

/// Durable per-user record store
pub struct RecordStore {
    pool: Pool<SqliteConnectionManager>,
}

impl RecordStore {
    /// Open a file-backed store, creating parent directories and schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::build(SqliteConnectionManager::file(path), POOL_SIZE)
    }

    /// Open an in-memory store (single connection, for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::build(SqliteConnectionManager::memory(), 1)
    }

    fn build(manager: SqliteConnectionManager, pool_size: u32) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(PragmaCustomizer {
                busy_timeout_ms: BUSY_TIMEOUT_MS,
            }))
            .build(manager)?;

        let store = Self { pool };
        store.pool.get()?.execute_batch(SCHEMA)?;
        Ok(store)
    }

    /// The user's summary, empty when the user is unknown
    pub fn get_summary(&self, user_id: &str) -> Result<String> {
        let conn = self.pool.get()?;
        let summary = conn
            .query_row(
                "SELECT summary FROM user_records WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(summary.unwrap_or_default())
    }

    /// Upsert the user's summary, preserving facts and settings
    pub fn update_summary(&self, user_id: &str, summary: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO user_records (user_id, summary, facts, settings, updated_at)
             VALUES (?1, ?2, '[]', '{}', ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 summary = excluded.summary,
                 updated_at = excluded.updated_at",
            params![user_id, summary, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// The user's facts, insertion-ordered; empty when unknown
    pub fn get_facts(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.pool.get()?;
        let facts_json = conn
            .query_row(
                "SELECT facts FROM user_records WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(facts_json.map(|s| parse_facts_json(&s)).unwrap_or_default())
    }

    /// Add a fact unless an identical one is already stored.
    ///
    /// Exact case-sensitive match; the list stays insertion-ordered and is
    /// bounded at `MAX_FACTS` with the oldest entries dropped first.
    pub fn add_fact(&self, user_id: &str, fact: &str) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let facts_json = tx
            .query_row(
                "SELECT facts FROM user_records WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        let mut facts = facts_json.map(|s| parse_facts_json(&s)).unwrap_or_default();
        if !facts.iter().any(|f| f == fact) {
            facts.push(fact.to_string());
        }
        while facts.len() > MAX_FACTS {
            facts.remove(0);
        }

        let json = serde_json::to_string(&facts)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        tx.execute(
            "INSERT INTO user_records (user_id, summary, facts, settings, updated_at)
             VALUES (?1, '', ?2, '{}', ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 facts = excluded.facts,
                 updated_at = excluded.updated_at",
            params![user_id, json, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// A single setting value, `None` when unset or the user is unknown
    pub fn get_setting(&self, user_id: &str, key: &str) -> Result<Option<Value>> {
        let conn = self.pool.get()?;
        let settings_json = conn
            .query_row(
                "SELECT settings FROM user_records WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(settings_json
            .map(|s| parse_settings_json(&s))
            .and_then(|mut settings| settings.remove(key)))
    }

    /// Merge one setting into the user's settings map, preserving other keys.
    ///
    /// The read-modify-write runs inside a single immediate transaction so
    /// concurrent writers for the same user cannot lose updates.
    pub fn set_setting(&self, user_id: &str, key: &str, value: Value) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let settings_json = tx
            .query_row(
                "SELECT settings FROM user_records WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        let mut settings = settings_json
            .map(|s| parse_settings_json(&s))
            .unwrap_or_default();
        settings.insert(key.to_string(), value);

        let json = serde_json::to_string(&settings)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        tx.execute(
            "INSERT INTO user_records (user_id, summary, facts, settings, updated_at)
             VALUES (?1, '', '[]', ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 settings = excluded.settings,
                 updated_at = excluded.updated_at",
            params![user_id, json, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Bulk-append messages to the conversation history
    pub fn save_conversation(&self, user_id: &str, messages: &[ChatMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for msg in messages {
            tx.execute(
                "INSERT INTO conversation_history (user_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, msg.role.as_str(), msg.content, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// The most recent `limit` history rows, returned oldest-first
    pub fn get_recent_history(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, timestamp FROM conversation_history
             WHERE user_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let mut entries: Vec<HistoryEntry> = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(role, content, ts)| HistoryEntry {
                role: Role::parse(&role),
                content,
                timestamp: parse_timestamp(&ts),
            })
            .collect();

        entries.reverse();
        Ok(entries)
    }

    /// Summary, facts and last update time in one read
    pub fn get_user_info(&self, user_id: &str) -> Result<UserInfo> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT summary, facts, updated_at FROM user_records WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(match row {
            Some((summary, facts_json, updated_at)) => UserInfo {
                summary,
                facts: parse_facts_json(&facts_json),
                updated_at: DateTime::parse_from_rfc3339(&updated_at)
                    .map(|d| d.with_timezone(&Utc))
                    .ok(),
            },
            None => UserInfo::default(),
        })
    }

    /// Delete the user's record and every history row
    pub fn clear_user(&self, user_id: &str) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM user_records WHERE user_id = ?1",
            params![user_id],
        )?;
        tx.execute(
            "DELETE FROM conversation_history WHERE user_id = ?1",
            params![user_id],
        )?;
        tx.commit()?;
        debug!(user_id, "cleared user record and history");
        Ok(())
    }
}

fn parse_facts_json(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

fn parse_settings_json(json: &str) -> serde_json::Map<String, Value> {
    serde_json::from_str(json).unwrap_or_default()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> RecordStore {
        RecordStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_unknown_user_reads_return_defaults() {
        let store = store();
        assert_eq!(store.get_summary("ghost").unwrap(), "");
        assert!(store.get_facts("ghost").unwrap().is_empty());
        assert!(store.get_setting("ghost", "theme").unwrap().is_none());
        assert!(store.get_recent_history("ghost", 10).unwrap().is_empty());

        let info = store.get_user_info("ghost").unwrap();
        assert_eq!(info.summary, "");
        assert!(info.facts.is_empty());
        assert!(info.updated_at.is_none());
    }

    #[test]
    fn test_summary_upsert_roundtrip() {
        let store = store();

        store.update_summary("u1", "Talked about Rust.").unwrap();
        assert_eq!(store.get_summary("u1").unwrap(), "Talked about Rust.");

        store.update_summary("u1", "Now also chess.").unwrap();
        assert_eq!(store.get_summary("u1").unwrap(), "Now also chess.");
    }

    #[test]
    fn test_update_summary_preserves_facts_and_settings() {
        let store = store();
        store.add_fact("u1", "likes chess").unwrap();
        store.set_setting("u1", "lang", json!("en")).unwrap();

        store.update_summary("u1", "A summary.").unwrap();

        assert_eq!(store.get_facts("u1").unwrap(), vec!["likes chess"]);
        assert_eq!(store.get_setting("u1", "lang").unwrap(), Some(json!("en")));
    }

    #[test]
    fn test_add_fact_is_idempotent() {
        let store = store();
        store.add_fact("u1", "lives in Berlin").unwrap();
        store.add_fact("u1", "lives in Berlin").unwrap();

        assert_eq!(store.get_facts("u1").unwrap(), vec!["lives in Berlin"]);
    }

    #[test]
    fn test_facts_keep_insertion_order() {
        let store = store();
        store.add_fact("u1", "first").unwrap();
        store.add_fact("u1", "second").unwrap();
        store.add_fact("u1", "third").unwrap();

        assert_eq!(
            store.get_facts("u1").unwrap(),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn test_facts_are_case_sensitive() {
        let store = store();
        store.add_fact("u1", "Likes tea").unwrap();
        store.add_fact("u1", "likes tea").unwrap();

        assert_eq!(store.get_facts("u1").unwrap().len(), 2);
    }

    #[test]
    fn test_facts_capped_dropping_oldest() {
        let store = store();
        for i in 0..MAX_FACTS + 5 {
            store.add_fact("u1", &format!("fact {i}")).unwrap();
        }

        let facts = store.get_facts("u1").unwrap();
        assert_eq!(facts.len(), MAX_FACTS);
        assert_eq!(facts[0], "fact 5");
        assert_eq!(facts[MAX_FACTS - 1], format!("fact {}", MAX_FACTS + 4));
    }

    #[test]
    fn test_settings_roundtrip_and_key_isolation() {
        let store = store();
        store.set_setting("u1", "persona", json!("pirate")).unwrap();
        store.set_setting("u1", "volume", json!(7)).unwrap();

        assert_eq!(
            store.get_setting("u1", "persona").unwrap(),
            Some(json!("pirate"))
        );
        assert_eq!(store.get_setting("u1", "volume").unwrap(), Some(json!(7)));

        // Overwriting one key never erases another
        store.set_setting("u1", "persona", json!("butler")).unwrap();
        assert_eq!(
            store.get_setting("u1", "persona").unwrap(),
            Some(json!("butler"))
        );
        assert_eq!(store.get_setting("u1", "volume").unwrap(), Some(json!(7)));
    }

    #[test]
    fn test_history_roundtrip_oldest_first() {
        let store = store();
        let messages: Vec<ChatMessage> = (0..6)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                ChatMessage::new(role, format!("m{i}"))
            })
            .collect();
        store.save_conversation("u1", &messages).unwrap();

        let recent = store.get_recent_history("u1", 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m3");
        assert_eq!(recent[1].content, "m4");
        assert_eq!(recent[2].content, "m5");
        assert_eq!(recent[0].role, Role::Assistant);
    }

    #[test]
    fn test_clear_user_removes_record_and_history() {
        let store = store();
        store.update_summary("u1", "summary").unwrap();
        store.add_fact("u1", "a fact").unwrap();
        store
            .save_conversation("u1", &[ChatMessage::new(Role::User, "hello")])
            .unwrap();

        store.clear_user("u1").unwrap();

        assert_eq!(store.get_summary("u1").unwrap(), "");
        assert!(store.get_facts("u1").unwrap().is_empty());
        assert!(store.get_recent_history("u1", 10).unwrap().is_empty());
        assert!(store.get_user_info("u1").unwrap().updated_at.is_none());
    }

    #[test]
    fn test_get_user_info_aggregates() {
        let store = store();
        store.update_summary("u1", "summary text").unwrap();
        store.add_fact("u1", "a fact").unwrap();

        let info = store.get_user_info("u1").unwrap();
        assert_eq!(info.summary, "summary text");
        assert_eq!(info.facts, vec!["a fact"]);
        assert!(info.updated_at.is_some());
    }

    #[test]
    fn test_corrupt_json_columns_read_as_defaults() {
        let store = store();
        store.add_fact("u1", "valid fact").unwrap();

        {
            let conn = store.pool.get().unwrap();
            conn.execute(
                "UPDATE user_records SET facts = 'not json', settings = '[broken' WHERE user_id = 'u1'",
                [],
            )
            .unwrap();
        }

        assert!(store.get_facts("u1").unwrap().is_empty());
        assert!(store.get_setting("u1", "any").unwrap().is_none());

        // Writes through the lenient path recover the columns
        store.add_fact("u1", "fresh fact").unwrap();
        assert_eq!(store.get_facts("u1").unwrap(), vec!["fresh fact"]);
    }
}
