// 🗄️ Storage - Key-value records + audit trail
//
// The application treats persistence as an opaque key-value store:
// `save(key, value)` / `load(key) -> value|null`. Every mutation is also
// recorded as an Event so purchases and edits can be audited later.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

/// Event for audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Opaque key-value persistence collaborator.
///
/// Implementations take `&self` so a store can be shared between repositories
/// (and across request handlers) without an outer lock.
pub trait KeyValueStore: Send + Sync {
    fn save(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    fn load(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Compare-and-swap on a versioned record: replace the value only if the
    /// stored record's `version` field equals `expected_version`.
    /// Returns false (and writes nothing) otherwise.
    fn save_if_version(&self, key: &str, expected_version: i64, value: &serde_json::Value) -> Result<bool>;

    /// Returns true if the key existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, sorted
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    fn append_event(&self, event: &Event) -> Result<()>;

    /// Events for one entity, newest first
    fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>>;
}

/// Serialize and save a typed record
pub fn save_record<T: Serialize>(store: &dyn KeyValueStore, key: &str, record: &T) -> Result<()> {
    let value = serde_json::to_value(record).with_context(|| format!("Failed to serialize {}", key))?;
    store.save(key, &value)
}

/// Serialize and write a typed record only if the stored one is still at `expected_version`
pub fn save_record_if_version<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    expected_version: i64,
    record: &T,
) -> Result<bool> {
    let value = serde_json::to_value(record).with_context(|| format!("Failed to serialize {}", key))?;
    store.save_if_version(key, expected_version, &value)
}

/// Load and deserialize a typed record
pub fn load_record<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.load(key)? {
        Some(value) => {
            let record = serde_json::from_value(value)
                .with_context(|| format!("Failed to deserialize {}", key))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        setup_database(&conn)?;
        tracing::info!(path = ?path, "opened campaign database");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn save(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn()?.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let json: Option<String> = self
            .conn()?
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;

        match json {
            Some(s) => Ok(Some(
                serde_json::from_str(&s).with_context(|| format!("Corrupt value for key {}", key))?,
            )),
            None => Ok(None),
        }
    }

    fn save_if_version(&self, key: &str, expected_version: i64, value: &serde_json::Value) -> Result<bool> {
        let json = serde_json::to_string(value)?;
        // Single statement, so the check and the write can't interleave with another writer
        let updated = self.conn()?.execute(
            "UPDATE kv SET value = ?3, updated_at = ?4
             WHERE key = ?1 AND json_extract(value, '$.version') = ?2",
            params![key, expected_version, json, Utc::now().to_rfc3339()],
        )?;
        Ok(updated == 1)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let deleted = self.conn()?.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;

        let keys = stmt
            .query_map(params![prefix, prefix.chars().count() as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(keys)
    }

    fn append_event(&self, event: &Event) -> Result<()> {
        let data_json = serde_json::to_string(&event.data)?;

        self.conn()?.execute(
            "INSERT INTO events (
                event_id, timestamp, event_type, entity_type, entity_id, data, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                data_json,
                event.actor,
            ],
        )?;

        Ok(())
    }

    fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY id DESC",
        )?;

        let rows = stmt
            .query_map(params![entity_type, entity_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| {
                Ok(Event {
                    event_id,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .context("Bad event timestamp")?
                        .with_timezone(&Utc),
                    event_type,
                    entity_type,
                    entity_id,
                    data: serde_json::from_str(&data).context("Bad event payload")?,
                    actor,
                })
            })
            .collect()
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-process store for tests and ephemeral server sessions
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, serde_json::Value>>,
    events: RwLock<Vec<Event>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("memory store lock poisoned")
}

impl KeyValueStore for MemoryStore {
    fn save(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.records.write().map_err(poisoned)?.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.records.read().map_err(poisoned)?.get(key).cloned())
    }

    fn save_if_version(&self, key: &str, expected_version: i64, value: &serde_json::Value) -> Result<bool> {
        let mut records = self.records.write().map_err(poisoned)?;
        let current = records
            .get(key)
            .and_then(|v| v.get("version"))
            .and_then(|v| v.as_i64());

        if current != Some(expected_version) {
            return Ok(false);
        }
        records.insert(key.to_string(), value.clone());
        Ok(true)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.records.write().map_err(poisoned)?.remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    fn append_event(&self, event: &Event) -> Result<()> {
        self.events.write().map_err(poisoned)?.push(event.clone());
        Ok(())
    }

    fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events
            .iter()
            .rev()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
