// 🧝 Character Entity - Player character sheets
//
// "Name is a VALUE (can change), UUID is IDENTITY (never changes)"
//
// - Each character has a stable UUID identity
// - Every write produces a new version (monotonic counter)
// - The purse is replaced wholesale on every mutation
// - Writes can be made conditional on the version that was read, so two
//   racing purchases can't both spend the same coins

use crate::currency::{LedgerError, Money};
use crate::db::{load_record, save_record, save_record_if_version, Event, KeyValueStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

const KEY_PREFIX: &str = "character:";

fn key_for(id: &str) -> String {
    format!("{}{}", KEY_PREFIX, id)
}

// ============================================================================
// CHARACTER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    pub name: String,
    pub class: String,
    pub level: u32,
    pub max_hit_points: u32,
    pub hit_points: u32,
    pub armor_class: u32,
    pub initiative_bonus: i32,

    /// Coin purse
    pub purse: Money,

    #[serde(default)]
    pub inventory: Vec<InventoryItem>,

    #[serde(default)]
    pub notes: String,

    /// Monotonic version, starts at 1
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Character {
    pub fn new(name: &str, class: &str, level: u32, max_hit_points: u32) -> Self {
        Character {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            class: class.to_string(),
            level,
            max_hit_points,
            hit_points: max_hit_points,
            armor_class: 10,
            initiative_bonus: 0,
            purse: Money::zero(),
            inventory: Vec::new(),
            notes: String::new(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn with_purse(mut self, purse: Money) -> Self {
        self.purse = purse;
        self
    }

    /// Reduce hit points, floored at 0
    pub fn apply_damage(&mut self, amount: u32) {
        self.hit_points = self.hit_points.saturating_sub(amount);
    }

    /// Restore hit points, capped at max
    pub fn heal(&mut self, amount: u32) {
        self.hit_points = self.hit_points.saturating_add(amount).min(self.max_hit_points);
    }

    pub fn is_down(&self) -> bool {
        self.hit_points == 0
    }

    /// Add coins to the purse (loot, rewards)
    pub fn credit(&mut self, amount: &Money) -> Result<(), LedgerError> {
        self.purse = self.purse.add(amount)?;
        Ok(())
    }

    /// Add items to the inventory, stacking by item id
    pub fn add_to_inventory(&mut self, item_id: &str, name: &str, quantity: u32) {
        match self.inventory.iter_mut().find(|i| i.item_id == item_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => self.inventory.push(InventoryItem {
                item_id: item_id.to_string(),
                name: name.to_string(),
                quantity,
            }),
        }
    }

    pub fn inventory_count(&self, item_id: &str) -> u32 {
        self.inventory
            .iter()
            .find(|i| i.item_id == item_id)
            .map(|i| i.quantity)
            .unwrap_or(0)
    }
}

// ============================================================================
// REPOSITORY
// ============================================================================

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("character not found: {0}")]
    NotFound(String),

    #[error("character {id} changed since it was read (expected version {expected}, found {found})")]
    VersionConflict { id: String, expected: i64, found: i64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Character sheets persisted through the key-value store
#[derive(Clone)]
pub struct CharacterRepository {
    store: Arc<dyn KeyValueStore>,
    actor: String,
}

impl CharacterRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, actor: &str) -> Self {
        CharacterRepository {
            store,
            actor: actor.to_string(),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn create(&self, character: Character) -> Result<Character> {
        save_record(self.store.as_ref(), &key_for(&character.id), &character)?;
        self.store.append_event(&Event::new(
            "character_created",
            "character",
            &character.id,
            serde_json::json!({ "name": character.name, "purse": character.purse }),
            &self.actor,
        ))?;

        tracing::info!(id = %character.id, name = %character.name, "created character");
        Ok(character)
    }

    pub fn get(&self, id: &str) -> Result<Option<Character>> {
        load_record(self.store.as_ref(), &key_for(id))
    }

    /// All characters, sorted by name
    pub fn list(&self) -> Result<Vec<Character>> {
        let mut characters = Vec::new();
        for key in self.store.keys(KEY_PREFIX)? {
            if let Some(c) = load_record::<Character>(self.store.as_ref(), &key)? {
                characters.push(c);
            }
        }
        characters.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(characters)
    }

    /// Case-insensitive lookup by name
    pub fn find_by_name(&self, name: &str) -> Result<Option<Character>> {
        let lower = name.to_lowercase();
        Ok(self.list()?.into_iter().find(|c| c.name.to_lowercase() == lower))
    }

    /// Read-modify-write, bumping the version
    pub fn update<F>(&self, id: &str, update_fn: F) -> Result<Character, RepositoryError>
    where
        F: FnOnce(&mut Character),
    {
        let current = self
            .get(id)?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        let version = current.version;
        self.write_next(current, version, update_fn, "character_updated")
    }

    /// Write only if the stored version still equals `expected_version`
    pub fn update_if_version<F>(
        &self,
        id: &str,
        expected_version: i64,
        update_fn: F,
        event_type: &str,
    ) -> Result<Character, RepositoryError>
    where
        F: FnOnce(&mut Character),
    {
        let current = self
            .get(id)?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        self.write_next(current, expected_version, update_fn, event_type)
    }

    fn write_next<F>(
        &self,
        current: Character,
        expected_version: i64,
        update_fn: F,
        event_type: &str,
    ) -> Result<Character, RepositoryError>
    where
        F: FnOnce(&mut Character),
    {
        if current.version != expected_version {
            return Err(self.conflict(&current.id, expected_version, current.version));
        }

        let mut next = current.clone();
        update_fn(&mut next);
        // Identity and versioning are owned by the repository
        next.id = current.id.clone();
        next.version = current.version + 1;
        next.updated_at = Utc::now();

        // The store re-checks the version in the same step as the write
        if !save_record_if_version(self.store.as_ref(), &key_for(&next.id), current.version, &next)? {
            let found = match self.get(&next.id)? {
                Some(latest) => latest.version,
                None => return Err(RepositoryError::NotFound(next.id)),
            };
            return Err(self.conflict(&next.id, expected_version, found));
        }

        self.store.append_event(&Event::new(
            event_type,
            "character",
            &next.id,
            serde_json::json!({
                "version": next.version,
                "purse_before": current.purse,
                "purse_after": next.purse,
            }),
            &self.actor,
        ))?;

        Ok(next)
    }

    fn conflict(&self, id: &str, expected: i64, found: i64) -> RepositoryError {
        tracing::warn!(id = %id, expected, found, "rejected stale character write");
        RepositoryError::VersionConflict {
            id: id.to_string(),
            expected,
            found,
        }
    }

    /// Add coins to a stored character. Nothing is written if the purse would overflow.
    pub fn credit(&self, id: &str, amount: &Money) -> Result<Character, RepositoryError> {
        let current = self
            .get(id)?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        let purse = current.purse.add(amount)?;
        let version = current.version;
        self.write_next(current, version, |c| c.purse = purse, "credit")
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.store.remove(&key_for(id))?;
        if removed {
            self.store.append_event(&Event::new(
                "character_deleted",
                "character",
                id,
                serde_json::json!({}),
                &self.actor,
            ))?;
        }
        Ok(removed)
    }

    pub fn history(&self, id: &str) -> Result<Vec<Event>> {
        self.store.events_for("character", id)
    }
}

// ============================================================================
// TESTS
// ============================================================================
