// 📜 Campaign Entity - Notes, NPCs, locations and session logs

use crate::db::{load_record, save_record, Event, KeyValueStore};
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KEY_PREFIX: &str = "campaign:";

fn key_for(id: &str) -> String {
    format!("{}{}", KEY_PREFIX, id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionNote {
    /// 1-based, assigned in order
    pub number: u32,
    pub date: NaiveDate,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub sessions: Vec<SessionNote>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(name: &str, description: &str) -> Self {
        Campaign {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            npcs: Vec::new(),
            locations: Vec::new(),
            sessions: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn next_session_number(&self) -> u32 {
        self.sessions.iter().map(|s| s.number).max().unwrap_or(0) + 1
    }
}

/// Campaign records persisted through the key-value store
#[derive(Clone)]
pub struct CampaignBook {
    store: Arc<dyn KeyValueStore>,
    actor: String,
}

impl CampaignBook {
    pub fn new(store: Arc<dyn KeyValueStore>, actor: &str) -> Self {
        CampaignBook {
            store,
            actor: actor.to_string(),
        }
    }

    pub fn create(&self, name: &str, description: &str) -> Result<Campaign> {
        let campaign = Campaign::new(name, description);
        self.write(&campaign, "campaign_created")?;
        Ok(campaign)
    }

    pub fn get(&self, id: &str) -> Result<Option<Campaign>> {
        load_record(self.store.as_ref(), &key_for(id))
    }

    pub fn list(&self) -> Result<Vec<Campaign>> {
        let mut campaigns = Vec::new();
        for key in self.store.keys(KEY_PREFIX)? {
            if let Some(c) = load_record::<Campaign>(self.store.as_ref(), &key)? {
                campaigns.push(c);
            }
        }
        campaigns.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(campaigns)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.store.remove(&key_for(id))
    }

    pub fn add_npc(&self, campaign_id: &str, npc: Npc) -> Result<Campaign> {
        self.modify(campaign_id, "npc_added", |c| {
            c.npcs.push(npc);
            Ok(())
        })
    }

    pub fn remove_npc(&self, campaign_id: &str, name: &str) -> Result<Campaign> {
        self.modify(campaign_id, "npc_removed", |c| {
            let before = c.npcs.len();
            c.npcs.retain(|n| n.name != name);
            if c.npcs.len() == before {
                return Err(anyhow!("NPC not found: {}", name));
            }
            Ok(())
        })
    }

    pub fn add_location(&self, campaign_id: &str, location: Location) -> Result<Campaign> {
        self.modify(campaign_id, "location_added", |c| {
            c.locations.push(location);
            Ok(())
        })
    }

    pub fn remove_location(&self, campaign_id: &str, name: &str) -> Result<Campaign> {
        self.modify(campaign_id, "location_removed", |c| {
            let before = c.locations.len();
            c.locations.retain(|l| l.name != name);
            if c.locations.len() == before {
                return Err(anyhow!("Location not found: {}", name));
            }
            Ok(())
        })
    }

    /// Append a numbered session summary
    pub fn log_session(&self, campaign_id: &str, date: NaiveDate, summary: &str) -> Result<SessionNote> {
        let campaign = self.modify(campaign_id, "session_logged", |c| {
            let note = SessionNote {
                number: c.next_session_number(),
                date,
                summary: summary.to_string(),
            };
            c.sessions.push(note);
            Ok(())
        })?;

        campaign
            .sessions
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("session was not recorded"))
    }

    fn modify<F>(&self, campaign_id: &str, event_type: &str, change: F) -> Result<Campaign>
    where
        F: FnOnce(&mut Campaign) -> Result<()>,
    {
        let mut campaign = self
            .get(campaign_id)?
            .ok_or_else(|| anyhow!("Campaign not found: {}", campaign_id))?;

        change(&mut campaign)?;
        campaign.updated_at = Utc::now();
        self.write(&campaign, event_type)?;
        Ok(campaign)
    }

    fn write(&self, campaign: &Campaign, event_type: &str) -> Result<()> {
        save_record(self.store.as_ref(), &key_for(&campaign.id), campaign)?;
        self.store.append_event(&Event::new(
            event_type,
            "campaign",
            &campaign.id,
            serde_json::json!({ "name": campaign.name }),
            &self.actor,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn book() -> CampaignBook {
        CampaignBook::new(Arc::new(MemoryStore::new()), "test_dm")
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_campaign_crud() {
        let book = book();
        let c = book.create("Curse of the Tides", "Coastal horror").unwrap();
        book.create("Ashen Crown", "").unwrap();

        let names: Vec<String> = book.list().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Ashen Crown", "Curse of the Tides"]);

        assert!(book.delete(&c.id).unwrap());
        assert!(book.get(&c.id).unwrap().is_none());
    }

    #[test]
    fn test_npcs_and_locations() {
        let book = book();
        let c = book.create("Saltmarsh", "").unwrap();

        book.add_npc(&c.id, Npc { name: "Eliander".into(), role: "Council".into(), notes: "".into() })
            .unwrap();
        book.add_location(&c.id, Location { name: "Haunted House".into(), description: "".into() })
            .unwrap();

        let loaded = book.get(&c.id).unwrap().unwrap();
        assert_eq!(loaded.npcs.len(), 1);
        assert_eq!(loaded.locations[0].name, "Haunted House");

        book.remove_npc(&c.id, "Eliander").unwrap();
        assert!(book.remove_npc(&c.id, "Eliander").is_err());
        assert!(book.remove_location(&c.id, "Nowhere").is_err());
    }

    #[test]
    fn test_session_numbers_increment() {
        let book = book();
        let c = book.create("Saltmarsh", "").unwrap();

        let first = book.log_session(&c.id, date(1), "Arrived in town").unwrap();
        let second = book.log_session(&c.id, date(8), "Explored the manor").unwrap();

        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(book.get(&c.id).unwrap().unwrap().sessions.len(), 2);
    }

    #[test]
    fn test_modify_missing_campaign() {
        assert!(book().log_session("missing", date(1), "x").is_err());
    }
}
