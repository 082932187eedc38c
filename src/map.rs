// 🗺️ Map annotations - Markers placed over a static map image
//
// Coordinates are normalized to the image (0.0 = left/top, 1.0 = right/bottom)
// so markers survive the image being rendered at any size.

use crate::db::{load_record, save_record, KeyValueStore};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    Poi,
    Npc,
    Danger,
    Note,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub label: String,
    pub kind: MarkerKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    #[error("coordinates ({x}, {y}) are outside the map")]
    OutOfBounds { x: f64, y: f64 },

    #[error("marker not found: {0}")]
    MarkerNotFound(String),
}

fn check_bounds(x: f64, y: f64) -> Result<(), MapError> {
    let inside = |v: f64| (0.0..=1.0).contains(&v);
    if inside(x) && inside(y) {
        Ok(())
    } else {
        Err(MapError::OutOfBounds { x, y })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapAnnotations {
    pub map_id: String,
    pub markers: Vec<Marker>,
}

impl MapAnnotations {
    pub fn new(map_id: &str) -> Self {
        MapAnnotations {
            map_id: map_id.to_string(),
            markers: Vec::new(),
        }
    }

    fn key(map_id: &str) -> String {
        format!("map:{}", map_id)
    }

    /// Load a map's markers, or start an empty set
    pub fn load(store: &dyn KeyValueStore, map_id: &str) -> Result<Self> {
        Ok(load_record(store, &Self::key(map_id))?.unwrap_or_else(|| Self::new(map_id)))
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        save_record(store, &Self::key(&self.map_id), self)
    }

    pub fn add(&mut self, x: f64, y: f64, label: &str, kind: MarkerKind) -> Result<&Marker, MapError> {
        check_bounds(x, y)?;
        self.markers.push(Marker {
            id: uuid::Uuid::new_v4().to_string(),
            x,
            y,
            label: label.to_string(),
            kind,
        });
        Ok(&self.markers[self.markers.len() - 1])
    }

    pub fn move_marker(&mut self, id: &str, x: f64, y: f64) -> Result<(), MapError> {
        check_bounds(x, y)?;
        let marker = self
            .markers
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MapError::MarkerNotFound(id.to_string()))?;
        marker.x = x;
        marker.y = y;
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<Marker, MapError> {
        let idx = self
            .markers
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| MapError::MarkerNotFound(id.to_string()))?;
        Ok(self.markers.remove(idx))
    }

    pub fn by_kind(&self, kind: MarkerKind) -> Vec<&Marker> {
        self.markers.iter().filter(|m| m.kind == kind).collect()
    }
}
