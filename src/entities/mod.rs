// Entity Models
// "Identity persists, values change"
//
// Each entity has:
// - Stable identity (UUID) that NEVER changes
// - Values that are replaced wholesale on every write
// - A repository that persists it through the key-value store

pub mod campaign;
pub mod character;

pub use campaign::{Campaign, CampaignBook, Location, Npc, SessionNote};
pub use character::{Character, CharacterRepository, InventoryItem, RepositoryError};
