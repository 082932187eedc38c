// Campaign Keeper - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod currency;   // Currency Ledger - five-denomination money
pub mod db;         // Key-value storage + audit trail
pub mod entities;   // Characters and campaigns
pub mod shop;       // Catalog, cart, checkout
pub mod combat;     // Initiative tracker
pub mod dice;       // Dice notation + rolling
pub mod map;        // Map markers
pub mod link;       // Local device link
pub mod config;

// Re-export commonly used types
pub use currency::{Denomination, LedgerError, Money, Price, Quantity};
pub use db::{
    Event, KeyValueStore, MemoryStore, SqliteStore,
    load_record, save_record, save_record_if_version, setup_database,
};
pub use entities::{
    Campaign, CampaignBook, Location, Npc, SessionNote,
    Character, CharacterRepository, InventoryItem, RepositoryError,
};
pub use shop::{
    Cart, CartLine, Catalog, CheckoutError, CheckoutOptions, Receipt, ShopItem,
    checkout,
};
pub use combat::{Combatant, Encounter, roll_initiative};
pub use dice::{DiceError, DiceExpr, Roll};
pub use map::{MapAnnotations, MapError, Marker, MarkerKind};
pub use link::{LinkError, LinkMessage, LinkService, LinkState, Peer, Transport};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
