// 🛒 Shop - Catalog, cart and checkout
//
// Catalogs are static CSV fixtures. Checkout is the only place coins leave a
// character's purse: it prices the cart, checks affordability, settles the
// purse and writes it back conditionally on the version that was read.

use crate::currency::{LedgerError, Money};
use crate::entities::{CharacterRepository, RepositoryError};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Cost of one unit
    pub price: Money,
    #[serde(default)]
    pub description: String,
}

/// One CSV row: the price is spread across five coin columns
#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: String,
    name: String,
    category: String,
    #[serde(default)]
    copper: u64,
    #[serde(default)]
    silver: u64,
    #[serde(default)]
    electrum: u64,
    #[serde(default)]
    gold: u64,
    #[serde(default)]
    platinum: u64,
    #[serde(default)]
    description: String,
}

impl From<CatalogRow> for ShopItem {
    fn from(row: CatalogRow) -> Self {
        ShopItem {
            id: row.id,
            name: row.name,
            category: row.category,
            price: Money {
                copper: row.copper,
                silver: row.silver,
                electrum: row.electrum,
                gold: row.gold,
                platinum: row.platinum,
            },
            description: row.description,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    items: BTreeMap<String, ShopItem>,
}

impl Catalog {
    pub fn new(items: Vec<ShopItem>) -> Self {
        Catalog {
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
        }
    }

    pub fn load_csv(csv_path: &Path) -> Result<Catalog> {
        let rdr = csv::Reader::from_path(csv_path)
            .with_context(|| format!("Failed to open catalog {:?}", csv_path))?;
        let catalog = Catalog::from_reader(rdr)?;
        tracing::info!(path = ?csv_path, items = catalog.len(), "loaded shop catalog");
        Ok(catalog)
    }

    pub fn from_reader<R: std::io::Read>(mut rdr: csv::Reader<R>) -> Result<Catalog> {
        let mut items = Vec::new();

        for (line, result) in rdr.deserialize::<CatalogRow>().enumerate() {
            let row = result.with_context(|| format!("Failed to parse catalog row {}", line + 1))?;
            items.push(ShopItem::from(row));
        }

        Ok(Catalog::new(items))
    }

    pub fn get(&self, id: &str) -> Option<&ShopItem> {
        self.items.get(id)
    }

    pub fn items(&self) -> impl Iterator<Item = &ShopItem> {
        self.items.values()
    }

    pub fn by_category(&self, category: &str) -> Vec<&ShopItem> {
        self.items
            .values()
            .filter(|i| i.category.eq_ignore_ascii_case(category))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ============================================================================
// CART
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Cart::default()
    }

    /// Add units of an item, merging with an existing line
    pub fn add(&mut self, item_id: &str, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.lines.iter_mut().find(|l| l.item_id == item_id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLine {
                item_id: item_id.to_string(),
                quantity,
            }),
        }
    }

    /// Replace a line's quantity; 0 removes it
    pub fn set_quantity(&mut self, item_id: &str, quantity: u32) {
        if quantity == 0 {
            self.remove(item_id);
            return;
        }
        match self.lines.iter_mut().find(|l| l.item_id == item_id) {
            Some(line) => line.quantity = quantity,
            None => self.add(item_id, quantity),
        }
    }

    pub fn remove(&mut self, item_id: &str) {
        self.lines.retain(|l| l.item_id != item_id);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of price × quantity over all lines
    pub fn total(&self, catalog: &Catalog) -> Result<Money, CheckoutError> {
        let mut total = Money::zero();
        for line in &self.lines {
            let item = catalog
                .get(&line.item_id)
                .ok_or_else(|| CheckoutError::UnknownItem(line.item_id.clone()))?;
            let line_total = item.price.scale(i64::from(line.quantity))?;
            total = total.add(&line_total)?;
        }
        Ok(total)
    }
}

// ============================================================================
// CHECKOUT
// ============================================================================

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("unknown item: {0}")]
    UnknownItem(String),

    #[error("character not found: {0}")]
    CharacterNotFound(String),

    #[error("character {0} was modified by another purchase; reload and retry")]
    VersionConflict(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<RepositoryError> for CheckoutError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => CheckoutError::CharacterNotFound(id),
            RepositoryError::VersionConflict { id, .. } => CheckoutError::VersionConflict(id),
            RepositoryError::Ledger(e) => CheckoutError::Ledger(e),
            RepositoryError::Storage(e) => CheckoutError::Storage(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOptions {
    /// Pay only with coins already in the purse; never break a coin for change
    #[serde(default)]
    pub exact_change: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_id: String,
    pub character_id: String,
    pub lines: Vec<CartLine>,
    pub total: Money,
    pub purse_before: Money,
    pub purse_after: Money,
    pub character_version: i64,
    pub purchased_at: DateTime<Utc>,
}

/// Stable receipt id: same character version + same lines → same id
fn receipt_id(character_id: &str, version: i64, lines: &[CartLine]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", character_id, version));
    for line in lines {
        hasher.update(format!("|{}x{}", line.item_id, line.quantity));
    }
    format!("{:x}", hasher.finalize())
}

/// Buy everything in `cart` for one character.
///
/// The purse is only written if nobody else has changed the character since
/// it was read; on conflict nothing is spent and the caller can retry.
pub fn checkout(
    repo: &CharacterRepository,
    catalog: &Catalog,
    character_id: &str,
    cart: &Cart,
    options: CheckoutOptions,
) -> Result<Receipt, CheckoutError> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let character = repo
        .get(character_id)?
        .ok_or_else(|| CheckoutError::CharacterNotFound(character_id.to_string()))?;

    let total = cart.total(catalog)?;
    if !character.purse.can_afford(&total) {
        tracing::info!(
            character = %character.name,
            purse = %character.purse,
            total = %total,
            "purchase declined: insufficient funds"
        );
        return Err(LedgerError::InsufficientFunds {
            needed: total.to_base_units(),
            available: character.purse.to_base_units(),
        }
        .into());
    }

    let purse_after = if options.exact_change {
        character.purse.settle_exact(&total)?
    } else {
        character.purse.deduct(&total)?
    };

    let lines = cart.lines.clone();
    let updated = repo.update_if_version(
        character_id,
        character.version,
        |c| {
            c.purse = purse_after;
            for line in &lines {
                let name = catalog
                    .get(&line.item_id)
                    .map(|i| i.name.as_str())
                    .unwrap_or(line.item_id.as_str());
                c.add_to_inventory(&line.item_id, name, line.quantity);
            }
        },
        "purchase",
    )?;

    let receipt = Receipt {
        receipt_id: receipt_id(character_id, character.version, &cart.lines),
        character_id: character_id.to_string(),
        lines: cart.lines.clone(),
        total,
        purse_before: character.purse,
        purse_after: updated.purse,
        character_version: updated.version,
        purchased_at: updated.updated_at,
    };

    tracing::info!(
        character = %character.name,
        total = %receipt.total,
        purse_after = %receipt.purse_after,
        receipt = %receipt.receipt_id,
        "purchase settled"
    );

    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Event, KeyValueStore, MemoryStore};
    use crate::entities::Character;
    use std::sync::Arc;

    const CATALOG_CSV: &str = "\
id,name,category,copper,silver,electrum,gold,platinum,description
longsword,Longsword,Weapons,0,0,0,15,0,Versatile
torch,Torch,Gear,1,0,0,0,0,
rations,Rations (1 day),Gear,0,5,0,0,0,Dried food
potion,Potion of Healing,Potions,0,0,0,50,0,Heals 2d4+2
";

    fn catalog() -> Catalog {
        Catalog::from_reader(csv::Reader::from_reader(CATALOG_CSV.as_bytes())).unwrap()
    }

    fn setup(purse: Money) -> (CharacterRepository, String) {
        let repo = CharacterRepository::new(Arc::new(MemoryStore::new()), "shopkeeper");
        let c = repo.create(Character::new("Aria", "Rogue", 3, 20).with_purse(purse)).unwrap();
        (repo, c.id)
    }

    #[test]
    fn test_catalog_from_csv() {
        let catalog = catalog();

        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.get("longsword").unwrap().price, Money::gold(15));
        assert_eq!(catalog.get("torch").unwrap().description, "");
        assert_eq!(catalog.by_category("gear").len(), 2);
    }

    #[test]
    fn test_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.csv");
        std::fs::write(&path, CATALOG_CSV).unwrap();

        assert_eq!(Catalog::load_csv(&path).unwrap().len(), 4);
        assert!(Catalog::load_csv(&dir.path().join("missing.csv")).is_err());
    }

    #[test]
    fn test_bundled_catalog_fixture() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/catalog.csv");
        let catalog = Catalog::load_csv(&path).unwrap();

        assert_eq!(catalog.len(), 13);
        assert_eq!(catalog.get("spell_scroll").unwrap().price, Money::platinum(1));
        assert_eq!(catalog.by_category("weapons").len(), 3);
    }

    #[test]
    fn test_catalog_rejects_negative_price() {
        let csv = "id,name,category,copper,silver,electrum,gold,platinum,description\nx,X,Gear,-1,0,0,0,0,\n";
        assert!(Catalog::from_reader(csv::Reader::from_reader(csv.as_bytes())).is_err());
    }

    #[test]
    fn test_cart_merges_and_removes_lines() {
        let mut cart = Cart::new();
        cart.add("torch", 2);
        cart.add("torch", 3);
        cart.add("rations", 0);
        assert_eq!(cart.lines, vec![CartLine { item_id: "torch".into(), quantity: 5 }]);

        cart.set_quantity("rations", 2);
        cart.set_quantity("torch", 0);
        assert_eq!(cart.lines, vec![CartLine { item_id: "rations".into(), quantity: 2 }]);

        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_cart_total() {
        let mut cart = Cart::new();
        cart.add("longsword", 1);
        cart.add("torch", 10);
        cart.add("rations", 3);

        assert_eq!(
            cart.total(&catalog()).unwrap(),
            Money { gold: 15, silver: 15, copper: 10, ..Money::zero() }
        );
    }

    #[test]
    fn test_cart_total_unknown_item() {
        let mut cart = Cart::new();
        cart.add("vorpal_sword", 1);
        assert!(matches!(cart.total(&catalog()), Err(CheckoutError::UnknownItem(_))));
    }

    #[test]
    fn test_checkout_deducts_and_fills_inventory() {
        let (repo, id) = setup(Money::gold(100));
        let mut cart = Cart::new();
        cart.add("longsword", 1);
        cart.add("potion", 1);

        let receipt = checkout(&repo, &catalog(), &id, &cart, CheckoutOptions::default()).unwrap();

        assert_eq!(receipt.total, Money::gold(65));
        assert_eq!(receipt.purse_before, Money::gold(100));
        assert_eq!(receipt.purse_after, Money::gold(35));
        assert_eq!(receipt.receipt_id.len(), 64);

        let c = repo.get(&id).unwrap().unwrap();
        assert_eq!(c.purse, Money::gold(35));
        assert_eq!(c.inventory_count("longsword"), 1);
        assert_eq!(c.version, 2);
        assert_eq!(repo.history(&id).unwrap()[0].event_type, "purchase");
    }

    #[test]
    fn test_checkout_insufficient_funds_leaves_purse_untouched() {
        let (repo, id) = setup(Money::silver(5));
        let mut cart = Cart::new();
        cart.add("longsword", 1);

        let err = checkout(&repo, &catalog(), &id, &cart, CheckoutOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Ledger(LedgerError::InsufficientFunds { needed: 1500, available: 50 })
        ));

        let c = repo.get(&id).unwrap().unwrap();
        assert_eq!(c.purse, Money::silver(5));
        assert_eq!(c.version, 1);
        assert_eq!(c.inventory_count("longsword"), 0);
        assert_eq!(repo.history(&id).unwrap().len(), 1);
    }

    /// Holds every versioned write until two writers have arrived, so both
    /// checkouts read the character before either one saves
    struct LockstepStore {
        inner: MemoryStore,
        barrier: std::sync::Barrier,
    }

    impl KeyValueStore for LockstepStore {
        fn save(&self, key: &str, value: &serde_json::Value) -> Result<()> {
            self.inner.save(key, value)
        }
        fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
            self.inner.load(key)
        }
        fn save_if_version(&self, key: &str, expected_version: i64, value: &serde_json::Value) -> Result<bool> {
            self.barrier.wait();
            self.inner.save_if_version(key, expected_version, value)
        }
        fn remove(&self, key: &str) -> Result<bool> {
            self.inner.remove(key)
        }
        fn keys(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.keys(prefix)
        }
        fn append_event(&self, event: &Event) -> Result<()> {
            self.inner.append_event(event)
        }
        fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
            self.inner.events_for(entity_type, entity_id)
        }
    }

    #[test]
    fn test_concurrent_checkouts_cannot_double_spend() {
        let store = Arc::new(LockstepStore {
            inner: MemoryStore::new(),
            barrier: std::sync::Barrier::new(2),
        });
        let repo = CharacterRepository::new(store, "shopkeeper");
        let id = repo
            .create(Character::new("Aria", "Rogue", 3, 20).with_purse(Money::gold(15)))
            .unwrap()
            .id;
        let catalog = Arc::new(catalog());

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let (repo, catalog, id) = (repo.clone(), Arc::clone(&catalog), id.clone());
                std::thread::spawn(move || {
                    let mut cart = Cart::new();
                    cart.add("longsword", 1);
                    checkout(&repo, &catalog, &id, &cart, CheckoutOptions::default())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(CheckoutError::VersionConflict(_)))));

        let c = repo.get(&id).unwrap().unwrap();
        assert_eq!(c.purse, Money::zero());
        assert_eq!(c.inventory_count("longsword"), 1);
        assert_eq!(c.version, 2);
        let purchases = repo.history(&id).unwrap().into_iter().filter(|e| e.event_type == "purchase").count();
        assert_eq!(purchases, 1);
    }

    #[test]
    fn test_checkout_makes_change_unless_exact() {
        let (repo, id) = setup(Money::platinum(1));
        let mut cart = Cart::new();
        cart.add("torch", 1);

        let strict = CheckoutOptions { exact_change: true };
        let err = checkout(&repo, &catalog(), &id, &cart, strict).unwrap_err();
        assert!(matches!(err, CheckoutError::Ledger(LedgerError::DenominationShortfall { remaining: 1 })));

        let receipt = checkout(&repo, &catalog(), &id, &cart, CheckoutOptions::default()).unwrap();
        assert_eq!(
            receipt.purse_after,
            Money { gold: 9, electrum: 1, silver: 4, copper: 9, ..Money::zero() }
        );
        assert_eq!(receipt.purse_after.to_base_units(), 999);
    }

    #[test]
    fn test_checkout_empty_cart_and_missing_character() {
        let (repo, id) = setup(Money::gold(1));
        let empty = Cart::new();
        assert!(matches!(
            checkout(&repo, &catalog(), &id, &empty, CheckoutOptions::default()),
            Err(CheckoutError::EmptyCart)
        ));

        let mut cart = Cart::new();
        cart.add("torch", 1);
        assert!(matches!(
            checkout(&repo, &catalog(), "ghost", &cart, CheckoutOptions::default()),
            Err(CheckoutError::CharacterNotFound(_))
        ));
    }

    #[test]
    fn test_receipt_id_is_deterministic() {
        let lines = vec![CartLine { item_id: "torch".into(), quantity: 2 }];
        assert_eq!(receipt_id("c1", 3, &lines), receipt_id("c1", 3, &lines));
        assert_ne!(receipt_id("c1", 3, &lines), receipt_id("c1", 4, &lines));
    }
}
