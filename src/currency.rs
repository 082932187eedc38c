// 🪙 Currency Ledger - Five-denomination money
// Pure value type + arithmetic for pricing, affordability and settlement
//
// Money is a plain aggregate of coin counts. It is never normalized behind
// the caller's back: 15 copper stays 15 copper until an explicit operation
// (settlement, make-change) says otherwise.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// DENOMINATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Denomination {
    Copper,
    Silver,
    Electrum,
    Gold,
    Platinum,
}

impl Denomination {
    /// Highest value first (settlement walk order)
    pub const DESCENDING: [Denomination; 5] = [
        Denomination::Platinum,
        Denomination::Gold,
        Denomination::Electrum,
        Denomination::Silver,
        Denomination::Copper,
    ];

    /// Exchange rate in copper-equivalent base units
    pub fn rate(&self) -> u128 {
        match self {
            Denomination::Copper => 1,
            Denomination::Silver => 10,
            Denomination::Electrum => 50,
            Denomination::Gold => 100,
            Denomination::Platinum => 1000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Denomination::Copper => "copper",
            Denomination::Silver => "silver",
            Denomination::Electrum => "electrum",
            Denomination::Gold => "gold",
            Denomination::Platinum => "platinum",
        }
    }

    /// Short tabletop abbreviation ("gp", "sp", ...)
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Denomination::Copper => "cp",
            Denomination::Silver => "sp",
            Denomination::Electrum => "ep",
            Denomination::Gold => "gp",
            Denomination::Platinum => "pp",
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid quantity: {0} (must be a non-negative integer)")]
    InvalidQuantity(String),

    #[error("insufficient funds: need {needed} base units, have {available}")]
    InsufficientFunds { needed: u128, available: u128 },

    #[error("cannot settle exactly without making change: {remaining} base units left over")]
    DenominationShortfall { remaining: u128 },

    #[error("coin count overflow")]
    Overflow,
}

// ============================================================================
// QUANTITY
// ============================================================================

/// Boundary check for purchase quantities arriving as JSON.
///
/// Rejects negatives, fractions and non-numbers instead of flooring or clamping.
pub struct Quantity;

impl Quantity {
    pub fn from_json(value: &serde_json::Value) -> Result<i64, LedgerError> {
        if let Some(n) = value.as_i64() {
            return Quantity::check(n);
        }
        if value.is_u64() {
            return Err(LedgerError::Overflow);
        }
        match value.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= 0.0 && f <= i64::MAX as f64 => Ok(f as i64),
            _ => Err(LedgerError::InvalidQuantity(value.to_string())),
        }
    }

    pub fn check(quantity: i64) -> Result<i64, LedgerError> {
        if quantity < 0 {
            return Err(LedgerError::InvalidQuantity(quantity.to_string()));
        }
        Ok(quantity)
    }
}

// ============================================================================
// MONEY
// ============================================================================

/// Five non-negative coin counts. Also used as a `Price` (cost of one unit).
///
/// Serialized as a record with all five fields required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub copper: u64,
    pub silver: u64,
    pub electrum: u64,
    pub gold: u64,
    pub platinum: u64,
}

/// Same shape as `Money`, tagged as the cost of one unit of an item
pub type Price = Money;

impl Money {
    pub fn zero() -> Self {
        Money::default()
    }

    pub fn copper(n: u64) -> Self {
        Money { copper: n, ..Money::default() }
    }

    pub fn silver(n: u64) -> Self {
        Money { silver: n, ..Money::default() }
    }

    pub fn electrum(n: u64) -> Self {
        Money { electrum: n, ..Money::default() }
    }

    pub fn gold(n: u64) -> Self {
        Money { gold: n, ..Money::default() }
    }

    pub fn platinum(n: u64) -> Self {
        Money { platinum: n, ..Money::default() }
    }

    pub fn count(&self, denomination: Denomination) -> u64 {
        match denomination {
            Denomination::Copper => self.copper,
            Denomination::Silver => self.silver,
            Denomination::Electrum => self.electrum,
            Denomination::Gold => self.gold,
            Denomination::Platinum => self.platinum,
        }
    }

    fn count_mut(&mut self, denomination: Denomination) -> &mut u64 {
        match denomination {
            Denomination::Copper => &mut self.copper,
            Denomination::Silver => &mut self.silver,
            Denomination::Electrum => &mut self.electrum,
            Denomination::Gold => &mut self.gold,
            Denomination::Platinum => &mut self.platinum,
        }
    }

    /// Builder-style setter: `Money::zero().with(Denomination::Gold, 2)`
    pub fn with(mut self, denomination: Denomination, count: u64) -> Self {
        *self.count_mut(denomination) = count;
        self
    }

    pub fn is_zero(&self) -> bool {
        Denomination::DESCENDING.iter().all(|d| self.count(*d) == 0)
    }

    /// Total value in copper-equivalent base units
    pub fn to_base_units(&self) -> u128 {
        Denomination::DESCENDING
            .iter()
            .map(|d| self.count(*d) as u128 * d.rate())
            .sum()
    }

    /// Mint a base-unit amount into the fewest coins, highest first
    pub fn from_base_units(units: u128) -> Result<Money, LedgerError> {
        Money::mint_below(units, None)
    }

    /// Greedy mint restricted to denominations strictly below `ceiling`
    fn mint_below(units: u128, ceiling: Option<Denomination>) -> Result<Money, LedgerError> {
        let mut remaining = units;
        let mut minted = Money::zero();

        for d in Denomination::DESCENDING {
            if ceiling.is_some_and(|c| d.rate() >= c.rate()) {
                continue;
            }
            let coins = remaining / d.rate();
            *minted.count_mut(d) = u64::try_from(coins).map_err(|_| LedgerError::Overflow)?;
            remaining -= coins * d.rate();
        }

        Ok(minted)
    }

    /// Multiply every count by `quantity`
    pub fn scale(&self, quantity: i64) -> Result<Money, LedgerError> {
        let quantity = Quantity::check(quantity)? as u64;
        let mut scaled = Money::zero();

        for d in Denomination::DESCENDING {
            *scaled.count_mut(d) = self
                .count(d)
                .checked_mul(quantity)
                .ok_or(LedgerError::Overflow)?;
        }

        Ok(scaled)
    }

    /// Element-wise sum. No carrying between denominations.
    pub fn add(&self, other: &Money) -> Result<Money, LedgerError> {
        let mut sum = Money::zero();

        for d in Denomination::DESCENDING {
            *sum.count_mut(d) = self
                .count(d)
                .checked_add(other.count(d))
                .ok_or(LedgerError::Overflow)?;
        }

        Ok(sum)
    }

    /// Total-value comparison; matching denominations are not required
    pub fn can_afford(&self, cost: &Money) -> bool {
        self.to_base_units() >= cost.to_base_units()
    }

    /// Signed base-unit difference `self - other`. Never stored as Money.
    pub fn difference(&self, other: &Money) -> i128 {
        self.to_base_units() as i128 - other.to_base_units() as i128
    }

    /// Deduct `cost`, making change when the owned coins can't cover it exactly.
    ///
    /// Walks platinum → copper taking as many coins as fit. If a remainder is
    /// left, the smallest owned coin worth more than the remainder is broken
    /// and the change is minted into lower denominations. The result is always
    /// worth exactly `self - cost`.
    pub fn deduct(&self, cost: &Money) -> Result<Money, LedgerError> {
        self.ensure_affordable(cost)?;

        let (mut balance, remaining) = self.greedy_walk(cost.to_base_units());
        if remaining == 0 {
            return Ok(balance);
        }

        // After the walk every denomination still held is worth more than `remaining`
        let broken = Denomination::DESCENDING
            .iter()
            .rev()
            .copied()
            .find(|d| balance.count(*d) > 0 && d.rate() > remaining)
            .ok_or(LedgerError::DenominationShortfall { remaining })?;

        *balance.count_mut(broken) -= 1;
        let change = Money::mint_below(broken.rate() - remaining, Some(broken))?;

        tracing::debug!(
            coin = broken.as_str(),
            change = %change,
            "broke coin to settle purchase"
        );

        balance.add(&change)
    }

    /// Deduct `cost` using only owned coins (no change is made).
    ///
    /// Fails with `DenominationShortfall` when the greedy walk can't reach zero.
    pub fn settle_exact(&self, cost: &Money) -> Result<Money, LedgerError> {
        self.ensure_affordable(cost)?;

        let (balance, remaining) = self.greedy_walk(cost.to_base_units());
        if remaining != 0 {
            return Err(LedgerError::DenominationShortfall { remaining });
        }

        Ok(balance)
    }

    fn ensure_affordable(&self, cost: &Money) -> Result<(), LedgerError> {
        if !self.can_afford(cost) {
            return Err(LedgerError::InsufficientFunds {
                needed: cost.to_base_units(),
                available: self.to_base_units(),
            });
        }
        Ok(())
    }

    fn greedy_walk(&self, owed: u128) -> (Money, u128) {
        let mut balance = *self;
        let mut remaining = owed;

        for d in Denomination::DESCENDING {
            let held = balance.count(d);
            let take = (held as u128).min(remaining / d.rate());
            // take <= held, so the cast back is lossless
            *balance.count_mut(d) = held - take as u64;
            remaining -= take * d.rate();
        }

        (balance, remaining)
    }

    /// Display projection: (denomination, count) pairs, highest first, zeros omitted
    pub fn format(&self) -> Vec<(Denomination, u64)> {
        Denomination::DESCENDING
            .iter()
            .filter(|d| self.count(**d) > 0)
            .map(|d| (*d, self.count(*d)))
            .collect()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.format();
        if parts.is_empty() {
            return write!(f, "0cp");
        }

        let rendered: Vec<String> = parts
            .iter()
            .map(|(d, n)| format!("{}{}", n, d.abbreviation()))
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

// ============================================================================
// TESTS
// ============================================================================
