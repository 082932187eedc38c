// 🎲 Dice - Standard tabletop notation ("2d6+3", "d20", "4d8-1")

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MAX_DICE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("malformed dice notation: {0:?}")]
    Malformed(String),

    #[error("dice need at least one die and at least one side")]
    Empty,

    #[error("too many dice: {0} (max 100)")]
    TooMany(u32),
}

/// Always holds 1..=100 dice with at least one side; built through `new`,
/// parsing, or deserialization, all of which validate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDiceExpr")]
pub struct DiceExpr {
    count: u32,
    sides: u32,
    modifier: i32,
}

#[derive(Deserialize)]
struct RawDiceExpr {
    count: u32,
    sides: u32,
    #[serde(default)]
    modifier: i32,
}

impl TryFrom<RawDiceExpr> for DiceExpr {
    type Error = DiceError;

    fn try_from(raw: RawDiceExpr) -> Result<Self, Self::Error> {
        DiceExpr::new(raw.count, raw.sides, raw.modifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roll {
    pub expr: DiceExpr,
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i64,
}

impl DiceExpr {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Result<Self, DiceError> {
        if count == 0 || sides == 0 {
            return Err(DiceError::Empty);
        }
        if count > MAX_DICE {
            return Err(DiceError::TooMany(count));
        }
        Ok(DiceExpr { count, sides, modifier })
    }

    pub fn d20() -> Self {
        DiceExpr { count: 1, sides: 20, modifier: 0 }
    }

    pub fn with_modifier(self, modifier: i32) -> Self {
        DiceExpr { modifier, ..self }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn sides(&self) -> u32 {
        self.sides
    }

    pub fn modifier(&self) -> i32 {
        self.modifier
    }

    pub fn roll<R: Rng>(&self, rng: &mut R) -> Roll {
        let rolls: Vec<u32> = (0..self.count).map(|_| rng.gen_range(1..=self.sides)).collect();
        let total = rolls.iter().map(|r| i64::from(*r)).sum::<i64>() + i64::from(self.modifier);

        Roll {
            expr: *self,
            rolls,
            modifier: self.modifier,
            total,
        }
    }

    pub fn min(&self) -> i64 {
        i64::from(self.count) + i64::from(self.modifier)
    }

    pub fn max(&self) -> i64 {
        i64::from(self.count) * i64::from(self.sides) + i64::from(self.modifier)
    }
}

impl FromStr for DiceExpr {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let notation: String = s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase();
        let malformed = || DiceError::Malformed(s.to_string());

        let (count_part, rest) = notation.split_once('d').ok_or_else(malformed)?;

        let count = if count_part.is_empty() {
            1
        } else {
            count_part.parse::<u32>().map_err(|_| malformed())?
        };

        let (sides_part, modifier) = match rest.find(['+', '-']) {
            Some(idx) => {
                let (sides, modifier) = rest.split_at(idx);
                // "+3" parses as i32 directly; reject bare "+" / "-"
                let modifier = modifier.parse::<i32>().map_err(|_| malformed())?;
                (sides, modifier)
            }
            None => (rest, 0),
        };

        let sides = sides_part.parse::<u32>().map_err(|_| malformed())?;
        DiceExpr::new(count, sides, modifier)
    }
}

impl fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{}", m),
            m => write!(f, "{}", m),
        }
    }
}

/// Parse and roll in one step
pub fn roll<R: Rng>(notation: &str, rng: &mut R) -> Result<Roll, DiceError> {
    let expr: DiceExpr = notation.parse()?;
    Ok(expr.roll(rng))
}
