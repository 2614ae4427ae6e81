//! Dice formula evaluation
//!
//! Parses and rolls formulas like "2d6", "1d4+3", "2d6+1d4-1" or plain
//! numbers like "10". Rolling goes through a [`DiceRoller`] so callers can
//! inject a seeded or scripted source of randomness.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use thiserror::Error;

/// Upper bound on dice per term, keeps a typo like "1000000d6" from stalling a phase
pub const MAX_DICE_PER_TERM: u32 = 1000;

/// Upper bound on faces per die
pub const MAX_DIE_SIDES: u32 = 1000;

static FORMULA_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d*d\d+|\d+)([+-](\d*d\d+|\d+))*$").expect("static regex")
});

static FORMULA_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([+-]?)(?:(\d*)d(\d+)|(\d+))").expect("static regex")
});

/// Errors produced while parsing or rolling a formula
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("empty dice formula")]
    Empty,

    #[error("malformed dice formula: {0}")]
    Malformed(String),

    #[error("dice count must be between 1 and {max} (got {count})", max = MAX_DICE_PER_TERM)]
    InvalidCount { count: u32 },

    #[error("die sides must be between 1 and {max} (got {sides})", max = MAX_DIE_SIDES)]
    InvalidSides { sides: u32 },

    #[error("number out of range in formula: {0}")]
    Overflow(String),
}

/// A single additive term of a formula
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    /// `count` dice with `sides` faces, added or subtracted
    Dice { count: u32, sides: u32, negative: bool },
    /// A flat modifier
    Flat(i32),
}

/// A parsed dice formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceFormula {
    pub terms: Vec<Term>,
}

impl DiceFormula {
    /// Parse a formula string
    pub fn parse(formula: &str) -> Result<Self, DiceError> {
        let compact: String = formula
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        if compact.is_empty() {
            return Err(DiceError::Empty);
        }
        if !FORMULA_SHAPE.is_match(&compact) {
            return Err(DiceError::Malformed(formula.trim().to_string()));
        }

        let mut terms = Vec::new();
        for caps in FORMULA_TERM.captures_iter(&compact) {
            let negative = caps.get(1).is_some_and(|m| m.as_str() == "-");

            if let Some(sides) = caps.get(3) {
                // "d6" means "1d6"
                let count = match caps.get(2).map(|m| m.as_str()) {
                    None | Some("") => 1,
                    Some(n) => n
                        .parse::<u32>()
                        .map_err(|_| DiceError::Overflow(n.to_string()))?,
                };
                if count == 0 || count > MAX_DICE_PER_TERM {
                    return Err(DiceError::InvalidCount { count });
                }
                let sides: u32 = sides
                    .as_str()
                    .parse()
                    .map_err(|_| DiceError::Overflow(sides.as_str().to_string()))?;
                if sides == 0 || sides > MAX_DIE_SIDES {
                    return Err(DiceError::InvalidSides { sides });
                }
                terms.push(Term::Dice { count, sides, negative });
            } else if let Some(flat) = caps.get(4) {
                let value: i32 = flat
                    .as_str()
                    .parse()
                    .map_err(|_| DiceError::Overflow(flat.as_str().to_string()))?;
                terms.push(Term::Flat(if negative { -value } else { value }));
            }
        }

        let parsed = Self { terms };
        let (low, high) = parsed.bounds();
        if i32::try_from(low).is_err() || i32::try_from(high).is_err() {
            return Err(DiceError::Overflow(formula.trim().to_string()));
        }
        Ok(parsed)
    }

    /// Minimum possible total
    pub fn min(&self) -> i32 {
        saturate(self.bounds().0)
    }

    /// Maximum possible total
    pub fn max(&self) -> i32 {
        saturate(self.bounds().1)
    }

    /// (min, max) summed wide; every total rolled lies between them
    fn bounds(&self) -> (i64, i64) {
        self.terms.iter().fold((0, 0), |(low, high), t| match *t {
            Term::Dice { count, sides, negative: false } => {
                (low + i64::from(count), high + i64::from(count) * i64::from(sides))
            }
            Term::Dice { count, sides, negative: true } => {
                (low - i64::from(count) * i64::from(sides), high - i64::from(count))
            }
            Term::Flat(v) => (low + i64::from(v), high + i64::from(v)),
        })
    }

    /// Roll every term using `roll_die` for each individual die
    pub fn roll_with(&self, mut roll_die: impl FnMut(u32) -> u32) -> RollResult {
        let mut dice = Vec::new();
        let mut total: i64 = 0;

        for term in &self.terms {
            match *term {
                Term::Dice { count, sides, negative } => {
                    for _ in 0..count {
                        let face = roll_die(sides).clamp(1, sides);
                        dice.push(face);
                        if negative {
                            total -= i64::from(face);
                        } else {
                            total += i64::from(face);
                        }
                    }
                }
                Term::Flat(v) => total += i64::from(v),
            }
        }

        RollResult {
            formula: self.to_string(),
            dice,
            total: saturate(total),
        }
    }
}

fn saturate(total: i64) -> i32 {
    total.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

impl FromStr for DiceFormula {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            let (negative, body) = match *term {
                Term::Dice { count, sides, negative } => (negative, format!("{}d{}", count, sides)),
                Term::Flat(v) => (v < 0, v.abs().to_string()),
            };
            match (i, negative) {
                (0, true) => write!(f, "-{}", body)?,
                (0, false) => write!(f, "{}", body)?,
                (_, true) => write!(f, " - {}", body)?,
                (_, false) => write!(f, " + {}", body)?,
            }
        }
        Ok(())
    }
}

/// Outcome of evaluating a formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollResult {
    /// Normalised formula that was rolled
    pub formula: String,
    /// Individual die faces, in roll order
    pub dice: Vec<u32>,
    /// Signed total
    pub total: i32,
}

impl RollResult {
    /// Total clamped at zero, for use as damage or healing
    pub fn amount(&self) -> u32 {
        self.total.max(0) as u32
    }
}

/// Source of dice results
pub trait DiceRoller: Send + Sync {
    /// Roll one die with the given number of sides (1..=sides)
    fn roll_die(&self, sides: u32) -> u32;

    /// Evaluate a full formula
    fn evaluate(&self, formula: &str) -> Result<RollResult, DiceError> {
        let parsed = DiceFormula::parse(formula)?;
        Ok(parsed.roll_with(|sides| self.roll_die(sides)))
    }
}

/// Random roller backed by a seedable RNG
#[derive(Debug)]
pub struct StdRoller {
    rng: Mutex<StdRng>,
}

impl StdRoller {
    /// Create a roller, seeded for reproducible runs or from OS entropy
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng: Mutex::new(rng) }
    }
}

impl Default for StdRoller {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DiceRoller for StdRoller {
    fn roll_die(&self, sides: u32) -> u32 {
        self.rng.lock().random_range(1..=sides.max(1))
    }
}

/// Deterministic roller that replays queued results
///
/// Formula totals and single-die faces are queued separately. When a queue
/// runs dry, formulas evaluate to their minimum and dice land on 1.
#[derive(Debug, Default)]
pub struct ScriptedRoller {
    totals: Mutex<VecDeque<i32>>,
    faces: Mutex<VecDeque<u32>>,
}

impl ScriptedRoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue formula totals, consumed in evaluation order
    pub fn with_totals(self, totals: impl IntoIterator<Item = i32>) -> Self {
        self.totals.lock().extend(totals);
        self
    }

    /// Queue die faces, consumed by `roll_die` in order
    pub fn with_faces(self, faces: impl IntoIterator<Item = u32>) -> Self {
        self.faces.lock().extend(faces);
        self
    }

    pub fn push_total(&self, total: i32) {
        self.totals.lock().push_back(total);
    }

    pub fn push_face(&self, face: u32) {
        self.faces.lock().push_back(face);
    }

    /// Number of queued totals not yet consumed
    pub fn remaining_totals(&self) -> usize {
        self.totals.lock().len()
    }
}

impl DiceRoller for ScriptedRoller {
    fn roll_die(&self, sides: u32) -> u32 {
        self.faces
            .lock()
            .pop_front()
            .unwrap_or(1)
            .clamp(1, sides.max(1))
    }

    fn evaluate(&self, formula: &str) -> Result<RollResult, DiceError> {
        // Still parse so malformed formulas fail the same way they would live
        let parsed = DiceFormula::parse(formula)?;
        let total = self.totals.lock().pop_front().unwrap_or_else(|| parsed.min());
        Ok(RollResult {
            formula: parsed.to_string(),
            dice: Vec::new(),
            total,
        })
    }
}
