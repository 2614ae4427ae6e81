//! Random outcome tables
//!
//! Multi-branch conditions roll one die and look the face up in an ordered
//! list of contiguous ranges. Each range either narrates, deals damage, or
//! asks the referee for a saving throw.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::conditions::SaveAbility;
use super::damage::DamageType;
use super::dice::DiceRoller;

/// Table validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutcomeTableError {
    #[error("table {0} has no ranges")]
    Empty(String),

    #[error("table {table}: die must have at least 2 sides")]
    InvalidDie { table: String },

    #[error("table {table}: range {low}-{high} is inverted")]
    Inverted { table: String, low: u32, high: u32 },

    #[error("table {table}: expected a range starting at {expected}, found {found}")]
    Gap { table: String, expected: u32, found: u32 },

    #[error("table {table}: ranges end at {end} but the die has {die} sides")]
    Uncovered { table: String, end: u32, die: u32 },
}

/// Nested narrative roll inside one outcome (e.g. a direction)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRoll {
    /// Labels for faces 1..=labels.len()
    pub labels: Vec<String>,
}

impl SubRoll {
    pub fn die(&self) -> u32 {
        self.labels.len() as u32
    }
}

/// What a range produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Message only, no state change
    Narrative {
        #[serde(default)]
        sub_roll: Option<SubRoll>,
    },
    /// Unconditional damage
    Damage {
        formula: String,
        #[serde(default)]
        damage_type: Option<DamageType>,
    },
    /// Damage decided by a referee-resolved save
    Save {
        formula: String,
        ability: SaveAbility,
        #[serde(default)]
        damage_type: Option<DamageType>,
        #[serde(default)]
        half_damage_on_success: bool,
        #[serde(default)]
        remove_on_success: bool,
    },
}

/// One contiguous range of faces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRange {
    pub low: u32,
    pub high: u32,
    /// Short label shown to the table
    pub title: String,
    /// Narrative text
    pub text: String,
    pub kind: OutcomeKind,
}

impl OutcomeRange {
    pub fn contains(&self, face: u32) -> bool {
        (self.low..=self.high).contains(&face)
    }
}

/// A validated outcome table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeTable {
    id: String,
    die: u32,
    ranges: Vec<OutcomeRange>,
}

impl OutcomeTable {
    /// Build a table; ranges must cover 1..=die exactly, in order, without overlap
    pub fn new(
        id: impl Into<String>,
        die: u32,
        ranges: Vec<OutcomeRange>,
    ) -> Result<Self, OutcomeTableError> {
        let id = id.into();
        if ranges.is_empty() {
            return Err(OutcomeTableError::Empty(id));
        }
        if die < 2 {
            return Err(OutcomeTableError::InvalidDie { table: id });
        }

        let mut expected = 1;
        for range in &ranges {
            if range.low > range.high {
                return Err(OutcomeTableError::Inverted {
                    table: id,
                    low: range.low,
                    high: range.high,
                });
            }
            if range.low != expected {
                return Err(OutcomeTableError::Gap {
                    table: id,
                    expected,
                    found: range.low,
                });
            }
            expected = range.high.saturating_add(1);
        }
        if expected - 1 != die {
            return Err(OutcomeTableError::Uncovered {
                table: id,
                end: expected - 1,
                die,
            });
        }

        Ok(Self { id, die, ranges })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn die(&self) -> u32 {
        self.die
    }

    pub fn ranges(&self) -> &[OutcomeRange] {
        &self.ranges
    }

    /// Range containing `face`
    pub fn lookup(&self, face: u32) -> Option<&OutcomeRange> {
        self.ranges.iter().find(|r| r.contains(face))
    }

    /// Roll the table die (and any nested narrative die)
    pub fn roll(&self, dice: &dyn DiceRoller) -> RolledOutcome<'_> {
        let face = dice.roll_die(self.die).clamp(1, self.die);
        // validated coverage guarantees a hit
        let range = self.lookup(face).unwrap_or(&self.ranges[0]);

        let detail = match &range.kind {
            OutcomeKind::Narrative {
                sub_roll: Some(sub),
            } if !sub.labels.is_empty() => {
                let sub_face = dice.roll_die(sub.die()).clamp(1, sub.die());
                sub.labels.get(sub_face as usize - 1).cloned()
            }
            _ => None,
        };

        RolledOutcome {
            face,
            range,
            detail,
        }
    }
}

#[derive(Deserialize)]
struct RawTable {
    id: String,
    die: u32,
    ranges: Vec<OutcomeRange>,
}

impl<'de> Deserialize<'de> for OutcomeTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawTable::deserialize(deserializer)?;
        OutcomeTable::new(raw.id, raw.die, raw.ranges).map_err(serde::de::Error::custom)
    }
}

/// Result of rolling a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolledOutcome<'a> {
    pub face: u32,
    pub range: &'a OutcomeRange,
    /// Label from a nested narrative roll
    pub detail: Option<String>,
}

impl RolledOutcome<'_> {
    /// Narrative line for the roll
    pub fn narrate(&self, who: &str) -> String {
        match &self.detail {
            Some(detail) => format!(
                "{} rolled {}: {}. {} {} ({}).",
                who, self.face, self.range.title, who, self.range.text, detail
            ),
            None => format!(
                "{} rolled {}: {}. {} {}.",
                who, self.face, self.range.title, who, self.range.text
            ),
        }
    }
}

/// Outcome tables by id
#[derive(Debug, Clone, Default)]
pub struct OutcomeTables {
    tables: HashMap<String, OutcomeTable>,
}

impl OutcomeTables {
    /// Registry with no tables
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in confusion and reality-break tables
    pub fn builtin() -> Self {
        let mut tables = Self::empty();
        tables.insert(confusion_table());
        tables.insert(reality_break_table());
        tables
    }

    /// Add or replace a table
    pub fn insert(&mut self, table: OutcomeTable) {
        self.tables.insert(table.id.clone(), table);
    }

    pub fn with_table(mut self, table: OutcomeTable) -> Self {
        self.insert(table);
        self
    }

    pub fn get(&self, id: &str) -> Option<&OutcomeTable> {
        self.tables.get(id)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn range(low: u32, high: u32, title: &str, text: &str, kind: OutcomeKind) -> OutcomeRange {
    OutcomeRange {
        low,
        high,
        title: title.to_string(),
        text: text.to_string(),
        kind,
    }
}

fn built(table: Result<OutcomeTable, OutcomeTableError>) -> OutcomeTable {
    match table {
        Ok(table) => table,
        Err(e) => unreachable!("built-in outcome table is invalid: {}", e),
    }
}

/// Confusion: d10, narrative only
pub fn confusion_table() -> OutcomeTable {
    let directions = ["north", "northeast", "east", "southeast", "south", "southwest", "west", "northwest"]
        .iter()
        .map(|d| d.to_string())
        .collect();

    built(OutcomeTable::new(
        "confusion",
        10,
        vec![
            range(
                1,
                1,
                "Wander",
                "uses all its movement to move in a random direction",
                OutcomeKind::Narrative {
                    sub_roll: Some(SubRoll { labels: directions }),
                },
            ),
            range(
                2,
                6,
                "Stupor",
                "doesn't move or take actions this turn",
                OutcomeKind::Narrative { sub_roll: None },
            ),
            range(
                7,
                8,
                "Lash out",
                "uses its action to make a melee attack against a randomly determined creature within its reach",
                OutcomeKind::Narrative { sub_roll: None },
            ),
            range(
                9,
                10,
                "Lucid",
                "can act and move normally",
                OutcomeKind::Narrative { sub_roll: None },
            ),
        ],
    ))
}

/// Reality break: d10, damage or a DEX save
pub fn reality_break_table() -> OutcomeTable {
    built(OutcomeTable::new(
        "reality-break",
        10,
        vec![
            range(
                1,
                2,
                "Vision of the Far Realm",
                "is overwhelmed by visions of the Far Realm",
                OutcomeKind::Damage {
                    formula: "6d12".to_string(),
                    damage_type: Some(DamageType::Psychic),
                },
            ),
            range(
                3,
                5,
                "Rending Rift",
                "is caught at the edge of a rift tearing through reality",
                OutcomeKind::Save {
                    formula: "8d12".to_string(),
                    ability: SaveAbility::Dex,
                    damage_type: Some(DamageType::Force),
                    half_damage_on_success: true,
                    remove_on_success: false,
                },
            ),
            range(
                6,
                8,
                "Wormhole",
                "is flung through a wormhole",
                OutcomeKind::Damage {
                    formula: "10d12".to_string(),
                    damage_type: Some(DamageType::Force),
                },
            ),
            range(
                9,
                10,
                "Chill of the Dark Void",
                "is engulfed by the chill of the dark void",
                OutcomeKind::Damage {
                    formula: "10d12".to_string(),
                    damage_type: Some(DamageType::Cold),
                },
            ),
        ],
    ))
}
