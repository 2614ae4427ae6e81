//! Condition flags and the rules that drive them
//!
//! A condition is active while its flag is present on the actor. The
//! [`ConditionCatalog`] maps flag keys to what happens at each turn boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::damage::{describe_damage, DamageType};

/// Flag keys read outside the turn-boundary catalog
pub mod keys {
    /// Formula appended to every initiative roll
    pub const INIT_BONUS: &str = "initBonus";
    /// Formula appended to the next initiative roll only
    pub const NEXT_COMBAT_INIT_BONUS: &str = "nextCombatInitBonus";
    /// Size of the reserved temp HP pool refilled on rest
    pub const ARMOR_MASTERY: &str = "armorMastery";
}

/// Effect names in the effect store for the keys in [`keys`]
pub mod names {
    pub const NEXT_COMBAT_INIT_BONUS: &str = "Next Combat Initiative Bonus";
}

/// Value of a condition flag: a literal number or a dice formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Number(i64),
    Formula(String),
}

impl FlagValue {
    /// Whether the flag marks an active condition
    pub fn is_active(&self) -> bool {
        match self {
            FlagValue::Number(n) => *n != 0,
            FlagValue::Formula(s) => !s.trim().is_empty(),
        }
    }

    /// The value as a formula string for the dice evaluator
    pub fn formula(&self) -> String {
        match self {
            FlagValue::Number(n) => n.to_string(),
            FlagValue::Formula(s) => s.trim().to_string(),
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formula())
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        FlagValue::Formula(s.to_string())
    }
}

impl From<i64> for FlagValue {
    fn from(n: i64) -> Self {
        FlagValue::Number(n)
    }
}

/// Flags on one actor, keyed by flag name
pub type ConditionFlags = BTreeMap<String, FlagValue>;

/// Look up a flag, ignoring inactive values
pub fn active_flag<'a>(flags: &'a ConditionFlags, key: &str) -> Option<&'a FlagValue> {
    flags.get(key).filter(|v| v.is_active())
}

/// Ability used for a saving throw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveAbility {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

impl FromStr for SaveAbility {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "str" | "strength" => Ok(SaveAbility::Str),
            "dex" | "dexterity" => Ok(SaveAbility::Dex),
            "con" | "constitution" => Ok(SaveAbility::Con),
            "int" | "intelligence" => Ok(SaveAbility::Int),
            "wis" | "wisdom" => Ok(SaveAbility::Wis),
            "cha" | "charisma" => Ok(SaveAbility::Cha),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SaveAbility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaveAbility::Str => "STR",
            SaveAbility::Dex => "DEX",
            SaveAbility::Con => "CON",
            SaveAbility::Int => "INT",
            SaveAbility::Wis => "WIS",
            SaveAbility::Cha => "CHA",
        };
        write!(f, "{}", s)
    }
}

/// Save policy attached to a condition at turn end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSpec {
    pub ability: SaveAbility,
    /// Roll the flag's formula as damage (otherwise the save only ends the effect)
    #[serde(default)]
    pub deals_damage: bool,
    #[serde(default)]
    pub remove_on_success: bool,
    #[serde(default)]
    pub half_damage_on_success: bool,
}

/// Turn boundary a behavior runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    TurnStart,
    TurnEnd,
}

/// What a condition does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Behavior {
    /// Turn start: grant temporary HP (non-stacking)
    TempHp,
    /// Turn start: recurring damage
    DamageOverTime,
    /// Turn start: roll on a random outcome table
    RandomOutcome { table: String },
    /// Turn start, evaluated last: restore HP once pending saves resolve
    Healing,
    /// Turn end: damage without a save
    EndDamage,
    /// Turn end: damage once, then retract the effect
    DelayedDamage,
    /// Turn end: issue a save request
    EndSave(SaveSpec),
}

impl Behavior {
    pub fn phase(&self) -> Phase {
        match self {
            Behavior::TempHp
            | Behavior::DamageOverTime
            | Behavior::RandomOutcome { .. }
            | Behavior::Healing => Phase::TurnStart,
            Behavior::EndDamage | Behavior::DelayedDamage | Behavior::EndSave(_) => Phase::TurnEnd,
        }
    }

    /// Evaluation rank within the phase
    fn rank(&self) -> u8 {
        match self {
            Behavior::TempHp => 0,
            Behavior::DamageOverTime => 1,
            Behavior::RandomOutcome { .. } => 2,
            Behavior::Healing => 3,
            Behavior::EndDamage => 0,
            Behavior::DelayedDamage => 1,
            Behavior::EndSave(_) => 2,
        }
    }
}

/// One flag-to-behavior rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRule {
    /// Flag key on the actor
    pub flag: String,
    /// Effect name in the effect store
    pub effect_name: String,
    #[serde(default)]
    pub damage_type: Option<DamageType>,
    pub behavior: Behavior,
}

impl ConditionRule {
    pub fn new(flag: &str, effect_name: &str, behavior: Behavior) -> Self {
        Self {
            flag: flag.to_string(),
            effect_name: effect_name.to_string(),
            damage_type: None,
            behavior,
        }
    }

    pub fn with_damage_type(mut self, damage_type: DamageType) -> Self {
        self.damage_type = Some(damage_type);
        self
    }

    /// "7 acid damage" / "7 damage"
    pub fn describe_damage(&self, amount: u32) -> String {
        describe_damage(amount, self.damage_type)
    }
}

/// Ordered set of condition rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionCatalog {
    rules: Vec<ConditionRule>,
}

impl ConditionCatalog {
    /// Catalog with no rules
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule; it runs after existing rules of the same kind
    pub fn push(&mut self, rule: ConditionRule) {
        self.rules.push(rule);
    }

    pub fn with_rule(mut self, rule: ConditionRule) -> Self {
        self.push(rule);
        self
    }

    pub fn rules(&self) -> &[ConditionRule] {
        &self.rules
    }

    /// Rules for `phase`, in evaluation order
    pub fn phase_rules(&self, phase: Phase) -> Vec<&ConditionRule> {
        let mut rules: Vec<&ConditionRule> = self
            .rules
            .iter()
            .filter(|r| r.behavior.phase() == phase)
            .collect();
        // stable: catalog order is kept inside each kind
        rules.sort_by_key(|r| r.behavior.rank());
        rules
    }

    /// Whether any rule reads `flag`
    pub fn knows(&self, flag: &str) -> bool {
        self.rules.iter().any(|r| r.flag == flag)
    }
}

impl Default for ConditionCatalog {
    fn default() -> Self {
        use Behavior::*;
        use DamageType::*;
        use SaveAbility::*;

        let save = |ability, deals_damage, remove_on_success, half_damage_on_success| {
            EndSave(SaveSpec {
                ability,
                deals_damage,
                remove_on_success,
                half_damage_on_success,
            })
        };

        let rules = vec![
            // turn start
            ConditionRule::new("heroismTempHP", "Heroism", TempHp),
            ConditionRule::new("lacerated", "Lacerated", DamageOverTime).with_damage_type(Slashing),
            ConditionRule::new("estrike", "Ensnaring Strike", DamageOverTime)
                .with_damage_type(Piercing),
            ConditionRule::new("causticbrew", "Tasha's Caustic Brew", DamageOverTime)
                .with_damage_type(Acid),
            ConditionRule::new(
                "confusion",
                "Confusion",
                RandomOutcome { table: "confusion".to_string() },
            ),
            ConditionRule::new(
                "rbreak",
                "Reality Break",
                RandomOutcome { table: "reality-break".to_string() },
            ),
            ConditionRule::new("regenerate", "Regenerate", Healing),
            // turn end
            ConditionRule::new("idinsinuation", "Id Insinuation", EndDamage).with_damage_type(Psychic),
            ConditionRule::new("acidarrow", "Melf's Acid Arrow", DelayedDamage).with_damage_type(Acid),
            ConditionRule::new("vsphere", "Vitriolic Sphere", DelayedDamage).with_damage_type(Acid),
            ConditionRule::new("confusion", "Confusion", save(Wis, false, true, false)),
            ConditionRule::new("rbreak", "Reality Break", save(Wis, false, true, false)),
            ConditionRule::new("idinsinuation", "Id Insinuation", save(Wis, false, true, false)),
            ConditionRule::new("bloodboil", "Blood Boil", save(Con, true, false, true))
                .with_damage_type(Fire),
            ConditionRule::new("immolation", "Immolation", save(Dex, true, true, false))
                .with_damage_type(Fire),
            ConditionRule::new("killingwinds", "Killing Winds", save(Con, true, false, true))
                .with_damage_type(Acid),
            ConditionRule::new("pkiller", "Phantasmal Killer", save(Wis, true, true, false))
                .with_damage_type(Psychic),
            ConditionRule::new("searingsmite", "Searing Smite", save(Con, true, true, false))
                .with_damage_type(Fire),
            ConditionRule::new("vpoison", "Voracious Poison", save(Con, true, false, true))
                .with_damage_type(Poison),
            ConditionRule::new("weird", "Weird", save(Wis, true, true, false))
                .with_damage_type(Psychic),
            ConditionRule::new("synapticstatic", "Synaptic Static", save(Int, false, true, false)),
        ];

        Self { rules }
    }
}
