//! Damage and healing rules
//!
//! Pure functions over a [`ResourceLedger`]:
//! - Temporary HP absorbs damage before current HP
//! - Neither pool drops below zero
//! - Temporary HP grants never stack, the higher grant wins
//! - The reserved (armor mastery) pool stacks with other temporary HP

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::ledger::ResourceLedger;

/// Types of damage a condition deals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    /// Bleeding wounds
    Slashing,
    /// Thorns, arrows
    Piercing,
    Fire,
    Cold,
    Acid,
    Poison,
    Psychic,
    Force,
}

impl FromStr for DamageType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "slashing" | "bleed" => Ok(DamageType::Slashing),
            "piercing" => Ok(DamageType::Piercing),
            "fire" => Ok(DamageType::Fire),
            "cold" | "ice" => Ok(DamageType::Cold),
            "acid" => Ok(DamageType::Acid),
            "poison" => Ok(DamageType::Poison),
            "psychic" | "mental" => Ok(DamageType::Psychic),
            "force" | "magic" => Ok(DamageType::Force),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for DamageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DamageType::Slashing => "slashing",
            DamageType::Piercing => "piercing",
            DamageType::Fire => "fire",
            DamageType::Cold => "cold",
            DamageType::Acid => "acid",
            DamageType::Poison => "poison",
            DamageType::Psychic => "psychic",
            DamageType::Force => "force",
        };
        write!(f, "{}", s)
    }
}

/// "7 acid damage", or "7 damage" when untyped
pub fn describe_damage(amount: u32, damage_type: Option<DamageType>) -> String {
    match damage_type {
        Some(dtype) => format!("{} {} damage", amount, dtype),
        None => format!("{} damage", amount),
    }
}

/// Apply `amount` damage, halved (rounded down) when `halved` is set
pub fn apply_damage(ledger: &mut ResourceLedger, amount: u32, halved: bool) {
    let dmg = if halved { amount / 2 } else { amount };
    if dmg == 0 {
        return;
    }

    let overflow = dmg.saturating_sub(ledger.hp_temp);
    ledger.hp_temp = ledger.hp_temp.saturating_sub(dmg);
    // non-reserved temp HP goes first
    ledger.reserved_temp = ledger.reserved_temp.min(ledger.hp_temp);

    ledger.hp_value = ledger.hp_value.saturating_sub(overflow);
    if ledger.hp_value == 0 {
        ledger.down = true;
    }
}

/// Apply healing; temporary grants replace the stacking pool only when larger
pub fn apply_healing(ledger: &mut ResourceLedger, amount: u32, is_temporary: bool) {
    if is_temporary {
        let stacking = ledger.stacking_temp().max(amount);
        ledger.hp_temp = ledger.reserved_temp + stacking;
    } else {
        ledger.hp_value = ledger.hp_value.saturating_add(amount).min(ledger.hp_max);
        if ledger.hp_value > 0 {
            ledger.down = false;
        }
    }
}

/// Replace the reserved temp HP pool, keeping other temporary HP intact
pub fn grant_reserved_temp(ledger: &mut ResourceLedger, amount: u32) {
    let stacking = ledger.stacking_temp();
    ledger.reserved_temp = amount;
    ledger.hp_temp = stacking + amount;
}
