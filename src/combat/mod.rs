//! Combat rules
//!
//! Building blocks the engine composes at turn boundaries:
//! - Dice formulas (e.g., "2d6+3")
//! - Staged hit-point ledgers
//! - Damage and healing with temporary HP absorption
//! - Condition flags and the catalog that maps them to behavior
//! - Random outcome tables

mod conditions;
mod damage;
mod dice;
mod ledger;
mod outcomes;

pub use conditions::{
    active_flag, keys, names, Behavior, ConditionCatalog, ConditionFlags, ConditionRule,
    FlagValue, Phase, SaveAbility, SaveSpec,
};
pub use damage::{
    apply_damage, apply_healing, describe_damage, grant_reserved_temp, DamageType,
};
pub use dice::{
    DiceError, DiceFormula, DiceRoller, RollResult, ScriptedRoller, StdRoller, Term,
    MAX_DICE_PER_TERM, MAX_DIE_SIDES,
};
pub use ledger::{ResourceLedger, ResourcePatch, ResourceState};
pub use outcomes::{
    confusion_table, reality_break_table, OutcomeKind, OutcomeRange, OutcomeTable,
    OutcomeTableError, OutcomeTables, RolledOutcome, SubRoll,
};
