//! Resource ledger
//!
//! A staged copy of one combatant's hit points. Every effect evaluated in a
//! phase mutates the same ledger, and the phase writes it back once.

use serde::{Deserialize, Serialize};

/// Authoritative hit-point state as stored on the actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceState {
    /// Current hit points
    pub hp_value: u32,
    /// Maximum hit points
    pub hp_max: u32,
    /// Temporary hit points, reserved pool included
    #[serde(default)]
    pub hp_temp: u32,
    /// Part of `hp_temp` granted by stacking-exempt sources (armor mastery)
    #[serde(default)]
    pub reserved_temp: u32,
}

impl ResourceState {
    pub fn new(hp_value: u32, hp_max: u32, hp_temp: u32) -> Self {
        Self {
            hp_value,
            hp_max,
            hp_temp,
            reserved_temp: 0,
        }
    }

    /// Clamp to the ledger invariants
    pub fn normalized(mut self) -> Self {
        self.hp_value = self.hp_value.min(self.hp_max);
        self.reserved_temp = self.reserved_temp.min(self.hp_temp);
        self
    }
}

/// Changed fields to write back on commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourcePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hp_value: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hp_temp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_temp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down: Option<bool>,
}

impl ResourcePatch {
    pub fn is_empty(&self) -> bool {
        self.hp_value.is_none()
            && self.hp_temp.is_none()
            && self.reserved_temp.is_none()
            && self.down.is_none()
    }

    /// Apply this patch to a stored state
    pub fn apply_to(&self, state: &mut ResourceState) {
        if let Some(v) = self.hp_value {
            state.hp_value = v;
        }
        if let Some(v) = self.hp_temp {
            state.hp_temp = v;
        }
        if let Some(v) = self.reserved_temp {
            state.reserved_temp = v;
        }
    }
}

/// Staged hit-point accumulator for one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLedger {
    pub hp_value: u32,
    pub hp_max: u32,
    pub hp_temp: u32,
    pub reserved_temp: u32,
    /// Combatant is at 0 HP
    pub down: bool,
    opened: ResourceState,
    opened_down: bool,
}

impl ResourceLedger {
    /// Open a ledger from the stored state
    pub fn open(state: ResourceState) -> Self {
        let state = state.normalized();
        let down = state.hp_value == 0;
        Self {
            hp_value: state.hp_value,
            hp_max: state.hp_max,
            hp_temp: state.hp_temp,
            reserved_temp: state.reserved_temp,
            down,
            opened: state,
            opened_down: down,
        }
    }

    /// Shorthand for a ledger with no reserved temp HP
    pub fn new(hp_value: u32, hp_max: u32, hp_temp: u32) -> Self {
        Self::open(ResourceState::new(hp_value, hp_max, hp_temp))
    }

    /// Temp HP not covered by the reserved pool
    pub fn stacking_temp(&self) -> u32 {
        self.hp_temp.saturating_sub(self.reserved_temp)
    }

    /// Current values as a stored state
    pub fn state(&self) -> ResourceState {
        ResourceState {
            hp_value: self.hp_value,
            hp_max: self.hp_max,
            hp_temp: self.hp_temp,
            reserved_temp: self.reserved_temp,
        }
    }

    /// Whether anything changed since the ledger was opened
    pub fn is_dirty(&self) -> bool {
        !self.patch().is_empty()
    }

    /// Fields that differ from the opened state
    pub fn patch(&self) -> ResourcePatch {
        let changed = |now: u32, then: u32| (now != then).then_some(now);
        ResourcePatch {
            hp_value: changed(self.hp_value, self.opened.hp_value),
            hp_temp: changed(self.hp_temp, self.opened.hp_temp),
            reserved_temp: changed(self.reserved_temp, self.opened.reserved_temp),
            down: (self.down != self.opened_down).then_some(self.down),
        }
    }

    /// Rebase after a successful commit so the next patch starts empty
    pub fn mark_committed(&mut self) {
        self.opened = self.state();
        self.opened_down = self.down;
    }
}
