//! Pending trigger registry
//!
//! A trigger holds a deferred ledger action until a counted number of save
//! requests sharing its token have resolved. Decrementing and firing happen
//! in one critical section, so two resolutions racing on the same token can
//! neither double-fire nor miss the action.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::combat::ResourceLedger;
use crate::host::CombatantId;

/// Key shared by every save and trigger of one turn-boundary invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerToken(pub Uuid);

impl TriggerToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TriggerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type LedgerAction = Box<dyn FnOnce(&mut ResourceLedger) + Send>;

/// Ledger mutation waiting on outstanding saves
pub struct DeferredAction {
    /// Combatant whose ledger the action applies to
    pub combatant_id: CombatantId,
    pub label: String,
    apply: LedgerAction,
}

impl DeferredAction {
    pub fn new(
        combatant_id: CombatantId,
        label: impl Into<String>,
        apply: impl FnOnce(&mut ResourceLedger) + Send + 'static,
    ) -> Self {
        Self {
            combatant_id,
            label: label.into(),
            apply: Box::new(apply),
        }
    }

    /// Run the action against a ledger
    pub fn run(self, ledger: &mut ResourceLedger) {
        (self.apply)(ledger)
    }
}

impl fmt::Debug for DeferredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredAction")
            .field("combatant_id", &self.combatant_id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct PendingTrigger {
    remaining: u32,
    registered_at: DateTime<Utc>,
    action: DeferredAction,
}

/// Outcome of [`TriggerRegistry::register`]
#[derive(Debug)]
pub enum Registration {
    /// Stored until its saves resolve
    Stored,
    /// Nothing to wait for; the caller runs the action now
    RunNow(DeferredAction),
}

/// Result of [`TriggerRegistry::decrement_and_maybe_fire`]
#[derive(Debug, Default)]
pub struct FiredTriggers {
    /// Labels of actions run against the given ledger
    pub applied: Vec<String>,
    /// Fired actions that belong to other combatants
    pub elsewhere: Vec<DeferredAction>,
}

impl FiredTriggers {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.elsewhere.is_empty()
    }

    /// Labels of every fired action
    pub fn labels(&self) -> Vec<String> {
        let mut labels = self.applied.clone();
        labels.extend(self.elsewhere.iter().map(|a| a.label.clone()));
        labels
    }
}

/// Snapshot of a stored trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerInfo {
    pub token: TriggerToken,
    pub combatant_id: CombatantId,
    pub label: String,
    pub remaining: u32,
    pub registered_at: DateTime<Utc>,
}

/// Injectable registry of pending triggers
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    entries: Mutex<HashMap<TriggerToken, Vec<PendingTrigger>>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `action` until `count` saves under `token` resolve.
    /// A zero count is never stored.
    pub fn register(&self, token: TriggerToken, count: u32, action: DeferredAction) -> Registration {
        if count == 0 {
            return Registration::RunNow(action);
        }

        debug!(
            "Registered trigger '{}' for {} waiting on {} save(s) [{}]",
            action.label, action.combatant_id, count, token
        );
        self.entries.lock().entry(token).or_default().push(PendingTrigger {
            remaining: count,
            registered_at: Utc::now(),
            action,
        });
        Registration::Stored
    }

    /// Count one resolved save under `token` and hand back every action that
    /// reached zero. Entries are removed before they are returned; unknown
    /// tokens are a no-op.
    pub fn decrement(&self, token: TriggerToken) -> Vec<DeferredAction> {
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(&token) else {
            return Vec::new();
        };

        let mut fired = Vec::new();
        let mut waiting = Vec::with_capacity(list.len());
        for mut trigger in list.drain(..) {
            trigger.remaining = trigger.remaining.saturating_sub(1);
            if trigger.remaining == 0 {
                fired.push(trigger.action);
            } else {
                waiting.push(trigger);
            }
        }

        if waiting.is_empty() {
            entries.remove(&token);
        } else {
            *list = waiting;
        }

        for action in &fired {
            debug!("Trigger '{}' for {} fired [{}]", action.label, action.combatant_id, token);
        }
        fired
    }

    /// Decrement and run every fired action belonging to `combatant`
    /// against its ledger. Fired actions for other combatants are handed
    /// back for the caller to apply to their own ledgers.
    pub fn decrement_and_maybe_fire(
        &self,
        token: TriggerToken,
        combatant: &CombatantId,
        ledger: &mut ResourceLedger,
    ) -> FiredTriggers {
        let mut fired = FiredTriggers::default();
        for action in self.decrement(token) {
            if &action.combatant_id == combatant {
                fired.applied.push(action.label.clone());
                action.run(ledger);
            } else {
                fired.elsewhere.push(action);
            }
        }
        fired
    }

    /// Number of stored triggers
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored triggers, oldest first
    pub fn snapshot(&self) -> Vec<TriggerInfo> {
        let entries = self.entries.lock();
        let mut infos: Vec<TriggerInfo> = entries
            .iter()
            .flat_map(|(token, list)| {
                list.iter().map(move |t| TriggerInfo {
                    token: *token,
                    combatant_id: t.action.combatant_id.clone(),
                    label: t.action.label.clone(),
                    remaining: t.remaining,
                    registered_at: t.registered_at,
                })
            })
            .collect();
        infos.sort_by_key(|info| info.registered_at);
        infos
    }
}
