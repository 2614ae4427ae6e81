//! Saving throw requests
//!
//! A save request is a decision point only the referee can settle. Issuing
//! one returns a [`SaveHandle`]; resolution is a separate call that claims
//! the request exactly once and fulfils the handle.

mod triggers;

pub use triggers::{
    DeferredAction, FiredTriggers, Registration, TriggerInfo, TriggerRegistry, TriggerToken,
};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::combat::{DamageType, SaveAbility};
use crate::host::{CombatantId, MessageId};

/// Id of one save request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveRequestId(pub Uuid);

impl SaveRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SaveRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SaveRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Referee's ruling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveOutcome {
    Success,
    Failure,
}

impl SaveOutcome {
    /// Option labels shown on the decision prompt
    pub const OPTIONS: [&'static str; 2] = ["success", "failure"];
}

impl FromStr for SaveOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" | "succeed" | "pass" | "s" => Ok(SaveOutcome::Success),
            "failure" | "fail" | "f" => Ok(SaveOutcome::Failure),
            other => Err(format!("unknown save outcome: {}", other)),
        }
    }
}

impl fmt::Display for SaveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveOutcome::Success => write!(f, "success"),
            SaveOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// An issued saving throw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub id: SaveRequestId,
    pub combatant_id: CombatantId,
    /// Damage rolled on resolution; `None` for saves that only end the effect
    pub formula: Option<String>,
    pub ability: SaveAbility,
    pub effect_name: String,
    pub damage_type: Option<DamageType>,
    pub remove_on_success: bool,
    pub half_damage_on_success: bool,
    /// Triggers waiting on this save share the token
    pub token: TriggerToken,
    pub issued_at: DateTime<Utc>,
}

impl SaveRequest {
    pub fn new(combatant_id: CombatantId, ability: SaveAbility, effect_name: &str) -> Self {
        Self {
            id: SaveRequestId::new(),
            combatant_id,
            formula: None,
            ability,
            effect_name: effect_name.to_string(),
            damage_type: None,
            remove_on_success: false,
            half_damage_on_success: false,
            token: TriggerToken::new(),
            issued_at: Utc::now(),
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn with_damage_type(mut self, damage_type: Option<DamageType>) -> Self {
        self.damage_type = damage_type;
        self
    }

    pub fn remove_on_success(mut self, remove: bool) -> Self {
        self.remove_on_success = remove;
        self
    }

    pub fn half_damage_on_success(mut self, half: bool) -> Self {
        self.half_damage_on_success = half;
        self
    }

    pub fn with_token(mut self, token: TriggerToken) -> Self {
        self.token = token;
        self
    }

    /// Referee prompt text
    pub fn prompt_text(&self, who: &str) -> String {
        match &self.formula {
            Some(formula) => format!(
                "{}: {} save vs {} ({}{})",
                who,
                self.ability,
                self.effect_name,
                formula,
                if self.half_damage_on_success { ", half on success" } else { "" }
            ),
            None => format!("{}: {} save vs {}", who, self.ability, self.effect_name),
        }
    }
}

/// Awaitable side of a save request
#[derive(Debug)]
pub struct SaveHandle {
    id: SaveRequestId,
    receiver: oneshot::Receiver<SaveOutcome>,
}

impl SaveHandle {
    pub fn id(&self) -> SaveRequestId {
        self.id
    }

    /// Wait for the referee. `None` if the request was dropped unresolved.
    pub async fn outcome(self) -> Option<SaveOutcome> {
        self.receiver.await.ok()
    }

    /// Outcome if already resolved
    pub fn try_outcome(&mut self) -> Option<SaveOutcome> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
struct PendingSave {
    request: SaveRequest,
    responder: oneshot::Sender<SaveOutcome>,
    message_id: Option<MessageId>,
}

/// A request claimed for resolution
#[derive(Debug)]
pub struct ClaimedSave {
    pub request: SaveRequest,
    pub message_id: Option<MessageId>,
    responder: oneshot::Sender<SaveOutcome>,
}

impl ClaimedSave {
    /// Fulfil the handle once the outcome has been applied
    pub fn finish(self, outcome: SaveOutcome) {
        // the handle may have been dropped
        let _ = self.responder.send(outcome);
    }
}

/// Outstanding save requests
#[derive(Debug, Default)]
pub struct SaveCoordinator {
    pending: Mutex<HashMap<SaveRequestId, PendingSave>>,
}

impl SaveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request and hand back its handle
    pub fn issue(&self, request: SaveRequest) -> SaveHandle {
        let (responder, receiver) = oneshot::channel();
        let id = request.id;
        debug!(
            "Issued {} save for {} vs {} [{}]",
            request.ability, request.combatant_id, request.effect_name, request.token
        );
        self.pending.lock().insert(
            id,
            PendingSave {
                request,
                responder,
                message_id: None,
            },
        );
        SaveHandle { id, receiver }
    }

    /// Remember the prompt posted for a request so it can be retracted
    pub fn attach_message(&self, id: SaveRequestId, message_id: MessageId) {
        if let Some(pending) = self.pending.lock().get_mut(&id) {
            pending.message_id = Some(message_id);
        }
    }

    /// Claim a request for resolution. `None` once it has been claimed.
    pub fn take(&self, id: SaveRequestId) -> Option<ClaimedSave> {
        self.pending.lock().remove(&id).map(|pending| ClaimedSave {
            request: pending.request,
            message_id: pending.message_id,
            responder: pending.responder,
        })
    }

    /// Unresolved requests, oldest first
    pub fn outstanding(&self) -> Vec<SaveRequest> {
        let mut requests: Vec<SaveRequest> =
            self.pending.lock().values().map(|p| p.request.clone()).collect();
        requests.sort_by_key(|r| r.issued_at);
        requests
    }

    /// Unresolved requests under one token
    pub fn outstanding_for(&self, token: TriggerToken) -> u32 {
        self.pending
            .lock()
            .values()
            .filter(|p| p.request.token == token)
            .count() as u32
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
