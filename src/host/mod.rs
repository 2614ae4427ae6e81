//! Host collaborators
//!
//! The engine never owns combatants. It reads and writes them through:
//! - [`ActorRepository`]: hit points and condition flags
//! - [`EffectStore`]: named effects that set and clear flags
//! - [`NotificationChannel`]: roll announcements and referee prompts

mod memory;

pub use memory::{MemoryChannel, MemoryHost, Notice};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::combat::{ConditionFlags, ResourcePatch, ResourceState, RollResult};
use crate::saves::SaveRequestId;

/// Opaque combatant id; actors outside combat share the same id space
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatantId(String);

impl CombatantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CombatantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Id of an effect in the effect store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectId(pub Uuid);

/// Id of a message on the notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Actor behind a combatant, as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub id: CombatantId,
    pub name: String,
    pub resources: ResourceState,
    #[serde(default)]
    pub flags: ConditionFlags,
}

/// An effect held by the effect store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    pub id: EffectId,
    pub name: String,
    /// Flags the effect sets while present
    pub flags: ConditionFlags,
}

/// Referee-facing decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionPrompt {
    /// Request this prompt resolves
    pub request_id: SaveRequestId,
    pub text: String,
    pub options: Vec<String>,
}

/// Collaborator failures
#[derive(Debug, Error)]
pub enum HostError {
    #[error("combatant not found: {0}")]
    CombatantNotFound(CombatantId),

    #[error("effect store error: {0}")]
    EffectStore(String),

    #[error("notification channel error: {0}")]
    Notification(String),
}

/// Hit-point state and flags for combatants
#[async_trait]
pub trait ActorRepository: Send + Sync {
    /// Resolve the actor behind a combatant
    async fn resolve(&self, combatant: &CombatantId) -> Result<ActorRecord, HostError>;

    /// Write changed hit-point fields back
    async fn commit(&self, combatant: &CombatantId, patch: ResourcePatch) -> Result<(), HostError>;
}

/// Named effects on combatants
#[async_trait]
pub trait EffectStore: Send + Sync {
    /// Create (or replace) a named effect that sets `flags`
    async fn create_effect(
        &self,
        combatant: &CombatantId,
        name: &str,
        flags: ConditionFlags,
    ) -> Result<EffectId, HostError>;

    /// Remove a named effect and clear its flags; false if it was not present
    async fn remove_effect(&self, combatant: &CombatantId, name: &str) -> Result<bool, HostError>;

    async fn find_effect(
        &self,
        combatant: &CombatantId,
        name: &str,
    ) -> Result<Option<Effect>, HostError>;
}

/// Messages to players and referee
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Public roll announcement
    async fn announce_roll(&self, roll: &RollResult, flavor: &str);

    /// Public narrative message
    async fn announce(&self, text: &str);

    /// Referee-only decision prompt
    async fn present_decision(&self, prompt: DecisionPrompt) -> Result<MessageId, HostError>;

    /// Remove a previously posted message
    async fn retract_message(&self, message_id: MessageId);
}
