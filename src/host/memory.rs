//! In-memory host collaborators
//!
//! Used by the command-line simulator and by tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    ActorRecord, ActorRepository, CombatantId, DecisionPrompt, Effect, EffectId, EffectStore,
    HostError, MessageId, NotificationChannel,
};
use crate::combat::{ConditionFlags, ResourcePatch, RollResult};

/// Actor records and effects held in memory
#[derive(Debug, Default)]
pub struct MemoryHost {
    actors: RwLock<HashMap<CombatantId, ActorRecord>>,
    effects: RwLock<HashMap<CombatantId, Vec<Effect>>>,
    /// Every commit, in order
    commits: RwLock<Vec<(CombatantId, ResourcePatch)>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared instance
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add or replace an actor
    pub async fn insert_actor(&self, record: ActorRecord) {
        self.actors.write().await.insert(record.id.clone(), record);
    }

    /// Remove an actor and its effects
    pub async fn remove_actor(&self, id: &CombatantId) -> bool {
        self.effects.write().await.remove(id);
        self.actors.write().await.remove(id).is_some()
    }

    /// Current record for an actor
    pub async fn actor(&self, id: &CombatantId) -> Option<ActorRecord> {
        self.actors.read().await.get(id).cloned()
    }

    /// Patches committed for one combatant, oldest first
    pub async fn commits_for(&self, id: &CombatantId) -> Vec<ResourcePatch> {
        self.commits
            .read()
            .await
            .iter()
            .filter(|(cid, _)| cid == id)
            .map(|(_, patch)| *patch)
            .collect()
    }

    /// Total number of commits
    pub async fn commit_count(&self) -> usize {
        self.commits.read().await.len()
    }

    /// Combatants in the order their commits landed
    pub async fn commit_order(&self) -> Vec<CombatantId> {
        self.commits.read().await.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Names of effects currently on a combatant
    pub async fn effect_names(&self, id: &CombatantId) -> Vec<String> {
        self.effects
            .read()
            .await
            .get(id)
            .map(|list| list.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActorRepository for MemoryHost {
    async fn resolve(&self, combatant: &CombatantId) -> Result<ActorRecord, HostError> {
        self.actors
            .read()
            .await
            .get(combatant)
            .cloned()
            .ok_or_else(|| HostError::CombatantNotFound(combatant.clone()))
    }

    async fn commit(&self, combatant: &CombatantId, patch: ResourcePatch) -> Result<(), HostError> {
        {
            let mut actors = self.actors.write().await;
            let actor = actors
                .get_mut(combatant)
                .ok_or_else(|| HostError::CombatantNotFound(combatant.clone()))?;
            patch.apply_to(&mut actor.resources);
        }
        self.commits.write().await.push((combatant.clone(), patch));
        Ok(())
    }
}

#[async_trait]
impl EffectStore for MemoryHost {
    async fn create_effect(
        &self,
        combatant: &CombatantId,
        name: &str,
        flags: ConditionFlags,
    ) -> Result<EffectId, HostError> {
        if !self.actors.read().await.contains_key(combatant) {
            return Err(HostError::CombatantNotFound(combatant.clone()));
        }

        // one effect per name: re-applying replaces it
        self.remove_effect(combatant, name).await?;

        let effect = Effect {
            id: EffectId(Uuid::new_v4()),
            name: name.to_string(),
            flags,
        };
        let id = effect.id;

        let mut actors = self.actors.write().await;
        let actor = actors
            .get_mut(combatant)
            .ok_or_else(|| HostError::CombatantNotFound(combatant.clone()))?;
        for (key, value) in &effect.flags {
            actor.flags.insert(key.clone(), value.clone());
        }
        self.effects
            .write()
            .await
            .entry(combatant.clone())
            .or_default()
            .push(effect);

        debug!("Created effect {} on {}", name, combatant);
        Ok(id)
    }

    async fn remove_effect(&self, combatant: &CombatantId, name: &str) -> Result<bool, HostError> {
        let (removed, still_set) = {
            let mut effects = self.effects.write().await;
            let Some(list) = effects.get_mut(combatant) else {
                return Ok(false);
            };
            let Some(pos) = list.iter().position(|e| e.name == name) else {
                return Ok(false);
            };
            let removed = list.remove(pos);
            let still_set: HashSet<String> =
                list.iter().flat_map(|e| e.flags.keys().cloned()).collect();
            (removed, still_set)
        };

        if let Some(actor) = self.actors.write().await.get_mut(combatant) {
            for key in removed.flags.keys() {
                if !still_set.contains(key) {
                    actor.flags.remove(key);
                }
            }
        }

        debug!("Removed effect {} from {}", name, combatant);
        Ok(true)
    }

    async fn find_effect(
        &self,
        combatant: &CombatantId,
        name: &str,
    ) -> Result<Option<Effect>, HostError> {
        Ok(self
            .effects
            .read()
            .await
            .get(combatant)
            .and_then(|list| list.iter().find(|e| e.name == name).cloned()))
    }
}

/// Something posted to a [`MemoryChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Roll {
        formula: String,
        total: i32,
        flavor: String,
    },
    Message(String),
    Decision {
        message_id: MessageId,
        prompt: DecisionPrompt,
    },
    Retracted(MessageId),
}

/// Notification channel that records notices and logs them
#[derive(Debug, Default)]
pub struct MemoryChannel {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Everything posted so far
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// Public narrative messages
    pub fn messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notice::Message(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Decision prompts that have not been retracted
    pub fn open_decisions(&self) -> Vec<DecisionPrompt> {
        let notices = self.notices.lock();
        let retracted: HashSet<MessageId> = notices
            .iter()
            .filter_map(|n| match n {
                Notice::Retracted(id) => Some(*id),
                _ => None,
            })
            .collect();
        notices
            .iter()
            .filter_map(|n| match n {
                Notice::Decision { message_id, prompt } if !retracted.contains(message_id) => {
                    Some(prompt.clone())
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    async fn announce_roll(&self, roll: &RollResult, flavor: &str) {
        info!("{} [{} = {}]", flavor, roll.formula, roll.total);
        self.notices.lock().push(Notice::Roll {
            formula: roll.formula.clone(),
            total: roll.total,
            flavor: flavor.to_string(),
        });
    }

    async fn announce(&self, text: &str) {
        info!("{}", text);
        self.notices.lock().push(Notice::Message(text.to_string()));
    }

    async fn present_decision(&self, prompt: DecisionPrompt) -> Result<MessageId, HostError> {
        let message_id = MessageId::new();
        info!("[referee] {} ({})", prompt.text, prompt.options.join(" / "));
        self.notices.lock().push(Notice::Decision { message_id, prompt });
        Ok(message_id)
    }

    async fn retract_message(&self, message_id: MessageId) {
        debug!("Retracted message {:?}", message_id);
        self.notices.lock().push(Notice::Retracted(message_id));
    }
}
