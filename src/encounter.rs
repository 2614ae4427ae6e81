//! Encounter files and the turn-order simulator
//!
//! An encounter is a TOML list of combatants with their hit points and
//! condition flags:
//!
//! ```toml
//! [[combatants]]
//! id = "troll"
//! name = "Troll"
//! hp = 40
//! max = 84
//!
//! [combatants.flags]
//! regenerate = "10"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use figment::providers::{Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::combat::{ConditionFlags, ResourceState};
use crate::config::EngineConfig;
use crate::engine::{EffectEngine, TurnChange};
use crate::host::{ActorRecord, CombatantId, EffectStore, HostError, MemoryChannel, MemoryHost};
use crate::saves::SaveOutcome;

#[derive(Debug, Error)]
pub enum EncounterError {
    #[error("encounter file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid encounter: {0}")]
    Invalid(#[from] Box<figment::Error>),

    #[error("encounter has no combatants")]
    Empty,

    #[error(transparent)]
    Host(#[from] HostError),
}

/// One combatant in an encounter file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantSpec {
    pub id: CombatantId,
    pub name: String,
    pub hp: u32,
    pub max: u32,
    #[serde(default)]
    pub temp: u32,
    #[serde(default)]
    pub flags: ConditionFlags,
}

impl CombatantSpec {
    fn record(&self) -> ActorRecord {
        ActorRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            resources: ResourceState::new(self.hp, self.max, self.temp).normalized(),
            flags: ConditionFlags::new(),
        }
    }
}

/// Combatants in turn order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Encounter {
    #[serde(default)]
    pub combatants: Vec<CombatantSpec>,
}

impl Encounter {
    pub fn load(path: &Path) -> Result<Self, EncounterError> {
        if !path.exists() {
            return Err(EncounterError::NotFound(path.to_path_buf()));
        }
        let encounter: Encounter = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(Box::new)?;
        if encounter.combatants.is_empty() {
            return Err(EncounterError::Empty);
        }
        Ok(encounter)
    }
}

/// How the simulator answers save prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavePolicy {
    #[default]
    Fail,
    Succeed,
    /// Fail, succeed, fail, ...
    Alternate,
}

impl SavePolicy {
    /// Ruling for the `nth` save resolved in a run
    pub fn outcome(self, nth: usize) -> SaveOutcome {
        match self {
            SavePolicy::Fail => SaveOutcome::Failure,
            SavePolicy::Succeed => SaveOutcome::Success,
            SavePolicy::Alternate if nth % 2 == 0 => SaveOutcome::Failure,
            SavePolicy::Alternate => SaveOutcome::Success,
        }
    }
}

impl FromStr for SavePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(SavePolicy::Fail),
            "succeed" | "success" => Ok(SavePolicy::Succeed),
            "alternate" => Ok(SavePolicy::Alternate),
            other => Err(format!(
                "unknown save policy '{}' (expected fail, succeed or alternate)",
                other
            )),
        }
    }
}

impl fmt::Display for SavePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SavePolicy::Fail => "fail",
            SavePolicy::Succeed => "succeed",
            SavePolicy::Alternate => "alternate",
        };
        write!(f, "{}", s)
    }
}

/// Runs an encounter over the in-memory host
pub struct Simulation {
    host: Arc<MemoryHost>,
    channel: Arc<MemoryChannel>,
    engine: EffectEngine,
    order: Vec<CombatantId>,
}

impl Simulation {
    /// Populate an in-memory host from `encounter`. Flags are grouped into
    /// effects named after their catalog rule so saves can retract them.
    pub async fn new(encounter: &Encounter, config: EngineConfig) -> Result<Self, EncounterError> {
        if encounter.combatants.is_empty() {
            return Err(EncounterError::Empty);
        }

        let host = MemoryHost::shared();
        let channel = MemoryChannel::shared();
        let engine = EffectEngine::new(host.clone(), host.clone(), channel.clone(), config);

        for spec in &encounter.combatants {
            host.insert_actor(spec.record()).await;

            let mut by_effect: BTreeMap<String, ConditionFlags> = BTreeMap::new();
            for (key, value) in &spec.flags {
                let name = engine
                    .catalog()
                    .rules()
                    .iter()
                    .find(|r| &r.flag == key)
                    .map(|r| r.effect_name.clone())
                    .unwrap_or_else(|| key.clone());
                by_effect
                    .entry(name)
                    .or_default()
                    .insert(key.clone(), value.clone());
            }
            for (name, flags) in by_effect {
                host.create_effect(&spec.id, &name, flags).await?;
            }
            debug!("Loaded combatant {}", spec.id);
        }

        Ok(Self {
            host,
            channel,
            engine,
            order: encounter.combatants.iter().map(|c| c.id.clone()).collect(),
        })
    }

    /// Replace the engine's parts (dice, catalog, tables)
    pub fn map_engine(mut self, f: impl FnOnce(EffectEngine) -> EffectEngine) -> Self {
        self.engine = f(self.engine);
        self
    }

    pub fn engine(&self) -> &EffectEngine {
        &self.engine
    }

    pub fn host(&self) -> &Arc<MemoryHost> {
        &self.host
    }

    pub fn channel(&self) -> &Arc<MemoryChannel> {
        &self.channel
    }

    /// Run `rounds` full rounds, answering saves after each boundary.
    /// Returns the final records in turn order.
    pub async fn run(&self, rounds: u32, policy: SavePolicy) -> Vec<ActorRecord> {
        let mut previous: Option<CombatantId> = None;
        let mut resolved = 0;

        for round in 1..=rounds {
            info!("Round {}", round);
            for id in &self.order {
                self.engine
                    .on_turn_change(TurnChange::new(previous.take(), Some(id.clone())))
                    .await;

                for request in self.engine.outstanding_saves() {
                    let outcome = policy.outcome(resolved);
                    resolved += 1;
                    if let Err(e) = self.engine.resolve_save(request.id, outcome).await {
                        warn!("Failed to resolve save {}: {}", request.id, e);
                    }
                }
                previous = Some(id.clone());
            }
        }

        let mut records = Vec::with_capacity(self.order.len());
        for id in &self.order {
            if let Some(record) = self.host.actor(id).await {
                records.push(record);
            }
        }
        records
    }
}
