//! Integration Test Harness
//!
//! Test infrastructure for the effect engine:
//! - `TestEngine` - Engine over the in-memory host with scripted dice
//! - `TestActor` - Builder for combatants and their effects
//!
//! # Example
//!
//! ```rust,ignore
//! use harness::{TestActor, TestEngine};
//!
//! #[tokio::test]
//! async fn test_bleed() {
//!     let t = TestEngine::new();
//!     t.add(TestActor::new("orc", 20, 20, 0).effect("Lacerated", "lacerated", "1d4")).await;
//!     t.totals([3]);
//!     t.start_turn("orc").await;
//!     assert_eq!(t.state("orc").await.hp_value, 17);
//! }
//! ```

#![allow(dead_code)]


pub use actors::TestActor;

use std::sync::Arc;

use turnfx::combat::{ConditionCatalog, OutcomeTables, ResourceState, ScriptedRoller};
use turnfx::host::{CombatantId, MemoryChannel, MemoryHost, Notice};
use turnfx::{EffectEngine, EngineConfig, TurnChange, TurnReport};

/// Engine wired to in-memory collaborators and a scripted roller
pub struct TestEngine {
    pub host: Arc<MemoryHost>,
    pub channel: Arc<MemoryChannel>,
    pub dice: Arc<ScriptedRoller>,
    pub engine: EffectEngine,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::build(ConditionCatalog::default(), OutcomeTables::builtin(), EngineConfig::default())
    }

    pub fn with_catalog(catalog: ConditionCatalog) -> Self {
        Self::build(catalog, OutcomeTables::builtin(), EngineConfig::default())
    }

    pub fn build(catalog: ConditionCatalog, tables: OutcomeTables, config: EngineConfig) -> Self {
        let host = MemoryHost::shared();
        let channel = MemoryChannel::shared();
        let dice = Arc::new(ScriptedRoller::new());
        let engine = EffectEngine::new(host.clone(), host.clone(), channel.clone(), config)
            .with_dice(dice.clone())
            .with_catalog(catalog)
            .with_tables(tables);
        Self {
            host,
            channel,
            dice,
            engine,
        }
    }

    /// Add a combatant and create its effects
    pub async fn add(&self, actor: TestActor) -> CombatantId {
        actor.install(&self.host).await
    }

    /// Queue formula totals
    pub fn totals(&self, totals: impl IntoIterator<Item = i32>) {
        for total in totals {
            self.dice.push_total(total);
        }
    }

    /// Queue single-die faces (outcome tables)
    pub fn faces(&self, faces: impl IntoIterator<Item = u32>) {
        for face in faces {
            self.dice.push_face(face);
        }
    }

    pub async fn turn(&self, previous: Option<&str>, current: Option<&str>) -> TurnReport {
        self.engine
            .on_turn_change(TurnChange::new(
                previous.map(CombatantId::from),
                current.map(CombatantId::from),
            ))
            .await
    }

    pub async fn start_turn(&self, id: &str) -> TurnReport {
        self.turn(None, Some(id)).await
    }

    pub async fn end_turn(&self, id: &str) -> TurnReport {
        self.turn(Some(id), None).await
    }

    pub async fn state(&self, id: &str) -> ResourceState {
        self.host
            .actor(&CombatantId::from(id))
            .await
            .expect("actor missing")
            .resources
    }

    pub async fn commits(&self, id: &str) -> usize {
        self.host.commits_for(&CombatantId::from(id)).await.len()
    }

    pub async fn has_flag(&self, id: &str, key: &str) -> bool {
        self.host
            .actor(&CombatantId::from(id))
            .await
            .is_some_and(|a| a.flags.contains_key(key))
    }

    /// Number of roll announcements so far
    pub fn announced_rolls(&self) -> usize {
        self.channel
            .notices()
            .iter()
            .filter(|n| matches!(n, Notice::Roll { .. }))
            .count()
    }

    /// Whether any public message contains `text`
    pub fn said(&self, text: &str) -> bool {
        self.channel.messages().iter().any(|m| m.contains(text))
    }
}
