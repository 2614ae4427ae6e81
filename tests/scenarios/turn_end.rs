//! Turn end scenarios

use std::sync::Arc;

use async_trait::async_trait;

use crate::harness::{TestActor, TestEngine};
use turnfx::combat::{ResourcePatch, SaveAbility, ScriptedRoller};
use turnfx::host::{ActorRecord, ActorRepository, CombatantId, HostError, MemoryHost};
use turnfx::{EffectEngine, EngineConfig, TurnChange};

/// Reads through to the in-memory host, rejects every write
struct RejectingCommits(Arc<MemoryHost>);

#[async_trait]
impl ActorRepository for RejectingCommits {
    async fn resolve(&self, combatant: &CombatantId) -> Result<ActorRecord, HostError> {
        self.0.resolve(combatant).await
    }

    async fn commit(&self, combatant: &CombatantId, _patch: ResourcePatch) -> Result<(), HostError> {
        Err(HostError::CombatantNotFound(combatant.clone()))
    }
}

#[tokio::test]
async fn test_delayed_damage_retracts_itself() {
    let t = TestEngine::new();
    t.add(TestActor::new("orc", 15, 15, 0).effect("Melf's Acid Arrow", "acidarrow", "2d4"))
        .await;
    t.totals([5]);

    t.end_turn("orc").await;
    assert_eq!(t.state("orc").await.hp_value, 10);
    assert!(!t.has_flag("orc", "acidarrow").await);
    assert!(t.host.effect_names(&CombatantId::new("orc")).await.is_empty());

    // nothing left to apply on the next turn end
    t.totals([5]);
    t.end_turn("orc").await;
    assert_eq!(t.state("orc").await.hp_value, 10);
    assert_eq!(t.commits("orc").await, 1);
}

#[tokio::test]
async fn test_delayed_damage_kept_when_commit_fails() {
    let t = TestEngine::new();
    t.add(TestActor::new("orc", 15, 15, 0).effect("Melf's Acid Arrow", "acidarrow", "2d4"))
        .await;
    let engine = EffectEngine::new(
        Arc::new(RejectingCommits(t.host.clone())),
        t.host.clone(),
        t.channel.clone(),
        EngineConfig::default(),
    )
    .with_dice(Arc::new(ScriptedRoller::new().with_totals([5])));

    let report = engine
        .on_turn_change(TurnChange::new(Some(CombatantId::new("orc")), None))
        .await;
    let phase = report.turn_end.unwrap();
    assert_eq!(phase.committed, None);
    assert_eq!(phase.failures.len(), 1);
    assert!(phase.failures[0].starts_with("commit"));

    assert_eq!(t.state("orc").await.hp_value, 15);
    assert!(t.has_flag("orc", "acidarrow").await);
    assert_eq!(
        t.host.effect_names(&CombatantId::new("orc")).await,
        vec!["Melf's Acid Arrow".to_string()]
    );
}

#[tokio::test]
async fn test_no_save_effects_commit_in_one_batch() {
    let t = TestEngine::new();
    t.add(
        TestActor::new("orc", 30, 30, 0)
            .effect("Melf's Acid Arrow", "acidarrow", "2d4")
            .effect("Vitriolic Sphere", "vsphere", "5d4"),
    )
    .await;
    t.totals([4, 10]);

    let report = t.end_turn("orc").await;
    assert_eq!(t.state("orc").await.hp_value, 16);
    assert_eq!(t.commits("orc").await, 1);
    let phase = report.turn_end.unwrap();
    assert_eq!(phase.applied, vec!["acidarrow".to_string(), "vsphere".to_string()]);
}

#[tokio::test]
async fn test_id_insinuation_damages_then_asks_for_save() {
    let t = TestEngine::new();
    t.add(TestActor::new("mage", 22, 22, 0).effect("Id Insinuation", "idinsinuation", "1d12"))
        .await;
    t.totals([6]);

    let report = t.end_turn("mage").await;
    assert_eq!(t.state("mage").await.hp_value, 16);
    assert!(t.said("Mage takes 6 psychic damage from Id Insinuation."));

    let saves = t.engine.outstanding_saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].ability, SaveAbility::Wis);
    assert_eq!(saves[0].formula, None);
    assert!(saves[0].remove_on_success);
    assert_eq!(report.turn_end.unwrap().saves, vec![saves[0].id]);
}

#[tokio::test]
async fn test_save_policies_follow_the_catalog() {
    let t = TestEngine::new();
    t.add(
        TestActor::new("orc", 40, 40, 0)
            .effect("Blood Boil", "bloodboil", "4d6")
            .effect("Immolation", "immolation", "4d6")
            .effect("Synaptic Static", "synapticstatic", "1"),
    )
    .await;

    t.end_turn("orc").await;
    let saves = t.engine.outstanding_saves();
    assert_eq!(saves.len(), 3);
    assert_eq!(t.channel.open_decisions().len(), 3);

    let find = |name: &str| saves.iter().find(|s| s.effect_name == name).unwrap().clone();

    let boil = find("Blood Boil");
    assert_eq!(boil.ability, SaveAbility::Con);
    assert_eq!(boil.formula.as_deref(), Some("4d6"));
    assert!(boil.half_damage_on_success);
    assert!(!boil.remove_on_success);

    let immolation = find("Immolation");
    assert_eq!(immolation.ability, SaveAbility::Dex);
    assert!(immolation.remove_on_success);
    assert!(!immolation.half_damage_on_success);

    let stat = find("Synaptic Static");
    assert_eq!(stat.ability, SaveAbility::Int);
    assert_eq!(stat.formula, None);

    // issuing saves alone changes no hit points
    assert_eq!(t.commits("orc").await, 0);
}

#[tokio::test]
async fn test_turn_end_runs_before_turn_start() {
    let t = TestEngine::new();
    t.add(TestActor::new("orc", 15, 15, 0).effect("Melf's Acid Arrow", "acidarrow", "2d4"))
        .await;
    t.add(TestActor::new("elf", 12, 12, 0).effect("Lacerated", "lacerated", "1d4"))
        .await;
    t.totals([3, 2]);

    let report = t.turn(Some("orc"), Some("elf")).await;
    assert_eq!(t.state("orc").await.hp_value, 12);
    assert_eq!(t.state("elf").await.hp_value, 10);
    assert_eq!(
        t.host.commit_order().await,
        vec![CombatantId::new("orc"), CombatantId::new("elf")]
    );
    assert!(report.turn_end.is_some());
    assert!(report.turn_start.is_some());
}
