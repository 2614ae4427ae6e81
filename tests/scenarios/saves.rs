//! Save resolution scenarios

use crate::harness::{TestActor, TestEngine};
use turnfx::combat::{
    Behavior, ConditionCatalog, ConditionRule, DamageType, OutcomeKind, OutcomeRange, OutcomeTable,
    OutcomeTables, SaveAbility,
};
use turnfx::host::CombatantId;
use turnfx::saves::{SaveOutcome, SaveRequest};
use turnfx::{EngineConfig, SaveResolution};

/// Outcome table whose only branch is a half-damage save
fn rift_engine(remove_on_success: bool) -> TestEngine {
    let table = OutcomeTable::new(
        "rift",
        2,
        vec![OutcomeRange {
            low: 1,
            high: 2,
            title: "Rift".to_string(),
            text: "is pulled toward the rift".to_string(),
            kind: OutcomeKind::Save {
                formula: "2d10".to_string(),
                ability: SaveAbility::Dex,
                damage_type: Some(DamageType::Force),
                half_damage_on_success: true,
                remove_on_success,
            },
        }],
    )
    .unwrap();
    let catalog = ConditionCatalog::default().with_rule(ConditionRule::new(
        "rift",
        "Rift",
        Behavior::RandomOutcome {
            table: "rift".to_string(),
        },
    ));
    TestEngine::build(
        catalog,
        OutcomeTables::builtin().with_table(table),
        EngineConfig::default(),
    )
}

/// Outcome save resolved as a success: half of 12, the pending trigger
/// under the same token goes down by one
#[tokio::test]
async fn test_half_damage_on_success_keeps_effect() {
    let t = TestEngine::new();
    t.add(TestActor::new("orc", 30, 30, 0).effect("Weird", "weird", "4d10"))
        .await;
    t.add(
        TestActor::new("giant", 84, 84, 0)
            .effect("Reality Break", "rbreak", "1")
            .effect("Regenerate", "regenerate", "10"),
    )
    .await;
    t.faces([3]);
    t.totals([10, 12]);

    let report = t.turn(Some("orc"), Some("giant")).await;
    assert_eq!(report.turn_start.unwrap().deferred, vec!["Regenerate".to_string()]);
    let triggers = t.engine.trigger_snapshot();
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].remaining, 2);

    let rift = t
        .engine
        .outstanding_saves()
        .into_iter()
        .find(|s| s.effect_name == "Reality Break")
        .unwrap();
    let resolution = t.engine.resolve_success(rift.id).await.unwrap();

    match resolution {
        SaveResolution::Applied {
            damage,
            removed,
            fired,
            ..
        } => {
            assert_eq!(damage, 6);
            assert!(!removed);
            assert!(fired.is_empty());
        }
        SaveResolution::AlreadyResolved => panic!("save was already resolved"),
    }
    assert_eq!(t.state("giant").await.hp_value, 78);
    assert!(t.has_flag("giant", "rbreak").await);
    assert_eq!(t.engine.trigger_snapshot()[0].remaining, 1);
}

#[tokio::test]
async fn test_remove_on_success_retracts_effect() {
    let t = rift_engine(true);
    t.add(TestActor::new("giant", 84, 84, 0).effect("Rift", "rift", "1"))
        .await;
    t.totals([12]);

    t.start_turn("giant").await;
    let save = t.engine.outstanding_saves().remove(0);
    assert_eq!(save.formula.as_deref(), Some("2d10"));

    let resolution = t.engine.resolve_success(save.id).await.unwrap();
    assert!(matches!(
        resolution,
        SaveResolution::Applied {
            damage: 6,
            removed: true,
            ..
        }
    ));
    assert_eq!(t.state("giant").await.hp_value, 78);
    assert!(!t.has_flag("giant", "rift").await);
}

#[tokio::test]
async fn test_outcome_save_without_removal() {
    let t = rift_engine(false);
    t.add(TestActor::new("giant", 84, 84, 0).effect("Rift", "rift", "1"))
        .await;
    t.totals([12]);

    t.start_turn("giant").await;
    let save = t.engine.outstanding_saves().remove(0);
    t.engine.resolve_success(save.id).await.unwrap();
    assert_eq!(t.state("giant").await.hp_value, 78);
    assert!(t.has_flag("giant", "rift").await);
}

#[tokio::test]
async fn test_failure_deals_full_damage() {
    let t = TestEngine::new();
    t.add(TestActor::new("orc", 30, 30, 0).effect("Weird", "weird", "4d10"))
        .await;
    t.totals([17]);

    t.end_turn("orc").await;
    let save = t.engine.outstanding_saves().remove(0);
    t.engine.resolve_failure(save.id).await.unwrap();

    assert_eq!(t.state("orc").await.hp_value, 13);
    assert!(t.has_flag("orc", "weird").await);
    assert!(t.said("Orc takes 17 psychic damage from Weird."));
}

#[tokio::test]
async fn test_success_without_half_damage_rolls_nothing() {
    let t = TestEngine::new();
    t.add(TestActor::new("orc", 30, 30, 0).effect("Weird", "weird", "4d10"))
        .await;
    t.totals([17]);

    t.end_turn("orc").await;
    let save = t.engine.outstanding_saves().remove(0);
    t.engine.resolve_success(save.id).await.unwrap();

    assert_eq!(t.state("orc").await.hp_value, 30);
    assert!(!t.has_flag("orc", "weird").await);
    assert_eq!(t.dice.remaining_totals(), 1);
}

#[tokio::test]
async fn test_double_resolution_is_noop() {
    let t = TestEngine::new();
    t.add(TestActor::new("orc", 30, 30, 0).effect("Blood Boil", "bloodboil", "4d6"))
        .await;
    t.totals([10, 10]);

    t.end_turn("orc").await;
    let save = t.engine.outstanding_saves().remove(0);
    assert_eq!(t.channel.open_decisions().len(), 1);

    t.engine.resolve_failure(save.id).await.unwrap();
    assert!(t.channel.open_decisions().is_empty());

    let again = t.engine.resolve_failure(save.id).await.unwrap();
    assert_eq!(again, SaveResolution::AlreadyResolved);
    assert_eq!(t.state("orc").await.hp_value, 20);
    assert_eq!(t.commits("orc").await, 1);
    assert_eq!(t.dice.remaining_totals(), 1);
}

/// Healing for the incoming combatant waits on both of the outgoing
/// combatant's saves
#[tokio::test]
async fn test_healing_waits_for_other_combatants_saves() {
    for outcomes in [
        [SaveOutcome::Failure, SaveOutcome::Success],
        [SaveOutcome::Success, SaveOutcome::Failure],
    ] {
        let t = TestEngine::new();
        t.add(
            TestActor::new("orc", 40, 40, 0)
                .effect("Weird", "weird", "4d10")
                .effect("Blood Boil", "bloodboil", "4d6"),
        )
        .await;
        t.add(TestActor::new("troll", 40, 84, 0).effect("Regenerate", "regenerate", "10"))
            .await;
        // regeneration roll, then damage for each resolution
        t.totals([10, 8, 8]);

        t.turn(Some("orc"), Some("troll")).await;
        assert_eq!(t.commits("troll").await, 0);
        assert_eq!(t.engine.pending_triggers(), 1);

        let saves = t.engine.outstanding_saves();
        assert_eq!(saves.len(), 2);

        let first = t.engine.resolve_save(saves[0].id, outcomes[0]).await.unwrap();
        assert!(matches!(first, SaveResolution::Applied { ref fired, .. } if fired.is_empty()));
        assert_eq!(t.commits("troll").await, 0);
        assert_eq!(t.state("troll").await.hp_value, 40);

        let second = t.engine.resolve_save(saves[1].id, outcomes[1]).await.unwrap();
        assert!(
            matches!(second, SaveResolution::Applied { ref fired, .. } if fired == &vec!["Regenerate".to_string()])
        );
        assert_eq!(t.commits("troll").await, 1);
        assert_eq!(t.state("troll").await.hp_value, 50);
        assert_eq!(t.engine.pending_triggers(), 0);
        assert!(t.said("Regenerate takes effect for Troll."));
    }
}

/// The save and the waiting healing belong to the same combatant: both land
/// in one commit
#[tokio::test]
async fn test_own_save_releases_own_healing() {
    let t = TestEngine::new();
    t.add(
        TestActor::new("giant", 40, 84, 0)
            .effect("Reality Break", "rbreak", "1")
            .effect("Regenerate", "regenerate", "10"),
    )
    .await;
    t.faces([3]);
    // regeneration roll, then the rift damage on failure
    t.totals([10, 20]);

    let report = t.start_turn("giant").await;
    assert_eq!(report.turn_start.unwrap().deferred, vec!["Regenerate".to_string()]);
    assert_eq!(t.commits("giant").await, 0);

    let save = t.engine.outstanding_saves().remove(0);
    let resolution = t.engine.resolve_failure(save.id).await.unwrap();
    assert!(
        matches!(resolution, SaveResolution::Applied { damage: 20, ref fired, .. } if fired == &vec!["Regenerate".to_string()])
    );

    assert_eq!(t.state("giant").await.hp_value, 30);
    assert_eq!(t.commits("giant").await, 1);
    assert_eq!(t.engine.pending_triggers(), 0);
    assert!(t.said("Regenerate takes effect for Giant."));
}

#[tokio::test]
async fn test_concurrent_resolutions_fire_once() {
    let t = TestEngine::new();
    t.add(
        TestActor::new("orc", 40, 40, 0)
            .effect("Weird", "weird", "4d10")
            .effect("Immolation", "immolation", "4d6"),
    )
    .await;
    t.add(TestActor::new("troll", 40, 84, 0).effect("Regenerate", "regenerate", "10"))
        .await;
    t.totals([10, 1, 1]);

    t.turn(Some("orc"), Some("troll")).await;
    let saves = t.engine.outstanding_saves();

    let (a, b) = tokio::join!(
        t.engine.resolve_failure(saves[0].id),
        t.engine.resolve_failure(saves[1].id),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(t.state("troll").await.hp_value, 50);
    assert_eq!(t.commits("troll").await, 1);
    assert_eq!(t.state("orc").await.hp_value, 38);
}

#[tokio::test]
async fn test_trigger_still_fires_when_save_target_is_gone() {
    let t = TestEngine::new();
    t.add(TestActor::new("orc", 40, 40, 0).effect("Weird", "weird", "4d10"))
        .await;
    t.add(TestActor::new("troll", 40, 84, 0).effect("Regenerate", "regenerate", "10"))
        .await;
    t.totals([10]);

    t.turn(Some("orc"), Some("troll")).await;
    assert!(t.host.remove_actor(&CombatantId::new("orc")).await);

    let save = t.engine.outstanding_saves().remove(0);
    t.engine.resolve_failure(save.id).await.unwrap();
    assert_eq!(t.state("troll").await.hp_value, 50);
    assert!(t.engine.outstanding_saves().is_empty());
}

#[tokio::test]
async fn test_save_handle_receives_outcome() {
    let t = TestEngine::new();
    t.add(TestActor::new("orc", 30, 30, 0)).await;
    t.totals([9]);

    let request = SaveRequest::new(CombatantId::new("orc"), SaveAbility::Con, "Poison Spray")
        .with_formula("1d12")
        .with_damage_type(Some(DamageType::Poison));
    let handle = t.engine.request_save(request).await.unwrap();
    let id = handle.id();
    assert_eq!(t.channel.open_decisions()[0].request_id, id);

    t.engine.resolve_failure(id).await.unwrap();
    assert_eq!(handle.outcome().await, Some(SaveOutcome::Failure));
    assert_eq!(t.state("orc").await.hp_value, 21);
}

#[tokio::test]
async fn test_request_save_for_unknown_combatant_fails() {
    let t = TestEngine::new();
    let request = SaveRequest::new(CombatantId::new("ghost"), SaveAbility::Wis, "Fear");
    assert!(t.engine.request_save(request).await.is_err());
    assert!(t.engine.outstanding_saves().is_empty());
}
