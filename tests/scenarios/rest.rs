//! Rest and reserved temp HP scenarios

use crate::harness::{TestActor, TestEngine};
use turnfx::combat::{keys, FlagValue};
use turnfx::host::CombatantId;
use turnfx::RestCompleted;

fn rest(id: &str, is_long_rest: bool) -> RestCompleted {
    RestCompleted {
        actor_id: CombatantId::new(id),
        is_long_rest,
    }
}

fn fighter(temp: u32) -> TestActor {
    TestActor::new("fighter", 10, 20, temp).effect(
        "Armor Mastery",
        keys::ARMOR_MASTERY,
        FlagValue::Number(3),
    )
}

#[tokio::test]
async fn test_rest_refills_reserved_pool() {
    let t = TestEngine::new();
    t.add(fighter(2)).await;

    let patch = t.engine.on_rest_completed(rest("fighter", false)).await.unwrap();
    assert!(patch.is_some());

    let state = t.state("fighter").await;
    assert_eq!(state.hp_temp, 5);
    assert_eq!(state.reserved_temp, 3);
}

#[tokio::test]
async fn test_rests_do_not_stack_the_pool() {
    let t = TestEngine::new();
    t.add(fighter(0)).await;

    t.engine.on_rest_completed(rest("fighter", true)).await.unwrap();
    let second = t.engine.on_rest_completed(rest("fighter", false)).await.unwrap();

    assert_eq!(second, None);
    let state = t.state("fighter").await;
    assert_eq!(state.hp_temp, 3);
    assert_eq!(t.commits("fighter").await, 1);
}

#[tokio::test]
async fn test_rest_without_armor_mastery_does_nothing() {
    let t = TestEngine::new();
    t.add(TestActor::new("wizard", 8, 12, 0)).await;
    let patch = t.engine.on_rest_completed(rest("wizard", true)).await.unwrap();
    assert_eq!(patch, None);
    assert_eq!(t.commits("wizard").await, 0);
}

#[tokio::test]
async fn test_rest_for_unknown_actor_errors() {
    let t = TestEngine::new();
    assert!(t.engine.on_rest_completed(rest("ghost", true)).await.is_err());
}

#[tokio::test]
async fn test_reserved_pool_stacks_with_temp_grants() {
    let t = TestEngine::new();
    t.add(
        TestActor::new("fighter", 10, 20, 5)
            .reserved(3)
            .effect("Heroism", "heroismTempHP", "4"),
    )
    .await;
    t.totals([4]);

    t.start_turn("fighter").await;
    let state = t.state("fighter").await;
    assert_eq!(state.hp_temp, 7);
    assert_eq!(state.reserved_temp, 3);
}

#[tokio::test]
async fn test_damage_consumes_reserved_pool_last() {
    let t = TestEngine::new();
    t.add(
        TestActor::new("fighter", 10, 20, 5)
            .reserved(3)
            .effect("Lacerated", "lacerated", "1d4"),
    )
    .await;
    t.totals([3]);

    t.start_turn("fighter").await;
    let state = t.state("fighter").await;
    assert_eq!(state.hp_temp, 2);
    assert_eq!(state.reserved_temp, 2);
    assert_eq!(state.hp_value, 10);
}

#[tokio::test]
async fn test_set_reserved_temp_is_clamped() {
    let t = TestEngine::new();
    t.add(fighter(4)).await;
    let id = CombatantId::new("fighter");

    assert_eq!(t.engine.set_reserved_temp(&id, 10).await.unwrap(), 3);
    let state = t.state("fighter").await;
    assert_eq!(state.reserved_temp, 3);
    assert_eq!(state.hp_temp, 7);

    assert_eq!(t.engine.set_reserved_temp(&id, 0).await.unwrap(), 0);
    let state = t.state("fighter").await;
    assert_eq!(state.reserved_temp, 0);
    assert_eq!(state.hp_temp, 4);
}

#[tokio::test]
async fn test_set_reserved_temp_without_mastery_clamps_to_zero() {
    let t = TestEngine::new();
    t.add(TestActor::new("wizard", 8, 12, 2)).await;
    let applied = t
        .engine
        .set_reserved_temp(&CombatantId::new("wizard"), 5)
        .await
        .unwrap();
    assert_eq!(applied, 0);
    assert_eq!(t.state("wizard").await.hp_temp, 2);
}
