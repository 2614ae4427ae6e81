//! Combat effect resolution engine
//!
//! Ties the combat rules to the host collaborators:
//! - Turn boundaries run turn-end effects for the outgoing combatant, then
//!   turn-start effects for the incoming one (see [`turn`])
//! - Save requests wait for the referee; resolving one applies its damage
//!   and counts down the triggers sharing its token
//! - Rests refill the reserved temp HP pool
//! - Initiative rolls pick up stored bonuses
//!
//! Dispatch and resolution share one async gate, so a save issued during a
//! turn boundary cannot resolve before that boundary has registered its
//! triggers.

mod turn;

pub use turn::{PhaseReport, TurnReport};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::combat::{
    active_flag, apply_damage, describe_damage, grant_reserved_temp, keys, names,
    ConditionCatalog, DiceError, DiceRoller, FlagValue, OutcomeTables, ResourceLedger,
    ResourcePatch, RollResult, StdRoller,
};
use crate::config::EngineConfig;
use crate::host::{
    ActorRecord, ActorRepository, CombatantId, DecisionPrompt, EffectStore, HostError,
    NotificationChannel,
};
use crate::saves::{
    DeferredAction, FiredTriggers, SaveCoordinator, SaveHandle, SaveOutcome, SaveRequest,
    SaveRequestId, TriggerInfo, TriggerRegistry,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Dice(#[from] DiceError),

    #[error("unknown outcome table: {0}")]
    UnknownTable(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlag { flag: String, value: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Inbound turn change from the encounter tracker
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TurnChange {
    pub previous: Option<CombatantId>,
    pub current: Option<CombatantId>,
}

impl TurnChange {
    pub fn new(previous: Option<CombatantId>, current: Option<CombatantId>) -> Self {
        Self { previous, current }
    }
}

/// Inbound rest event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestCompleted {
    pub actor_id: CombatantId,
    pub is_long_rest: bool,
}

/// Result of resolving a save request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveResolution {
    Applied {
        request: SaveRequest,
        outcome: SaveOutcome,
        /// Damage dealt after halving
        damage: u32,
        /// Effect retracted from the store
        removed: bool,
        /// Labels of triggers that fired
        fired: Vec<String>,
    },
    /// The request was already resolved (or never existed)
    AlreadyResolved,
}

/// The effect resolution engine
pub struct EffectEngine {
    actors: Arc<dyn ActorRepository>,
    effects: Arc<dyn EffectStore>,
    notices: Arc<dyn NotificationChannel>,
    dice: Arc<dyn DiceRoller>,
    saves: SaveCoordinator,
    triggers: Arc<TriggerRegistry>,
    catalog: ConditionCatalog,
    tables: OutcomeTables,
    config: EngineConfig,
    gate: Mutex<()>,
}

impl EffectEngine {
    /// Create an engine with the default catalog, built-in outcome tables
    /// and a dice roller seeded from `config`
    pub fn new(
        actors: Arc<dyn ActorRepository>,
        effects: Arc<dyn EffectStore>,
        notices: Arc<dyn NotificationChannel>,
        config: EngineConfig,
    ) -> Self {
        let dice: Arc<dyn DiceRoller> = Arc::new(StdRoller::new(config.seed));
        Self {
            actors,
            effects,
            notices,
            dice,
            saves: SaveCoordinator::new(),
            triggers: Arc::new(TriggerRegistry::new()),
            catalog: ConditionCatalog::default(),
            tables: OutcomeTables::builtin(),
            config,
            gate: Mutex::new(()),
        }
    }

    pub fn with_dice(mut self, dice: Arc<dyn DiceRoller>) -> Self {
        self.dice = dice;
        self
    }

    pub fn with_catalog(mut self, catalog: ConditionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_tables(mut self, tables: OutcomeTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_triggers(mut self, triggers: Arc<TriggerRegistry>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn catalog(&self) -> &ConditionCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn triggers(&self) -> &Arc<TriggerRegistry> {
        &self.triggers
    }

    /// Unresolved save requests, oldest first
    pub fn outstanding_saves(&self) -> Vec<SaveRequest> {
        self.saves.outstanding()
    }

    /// Number of triggers waiting on saves
    pub fn pending_triggers(&self) -> usize {
        self.triggers.len()
    }

    /// Stored triggers, oldest first
    pub fn trigger_snapshot(&self) -> Vec<TriggerInfo> {
        self.triggers.snapshot()
    }

    /// Issue a save request outside a turn boundary
    pub async fn request_save(&self, request: SaveRequest) -> EngineResult<SaveHandle> {
        let _gate = self.gate.lock().await;
        let actor = self.actors.resolve(&request.combatant_id).await?;
        Ok(self.issue_save(request, &actor.name).await)
    }

    pub async fn resolve_success(&self, id: SaveRequestId) -> EngineResult<SaveResolution> {
        self.resolve_save(id, SaveOutcome::Success).await
    }

    pub async fn resolve_failure(&self, id: SaveRequestId) -> EngineResult<SaveResolution> {
        self.resolve_save(id, SaveOutcome::Failure).await
    }

    /// Apply the referee's ruling on a save request.
    ///
    /// Resolving the same request twice is a no-op. Triggers sharing the
    /// request's token are counted down even if the combatant is gone.
    pub async fn resolve_save(
        &self,
        id: SaveRequestId,
        outcome: SaveOutcome,
    ) -> EngineResult<SaveResolution> {
        let _gate = self.gate.lock().await;

        let Some(claim) = self.saves.take(id) else {
            debug!("Save {} already resolved", id);
            return Ok(SaveResolution::AlreadyResolved);
        };
        let request = claim.request.clone();
        if let Some(message_id) = claim.message_id {
            self.notices.retract_message(message_id).await;
        }
        info!(
            "Save {} for {} vs {}: {}",
            id, request.combatant_id, request.effect_name, outcome
        );

        let mut target = match self.actors.resolve(&request.combatant_id).await {
            Ok(actor) => {
                let ledger = ResourceLedger::open(actor.resources);
                Some((actor, ledger))
            }
            Err(e) => {
                warn!("Save {} target unavailable: {}", id, e);
                None
            }
        };

        let mut damage = 0;
        let mut removed = false;
        if let Some((actor, ledger)) = target.as_mut() {
            match self.apply_save_outcome(actor, ledger, &request, outcome).await {
                Ok((dealt, was_removed)) => {
                    damage = dealt;
                    removed = was_removed;
                }
                Err(e) => warn!(
                    "Failed to apply {} save for {}: {}",
                    request.effect_name, actor.id, e
                ),
            }
        }

        let fired = match target.as_mut() {
            Some((actor, ledger)) => {
                let fired = self
                    .triggers
                    .decrement_and_maybe_fire(request.token, &actor.id, ledger);
                for label in &fired.applied {
                    self.announce_fired(actor, label).await;
                }
                fired
            }
            None => FiredTriggers {
                applied: Vec::new(),
                elsewhere: self.triggers.decrement(request.token),
            },
        };
        let labels = fired.labels();

        if let Some((actor, ledger)) = target.as_mut() {
            if let Err(e) = self.commit(actor, ledger).await {
                warn!("Failed to commit save result for {}: {}", actor.id, e);
            }
        }
        for action in fired.elsewhere {
            self.run_detached(action).await;
        }

        claim.finish(outcome);
        Ok(SaveResolution::Applied {
            request,
            outcome,
            damage,
            removed,
            fired: labels,
        })
    }

    /// Refill the reserved temp HP pool from the actor's armor mastery.
    /// Short and long rests behave the same.
    pub async fn on_rest_completed(
        &self,
        event: RestCompleted,
    ) -> EngineResult<Option<ResourcePatch>> {
        let _gate = self.gate.lock().await;
        let actor = self.actors.resolve(&event.actor_id).await?;

        let Some(value) = active_flag(&actor.flags, keys::ARMOR_MASTERY) else {
            debug!("{} has nothing to recover on rest", actor.id);
            return Ok(None);
        };
        let pool = flag_amount(keys::ARMOR_MASTERY, value)?;

        let mut ledger = ResourceLedger::open(actor.resources);
        grant_reserved_temp(&mut ledger, pool);
        info!(
            "{} finished a {} rest, reserved temp HP set to {}",
            actor.name,
            if event.is_long_rest { "long" } else { "short" },
            pool
        );
        self.commit(&actor, &mut ledger).await
    }

    /// Referee adjustment of the reserved pool, clamped to `[0, armorMastery]`.
    /// Returns the value applied.
    pub async fn set_reserved_temp(&self, combatant: &CombatantId, value: u32) -> EngineResult<u32> {
        let _gate = self.gate.lock().await;
        let actor = self.actors.resolve(combatant).await?;

        let cap = match active_flag(&actor.flags, keys::ARMOR_MASTERY) {
            Some(flag) => flag_amount(keys::ARMOR_MASTERY, flag)?,
            None => 0,
        };
        let applied = value.min(cap);

        let mut ledger = ResourceLedger::open(actor.resources);
        grant_reserved_temp(&mut ledger, applied);
        self.commit(&actor, &mut ledger).await?;
        debug!("Reserved temp HP for {} set to {} (cap {})", actor.id, applied, cap);
        Ok(applied)
    }

    /// Append stored initiative bonuses to `base`. A next-combat bonus is
    /// used once and its effect retracted.
    pub async fn initiative_formula(&self, combatant: &CombatantId, base: &str) -> EngineResult<String> {
        let actor = self.actors.resolve(combatant).await?;
        let mut formula = base.trim().to_string();

        if let Some(bonus) = active_flag(&actor.flags, keys::INIT_BONUS) {
            formula = format!("{} + {}", formula, bonus.formula());
        }
        if let Some(bonus) = active_flag(&actor.flags, keys::NEXT_COMBAT_INIT_BONUS) {
            formula = format!("{} + {}", formula, bonus.formula());
            match self
                .effects
                .remove_effect(&actor.id, names::NEXT_COMBAT_INIT_BONUS)
                .await
            {
                Ok(_) => info!("{} used their next combat initiative bonus", actor.name),
                Err(e) => warn!("Failed to retract initiative bonus for {}: {}", actor.id, e),
            }
        }
        Ok(formula)
    }

    /// Roll initiative with stored bonuses applied
    pub async fn roll_initiative(&self, combatant: &CombatantId, base: &str) -> EngineResult<RollResult> {
        let formula = self.initiative_formula(combatant, base).await?;
        let actor = self.actors.resolve(combatant).await?;
        self.roll(&formula, &format!("{} rolls initiative", actor.name)).await
    }

    // -- shared helpers ---------------------------------------------------

    /// Evaluate a formula and announce it
    async fn roll(&self, formula: &str, flavor: &str) -> EngineResult<RollResult> {
        let roll = self.dice.evaluate(formula)?;
        debug!("{}: {} = {}", flavor, roll.formula, roll.total);
        if self.config.announce_rolls {
            self.notices.announce_roll(&roll, flavor).await;
        }
        Ok(roll)
    }

    /// Write back a ledger if anything changed
    async fn commit(
        &self,
        actor: &ActorRecord,
        ledger: &mut ResourceLedger,
    ) -> EngineResult<Option<ResourcePatch>> {
        if !ledger.is_dirty() {
            return Ok(None);
        }
        let patch = ledger.patch();
        self.actors.commit(&actor.id, patch).await?;
        ledger.mark_committed();
        debug!("Committed {:?} for {}", patch, actor.id);

        if patch.down == Some(true) {
            info!("{} is down", actor.name);
            self.notices.announce(&format!("{} is down!", actor.name)).await;
        }
        Ok(Some(patch))
    }

    /// Record a save request and post its referee prompt
    async fn issue_save(&self, request: SaveRequest, who: &str) -> SaveHandle {
        let id = request.id;
        let prompt = DecisionPrompt {
            request_id: id,
            text: request.prompt_text(who),
            options: SaveOutcome::OPTIONS.iter().map(|o| o.to_string()).collect(),
        };
        info!("{} must make a {} save vs {}", who, request.ability, request.effect_name);

        let handle = self.saves.issue(request);
        match self.notices.present_decision(prompt).await {
            Ok(message_id) => self.saves.attach_message(id, message_id),
            Err(e) => warn!("Failed to post prompt for save {}: {}", id, e),
        }
        handle
    }

    /// Damage and removal for one ruling; returns (damage dealt, effect removed)
    async fn apply_save_outcome(
        &self,
        actor: &ActorRecord,
        ledger: &mut ResourceLedger,
        request: &SaveRequest,
        outcome: SaveOutcome,
    ) -> EngineResult<(u32, bool)> {
        let halved = outcome == SaveOutcome::Success;
        let deals_damage = outcome == SaveOutcome::Failure || request.half_damage_on_success;

        let mut dealt = 0;
        if let (true, Some(formula)) = (deals_damage, &request.formula) {
            let flavor = format!("{} - {} damage on {}", actor.name, request.effect_name, outcome);
            let amount = self.roll(formula, &flavor).await?.amount();
            apply_damage(ledger, amount, halved);
            dealt = if halved { amount / 2 } else { amount };
            self.notices
                .announce(&format!(
                    "{} takes {} from {}.",
                    actor.name,
                    describe_damage(dealt, request.damage_type),
                    request.effect_name
                ))
                .await;
        }

        let mut removed = false;
        if outcome == SaveOutcome::Success && request.remove_on_success {
            removed = self.effects.remove_effect(&actor.id, &request.effect_name).await?;
            self.notices
                .announce(&format!(
                    "{} is no longer affected by {}.",
                    actor.name, request.effect_name
                ))
                .await;
        }
        Ok((dealt, removed))
    }

    async fn announce_fired(&self, actor: &ActorRecord, label: &str) {
        info!("Deferred {} for {} fired", label, actor.id);
        self.notices
            .announce(&format!("{} takes effect for {}.", label, actor.name))
            .await;
    }

    /// Run a fired trigger against its own combatant's ledger
    async fn run_detached(&self, action: DeferredAction) {
        let actor = match self.actors.resolve(&action.combatant_id).await {
            Ok(actor) => actor,
            Err(e) => {
                warn!("Dropping deferred {}: {}", action.label, e);
                return;
            }
        };
        self.announce_fired(&actor, &action.label).await;

        let mut ledger = ResourceLedger::open(actor.resources);
        action.run(&mut ledger);
        if let Err(e) = self.commit(&actor, &mut ledger).await {
            warn!("Failed to commit deferred effect for {}: {}", actor.id, e);
        }
    }
}

/// Literal non-negative amount stored in a flag
fn flag_amount(flag: &str, value: &FlagValue) -> EngineResult<u32> {
    let invalid = || EngineError::InvalidFlag {
        flag: flag.to_string(),
        value: value.to_string(),
    };
    match value {
        FlagValue::Number(n) => u32::try_from(*n).map_err(|_| invalid()),
        FlagValue::Formula(s) => s.trim().parse::<u32>().map_err(|_| invalid()),
    }
}
