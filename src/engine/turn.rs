//! Turn boundary dispatch
//!
//! Each phase opens one ledger for its combatant, walks the catalog rules
//! for that phase in order, and commits once at the end. A failing effect
//! is logged and skipped; the rest of the phase still applies.

use tracing::{debug, info, warn};

use super::{EffectEngine, EngineError, EngineResult, TurnChange};
use crate::combat::{
    active_flag, apply_damage, apply_healing, describe_damage, keys, Behavior, ConditionRule,
    FlagValue, OutcomeKind, Phase, ResourceLedger, ResourcePatch, SaveSpec,
};
use crate::host::{ActorRecord, CombatantId};
use crate::saves::{DeferredAction, Registration, SaveRequest, SaveRequestId, TriggerToken};

/// What one phase did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub combatant: CombatantId,
    pub phase: Phase,
    /// Flags whose effects were evaluated
    pub applied: Vec<String>,
    /// Save requests issued
    pub saves: Vec<SaveRequestId>,
    /// Saves issued by random outcomes
    pub pending_saves: u32,
    /// Effects parked behind outstanding saves
    pub deferred: Vec<String>,
    /// Patch written back, if anything changed
    pub committed: Option<ResourcePatch>,
    /// Effects that failed, with the reason
    pub failures: Vec<String>,
}

impl PhaseReport {
    fn new(combatant: CombatantId, phase: Phase) -> Self {
        Self {
            combatant,
            phase,
            applied: Vec::new(),
            saves: Vec::new(),
            pending_saves: 0,
            deferred: Vec::new(),
            committed: None,
            failures: Vec::new(),
        }
    }
}

/// What one turn boundary did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// Token shared by every save and trigger of this boundary
    pub token: TriggerToken,
    pub turn_end: Option<PhaseReport>,
    pub turn_start: Option<PhaseReport>,
}

struct PhaseState {
    actor: ActorRecord,
    ledger: ResourceLedger,
    token: TriggerToken,
    report: PhaseReport,
    /// One-shot effects to retract once the ledger is committed
    retract: Vec<String>,
}

impl EffectEngine {
    /// Handle a turn change: turn-end effects for `previous` run to
    /// completion (saves issued) before turn-start effects for `current`.
    /// Failures are isolated per effect and per combatant.
    pub async fn on_turn_change(&self, change: TurnChange) -> TurnReport {
        let _gate = self.gate.lock().await;
        let token = TriggerToken::new();
        debug!(
            "Turn change {:?} -> {:?} [{}]",
            change.previous, change.current, token
        );

        let turn_end = match &change.previous {
            Some(id) => Some(self.run_phase(Phase::TurnEnd, id, token).await),
            None => None,
        };
        let turn_start = match &change.current {
            Some(id) => Some(self.run_phase(Phase::TurnStart, id, token).await),
            None => None,
        };

        TurnReport {
            token,
            turn_end,
            turn_start,
        }
    }

    async fn run_phase(&self, phase: Phase, id: &CombatantId, token: TriggerToken) -> PhaseReport {
        let mut report = PhaseReport::new(id.clone(), phase);
        let actor = match self.actors.resolve(id).await {
            Ok(actor) => actor,
            Err(e) => {
                warn!("Skipping {:?} for {}: {}", phase, id, e);
                report.failures.push(e.to_string());
                return report;
            }
        };

        for key in actor.flags.keys() {
            if !self.catalog.knows(key) && !is_ambient_key(key) {
                debug!("Ignoring unknown flag {} on {}", key, id);
            }
        }

        let mut state = PhaseState {
            ledger: ResourceLedger::open(actor.resources),
            actor,
            token,
            report,
            retract: Vec::new(),
        };

        for rule in self.catalog.phase_rules(phase) {
            let Some(value) = active_flag(&state.actor.flags, &rule.flag).cloned() else {
                continue;
            };

            let result = match &rule.behavior {
                Behavior::TempHp => self.grant_temp_hp(&mut state, rule, &value).await,
                Behavior::DamageOverTime | Behavior::EndDamage => {
                    self.recurring_damage(&mut state, rule, &value).await
                }
                Behavior::RandomOutcome { table } => {
                    match self.resolve_outcome(&mut state, rule, table).await {
                        Ok(pending) => {
                            state.report.pending_saves += pending;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                Behavior::Healing => self.recurring_healing(&mut state, rule, &value).await,
                Behavior::DelayedDamage => self.delayed_damage(&mut state, rule, &value).await,
                Behavior::EndSave(spec) => {
                    self.end_save(&mut state, rule, spec, &value).await;
                    Ok(())
                }
            };

            match result {
                Ok(()) => state.report.applied.push(rule.flag.clone()),
                Err(e) => {
                    warn!("{} on {} failed: {}", rule.flag, state.actor.id, e);
                    state.report.failures.push(format!("{}: {}", rule.flag, e));
                }
            }
        }

        match self.commit(&state.actor, &mut state.ledger).await {
            Ok(patch) => state.report.committed = patch,
            Err(e) => {
                warn!("Failed to commit {:?} for {}: {}", phase, state.actor.id, e);
                state.report.failures.push(format!("commit: {}", e));
                return state.report;
            }
        }

        for effect_name in &state.retract {
            match self.effects.remove_effect(&state.actor.id, effect_name).await {
                Ok(_) => info!("{} ended on {}", effect_name, state.actor.id),
                Err(e) => {
                    warn!("Failed to retract {} from {}: {}", effect_name, state.actor.id, e);
                    state.report.failures.push(format!("retract {}: {}", effect_name, e));
                }
            }
        }
        state.report
    }

    /// Temporary HP; the higher grant wins
    async fn grant_temp_hp(
        &self,
        state: &mut PhaseState,
        rule: &ConditionRule,
        value: &FlagValue,
    ) -> EngineResult<()> {
        let flavor = format!("{} - {} temporary HP", state.actor.name, rule.effect_name);
        let amount = self.roll(&value.formula(), &flavor).await?.amount();
        apply_healing(&mut state.ledger, amount, true);
        debug!("{} temp HP now {}", state.actor.id, state.ledger.hp_temp);
        Ok(())
    }

    async fn recurring_damage(
        &self,
        state: &mut PhaseState,
        rule: &ConditionRule,
        value: &FlagValue,
    ) -> EngineResult<()> {
        let flavor = format!("{} - {} damage", state.actor.name, rule.effect_name);
        let amount = self.roll(&value.formula(), &flavor).await?.amount();
        apply_damage(&mut state.ledger, amount, false);
        self.notices
            .announce(&format!(
                "{} takes {} from {}.",
                state.actor.name,
                rule.describe_damage(amount),
                rule.effect_name
            ))
            .await;
        Ok(())
    }

    /// Damage once; the effect is retracted after the phase commits
    async fn delayed_damage(
        &self,
        state: &mut PhaseState,
        rule: &ConditionRule,
        value: &FlagValue,
    ) -> EngineResult<()> {
        self.recurring_damage(state, rule, value).await?;
        state.retract.push(rule.effect_name.clone());
        Ok(())
    }

    async fn end_save(
        &self,
        state: &mut PhaseState,
        rule: &ConditionRule,
        spec: &SaveSpec,
        value: &FlagValue,
    ) {
        let mut request = SaveRequest::new(state.actor.id.clone(), spec.ability, &rule.effect_name)
            .with_damage_type(rule.damage_type)
            .remove_on_success(spec.remove_on_success)
            .half_damage_on_success(spec.half_damage_on_success)
            .with_token(state.token);
        if spec.deals_damage {
            request = request.with_formula(value.formula());
        }
        let handle = self.issue_save(request, &state.actor.name).await;
        state.report.saves.push(handle.id());
    }

    /// Roll a random outcome table; returns the number of saves issued
    async fn resolve_outcome(
        &self,
        state: &mut PhaseState,
        rule: &ConditionRule,
        table_id: &str,
    ) -> EngineResult<u32> {
        let table = self
            .tables
            .get(table_id)
            .ok_or_else(|| EngineError::UnknownTable(table_id.to_string()))?;
        let rolled = table.roll(self.dice.as_ref());
        info!(
            "{} rolled {} on {}: {}",
            state.actor.id, rolled.face, table_id, rolled.range.title
        );
        self.notices.announce(&rolled.narrate(&state.actor.name)).await;

        match &rolled.range.kind {
            OutcomeKind::Narrative { .. } => Ok(0),
            OutcomeKind::Damage {
                formula,
                damage_type,
            } => {
                let flavor = format!("{} - {}", state.actor.name, rolled.range.title);
                let amount = self.roll(formula, &flavor).await?.amount();
                apply_damage(&mut state.ledger, amount, false);
                self.notices
                    .announce(&format!(
                        "{} takes {} from {}.",
                        state.actor.name,
                        describe_damage(amount, *damage_type),
                        rolled.range.title
                    ))
                    .await;
                Ok(0)
            }
            OutcomeKind::Save {
                formula,
                ability,
                damage_type,
                half_damage_on_success,
                remove_on_success,
            } => {
                let request = SaveRequest::new(state.actor.id.clone(), *ability, &rule.effect_name)
                    .with_formula(formula.clone())
                    .with_damage_type(*damage_type)
                    .remove_on_success(*remove_on_success)
                    .half_damage_on_success(*half_damage_on_success)
                    .with_token(state.token);
                let handle = self.issue_save(request, &state.actor.name).await;
                state.report.saves.push(handle.id());
                Ok(1)
            }
        }
    }

    /// HP healing, held back until every save of this boundary resolves
    async fn recurring_healing(
        &self,
        state: &mut PhaseState,
        rule: &ConditionRule,
        value: &FlagValue,
    ) -> EngineResult<()> {
        let flavor = format!("{} - {} healing", state.actor.name, rule.effect_name);
        let amount = self.roll(&value.formula(), &flavor).await?.amount();

        let waiting = self.saves.outstanding_for(state.token);
        let action = DeferredAction::new(
            state.actor.id.clone(),
            rule.effect_name.clone(),
            move |ledger| apply_healing(ledger, amount, false),
        );

        match self.triggers.register(state.token, waiting, action) {
            Registration::RunNow(action) => {
                action.run(&mut state.ledger);
                self.notices
                    .announce(&format!(
                        "{} regains {} HP from {}.",
                        state.actor.name, amount, rule.effect_name
                    ))
                    .await;
            }
            Registration::Stored => {
                info!(
                    "{} for {} waits on {} save(s)",
                    rule.effect_name, state.actor.id, waiting
                );
                state.report.deferred.push(rule.effect_name.clone());
            }
        }
        Ok(())
    }
}

/// Flags read outside turn boundaries
fn is_ambient_key(key: &str) -> bool {
    matches!(
        key,
        keys::INIT_BONUS | keys::NEXT_COMBAT_INIT_BONUS | keys::ARMOR_MASTERY
    )
}
