//! Scenario Tests for turnfx
//!
//! Modular scenarios covering:
//! - Turn start: temp HP, damage over time, outcome tables, healing
//! - Turn end: immediate damage, delayed damage, save issuance
//! - Saves: resolution, idempotence, pending triggers across combatants
//! - Rest: reserved temp HP pool
//! - Initiative: stored bonuses
//! - Isolation: failing effects and missing combatants

pub mod rest;
pub mod saves;
pub mod turn_end;
