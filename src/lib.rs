//! turnfx - turn-based combat effect resolution
//!
//! Resolves the mechanical consequences of combat conditions at turn
//! boundaries and mediates referee-decided saving throws.
//!
//! ```no_run
//! use std::sync::Arc;
//! use turnfx::{EffectEngine, EngineConfig, TurnChange};
//! use turnfx::host::{MemoryChannel, MemoryHost};
//!
//! # async fn demo() {
//! let host = MemoryHost::shared();
//! let channel = MemoryChannel::shared();
//! let engine = EffectEngine::new(host.clone(), host, channel, EngineConfig::default());
//! engine
//!     .on_turn_change(TurnChange::new(Some("goblin".into()), Some("troll".into())))
//!     .await;
//! # }
//! ```

pub mod combat;
pub mod config;
pub mod encounter;
pub mod engine;
pub mod host;
pub mod saves;

pub use config::{ConfigError, EngineConfig};
pub use engine::{
    EffectEngine, EngineError, EngineResult, PhaseReport, RestCompleted, SaveResolution,
    TurnChange, TurnReport,
};
