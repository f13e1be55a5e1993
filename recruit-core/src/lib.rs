//! # Recruit Core Library
//!
//! Game-agnostic engine for recruiting enemy units mid-battle.
//!
//! A stage declares, per enemy, a list of [`condition::Condition`]s. When a
//! lethal hit lands while every condition holds, the target is not killed but
//! converted into a protected NPC. If it survives until the stage clears it
//! joins the player's roster permanently:
//!
//! ```text
//! AVAILABLE ─▶ CONDITIONS_MET ─▶ NPC_STATE ─▶ RECRUITED
//!     │               │              │
//!     └───────────────┴──────────────┴──────▶ FAILED
//! ```
//!
//! The [`RecruitmentOrchestrator`] is the entry point. It never touches the
//! caller's units; every state change comes back as a [`UnitPatch`].
//!
//! ## Performance Contract
//!
//! - Eligibility check (cache hit, 4 conditions): < 5μs
//! - Conversion to NPC: < 20μs
//! - Monitor tick without evaluation: < 1μs

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod condition;
pub mod config;
pub mod context;
pub mod definition;
pub mod error;
pub mod events;
pub mod metrics;
pub mod monitor;
pub mod npc;
pub mod orchestrator;
pub mod stage;
pub mod types;

pub use condition::{Condition, ConditionKind, ConditionResult, RawCondition};
pub use config::RecruitConfig;
pub use context::{BattleContextProvider, RecruitmentContext};
pub use definition::{RecruitableDefinition, RecruitedUnit, RecruitmentFailure, RecruitmentStatus};
pub use error::{ErrorKind, RecruitError, Result};
pub use events::{EventBus, RecruitmentEvent};
pub use npc::{NpcLifecycleManager, NpcState, VisualState};
pub use orchestrator::{
    AttemptOutcome, EligibilityReport, NextAction, RecruitmentOrchestrator, StageCompletion,
};
pub use stage::{StageData, ValidationReport};
pub use types::*;
