//! # recruit-battle: Tactics Battle Integration
//!
//! Connects the game-agnostic `recruit-core` engine to a turn-based battle
//! loop. The battle system owns the units; this crate exposes them to the
//! engine and applies the patches it returns.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Battle loop                 │
//! │  ┌────────────────────────────────────┐  │
//! │  │          recruit-battle            │  │
//! │  │  ┌─────────────┐ ┌──────────────┐  │  │
//! │  │  │ Battlefield │ │    Hooks     │  │  │
//! │  │  └──────┬──────┘ └──────┬───────┘  │  │
//! │  │         │               │          │  │
//! │  │         ▼               ▼          │  │
//! │  │    ┌──────────────────────────┐    │  │
//! │  │    │       recruit-core       │    │  │
//! │  │    └──────────────────────────┘    │  │
//! │  │    ┌──────────────────────────┐    │  │
//! │  │    │  RosterStore (SQLite)    │    │  │
//! │  │    └──────────────────────────┘    │  │
//! │  └────────────────────────────────────┘  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `battlefield`: units in play, implements `BattleContextProvider`
//! - `hooks`: attack, NPC hit, turn end and stage clear entry points
//! - `targeting`: AI target ranking using NPC priority
//! - `persistence`: SQLite roster of recruited units
//! - `config`: platform profiles and battle settings
//! - `logging`: tracing subscriber setup

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod battlefield;
pub mod config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod persistence;
pub mod targeting;

pub use battlefield::Battlefield;
pub use config::{BattleConfig, PlatformProfile};
pub use error::{BattleError, Result};
pub use hooks::{AttackReport, AttackResolution};
pub use persistence::{RosterStore, RosterStoreConfig};
pub use targeting::{RankedTarget, rank_targets, select_target};
