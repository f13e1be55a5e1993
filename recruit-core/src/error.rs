//! Error types for the recruitment engine.
//!
//! Every public operation returns [`Result`]. The variants collapse onto the
//! five-way [`ErrorKind`] taxonomy that battle and UI callers switch on, while
//! `Display` carries the human-readable message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::UnitId;

/// Coarse error classification surfaced to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The unit has no recruitment definition, or its data is malformed.
    InvalidTarget,
    /// Internal invariant violation (NPC cap reached, bad configuration, ...).
    SystemError,
    /// Eligibility check failed. Expected during play, never logged as an error.
    ConditionsNotMet,
    /// A previously-NPC unit did not survive to finalization.
    RecruitmentFailed,
    /// The NPC was defeated before completion could run.
    NpcAlreadyDefeated,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidTarget => "INVALID_TARGET",
            Self::SystemError => "SYSTEM_ERROR",
            Self::ConditionsNotMet => "CONDITIONS_NOT_MET",
            Self::RecruitmentFailed => "RECRUITMENT_FAILED",
            Self::NpcAlreadyDefeated => "NPC_ALREADY_DEFEATED",
        };
        f.write_str(s)
    }
}

/// Top-level error type for all recruitment operations.
#[derive(Error, Debug)]
pub enum RecruitError {
    /// The referenced unit has no recruitment definition for this stage.
    #[error("Unit {0} is not recruitable in this stage")]
    NotRecruitable(UnitId),

    /// The unit's recruitment has already been resolved.
    #[error("Recruitment of {unit} already resolved ({status})")]
    AlreadyResolved {
        /// Which unit.
        unit: UnitId,
        /// Terminal status it is in.
        status: crate::definition::RecruitmentStatus,
    },

    /// Malformed unit data (zero max HP, empty id, ...).
    #[error("Malformed unit {unit}: {reason}")]
    MalformedUnit {
        /// Which unit.
        unit: UnitId,
        /// What is wrong with it.
        reason: String,
    },

    /// The unit is already in NPC state.
    #[error("Unit {0} is already an NPC")]
    AlreadyNpc(UnitId),

    /// The unit is not in NPC state.
    #[error("Unit {0} is not an NPC")]
    NotNpc(UnitId),

    /// Incoming damage was negative.
    #[error("Invalid damage {damage} against {unit}")]
    InvalidDamage {
        /// Target unit.
        unit: UnitId,
        /// Offending value.
        damage: i64,
    },

    /// The per-stage NPC cap has been reached.
    #[error("NPC capacity exceeded (limit: {limit}, current: {current})")]
    NpcCapacityExceeded {
        /// Configured cap.
        limit: usize,
        /// NPCs currently tracked.
        current: usize,
    },

    /// Not every recruitment condition holds.
    #[error("Recruitment conditions not met for {unit}: {met}/{total} satisfied")]
    ConditionsNotMet {
        /// Target unit.
        unit: UnitId,
        /// How many conditions held.
        met: usize,
        /// Total number of conditions.
        total: usize,
    },

    /// The NPC was not found alive among the units in play at stage clear.
    #[error("Recruitment of {0} failed: unit did not survive the stage")]
    RecruitmentFailed(UnitId),

    /// The NPC was defeated during battle, before completion ran.
    #[error("NPC {0} was defeated before recruitment could complete")]
    NpcAlreadyDefeated(UnitId),

    /// A recruitment condition is malformed or of an unknown type.
    #[error("Invalid condition '{condition}': {reason}")]
    InvalidCondition {
        /// Condition id as written in the stage data.
        condition: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An internal invariant was violated.
    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecruitError {
    /// Map this error onto the collaborator-facing taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotRecruitable(_)
            | Self::AlreadyResolved { .. }
            | Self::MalformedUnit { .. }
            | Self::AlreadyNpc(_)
            | Self::NotNpc(_)
            | Self::InvalidDamage { .. } => ErrorKind::InvalidTarget,
            Self::ConditionsNotMet { .. } => ErrorKind::ConditionsNotMet,
            Self::RecruitmentFailed(_) => ErrorKind::RecruitmentFailed,
            Self::NpcAlreadyDefeated(_) => ErrorKind::NpcAlreadyDefeated,
            Self::NpcCapacityExceeded { .. }
            | Self::InvalidCondition { .. }
            | Self::Invariant(_)
            | Self::Config(_)
            | Self::Serialization(_)
            | Self::Io(_) => ErrorKind::SystemError,
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RecruitError>;
