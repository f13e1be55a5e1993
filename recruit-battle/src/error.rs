//! Error types for the battle integration layer.

use thiserror::Error;

use recruit_core::{ErrorKind, RecruitError, UnitId};

/// Top-level error type for battle-side recruitment operations.
#[derive(Error, Debug)]
pub enum BattleError {
    /// The recruitment engine rejected the operation.
    #[error(transparent)]
    Recruit(#[from] RecruitError),

    /// A unit referenced by an event is not on the battlefield.
    #[error("Unit not on battlefield: {0}")]
    UnitNotFound(UnitId),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored roster row failed checksum verification.
    #[error("Checksum mismatch for {unit}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        /// Which unit.
        unit: UnitId,
        /// Stored checksum.
        expected: String,
        /// Checksum of the stored data.
        actual: String,
    },

    /// The tracing subscriber could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl BattleError {
    /// Collaborator-facing error kind. Everything outside the engine is a
    /// `SystemError`.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Recruit(e) => e.kind(),
            Self::UnitNotFound(_) => ErrorKind::InvalidTarget,
            Self::Database(_)
            | Self::Serialization(_)
            | Self::ChecksumMismatch { .. }
            | Self::Logging(_) => ErrorKind::SystemError,
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, BattleError>;
