//! Recruitable definitions and their status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::condition::Condition;
use crate::error::{ErrorKind, RecruitError, Result};
use crate::types::{RecruitmentId, Unit, UnitId};

/// Where a recruitable unit is in the recruitment lifecycle.
///
/// Transitions only move forward:
///
/// ```text
/// Available ──▶ ConditionsMet ──▶ NpcState ──▶ Recruited
///     │               │              │
///     └───────────────┴──────────────┴──────▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecruitmentStatus {
    /// Recruitable; no attempt has qualified yet.
    Available,
    /// All conditions held on a non-lethal hit.
    ConditionsMet,
    /// Converted; surviving as a non-acting NPC.
    NpcState,
    /// Permanently recruited.
    Recruited,
    /// Recruitment is off for this stage.
    Failed,
}

impl RecruitmentStatus {
    /// Whether the recruitment has been resolved either way.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Recruited | Self::Failed)
    }

    /// Whether `next` is a legal forward transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Available => matches!(next, Self::ConditionsMet | Self::NpcState | Self::Failed),
            Self::ConditionsMet => matches!(next, Self::NpcState | Self::Failed),
            Self::NpcState => matches!(next, Self::Recruited | Self::Failed),
            Self::Recruited | Self::Failed => false,
        }
    }
}

impl fmt::Display for RecruitmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "AVAILABLE",
            Self::ConditionsMet => "CONDITIONS_MET",
            Self::NpcState => "NPC_STATE",
            Self::Recruited => "RECRUITED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One potentially-recruitable unit in the current stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecruitableDefinition {
    /// Unit this definition is for.
    pub character_id: UnitId,
    /// Display name, copied from stage data.
    pub name: String,
    /// All must hold for eligibility.
    pub conditions: Vec<Condition>,
    /// Designer-assigned ordering among recruitables (higher first).
    pub priority: i32,
    /// Player-facing blurb.
    pub description: String,
    /// Reward ids granted on recruitment.
    pub rewards: Vec<String>,
    status: RecruitmentStatus,
    recruitment_id: Option<RecruitmentId>,
    failure: Option<ErrorKind>,
}

impl RecruitableDefinition {
    /// Create an `Available` definition.
    #[must_use]
    pub fn new(character_id: UnitId, conditions: Vec<Condition>) -> Self {
        Self {
            name: character_id.0.clone(),
            character_id,
            conditions,
            priority: 0,
            description: String::new(),
            rewards: Vec::new(),
            status: RecruitmentStatus::Available,
            recruitment_id: None,
            failure: None,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RecruitmentStatus {
        self.status
    }

    /// Recruitment id assigned at conversion.
    #[must_use]
    pub fn recruitment_id(&self) -> Option<RecruitmentId> {
        self.recruitment_id
    }

    /// Why the recruitment failed, once `Failed`.
    #[must_use]
    pub fn failure(&self) -> Option<ErrorKind> {
        self.failure
    }

    /// Move forward to `next`.
    ///
    /// # Errors
    /// Returns [`RecruitError::Invariant`] for any backward or sideways move.
    pub(crate) fn transition(&mut self, next: RecruitmentStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(RecruitError::Invariant(format!(
                "illegal status transition {} -> {next} for {}",
                self.status, self.character_id
            )));
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn mark_npc(&mut self, recruitment_id: RecruitmentId) -> Result<()> {
        self.transition(RecruitmentStatus::NpcState)?;
        self.recruitment_id = Some(recruitment_id);
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self, reason: ErrorKind) -> Result<()> {
        self.transition(RecruitmentStatus::Failed)?;
        self.failure = Some(reason);
        Ok(())
    }
}

/// A unit that survived to stage clear and joined permanently.
///
/// Handed to the persistence collaborator; also accepted back as the
/// previously-recruited roster when a later stage loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecruitedUnit {
    /// The unit as it joins: friendly faction, turn flags reset.
    pub unit: Unit,
    /// Id of the conversion that led here.
    pub recruitment_id: RecruitmentId,
    /// Conditions that were satisfied.
    pub conditions: Vec<Condition>,
    /// Stage it was recruited in.
    pub stage_id: String,
    /// Wall-clock time of finalization.
    pub recruited_at: DateTime<Utc>,
}

/// A recruitment that did not make it to the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruitmentFailure {
    /// Unit that was lost.
    pub character_id: UnitId,
    /// `RecruitmentFailed` or `NpcAlreadyDefeated`.
    pub kind: ErrorKind,
    /// Human-readable reason.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        use RecruitmentStatus::*;
        assert!(Available.can_transition_to(ConditionsMet));
        assert!(Available.can_transition_to(NpcState));
        assert!(ConditionsMet.can_transition_to(NpcState));
        assert!(NpcState.can_transition_to(Recruited));
        assert!(NpcState.can_transition_to(Failed));
        assert!(!ConditionsMet.can_transition_to(Available));
        assert!(!NpcState.can_transition_to(ConditionsMet));
        assert!(!Recruited.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Available));
        assert!(!Available.can_transition_to(Recruited));
    }

    #[test]
    fn definition_rejects_regression() {
        let mut def = RecruitableDefinition::new("enemy-1".into(), Vec::new());
        def.mark_npc(RecruitmentId::new()).expect("available -> npc");
        assert!(def.transition(RecruitmentStatus::ConditionsMet).is_err());
        assert_eq!(def.status(), RecruitmentStatus::NpcState);
        def.mark_failed(ErrorKind::NpcAlreadyDefeated).expect("npc -> failed");
        assert_eq!(def.failure(), Some(ErrorKind::NpcAlreadyDefeated));
        assert!(def.transition(RecruitmentStatus::Recruited).is_err());
    }

    #[test]
    fn error_kind_serializes_as_tag() {
        let json = serde_json::to_string(&ErrorKind::RecruitmentFailed).expect("serialize");
        assert_eq!(json, "\"RECRUITMENT_FAILED\"");
        let back: ErrorKind = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ErrorKind::RecruitmentFailed);
    }
}
