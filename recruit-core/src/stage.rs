//! Stage metadata and recruitable-definition building.
//!
//! A stage lists its units; enemy units may carry a recruitment block. Broken
//! metadata never aborts stage load: the affected unit simply is not
//! recruitable, and the problem is recorded in a [`ValidationReport`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::condition::{Condition, ConditionKind, RawCondition};
use crate::definition::RecruitableDefinition;
use crate::error::{RecruitError, Result};
use crate::types::{Faction, Unit, UnitId};

// ---------------------------------------------------------------------------
// Stage data
// ---------------------------------------------------------------------------

/// Everything the engine reads from a stage at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageData {
    /// Stage identifier, stamped onto recruited units.
    pub stage_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// All units deployed at stage start, on every side.
    #[serde(default)]
    pub units: Vec<StageUnit>,
}

impl StageData {
    /// Create an empty stage.
    #[must_use]
    pub fn new(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            name: String::new(),
            units: Vec::new(),
        }
    }

    /// Add a unit without recruitment metadata.
    #[must_use]
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.units.push(StageUnit {
            unit,
            recruitment: None,
        });
        self
    }

    /// Add a unit with a recruitment block.
    #[must_use]
    pub fn with_recruitable(mut self, unit: Unit, block: RecruitmentBlock) -> Self {
        self.units.push(StageUnit {
            unit,
            recruitment: Some(block),
        });
        self
    }

    /// Parse stage JSON.
    ///
    /// # Errors
    /// Returns [`RecruitError::Serialization`] if the document does not parse.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RecruitError::Serialization(e.to_string()))
    }

    /// Faction of every unit in the stage, by id.
    #[must_use]
    pub fn factions(&self) -> HashMap<UnitId, Faction> {
        self.units
            .iter()
            .map(|u| (u.unit.id.clone(), u.unit.faction))
            .collect()
    }
}

/// A unit as listed in stage data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageUnit {
    /// The unit itself.
    #[serde(flatten)]
    pub unit: Unit,
    /// Recruitment metadata; absent means not recruitable.
    #[serde(default)]
    pub recruitment: Option<RecruitmentBlock>,
}

/// Optional per-unit recruitment metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecruitmentBlock {
    /// Conditions, all of which must hold.
    #[serde(default)]
    pub conditions: Vec<RawCondition>,
    /// Ordering among recruitables (higher first).
    #[serde(default)]
    pub priority: i32,
    /// Player-facing blurb.
    #[serde(default)]
    pub description: String,
    /// Reward ids.
    #[serde(default)]
    pub rewards: Vec<String>,
}

// ---------------------------------------------------------------------------
// Validation report
// ---------------------------------------------------------------------------

/// How serious a stage-data problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unit stays recruitable, but the data looks wrong.
    Warning,
    /// Unit was dropped from recruitment.
    Error,
}

/// One problem found in recruitment metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Unit the problem belongs to.
    pub unit: UnitId,
    /// Offending condition, if the problem is condition-specific.
    pub condition: Option<String>,
    /// Severity.
    pub severity: Severity,
    /// What is wrong.
    pub message: String,
}

impl ValidationIssue {
    fn error(unit: &UnitId, condition: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.clone(),
            condition: condition.map(str::to_string),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(unit: &UnitId, condition: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.clone(),
            condition: condition.map(str::to_string),
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Non-fatal findings from loading a stage's recruitment metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Stage the report is for.
    pub stage_id: String,
    /// Definitions that were built.
    pub recruitable: usize,
    /// Every issue found, in discovery order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Whether nothing at all was flagged.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues that removed a unit from recruitment.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Issues that left the unit recruitable.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// Emit every issue as a `warn!` event.
    pub fn log(&self) {
        for issue in &self.issues {
            warn!(
                stage = %self.stage_id,
                unit = %issue.unit,
                condition = issue.condition.as_deref().unwrap_or("-"),
                severity = ?issue.severity,
                "Recruitment data issue: {}",
                issue.message
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Build a definition for every recruitable enemy in `stage`.
///
/// Units in `skip` (already on the persisted roster) are ignored. A unit is
/// dropped, with an error issue, when it is malformed, repeats an earlier
/// unit id, repeats a condition id, or any of its conditions fails to convert; a recruitment block
/// with no conditions drops the unit with a warning. Post-build checks from
/// [`validate_definitions`] are appended.
#[must_use]
pub fn build_definitions(
    stage: &StageData,
    skip: &HashSet<UnitId>,
) -> (Vec<RecruitableDefinition>, ValidationReport) {
    let mut report = ValidationReport {
        stage_id: stage.stage_id.clone(),
        ..ValidationReport::default()
    };
    let mut seen: HashSet<&UnitId> = HashSet::new();
    let mut definitions = Vec::new();

    for entry in &stage.units {
        let unit = &entry.unit;
        let first_sighting = seen.insert(&unit.id);
        let Some(block) = &entry.recruitment else {
            continue;
        };
        if unit.faction != Faction::Enemy || skip.contains(&unit.id) {
            continue;
        }
        if !first_sighting {
            report.issues.push(ValidationIssue::error(
                &unit.id,
                None,
                "duplicate unit id; only the first entry is recruitable",
            ));
            continue;
        }
        if let Err(e) = unit.validate() {
            report
                .issues
                .push(ValidationIssue::error(&unit.id, None, e.to_string()));
            continue;
        }
        if block.conditions.is_empty() {
            report.issues.push(ValidationIssue::warning(
                &unit.id,
                None,
                "recruitment block has no conditions",
            ));
            continue;
        }

        let mut conditions = Vec::with_capacity(block.conditions.len());
        let mut rejected = false;
        for raw in &block.conditions {
            match Condition::from_raw(raw) {
                Ok(c) => conditions.push(c),
                Err(e) => {
                    report
                        .issues
                        .push(ValidationIssue::error(&unit.id, Some(&raw.id), e.to_string()));
                    rejected = true;
                }
            }
        }
        if rejected {
            continue;
        }
        let duplicate = {
            let mut ids = HashSet::new();
            conditions
                .iter()
                .find(|c| !ids.insert(c.id.as_str()))
                .map(|c| c.id.clone())
        };
        if let Some(dup) = duplicate {
            report.issues.push(ValidationIssue::error(
                &unit.id,
                Some(&dup),
                "duplicate condition id",
            ));
            continue;
        }

        let mut def = RecruitableDefinition::new(unit.id.clone(), conditions);
        def.name.clone_from(&unit.name);
        def.priority = block.priority;
        def.description.clone_from(&block.description);
        def.rewards.clone_from(&block.rewards);
        definitions.push(def);
    }

    report
        .issues
        .extend(validate_definitions(&definitions, &stage.factions()));
    report.recruitable = definitions.len();
    (definitions, report)
}

/// Consistency checks over built definitions. Everything reported here is a
/// warning: the unit stays recruitable, even if in practice it cannot be.
#[must_use]
pub fn validate_definitions(
    definitions: &[RecruitableDefinition],
    stage_units: &HashMap<UnitId, Faction>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for def in definitions {
        let unit = &def.character_id;
        if def.conditions.is_empty() {
            issues.push(ValidationIssue::warning(unit, None, "no conditions"));
        }

        for cond in &def.conditions {
            if let Some(referenced) = cond.referenced_unit() {
                match stage_units.get(referenced) {
                    None => issues.push(ValidationIssue::warning(
                        unit,
                        Some(&cond.id),
                        format!("references unit {referenced} which is not in the stage"),
                    )),
                    Some(faction) if !faction.is_friendly() => {
                        issues.push(ValidationIssue::warning(
                            unit,
                            Some(&cond.id),
                            format!("references {referenced}, which is not a player unit"),
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        if let Some(conflict) = contradiction(&def.conditions) {
            issues.push(ValidationIssue::warning(
                unit,
                Some(&conflict.id),
                "contradicts an earlier condition; unit can never qualify",
            ));
        }
    }
    issues
}

/// First condition that requires a different value for the same attack field
/// than an earlier one.
fn contradiction(conditions: &[Condition]) -> Option<&Condition> {
    for (i, later) in conditions.iter().enumerate() {
        let clashes = conditions[..i].iter().any(|earlier| {
            match (&earlier.kind, &later.kind) {
                (
                    ConditionKind::SpecificAttacker { attacker_id: a },
                    ConditionKind::SpecificAttacker { attacker_id: b },
                ) => a != b,
                (
                    ConditionKind::ElementMatch { element: a },
                    ConditionKind::ElementMatch { element: b },
                ) => a != b,
                (
                    ConditionKind::WeaponType { weapon_type: a },
                    ConditionKind::WeaponType { weapon_type: b },
                ) => a != b,
                (
                    ConditionKind::DamageType { damage_type: a },
                    ConditionKind::DamageType { damage_type: b },
                ) => a != b,
                _ => false,
            }
        });
        if clashes {
            return Some(later);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: &str, kind: &str, parameters: serde_json::Value) -> RawCondition {
        RawCondition {
            id: id.to_string(),
            kind: kind.to_string(),
            description: String::new(),
            parameters,
        }
    }

    fn block(conditions: Vec<RawCondition>) -> RecruitmentBlock {
        RecruitmentBlock {
            conditions,
            ..RecruitmentBlock::default()
        }
    }

    #[test]
    fn parses_stage_json() {
        let stage = StageData::from_json(
            r#"{
                "stage_id": "chapter-1",
                "units": [
                    { "id": "player-1", "faction": "player", "current_hp": 30, "max_hp": 30 },
                    { "id": "enemy-1", "name": "Bandit", "faction": "enemy",
                      "current_hp": 90, "max_hp": 90,
                      "recruitment": {
                        "priority": 2,
                        "rewards": ["bandit-axe"],
                        "conditions": [
                          { "id": "c1", "type": "SPECIFIC_ATTACKER",
                            "description": "Defeat with the hero",
                            "parameters": { "attackerId": "player-1" } }
                        ]
                      } }
                ]
            }"#,
        )
        .expect("valid stage");
        assert_eq!(stage.units.len(), 2);
        assert!(stage.units[0].recruitment.is_none());
        assert_eq!(stage.units[1].unit.level, 1);

        let (defs, report) = build_definitions(&stage, &HashSet::new());
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "Bandit");
        assert_eq!(defs[0].priority, 2);
        assert_eq!(defs[0].rewards, vec!["bandit-axe".to_string()]);

        assert!(StageData::from_json("{ nope").is_err());
    }

    #[test]
    fn broken_units_are_skipped_not_fatal() {
        let stage = StageData::new("s")
            .with_unit(Unit::new("player-1", Faction::Player, 30))
            .with_recruitable(
                Unit::new("good", Faction::Enemy, 20),
                block(vec![raw("c1", "TURN_LIMIT", json!({"maxTurn": 5}))]),
            )
            .with_recruitable(
                Unit::new("bad-type", Faction::Enemy, 20),
                block(vec![raw("c1", "TELEPATHY", json!({}))]),
            )
            .with_recruitable(
                Unit::new("bad-param", Faction::Enemy, 20),
                block(vec![
                    raw("c1", "TURN_LIMIT", json!({"maxTurn": 5})),
                    raw("c2", "HP_THRESHOLD", json!({})),
                ]),
            )
            .with_recruitable(Unit::new("empty", Faction::Enemy, 20), block(Vec::new()))
            .with_recruitable(
                Unit::new("zero-hp", Faction::Enemy, 0),
                block(vec![raw("c1", "NO_CRITICAL", json!(null))]),
            );

        let (defs, report) = build_definitions(&stage, &HashSet::new());
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].character_id, UnitId::from("good"));
        assert_eq!(report.recruitable, 1);
        assert_eq!(report.errors().count(), 3);
        assert_eq!(report.warnings().count(), 1);
        assert!(report
            .errors()
            .any(|i| i.unit == UnitId::from("bad-param") && i.condition.as_deref() == Some("c2")));
    }

    #[test]
    fn player_units_and_roster_members_never_recruitable() {
        let conds = block(vec![raw("c1", "NO_CRITICAL", json!(null))]);
        let stage = StageData::new("s")
            .with_recruitable(Unit::new("player-1", Faction::Player, 30), conds.clone())
            .with_recruitable(Unit::new("veteran", Faction::Enemy, 30), conds.clone())
            .with_recruitable(Unit::new("enemy-1", Faction::Enemy, 30), conds);

        let skip: HashSet<UnitId> = [UnitId::from("veteran")].into_iter().collect();
        let (defs, report) = build_definitions(&stage, &skip);
        assert!(report.is_clean());
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].character_id, UnitId::from("enemy-1"));
    }

    #[test]
    fn duplicate_unit_ids_rejected() {
        let conds = block(vec![raw("c1", "NO_CRITICAL", json!(null))]);
        let stage = StageData::new("s")
            .with_recruitable(Unit::new("enemy-1", Faction::Enemy, 30), conds.clone())
            .with_recruitable(Unit::new("enemy-1", Faction::Enemy, 30), conds);
        let (defs, report) = build_definitions(&stage, &HashSet::new());
        assert_eq!(defs.len(), 1);
        assert_eq!(report.errors().count(), 1);
    }

    #[test]
    fn post_build_warnings() {
        let stage = StageData::new("s")
            .with_unit(Unit::new("player-1", Faction::Player, 30))
            .with_unit(Unit::new("enemy-2", Faction::Enemy, 30))
            .with_recruitable(
                Unit::new("enemy-1", Faction::Enemy, 30),
                block(vec![
                    raw("a", "SPECIFIC_ATTACKER", json!({"attackerId": "player-1"})),
                    raw("g", "ALLY_PRESENT", json!({"requiredAllyId": "ghost"})),
                    raw("b", "ALLY_PRESENT", json!({"requiredAllyId": "enemy-2"})),
                    raw("c", "SPECIFIC_ATTACKER", json!({"attackerId": "player-2"})),
                ]),
            );
        let (defs, report) = build_definitions(&stage, &HashSet::new());
        assert_eq!(defs.len(), 1);
        assert_eq!(report.errors().count(), 0);
        let messages: Vec<&str> = report.warnings().map(|i| i.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("ghost")));
        assert!(messages.iter().any(|m| m.contains("not a player unit")));
        assert!(messages.iter().any(|m| m.contains("contradicts")));
    }

    #[test]
    fn duplicate_condition_ids_drop_the_unit() {
        let stage = StageData::new("s")
            .with_recruitable(
                Unit::new("enemy-1", Faction::Enemy, 30),
                block(vec![
                    raw("t", "TURN_LIMIT", json!({"maxTurn": 10})),
                    raw("t", "TURN_LIMIT", json!({"maxTurn": 3})),
                ]),
            )
            .with_recruitable(
                Unit::new("enemy-2", Faction::Enemy, 30),
                block(vec![raw("t", "TURN_LIMIT", json!({"maxTurn": 3}))]),
            );
        let (defs, report) = build_definitions(&stage, &HashSet::new());
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].character_id, UnitId::from("enemy-2"));
        let err = report.errors().next().expect("duplicate rejected");
        assert_eq!(err.unit, UnitId::from("enemy-1"));
        assert_eq!(err.condition.as_deref(), Some("t"));
        assert!(validate_definitions(&defs, &stage.factions()).is_empty());
    }
}
