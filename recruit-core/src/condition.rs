//! Recruitment conditions: typed predicates over a [`RecruitmentContext`].
//!
//! Stage data describes conditions loosely as `{ id, type, description,
//! parameters }` ([`RawCondition`]). They are converted into the closed
//! [`ConditionKind`] sum type when a recruitable definition is built, so a
//! missing or ill-typed parameter is rejected up front and evaluation itself
//! can never hit a malformed condition.
//!
//! Every predicate reads the **pre-damage** context: target HP, turn and
//! battle result as they stand when the attack is reported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::Fingerprint;
use crate::context::RecruitmentContext;
use crate::error::{RecruitError, Result};
use crate::types::{DamageType, Element, UnitId, WeaponType};

/// A condition exactly as written in stage metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCondition {
    /// Condition id, unique within its recruitable unit.
    pub id: String,
    /// Type tag, e.g. `"HP_THRESHOLD"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Player-facing description.
    #[serde(default)]
    pub description: String,
    /// Type-specific parameters.
    #[serde(default)]
    pub parameters: Value,
}

/// The closed set of condition predicates with their typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionKind {
    /// A specific unit must land the attack.
    #[serde(rename_all = "camelCase")]
    SpecificAttacker {
        /// Required attacker.
        attacker_id: UnitId,
    },
    /// Target HP ratio must be at or below `threshold` (in `(0, 1]`).
    #[serde(rename_all = "camelCase")]
    HpThreshold {
        /// Maximum `current / max` HP ratio.
        threshold: f64,
    },
    /// The attack must happen on or before `max_turn`.
    #[serde(rename_all = "camelCase")]
    TurnLimit {
        /// Last eligible turn.
        max_turn: u32,
    },
    /// The attack must carry this element.
    #[serde(rename_all = "camelCase")]
    ElementMatch {
        /// Required element.
        element: Element,
    },
    /// The attack must use this weapon class.
    #[serde(rename_all = "camelCase")]
    WeaponType {
        /// Required weapon.
        weapon_type: WeaponType,
    },
    /// The attack must deal this damage type.
    #[serde(rename_all = "camelCase")]
    DamageType {
        /// Required damage type.
        damage_type: DamageType,
    },
    /// A specific ally must be alive on the field.
    #[serde(rename_all = "camelCase")]
    AllyPresent {
        /// Ally that has to be present.
        required_ally_id: UnitId,
    },
    /// The attack must not be a critical hit.
    NoCritical,
}

impl ConditionKind {
    /// Stage-data type tag.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SpecificAttacker { .. } => "SPECIFIC_ATTACKER",
            Self::HpThreshold { .. } => "HP_THRESHOLD",
            Self::TurnLimit { .. } => "TURN_LIMIT",
            Self::ElementMatch { .. } => "ELEMENT_MATCH",
            Self::WeaponType { .. } => "WEAPON_TYPE",
            Self::DamageType { .. } => "DAMAGE_TYPE",
            Self::AllyPresent { .. } => "ALLY_PRESENT",
            Self::NoCritical => "NO_CRITICAL",
        }
    }
}

/// The slice of context a condition reads beyond the base fingerprint
/// (turn, damage, attacker id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservedInput {
    /// Nothing beyond the base fingerprint.
    None,
    /// Target HP at evaluation time.
    TargetHp {
        /// Current HP.
        current: u32,
        /// Max HP.
        max: u32,
    },
    /// Element of the battle result.
    Element(Option<Element>),
    /// Weapon of the battle result.
    Weapon(Option<WeaponType>),
    /// Damage type of the battle result.
    Damage(Option<DamageType>),
    /// Critical flag of the battle result.
    Critical(Option<bool>),
    /// Whether the required ally is alive.
    Ally(bool),
}

/// A validated recruitment condition.
///
/// Serialized in the stage-data shape; deserializing goes through
/// [`Condition::from_raw`], so persisted data gets the same range checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition", into = "RawCondition")]
pub struct Condition {
    /// Condition id, unique within its recruitable unit.
    pub id: String,
    /// Player-facing description.
    pub description: String,
    /// Predicate and parameters.
    pub kind: ConditionKind,
}

impl TryFrom<RawCondition> for Condition {
    type Error = RecruitError;

    fn try_from(raw: RawCondition) -> Result<Self> {
        Self::from_raw(&raw)
    }
}

impl From<Condition> for RawCondition {
    fn from(cond: Condition) -> Self {
        let parameters = serde_json::to_value(&cond.kind)
            .ok()
            .and_then(|mut v| v.get_mut("parameters").map(Value::take))
            .unwrap_or(Value::Null);
        Self {
            id: cond.id,
            kind: cond.kind.type_name().to_owned(),
            description: cond.description,
            parameters,
        }
    }
}

impl Condition {
    /// Create a condition directly from a typed kind.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ConditionKind) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Convert a stage-data condition into its typed form.
    ///
    /// # Errors
    /// Returns [`RecruitError::InvalidCondition`] for an empty id, an unknown
    /// type, or a missing, ill-typed or out-of-range parameter.
    pub fn from_raw(raw: &RawCondition) -> Result<Self> {
        if raw.id.trim().is_empty() {
            return Err(invalid(raw, "condition id is empty"));
        }

        let params = &raw.parameters;
        let kind = match raw.kind.trim().to_ascii_uppercase().as_str() {
            "SPECIFIC_ATTACKER" => ConditionKind::SpecificAttacker {
                attacker_id: unit_param(raw, params, "attackerId")?,
            },
            "HP_THRESHOLD" => {
                let threshold = params
                    .get("threshold")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| invalid(raw, "missing numeric parameter 'threshold'"))?;
                if !(threshold > 0.0 && threshold <= 1.0) {
                    return Err(invalid(
                        raw,
                        &format!("threshold {threshold} outside (0, 1]"),
                    ));
                }
                ConditionKind::HpThreshold { threshold }
            }
            "TURN_LIMIT" => {
                let max_turn = params
                    .get("maxTurn")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| invalid(raw, "missing integer parameter 'maxTurn'"))?;
                let max_turn = u32::try_from(max_turn)
                    .map_err(|_| invalid(raw, "maxTurn out of range"))?;
                if max_turn == 0 {
                    return Err(invalid(raw, "maxTurn must be at least 1"));
                }
                ConditionKind::TurnLimit { max_turn }
            }
            "ELEMENT_MATCH" => ConditionKind::ElementMatch {
                element: enum_param(raw, params, "element")?,
            },
            "WEAPON_TYPE" => ConditionKind::WeaponType {
                weapon_type: enum_param(raw, params, "weaponType")?,
            },
            "DAMAGE_TYPE" => ConditionKind::DamageType {
                damage_type: enum_param(raw, params, "damageType")?,
            },
            "ALLY_PRESENT" => ConditionKind::AllyPresent {
                required_ally_id: unit_param(raw, params, "requiredAllyId")?,
            },
            "NO_CRITICAL" => ConditionKind::NoCritical,
            other => return Err(invalid(raw, &format!("unknown condition type '{other}'"))),
        };

        Ok(Self {
            id: raw.id.clone(),
            description: raw.description.clone(),
            kind,
        })
    }

    /// Evaluate the predicate. Pure; conditions that need a battle result
    /// fail closed when none is attached.
    #[must_use]
    pub fn evaluate(&self, ctx: &RecruitmentContext<'_>) -> bool {
        match &self.kind {
            ConditionKind::SpecificAttacker { attacker_id } => ctx.attacker.id == *attacker_id,
            ConditionKind::HpThreshold { threshold } => {
                ctx.target.max_hp > 0 && ctx.target.hp_ratio() <= *threshold
            }
            ConditionKind::TurnLimit { max_turn } => ctx.turn <= *max_turn,
            ConditionKind::ElementMatch { element } => {
                ctx.battle_result.is_some_and(|r| r.element == *element)
            }
            ConditionKind::WeaponType { weapon_type } => {
                ctx.battle_result.is_some_and(|r| r.weapon_type == *weapon_type)
            }
            ConditionKind::DamageType { damage_type } => {
                ctx.battle_result.is_some_and(|r| r.damage_type == *damage_type)
            }
            ConditionKind::AllyPresent { required_ally_id } => {
                ctx.living_ally(required_ally_id).is_some()
            }
            ConditionKind::NoCritical => ctx.battle_result.is_some_and(|r| !r.critical),
        }
    }

    /// The context inputs this condition reads beyond turn, damage and attacker.
    #[must_use]
    pub fn observed_input(&self, ctx: &RecruitmentContext<'_>) -> ObservedInput {
        let result = ctx.battle_result;
        match &self.kind {
            ConditionKind::SpecificAttacker { .. } | ConditionKind::TurnLimit { .. } => {
                ObservedInput::None
            }
            ConditionKind::HpThreshold { .. } => ObservedInput::TargetHp {
                current: ctx.target.current_hp,
                max: ctx.target.max_hp,
            },
            ConditionKind::ElementMatch { .. } => ObservedInput::Element(result.map(|r| r.element)),
            ConditionKind::WeaponType { .. } => {
                ObservedInput::Weapon(result.map(|r| r.weapon_type))
            }
            ConditionKind::DamageType { .. } => {
                ObservedInput::Damage(result.map(|r| r.damage_type))
            }
            ConditionKind::NoCritical => ObservedInput::Critical(result.map(|r| r.critical)),
            ConditionKind::AllyPresent { required_ally_id } => {
                ObservedInput::Ally(ctx.living_ally(required_ally_id).is_some())
            }
        }
    }

    /// Cache fingerprint of `ctx` as seen by this condition.
    #[must_use]
    pub fn fingerprint(&self, ctx: &RecruitmentContext<'_>) -> Fingerprint {
        Fingerprint::new(ctx, self.observed_input(ctx))
    }

    /// Unit this condition refers to by id, if any.
    #[must_use]
    pub fn referenced_unit(&self) -> Option<&UnitId> {
        match &self.kind {
            ConditionKind::SpecificAttacker { attacker_id } => Some(attacker_id),
            ConditionKind::AllyPresent { required_ally_id } => Some(required_ally_id),
            _ => None,
        }
    }

    /// Description for UI, falling back to a generated one.
    #[must_use]
    pub fn display_text(&self) -> String {
        if !self.description.is_empty() {
            return self.description.clone();
        }
        match &self.kind {
            ConditionKind::SpecificAttacker { attacker_id } => {
                format!("Defeat with {attacker_id}")
            }
            ConditionKind::HpThreshold { threshold } => {
                format!("Reduce HP to {:.0}% or less", threshold * 100.0)
            }
            ConditionKind::TurnLimit { max_turn } => format!("Within turn {max_turn}"),
            ConditionKind::ElementMatch { element } => format!("Strike with {element:?}"),
            ConditionKind::WeaponType { weapon_type } => format!("Use a {weapon_type:?}"),
            ConditionKind::DamageType { damage_type } => format!("Deal {damage_type:?} damage"),
            ConditionKind::AllyPresent { required_ally_id } => {
                format!("{required_ally_id} must be on the field")
            }
            ConditionKind::NoCritical => "No critical hit".to_string(),
        }
    }
}

/// Result of evaluating one condition, for reports and UI indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionResult {
    /// Condition id.
    pub condition_id: String,
    /// Player-facing text.
    pub description: String,
    /// Whether it held.
    pub met: bool,
}

fn invalid(raw: &RawCondition, reason: &str) -> RecruitError {
    RecruitError::InvalidCondition {
        condition: raw.id.clone(),
        reason: format!("{} ({})", reason, raw.kind),
    }
}

fn unit_param(raw: &RawCondition, params: &Value, key: &str) -> Result<UnitId> {
    match params.get(key).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(UnitId::from(s)),
        _ => Err(invalid(raw, &format!("missing string parameter '{key}'"))),
    }
}

fn enum_param<T: serde::de::DeserializeOwned>(
    raw: &RawCondition,
    params: &Value,
    key: &str,
) -> Result<T> {
    let value = params
        .get(key)
        .ok_or_else(|| invalid(raw, &format!("missing parameter '{key}'")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| invalid(raw, &format!("bad parameter '{key}': {e}")))
}
