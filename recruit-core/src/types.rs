//! Core type definitions for the recruitment engine.
//!
//! Units are owned by the host battle system. The engine only ever reads
//! them and hands back [`UnitPatch`] commands describing how they should change.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Stage-scoped unit identifier as written in stage data (`"enemy-1"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    /// Borrow the raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UnitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a single recruitment (one conversion to NPC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecruitmentId(pub Uuid);

impl RecruitmentId {
    /// Create a new random recruitment ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecruitmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecruitmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Which side a unit fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    /// The player's side.
    Player,
    /// Hostile units.
    Enemy,
    /// Bystanders that belong to neither side.
    Neutral,
}

impl Faction {
    /// The side recruited units end up on.
    pub const FRIENDLY: Self = Self::Player;

    /// Whether this is the player's side.
    #[must_use]
    pub fn is_friendly(self) -> bool {
        self == Self::FRIENDLY
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => write!(f, "player"),
            Self::Enemy => write!(f, "enemy"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// A combat unit as seen by the recruitment engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Stage-scoped identifier.
    pub id: UnitId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Current allegiance.
    pub faction: Faction,
    /// Current hit points.
    pub current_hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Character level.
    #[serde(default = "default_level")]
    pub level: u32,
    /// Whether the unit has used its action this turn.
    #[serde(default)]
    pub has_acted: bool,
    /// Whether the unit has moved this turn.
    #[serde(default)]
    pub has_moved: bool,
}

fn default_level() -> u32 {
    1
}

impl Unit {
    /// Create a fresh unit at full health.
    #[must_use]
    pub fn new(id: impl Into<UnitId>, faction: Faction, max_hp: u32) -> Self {
        let id = id.into();
        Self {
            name: id.0.clone(),
            id,
            faction,
            current_hp: max_hp,
            max_hp,
            level: 1,
            has_acted: false,
            has_moved: false,
        }
    }

    /// Set current HP.
    #[must_use]
    pub fn with_hp(mut self, current_hp: u32) -> Self {
        self.current_hp = current_hp;
        self
    }

    /// Whether the unit is still standing.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.current_hp > 0
    }

    /// Current HP as a fraction of max HP. Zero when max HP is zero.
    #[must_use]
    pub fn hp_ratio(&self) -> f64 {
        if self.max_hp == 0 {
            return 0.0;
        }
        f64::from(self.current_hp) / f64::from(self.max_hp)
    }

    /// Whether `damage` would bring this unit to 0 HP or below.
    #[must_use]
    pub fn is_lethal(&self, damage: u32) -> bool {
        damage >= self.current_hp
    }

    /// Structural sanity check used before any state transition.
    ///
    /// # Errors
    /// Returns [`RecruitError::MalformedUnit`](crate::RecruitError::MalformedUnit)
    /// for an empty id or a zero max HP.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.id.0.trim().is_empty() {
            return Err(crate::RecruitError::MalformedUnit {
                unit: self.id.clone(),
                reason: "empty unit id".to_string(),
            });
        }
        if self.max_hp == 0 {
            return Err(crate::RecruitError::MalformedUnit {
                unit: self.id.clone(),
                reason: "max HP is zero".to_string(),
            });
        }
        Ok(())
    }
}

/// A command describing how a unit should change.
///
/// State transitions never touch the caller's units directly; they return a
/// patch which the owner of the unit applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPatch {
    /// Unit this patch targets.
    pub unit_id: UnitId,
    /// New faction, if it changes.
    pub faction: Option<Faction>,
    /// New current HP, if it changes.
    pub current_hp: Option<u32>,
    /// New acted flag, if it changes.
    pub has_acted: Option<bool>,
    /// New moved flag, if it changes.
    pub has_moved: Option<bool>,
}

impl UnitPatch {
    /// An empty patch for `unit_id`.
    #[must_use]
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            faction: None,
            current_hp: None,
            has_acted: None,
            has_moved: None,
        }
    }

    /// Set the faction.
    #[must_use]
    pub fn faction(mut self, faction: Faction) -> Self {
        self.faction = Some(faction);
        self
    }

    /// Set current HP.
    #[must_use]
    pub fn hp(mut self, hp: u32) -> Self {
        self.current_hp = Some(hp);
        self
    }

    /// Set both turn flags at once.
    #[must_use]
    pub fn turn_flags(mut self, spent: bool) -> Self {
        self.has_acted = Some(spent);
        self.has_moved = Some(spent);
        self
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faction.is_none()
            && self.current_hp.is_none()
            && self.has_acted.is_none()
            && self.has_moved.is_none()
    }

    /// Apply to `unit`. Returns `false` (and changes nothing) on id mismatch.
    pub fn apply(&self, unit: &mut Unit) -> bool {
        if unit.id != self.unit_id {
            return false;
        }
        if let Some(faction) = self.faction {
            unit.faction = faction;
        }
        if let Some(hp) = self.current_hp {
            unit.current_hp = hp;
        }
        if let Some(acted) = self.has_acted {
            unit.has_acted = acted;
        }
        if let Some(moved) = self.has_moved {
            unit.has_moved = moved;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Battle results
// ---------------------------------------------------------------------------

/// Elemental affinity of an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    /// No element.
    None,
    /// Fire.
    Fire,
    /// Ice.
    Ice,
    /// Lightning.
    Lightning,
    /// Earth.
    Earth,
    /// Wind.
    Wind,
    /// Light.
    Light,
    /// Dark.
    Dark,
}

/// Weapon class used for an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeaponType {
    /// Swords.
    Sword,
    /// Spears and lances.
    Spear,
    /// Axes.
    Axe,
    /// Bows.
    Bow,
    /// Staves.
    Staff,
    /// Daggers.
    Dagger,
    /// Tomes and grimoires.
    Tome,
    /// Bare hands.
    Fist,
}

/// How damage is dealt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    /// Reduced by defense.
    Physical,
    /// Reduced by resistance.
    Magical,
    /// Ignores mitigation.
    True,
}

/// Outcome of a resolved attack, as reported by the battle system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleResult {
    /// Element of the attack.
    pub element: Element,
    /// Weapon used.
    pub weapon_type: WeaponType,
    /// Damage channel.
    pub damage_type: DamageType,
    /// Whether the hit was critical.
    pub critical: bool,
}

impl Default for BattleResult {
    fn default() -> Self {
        Self {
            element: Element::None,
            weapon_type: WeaponType::Sword,
            damage_type: DamageType::Physical,
            critical: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Targeting priority
// ---------------------------------------------------------------------------

/// Opaque, totally ordered score handed to AI targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetPriority(pub OrderedFloat<f64>);

impl TargetPriority {
    /// Priority of an ordinary (non-NPC) unit.
    pub const NONE: Self = Self(OrderedFloat(0.0));

    /// Create a priority from a raw value.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(OrderedFloat(value))
    }

    /// Raw value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}

impl Default for TargetPriority {
    fn default() -> Self {
        Self::NONE
    }
}
