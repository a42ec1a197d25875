//! The fixed unit field-id table used by the diff codec.
//!
//! Every scalar a [`Unit`] carries has one stable numeric id. The ids are
//! wire constants: a serialized diff addresses fields by these numbers, so
//! the mapping lives in this single table rather than scattered literals.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};
use crate::unit::Unit;

/// A field value carried in a diff entry.
///
/// Integer fields travel as wrapping arithmetic deltas, which reconstruct
/// exactly. Float fields (the velocity pair) travel as absolute replacement
/// values because float subtraction is not bit-exact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

/// Stable numeric ids for every tracked unit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum UnitField {
    X = 0,
    Y = 1,
    Health = 2,
    MaxHealth = 3,
    Shield = 4,
    MaxShield = 5,
    Energy = 6,
    MaxCd = 7,
    GroundCd = 8,
    AirCd = 9,
    Visible = 10,
    Type = 11,
    Armor = 12,
    ShieldArmor = 13,
    Size = 14,
    PixelX = 15,
    PixelY = 16,
    PixelSizeX = 17,
    PixelSizeY = 18,
    GroundAtk = 19,
    AirAtk = 20,
    GroundDmgType = 21,
    AirDmgType = 22,
    GroundRange = 23,
    AirRange = 24,
    PlayerId = 25,
    Resources = 26,
    BuildTechUpgradeType = 27,
    RemainingBuildTrainTime = 28,
    RemainingUpgradeResearchTime = 29,
    SpellCd = 30,
    AssociatedUnit = 31,
    AssociatedCount = 32,
    CommandFrame = 33,
    CommandType = 34,
    CommandTargetId = 35,
    CommandTargetX = 36,
    CommandTargetY = 37,
    CommandExtra = 38,
    VelocityX = 39,
    VelocityY = 40,
    Flags = 41,
}

impl UnitField {
    /// Every field, in id order.
    pub const ALL: [UnitField; 42] = [
        UnitField::X,
        UnitField::Y,
        UnitField::Health,
        UnitField::MaxHealth,
        UnitField::Shield,
        UnitField::MaxShield,
        UnitField::Energy,
        UnitField::MaxCd,
        UnitField::GroundCd,
        UnitField::AirCd,
        UnitField::Visible,
        UnitField::Type,
        UnitField::Armor,
        UnitField::ShieldArmor,
        UnitField::Size,
        UnitField::PixelX,
        UnitField::PixelY,
        UnitField::PixelSizeX,
        UnitField::PixelSizeY,
        UnitField::GroundAtk,
        UnitField::AirAtk,
        UnitField::GroundDmgType,
        UnitField::AirDmgType,
        UnitField::GroundRange,
        UnitField::AirRange,
        UnitField::PlayerId,
        UnitField::Resources,
        UnitField::BuildTechUpgradeType,
        UnitField::RemainingBuildTrainTime,
        UnitField::RemainingUpgradeResearchTime,
        UnitField::SpellCd,
        UnitField::AssociatedUnit,
        UnitField::AssociatedCount,
        UnitField::CommandFrame,
        UnitField::CommandType,
        UnitField::CommandTargetId,
        UnitField::CommandTargetX,
        UnitField::CommandTargetY,
        UnitField::CommandExtra,
        UnitField::VelocityX,
        UnitField::VelocityY,
        UnitField::Flags,
    ];

    /// The wire id of this field.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Resolve a wire id back to a field.
    pub fn from_id(id: u8) -> Result<Self> {
        Self::ALL
            .get(id as usize)
            .copied()
            .ok_or(StateError::UnknownField(id))
    }

    /// Read this field's current value from a unit.
    pub fn get(self, unit: &Unit) -> FieldValue {
        use FieldValue::{Float, Int};
        match self {
            UnitField::X => Int(unit.x as i64),
            UnitField::Y => Int(unit.y as i64),
            UnitField::Health => Int(unit.health as i64),
            UnitField::MaxHealth => Int(unit.max_health as i64),
            UnitField::Shield => Int(unit.shield as i64),
            UnitField::MaxShield => Int(unit.max_shield as i64),
            UnitField::Energy => Int(unit.energy as i64),
            UnitField::MaxCd => Int(unit.max_cd as i64),
            UnitField::GroundCd => Int(unit.ground_cd as i64),
            UnitField::AirCd => Int(unit.air_cd as i64),
            UnitField::Visible => Int(unit.visible as i64),
            UnitField::Type => Int(unit.unit_type as i64),
            UnitField::Armor => Int(unit.armor as i64),
            UnitField::ShieldArmor => Int(unit.shield_armor as i64),
            UnitField::Size => Int(unit.size as i64),
            UnitField::PixelX => Int(unit.pixel_x as i64),
            UnitField::PixelY => Int(unit.pixel_y as i64),
            UnitField::PixelSizeX => Int(unit.pixel_size_x as i64),
            UnitField::PixelSizeY => Int(unit.pixel_size_y as i64),
            UnitField::GroundAtk => Int(unit.ground_atk as i64),
            UnitField::AirAtk => Int(unit.air_atk as i64),
            UnitField::GroundDmgType => Int(unit.ground_dmg_type as i64),
            UnitField::AirDmgType => Int(unit.air_dmg_type as i64),
            UnitField::GroundRange => Int(unit.ground_range as i64),
            UnitField::AirRange => Int(unit.air_range as i64),
            UnitField::PlayerId => Int(unit.player_id as i64),
            UnitField::Resources => Int(unit.resources as i64),
            UnitField::BuildTechUpgradeType => Int(unit.build_tech_upgrade_type as i64),
            UnitField::RemainingBuildTrainTime => Int(unit.remaining_build_train_time as i64),
            UnitField::RemainingUpgradeResearchTime => {
                Int(unit.remaining_upgrade_research_time as i64)
            }
            UnitField::SpellCd => Int(unit.spell_cd as i64),
            UnitField::AssociatedUnit => Int(unit.associated_unit as i64),
            UnitField::AssociatedCount => Int(unit.associated_count as i64),
            UnitField::CommandFrame => Int(unit.command.frame as i64),
            UnitField::CommandType => Int(unit.command.kind as i64),
            UnitField::CommandTargetId => Int(unit.command.target_id as i64),
            UnitField::CommandTargetX => Int(unit.command.target_x as i64),
            UnitField::CommandTargetY => Int(unit.command.target_y as i64),
            UnitField::CommandExtra => Int(unit.command.extra as i64),
            UnitField::VelocityX => Float(unit.velocity_x),
            UnitField::VelocityY => Float(unit.velocity_y),
            UnitField::Flags => Int(unit.flags as i64),
        }
    }

    /// Apply a diff entry to a unit: add an integer delta (wrapping) or
    /// replace a float value.
    pub fn apply(self, unit: &mut Unit, value: FieldValue) {
        fn add32(slot: &mut i32, value: FieldValue) {
            if let FieldValue::Int(delta) = value {
                *slot = (*slot as i64).wrapping_add(delta) as i32;
            }
        }

        match self {
            UnitField::X => add32(&mut unit.x, value),
            UnitField::Y => add32(&mut unit.y, value),
            UnitField::Health => add32(&mut unit.health, value),
            UnitField::MaxHealth => add32(&mut unit.max_health, value),
            UnitField::Shield => add32(&mut unit.shield, value),
            UnitField::MaxShield => add32(&mut unit.max_shield, value),
            UnitField::Energy => add32(&mut unit.energy, value),
            UnitField::MaxCd => add32(&mut unit.max_cd, value),
            UnitField::GroundCd => add32(&mut unit.ground_cd, value),
            UnitField::AirCd => add32(&mut unit.air_cd, value),
            UnitField::Visible => add32(&mut unit.visible, value),
            UnitField::Type => add32(&mut unit.unit_type, value),
            UnitField::Armor => add32(&mut unit.armor, value),
            UnitField::ShieldArmor => add32(&mut unit.shield_armor, value),
            UnitField::Size => add32(&mut unit.size, value),
            UnitField::PixelX => add32(&mut unit.pixel_x, value),
            UnitField::PixelY => add32(&mut unit.pixel_y, value),
            UnitField::PixelSizeX => add32(&mut unit.pixel_size_x, value),
            UnitField::PixelSizeY => add32(&mut unit.pixel_size_y, value),
            UnitField::GroundAtk => add32(&mut unit.ground_atk, value),
            UnitField::AirAtk => add32(&mut unit.air_atk, value),
            UnitField::GroundDmgType => add32(&mut unit.ground_dmg_type, value),
            UnitField::AirDmgType => add32(&mut unit.air_dmg_type, value),
            UnitField::GroundRange => add32(&mut unit.ground_range, value),
            UnitField::AirRange => add32(&mut unit.air_range, value),
            UnitField::PlayerId => add32(&mut unit.player_id, value),
            UnitField::Resources => add32(&mut unit.resources, value),
            UnitField::BuildTechUpgradeType => add32(&mut unit.build_tech_upgrade_type, value),
            UnitField::RemainingBuildTrainTime => {
                add32(&mut unit.remaining_build_train_time, value)
            }
            UnitField::RemainingUpgradeResearchTime => {
                add32(&mut unit.remaining_upgrade_research_time, value)
            }
            UnitField::SpellCd => add32(&mut unit.spell_cd, value),
            UnitField::AssociatedUnit => add32(&mut unit.associated_unit, value),
            UnitField::AssociatedCount => add32(&mut unit.associated_count, value),
            UnitField::CommandFrame => add32(&mut unit.command.frame, value),
            UnitField::CommandType => add32(&mut unit.command.kind, value),
            UnitField::CommandTargetId => add32(&mut unit.command.target_id, value),
            UnitField::CommandTargetX => add32(&mut unit.command.target_x, value),
            UnitField::CommandTargetY => add32(&mut unit.command.target_y, value),
            UnitField::CommandExtra => add32(&mut unit.command.extra, value),
            UnitField::VelocityX => {
                if let FieldValue::Float(v) = value {
                    unit.velocity_x = v;
                }
            }
            UnitField::VelocityY => {
                if let FieldValue::Float(v) = value {
                    unit.velocity_y = v;
                }
            }
            UnitField::Flags => {
                if let FieldValue::Int(delta) = value {
                    unit.flags = unit.flags.wrapping_add(delta as u64);
                }
            }
        }
    }

    /// The diff entry that takes `base`'s value of this field to `target`'s,
    /// or `None` when the values already agree.
    pub fn delta(self, target: &Unit, base: &Unit) -> Option<FieldValue> {
        match (self.get(target), self.get(base)) {
            (FieldValue::Int(t), FieldValue::Int(b)) => {
                let delta = t.wrapping_sub(b);
                (delta != 0).then_some(FieldValue::Int(delta))
            }
            (FieldValue::Float(t), FieldValue::Float(b)) => {
                (t.to_bits() != b.to_bits()).then_some(FieldValue::Float(t))
            }
            // get() always returns the same variant for the same field.
            _ => unreachable!("field value variant mismatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::flags;

    #[test]
    fn ids_are_dense_and_stable() {
        for (index, field) in UnitField::ALL.iter().enumerate() {
            assert_eq!(field.id() as usize, index);
            assert_eq!(UnitField::from_id(field.id()).unwrap(), *field);
        }
        assert!(matches!(
            UnitField::from_id(42),
            Err(StateError::UnknownField(42))
        ));
    }

    #[test]
    fn delta_then_apply_reconstructs() {
        let mut base = Unit::with_id(1);
        base.health = 80;
        base.x = 10;
        base.flags = flags::IDLE | flags::CLOAKED;
        base.velocity_x = 1.25;

        let mut target = base.clone();
        target.health = 55;
        target.x = 14;
        target.flags = flags::MOVING;
        target.velocity_x = -0.5;

        let mut rebuilt = base.clone();
        for field in UnitField::ALL {
            if let Some(value) = field.delta(&target, &base) {
                field.apply(&mut rebuilt, value);
            }
        }
        assert_eq!(rebuilt, target);
    }

    #[test]
    fn delta_is_none_for_equal_units() {
        let mut unit = Unit::with_id(3);
        unit.energy = 50;
        unit.velocity_y = 3.5;
        for field in UnitField::ALL {
            assert_eq!(field.delta(&unit, &unit), None, "{field:?}");
        }
    }

    #[test]
    fn new_unit_delta_from_zero_base_is_absolute() {
        let zero = Unit::with_id(9);
        let mut target = Unit::with_id(9);
        target.health = 100;
        target.unit_type = 37;

        assert_eq!(
            UnitField::Health.delta(&target, &zero),
            Some(FieldValue::Int(100))
        );
        assert_eq!(
            UnitField::Type.delta(&target, &zero),
            Some(FieldValue::Int(37))
        );
    }

    #[test]
    fn flag_delta_wraps_exactly() {
        let mut base = Unit::with_id(1);
        base.flags = u64::MAX;
        let mut target = Unit::with_id(1);
        target.flags = 1;

        let mut rebuilt = base.clone();
        let value = UnitField::Flags.delta(&target, &base).unwrap();
        UnitField::Flags.apply(&mut rebuilt, value);
        assert_eq!(rebuilt.flags, 1);
    }
}
