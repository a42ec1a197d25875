//! Sparse frame deltas: [`diff`], [`undiff`] and the in-place [`add`].
//!
//! The diff direction is asymmetric: `diff(lhs, rhs)` computes the delta
//! that, applied to base `rhs`, reproduces target `lhs`. Callers track
//! which frame played which role.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};
use crate::field::{FieldValue, UnitField};
use crate::frame::{Action, Bullet, Frame, Resources};
use crate::unit::{Order, Unit};
use crate::{PlayerId, UnitId};

/// Number of diffable sub-fields per order slot.
const ORDER_FIELDS: u32 = 5;

/// Sparse field deltas for one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitDiff {
    pub id: UnitId,
    /// `(field id, value)` pairs, see [`UnitField`].
    pub fields: Vec<(u8, FieldValue)>,
    /// `(5 * order_index + sub_field, delta)` pairs.
    pub orders: Vec<(u32, i32)>,
    /// Target order-list length, carried verbatim so reconstruction can
    /// allocate slots before replaying order deltas.
    pub order_size: u32,
}

/// Sparse delta between two frames with identical dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDiff {
    pub pids: Vec<PlayerId>,
    /// Per-player unit diffs, parallel to `pids`, id-ascending.
    pub units: Vec<Vec<UnitDiff>>,

    // Cheap enough to carry in full.
    pub actions: BTreeMap<PlayerId, Vec<Action>>,
    pub resources: BTreeMap<PlayerId, Resources>,
    pub bullets: Vec<Bullet>,

    /// `(byte index, new byte value)` pairs for changed creep bytes.
    pub creep: Vec<(u32, u8)>,

    pub reward: i32,
    pub is_terminal: bool,
}

fn order_sub_field(order: &Order, sub: u32) -> i32 {
    match sub {
        0 => order.first_frame,
        1 => order.kind,
        2 => order.target_id,
        3 => order.target_x,
        _ => order.target_y,
    }
}

fn order_sub_field_add(order: &mut Order, sub: u32, delta: i32) {
    let slot = match sub {
        0 => &mut order.first_frame,
        1 => &mut order.kind,
        2 => &mut order.target_id,
        3 => &mut order.target_x,
        _ => &mut order.target_y,
    };
    *slot = slot.wrapping_add(delta);
}

/// Diff one unit against its base.
fn diff_unit(target: &Unit, base: &Unit) -> UnitDiff {
    let mut out = UnitDiff {
        id: target.id,
        order_size: target.orders.len() as u32,
        ..UnitDiff::default()
    };

    for field in UnitField::ALL {
        if let Some(value) = field.delta(target, base) {
            out.fields.push((field.id(), value));
        }
    }

    for (index, order) in target.orders.iter().enumerate() {
        let base_order = base.orders.get(index);
        for sub in 0..ORDER_FIELDS {
            let value = order_sub_field(order, sub);
            match base_order {
                Some(base_order) => {
                    let delta = value.wrapping_sub(order_sub_field(base_order, sub));
                    if delta != 0 {
                        out.orders.push((index as u32 * ORDER_FIELDS + sub, delta));
                    }
                }
                // No base slot: emit unconditionally against a zero base.
                None => out.orders.push((index as u32 * ORDER_FIELDS + sub, value)),
            }
        }
    }

    out
}

/// Diff a unit that has no base: every field against a zero-valued unit.
///
/// All fields are emitted unconditionally; against the zero base the delta
/// is the absolute value, so reconstruction establishes the unit exactly.
fn diff_new_unit(target: &Unit) -> UnitDiff {
    let mut out = UnitDiff {
        id: target.id,
        order_size: target.orders.len() as u32,
        ..UnitDiff::default()
    };

    for field in UnitField::ALL {
        out.fields.push((field.id(), field.get(target)));
    }

    for (index, order) in target.orders.iter().enumerate() {
        for sub in 0..ORDER_FIELDS {
            out.orders.push((
                index as u32 * ORDER_FIELDS + sub,
                order_sub_field(order, sub),
            ));
        }
    }

    out
}

/// Compute the delta that takes base `rhs` to target `lhs`.
///
/// Both frames must have identical dimensions. Unit lists are sorted by id
/// on working copies; the original frames are untouched.
pub fn diff(lhs: &Frame, rhs: &Frame) -> Result<FrameDiff> {
    if lhs.width != rhs.width || lhs.height != rhs.height {
        return Err(StateError::DimensionMismatch {
            lhs_width: lhs.width,
            lhs_height: lhs.height,
            rhs_width: rhs.width,
            rhs_height: rhs.height,
        });
    }

    let mut out = FrameDiff {
        actions: lhs.actions.clone(),
        resources: lhs.resources.clone(),
        bullets: lhs.bullets.clone(),
        reward: lhs.reward,
        is_terminal: lhs.is_terminal,
        ..FrameDiff::default()
    };

    for (pid, target_units) in &lhs.units {
        let mut target_units = target_units.clone();
        target_units.sort_by_key(|u| u.id);

        let mut base_units = rhs.units.get(pid).cloned().unwrap_or_default();
        base_units.sort_by_key(|u| u.id);

        let mut unit_diffs = Vec::with_capacity(target_units.len());
        let mut base_iter = base_units.iter().peekable();

        for target in &target_units {
            // Merge-join: skip base units that vanished from the target.
            while base_iter.peek().is_some_and(|b| b.id < target.id) {
                base_iter.next();
            }
            match base_iter.peek() {
                Some(base) if base.id == target.id => {
                    unit_diffs.push(diff_unit(target, base));
                    base_iter.next();
                }
                _ => unit_diffs.push(diff_new_unit(target)),
            }
        }

        out.pids.push(*pid);
        out.units.push(unit_diffs);
    }

    for (index, (l, r)) in lhs.creep_map.iter().zip(rhs.creep_map.iter()).enumerate() {
        if l != r {
            out.creep.push((index as u32, *l));
        }
    }

    Ok(out)
}

/// Reconstruct the target frame from `base` plus `diff`.
pub fn undiff(base: &Frame, diff: &FrameDiff) -> Result<Frame> {
    let mut result = Frame::default();
    add(&mut result, base, diff)?;
    Ok(result)
}

/// In-place variant of [`undiff`]: populate `result` from `base` + `diff`.
pub fn add(result: &mut Frame, base: &Frame, diff: &FrameDiff) -> Result<()> {
    result.width = base.width;
    result.height = base.height;
    result.creep_map = base.creep_map.clone();
    for (index, byte) in &diff.creep {
        let index = *index as usize;
        if index >= result.creep_map.len() {
            return Err(StateError::Corrupt {
                detail: format!(
                    "creep delta index {index} out of range ({} bytes)",
                    result.creep_map.len()
                ),
            });
        }
        result.creep_map[index] = *byte;
    }

    result.units.clear();
    for (pid, unit_diffs) in diff.pids.iter().zip(diff.units.iter()) {
        let mut base_units = base.units.get(pid).cloned().unwrap_or_default();
        base_units.sort_by_key(|u| u.id);

        let mut units = Vec::with_capacity(unit_diffs.len());
        let mut base_iter = base_units.iter().peekable();

        for unit_diff in unit_diffs {
            while base_iter.peek().is_some_and(|b| b.id < unit_diff.id) {
                base_iter.next();
            }
            let mut unit = match base_iter.peek() {
                Some(base_unit) if base_unit.id == unit_diff.id => {
                    base_iter.next().expect("peeked").clone()
                }
                _ => Unit::with_id(unit_diff.id),
            };

            unit.orders
                .resize(unit_diff.order_size as usize, Order::default());
            for (key, delta) in &unit_diff.orders {
                let index = (key / ORDER_FIELDS) as usize;
                let sub = key % ORDER_FIELDS;
                let Some(order) = unit.orders.get_mut(index) else {
                    return Err(StateError::Corrupt {
                        detail: format!(
                            "order delta slot {index} out of range ({} orders)",
                            unit_diff.order_size
                        ),
                    });
                };
                order_sub_field_add(order, sub, *delta);
            }

            for (id, value) in &unit_diff.fields {
                UnitField::from_id(*id)?.apply(&mut unit, *value);
            }

            units.push(unit);
        }
        result.units.insert(*pid, units);
    }

    result.actions = diff.actions.clone();
    result.resources = diff.resources.clone();
    result.bullets = diff.bullets.clone();
    result.reward = diff.reward;
    result.is_terminal = diff.is_terminal;
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::unit::{flags, UnitCommand};

    fn sample_unit(id: i32, health: i32) -> Unit {
        let mut unit = Unit::with_id(id);
        unit.player_id = 0;
        unit.health = health;
        unit.max_health = 100;
        unit.x = id * 4;
        unit.y = id * 3;
        unit.unit_type = 37;
        unit.flags = flags::COMPLETED | flags::IDLE;
        unit.velocity_x = 0.5 * id as f64;
        unit.command = UnitCommand {
            frame: 1,
            kind: 6,
            target_id: -1,
            target_x: 12,
            target_y: 34,
            extra: 0,
        };
        unit.orders.push(Order {
            first_frame: 1,
            kind: 6,
            target_id: -1,
            target_x: 12,
            target_y: 34,
        });
        unit
    }

    fn sample_frame() -> Frame {
        let mut frame = Frame::with_dimensions(32, 32);
        frame.units.insert(0, vec![sample_unit(1, 80), sample_unit(3, 60)]);
        frame.units.insert(1, vec![sample_unit(2, 100)]);
        frame.resources.insert(
            0,
            Resources {
                ore: 50,
                gas: 25,
                used_psi: 10,
                total_psi: 20,
                upgrades: 0b101,
                upgrades_level: 0b1,
                techs: 0b11,
            },
        );
        frame.bullets.push(Bullet { kind: 2, x: 5, y: 6 });
        frame.set_creep(4, 4, true);
        frame.reward = 1;
        frame
    }

    #[test]
    fn roundtrip_identical_frames_is_sparse() {
        let frame = sample_frame();
        let delta = diff(&frame, &frame).unwrap();

        for unit_diffs in &delta.units {
            for unit_diff in unit_diffs {
                assert!(unit_diff.fields.is_empty());
                assert!(unit_diff.orders.is_empty());
            }
        }
        assert!(delta.creep.is_empty());

        let rebuilt = undiff(&frame, &delta).unwrap();
        assert_eq!(rebuilt, frame);
    }

    #[test]
    fn roundtrip_with_changes() {
        let base = sample_frame();
        let mut target = base.clone();
        {
            let units = target.units.get_mut(&0).unwrap();
            units[0].health = 55;
            units[0].x += 7;
            units[0].flags = flags::MOVING;
            units[0].velocity_x = -1.75;
            units[0].orders.push(Order {
                first_frame: 9,
                kind: 14,
                target_id: 2,
                target_x: 1,
                target_y: 2,
            });
        }
        target.set_creep(10, 10, true);
        target.set_creep(4, 4, false);
        target.reward = -3;
        target.is_terminal = true;
        target.bullets.clear();

        let delta = diff(&target, &base).unwrap();
        let rebuilt = undiff(&base, &delta).unwrap();
        assert_eq!(rebuilt, target);
    }

    #[test]
    fn roundtrip_new_and_removed_units() {
        let base = sample_frame();
        let mut target = base.clone();
        {
            let units = target.units.get_mut(&0).unwrap();
            // Unit 1 dies, unit 9 appears.
            units.retain(|u| u.id != 1);
            let mut fresh = sample_unit(9, 100);
            fresh.velocity_y = 2.5;
            units.push(fresh);
        }

        let delta = diff(&target, &base).unwrap();
        let rebuilt = undiff(&base, &delta).unwrap();

        // Comparison is order-independent after sorting by id.
        let mut want = target.clone();
        let mut got = rebuilt.clone();
        for units in want.units.values_mut().chain(got.units.values_mut()) {
            units.sort_by_key(|u| u.id);
        }
        assert_eq!(got, want);
    }

    #[test]
    fn roundtrip_player_appears() {
        let base = sample_frame();
        let mut target = base.clone();
        target.units.insert(2, vec![sample_unit(11, 40)]);

        let delta = diff(&target, &base).unwrap();
        let rebuilt = undiff(&base, &delta).unwrap();
        assert_eq!(rebuilt, target);
    }

    #[test]
    fn roundtrip_shrinking_order_list() {
        let base = sample_frame();
        let mut target = base.clone();
        target.units.get_mut(&0).unwrap()[0].orders.clear();

        let delta = diff(&target, &base).unwrap();
        let rebuilt = undiff(&base, &delta).unwrap();
        assert_eq!(rebuilt, target);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let a = Frame::with_dimensions(8, 8);
        let b = Frame::with_dimensions(16, 8);
        assert!(matches!(
            diff(&a, &b),
            Err(StateError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn corrupt_creep_index_is_rejected() {
        let base = Frame::with_dimensions(8, 8);
        let delta = FrameDiff {
            creep: vec![(10_000, 0xFF)],
            ..FrameDiff::default()
        };
        assert!(matches!(
            undiff(&base, &delta),
            Err(StateError::Corrupt { .. })
        ));
    }

    prop_compose! {
        fn arb_order()(
            first_frame in 0..200i32,
            kind in 0..20i32,
            target_id in -1..50i32,
            target_x in 0..256i32,
            target_y in 0..256i32,
        ) -> Order {
            Order { first_frame, kind, target_id, target_x, target_y }
        }
    }

    prop_compose! {
        fn arb_unit(id: i32)(
            health in 0..500i32,
            x in 0..1024i32,
            y in 0..1024i32,
            flag_bits in any::<u64>(),
            vx in -8.0f64..8.0,
            vy in -8.0f64..8.0,
            orders in prop::collection::vec(arb_order(), 0..4),
        ) -> Unit {
            let mut unit = Unit::with_id(id);
            unit.health = health;
            unit.x = x;
            unit.y = y;
            unit.flags = flag_bits;
            unit.velocity_x = vx;
            unit.velocity_y = vy;
            unit.orders = orders;
            unit
        }
    }

    fn arb_frame() -> impl Strategy<Value = Frame> {
        (
            prop::collection::vec(any::<bool>(), 8),
            prop::collection::vec((0..40i32).prop_flat_map(arb_unit), 0..4),
        )
            .prop_map(|(creep_bits, mut units)| {
                let mut frame = Frame::with_dimensions(8, 8);
                for (i, on) in creep_bits.iter().enumerate() {
                    frame.set_creep(i as i32, 0, *on);
                }
                // Distinct ascending ids within the player.
                units.sort_by_key(|u| u.id);
                units.dedup_by_key(|u| u.id);
                frame.units.insert(0, units);
                frame.reward = 2;
                frame
            })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(a in arb_frame(), b in arb_frame()) {
            let delta = diff(&a, &b).unwrap();
            let rebuilt = undiff(&b, &delta).unwrap();
            prop_assert_eq!(rebuilt, a);
        }
    }
}
