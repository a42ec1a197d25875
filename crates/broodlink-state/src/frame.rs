use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::unit::Unit;
use crate::PlayerId;

/// Per-player economy snapshot.
///
/// Wholesale-replaced each update; the three technology bitsets carry
/// bit-OR semantics on the producer side but are copied verbatim here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub ore: i32,
    pub gas: i32,
    pub used_psi: i32,
    pub total_psi: i32,
    pub upgrades: u64,
    pub upgrades_level: u64,
    pub techs: u64,
}

/// Transient projectile; the bullet list is fully replaced each update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bullet {
    pub kind: i32,
    pub x: i32,
    pub y: i32,
}

/// One action a player issued during the covered ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub uid: i32,
    pub aid: i32,
    pub args: Vec<i32>,
}

/// Point-in-time snapshot of all observable game facts.
///
/// The frame owned by the session is exclusively mutable through the
/// codec operations; once handed to a consumer it travels behind an `Arc`
/// and is treated as immutable until the next step replaces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub units: BTreeMap<PlayerId, Vec<Unit>>,
    pub actions: BTreeMap<PlayerId, Vec<Action>>,
    pub resources: BTreeMap<PlayerId, Resources>,
    pub bullets: Vec<Bullet>,

    /// Creep bitmap over build tiles, one bit per tile, row-major.
    pub creep_map: Vec<u8>,
    pub width: i32,
    pub height: i32,

    pub reward: i32,
    pub is_terminal: bool,
}

impl Frame {
    /// An empty frame with map dimensions and a zeroed creep bitmap.
    pub fn with_dimensions(width: i32, height: i32) -> Self {
        let bits = (width.max(0) as usize) * (height.max(0) as usize);
        Self {
            creep_map: vec![0u8; bits.div_ceil(8)],
            width,
            height,
            ..Self::default()
        }
    }

    /// Whether creep covers the build tile at `(x, y)`.
    pub fn get_creep(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return false;
        }
        let bit = (y * self.width + x) as usize;
        self.creep_map
            .get(bit / 8)
            .is_some_and(|byte| byte & (1 << (bit % 8)) != 0)
    }

    /// Set the creep bit for the build tile at `(x, y)`.
    pub fn set_creep(&mut self, x: i32, y: i32, on: bool) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let bit = (y * self.width + x) as usize;
        if let Some(byte) = self.creep_map.get_mut(bit / 8) {
            if on {
                *byte |= 1 << (bit % 8);
            } else {
                *byte &= !(1 << (bit % 8));
            }
        }
    }

    /// Total number of units across all players.
    pub fn unit_count(&self) -> usize {
        self.units.values().map(Vec::len).sum()
    }

    /// Merge the next captured tick into this accumulator frame.
    ///
    /// Units present in both take `next`'s field values but keep their
    /// accumulated order history, extended with `next`'s orders that do not
    /// repeat the current tail. Units only in `next` are appended; units
    /// only in `self` persist — the producer's lifecycle policy removes a
    /// unit from future ticks only by omitting it. Everything transient
    /// (actions, bullets, creep, reward, terminal flag, resources) is
    /// last-tick-wins.
    pub fn combine(&mut self, next: &Frame) {
        for (pid, next_units) in &next.units {
            let units = self.units.entry(*pid).or_default();
            for next_unit in next_units {
                match units.iter_mut().find(|u| u.id == next_unit.id) {
                    Some(unit) => {
                        let orders = std::mem::take(&mut unit.orders);
                        *unit = next_unit.clone();
                        unit.orders = orders;
                        for order in &next_unit.orders {
                            unit.push_order(*order);
                        }
                    }
                    None => units.push(next_unit.clone()),
                }
            }
        }
        for (pid, resources) in &next.resources {
            self.resources.insert(*pid, *resources);
        }
        self.actions = next.actions.clone();
        self.bullets = next.bullets.clone();
        self.creep_map = next.creep_map.clone();
        self.width = next.width;
        self.height = next.height;
        self.reward = next.reward;
        self.is_terminal = next.is_terminal;
    }
}
