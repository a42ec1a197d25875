use serde::{Deserialize, Serialize};

use crate::{PlayerId, UnitId};

/// Boolean state predicates packed into [`Unit::flags`].
///
/// Bit positions are stable wire constants. Derived accessors on [`Unit`]
/// read these same bits, so an accessor and the raw bitset can never
/// disagree.
pub mod flags {
    pub const ACCELERATING: u64 = 1 << 0;
    pub const ATTACKING: u64 = 1 << 1;
    pub const ATTACK_FRAME: u64 = 1 << 2;
    pub const BEING_CONSTRUCTED: u64 = 1 << 3;
    pub const BEING_GATHERED: u64 = 1 << 4;
    pub const BEING_HEALED: u64 = 1 << 5;
    pub const BLIND: u64 = 1 << 6;
    pub const BRAKING: u64 = 1 << 7;
    pub const BURROWED: u64 = 1 << 8;
    pub const CARRYING_GAS: u64 = 1 << 9;
    pub const CARRYING_MINERALS: u64 = 1 << 10;
    pub const CLOAKED: u64 = 1 << 11;
    pub const COMPLETED: u64 = 1 << 12;
    pub const CONSTRUCTING: u64 = 1 << 13;
    pub const DETECTED: u64 = 1 << 14;
    pub const FLYING: u64 = 1 << 15;
    pub const GATHERING_GAS: u64 = 1 << 16;
    pub const GATHERING_MINERALS: u64 = 1 << 17;
    pub const HALLUCINATION: u64 = 1 << 18;
    pub const HOLDING_POSITION: u64 = 1 << 19;
    pub const IDLE: u64 = 1 << 20;
    pub const INTERRUPTIBLE: u64 = 1 << 21;
    pub const INVINCIBLE: u64 = 1 << 22;
    pub const IRRADIATED: u64 = 1 << 23;
    pub const LIFTED: u64 = 1 << 24;
    pub const LOADED: u64 = 1 << 25;
    pub const LOCKED_DOWN: u64 = 1 << 26;
    pub const MAELSTROMMED: u64 = 1 << 27;
    pub const MORPHING: u64 = 1 << 28;
    pub const MOVING: u64 = 1 << 29;
    pub const PARASITED: u64 = 1 << 30;
    pub const PATROLLING: u64 = 1 << 31;
    pub const PLAGUED: u64 = 1 << 32;
    pub const POWERED: u64 = 1 << 33;
    pub const REPAIRING: u64 = 1 << 34;
    pub const SELECTED: u64 = 1 << 35;
    pub const SIEGED: u64 = 1 << 36;
    pub const STARTING_ATTACK: u64 = 1 << 37;
    pub const STASISED: u64 = 1 << 38;
    pub const STIMMED: u64 = 1 << 39;
    pub const STUCK: u64 = 1 << 40;
    pub const TRAINING: u64 = 1 << 41;
    pub const UNDER_ATTACK: u64 = 1 << 42;
    pub const UNDER_DARK_SWARM: u64 = 1 << 43;
    pub const UNDER_DISRUPTION_WEB: u64 = 1 << 44;
    pub const UNDER_STORM: u64 = 1 << 45;
    pub const UPGRADING: u64 = 1 << 46;
}

/// One entry in a unit's order queue.
///
/// Orders are appended, never mutated. An order of type `None` (0) is kept
/// in the queue because its arrival frame marks the end of the previous
/// order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Order {
    /// Frame on which this order first appeared.
    pub first_frame: i32,
    pub kind: i32,
    pub target_id: UnitId,
    pub target_x: i32,
    pub target_y: i32,
}

impl PartialEq for Order {
    /// Equality ignores `first_frame`: repeated identical orders collapse
    /// when accumulating order history across ticks.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.target_id == other.target_id
            && self.target_x == other.target_x
            && self.target_y == other.target_y
    }
}

impl Eq for Order {}

/// The single pending command last issued to a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCommand {
    pub frame: i32,
    pub kind: i32,
    pub target_id: UnitId,
    pub target_x: i32,
    pub target_y: i32,
    pub extra: i32,
}

/// One simulated entity.
///
/// Created zero-valued (see [`Unit::with_id`]) so that reconstructing a
/// newly-appeared unit from a diff starts from a well-defined base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub player_id: PlayerId,
    pub x: i32,
    pub y: i32,

    pub health: i32,
    pub max_health: i32,
    pub shield: i32,
    pub max_shield: i32,
    pub energy: i32,

    pub max_cd: i32,
    pub ground_cd: i32,
    pub air_cd: i32,
    pub spell_cd: i32,

    /// Bitset of boolean state predicates, see [`flags`].
    pub flags: u64,
    pub visible: i32,
    pub unit_type: i32,
    pub armor: i32,
    pub shield_armor: i32,
    pub size: i32,

    pub pixel_x: i32,
    pub pixel_y: i32,
    pub pixel_size_x: i32,
    pub pixel_size_y: i32,

    pub ground_atk: i32,
    pub air_atk: i32,
    pub ground_dmg_type: i32,
    pub air_dmg_type: i32,
    pub ground_range: i32,
    pub air_range: i32,

    pub velocity_x: f64,
    pub velocity_y: f64,

    /// Remaining resources for resource containers.
    pub resources: i32,
    pub build_tech_upgrade_type: i32,
    pub remaining_build_train_time: i32,
    pub remaining_upgrade_research_time: i32,
    pub associated_unit: UnitId,
    pub associated_count: i32,

    pub orders: Vec<Order>,
    pub command: UnitCommand,
}

impl Unit {
    /// A zero-valued unit carrying only its identity.
    pub fn with_id(id: UnitId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn has_flag(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }

    pub fn set_flag(&mut self, flag: u64, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    pub fn idle(&self) -> bool {
        self.has_flag(flags::IDLE)
    }

    pub fn cloaked(&self) -> bool {
        self.has_flag(flags::CLOAKED)
    }

    pub fn burrowed(&self) -> bool {
        self.has_flag(flags::BURROWED)
    }

    pub fn completed(&self) -> bool {
        self.has_flag(flags::COMPLETED)
    }

    pub fn moving(&self) -> bool {
        self.has_flag(flags::MOVING)
    }

    pub fn attacking(&self) -> bool {
        self.has_flag(flags::ATTACKING)
    }

    pub fn detected(&self) -> bool {
        self.has_flag(flags::DETECTED)
    }

    pub fn flying(&self) -> bool {
        self.has_flag(flags::FLYING)
    }

    /// Append `order` unless it repeats the current last order
    /// (`first_frame` excluded from the comparison).
    pub fn push_order(&mut self, order: Order) {
        if self.orders.last() != Some(&order) {
            self.orders.push(order);
        }
    }
}
