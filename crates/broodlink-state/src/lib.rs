//! Frame state model and delta codec for the broodlink game bridge.
//!
//! A [`Frame`] is one snapshot of everything the controller may observe:
//! units, per-player economy, bullets, pending actions, the terrain creep
//! bitmap, reward and terminal flag. Consecutive frames are transmitted as
//! sparse [`FrameDiff`]s; [`diff`]/[`undiff`] are exact inverses, and
//! [`Frame::combine`] merges the ticks captured between two protocol
//! exchanges into one accumulator frame.
//!
//! The [`replay`] module persists frame sequences in a little-endian binary
//! stream for offline playback.

pub mod diff;
pub mod error;
pub mod field;
pub mod frame;
pub mod replay;
pub mod unit;

pub use diff::{add, diff, undiff, FrameDiff, UnitDiff};
pub use error::{Result, StateError};
pub use field::{FieldValue, UnitField};
pub use frame::{Action, Bullet, Frame, Resources};
pub use replay::Replayer;
pub use unit::{flags, Order, Unit, UnitCommand};

/// Player identifier as reported by the engine.
pub type PlayerId = i32;

/// Unit identifier, unique per game.
pub type UnitId = i32;
