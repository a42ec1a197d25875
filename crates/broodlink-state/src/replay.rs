//! Persisted replay streams.
//!
//! A replay is a sequential little-endian stream:
//! `[height][width][creep bytes][frame count][each serialized frame]`
//! `[player-id -> max-unit-count table]`. Arrays are length-prefixed with a
//! `u32`. There is no self-describing schema; every size field is validated
//! against a hard cap before it gates an allocation, and anything absurd
//! fails fast as [`StateError::Corrupt`].

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, StateError};
use crate::frame::{Action, Bullet, Frame, Resources};
use crate::unit::{Order, Unit, UnitCommand};
use crate::PlayerId;

/// Map dimensions beyond this are not a real game.
const MAX_DIMENSION: i32 = 1 << 14;
/// Cap on any length-prefixed array in the stream.
const MAX_ARRAY_LEN: u32 = 1 << 24;
/// Cap on serialized frame count.
const MAX_FRAMES: u32 = 1 << 22;

/// An in-memory replay: shared frame snapshots plus map facts.
///
/// Frames are reference-counted; a frame handed out by [`Replayer::frame`]
/// stays alive for as long as any consumer holds it, independent of the
/// replayer itself.
#[derive(Debug, Default)]
pub struct Replayer {
    frames: Vec<Arc<Frame>>,
    map_width: i32,
    map_height: i32,
    map_creep: Vec<u8>,
    num_units: BTreeMap<PlayerId, i32>,
}

impl Replayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the map terrain facts.
    pub fn set_map(&mut self, width: i32, height: i32, creep: Vec<u8>) {
        self.map_width = width;
        self.map_height = height;
        self.map_creep = creep;
    }

    /// Append one frame snapshot, updating the per-player max-unit table.
    pub fn push(&mut self, frame: Frame) {
        for (pid, units) in &frame.units {
            let max = self.num_units.entry(*pid).or_insert(0);
            *max = (*max).max(units.len() as i32);
        }
        self.frames.push(Arc::new(frame));
    }

    /// Shared handle to frame `index`.
    pub fn frame(&self, index: usize) -> Option<Arc<Frame>> {
        self.frames.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn map_width(&self) -> i32 {
        self.map_width
    }

    pub fn map_height(&self) -> i32 {
        self.map_height
    }

    pub fn map_creep(&self) -> &[u8] {
        &self.map_creep
    }

    /// Highest unit count ever observed for `pid`.
    pub fn max_units(&self, pid: PlayerId) -> i32 {
        self.num_units.get(&pid).copied().unwrap_or(0)
    }

    pub fn num_units_table(&self) -> &BTreeMap<PlayerId, i32> {
        &self.num_units
    }

    /// Serialize the replay to `w`.
    pub fn write_to(&self, w: &mut dyn Write) -> Result<()> {
        write_i32(w, self.map_height)?;
        write_i32(w, self.map_width)?;
        write_bytes(w, &self.map_creep)?;

        write_u32(w, self.frames.len() as u32)?;
        for frame in &self.frames {
            write_frame(w, frame)?;
        }

        write_u32(w, self.num_units.len() as u32)?;
        for (pid, count) in &self.num_units {
            write_i32(w, *pid)?;
            write_i32(w, *count)?;
        }
        debug!(frames = self.frames.len(), "wrote replay stream");
        Ok(())
    }

    /// Deserialize a replay from `r`, failing fast on corrupt size fields.
    pub fn read_from(r: &mut dyn Read) -> Result<Self> {
        let map_height = read_i32(r)?;
        let map_width = read_i32(r)?;
        if !(0..=MAX_DIMENSION).contains(&map_height) || !(0..=MAX_DIMENSION).contains(&map_width) {
            return Err(StateError::Corrupt {
                detail: format!("absurd map dimensions {map_width}x{map_height}"),
            });
        }
        let map_creep = read_bytes(r)?;

        let frame_count = read_u32(r)?;
        if frame_count > MAX_FRAMES {
            return Err(StateError::Corrupt {
                detail: format!("absurd frame count {frame_count}"),
            });
        }
        let mut frames = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            frames.push(Arc::new(read_frame(r)?));
        }

        let table_len = read_u32(r)?;
        if table_len > MAX_ARRAY_LEN {
            return Err(StateError::Corrupt {
                detail: format!("absurd unit-count table length {table_len}"),
            });
        }
        let mut num_units = BTreeMap::new();
        for _ in 0..table_len {
            let pid = read_i32(r)?;
            let count = read_i32(r)?;
            num_units.insert(pid, count);
        }

        debug!(frames = frames.len(), "read replay stream");
        Ok(Self {
            frames,
            map_width,
            map_height,
            map_creep,
            num_units,
        })
    }
}

// ── Primitive writers/readers ───────────────────────────────────

fn write_u8(w: &mut dyn Write, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

fn write_u32(w: &mut dyn Write, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_i32(w: &mut dyn Write, v: i32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_u64(w: &mut dyn Write, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_f64(w: &mut dyn Write, v: f64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_bytes(w: &mut dyn Write, b: &[u8]) -> Result<()> {
    write_u32(w, b.len() as u32)?;
    w.write_all(b)?;
    Ok(())
}

fn read_u8(r: &mut dyn Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(r: &mut dyn Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(r: &mut dyn Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u64(r: &mut dyn Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64(r: &mut dyn Read) -> Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_bytes(r: &mut dyn Read) -> Result<Vec<u8>> {
    let len = read_u32(r)?;
    if len > MAX_ARRAY_LEN {
        return Err(StateError::Corrupt {
            detail: format!("absurd byte-array length {len}"),
        });
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn checked_len(r: &mut dyn Read, what: &str) -> Result<u32> {
    let len = read_u32(r)?;
    if len > MAX_ARRAY_LEN {
        return Err(StateError::Corrupt {
            detail: format!("absurd {what} length {len}"),
        });
    }
    Ok(len)
}

// ── Frame codec ─────────────────────────────────────────────────

fn write_order(w: &mut dyn Write, order: &Order) -> Result<()> {
    write_i32(w, order.first_frame)?;
    write_i32(w, order.kind)?;
    write_i32(w, order.target_id)?;
    write_i32(w, order.target_x)?;
    write_i32(w, order.target_y)
}

fn read_order(r: &mut dyn Read) -> Result<Order> {
    Ok(Order {
        first_frame: read_i32(r)?,
        kind: read_i32(r)?,
        target_id: read_i32(r)?,
        target_x: read_i32(r)?,
        target_y: read_i32(r)?,
    })
}

fn write_unit(w: &mut dyn Write, unit: &Unit) -> Result<()> {
    write_i32(w, unit.id)?;
    write_i32(w, unit.player_id)?;
    write_i32(w, unit.x)?;
    write_i32(w, unit.y)?;
    write_i32(w, unit.health)?;
    write_i32(w, unit.max_health)?;
    write_i32(w, unit.shield)?;
    write_i32(w, unit.max_shield)?;
    write_i32(w, unit.energy)?;
    write_i32(w, unit.max_cd)?;
    write_i32(w, unit.ground_cd)?;
    write_i32(w, unit.air_cd)?;
    write_i32(w, unit.spell_cd)?;
    write_u64(w, unit.flags)?;
    write_i32(w, unit.visible)?;
    write_i32(w, unit.unit_type)?;
    write_i32(w, unit.armor)?;
    write_i32(w, unit.shield_armor)?;
    write_i32(w, unit.size)?;
    write_i32(w, unit.pixel_x)?;
    write_i32(w, unit.pixel_y)?;
    write_i32(w, unit.pixel_size_x)?;
    write_i32(w, unit.pixel_size_y)?;
    write_i32(w, unit.ground_atk)?;
    write_i32(w, unit.air_atk)?;
    write_i32(w, unit.ground_dmg_type)?;
    write_i32(w, unit.air_dmg_type)?;
    write_i32(w, unit.ground_range)?;
    write_i32(w, unit.air_range)?;
    write_f64(w, unit.velocity_x)?;
    write_f64(w, unit.velocity_y)?;
    write_i32(w, unit.resources)?;
    write_i32(w, unit.build_tech_upgrade_type)?;
    write_i32(w, unit.remaining_build_train_time)?;
    write_i32(w, unit.remaining_upgrade_research_time)?;
    write_i32(w, unit.associated_unit)?;
    write_i32(w, unit.associated_count)?;

    write_u32(w, unit.orders.len() as u32)?;
    for order in &unit.orders {
        write_order(w, order)?;
    }

    write_i32(w, unit.command.frame)?;
    write_i32(w, unit.command.kind)?;
    write_i32(w, unit.command.target_id)?;
    write_i32(w, unit.command.target_x)?;
    write_i32(w, unit.command.target_y)?;
    write_i32(w, unit.command.extra)
}

fn read_unit(r: &mut dyn Read) -> Result<Unit> {
    let mut unit = Unit::with_id(read_i32(r)?);
    unit.player_id = read_i32(r)?;
    unit.x = read_i32(r)?;
    unit.y = read_i32(r)?;
    unit.health = read_i32(r)?;
    unit.max_health = read_i32(r)?;
    unit.shield = read_i32(r)?;
    unit.max_shield = read_i32(r)?;
    unit.energy = read_i32(r)?;
    unit.max_cd = read_i32(r)?;
    unit.ground_cd = read_i32(r)?;
    unit.air_cd = read_i32(r)?;
    unit.spell_cd = read_i32(r)?;
    unit.flags = read_u64(r)?;
    unit.visible = read_i32(r)?;
    unit.unit_type = read_i32(r)?;
    unit.armor = read_i32(r)?;
    unit.shield_armor = read_i32(r)?;
    unit.size = read_i32(r)?;
    unit.pixel_x = read_i32(r)?;
    unit.pixel_y = read_i32(r)?;
    unit.pixel_size_x = read_i32(r)?;
    unit.pixel_size_y = read_i32(r)?;
    unit.ground_atk = read_i32(r)?;
    unit.air_atk = read_i32(r)?;
    unit.ground_dmg_type = read_i32(r)?;
    unit.air_dmg_type = read_i32(r)?;
    unit.ground_range = read_i32(r)?;
    unit.air_range = read_i32(r)?;
    unit.velocity_x = read_f64(r)?;
    unit.velocity_y = read_f64(r)?;
    unit.resources = read_i32(r)?;
    unit.build_tech_upgrade_type = read_i32(r)?;
    unit.remaining_build_train_time = read_i32(r)?;
    unit.remaining_upgrade_research_time = read_i32(r)?;
    unit.associated_unit = read_i32(r)?;
    unit.associated_count = read_i32(r)?;

    let order_count = checked_len(r, "order list")?;
    unit.orders = Vec::with_capacity(order_count as usize);
    for _ in 0..order_count {
        unit.orders.push(read_order(r)?);
    }

    unit.command = UnitCommand {
        frame: read_i32(r)?,
        kind: read_i32(r)?,
        target_id: read_i32(r)?,
        target_x: read_i32(r)?,
        target_y: read_i32(r)?,
        extra: read_i32(r)?,
    };
    Ok(unit)
}

/// Serialize one frame in the replay layout.
pub fn write_frame(w: &mut dyn Write, frame: &Frame) -> Result<()> {
    write_u32(w, frame.units.len() as u32)?;
    for (pid, units) in &frame.units {
        write_i32(w, *pid)?;
        write_u32(w, units.len() as u32)?;
        for unit in units {
            write_unit(w, unit)?;
        }
    }

    write_u32(w, frame.actions.len() as u32)?;
    for (pid, actions) in &frame.actions {
        write_i32(w, *pid)?;
        write_u32(w, actions.len() as u32)?;
        for action in actions {
            write_i32(w, action.uid)?;
            write_i32(w, action.aid)?;
            write_u32(w, action.args.len() as u32)?;
            for arg in &action.args {
                write_i32(w, *arg)?;
            }
        }
    }

    write_u32(w, frame.resources.len() as u32)?;
    for (pid, res) in &frame.resources {
        write_i32(w, *pid)?;
        write_i32(w, res.ore)?;
        write_i32(w, res.gas)?;
        write_i32(w, res.used_psi)?;
        write_i32(w, res.total_psi)?;
        write_u64(w, res.upgrades)?;
        write_u64(w, res.upgrades_level)?;
        write_u64(w, res.techs)?;
    }

    write_u32(w, frame.bullets.len() as u32)?;
    for bullet in &frame.bullets {
        write_i32(w, bullet.kind)?;
        write_i32(w, bullet.x)?;
        write_i32(w, bullet.y)?;
    }

    write_bytes(w, &frame.creep_map)?;
    write_i32(w, frame.width)?;
    write_i32(w, frame.height)?;
    write_i32(w, frame.reward)?;
    write_u8(w, frame.is_terminal as u8)
}

/// Deserialize one frame in the replay layout.
pub fn read_frame(r: &mut dyn Read) -> Result<Frame> {
    let mut frame = Frame::default();

    let player_count = checked_len(r, "unit player table")?;
    for _ in 0..player_count {
        let pid = read_i32(r)?;
        let unit_count = checked_len(r, "unit list")?;
        let mut units = Vec::with_capacity(unit_count as usize);
        for _ in 0..unit_count {
            units.push(read_unit(r)?);
        }
        frame.units.insert(pid, units);
    }

    let player_count = checked_len(r, "action player table")?;
    for _ in 0..player_count {
        let pid = read_i32(r)?;
        let action_count = checked_len(r, "action list")?;
        let mut actions = Vec::with_capacity(action_count as usize);
        for _ in 0..action_count {
            let uid = read_i32(r)?;
            let aid = read_i32(r)?;
            let arg_count = checked_len(r, "action args")?;
            let mut args = Vec::with_capacity(arg_count as usize);
            for _ in 0..arg_count {
                args.push(read_i32(r)?);
            }
            actions.push(Action { uid, aid, args });
        }
        frame.actions.insert(pid, actions);
    }

    let player_count = checked_len(r, "resource table")?;
    for _ in 0..player_count {
        let pid = read_i32(r)?;
        let res = Resources {
            ore: read_i32(r)?,
            gas: read_i32(r)?,
            used_psi: read_i32(r)?,
            total_psi: read_i32(r)?,
            upgrades: read_u64(r)?,
            upgrades_level: read_u64(r)?,
            techs: read_u64(r)?,
        };
        frame.resources.insert(pid, res);
    }

    let bullet_count = checked_len(r, "bullet list")?;
    let mut bullets = Vec::with_capacity(bullet_count as usize);
    for _ in 0..bullet_count {
        bullets.push(Bullet {
            kind: read_i32(r)?,
            x: read_i32(r)?,
            y: read_i32(r)?,
        });
    }
    frame.bullets = bullets;

    frame.creep_map = read_bytes(r)?;
    frame.width = read_i32(r)?;
    frame.height = read_i32(r)?;
    if !(0..=MAX_DIMENSION).contains(&frame.width) || !(0..=MAX_DIMENSION).contains(&frame.height) {
        return Err(StateError::Corrupt {
            detail: format!("absurd frame dimensions {}x{}", frame.width, frame.height),
        });
    }
    frame.reward = read_i32(r)?;
    frame.is_terminal = read_u8(r)? != 0;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::unit::flags;

    fn sample_frame(tick: i32) -> Frame {
        let mut frame = Frame::with_dimensions(16, 16);
        let mut unit = Unit::with_id(tick);
        unit.health = 40 + tick;
        unit.flags = flags::COMPLETED;
        unit.velocity_x = 0.25 * tick as f64;
        unit.orders.push(Order {
            first_frame: tick,
            kind: 6,
            target_id: -1,
            target_x: 3,
            target_y: 4,
        });
        frame.units.insert(0, vec![unit]);
        frame.resources.insert(
            0,
            Resources {
                ore: 100 * tick,
                ..Resources::default()
            },
        );
        frame.actions.insert(
            0,
            vec![Action {
                uid: tick,
                aid: 2,
                args: vec![1, 2, 3],
            }],
        );
        frame.bullets.push(Bullet {
            kind: 1,
            x: tick,
            y: tick,
        });
        frame.set_creep(1, 1, true);
        frame.reward = tick;
        frame
    }

    #[test]
    fn frame_codec_roundtrip() {
        let frame = sample_frame(3);
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).unwrap();

        let mut cursor = Cursor::new(buf);
        let rebuilt = read_frame(&mut cursor).unwrap();
        assert_eq!(rebuilt, frame);
    }

    #[test]
    fn replay_stream_roundtrip() {
        let mut replayer = Replayer::new();
        replayer.set_map(16, 16, vec![0xAA; 32]);
        for tick in 1..=3 {
            replayer.push(sample_frame(tick));
        }

        let mut buf = Vec::new();
        replayer.write_to(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let rebuilt = Replayer::read_from(&mut cursor).unwrap();

        assert_eq!(rebuilt.len(), 3);
        assert_eq!(rebuilt.map_width(), 16);
        assert_eq!(rebuilt.map_height(), 16);
        assert_eq!(rebuilt.map_creep(), &[0xAA; 32][..]);
        assert_eq!(rebuilt.max_units(0), 1);
        for tick in 1..=3usize {
            assert_eq!(
                *rebuilt.frame(tick - 1).unwrap(),
                *replayer.frame(tick - 1).unwrap()
            );
        }
    }

    #[test]
    fn shared_frames_outlive_replayer() {
        let mut replayer = Replayer::new();
        replayer.push(sample_frame(1));
        let handle = replayer.frame(0).unwrap();
        drop(replayer);
        assert_eq!(handle.reward, 1);
    }

    #[test]
    fn absurd_frame_count_fails_fast() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 16).unwrap(); // height
        write_i32(&mut buf, 16).unwrap(); // width
        write_bytes(&mut buf, &[0u8; 4]).unwrap();
        write_u32(&mut buf, u32::MAX).unwrap(); // frame count

        let mut cursor = Cursor::new(buf);
        let err = Replayer::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
    }

    #[test]
    fn negative_dimension_fails_fast() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -5).unwrap(); // height
        write_i32(&mut buf, 16).unwrap(); // width

        let mut cursor = Cursor::new(buf);
        let err = Replayer::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
    }

    #[test]
    fn truncated_stream_is_an_io_error() {
        let frame = sample_frame(1);
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).unwrap();
        buf.truncate(buf.len() / 2);

        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(matches!(err, StateError::Io(_)));
    }

    #[test]
    fn absurd_array_length_fails_before_allocation() {
        let mut buf = Vec::new();
        write_u32(&mut buf, u32::MAX).unwrap(); // player count

        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
    }
}
