use std::collections::HashSet;

use broodlink_state::{undiff, Frame, PlayerId, UnitId};
use broodlink_wire::{decode_image, ImagePayload, Message};
use tracing::warn;

use crate::error::{Result, SessionError};

/// Consumer-side mirror of the handshake facts and the live [`Frame`].
///
/// Each inbound message applies exactly one kind of update; [`update`]
/// returns the logical field names that changed so a caller can re-read only
/// fresh data.
///
/// [`update`]: StateView::update
#[derive(Debug, Default)]
pub struct StateView {
    pub lag_frames: i32,
    pub map_data: Vec<u8>,
    pub map_name: String,
    pub is_replay: bool,
    pub player_id: PlayerId,
    pub neutral_id: PlayerId,

    pub frame: Frame,
    pub deaths: Vec<i32>,
    pub frame_from_bwapi: i32,
    pub battle_frame_count: i32,
    pub image: Option<ImagePayload>,

    pub game_ended: bool,
    pub game_won: bool,
    pub last_player_left: Option<String>,
    pub last_error: Option<String>,

    considered_types: Option<HashSet<i32>>,
    battle_active: bool,
    battle_just_ended: bool,
}

impl StateView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict battle-end detection to an allowlist of unit types.
    pub fn set_considered_types(&mut self, types: Option<Vec<i32>>) {
        self.considered_types = types.map(|list| list.into_iter().collect());
    }

    /// One-shot battle-end signal.
    ///
    /// True only on the update where one side's considered-unit set emptied;
    /// cleared again on the very next update.
    pub fn battle_just_ended(&self) -> bool {
        self.battle_just_ended
    }

    /// Apply one inbound message; returns the names of changed fields.
    pub fn update(&mut self, message: &Message) -> Result<Vec<&'static str>> {
        // One-shot: whatever this update does, the previous signal expires.
        self.battle_just_ended = false;

        match message {
            Message::HandshakeServer {
                lag_frames,
                map_data,
                map_name,
                is_replay,
                player_id,
                neutral_id,
                battle_frame_count,
            } => {
                self.lag_frames = *lag_frames;
                self.map_data = map_data.clone();
                self.map_name = map_name.clone();
                self.is_replay = *is_replay;
                self.player_id = *player_id;
                self.neutral_id = *neutral_id;
                self.battle_active = false;
                let mut changed = vec![
                    "lag_frames",
                    "map_data",
                    "map_name",
                    "is_replay",
                    "player_id",
                    "neutral_id",
                ];
                if let Some(count) = battle_frame_count {
                    self.battle_frame_count = *count;
                    changed.push("battle_frame_count");
                }
                Ok(changed)
            }

            Message::Frame {
                frame,
                deaths,
                frame_from_bwapi,
                battle_frame_count,
                image,
            } => {
                self.frame = frame.clone();
                self.apply_frame_extras(deaths, *frame_from_bwapi, *battle_frame_count, image)
            }

            Message::FrameDiff {
                diff,
                deaths,
                frame_from_bwapi,
                battle_frame_count,
                image,
            } => {
                self.frame = undiff(&self.frame, diff)?;
                self.apply_frame_extras(deaths, *frame_from_bwapi, *battle_frame_count, image)
            }

            Message::EndGame { frame, game_won } => {
                self.frame = frame.clone();
                self.game_ended = true;
                self.game_won = *game_won;
                self.update_battle();
                Ok(vec!["frame", "game_ended", "game_won"])
            }

            Message::PlayerLeft { player_left } => {
                self.last_player_left = Some(player_left.clone());
                Ok(vec!["player_left"])
            }

            Message::Error { message } => {
                warn!(%message, "peer reported error");
                self.last_error = Some(message.clone());
                Ok(vec!["error"])
            }

            other @ (Message::HandshakeClient { .. } | Message::Commands { .. }) => {
                Err(SessionError::UnexpectedMessage(other.kind()))
            }
        }
    }

    fn apply_frame_extras(
        &mut self,
        deaths: &[i32],
        frame_from_bwapi: i32,
        battle_frame_count: i32,
        image: &Option<Vec<u8>>,
    ) -> Result<Vec<&'static str>> {
        self.deaths = deaths.to_vec();
        self.frame_from_bwapi = frame_from_bwapi;
        self.battle_frame_count = battle_frame_count;
        let mut changed = vec!["frame", "deaths", "frame_from_bwapi", "battle_frame_count"];
        if let Some(bytes) = image {
            self.image = Some(decode_image(bytes)?);
            changed.push("image");
        }
        self.update_battle();
        Ok(changed)
    }

    fn considered(&self, unit_type: i32) -> bool {
        self.considered_types
            .as_ref()
            .map_or(true, |types| types.contains(&unit_type))
    }

    /// Ids of the local side's considered units in the current frame.
    pub fn my_alive_units(&self) -> HashSet<UnitId> {
        self.side_units(|pid| pid == self.player_id)
    }

    /// Ids of the opposing side's considered units (neutral excluded).
    pub fn enemy_alive_units(&self) -> HashSet<UnitId> {
        self.side_units(|pid| pid != self.player_id && pid != self.neutral_id)
    }

    fn side_units(&self, owner: impl Fn(PlayerId) -> bool) -> HashSet<UnitId> {
        self.frame
            .units
            .iter()
            .filter(|(pid, _)| owner(**pid))
            .flat_map(|(_, units)| units.iter())
            .filter(|unit| self.considered(unit.unit_type))
            .map(|unit| unit.id)
            .collect()
    }

    fn update_battle(&mut self) {
        let mine = !self.my_alive_units().is_empty();
        let theirs = !self.enemy_alive_units().is_empty();

        if self.battle_active {
            if mine != theirs {
                self.battle_just_ended = true;
                self.battle_active = false;
            }
        } else if mine && theirs {
            self.battle_active = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use broodlink_state::{diff, Resources, Unit};

    use super::*;

    fn handshake() -> Message {
        Message::HandshakeServer {
            lag_frames: 2,
            map_data: vec![1, 2, 3],
            map_name: "maps/micro.scm".to_string(),
            is_replay: false,
            player_id: 0,
            neutral_id: 11,
            battle_frame_count: Some(0),
        }
    }

    fn frame_with_sides(my: &[UnitId], enemy: &[UnitId]) -> Frame {
        let mut frame = Frame::with_dimensions(8, 8);
        frame
            .units
            .insert(0, my.iter().map(|&id| Unit::with_id(id)).collect());
        frame
            .units
            .insert(1, enemy.iter().map(|&id| Unit::with_id(id)).collect());
        frame
    }

    fn frame_message(frame: Frame) -> Message {
        Message::Frame {
            frame,
            deaths: Vec::new(),
            frame_from_bwapi: 0,
            battle_frame_count: 0,
            image: None,
        }
    }

    #[test]
    fn handshake_reports_changed_fields() {
        let mut view = StateView::new();
        let changed = view.update(&handshake()).unwrap();
        assert!(changed.contains(&"lag_frames"));
        assert!(changed.contains(&"map_data"));
        assert!(changed.contains(&"battle_frame_count"));
        assert_eq!(view.player_id, 0);
        assert_eq!(view.neutral_id, 11);
        assert_eq!(view.map_data, vec![1, 2, 3]);
    }

    #[test]
    fn diff_update_reconstructs_frame() {
        let mut view = StateView::new();
        view.update(&handshake()).unwrap();

        let first = frame_with_sides(&[1, 2], &[10]);
        view.update(&frame_message(first.clone())).unwrap();

        let mut second = first.clone();
        second.units.get_mut(&0).unwrap()[0].health = 35;
        second.units.get_mut(&0).unwrap()[0].x = 17;
        let delta = diff(&second, &first).unwrap();

        let changed = view
            .update(&Message::FrameDiff {
                diff: delta,
                deaths: vec![99],
                frame_from_bwapi: 8,
                battle_frame_count: 1,
                image: None,
            })
            .unwrap();

        assert!(changed.contains(&"frame"));
        assert_eq!(view.frame, second);
        assert_eq!(view.deaths, vec![99]);
        assert_eq!(view.frame_from_bwapi, 8);
    }

    #[test]
    fn battle_end_is_one_shot() {
        let mut view = StateView::new();
        view.update(&handshake()).unwrap();

        // Step N: both sides alive — battle starts, no signal.
        view.update(&frame_message(frame_with_sides(&[1, 2], &[10])))
            .unwrap();
        assert!(!view.battle_just_ended());

        // Step N+1: enemy side emptied — signal fires exactly now.
        view.update(&frame_message(frame_with_sides(&[1, 2], &[])))
            .unwrap();
        assert!(view.battle_just_ended());

        // Step N+2: unchanged world — signal cleared.
        view.update(&frame_message(frame_with_sides(&[1, 2], &[])))
            .unwrap();
        assert!(!view.battle_just_ended());
    }

    #[test]
    fn considered_types_restrict_battle_detection() {
        let mut view = StateView::new();
        view.update(&handshake()).unwrap();
        view.set_considered_types(Some(vec![37]));

        let mut frame = frame_with_sides(&[], &[]);
        let mut marine = Unit::with_id(1);
        marine.unit_type = 37;
        let mut building = Unit::with_id(2);
        building.unit_type = 106;
        frame.units.insert(0, vec![marine]);
        let mut enemy = Unit::with_id(10);
        enemy.unit_type = 37;
        frame.units.insert(1, vec![enemy, building]);

        view.update(&frame_message(frame)).unwrap();
        assert_eq!(view.my_alive_units().len(), 1);
        assert_eq!(view.enemy_alive_units().len(), 1);

        // Only the enemy building survives; its type is not considered, so
        // the enemy set counts as empty and the battle ends.
        let mut after = frame_with_sides(&[], &[]);
        let mut marine = Unit::with_id(1);
        marine.unit_type = 37;
        after.units.insert(0, vec![marine]);
        let mut building = Unit::with_id(2);
        building.unit_type = 106;
        after.units.insert(1, vec![building]);

        view.update(&frame_message(after)).unwrap();
        assert!(view.battle_just_ended());
    }

    #[test]
    fn resources_follow_frame_updates() {
        let mut view = StateView::new();
        view.update(&handshake()).unwrap();

        let mut frame = frame_with_sides(&[1], &[10]);
        frame.resources.insert(
            0,
            Resources {
                ore: 400,
                gas: 150,
                used_psi: 12,
                total_psi: 20,
                upgrades: 0b1010,
                upgrades_level: 0,
                techs: 0b1,
            },
        );
        view.update(&frame_message(frame.clone())).unwrap();
        assert_eq!(view.frame.resources[&0].ore, 400);
        assert_eq!(view.frame.resources[&0].upgrades, 0b1010);
    }

    #[test]
    fn commands_are_not_a_consumer_message() {
        let mut view = StateView::new();
        let err = view.update(&Message::empty_commands()).unwrap_err();
        assert!(matches!(err, SessionError::UnexpectedMessage("commands")));
    }

    #[test]
    fn end_game_updates_outcome() {
        let mut view = StateView::new();
        view.update(&handshake()).unwrap();
        let changed = view
            .update(&Message::EndGame {
                frame: frame_with_sides(&[1], &[]),
                game_won: true,
            })
            .unwrap();
        assert!(changed.contains(&"game_ended"));
        assert!(view.game_ended);
        assert!(view.game_won);
    }
}
