//! The per-tick orchestration spec.md §4.7 calls the "game loop": collates
//! input into a pose update, then drives the conference and audio layers in
//! the fixed order the ordering guarantee requires.

use std::collections::{HashMap, VecDeque};

use conference::{ConferenceBackend, ConferenceClient, ConferenceEvent};
use pose::{InterpolatedPose, Pose, Vector3};
use room_core::{Error, PeerId};

use crate::input::{apply_zoom, IntervalGate, InputState, MOVE_REPEAT_SECONDS, TRANSITION_SPEED_SECONDS};
use crate::pathfind::{find_path, Cell};
use crate::tilemap::TileMap;

fn cell_of(pose: &Pose) -> Cell {
    Cell::new(pose.p.x.round() as i32, pose.p.z.round() as i32)
}

fn pose_at_cell(cell: Cell, t: f64, forward: Vector3, up: Vector3) -> Pose {
    Pose::new(t, Vector3::new(cell.x as f64, 0.0, cell.y as f64), forward, up)
}

pub struct GameLoop {
    map: TileMap,
    local_id: PeerId,
    can_swim: bool,
    allow_diagonal: bool,
    local_pose: InterpolatedPose,
    waypoints: VecDeque<Cell>,
    move_gate: IntervalGate,
    waypoint_gate: IntervalGate,
    zoom: f64,
    zoom_min: f64,
    zoom_max: f64,
    remote_poses: HashMap<PeerId, Pose>,
}

impl GameLoop {
    pub fn new(map: TileMap, local_id: PeerId, initial_pose: Pose) -> Self {
        Self {
            map,
            local_id,
            can_swim: false,
            allow_diagonal: true,
            local_pose: InterpolatedPose::new(initial_pose),
            waypoints: VecDeque::new(),
            move_gate: IntervalGate::new(MOVE_REPEAT_SECONDS),
            waypoint_gate: IntervalGate::new(TRANSITION_SPEED_SECONDS),
            zoom: 1.0,
            zoom_min: 0.25,
            zoom_max: 4.0,
            remote_poses: HashMap::new(),
        }
    }

    pub fn set_can_swim(&mut self, can_swim: bool) {
        self.can_swim = can_swim;
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn local_pose(&self) -> &Pose {
        self.local_pose.current()
    }

    pub fn remote_pose(&self, id: PeerId) -> Option<&Pose> {
        self.remote_poses.get(&id)
    }

    pub fn map(&self) -> &TileMap {
        &self.map
    }

    /// Step (1)+(2) of the ordering guarantee: apply raw input to the local
    /// pose and waypoint queue. Does not touch the network or audio layers.
    fn advance_local(&mut self, input: InputState, t: f64, dt: f64) {
        self.zoom = apply_zoom(self.zoom, input.dzoom, self.zoom_min, self.zoom_max);

        if let Some((gx, gy)) = input.click_target {
            let start = cell_of(self.local_pose.current());
            let goal = Cell::new(gx, gy);
            if let Some(path) = find_path(&self.map, start, goal, self.can_swim, self.allow_diagonal) {
                self.waypoints = path.into_iter().skip(1).collect();
            }
        }

        if let Some(&next) = self.waypoints.front() {
            if self.waypoint_gate.tick(dt) {
                self.waypoints.pop_front();
                let current = *self.local_pose.current();
                let forward = direction_to(&current.p, next);
                let target = pose_at_cell(next, t, forward, current.u);
                self.local_pose.set_target(target, t, TRANSITION_SPEED_SECONDS);
            }
        } else if (input.dx != 0.0 || input.dy != 0.0) && self.move_gate.tick(dt) {
            let current = *self.local_pose.current();
            let next = Cell::new(
                (current.p.x + input.dx.signum()).round() as i32,
                (current.p.z + input.dy.signum()).round() as i32,
            );
            if self.map.is_walkable(next.x, next.y, self.can_swim) {
                let forward = direction_to(&current.p, next);
                let target = pose_at_cell(next, t, forward, current.u);
                self.local_pose.set_target(target, t, TRANSITION_SPEED_SECONDS);
            }
        }

        self.local_pose.update(t);
    }

    /// Runs one full tick: input -> local pose -> conference update -> audio
    /// update. Rendering is the caller's job once this returns; nothing here
    /// mutates state after the audio update, so reading back is always safe.
    pub async fn tick<B: ConferenceBackend>(
        &mut self,
        input: InputState,
        t: f64,
        dt: f64,
        conference: &mut ConferenceClient<B>,
        audio: &mut audio::AudioManager,
    ) -> Result<Vec<ConferenceEvent>, Error> {
        self.advance_local(input, t, dt);

        conference.set_local_pose(*self.local_pose.current());
        let events = conference.update(t).await?;

        for event in &events {
            self.apply_event_to_audio(event, audio);
        }

        audio.update();

        Ok(events)
    }

    fn apply_event_to_audio(&mut self, event: &ConferenceEvent, audio: &mut audio::AudioManager) {
        match event {
            ConferenceEvent::ParticipantJoined { id, pose, .. } if *id != self.local_id => {
                audio.create_user(&id.as_full_string());
                self.remote_poses.insert(*id, *pose);
            }
            ConferenceEvent::ParticipantJoined { .. } => {}
            ConferenceEvent::ParticipantLeft { id } => {
                audio.remove_user(&id.as_full_string());
                self.remote_poses.remove(id);
            }
            ConferenceEvent::UserMoved { id, position } => {
                let _ = audio.set_user_position(&id.as_full_string(), *position, Some(TRANSITION_SPEED_SECONDS));
                if let Some(pose) = self.remote_poses.get_mut(id) {
                    pose.p = *position;
                }
            }
            ConferenceEvent::UserTurned { id, forward, up } => {
                let _ = audio.set_user_orientation(&id.as_full_string(), *forward, *up, Some(TRANSITION_SPEED_SECONDS));
                if let Some(pose) = self.remote_poses.get_mut(id) {
                    pose.f = *forward;
                    pose.u = *up;
                }
            }
            ConferenceEvent::UserPosed { id, pose } => {
                let _ = audio.set_user_pose(&id.as_full_string(), *pose, Some(TRANSITION_SPEED_SECONDS));
                self.remote_poses.insert(*id, *pose);
            }
            ConferenceEvent::UserInitResponse { id, pose, .. } => {
                // The mid-session handshake reply (spec.md §4.6): this is
                // how a joining peer learns the pose of everyone already in
                // the room. Without this arm the pose only lives in
                // `ConferenceClient`'s own bookkeeping and the audio source
                // never moves to match.
                let _ = audio.set_user_pose(&id.as_full_string(), *pose, Some(TRANSITION_SPEED_SECONDS));
                self.remote_poses.insert(*id, *pose);
            }
            ConferenceEvent::VideoConferenceJoined { id, pose, .. } => {
                audio.create_local_user(&id.as_full_string());
                self.remote_poses.insert(*id, *pose);
            }
            _ => {}
        }
    }
}

fn direction_to(from: &Vector3, to: Cell) -> Vector3 {
    let target = Vector3::new(to.x as f64, 0.0, to.y as f64);
    let delta = target.sub(from);
    if delta.length_squared() < 1e-12 {
        Vector3::new(0.0, 0.0, -1.0)
    } else {
        delta.normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tilemap::TileMap;
    use async_trait::async_trait;
    use conference::{BackendEvent, ConferenceOptions, TrackKind};
    use room_core::PeerId;

    struct NullBackend;

    #[async_trait]
    impl ConferenceBackend for NullBackend {
        async fn connect(&mut self) -> Result<(), Error> {
            Ok(())
        }
        async fn create_conference(
            &mut self,
            _room_name: &str,
            _opts: ConferenceOptions,
        ) -> Result<(), Error> {
            Ok(())
        }
        async fn join(&mut self) -> Result<(), Error> {
            Ok(())
        }
        async fn leave(&mut self) -> Result<(), Error> {
            Ok(())
        }
        async fn set_display_name(&mut self, _name: &str) -> Result<(), Error> {
            Ok(())
        }
        async fn add_track(
            &mut self,
            _kind: TrackKind,
            _device_id: Option<&str>,
        ) -> Result<conference::TrackHandle, Error> {
            Ok(conference::TrackHandle::new("mock"))
        }
        async fn remove_track(&mut self, _handle: &conference::TrackHandle) -> Result<(), Error> {
            Ok(())
        }
        async fn mute_track(&mut self, _handle: &conference::TrackHandle) -> Result<(), Error> {
            Ok(())
        }
        async fn unmute_track(&mut self, _handle: &conference::TrackHandle) -> Result<(), Error> {
            Ok(())
        }
        async fn send_message(&mut self, _to: PeerId, _data: Vec<u8>) -> Result<(), Error> {
            Ok(())
        }
        async fn poll_event(&mut self) -> Option<BackendEvent> {
            None
        }
    }

    fn identity_pose() -> Pose {
        Pose::identity()
    }

    #[tokio::test]
    async fn tick_runs_ordering_without_error() {
        let map = TileMap::new(10, 10);
        let local_id = PeerId::new();
        let mut game = GameLoop::new(map, local_id, identity_pose());
        let mut conference = ConferenceClient::new(NullBackend, local_id, "tester");
        let mut audio = audio::AudioManager::new_mock();

        let events = game
            .tick(InputState::default(), 0.0, 0.016, &mut conference, &mut audio)
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn click_to_walk_builds_waypoint_queue() {
        let map = TileMap::new(5, 5);
        let local_id = PeerId::new();
        let mut game = GameLoop::new(map, local_id, identity_pose());
        game.advance_local(
            InputState {
                click_target: Some((3, 0)),
                ..Default::default()
            },
            0.0,
            0.016,
        );
        assert!(!game.waypoints.is_empty());
    }

    #[test]
    fn move_input_is_blocked_by_walls() {
        let map = TileMap::from_ascii(&[".#"]);
        let local_id = PeerId::new();
        let mut game = GameLoop::new(map, local_id, identity_pose());
        game.advance_local(
            InputState {
                dx: 1.0,
                ..Default::default()
            },
            0.0,
            1.0,
        );
        // Start pose is at origin (0,0,0); the tile to the east is a wall.
        assert_eq!(game.local_pose().p.x, 0.0);
    }
}
