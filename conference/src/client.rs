//! `ConferenceClient`: the session state machine, event normalization, and
//! pose-sync handshake described in spec.md §4.6.

use std::collections::HashMap;

use pose::{Pose, Vector3};
use room_core::{Error, PeerId};
use serde_json::json;

use crate::backend::{BackendEvent, ConferenceBackend, ConferenceOptions, TrackKind};
use crate::events::{ConferenceEvent, Emoji, TrackHandle};
use crate::protocol::AppFrame;

/// Budget for the mid-session pose handshake (spec.md §4.6).
pub const INIT_RESPONSE_BUDGET_SECONDS: f64 = 1.0;
/// Resend cadence for an outstanding `userInitRequest`.
pub const INIT_RESPONSE_RETRY_INTERVAL_SECONDS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    InConference,
    Disconnecting,
}

#[derive(Debug, Clone)]
struct ParticipantState {
    display_name: String,
    pose: Pose,
}

impl Default for ParticipantState {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            pose: Pose::identity(),
        }
    }
}

struct PendingInit {
    last_sent: f64,
    deadline: f64,
}

/// Wraps a [`ConferenceBackend`] and turns its events into the fixed
/// `ConferenceEvent` set, layering the app-level pose-sync handshake and
/// device-selection discipline on top of it.
pub struct ConferenceClient<B: ConferenceBackend> {
    backend: B,
    state: SessionState,
    local_id: PeerId,
    room_name: String,
    display_name: String,
    joined: bool,
    participants: HashMap<PeerId, ParticipantState>,
    pending_init: HashMap<PeerId, PendingInit>,
    local_pose: Pose,
    broadcast_pose: Pose,
    preferred_audio_input: Option<String>,
    preferred_audio_output: Option<String>,
    preferred_video_input: Option<String>,
    local_audio_track: Option<TrackHandle>,
    local_video_track: Option<TrackHandle>,
    local_audio_muted: bool,
    local_video_muted: bool,
    pending_local_events: Vec<ConferenceEvent>,
    pending_init_responses_to_send: Vec<PeerId>,
}

enum PoseDelta {
    Position,
    Orientation,
    Full,
}

fn pose_delta(old: &Pose, new: &Pose) -> Option<PoseDelta> {
    let position_changed = old.p != new.p;
    let orientation_changed = old.f != new.f || old.u != new.u;
    match (position_changed, orientation_changed) {
        (false, false) => None,
        (true, false) => Some(PoseDelta::Position),
        (false, true) => Some(PoseDelta::Orientation),
        (true, true) => Some(PoseDelta::Full),
    }
}

impl<B: ConferenceBackend> ConferenceClient<B> {
    pub fn new(backend: B, local_id: PeerId, display_name: impl Into<String>) -> Self {
        Self {
            backend,
            state: SessionState::Idle,
            local_id,
            room_name: String::new(),
            display_name: display_name.into(),
            joined: false,
            participants: HashMap::new(),
            pending_init: HashMap::new(),
            local_pose: Pose::identity(),
            broadcast_pose: Pose::identity(),
            preferred_audio_input: None,
            preferred_audio_output: None,
            preferred_video_input: None,
            local_audio_track: None,
            local_video_track: None,
            local_audio_muted: false,
            local_video_muted: false,
            pending_local_events: Vec::new(),
            pending_init_responses_to_send: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn local_pose(&self) -> Pose {
        self.local_pose
    }

    /// Records the local user's new pose. The actual `userMoved` /
    /// `userTurned` / `userPosed` broadcast is sent lazily on the next
    /// `update()`, after the caller has applied this pose to its own
    /// listener (spec.md §5 ordering guarantee).
    pub fn set_local_pose(&mut self, pose: Pose) {
        self.local_pose = pose;
    }

    /// Tears down any prior conference, then begins connecting to a new
    /// one. Mirrors spec.md §4.6: "teardown any prior conference; create a
    /// connection". The Connecting -> Connected -> InConference
    /// transitions happen as `update()` drains backend events.
    pub async fn join(
        &mut self,
        room_name: &str,
        user_name: &str,
        opts: ConferenceOptions,
    ) -> Result<(), Error> {
        if self.state != SessionState::Idle {
            self.leave().await?;
        }
        self.room_name = room_name.to_string();
        self.display_name = user_name.to_string();
        self.participants.clear();
        self.pending_init.clear();
        self.state = SessionState::Connecting;
        self.backend.connect().await?;
        self.backend.create_conference(room_name, opts).await?;
        Ok(())
    }

    /// Removes local tracks, leaves the conference, disconnects, and
    /// resets all per-user state.
    pub async fn leave(&mut self) -> Result<(), Error> {
        self.state = SessionState::Disconnecting;
        if let Some(track) = self.local_audio_track.take() {
            let _ = self.backend.remove_track(&track).await;
        }
        if let Some(track) = self.local_video_track.take() {
            let _ = self.backend.remove_track(&track).await;
        }
        let _ = self.backend.leave().await;
        self.reset_to_idle();
        Ok(())
    }

    fn reset_to_idle(&mut self) {
        self.state = SessionState::Idle;
        self.joined = false;
        self.participants.clear();
        self.pending_init.clear();
        self.local_audio_track = None;
        self.local_video_track = None;
    }

    /// Drains backend events, advances the pose handshake, and broadcasts
    /// any pending local pose change. Called once per tick (spec.md §4.7,
    /// step 3). `t` is the caller's audio/session clock.
    pub async fn update(&mut self, t: f64) -> Result<Vec<ConferenceEvent>, Error> {
        let mut events: Vec<ConferenceEvent> = self.pending_local_events.drain(..).collect();

        while let Some(event) = self.backend.poll_event().await {
            self.handle_backend_event(event, t, &mut events).await?;
        }

        self.retry_pending_init(t).await;
        self.broadcast_pose_if_changed().await;

        Ok(events)
    }

    async fn handle_backend_event(
        &mut self,
        event: BackendEvent,
        t: f64,
        events: &mut Vec<ConferenceEvent>,
    ) -> Result<(), Error> {
        match event {
            BackendEvent::Established => {
                self.state = SessionState::Connected;
                self.backend.join().await?;
            }
            BackendEvent::ConferenceJoined => {
                self.state = SessionState::InConference;
                self.joined = true;
                self.backend.set_display_name(&self.display_name).await?;
                events.push(ConferenceEvent::VideoConferenceJoined {
                    id: self.local_id,
                    room_name: self.room_name.clone(),
                    display_name: self.display_name.clone(),
                    pose: self.local_pose,
                });
            }
            BackendEvent::ConferenceLeft => {
                events.push(ConferenceEvent::VideoConferenceLeft {
                    room_name: self.room_name.clone(),
                });
                self.reset_to_idle();
            }
            BackendEvent::Failed(_) | BackendEvent::Disconnected(_) | BackendEvent::ConnectionInterrupted => {
                events.push(ConferenceEvent::VideoConferenceLeft {
                    room_name: self.room_name.clone(),
                });
                self.reset_to_idle();
            }
            BackendEvent::UserJoined(id) => {
                self.participants.insert(id, ParticipantState::default());
                events.push(ConferenceEvent::ParticipantJoined {
                    id,
                    display_name: String::new(),
                    pose: Pose::identity(),
                });
                self.send_init_request(id, t).await;
            }
            BackendEvent::UserLeft(id) => {
                self.participants.remove(&id);
                self.pending_init.remove(&id);
                events.push(ConferenceEvent::ParticipantLeft { id });
            }
            BackendEvent::DisplayNameChanged(id, name) => {
                if let Some(p) = self.participants.get_mut(&id) {
                    p.display_name = name.clone();
                }
                events.push(ConferenceEvent::DisplayNameChange {
                    id,
                    display_name: name,
                });
            }
            BackendEvent::TrackAdded(id, kind, handle) => {
                events.push(match kind {
                    TrackKind::Audio => ConferenceEvent::AudioAdded { id, stream: handle },
                    TrackKind::Video => ConferenceEvent::VideoAdded { id, stream: handle },
                });
            }
            BackendEvent::TrackRemoved(id, kind, handle) => {
                events.push(match kind {
                    TrackKind::Audio => ConferenceEvent::AudioRemoved { id, stream: handle },
                    TrackKind::Video => ConferenceEvent::VideoRemoved { id, stream: handle },
                });
            }
            BackendEvent::TrackMuteChanged(id, kind, _handle, muted) => {
                events.push(match kind {
                    TrackKind::Audio => ConferenceEvent::AudioMuteStatusChanged { id, muted },
                    TrackKind::Video => ConferenceEvent::VideoMuteStatusChanged { id, muted },
                });
            }
            BackendEvent::EndpointMessageReceived(from, data) => {
                self.handle_app_frame(from, &data, t, events);
            }
        }
        Ok(())
    }

    fn handle_app_frame(
        &mut self,
        from: PeerId,
        data: &[u8],
        t: f64,
        events: &mut Vec<ConferenceEvent>,
    ) {
        let frame = match AppFrame::decode(data) {
            Ok(Some(frame)) => frame,
            // Fingerprint mismatch or malformed payload: silently discard
            // per the failure taxonomy (spec.md §7, kind 5).
            _ => return,
        };
        match frame.command.as_str() {
            "userMoved" => {
                if let (Some(x), Some(y), Some(z)) = (
                    frame.value.get("x").and_then(|v| v.as_f64()),
                    frame.value.get("y").and_then(|v| v.as_f64()),
                    frame.value.get("z").and_then(|v| v.as_f64()),
                ) {
                    let position = Vector3::new(x, y, z);
                    if let Some(p) = self.participants.get_mut(&from) {
                        p.pose.p = position;
                    }
                    events.push(ConferenceEvent::UserMoved { id: from, position });
                }
            }
            "userTurned" => {
                if let Some(v) = read_basis(&frame.value) {
                    let (forward, up) = v;
                    if let Some(p) = self.participants.get_mut(&from) {
                        p.pose.f = forward;
                        p.pose.u = up;
                    }
                    events.push(ConferenceEvent::UserTurned { id: from, forward, up });
                }
            }
            "userPosed" => {
                if let Some(pose) = read_pose(&frame.value) {
                    if let Some(p) = self.participants.get_mut(&from) {
                        p.pose = pose;
                    }
                    events.push(ConferenceEvent::UserPosed { id: from, pose });
                }
            }
            "userInitRequest" => {
                events.push(ConferenceEvent::UserInitRequest { id: from });
                self.queue_init_response(from);
            }
            "userInitResponse" => {
                if let Some(pose) = read_pose(&frame.value) {
                    self.pending_init.remove(&from);
                    if let Some(p) = self.participants.get_mut(&from) {
                        p.pose = pose;
                    }
                    let avatar_url = frame
                        .value
                        .get("avatarUrl")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    let emoji = match (
                        frame.value.get("emojiValue").and_then(|v| v.as_str()),
                        frame.value.get("emojiDesc").and_then(|v| v.as_str()),
                    ) {
                        (Some(value), Some(desc)) => Some(Emoji {
                            value: value.to_string(),
                            desc: desc.to_string(),
                        }),
                        _ => None,
                    };
                    events.push(ConferenceEvent::UserInitResponse {
                        id: from,
                        pose,
                        avatar_url,
                        emoji,
                    });
                }
            }
            "emote" => {
                if let (Some(value), Some(desc)) = (
                    frame.value.get("value").and_then(|v| v.as_str()),
                    frame.value.get("desc").and_then(|v| v.as_str()),
                ) {
                    events.push(ConferenceEvent::Emote {
                        id: from,
                        value: value.to_string(),
                        desc: desc.to_string(),
                    });
                }
            }
            "avatarChanged" => {
                if let Some(url) = frame.value.get("url").and_then(|v| v.as_str()) {
                    events.push(ConferenceEvent::AvatarChanged {
                        id: from,
                        url: url.to_string(),
                    });
                }
            }
            "setAvatarEmoji" => {
                if let (Some(value), Some(desc)) = (
                    frame.value.get("value").and_then(|v| v.as_str()),
                    frame.value.get("desc").and_then(|v| v.as_str()),
                ) {
                    events.push(ConferenceEvent::SetAvatarEmoji {
                        id: from,
                        value: value.to_string(),
                        desc: desc.to_string(),
                    });
                }
            }
            _ => {}
        }
        let _ = t; // reserved: future commands may need the session clock
    }

    /// Queues a `userInitResponse` reply; actually sent from `update()`'s
    /// next pass via `pending_local_events` is not appropriate here since
    /// sending requires `&mut self.backend` which `handle_app_frame` can't
    /// borrow mutably while also borrowing `self.participants`. Instead we
    /// stash the target and flush it eagerly on the next `update()` tick.
    fn queue_init_response(&mut self, to: PeerId) {
        self.pending_init_responses_to_send.push(to);
    }

    async fn send_init_request(&mut self, to: PeerId, t: f64) {
        self.pending_init.insert(
            to,
            PendingInit {
                last_sent: t,
                deadline: t + INIT_RESPONSE_BUDGET_SECONDS,
            },
        );
        let frame = AppFrame::new("userInitRequest", json!({}));
        if let Ok(bytes) = frame.encode() {
            let _ = self.backend.send_message(to, bytes).await;
        }
    }

    async fn retry_pending_init(&mut self, t: f64) {
        let expired: Vec<PeerId> = self
            .pending_init
            .iter()
            .filter(|(_, pending)| t >= pending.deadline)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.pending_init.remove(&id);
        }

        let due: Vec<PeerId> = self
            .pending_init
            .iter()
            .filter(|(_, pending)| t - pending.last_sent >= INIT_RESPONSE_RETRY_INTERVAL_SECONDS)
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            let frame = AppFrame::new("userInitRequest", json!({}));
            if let Ok(bytes) = frame.encode() {
                let _ = self.backend.send_message(id, bytes).await;
            }
            if let Some(pending) = self.pending_init.get_mut(&id) {
                pending.last_sent = t;
            }
        }

        let to_reply: Vec<PeerId> = self.pending_init_responses_to_send.drain(..).collect();
        for id in to_reply {
            let frame = AppFrame::new("userInitResponse", pose_to_json(&self.local_pose));
            if let Ok(bytes) = frame.encode() {
                let _ = self.backend.send_message(id, bytes).await;
            }
        }
    }

    async fn broadcast_pose_if_changed(&mut self) {
        let Some(delta) = pose_delta(&self.broadcast_pose, &self.local_pose) else {
            return;
        };
        let command = match delta {
            PoseDelta::Position => "userMoved",
            PoseDelta::Orientation => "userTurned",
            PoseDelta::Full => "userPosed",
        };
        let value = match delta {
            PoseDelta::Position => json!({
                "x": self.local_pose.p.x, "y": self.local_pose.p.y, "z": self.local_pose.p.z,
            }),
            PoseDelta::Orientation => json!({
                "fx": self.local_pose.f.x, "fy": self.local_pose.f.y, "fz": self.local_pose.f.z,
                "ux": self.local_pose.u.x, "uy": self.local_pose.u.y, "uz": self.local_pose.u.z,
            }),
            PoseDelta::Full => pose_to_json(&self.local_pose),
        };
        self.broadcast_pose = self.local_pose;

        let frame = AppFrame::new(command, value);
        let Ok(bytes) = frame.encode() else { return };
        let recipients: Vec<PeerId> = self.participants.keys().copied().collect();
        for id in recipients {
            let _ = self.backend.send_message(id, bytes.clone()).await;
        }
    }

    /// Idempotent: only acts (and only emits an event) if the mute state
    /// actually differs from the requested one (spec.md §8 testable
    /// property 4).
    pub async fn set_audio_muted_async(&mut self, muted: bool) -> Result<(), Error> {
        if muted == self.local_audio_muted {
            return Ok(());
        }
        if let Some(handle) = self.local_audio_track.clone() {
            if muted {
                self.backend.mute_track(&handle).await?;
            } else {
                self.backend.unmute_track(&handle).await?;
            }
        }
        self.local_audio_muted = muted;
        self.pending_local_events
            .push(ConferenceEvent::LocalAudioMuteStatusChanged {
                id: self.local_id,
                muted,
            });
        Ok(())
    }

    /// "Unmuting" with no existing local track is interpreted as "select
    /// the given device and start capture" (spec.md §4.6 mute semantics).
    pub async fn toggle_audio_muted(&mut self, fallback_device_id: Option<&str>) -> Result<(), Error> {
        if self.local_audio_track.is_none() && self.local_audio_muted {
            if let Some(device_id) = fallback_device_id {
                self.set_audio_input_device_async(device_id).await?;
            }
        }
        let next = !self.local_audio_muted;
        self.set_audio_muted_async(next).await
    }

    /// Replaces the local audio track, constrained to `device_id`.
    /// `add_track`'s contract is to not return until the backend confirms
    /// the track is live, which stands in for spec.md's "wait via the
    /// track-added event for confirmation before returning".
    pub async fn set_audio_input_device_async(&mut self, device_id: &str) -> Result<(), Error> {
        if let Some(old) = self.local_audio_track.take() {
            self.backend.remove_track(&old).await?;
        }
        let handle = self.backend.add_track(TrackKind::Audio, Some(device_id)).await?;
        self.local_audio_track = Some(handle);
        self.preferred_audio_input = Some(device_id.to_string());
        Ok(())
    }

    pub fn preferred_audio_input(&self) -> Option<&str> {
        self.preferred_audio_input.as_deref()
    }

    pub fn set_preferred_audio_output(&mut self, device_id: Option<String>) {
        self.preferred_audio_output = device_id;
    }

    pub fn preferred_audio_output(&self) -> Option<&str> {
        self.preferred_audio_output.as_deref()
    }

    pub fn set_preferred_video_input(&mut self, device_id: Option<String>) {
        self.preferred_video_input = device_id;
    }
}

/// Picks the best device id out of `available`, given a preference and
/// whether picking "any" device is acceptable (spec.md §4.6
/// `setPreferredAudioInputAsync`): exact preferred match, then
/// `"communications"`, then `"default"`, then (only if `allow_any`) the
/// first available device.
pub fn select_preferred_device(
    preferred: Option<&str>,
    available: &[String],
    allow_any: bool,
) -> Option<String> {
    if let Some(preferred) = preferred {
        if available.iter().any(|d| d == preferred) {
            return Some(preferred.to_string());
        }
    }
    for special in ["communications", "default"] {
        if available.iter().any(|d| d == special) {
            return Some(special.to_string());
        }
    }
    if allow_any {
        available.first().cloned()
    } else {
        None
    }
}

fn read_basis(value: &serde_json::Value) -> Option<(Vector3, Vector3)> {
    let fx = value.get("fx")?.as_f64()?;
    let fy = value.get("fy")?.as_f64()?;
    let fz = value.get("fz")?.as_f64()?;
    let ux = value.get("ux")?.as_f64()?;
    let uy = value.get("uy")?.as_f64()?;
    let uz = value.get("uz")?.as_f64()?;
    Some((Vector3::new(fx, fy, fz), Vector3::new(ux, uy, uz)))
}

fn read_pose(value: &serde_json::Value) -> Option<Pose> {
    let px = value.get("px")?.as_f64()?;
    let py = value.get("py")?.as_f64()?;
    let pz = value.get("pz")?.as_f64()?;
    let (f, u) = read_basis(value)?;
    Some(Pose::new(0.0, Vector3::new(px, py, pz), f, u))
}

fn pose_to_json(pose: &Pose) -> serde_json::Value {
    json!({
        "px": pose.p.x, "py": pose.p.y, "pz": pose.p.z,
        "fx": pose.f.x, "fy": pose.f.y, "fz": pose.f.z,
        "ux": pose.u.x, "uy": pose.u.y, "uz": pose.u.z,
    })
}
