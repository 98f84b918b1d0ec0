//! The `ConferenceBackend` contract `ConferenceClient` consumes (spec.md
//! §6.1). The spec treats the SFU as an opaque collaborator; this trait is
//! that seam. [`crate::mesh::MeshBackend`] is the reference implementation
//! built from `network` + `room` + `crypto`; tests exercise
//! [`ConferenceClient`](crate::client::ConferenceClient) against a small
//! in-memory double instead.

use std::net::SocketAddr;

use async_trait::async_trait;
use room_core::{Error, PeerId};

use crate::events::TrackHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Options passed to `create_conference`, mirroring spec.md §6.1's
/// `createConference(roomName, opts)`. The reference mesh backend has no
/// central signaling server, so `opts` is where a joiner supplies the
/// host's address; a host omits it.
#[derive(Debug, Clone, Default)]
pub struct ConferenceOptions {
    pub remote_address: Option<SocketAddr>,
}

/// Events a `ConferenceBackend` raises, named after spec.md §6.1's list
/// (`CONFERENCE_JOINED`, `USER_JOINED`, ...). `ConferenceClient::update`
/// is the only place these get translated into `ConferenceEvent`.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    Established,
    Failed(String),
    Disconnected(String),
    ConferenceJoined,
    ConferenceLeft,
    UserJoined(PeerId),
    UserLeft(PeerId),
    DisplayNameChanged(PeerId, String),
    TrackAdded(PeerId, TrackKind, TrackHandle),
    TrackRemoved(PeerId, TrackKind, TrackHandle),
    TrackMuteChanged(PeerId, TrackKind, TrackHandle, bool),
    EndpointMessageReceived(PeerId, Vec<u8>),
    ConnectionInterrupted,
}

#[async_trait]
pub trait ConferenceBackend: Send {
    async fn connect(&mut self) -> Result<(), Error>;
    async fn create_conference(
        &mut self,
        room_name: &str,
        opts: ConferenceOptions,
    ) -> Result<(), Error>;
    async fn join(&mut self) -> Result<(), Error>;
    async fn leave(&mut self) -> Result<(), Error>;
    async fn set_display_name(&mut self, name: &str) -> Result<(), Error>;

    /// Creates a local track, constrained to `device_id` when given.
    /// Corresponds to `createLocalTracks` + `addTrack` in spec.md §6.1,
    /// collapsed into one call since this core never holds an
    /// unattached track.
    async fn add_track(
        &mut self,
        kind: TrackKind,
        device_id: Option<&str>,
    ) -> Result<TrackHandle, Error>;
    async fn remove_track(&mut self, handle: &TrackHandle) -> Result<(), Error>;

    /// Mutes/unmutes an already-added local track in place, without
    /// removing it from the conference (spec.md §4.6 mute semantics act on
    /// "the existing local track"; device switching is `add_track`/
    /// `remove_track`'s job, not this one's).
    async fn mute_track(&mut self, handle: &TrackHandle) -> Result<(), Error>;
    async fn unmute_track(&mut self, handle: &TrackHandle) -> Result<(), Error>;

    /// Unicasts an opaque payload to one participant's data channel.
    async fn send_message(&mut self, to: PeerId, data: Vec<u8>) -> Result<(), Error>;

    /// Pulls the next backend event, if any are queued. Never blocks.
    async fn poll_event(&mut self) -> Option<BackendEvent>;
}
