//! [`MeshBackend`]: the reference [`ConferenceBackend`] built from
//! `network` + `room_core`. There is no central signaling server — the
//! first participant `create_room`s over UDP phase1 bootstrap, joiners
//! `connect` to the host's address, and `network::webrtc_if` brings up one
//! WebRTC peer connection plus a "reliable" data channel per peer once
//! phase1 authentication succeeds.
//!
//! Raw audio PCM forwarding rides on its own pair of channels this backend
//! owns (see [`MeshBackend::local_audio_sender`] /
//! [`MeshBackend::remote_audio_receiver`]): `NetworkManager` consumes one end
//! of each internally, the app feeds/drains the other ends. Wiring
//! microphone capture and playback to those channels is the app shell's job
//! (spec.md Non-goals: device capture itself is out of scope for this core).

use std::collections::VecDeque;
use std::net::SocketAddr;

use async_trait::async_trait;
use room_core::{AudioBuffer, Error, NetworkEvent, PeerId, RoomId};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::{BackendEvent, ConferenceBackend, ConferenceOptions, TrackKind};
use crate::events::TrackHandle;
use network::NetworkManager;

const DATA_CHANNEL_LABEL: &str = "reliable";
const AUDIO_CHANNEL_CAPACITY: usize = 64;

/// Deterministic room id derived from a human-chosen room name, so two
/// processes that `create_conference("my-room", ..)` independently land on
/// the same id without a naming server.
fn room_id_from_name(name: &str) -> RoomId {
    const NAMESPACE: Uuid = Uuid::from_bytes([
        0x9e, 0x5a, 0x7d, 0x9c, 0x1f, 0x3b, 0x4a, 0x8e, 0xb0, 0x6d, 0x2c, 0x1d, 0x4f, 0x7a, 0x9b,
        0x10,
    ]);
    RoomId::from(Uuid::new_v5(&NAMESPACE, name.as_bytes()))
}

pub struct MeshBackend {
    peer_id: PeerId,
    bind_addr: Option<SocketAddr>,
    stun_servers: Vec<String>,
    manager: Option<NetworkManager>,
    network_events: Option<mpsc::Receiver<NetworkEvent>>,
    pending: VecDeque<BackendEvent>,
    room_id: Option<RoomId>,
    known_peers: Vec<PeerId>,
    local_audio_tx: mpsc::Sender<(PeerId, AudioBuffer)>,
    local_audio_rx: Option<mpsc::Receiver<(PeerId, AudioBuffer)>>,
    remote_audio_rx: mpsc::Receiver<(PeerId, AudioBuffer)>,
    remote_audio_tx_for_manager: Option<mpsc::Sender<(PeerId, AudioBuffer)>>,
}

impl MeshBackend {
    pub fn new(peer_id: PeerId, bind_addr: Option<SocketAddr>, stun_servers: Vec<String>) -> Self {
        let (local_audio_tx, local_audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let (remote_audio_tx_for_manager, remote_audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        Self {
            peer_id,
            bind_addr,
            stun_servers,
            manager: None,
            network_events: None,
            pending: VecDeque::new(),
            room_id: None,
            known_peers: Vec::new(),
            local_audio_tx,
            local_audio_rx: Some(local_audio_rx),
            remote_audio_rx,
            remote_audio_tx_for_manager: Some(remote_audio_tx_for_manager),
        }
    }

    /// The sending end of the local-mic-to-network path. Clone into an
    /// `audio_io` capture callback; the tagging `PeerId` is conventionally
    /// the local peer's own id.
    pub fn local_audio_sender(&self) -> mpsc::Sender<(PeerId, AudioBuffer)> {
        self.local_audio_tx.clone()
    }

    /// Decoded remote audio arriving from the network, keyed by sender.
    /// Drain each tick and feed into `audio::AudioManager::set_user_stream`.
    pub fn remote_audio_receiver(&mut self) -> &mut mpsc::Receiver<(PeerId, AudioBuffer)> {
        &mut self.remote_audio_rx
    }

    fn manager(&mut self) -> Result<&mut NetworkManager, Error> {
        self.manager
            .as_mut()
            .ok_or_else(|| Error::InvalidState("mesh backend not connected".into()))
    }

    fn translate(&mut self, event: NetworkEvent) -> Option<BackendEvent> {
        match event {
            NetworkEvent::PeerConnected { peer_id, .. } => {
                if !self.known_peers.contains(&peer_id) {
                    self.known_peers.push(peer_id);
                }
                Some(BackendEvent::UserJoined(peer_id))
            }
            NetworkEvent::PeerDisconnected { peer_id, .. } => {
                self.known_peers.retain(|p| *p != peer_id);
                Some(BackendEvent::UserLeft(peer_id))
            }
            NetworkEvent::WebRtcDataChannelMessageReceived {
                peer_id,
                label,
                data,
            } if label == DATA_CHANNEL_LABEL => Some(BackendEvent::EndpointMessageReceived(peer_id, data)),
            NetworkEvent::WebRtcDataChannelMessageReceived { .. } => None,
            NetworkEvent::WebRtcTrackReceived {
                peer_id, track_id, ..
            } => Some(BackendEvent::TrackAdded(
                peer_id,
                TrackKind::Audio,
                TrackHandle::new(track_id),
            )),
            NetworkEvent::WebRtcConnectionStateChanged { peer_id, state } => {
                match state.as_str() {
                    "Failed" | "Closed" => Some(BackendEvent::Disconnected(format!(
                        "peer {peer_id} connection {state}"
                    ))),
                    "Disconnected" => Some(BackendEvent::ConnectionInterrupted),
                    _ => None,
                }
            }
            NetworkEvent::ConnectionFailed { address, reason } => {
                Some(BackendEvent::Failed(format!("{address}: {reason}")))
            }
            NetworkEvent::AuthenticationFailed { address, reason } => {
                Some(BackendEvent::Failed(format!("auth with {address} failed: {reason}")))
            }
            NetworkEvent::Error { message } => Some(BackendEvent::Failed(message)),
            NetworkEvent::WebRtcDataChannelOpened { .. }
            | NetworkEvent::WebRtcDataChannelClosed { .. }
            | NetworkEvent::WebRtcTrackAdded { .. }
            | NetworkEvent::WebRtcAudioReceived { .. }
            | NetworkEvent::MessageReceived { .. }
            | NetworkEvent::JoinRequested { .. }
            | NetworkEvent::JoinResponseReceived { .. }
            | NetworkEvent::AuthenticationSucceeded { .. } => None,
        }
    }
}

#[async_trait]
impl ConferenceBackend for MeshBackend {
    async fn connect(&mut self) -> Result<(), Error> {
        let local_rx = self
            .remote_audio_tx_for_manager
            .take()
            .ok_or_else(|| Error::InvalidState("mesh backend already connected".into()))?;
        let audio_receiver = self
            .local_audio_rx
            .take()
            .ok_or_else(|| Error::InvalidState("mesh backend already connected".into()))?;

        let (mut manager, events) = NetworkManager::new(
            self.peer_id,
            self.bind_addr,
            self.stun_servers.clone(),
            local_rx,
            audio_receiver,
        )
        .await?;
        manager.start().await?;

        self.manager = Some(manager);
        self.network_events = Some(events);
        self.pending.push_back(BackendEvent::Established);
        Ok(())
    }

    async fn create_conference(&mut self, room_name: &str, opts: ConferenceOptions) -> Result<(), Error> {
        let room_id = room_id_from_name(room_name);
        let manager = self.manager()?;
        match opts.remote_address {
            Some(address) => manager.phase1().connect(room_id, address).await?,
            None => manager.phase1().create_room(room_id).await?,
        }
        self.room_id = Some(room_id);
        self.pending.push_back(BackendEvent::ConferenceJoined);
        Ok(())
    }

    async fn join(&mut self) -> Result<(), Error> {
        // The mesh has no separate join step beyond the phase1 handshake
        // `create_conference` already kicked off; peers appear as
        // `UserJoined` events as they authenticate.
        Ok(())
    }

    async fn leave(&mut self) -> Result<(), Error> {
        if let Some(manager) = self.manager.as_mut() {
            for peer_id in self.known_peers.drain(..) {
                manager.phase1().disconnect_peer(peer_id).await?;
                manager.webrtc().close_peer_connection(peer_id).await?;
            }
        }
        self.room_id = None;
        self.pending.push_back(BackendEvent::ConferenceLeft);
        Ok(())
    }

    async fn set_display_name(&mut self, _name: &str) -> Result<(), Error> {
        // No dedicated phase1/WebRTC message carries display names today;
        // `ConferenceClient` surfaces name changes over the app-level data
        // channel protocol instead, so this is a local no-op.
        Ok(())
    }

    async fn add_track(&mut self, kind: TrackKind, _device_id: Option<&str>) -> Result<TrackHandle, Error> {
        let manager = self.manager()?;
        let peers = manager.phase1().get_peers().await;
        for peer in &peers {
            manager.webrtc().initiate_webrtc_connection(peer.peer_id).await?;
        }
        let label = match kind {
            TrackKind::Audio => format!("audio-{}", self.peer_id),
            TrackKind::Video => format!("video-{}", self.peer_id),
        };
        Ok(TrackHandle::new(label))
    }

    async fn remove_track(&mut self, _handle: &TrackHandle) -> Result<(), Error> {
        Ok(())
    }

    async fn mute_track(&mut self, _handle: &TrackHandle) -> Result<(), Error> {
        // No dedicated phase1/WebRTC mute signal exists in this reference
        // transport today; same scoping as `set_display_name` above.
        // `ConferenceClient` already tracks local mute state and gates
        // `localAudioMuteStatusChanged` on it regardless of what the
        // backend does with the track itself.
        Ok(())
    }

    async fn unmute_track(&mut self, _handle: &TrackHandle) -> Result<(), Error> {
        Ok(())
    }

    async fn send_message(&mut self, to: PeerId, data: Vec<u8>) -> Result<(), Error> {
        let manager = self.manager()?;
        manager
            .webrtc()
            .send_data_channel_message(to, DATA_CHANNEL_LABEL, &data)
            .await
    }

    async fn poll_event(&mut self) -> Option<BackendEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        let mut events = self.network_events.take()?;
        let result = loop {
            match events.try_recv() {
                Ok(event) => {
                    if let Some(translated) = self.translate(event) {
                        break Some(translated);
                    }
                }
                Err(_) => break None,
            }
        };
        self.network_events = Some(events);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_from_name_is_deterministic() {
        assert_eq!(room_id_from_name("my-room"), room_id_from_name("my-room"));
        assert_ne!(room_id_from_name("my-room"), room_id_from_name("other-room"));
    }
}
