use crate::{AudioBuffer, PeerId};
use std::net::SocketAddr;

/// Network protocol payload, already framed/serialized by the `network` crate.
///
/// `room_core` does not know about the wire protocol (`network::protocol`) —
/// it only ferries opaque bytes between layers, the same separation the spec
/// keeps between the core and the opaque `ConferenceBackend` (spec §6.1).
#[derive(Debug, Clone)]
pub enum NetworkMessage {
    /// A basic text message
    Text(String),
    /// A binary (bincode-serialized protocol) message
    Binary(Vec<u8>),
}

/// Room events
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// A peer has been added to the room
    PeerAdded(PeerId),
    /// A peer has been removed from the room
    PeerRemoved(PeerId),
    /// A join request has been received
    JoinRequestReceived(PeerId),
    /// A join request status has changed
    JoinRequestStatusChanged(PeerId, JoinRequestStatus),
    /// The peer list has been updated
    PeerListUpdated,
}

/// Status of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Denied,
}

impl std::fmt::Display for JoinRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinRequestStatus::Pending => write!(f, "Pending"),
            JoinRequestStatus::Approved => write!(f, "Approved"),
            JoinRequestStatus::Denied => write!(f, "Denied"),
        }
    }
}

/// Events emitted by the network subsystem to other parts of the application.
///
/// This is the full set a concrete `ConferenceBackend` reference
/// implementation (`network` + `room`) can raise. `conference::ConferenceClient`
/// folds these down into the fixed, spec-mandated event set in
/// `conference::events::ConferenceEvent`.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A new peer has connected at the transport level
    PeerConnected {
        peer_id: PeerId,
        address: SocketAddr,
    },

    /// A peer has disconnected
    PeerDisconnected {
        peer_id: PeerId,
        reason: Option<String>,
    },

    /// An application-layer message was received from a peer
    MessageReceived {
        peer_id: PeerId,
        message: NetworkMessage,
    },

    /// A peer requested to join a room
    JoinRequested {
        peer_id: PeerId,
        name: String,
        address: SocketAddr,
    },

    /// A peer's join request was processed
    JoinResponseReceived {
        approved: bool,
        reason: Option<String>,
    },

    /// Authentication with a peer failed (phase1 handshake)
    AuthenticationFailed {
        address: SocketAddr,
        reason: String,
    },

    /// Connection to a peer failed
    ConnectionFailed {
        address: SocketAddr,
        reason: String,
    },

    /// Authentication with a peer succeeded
    AuthenticationSucceeded { peer_id: PeerId },

    /// A network error occurred
    Error { message: String },

    /// WebRTC peer connection state changed (e.g. "Connected", "Failed")
    WebRtcConnectionStateChanged { peer_id: PeerId, state: String },

    /// A WebRTC data channel opened with a peer
    WebRtcDataChannelOpened { peer_id: PeerId, label: String },

    /// A WebRTC data channel closed with a peer
    WebRtcDataChannelClosed { peer_id: PeerId, label: String },

    /// A message arrived on a WebRTC data channel
    WebRtcDataChannelMessageReceived {
        peer_id: PeerId,
        label: String,
        data: Vec<u8>,
    },

    /// A local track was added to a peer connection
    WebRtcTrackAdded { peer_id: PeerId, track_id: String },

    /// A remote track was received from a peer ("audio" | "video")
    WebRtcTrackReceived {
        peer_id: PeerId,
        track_id: String,
        kind: String,
    },

    /// Decoded audio samples arrived from a peer's remote audio track
    WebRtcAudioReceived { peer_id: PeerId, buffer: AudioBuffer },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_request_status_display() {
        assert_eq!(format!("{}", JoinRequestStatus::Pending), "Pending");
        assert_eq!(format!("{}", JoinRequestStatus::Approved), "Approved");
        assert_eq!(format!("{}", JoinRequestStatus::Denied), "Denied");
    }

    #[test]
    fn network_event_is_debug_clone() {
        let ev = NetworkEvent::Error {
            message: "boom".into(),
        };
        let cloned = ev.clone();
        assert!(format!("{:?}", cloned).contains("boom"));
    }
}
