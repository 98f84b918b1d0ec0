use crate::protocol::Phase1Message;
use room_core::{NetworkEvent, NetworkMessage, PeerId};
use std::net::SocketAddr;

/// Events raised by the phase1 bootstrap/handshake layer, keyed to the raw
/// [`Phase1Message`] wire type rather than the application-level
/// [`NetworkMessage`] the rest of the application subscribes to.
///
/// This is a separate type from [`room_core::NetworkEvent`] on purpose: the
/// bootstrap handshake (hello/DH/auth/join) is a lower layer than the
/// established WebRTC transport `webrtc_if`/`webrtc_audio` report through,
/// and has its own message type. [`Phase1Event::into_network_event`] is the
/// single place that bridges the two.
#[derive(Debug, Clone)]
pub enum Phase1Event {
    /// A new peer has connected
    PeerConnected {
        peer_id: PeerId,
        address: SocketAddr,
    },

    /// A peer has disconnected
    PeerDisconnected {
        peer_id: PeerId,
        reason: Option<String>,
    },

    /// A message was received from a peer
    MessageReceived {
        peer_id: PeerId,
        message: Phase1Message,
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

    /// Authentication with a peer failed
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
}

impl Phase1Event {
    /// Bridges a phase1-layer event into the application-level event set.
    /// `MessageReceived` is re-framed as an opaque bincode-serialized
    /// [`NetworkMessage::Binary`] payload, since `room_core` does not know
    /// about the phase1 wire protocol.
    pub fn into_network_event(self) -> NetworkEvent {
        match self {
            Phase1Event::PeerConnected { peer_id, address } => {
                NetworkEvent::PeerConnected { peer_id, address }
            }
            Phase1Event::PeerDisconnected { peer_id, reason } => {
                NetworkEvent::PeerDisconnected { peer_id, reason }
            }
            Phase1Event::MessageReceived { peer_id, message } => {
                let bytes = bincode::serialize(&message).unwrap_or_default();
                NetworkEvent::MessageReceived {
                    peer_id,
                    message: NetworkMessage::Binary(bytes),
                }
            }
            Phase1Event::JoinRequested {
                peer_id,
                name,
                address,
            } => NetworkEvent::JoinRequested {
                peer_id,
                name,
                address,
            },
            Phase1Event::JoinResponseReceived { approved, reason } => {
                NetworkEvent::JoinResponseReceived { approved, reason }
            }
            Phase1Event::AuthenticationFailed { address, reason } => {
                NetworkEvent::AuthenticationFailed { address, reason }
            }
            Phase1Event::ConnectionFailed { address, reason } => {
                NetworkEvent::ConnectionFailed { address, reason }
            }
            Phase1Event::AuthenticationSucceeded { peer_id } => {
                NetworkEvent::AuthenticationSucceeded { peer_id }
            }
            Phase1Event::Error { message } => NetworkEvent::Error { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_received_bridges_to_binary_network_message() {
        let peer_id = PeerId::new();
        let event = Phase1Event::MessageReceived {
            peer_id,
            message: Phase1Message::Ping { peer_id },
        };
        match event.into_network_event() {
            NetworkEvent::MessageReceived {
                message: NetworkMessage::Binary(bytes),
                ..
            } => assert!(!bytes.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
