//! Concrete `ConferenceBackend` reference implementation: a small P2P mesh
//! built from a UDP bootstrap handshake (`phase1`, authenticated via
//! `crypto`) followed by per-peer WebRTC connections (`webrtc_if`,
//! `webrtc_audio`) for media and an ordered data channel.

pub mod events;
pub mod phase1;
pub mod protocol;
pub mod stun_client;
pub mod webrtc_audio;
pub mod webrtc_if;

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use room_core::{AudioBuffer, Error, NetworkEvent, PeerId};
use tokio::sync::mpsc;

use phase1::Phase1Network;
use webrtc_audio::WebRtcAudioHandler;
use webrtc_if::WebRtcInterface;

/// Coordinates the bootstrap handshake and WebRTC transport behind one
/// `room_core::NetworkEvent` stream, so everything above this crate (the
/// `room` state machine and `conference::ConferenceClient`) sees a single
/// event source regardless of which internal layer raised it.
pub struct NetworkManager {
    peer_id: PeerId,
    phase1: Phase1Network,
    webrtc: Arc<WebRtcInterface>,
    audio: WebRtcAudioHandler,
}

impl NetworkManager {
    /// Binds the phase1 UDP socket, constructs the WebRTC interface, and
    /// wires a background task that bridges phase1's internal event type
    /// into `room_core::NetworkEvent`. Returns the manager plus the unified
    /// receiver end of that event stream.
    pub async fn new(
        peer_id: PeerId,
        bind_addr: Option<SocketAddr>,
        stun_servers: Vec<String>,
        audio_sender: mpsc::Sender<(PeerId, AudioBuffer)>,
        audio_receiver: mpsc::Receiver<(PeerId, AudioBuffer)>,
    ) -> Result<(Self, mpsc::Receiver<NetworkEvent>), Error> {
        let (public_tx, public_rx) = mpsc::channel::<NetworkEvent>(256);
        let (phase1_tx, mut phase1_rx) = mpsc::channel::<events::Phase1Event>(256);
        let (phase1_msg_tx, _phase1_msg_rx) = mpsc::channel(256);

        let phase1 = Phase1Network::new(peer_id, bind_addr, phase1_tx).await?;
        let webrtc = Arc::new(WebRtcInterface::new(
            peer_id,
            phase1_msg_tx,
            public_tx.clone(),
            stun_servers,
        ));
        let audio = WebRtcAudioHandler::new(peer_id, audio_sender, audio_receiver);

        tokio::spawn(async move {
            while let Some(event) = phase1_rx.recv().await {
                if public_tx.send(event.into_network_event()).await.is_err() {
                    error!("network event bridge: receiver dropped, stopping");
                    break;
                }
            }
        });

        info!("NetworkManager initialized for peer {}", peer_id);

        Ok((
            Self {
                peer_id,
                phase1,
                webrtc,
                audio,
            },
            public_rx,
        ))
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn webrtc(&self) -> &Arc<WebRtcInterface> {
        &self.webrtc
    }

    pub fn phase1(&mut self) -> &mut Phase1Network {
        &mut self.phase1
    }

    /// Starts the phase1 UDP receiver/ping tasks and the WebRTC audio
    /// forwarding task. Call once after construction.
    pub async fn start(&mut self) -> Result<(), Error> {
        self.phase1.start().await?;
        self.audio.start().await
    }

    pub async fn dispatch_audio_event(&self, event: NetworkEvent) -> Result<(), Error> {
        self.audio.handle_event(event).await
    }
}
