//! The fixed, normalized event set `ConferenceClient` emits (spec.md §4.6).
//!
//! This is a tagged union rather than a dynamic event bus by design
//! (REDESIGN FLAGS): there is no "unknown event name" case to throw on
//! because every event a subscriber can observe is a variant here.

use pose::{Pose, Vector3};
use room_core::PeerId;

/// Either end of an audio/video track, identified opaquely. The reference
/// backend hands these out from `add_track`/remote `TRACK_ADDED`; callers
/// never need to know the underlying transport representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackHandle(pub String);

impl TrackHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }
}

/// An emoji payload, kept deliberately opaque (spec.md §9: the large
/// emoji dictionary is presentation, not core logic).
#[derive(Debug, Clone, PartialEq)]
pub struct Emoji {
    pub value: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConferenceEvent {
    VideoConferenceJoined {
        id: PeerId,
        room_name: String,
        display_name: String,
        pose: Pose,
    },
    VideoConferenceLeft {
        room_name: String,
    },
    ParticipantJoined {
        id: PeerId,
        display_name: String,
        pose: Pose,
    },
    ParticipantLeft {
        id: PeerId,
    },
    DisplayNameChange {
        id: PeerId,
        display_name: String,
    },
    AudioAdded {
        id: PeerId,
        stream: TrackHandle,
    },
    AudioRemoved {
        id: PeerId,
        stream: TrackHandle,
    },
    AudioChanged {
        id: PeerId,
        stream: TrackHandle,
    },
    VideoAdded {
        id: PeerId,
        stream: TrackHandle,
    },
    VideoRemoved {
        id: PeerId,
        stream: TrackHandle,
    },
    VideoChanged {
        id: PeerId,
        stream: TrackHandle,
    },
    AudioMuteStatusChanged {
        id: PeerId,
        muted: bool,
    },
    VideoMuteStatusChanged {
        id: PeerId,
        muted: bool,
    },
    LocalAudioMuteStatusChanged {
        id: PeerId,
        muted: bool,
    },
    LocalVideoMuteStatusChanged {
        id: PeerId,
        muted: bool,
    },
    AudioActivity {
        id: PeerId,
        is_active: bool,
    },
    UserMoved {
        id: PeerId,
        position: Vector3,
    },
    UserTurned {
        id: PeerId,
        forward: Vector3,
        up: Vector3,
    },
    UserPosed {
        id: PeerId,
        pose: Pose,
    },
    UserInitRequest {
        id: PeerId,
    },
    UserInitResponse {
        id: PeerId,
        pose: Pose,
        avatar_url: Option<String>,
        emoji: Option<Emoji>,
    },
    Emote {
        id: PeerId,
        value: String,
        desc: String,
    },
    AvatarChanged {
        id: PeerId,
        url: String,
    },
    SetAvatarEmoji {
        id: PeerId,
        value: String,
        desc: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_handle_equality_is_by_label() {
        assert_eq!(TrackHandle::new("a"), TrackHandle::new("a"));
        assert_ne!(TrackHandle::new("a"), TrackHandle::new("b"));
    }
}
