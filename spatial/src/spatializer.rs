use pose::Pose;
use room_core::Error;

use crate::ambisonic::{AmbisonicPanner, NullAmbisonicRenderer};
use crate::listener::Listener;
use crate::panner::{AudioProperties, DirectPanner, LegacyPanner, ModernPanner, PannerSource};

/// Which concrete panner a session selected, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatializerKind {
    Ambisonic,
    ModernPanner,
    LegacyPanner,
    Direct,
}

impl std::fmt::Display for SpatializerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SpatializerKind::Ambisonic => "ambisonic",
            SpatializerKind::ModernPanner => "modern-panner",
            SpatializerKind::LegacyPanner => "legacy-panner",
            SpatializerKind::Direct => "direct",
        };
        write!(f, "{name}")
    }
}

/// What this host can actually render with, probed once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub ambisonic_available: bool,
    pub modern_panner_available: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            ambisonic_available: cfg!(feature = "steam_audio"),
            modern_panner_available: true,
        }
    }
}

/// The four concrete panner variants, replacing the prototype-chain
/// hierarchy of the original with a sum type (§9 REDESIGN FLAGS).
pub enum Spatializer {
    Ambisonic(AmbisonicPanner<NullAmbisonicRenderer>),
    ModernPanner(ModernPanner),
    LegacyPanner(LegacyPanner),
    Direct(DirectPanner),
}

impl Spatializer {
    /// Picks exactly one variant per capability probing, falling through in
    /// the order Ambisonic -> Modern panner -> Legacy panner -> Direct.
    /// `spatialize = false` always selects Direct regardless of capability
    /// (used for non-spatial clips).
    pub fn select(caps: Capabilities, spatialize: bool) -> Result<Self, Error> {
        if !spatialize {
            return Ok(Spatializer::Direct(DirectPanner::new()));
        }
        if caps.ambisonic_available {
            let panner = AmbisonicPanner::new(NullAmbisonicRenderer::new())?;
            log::debug!("spatializer: selected {}", SpatializerKind::Ambisonic);
            return Ok(Spatializer::Ambisonic(panner));
        }
        if caps.modern_panner_available {
            log::debug!("spatializer: selected {}", SpatializerKind::ModernPanner);
            return Ok(Spatializer::ModernPanner(ModernPanner::new()));
        }
        log::debug!("spatializer: selected {}", SpatializerKind::LegacyPanner);
        Ok(Spatializer::LegacyPanner(LegacyPanner::new()))
    }

    pub fn kind(&self) -> SpatializerKind {
        match self {
            Spatializer::Ambisonic(_) => SpatializerKind::Ambisonic,
            Spatializer::ModernPanner(_) => SpatializerKind::ModernPanner,
            Spatializer::LegacyPanner(_) => SpatializerKind::LegacyPanner,
            Spatializer::Direct(_) => SpatializerKind::Direct,
        }
    }

    pub fn update(&mut self, pose: &Pose) {
        match self {
            Spatializer::Ambisonic(p) => p.update(pose),
            Spatializer::ModernPanner(p) => p.update(pose),
            Spatializer::LegacyPanner(p) => p.update(pose),
            Spatializer::Direct(p) => p.update(pose),
        }
    }

    pub fn set_audio_properties(&mut self, props: AudioProperties) {
        match self {
            Spatializer::Ambisonic(p) => p.set_audio_properties(props),
            Spatializer::ModernPanner(p) => p.set_audio_properties(props),
            Spatializer::LegacyPanner(p) => p.set_audio_properties(props),
            Spatializer::Direct(p) => p.set_audio_properties(props),
        }
    }

    pub fn set_audio_output_device(&mut self, device_id: &str) -> bool {
        match self {
            Spatializer::Ambisonic(_) => false,
            Spatializer::ModernPanner(p) => p.set_audio_output_device(device_id),
            Spatializer::LegacyPanner(p) => p.set_audio_output_device(device_id),
            Spatializer::Direct(p) => p.set_audio_output_device(device_id),
        }
    }

    pub fn process(&self, listener: &Listener, input: &[f32]) -> Vec<f32> {
        match self {
            Spatializer::Ambisonic(p) => p.process(listener, input),
            Spatializer::ModernPanner(p) => p.process(listener, input),
            Spatializer::LegacyPanner(p) => p.process(listener, input),
            Spatializer::Direct(p) => p.process(listener, input),
        }
    }

    pub fn dispose(&mut self) {
        match self {
            Spatializer::Ambisonic(p) => p.dispose(),
            Spatializer::ModernPanner(p) => p.dispose(),
            Spatializer::LegacyPanner(p) => p.dispose(),
            Spatializer::Direct(p) => p.dispose(),
        }
    }

    pub fn is_disposed(&self) -> bool {
        match self {
            Spatializer::Ambisonic(p) => p.is_disposed(),
            Spatializer::ModernPanner(p) => p.is_disposed(),
            Spatializer::LegacyPanner(p) => p.is_disposed(),
            Spatializer::Direct(p) => p.is_disposed(),
        }
    }

    pub fn audio_properties(&self) -> Option<AudioProperties> {
        match self {
            Spatializer::Ambisonic(p) => p.audio_properties(),
            Spatializer::ModernPanner(p) => p.audio_properties(),
            Spatializer::LegacyPanner(p) => p.audio_properties(),
            Spatializer::Direct(p) => p.audio_properties(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_falls_back_to_modern_panner_without_ambisonic() {
        let caps = Capabilities {
            ambisonic_available: false,
            modern_panner_available: true,
        };
        let s = Spatializer::select(caps, true).unwrap();
        assert_eq!(s.kind(), SpatializerKind::ModernPanner);
    }

    #[test]
    fn select_falls_back_to_legacy_panner_as_last_resort() {
        let caps = Capabilities {
            ambisonic_available: false,
            modern_panner_available: false,
        };
        let s = Spatializer::select(caps, true).unwrap();
        assert_eq!(s.kind(), SpatializerKind::LegacyPanner);
    }

    #[test]
    fn non_spatialize_request_always_selects_direct() {
        let caps = Capabilities {
            ambisonic_available: true,
            modern_panner_available: true,
        };
        let s = Spatializer::select(caps, false).unwrap();
        assert_eq!(s.kind(), SpatializerKind::Direct);
    }

    #[test]
    fn dispose_is_idempotent_through_the_enum() {
        let mut s = Spatializer::Direct(DirectPanner::new());
        s.dispose();
        s.dispose();
        assert!(s.is_disposed());
    }
}
