//! Spatializer backends: the four panner variants a session picks between
//! via capability probing (Ambisonic, modern platform panner, legacy
//! platform panner, Direct passthrough), plus the shared `Listener`.

mod ambisonic;
mod listener;
mod panner;
mod spatializer;

pub use ambisonic::{
    encode_foa, AmbisonicPanner, AmbisonicRenderer, BFormatBuffer, NullAmbisonicRenderer,
    RenderingMode,
};
pub use listener::Listener;
pub use panner::{
    equal_power_pan, inverse_distance_gain, AudioProperties, DirectPanner, LegacyPanner,
    ModernPanner, PannerSource, CONE_INNER_ANGLE_DEG, CONE_OUTER_ANGLE_DEG, CONE_OUTER_GAIN,
    DISTANCE_MODEL, PANNING_MODEL,
};
pub use spatializer::{Capabilities, Spatializer, SpatializerKind};
