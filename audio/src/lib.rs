//! Spatialized mixing for room.rs: [`AudioManager`] owns every participant's
//! and clip's [`source::AudioSource`], drives pose interpolation and the
//! chosen [`spatial::Spatializer`] per source, and runs [`ActivityAnalyser`]s
//! to derive the talking indicator.

mod analyser;
mod manager;
mod source;

pub use analyser::{
    ActivityAnalyser, ACTIVITY_ACTIVE_THRESHOLD, ACTIVITY_COUNTER_MAX, ACTIVITY_SCORE_OFFSET,
    ACTIVITY_THRESHOLD, SPEECH_BAND_HIGH_HZ, SPEECH_BAND_LOW_HZ,
};
pub use manager::AudioManager;
pub use source::AudioSource;
