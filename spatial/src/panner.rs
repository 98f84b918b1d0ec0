use pose::{Pose, Vector3};

use crate::listener::Listener;

/// Constant panner cone/distance-model configuration shared by every
/// non-Direct variant. Native playback has no platform `PannerNode` to
/// configure, but the constants are kept visible so the values this system
/// was designed against are not silently lost.
pub const CONE_INNER_ANGLE_DEG: f64 = 360.0;
pub const CONE_OUTER_ANGLE_DEG: f64 = 0.0;
pub const CONE_OUTER_GAIN: f64 = 0.0;
pub const DISTANCE_MODEL: &str = "inverse";
pub const PANNING_MODEL: &str = "HRTF";

/// `minDistance`/`maxDistance`/`rolloff`/`transitionTime` as applied to a
/// single source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioProperties {
    pub min_distance: f64,
    pub max_distance: f64,
    pub rolloff: f64,
    pub transition_time: f64,
}

impl Default for AudioProperties {
    fn default() -> Self {
        Self {
            min_distance: 1.0,
            max_distance: 10000.0,
            rolloff: 1.0,
            transition_time: 0.1,
        }
    }
}

/// Inverse distance model, matching the Web Audio `"inverse"` panner law:
/// `gain = refDistance / (refDistance + rolloff * (clamp(dist, refDistance, maxDistance) - refDistance))`.
pub fn inverse_distance_gain(distance: f64, props: &AudioProperties) -> f64 {
    let d = distance.clamp(props.min_distance, props.max_distance.max(props.min_distance));
    if props.min_distance <= 0.0 {
        return 1.0;
    }
    props.min_distance / (props.min_distance + props.rolloff * (d - props.min_distance))
}

/// Equal-power stereo pan law from a lateral coordinate in `[-1, 1]`
/// (`-1` hard left, `1` hard right).
pub fn equal_power_pan(lateral: f64) -> (f64, f64) {
    let p = lateral.clamp(-1.0, 1.0);
    let angle = (p + 1.0) * std::f64::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Owns one audio source's position/orientation and produces the stereo
/// frames fed to the mix, given the listener's current pose and a mono
/// input buffer.
pub trait PannerSource: Send {
    fn update(&mut self, pose: &Pose);
    fn set_audio_properties(&mut self, props: AudioProperties);
    /// Returns `false` when the platform has no per-element output routing
    /// (native playback never does) — callers treat this as a silent no-op,
    /// not an error, per the device-selection discipline.
    fn set_audio_output_device(&mut self, _device_id: &str) -> bool {
        false
    }
    fn process(&self, listener: &Listener, input: &[f32]) -> Vec<f32>;
    fn dispose(&mut self);
    fn is_disposed(&self) -> bool;
    /// `None` for variants (Direct) that do not track distance attenuation.
    fn audio_properties(&self) -> Option<AudioProperties> {
        None
    }
}

/// Shared fields for the two platform-panner variants. The spec's
/// Modern/Legacy split reflects which AudioParam API the browser exposes;
/// this backend has only one attenuation/panning implementation, so both
/// variants share it and differ only in name and provenance (which
/// capability probe selected them).
#[derive(Debug, Clone, Copy, PartialEq)]
struct PannerState {
    pose: Pose,
    props: AudioProperties,
    disposed: bool,
}

impl PannerState {
    fn new() -> Self {
        Self {
            pose: Pose::identity(),
            props: AudioProperties::default(),
            disposed: false,
        }
    }

    fn process(&self, listener: &Listener, input: &[f32]) -> Vec<f32> {
        if self.disposed {
            return vec![0.0; input.len() * 2];
        }
        let relative = listener.relative(&self.pose.p);
        let distance = relative.length();
        let gain = inverse_distance_gain(distance, &self.props);
        let lateral = if distance > 1e-9 { relative.x / distance } else { 0.0 };
        let (left_gain, right_gain) = equal_power_pan(lateral);

        let mut out = Vec::with_capacity(input.len() * 2);
        for &sample in input {
            let s = sample as f64 * gain;
            out.push((s * left_gain) as f32);
            out.push((s * right_gain) as f32);
        }
        out
    }
}

/// Platform HRTF panner using `positionX/Y/Z`/`orientationX/Y/Z` AudioParams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModernPanner(PannerState);

impl ModernPanner {
    pub fn new() -> Self {
        Self(PannerState::new())
    }
}

impl Default for ModernPanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PannerSource for ModernPanner {
    fn update(&mut self, pose: &Pose) {
        self.0.pose = *pose;
    }
    fn set_audio_properties(&mut self, props: AudioProperties) {
        self.0.props = props;
    }
    fn process(&self, listener: &Listener, input: &[f32]) -> Vec<f32> {
        self.0.process(listener, input)
    }
    fn dispose(&mut self) {
        self.0.disposed = true;
    }
    fn is_disposed(&self) -> bool {
        self.0.disposed
    }
    fn audio_properties(&self) -> Option<AudioProperties> {
        Some(self.0.props)
    }
}

/// Platform panner exposing only `setPosition`/`setOrientation` (no
/// AudioParams to automate). Same attenuation math as [`ModernPanner`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyPanner(PannerState);

impl LegacyPanner {
    pub fn new() -> Self {
        Self(PannerState::new())
    }
}

impl Default for LegacyPanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PannerSource for LegacyPanner {
    fn update(&mut self, pose: &Pose) {
        self.0.pose = *pose;
    }
    fn set_audio_properties(&mut self, props: AudioProperties) {
        self.0.props = props;
    }
    fn process(&self, listener: &Listener, input: &[f32]) -> Vec<f32> {
        self.0.process(listener, input)
    }
    fn dispose(&mut self) {
        self.0.disposed = true;
    }
    fn is_disposed(&self) -> bool {
        self.0.disposed
    }
    fn audio_properties(&self) -> Option<AudioProperties> {
        Some(self.0.props)
    }
}

/// Unspatialized passthrough: duplicates mono input to both stereo
/// channels with no distance or directional attenuation. Used for sound
/// effect clips and whenever the caller explicitly opts out of
/// spatialization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectPanner {
    disposed: bool,
}

impl DirectPanner {
    pub fn new() -> Self {
        Self { disposed: false }
    }
}

impl Default for DirectPanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PannerSource for DirectPanner {
    fn update(&mut self, _pose: &Pose) {}
    fn set_audio_properties(&mut self, _props: AudioProperties) {}
    fn process(&self, _listener: &Listener, input: &[f32]) -> Vec<f32> {
        if self.disposed {
            return vec![0.0; input.len() * 2];
        }
        let mut out = Vec::with_capacity(input.len() * 2);
        for &sample in input {
            out.push(sample);
            out.push(sample);
        }
        out
    }
    fn dispose(&mut self) {
        self.disposed = true;
    }
    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_distance_matches_reference_scenario() {
        // minDistance=1, maxDistance=10, rolloff=1, distance=3 -> 1/(1+1*(3-1)) = 1/3.
        let props = AudioProperties {
            min_distance: 1.0,
            max_distance: 10.0,
            rolloff: 1.0,
            transition_time: 0.0,
        };
        let gain = inverse_distance_gain(3.0, &props);
        assert!((gain - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn equal_power_pan_center_is_balanced() {
        let (l, r) = equal_power_pan(0.0);
        assert!((l - r).abs() < 1e-9);
        assert!((l * l + r * r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut p = ModernPanner::new();
        p.dispose();
        let first = p.is_disposed();
        p.dispose();
        assert_eq!(first, p.is_disposed());
        assert!(p.is_disposed());
    }

    #[test]
    fn direct_panner_duplicates_samples() {
        let p = DirectPanner::new();
        let listener = Listener::new();
        let out = p.process(&listener, &[0.5, -0.25]);
        assert_eq!(out, vec![0.5, 0.5, -0.25, -0.25]);
    }
}
