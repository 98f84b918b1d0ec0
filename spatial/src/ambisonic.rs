use std::cell::RefCell;

use room_core::Error;

use crate::listener::Listener;
use crate::panner::{inverse_distance_gain, AudioProperties, PannerSource};
use pose::{Pose, Vector3};

/// `setRenderingMode` as named in the consumed `AmbisonicRenderer` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingMode {
    Ambisonic,
    Bypass,
    Off,
}

/// First-order B-format (ACN/SN3D) buffer: W, X, Y, Z channels.
#[derive(Debug, Clone, Default)]
pub struct BFormatBuffer {
    pub w: Vec<f32>,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
}

/// Encodes a mono buffer into first-order B-format given the source's
/// direction relative to the listener (already in the listener's local
/// right/up/-forward frame, as returned by [`Listener::relative`]).
pub fn encode_foa(input: &[f32], direction: &Vector3) -> BFormatBuffer {
    let dir = direction.normalize();
    let mut buf = BFormatBuffer {
        w: Vec::with_capacity(input.len()),
        x: Vec::with_capacity(input.len()),
        y: Vec::with_capacity(input.len()),
        z: Vec::with_capacity(input.len()),
    };
    const SQRT1_2: f32 = std::f32::consts::FRAC_1_SQRT_2;
    for &s in input {
        buf.w.push(s * SQRT1_2);
        buf.x.push(s * dir.z as f32);
        buf.y.push(s * dir.x as f32);
        buf.z.push(s * dir.y as f32);
    }
    buf
}

/// Consumed collaborator that decodes ambisonic B-format to a binaural
/// stereo signal, rotated by the listener's current orientation.
pub trait AmbisonicRenderer: Send {
    fn initialize(&mut self) -> Result<(), Error>;
    fn set_rotation(&mut self, forward: Vector3, up: Vector3);
    fn set_rendering_mode(&mut self, mode: RenderingMode);
    /// Decodes one buffer of B-format audio to interleaved stereo.
    fn decode(&mut self, buffer: &BFormatBuffer) -> Vec<f32>;
}

/// Decodes B-format with a simple virtual-speaker pair instead of true HRIR
/// convolution. Used as the default when the `steam_audio` feature (and its
/// native Steam Audio dependency) is not compiled in, and as a test double.
/// Good enough for left/right localization; no elevation cues.
pub struct NullAmbisonicRenderer {
    mode: RenderingMode,
}

impl NullAmbisonicRenderer {
    pub fn new() -> Self {
        Self {
            mode: RenderingMode::Off,
        }
    }
}

impl Default for NullAmbisonicRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl AmbisonicRenderer for NullAmbisonicRenderer {
    fn initialize(&mut self) -> Result<(), Error> {
        self.mode = RenderingMode::Ambisonic;
        Ok(())
    }

    fn set_rotation(&mut self, _forward: Vector3, _up: Vector3) {
        // B-format is encoded directly in listener space (see `encode_foa`),
        // so there is no additional rotation to apply here.
    }

    fn set_rendering_mode(&mut self, mode: RenderingMode) {
        self.mode = mode;
    }

    fn decode(&mut self, buffer: &BFormatBuffer) -> Vec<f32> {
        if matches!(self.mode, RenderingMode::Off) {
            return vec![0.0; buffer.w.len() * 2];
        }
        let mut out = Vec::with_capacity(buffer.w.len() * 2);
        for i in 0..buffer.w.len() {
            let w = buffer.w[i];
            let x = buffer.x[i];
            let left = w + x * 0.5;
            let right = w - x * 0.5;
            out.push(left);
            out.push(right);
        }
        out
    }
}

/// Spatializer variant that feeds a B-format encoder and decodes through an
/// [`AmbisonicRenderer`] collaborator. Preferred when available (§4.3).
pub struct AmbisonicPanner<R: AmbisonicRenderer> {
    pose: Pose,
    props: AudioProperties,
    renderer: RefCell<R>,
    disposed: bool,
}

impl<R: AmbisonicRenderer> AmbisonicPanner<R> {
    pub fn new(mut renderer: R) -> Result<Self, Error> {
        renderer.initialize()?;
        renderer.set_rendering_mode(RenderingMode::Ambisonic);
        Ok(Self {
            pose: Pose::identity(),
            props: AudioProperties::default(),
            renderer: RefCell::new(renderer),
            disposed: false,
        })
    }
}

impl<R: AmbisonicRenderer> PannerSource for AmbisonicPanner<R> {
    fn update(&mut self, pose: &Pose) {
        self.pose = *pose;
    }

    fn set_audio_properties(&mut self, props: AudioProperties) {
        self.props = props;
    }

    fn process(&self, listener: &Listener, input: &[f32]) -> Vec<f32> {
        if self.disposed {
            return vec![0.0; input.len() * 2];
        }
        let relative = listener.relative(&self.pose.p);
        let distance = relative.length();
        let gain = inverse_distance_gain(distance, &self.props);
        let attenuated: Vec<f32> = input.iter().map(|&s| (s as f64 * gain) as f32).collect();
        let encoded = encode_foa(&attenuated, &relative);
        self.renderer.borrow_mut().decode(&encoded)
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.renderer.borrow_mut().set_rendering_mode(RenderingMode::Off);
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn audio_properties(&self) -> Option<AudioProperties> {
        Some(self.props)
    }
}
