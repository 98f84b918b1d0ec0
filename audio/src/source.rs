use pose::{InterpolatedPose, Pose};
use room_core::AudioBuffer;
use spatial::{Capabilities, Listener, Spatializer};

/// One participant's (or clip's) audio presence: a pose that interpolates
/// smoothly toward the latest network/clip update, and the spatializer
/// chain that turns its mono input into a stereo contribution to the mix.
///
/// `spatializer` lifetime rule: replacing it (via [`AudioSource::set_spatializer`])
/// or clearing it always disposes the previous one first.
pub struct AudioSource {
    pub id: String,
    pub pose: InterpolatedPose,
    spatializer: Option<Spatializer>,
    is_local_listener: bool,
    input: AudioBuffer,
}

impl AudioSource {
    pub fn new(id: impl Into<String>, initial: Pose) -> Self {
        Self {
            id: id.into(),
            pose: InterpolatedPose::new(initial),
            spatializer: None,
            is_local_listener: false,
            input: Vec::new(),
        }
    }

    pub fn new_local_listener(id: impl Into<String>, initial: Pose) -> Self {
        let mut source = Self::new(id, initial);
        source.is_local_listener = true;
        source
    }

    pub fn is_local_listener(&self) -> bool {
        self.is_local_listener
    }

    pub fn spatializer(&self) -> Option<&Spatializer> {
        self.spatializer.as_ref()
    }

    pub fn spatializer_mut(&mut self) -> Option<&mut Spatializer> {
        self.spatializer.as_mut()
    }

    /// Replaces the mono input fed to this source's spatializer on the next `update`.
    pub fn set_input(&mut self, input: AudioBuffer) {
        self.input = input;
    }

    /// The raw, pre-spatialization mono input last set via [`Self::set_input`].
    /// This is what `ActivityAnalyser` binds to (spec.md §4.5: the analyser
    /// reads "an `AudioSource` whose spatializer exposes its source node",
    /// i.e. the node *before* distance/pan attenuation, not the rendered mix).
    pub fn raw_input(&self) -> &[f32] {
        &self.input
    }

    pub fn set_spatializer(&mut self, mut new: Option<Spatializer>) {
        if let Some(old) = self.spatializer.as_mut() {
            old.dispose();
        }
        if let Some(s) = new.as_mut() {
            s.update(self.pose.current());
        }
        self.spatializer = new;
    }

    /// Builds a fresh spatializer for this source via capability probing.
    /// Idempotent: does nothing if one is already attached.
    pub fn ensure_spatializer(
        &mut self,
        caps: Capabilities,
        spatialize: bool,
    ) -> Result<(), room_core::Error> {
        if self.spatializer.is_some() {
            return Ok(());
        }
        let s = Spatializer::select(caps, spatialize)?;
        self.set_spatializer(Some(s));
        Ok(())
    }

    pub fn clear_spatializer(&mut self) {
        self.set_spatializer(None);
    }

    pub fn update(&mut self, t: f64) {
        self.pose.update(t);
        if let Some(s) = self.spatializer.as_mut() {
            s.update(self.pose.current());
        }
    }

    /// Renders this source's contribution against the given listener.
    /// Returns an empty buffer if there is no spatializer or no input yet.
    pub fn render(&self, listener: &Listener) -> AudioBuffer {
        match &self.spatializer {
            Some(s) if !self.input.is_empty() => s.process(listener, &self.input),
            _ => Vec::new(),
        }
    }

    pub fn dispose(&mut self) {
        self.clear_spatializer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial::Capabilities;

    #[test]
    fn ensure_spatializer_is_idempotent() {
        let mut source = AudioSource::new("bob", Pose::identity());
        let caps = Capabilities {
            ambisonic_available: false,
            modern_panner_available: true,
        };
        source.ensure_spatializer(caps, true).unwrap();
        assert!(source.spatializer().is_some());
        let kind_before = source.spatializer().unwrap().kind();
        source.ensure_spatializer(caps, true).unwrap();
        assert_eq!(source.spatializer().unwrap().kind(), kind_before);
    }

    #[test]
    fn render_without_input_is_empty() {
        let mut source = AudioSource::new("bob", Pose::identity());
        let caps = Capabilities {
            ambisonic_available: false,
            modern_panner_available: true,
        };
        source.ensure_spatializer(caps, true).unwrap();
        let listener = Listener::new();
        assert!(source.render(&listener).is_empty());
    }
}
