use std::collections::HashMap;
use std::time::Instant;

use pose::{Pose, Vector3};
use room_core::{AudioBuffer, Error};
use spatial::{AudioProperties, Capabilities, Listener};

use crate::analyser::ActivityAnalyser;
use crate::source::AudioSource;

const ANALYSER_BUFFER_SIZE: usize = 512;
const ANALYSER_SAMPLE_RATE: f64 = room_core::SAMPLE_RATE as f64;

/// Singleton per client, owning the listener, every participant's
/// [`AudioSource`], non-spatial clip sources, and their activity analysers.
///
/// Mirrors the contract in full: every `AudioManager::users` entry whose
/// spatializer is attached stays synchronized with the global distance
/// properties after any `set_audio_properties` call (testable property 1).
pub struct AudioManager {
    listener: Listener,
    users: HashMap<String, AudioSource>,
    clips: HashMap<String, AudioSource>,
    analysers: HashMap<String, ActivityAnalyser>,
    capabilities: Capabilities,
    props: AudioProperties,
    running: bool,
    mock: bool,
    started_at: Option<Instant>,
}

impl AudioManager {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            listener: Listener::new(),
            users: HashMap::new(),
            clips: HashMap::new(),
            analysers: HashMap::new(),
            capabilities,
            props: AudioProperties::default(),
            running: false,
            mock: false,
            started_at: None,
        }
    }

    /// Constructs a manager with no real audio backend: every spatializer
    /// degrades to Direct and there is no audio output, but `current_time()`
    /// still advances so the game loop keeps functioning.
    pub fn new_mock() -> Self {
        let mut manager = Self::new(Capabilities {
            ambisonic_available: false,
            modern_panner_available: false,
        });
        manager.mock = true;
        manager
    }

    /// Resumes the audio context. Idempotent; safe to call before any user
    /// action.
    pub fn start(&mut self) -> Result<(), Error> {
        if !self.running {
            self.started_at = Some(Instant::now());
            self.running = true;
            log::info!("audio manager started (mock={})", self.mock);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Wall-clock seconds since `start()`. Stands in for the AudioContext
    /// clock; in mock mode this is the only clock the system has.
    pub fn current_time(&self) -> f64 {
        self.started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn users(&self) -> &HashMap<String, AudioSource> {
        &self.users
    }

    pub fn clips(&self) -> &HashMap<String, AudioSource> {
        &self.clips
    }

    /// Idempotent per id.
    pub fn create_user(&mut self, id: &str) -> &mut AudioSource {
        self.users
            .entry(id.to_string())
            .or_insert_with(|| AudioSource::new(id, Pose::identity()))
    }

    /// As [`Self::create_user`], additionally wiring this source as the
    /// listener anchor: the local participant's pose moves the listener,
    /// not a sound source.
    pub fn create_local_user(&mut self, id: &str) -> &mut AudioSource {
        if !self.users.contains_key(id) {
            self.users
                .insert(id.to_string(), AudioSource::new_local_listener(id, Pose::identity()));
        }
        self.users.get_mut(id).expect("just inserted")
    }

    /// Atomically replaces this user's input stream: disposes any prior
    /// analyser/spatializer, and if `input` is present, builds a spatialized
    /// chain, applies current global properties, and attaches an analyser.
    pub fn set_user_stream(&mut self, id: &str, input: Option<AudioBuffer>) -> Result<(), Error> {
        self.analysers.remove(id);
        let source = self
            .users
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("no such user: {id}")))?;
        source.clear_spatializer();

        match input {
            Some(buffer) => {
                if !source.is_local_listener() {
                    source.ensure_spatializer(self.capabilities, true)?;
                    if let Some(s) = source.spatializer_mut() {
                        s.set_audio_properties(self.props);
                    }
                    self.analysers.insert(
                        id.to_string(),
                        ActivityAnalyser::new(id, ANALYSER_BUFFER_SIZE, ANALYSER_SAMPLE_RATE),
                    );
                }
                source.set_input(buffer);
            }
            None => source.set_input(Vec::new()),
        }
        Ok(())
    }

    pub fn set_user_position(
        &mut self,
        id: &str,
        p: Vector3,
        dt: Option<f64>,
    ) -> Result<(), Error> {
        let t = self.current_time();
        let transition = dt.unwrap_or(self.props.transition_time);
        let source = self
            .users
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("no such user: {id}")))?;
        let mut target = *source.pose.current();
        target.p = p;
        source.pose.set_target(target, t, transition);
        Ok(())
    }

    pub fn set_user_orientation(
        &mut self,
        id: &str,
        f: Vector3,
        u: Vector3,
        dt: Option<f64>,
    ) -> Result<(), Error> {
        let t = self.current_time();
        let transition = dt.unwrap_or(self.props.transition_time);
        let source = self
            .users
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("no such user: {id}")))?;
        let mut target = *source.pose.current();
        target.f = f;
        target.u = u;
        source.pose.set_target(target, t, transition);
        Ok(())
    }

    pub fn set_user_pose(&mut self, id: &str, pose: Pose, dt: Option<f64>) -> Result<(), Error> {
        let t = self.current_time();
        let transition = dt.unwrap_or(self.props.transition_time);
        let source = self
            .users
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("no such user: {id}")))?;
        source.pose.set_target(pose, t, transition);
        Ok(())
    }

    /// Removes a user's source, analyser, and map entry, disposing the
    /// spatializer chain first.
    pub fn remove_user(&mut self, id: &str) {
        if let Some(mut source) = self.users.remove(id) {
            source.dispose();
        }
        self.analysers.remove(id);
    }

    /// Loads a clip under `name`; the caller already resolved which of
    /// several candidate paths is playable (out of scope here — see
    /// [`Error::NotFound`] for "no accessible path").
    pub fn create_clip(&mut self, name: &str, spatialize: bool) -> Result<&mut AudioSource, Error> {
        if !self.clips.contains_key(name) {
            let mut source = AudioSource::new(name, Pose::identity());
            source.ensure_spatializer(self.capabilities, spatialize)?;
            if let Some(s) = source.spatializer_mut() {
                s.set_audio_properties(self.props);
            }
            self.clips.insert(name.to_string(), source);
        }
        Ok(self.clips.get_mut(name).expect("just inserted"))
    }

    pub fn play_clip(&mut self, name: &str, input: AudioBuffer) -> Result<(), Error> {
        let clip = self
            .clips
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("no such clip: {name}")))?;
        clip.set_input(input);
        Ok(())
    }

    pub fn stop_clip(&mut self, name: &str) {
        if let Some(clip) = self.clips.get_mut(name) {
            clip.set_input(Vec::new());
        }
    }

    pub fn remove_clip(&mut self, name: &str) {
        if let Some(mut clip) = self.clips.remove(name) {
            clip.dispose();
        }
    }

    /// Updates globals and re-applies them to every attached spatializer,
    /// user and clip alike (testable property 1).
    pub fn set_audio_properties(&mut self, props: AudioProperties) {
        self.props = props;
        for source in self.users.values_mut().chain(self.clips.values_mut()) {
            if let Some(s) = source.spatializer_mut() {
                s.set_audio_properties(props);
            }
        }
    }

    /// Advances the listener, every user source, every clip, and every
    /// analyser to the current audio clock. Safe to call at any frequency
    /// >= 1 Hz. MUST NOT be called while iterating `users`/`clips` for
    /// removal — use `remove_user`/`remove_clip` from outside this call.
    pub fn update(&mut self) -> Vec<(String, bool)> {
        let t = self.current_time();

        if let Some((_, local)) = self.users.iter_mut().find(|(_, s)| s.is_local_listener()) {
            local.update(t);
            self.listener.update(*local.pose.current());
        }

        for source in self.users.values_mut() {
            if source.is_local_listener() {
                continue;
            }
            source.update(t);
        }
        for clip in self.clips.values_mut() {
            clip.update(t);
        }

        let mut activity_changes = Vec::new();
        for (id, source) in self.users.iter() {
            if let Some(analyser) = self.analysers.get_mut(id) {
                // Bind to the source's raw, pre-spatialization input, not
                // the distance-attenuated/panned render: a distant or
                // hard-panned but loudly-talking peer must still register
                // as active (spec.md §4.5, §9 Open Question 1).
                let mono = source.raw_input();
                if !mono.is_empty() {
                    if let Some(active) = analyser.update(mono) {
                        activity_changes.push((id.clone(), active));
                    }
                }
            }
        }
        activity_changes
    }

    /// Sums every user and clip source's rendered stereo output into one
    /// mix, normalizing by the number of contributing sources to avoid
    /// clipping -- the teacher's `mix_audio` behavior generalized to
    /// spatialized stereo frames instead of raw mono sums.
    pub fn mix(&self, frame_len: usize) -> AudioBuffer {
        let mut mixed = vec![0.0f32; frame_len * 2];
        let mut contributors = 0usize;

        for source in self.users.values().chain(self.clips.values()) {
            if source.is_local_listener() {
                continue;
            }
            let rendered = source.render(&self.listener);
            if rendered.is_empty() {
                continue;
            }
            contributors += 1;
            let len = mixed.len().min(rendered.len());
            for i in 0..len {
                mixed[i] += rendered[i];
            }
        }

        if contributors > 1 {
            let scale = 1.0 / contributors as f32;
            for sample in mixed.iter_mut() {
                *sample *= scale;
            }
        }
        mixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_is_idempotent() {
        let mut manager = AudioManager::new_mock();
        manager.create_user("bob");
        manager.create_user("bob");
        assert_eq!(manager.users().len(), 1);
    }

    #[test]
    fn set_audio_properties_propagates_to_every_attached_spatializer() {
        let mut manager = AudioManager::new_mock();
        manager.create_user("bob");
        manager
            .set_user_stream("bob", Some(vec![0.1; 256]))
            .unwrap();

        let props = AudioProperties {
            min_distance: 2.0,
            max_distance: 50.0,
            rolloff: 0.5,
            transition_time: 0.2,
        };
        manager.set_audio_properties(props);

        let bob = manager.users().get("bob").unwrap();
        let got = bob.spatializer().unwrap().audio_properties().unwrap();
        assert_eq!(got, props);
    }

    #[test]
    fn remove_user_clears_analyser() {
        let mut manager = AudioManager::new_mock();
        manager.create_user("bob");
        manager
            .set_user_stream("bob", Some(vec![0.1; 256]))
            .unwrap();
        manager.remove_user("bob");
        assert!(manager.users().get("bob").is_none());
    }

    #[test]
    fn local_listener_never_contributes_to_mix() {
        let mut manager = AudioManager::new_mock();
        manager.create_local_user("alice");
        // Local listener path never attaches a spatializer, so this succeeds
        // without ever making "alice" a mix contributor.
        manager.set_user_stream("alice", Some(vec![0.5; 256])).unwrap();
        manager.update();
        let mix = manager.mix(256);
        assert!(mix.iter().all(|&s| s == 0.0));
    }
}
