use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Empirically tuned offset applied to the mean speech-band magnitude
/// before thresholding. `getFloatFrequencyData`-style magnitude is negative
/// dBFS; this constant is kept exactly as observed rather than re-derived,
/// per the open question around its origin.
pub const ACTIVITY_SCORE_OFFSET: f64 = 1.1;
pub const ACTIVITY_THRESHOLD: f64 = 0.5;
pub const ACTIVITY_COUNTER_MAX: u32 = 60;
pub const ACTIVITY_ACTIVE_THRESHOLD: u32 = 5;
pub const SPEECH_BAND_LOW_HZ: f64 = 85.0;
pub const SPEECH_BAND_HIGH_HZ: f64 = 255.0;
const SMOOTHING_TIME_CONSTANT: f32 = 0.2;

/// FFT-based speech-activity detector bound to one audio source. Emits a
/// hysteresis-debounced `isActive` transition so brief dips inside
/// continuous speech don't flap the talking indicator.
pub struct ActivityAnalyser {
    id: String,
    buffer_size: usize,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed_db: Vec<f32>,
    low_bin: usize,
    high_bin: usize,
    counter: u32,
    is_active: bool,
}

impl ActivityAnalyser {
    /// `sample_rate` and `buffer_size` follow the Web Audio AnalyserNode
    /// convention: `fftSize = 2 * buffer_size`, `buffer_size` frequency bins.
    pub fn new(id: impl Into<String>, buffer_size: usize, sample_rate: f64) -> Self {
        let fft_size = buffer_size * 2;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let bin_for = |hz: f64| -> usize {
            ((hz / (sample_rate / 2.0)) * buffer_size as f64)
                .round()
                .clamp(0.0, buffer_size as f64) as usize
        };

        Self {
            id: id.into(),
            buffer_size,
            fft,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed_db: vec![-100.0; buffer_size],
            low_bin: bin_for(SPEECH_BAND_LOW_HZ),
            high_bin: bin_for(SPEECH_BAND_HIGH_HZ),
            counter: 0,
            is_active: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Feeds one buffer of time-domain samples (mono) through the analyser.
    /// Returns `Some(new_state)` exactly when `isActive` flips this tick.
    pub fn update(&mut self, input: &[f32]) -> Option<bool> {
        let fft_size = self.buffer_size * 2;
        for (i, bin) in self.scratch.iter_mut().enumerate() {
            let sample = input.get(i).copied().unwrap_or(0.0);
            let window = 0.5 - 0.5 * (2.0 * PI * i as f32 / (fft_size as f32 - 1.0)).cos();
            *bin = Complex::new(sample * window, 0.0);
        }
        self.fft.process(&mut self.scratch);

        for (bin, smoothed) in self.smoothed_db.iter_mut().enumerate() {
            let mag = self.scratch.get(bin).map(Complex::norm).unwrap_or(0.0);
            let db = if mag > 0.0 { 20.0 * mag.log10() } else { -100.0 };
            *smoothed = *smoothed * SMOOTHING_TIME_CONSTANT + db * (1.0 - SMOOTHING_TIME_CONSTANT);
        }

        let lo = self.low_bin.min(self.buffer_size.saturating_sub(1));
        let hi = self.high_bin.min(self.buffer_size.saturating_sub(1)).max(lo);
        let mean_db: f64 = self.smoothed_db[lo..=hi]
            .iter()
            .map(|&db| db as f64)
            .sum::<f64>()
            / (hi - lo + 1) as f64;

        let score = ACTIVITY_SCORE_OFFSET + mean_db / 100.0;

        if score >= ACTIVITY_THRESHOLD {
            self.counter = (self.counter + 1).min(ACTIVITY_COUNTER_MAX);
        } else {
            self.counter = self.counter.saturating_sub(1);
        }

        let new_active = self.counter > ACTIVITY_ACTIVE_THRESHOLD;
        if new_active != self.is_active {
            self.is_active = new_active;
            Some(new_active)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * 150.0 * i as f32 / 8000.0).sin() * 0.8)
            .collect()
    }

    fn silence(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    #[test]
    fn sustained_tone_eventually_reports_active_once() {
        let mut analyser = ActivityAnalyser::new("bob", 512, 8000.0);
        let tone = loud_tone(1024);
        let mut transitions = 0;
        let mut last = false;
        for _ in 0..20 {
            if let Some(active) = analyser.update(&tone) {
                transitions += 1;
                last = active;
            }
        }
        assert_eq!(transitions, 1, "expected exactly one isActive=true transition");
        assert!(last);
        assert!(analyser.is_active());
    }

    #[test]
    fn silence_never_activates() {
        let mut analyser = ActivityAnalyser::new("bob", 512, 8000.0);
        let quiet = silence(1024);
        for _ in 0..20 {
            assert!(analyser.update(&quiet).is_none());
        }
        assert!(!analyser.is_active());
    }

    #[test]
    fn activity_drops_after_signal_stops() {
        let mut analyser = ActivityAnalyser::new("bob", 512, 8000.0);
        let tone = loud_tone(1024);
        let quiet = silence(1024);
        for _ in 0..20 {
            analyser.update(&tone);
        }
        assert!(analyser.is_active());

        let mut saw_deactivate = false;
        for _ in 0..70 {
            if let Some(false) = analyser.update(&quiet) {
                saw_deactivate = true;
                break;
            }
        }
        assert!(saw_deactivate);
        assert!(!analyser.is_active());
    }
}
