use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Oscillator shape of a voice.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default, Serialize, Deserialize)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    // Takes a phase (0.0 to 1.0) and returns a sample (-1.0 to 1.0)
    pub fn sample(&self, phase: f64) -> f64 {
        let apply_fn = match self {
            Waveform::Sine => sine_wave,
            Waveform::Square => square_wave,
            Waveform::Sawtooth => sawtooth_wave,
            Waveform::Triangle => triangle_wave,
        };
        (apply_fn)(phase)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Waveform::Sine => "Sine",
            Waveform::Square => "Square",
            Waveform::Sawtooth => "Sawtooth",
            Waveform::Triangle => "Triangle",
        }
    }
}

pub fn sine_wave(phase: f64) -> f64 {
    (phase * 2.0 * PI).sin()
}

pub fn square_wave(phase: f64) -> f64 {
    if phase < 0.5 {
        1.0
    } else {
        -1.0
    }
}

pub fn sawtooth_wave(phase: f64) -> f64 {
    phase * 2.0 - 1.0
}

pub fn triangle_wave(phase: f64) -> f64 {
    if phase < 0.5 {
        phase * 4.0 - 1.0
    } else {
        3.0 - phase * 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveforms_stay_in_range() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Sawtooth,
            Waveform::Triangle,
        ] {
            for i in 0..100 {
                let value = waveform.sample(i as f64 / 100.0);
                assert!(
                    (-1.0..=1.0).contains(&value),
                    "{} out of range at step {}: {}",
                    waveform.as_str(),
                    i,
                    value
                );
            }
        }
    }

    #[test]
    fn test_sine_quarter_phase() {
        assert!(sine_wave(0.0).abs() < 1e-12);
        assert!((sine_wave(0.25) - 1.0).abs() < 1e-12);
        assert!((triangle_wave(0.5) - 1.0).abs() < 1e-12);
    }
}
