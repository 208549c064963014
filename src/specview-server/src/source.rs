// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! IQ sample source abstraction and the built-in synthetic sources.

use std::f64::consts::TAU;

use num_complex::Complex;

use crate::config::SourceConfig;

/// Abstraction over any IQ sample source.
pub trait IqSource: Send + 'static {
    /// Read the next block of IQ samples into `buf`.
    /// Returns the number of samples written, or an error string.
    fn read_into(&mut self, buf: &mut [Complex<f32>]) -> Result<usize, String>;
}

/// IQ source that produces silence (all zeros).
pub struct SilenceSource;

impl IqSource for SilenceSource {
    fn read_into(&mut self, buf: &mut [Complex<f32>]) -> Result<usize, String> {
        buf.fill(Complex::new(0.0, 0.0));
        Ok(buf.len())
    }
}

/// IQ source producing a complex oscillator at a fixed offset from the
/// centre frequency. Positive offsets land in the upper half of the span.
pub struct ToneSource {
    phase: f64,
    phase_inc: f64,
    amplitude: f32,
}

impl ToneSource {
    pub fn new(tone_offset_hz: f64, sample_rate: u32, amplitude: f32) -> Self {
        Self {
            phase: 0.0,
            phase_inc: TAU * tone_offset_hz / sample_rate as f64,
            amplitude,
        }
    }
}

impl IqSource for ToneSource {
    fn read_into(&mut self, buf: &mut [Complex<f32>]) -> Result<usize, String> {
        for sample in buf.iter_mut() {
            *sample = Complex::new(
                self.amplitude * self.phase.cos() as f32,
                self.amplitude * self.phase.sin() as f32,
            );
            self.phase += self.phase_inc;
            if self.phase >= TAU {
                self.phase -= TAU;
            } else if self.phase <= -TAU {
                self.phase += TAU;
            }
        }
        Ok(buf.len())
    }
}

/// Construct the IQ source described by `[source]`.
pub fn build_source(cfg: &SourceConfig) -> Box<dyn IqSource> {
    match cfg.source_type.as_str() {
        "silence" => Box::new(SilenceSource),
        _ => Box::new(ToneSource::new(
            cfg.tone_offset_hz,
            cfg.sample_rate,
            cfg.amplitude,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_source_fills_zeros() {
        let mut src = SilenceSource;
        let mut buf = vec![Complex::new(1.0_f32, 1.0_f32); 64];
        let n = src.read_into(&mut buf).unwrap();
        assert_eq!(n, 64);
        for s in &buf {
            assert_eq!(s.re, 0.0);
            assert_eq!(s.im, 0.0);
        }
    }

    #[test]
    fn tone_source_has_constant_magnitude() {
        let mut src = ToneSource::new(1000.0, 48_000, 0.5);
        let mut buf = vec![Complex::new(0.0_f32, 0.0_f32); 256];
        let n = src.read_into(&mut buf).unwrap();
        assert_eq!(n, 256);
        for s in &buf {
            assert!((s.norm() - 0.5).abs() < 1e-4, "magnitude drifted: {}", s.norm());
        }
    }

    #[test]
    fn tone_source_rotates_at_expected_rate() {
        // offset = sample_rate / 4 advances the phase by a quarter turn per
        // sample, so sample 4 should be back on the positive real axis.
        let mut src = ToneSource::new(12_000.0, 48_000, 1.0);
        let mut buf = vec![Complex::new(0.0_f32, 0.0_f32); 8];
        src.read_into(&mut buf).unwrap();
        assert!((buf[0].re - 1.0).abs() < 1e-5);
        assert!(buf[0].im.abs() < 1e-5);
        assert!(buf[1].re.abs() < 1e-5);
        assert!((buf[1].im - 1.0).abs() < 1e-5);
        assert!((buf[4].re - 1.0).abs() < 1e-4);
    }

    #[test]
    fn negative_offset_rotates_clockwise() {
        let mut src = ToneSource::new(-12_000.0, 48_000, 1.0);
        let mut buf = vec![Complex::new(0.0_f32, 0.0_f32); 2];
        src.read_into(&mut buf).unwrap();
        assert!((buf[1].im + 1.0).abs() < 1e-5);
    }

    #[test]
    fn build_source_honours_type() {
        let mut cfg = SourceConfig::default();
        cfg.source_type = "silence".to_string();
        let mut src = build_source(&cfg);
        let mut buf = vec![Complex::new(1.0_f32, 0.0_f32); 4];
        src.read_into(&mut buf).unwrap();
        assert_eq!(buf[0], Complex::new(0.0, 0.0));
    }
}
