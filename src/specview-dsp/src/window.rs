// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Precomputed FFT window coefficient tables.

use std::f32::consts::PI;

use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Supported window shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowKind {
    Rectangular,
    Bartlett,
    #[default]
    Hanning,
    Hamming,
    Blackman,
    BlackmanHarris,
}

/// Per-sample multiplicative coefficients for one (kind, size).
///
/// `apply` always writes into a separate destination buffer: the source is
/// the frame accumulation buffer, whose trailing samples are retained across
/// frames for overlap, so it must never be windowed in place.
pub struct Window {
    kind: WindowKind,
    coeffs: Vec<f32>,
}

impl Window {
    pub fn new(kind: WindowKind, size: usize) -> Self {
        let m = size.saturating_sub(1).max(1) as f32;
        let coeffs = (0..size)
            .map(|i| {
                let x = i as f32 / m;
                match kind {
                    WindowKind::Rectangular => 1.0,
                    WindowKind::Bartlett => 1.0 - (2.0 * x - 1.0).abs(),
                    WindowKind::Hanning => 0.5 * (1.0 - (2.0 * PI * x).cos()),
                    WindowKind::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
                    WindowKind::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
                    }
                    WindowKind::BlackmanHarris => {
                        0.35875 - 0.48829 * (2.0 * PI * x).cos()
                            + 0.14128 * (4.0 * PI * x).cos()
                            - 0.01168 * (6.0 * PI * x).cos()
                    }
                }
            })
            .collect();
        Self { kind, coeffs }
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.coeffs.len()
    }

    /// Multiply `src` by the window, writing exactly `size` samples to `dst`.
    pub fn apply(&self, src: &[Complex<f32>], dst: &mut [Complex<f32>]) {
        debug_assert_eq!(src.len(), self.coeffs.len());
        debug_assert_eq!(dst.len(), self.coeffs.len());
        if self.kind == WindowKind::Rectangular {
            dst.copy_from_slice(src);
            return;
        }
        for ((d, s), &c) in dst.iter_mut().zip(src).zip(&self.coeffs) {
            *d = s * c;
        }
    }
}
