// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod averaging;
pub mod fft;
pub mod spectrum;
pub mod window;

pub use averaging::{AveragingMode, SpectrumAverager};
pub use fft::{EngineHandle, FftEngine, FftFactory, FftImplementation};
pub use spectrum::{
    zoom_window, DisplaySink, FrameInfo, FrameSink, SpectrumAnalyzer, SpectrumSettings,
    MAX_FFT_SIZE, MIN_FFT_SIZE,
};
pub use window::{Window, WindowKind};
