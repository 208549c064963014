// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Streaming spectrum analyzer.
//!
//! Consumes complex baseband samples on the producer's thread, accumulates
//! overlapped FFT frames, reduces per-bin power through the configured
//! averaging strategy and fans completed frames out to the attached sinks.
//!
//! Locking discipline: one mutex over the whole analyzer state. `feed` takes
//! it with a non-blocking try and drops the batch when a reconfiguration
//! holds the lock — the sample thread must never stall, a missing display
//! frame is acceptable. Configuration calls block; they are rare.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::averaging::{AveragingMode, SpectrumAverager};
use crate::fft::{EngineHandle, FftEngine, FftFactory, FftImplementation};
use crate::window::{Window, WindowKind};

/// Smallest accepted FFT size; requests below are clamped up.
pub const MIN_FFT_SIZE: usize = 64;
/// Largest accepted FFT size; requests above are clamped down.
pub const MAX_FFT_SIZE: usize = 4096;

/// Moving-average history is bounded to this many f32 values in total.
const MOVING_HISTORY_CAP: usize = 1 << 22;
/// Fixed/max averaging depth bound.
const BATCH_DEPTH_CAP: usize = 1 << 16;

/// dB conversion via log2: `10*log10(x) == LOG2_MULT * log2(x)`.
const LOG2_MULT: f32 = 10.0 / std::f32::consts::LOG2_10;
/// Floor applied before log2 so silent bins stay finite.
const POWER_FLOOR: f32 = 1e-48;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Analyzer configuration, applied atomically as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumSettings {
    /// FFT length; clamped to `[MIN_FFT_SIZE, MAX_FFT_SIZE]` and rounded up
    /// to a power of two.
    pub fft_size: usize,
    pub window: WindowKind,
    /// Samples retained from the previous frame; clamped to
    /// `[0, fft_size/2 - 1]`.
    pub overlap: usize,
    pub averaging_mode: AveragingMode,
    pub averaging_depth: usize,
    /// Linear display values instead of dB.
    pub linear: bool,
    /// Reference level forwarded in broadcast frame metadata (display-only).
    pub ref_level: f32,
    /// Power range forwarded in broadcast frame metadata (display-only).
    pub power_range: f32,
    /// Display magnification; 1.0 shows the full spectrum.
    pub zoom_factor: f32,
    /// Zoom center in `[0, 1]`.
    pub zoom_pos: f32,
    pub fft_implementation: FftImplementation,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            window: WindowKind::Hanning,
            overlap: 0,
            averaging_mode: AveragingMode::None,
            averaging_depth: 1,
            linear: false,
            ref_level: 0.0,
            power_range: 100.0,
            zoom_factor: 1.0,
            zoom_pos: 0.5,
            fft_implementation: FftImplementation::Auto,
        }
    }
}

impl SpectrumSettings {
    /// Copy with every field forced into its valid range.
    pub fn sanitized(&self) -> Self {
        let mut s = self.clone();
        s.fft_size = s
            .fft_size
            .next_power_of_two()
            .clamp(MIN_FFT_SIZE, MAX_FFT_SIZE);
        s.overlap = s.overlap.min(s.fft_size / 2 - 1);
        let depth_cap = match s.averaging_mode {
            AveragingMode::Moving => (MOVING_HISTORY_CAP / s.fft_size).max(1),
            _ => BATCH_DEPTH_CAP,
        };
        if s.averaging_depth > depth_cap {
            warn!(
                "Averaging depth {} capped to {} for fft size {}",
                s.averaging_depth, depth_cap, s.fft_size
            );
            s.averaging_depth = depth_cap;
        }
        s.averaging_depth = s.averaging_depth.max(1);
        if !(s.zoom_factor >= 1.0) {
            s.zoom_factor = 1.0;
        }
        s.zoom_pos = s.zoom_pos.clamp(0.0, 1.0);
        s
    }
}

// ---------------------------------------------------------------------------
// Zoom window
// ---------------------------------------------------------------------------

/// Bin range `[min, max)` selected for display magnification.
///
/// `zoom_factor == 1.0` always spans the full spectrum regardless of
/// position. Both edges are clamped to `[0, fft_size]` so no combination of
/// inputs can produce an out-of-range slice.
pub fn zoom_window(zoom_factor: f32, zoom_pos: f32, fft_size: usize) -> (usize, usize) {
    if zoom_factor <= 1.0 {
        return (0, fft_size);
    }
    let half_span = 0.5 / zoom_factor;
    let min = ((zoom_pos - half_span) * fft_size as f32).floor();
    let max = ((zoom_pos + half_span) * fft_size as f32).floor();
    let min = (min.max(0.0) as usize).min(fft_size);
    let max = (max.max(0.0) as usize).min(fft_size);
    (min, max.max(min))
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Display consumer. Receives the zoom-windowed slice plus the full FFT size
/// so it can map the slice back to absolute bin positions. Called on the
/// processing thread; must not block.
pub trait DisplaySink: Send {
    fn new_spectrum(&mut self, spectrum: &[f32], fft_size: usize);
}

/// Metadata attached to every broadcast frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    pub fft_size: u32,
    pub latency_ms: i64,
    pub ref_level: f32,
    pub power_range: f32,
    pub center_frequency: u64,
    pub bandwidth: i32,
    pub linear: bool,
}

/// Full-frame consumer (broadcast path). Called on the processing thread;
/// must not block. The slice is only valid for the duration of the call.
pub trait FrameSink: Send {
    fn new_frame(&mut self, info: &FrameInfo, spectrum: &[f32]);
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

struct Inner {
    factory: Arc<FftFactory>,
    settings: SpectrumSettings,
    engine: Arc<Mutex<FftEngine>>,
    engine_handle: EngineHandle,
    window: Window,
    averager: SpectrumAverager,

    /// Frame accumulation buffer, always `fft_size` long. The leading
    /// `overlap` samples are carried over from the previous frame.
    frame_buf: Vec<Complex<f32>>,
    /// Write position into `frame_buf`; `overlap <= buffer_fill <= fft_size`.
    buffer_fill: usize,
    /// New samples consumed per frame: `fft_size - overlap`.
    refill_size: usize,
    /// Set while a partial frame is waiting for more samples; `flush` uses it
    /// to decide whether a truncated final frame is worth processing.
    awaiting_samples: bool,
    /// When the current frame's first fresh sample arrived.
    refill_started: Option<Instant>,

    power_spectrum: Vec<f32>,
    psd: Vec<f32>,
    spec_max: f32,

    log_offset: f32,
    norm: f32,

    center_frequency: u64,
    sample_rate: u32,

    display_sinks: Vec<Box<dyn DisplaySink>>,
    frame_sinks: Vec<Box<dyn FrameSink>>,
}

/// The spectrum pipeline hub. See the module docs for the threading model.
pub struct SpectrumAnalyzer {
    inner: Mutex<Inner>,
    running: AtomicBool,
}

impl SpectrumAnalyzer {
    /// Build an analyzer around a shared engine factory. The factory is
    /// injected so every FFT consumer in the process draws from one pool.
    pub fn new(factory: Arc<FftFactory>, settings: &SpectrumSettings) -> Self {
        let s = settings.sanitized();
        let (engine_handle, engine) =
            factory.acquire(s.fft_size, false, s.fft_implementation);
        let inner = Inner {
            window: Window::new(s.window, s.fft_size),
            averager: SpectrumAverager::new(s.averaging_mode, s.fft_size, s.averaging_depth),
            frame_buf: vec![Complex::new(0.0, 0.0); s.fft_size],
            buffer_fill: s.overlap,
            refill_size: s.fft_size - s.overlap,
            awaiting_samples: false,
            refill_started: None,
            power_spectrum: vec![0.0; s.fft_size],
            psd: vec![0.0; s.fft_size],
            spec_max: 0.0,
            log_offset: 20.0 * (1.0 / s.fft_size as f32).log10(),
            norm: (s.fft_size * s.fft_size) as f32,
            center_frequency: 0,
            sample_rate: 0,
            display_sinks: Vec::new(),
            frame_sinks: Vec::new(),
            factory,
            settings: s,
            engine,
            engine_handle,
        };
        Self {
            inner: Mutex::new(inner),
            running: AtomicBool::new(true),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn add_display_sink(&self, sink: Box<dyn DisplaySink>) {
        self.lock_inner().display_sinks.push(sink);
    }

    pub fn add_frame_sink(&self, sink: Box<dyn FrameSink>) {
        self.lock_inner().frame_sinks.push(sink);
    }

    /// Feed a batch of complex samples from the producer thread.
    ///
    /// Non-blocking: when a configuration change holds the lock the whole
    /// batch is dropped. With no sinks attached the input is discarded before
    /// any buffering work.
    pub fn feed(&self, samples: &[Complex<f32>], positive_only: bool) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let Ok(mut inner) = self.inner.try_lock() else {
            trace!("Spectrum feed contended; dropping {} samples", samples.len());
            return;
        };
        if inner.display_sinks.is_empty() && inner.frame_sinks.is_empty() {
            return;
        }
        inner.feed(samples, positive_only);
    }

    /// Process whatever is buffered as a truncated final frame, zero-padding
    /// the remainder. Intended for end-of-stream; a frame with no fresh
    /// samples is not processed.
    pub fn flush(&self, positive_only: bool) {
        let mut inner = self.lock_inner();
        if !inner.awaiting_samples {
            return;
        }
        let fill = inner.buffer_fill;
        for s in &mut inner.frame_buf[fill..] {
            *s = Complex::new(0.0, 0.0);
        }
        inner.buffer_fill = inner.frame_buf.len();
        inner.complete_frame(positive_only);
    }

    /// Apply a new configuration as a unit. Blocks until the sample thread is
    /// out of `feed`. With `force` the exact same settings are re-applied,
    /// which reallocates everything — useful at initial setup.
    pub fn apply_settings(&self, settings: &SpectrumSettings, force: bool) {
        let s = settings.sanitized();
        let mut inner = self.lock_inner();
        inner.apply_settings(s, force);
    }

    pub fn settings(&self) -> SpectrumSettings {
        self.lock_inner().settings.clone()
    }

    /// Absorb a device-boundary signal change: cache the metadata used in
    /// broadcast frames without disturbing the buffering state.
    pub fn handle_signal_change(&self, center_frequency: u64, sample_rate: u32) {
        let mut inner = self.lock_inner();
        inner.center_frequency = center_frequency;
        inner.sample_rate = sample_rate;
        debug!(
            "Signal change: center {} Hz, sample rate {} S/s",
            center_frequency, sample_rate
        );
    }

    /// Owned copy of the linear power spectral density of the latest
    /// completed cycle.
    pub fn psd_copy(&self) -> Vec<f32> {
        self.lock_inner().psd.clone()
    }

    /// Maximum raw power seen during the current reduction cycle.
    pub fn spec_max(&self) -> f32 {
        self.lock_inner().spec_max
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("spectrum analyzer mutex poisoned")
    }
}

impl Inner {
    fn feed(&mut self, samples: &[Complex<f32>], positive_only: bool) {
        let mut remaining = samples;
        while !remaining.is_empty() {
            if self.refill_started.is_none() {
                self.refill_started = Some(Instant::now());
            }
            let needed = self.frame_buf.len() - self.buffer_fill;
            if remaining.len() >= needed {
                let fill = self.buffer_fill;
                self.frame_buf[fill..].copy_from_slice(&remaining[..needed]);
                remaining = &remaining[needed..];
                self.buffer_fill = self.frame_buf.len();
                self.complete_frame(positive_only);
            } else {
                let fill = self.buffer_fill;
                self.frame_buf[fill..fill + remaining.len()].copy_from_slice(remaining);
                self.buffer_fill += remaining.len();
                self.awaiting_samples = true;
                return;
            }
        }
    }

    /// Window + transform + reduce + dispatch for one full frame, then slide
    /// the buffer: the trailing `overlap` samples seed the next frame.
    fn complete_frame(&mut self, positive_only: bool) {
        let size = self.frame_buf.len();
        let overlap = self.settings.overlap;
        let latency_ms = self
            .refill_started
            .map(|t| t.elapsed().as_millis() as i64)
            .unwrap_or(0);

        let cycle_done = {
            let engine = Arc::clone(&self.engine);
            let mut engine = engine.lock().expect("fft engine mutex poisoned");
            self.window.apply(&self.frame_buf, engine.input_mut());
            engine.transform();
            self.reduce(engine.output(), positive_only)
        };

        if cycle_done {
            self.dispatch(latency_ms);
            self.spec_max = 0.0;
        }
        self.averager.next_cycle();

        // Slide: retain the last `overlap` samples at the head.
        let refill = self.refill_size;
        self.frame_buf.copy_within(refill.., 0);
        self.buffer_fill = overlap;
        self.awaiting_samples = false;
        self.refill_started = None;
        debug_assert_eq!(refill + overlap, size);
    }

    /// Per-bin power, averaging and conversion into display order. Returns
    /// whether the reduction cycle completed on this frame (identical for
    /// every bin; the depth is shared).
    fn reduce(&mut self, fft_out: &[Complex<f32>], positive_only: bool) -> bool {
        let size = fft_out.len();
        let half = size / 2;
        let linear = self.settings.linear;
        let mut ready = true;

        if positive_only {
            // Lower half only, each bin doubled into two adjacent display
            // slots for symmetric single-sided rendering.
            for bin in 0..half {
                let c = fft_out[bin];
                let power = c.re * c.re + c.im * c.im;
                if power > self.spec_max {
                    self.spec_max = power;
                }
                let (v, r) = self.averager.store_and_get(bin, power);
                ready = r;
                if r {
                    let psd = v / self.norm;
                    let display = self.to_display(v, linear);
                    self.psd[2 * bin] = psd;
                    self.psd[2 * bin + 1] = psd;
                    self.power_spectrum[2 * bin] = display;
                    self.power_spectrum[2 * bin + 1] = display;
                }
            }
        } else {
            // Full dual-sided spectrum, negative frequencies first.
            for pos in 0..size {
                let bin = (pos + half) % size;
                let c = fft_out[bin];
                let power = c.re * c.re + c.im * c.im;
                if power > self.spec_max {
                    self.spec_max = power;
                }
                let (v, r) = self.averager.store_and_get(bin, power);
                ready = r;
                if r {
                    self.psd[pos] = v / self.norm;
                    self.power_spectrum[pos] = self.to_display(v, linear);
                }
            }
        }
        ready
    }

    fn to_display(&self, power: f32, linear: bool) -> f32 {
        if linear {
            power / self.norm
        } else {
            LOG2_MULT * power.max(POWER_FLOOR).log2() + self.log_offset
        }
    }

    fn dispatch(&mut self, latency_ms: i64) {
        let size = self.power_spectrum.len();
        let (min, max) = zoom_window(self.settings.zoom_factor, self.settings.zoom_pos, size);
        for sink in &mut self.display_sinks {
            sink.new_spectrum(&self.power_spectrum[min..max], size);
        }
        if !self.frame_sinks.is_empty() {
            let info = FrameInfo {
                fft_size: size as u32,
                latency_ms,
                ref_level: self.settings.ref_level,
                power_range: self.settings.power_range,
                center_frequency: self.center_frequency,
                bandwidth: self.sample_rate as i32,
                linear: self.settings.linear,
            };
            for sink in &mut self.frame_sinks {
                sink.new_frame(&info, &self.power_spectrum);
            }
        }
    }

    fn apply_settings(&mut self, s: SpectrumSettings, force: bool) {
        let size_changed = force
            || s.fft_size != self.settings.fft_size
            || s.fft_implementation != self.settings.fft_implementation;
        let window_changed = size_changed || s.window != self.settings.window;
        let overlap_changed = size_changed || s.overlap != self.settings.overlap;
        let averaging_changed = size_changed
            || s.averaging_mode != self.settings.averaging_mode
            || s.averaging_depth != self.settings.averaging_depth;

        if size_changed {
            let old = &self.settings;
            self.factory
                .release(old.fft_size, false, self.engine_handle);
            let (handle, engine) =
                self.factory
                    .acquire(s.fft_size, false, s.fft_implementation);
            self.engine_handle = handle;
            self.engine = engine;

            self.frame_buf = vec![Complex::new(0.0, 0.0); s.fft_size];
            self.power_spectrum = vec![0.0; s.fft_size];
            self.psd = vec![0.0; s.fft_size];
            self.log_offset = 20.0 * (1.0 / s.fft_size as f32).log10();
            self.norm = (s.fft_size * s.fft_size) as f32;
            self.spec_max = 0.0;
            debug!("Spectrum reconfigured: fft size {}", s.fft_size);
        }
        if window_changed {
            self.window = Window::new(s.window, s.fft_size);
        }
        if overlap_changed {
            self.refill_size = s.fft_size - s.overlap;
            self.buffer_fill = s.overlap;
            self.awaiting_samples = false;
            self.refill_started = None;
        }
        if averaging_changed {
            if s.averaging_mode == self.averager.mode() {
                self.averager.resize(s.fft_size, s.averaging_depth);
            } else {
                self.averager =
                    SpectrumAverager::new(s.averaging_mode, s.fft_size, s.averaging_depth);
            }
        }
        self.settings = s;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.factory
            .release(self.settings.fft_size, false, self.engine_handle);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
