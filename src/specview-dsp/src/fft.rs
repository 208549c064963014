// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Pooled FFT engines.
//!
//! Planning a transform is an expensive one-time cost per size, so engines
//! are pooled by (size, direction) and recycled across reconfigurations
//! instead of being re-planned every time the FFT size changes.

use std::sync::{Arc, Mutex};

use num_complex::Complex;
use rustfft::{Fft, FftPlanner, FftPlannerScalar};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Planner selection
// ---------------------------------------------------------------------------

/// Which rustfft planner to use when building an engine.
///
/// `Auto` lets rustfft pick the fastest implementation for the running CPU.
/// The explicit SIMD variants are useful for reproducing numerical results
/// across machines; requesting one that the target does not support falls
/// back to `Auto` with a logged warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FftImplementation {
    #[default]
    Auto,
    Scalar,
    Sse,
    Neon,
}

/// Plan a transform with the preferred implementation, falling back to the
/// auto planner when the preference is unavailable. Returns the plan and the
/// implementation actually used.
fn plan(
    size: usize,
    inverse: bool,
    preferred: FftImplementation,
) -> (Arc<dyn Fft<f32>>, FftImplementation) {
    match preferred {
        FftImplementation::Auto => (plan_auto(size, inverse), FftImplementation::Auto),
        FftImplementation::Scalar => {
            let mut planner = FftPlannerScalar::new();
            let fft = if inverse {
                planner.plan_fft_inverse(size)
            } else {
                planner.plan_fft_forward(size)
            };
            (fft, FftImplementation::Scalar)
        }
        FftImplementation::Sse => {
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            {
                match rustfft::FftPlannerSse::new() {
                    Ok(mut planner) => {
                        let fft = if inverse {
                            planner.plan_fft_inverse(size)
                        } else {
                            planner.plan_fft_forward(size)
                        };
                        return (fft, FftImplementation::Sse);
                    }
                    Err(()) => {
                        warn!("SSE4.1 not available on this CPU; using auto FFT planner");
                    }
                }
            }
            #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
            warn!("SSE FFT planner requested on non-x86 target; using auto planner");
            (plan_auto(size, inverse), FftImplementation::Auto)
        }
        FftImplementation::Neon => {
            #[cfg(target_arch = "aarch64")]
            {
                match rustfft::FftPlannerNeon::new() {
                    Ok(mut planner) => {
                        let fft = if inverse {
                            planner.plan_fft_inverse(size)
                        } else {
                            planner.plan_fft_forward(size)
                        };
                        return (fft, FftImplementation::Neon);
                    }
                    Err(()) => {
                        warn!("NEON not available on this CPU; using auto FFT planner");
                    }
                }
            }
            #[cfg(not(target_arch = "aarch64"))]
            warn!("NEON FFT planner requested on non-aarch64 target; using auto planner");
            (plan_auto(size, inverse), FftImplementation::Auto)
        }
    }
}

fn plan_auto(size: usize, inverse: bool) -> Arc<dyn Fft<f32>> {
    let mut planner = FftPlanner::new();
    if inverse {
        planner.plan_fft_inverse(size)
    } else {
        planner.plan_fft_forward(size)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A transform engine for one fixed (size, direction).
///
/// Owns its input and output buffers. `transform()` runs out-of-place so the
/// caller's accumulation buffer is never touched; note that rustfft uses the
/// input buffer as scratch, so input contents are undefined after a call.
pub struct FftEngine {
    size: usize,
    inverse: bool,
    implementation: FftImplementation,
    fft: Arc<dyn Fft<f32>>,
    input: Vec<Complex<f32>>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl FftEngine {
    fn new(size: usize, inverse: bool, preferred: FftImplementation) -> Self {
        let (fft, implementation) = plan(size, inverse, preferred);
        let scratch_len = fft.get_outofplace_scratch_len();
        debug!(
            "Planned {} FFT: size {}, impl {:?}",
            if inverse { "inverse" } else { "forward" },
            size,
            implementation
        );
        Self {
            size,
            inverse,
            implementation,
            fft,
            input: vec![Complex::new(0.0, 0.0); size],
            output: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    /// The implementation actually planned (after any fallback).
    pub fn implementation(&self) -> FftImplementation {
        self.implementation
    }

    /// Input buffer, to be filled with exactly `size` samples.
    pub fn input_mut(&mut self) -> &mut [Complex<f32>] {
        &mut self.input
    }

    /// Output of the most recent `transform()`.
    pub fn output(&self) -> &[Complex<f32>] {
        &self.output
    }

    /// Run the transform on the input buffer, writing to the output buffer.
    pub fn transform(&mut self) {
        self.fft
            .process_outofplace_with_scratch(&mut self.input, &mut self.output, &mut self.scratch);
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Sequence index identifying a pooled engine for release.
pub type EngineHandle = usize;

struct PoolEntry {
    size: usize,
    inverse: bool,
    implementation: FftImplementation,
    in_use: bool,
    engine: Arc<Mutex<FftEngine>>,
}

/// Pool of reusable transform engines keyed by (size, direction).
///
/// The factory exclusively owns every engine; callers get a shared reference
/// plus the sequence index needed to release it. Engines are never destroyed
/// before the factory itself is dropped. Acquire/release happen only on
/// reconfiguration, so a single mutex over the whole pool is enough.
#[derive(Default)]
pub struct FftFactory {
    pool: Mutex<Vec<PoolEntry>>,
}

impl FftFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out an engine for (size, direction, implementation).
    ///
    /// Scans the pool in increasing sequence order and reuses the first free
    /// exact match (lowest index wins, which keeps reuse deterministic);
    /// otherwise constructs a new engine under the lock. Requests for an
    /// unavailable implementation match and construct engines by the
    /// preference as given, so a request keyed `sse` on a non-SSE machine
    /// consistently maps to the same fallen-back engine.
    pub fn acquire(
        &self,
        size: usize,
        inverse: bool,
        preferred: FftImplementation,
    ) -> (EngineHandle, Arc<Mutex<FftEngine>>) {
        let mut pool = self.pool.lock().expect("fft pool mutex poisoned");

        for (idx, entry) in pool.iter_mut().enumerate() {
            if !entry.in_use
                && entry.size == size
                && entry.inverse == inverse
                && entry.implementation == preferred
            {
                entry.in_use = true;
                debug!(
                    "Reusing {} FFT engine #{} (size {})",
                    if inverse { "inverse" } else { "forward" },
                    idx,
                    size
                );
                return (idx, Arc::clone(&entry.engine));
            }
        }

        let engine = Arc::new(Mutex::new(FftEngine::new(size, inverse, preferred)));
        let handle = pool.len();
        pool.push(PoolEntry {
            size,
            inverse,
            implementation: preferred,
            in_use: true,
            engine: Arc::clone(&engine),
        });
        (handle, engine)
    }

    /// Mark an engine free for reuse. An out-of-range or mismatched handle is
    /// a logged no-op: duplicate releases can happen during reconfiguration
    /// races and must not take the pipeline down.
    pub fn release(&self, size: usize, inverse: bool, handle: EngineHandle) {
        let mut pool = self.pool.lock().expect("fft pool mutex poisoned");
        match pool.get_mut(handle) {
            Some(entry) if entry.size == size && entry.inverse == inverse => {
                entry.in_use = false;
            }
            Some(_) => {
                warn!(
                    "Release of FFT engine #{} does not match (size {}, inverse {}); ignored",
                    handle, size, inverse
                );
            }
            None => {
                warn!("Release of out-of-range FFT engine #{}; ignored", handle);
            }
        }
    }

    /// Eagerly build engines across a power-of-two size range so the first
    /// reconfiguration after startup does not pay planning latency.
    pub fn preallocate(
        &self,
        min_size_log2: u32,
        max_size_log2: u32,
        count_forward: usize,
        count_inverse: usize,
        implementation: FftImplementation,
    ) {
        let mut pool = self.pool.lock().expect("fft pool mutex poisoned");
        for log2 in min_size_log2..=max_size_log2 {
            let size = 1usize << log2;
            for _ in 0..count_forward {
                pool.push(PoolEntry {
                    size,
                    inverse: false,
                    implementation,
                    in_use: false,
                    engine: Arc::new(Mutex::new(FftEngine::new(size, false, implementation))),
                });
            }
            for _ in 0..count_inverse {
                pool.push(PoolEntry {
                    size,
                    inverse: true,
                    implementation,
                    in_use: false,
                    engine: Arc::new(Mutex::new(FftEngine::new(size, true, implementation))),
                });
            }
        }
    }

    /// Number of engines currently pooled (in use or free).
    pub fn pool_size(&self) -> usize {
        self.pool.lock().expect("fft pool mutex poisoned").len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
