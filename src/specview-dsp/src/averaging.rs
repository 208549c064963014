// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-bin spectrum averaging strategies.
//!
//! Four interchangeable reductions over a sequence of per-bin power values.
//! All share the per-bin `store_and_get` / per-frame `next_cycle` shape, but
//! their output cadence differs on purpose: `Moving` reports a value on every
//! frame, while `Fixed` and `Max` batch one result per `depth` frames. A
//! depth of 1 (or 0) degenerates every mode to identity.

use serde::{Deserialize, Serialize};

/// Selects the active reduction strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AveragingMode {
    #[default]
    None,
    Moving,
    Fixed,
    Max,
}

// ---------------------------------------------------------------------------
// Moving average
// ---------------------------------------------------------------------------

/// Continuous moving average over the last `depth` frames per bin.
///
/// Keeps a circular history so the running sum is updated by subtracting the
/// evicted value and adding the new one; O(1) per bin per frame.
pub struct MovingAverager {
    width: usize,
    depth: usize,
    history: Vec<f32>,
    sum: Vec<f32>,
    cycle: usize,
}

impl MovingAverager {
    pub fn new(width: usize, depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            width,
            depth,
            history: vec![0.0; width * depth],
            sum: vec![0.0; width],
            cycle: 0,
        }
    }

    pub fn store_and_get(&mut self, bin: usize, value: f32) -> (f32, bool) {
        if self.depth <= 1 {
            return (value, true);
        }
        let slot = &mut self.history[self.cycle * self.width + bin];
        self.sum[bin] += value - *slot;
        *slot = value;
        (self.sum[bin] / self.depth as f32, true)
    }

    pub fn next_cycle(&mut self) {
        self.cycle = (self.cycle + 1) % self.depth;
    }
}

// ---------------------------------------------------------------------------
// Fixed-window average
// ---------------------------------------------------------------------------

/// Block average: sums `depth` frames per bin, reports once per full cycle.
pub struct FixedAverager {
    depth: usize,
    sum: Vec<f32>,
    cycle: usize,
}

impl FixedAverager {
    pub fn new(width: usize, depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            sum: vec![0.0; width],
            cycle: 0,
        }
    }

    pub fn store_and_get(&mut self, bin: usize, value: f32) -> (f32, bool) {
        if self.depth <= 1 {
            return (value, true);
        }
        self.sum[bin] += value;
        if self.cycle == self.depth - 1 {
            let avg = self.sum[bin] / self.depth as f32;
            self.sum[bin] = 0.0;
            (avg, true)
        } else {
            (value, false)
        }
    }

    pub fn next_cycle(&mut self) {
        self.cycle = (self.cycle + 1) % self.depth;
    }
}

// ---------------------------------------------------------------------------
// Maximum hold
// ---------------------------------------------------------------------------

/// Per-bin maximum over `depth` frames, reported once per full cycle.
/// Inputs are raw powers, so zero is a safe floor between cycles.
pub struct MaxHolder {
    depth: usize,
    max: Vec<f32>,
    cycle: usize,
}

impl MaxHolder {
    pub fn new(width: usize, depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            max: vec![0.0; width],
            cycle: 0,
        }
    }

    pub fn store_and_get(&mut self, bin: usize, value: f32) -> (f32, bool) {
        if self.depth <= 1 {
            return (value, true);
        }
        if value > self.max[bin] {
            self.max[bin] = value;
        }
        if self.cycle == self.depth - 1 {
            let held = self.max[bin];
            self.max[bin] = 0.0;
            (held, true)
        } else {
            (value, false)
        }
    }

    pub fn next_cycle(&mut self) {
        self.cycle = (self.cycle + 1) % self.depth;
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// The active averaging strategy, sized to the current FFT width.
pub enum SpectrumAverager {
    None,
    Moving(MovingAverager),
    Fixed(FixedAverager),
    Max(MaxHolder),
}

impl SpectrumAverager {
    pub fn new(mode: AveragingMode, width: usize, depth: usize) -> Self {
        match mode {
            AveragingMode::None => SpectrumAverager::None,
            AveragingMode::Moving => SpectrumAverager::Moving(MovingAverager::new(width, depth)),
            AveragingMode::Fixed => SpectrumAverager::Fixed(FixedAverager::new(width, depth)),
            AveragingMode::Max => SpectrumAverager::Max(MaxHolder::new(width, depth)),
        }
    }

    pub fn mode(&self) -> AveragingMode {
        match self {
            SpectrumAverager::None => AveragingMode::None,
            SpectrumAverager::Moving(_) => AveragingMode::Moving,
            SpectrumAverager::Fixed(_) => AveragingMode::Fixed,
            SpectrumAverager::Max(_) => AveragingMode::Max,
        }
    }

    /// Feed one bin's power for the current frame. Returns the reduced value
    /// and whether it is reportable this cycle.
    pub fn store_and_get(&mut self, bin: usize, value: f32) -> (f32, bool) {
        match self {
            SpectrumAverager::None => (value, true),
            SpectrumAverager::Moving(a) => a.store_and_get(bin, value),
            SpectrumAverager::Fixed(a) => a.store_and_get(bin, value),
            SpectrumAverager::Max(a) => a.store_and_get(bin, value),
        }
    }

    /// Advance the cycle counter. Called once per processed frame, after all
    /// bins have been stored; the cycle boundary is per-frame, not per-bin.
    pub fn next_cycle(&mut self) {
        match self {
            SpectrumAverager::None => {}
            SpectrumAverager::Moving(a) => a.next_cycle(),
            SpectrumAverager::Fixed(a) => a.next_cycle(),
            SpectrumAverager::Max(a) => a.next_cycle(),
        }
    }

    /// Rebuild the accumulators for a new width/depth. Always zero-fills:
    /// stale sums from a different width must never be read back, and
    /// resizing to the same geometry twice must leave the state zeroed, not
    /// doubled.
    pub fn resize(&mut self, width: usize, depth: usize) {
        *self = SpectrumAverager::new(self.mode(), width, depth);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn fixed_reports_once_per_depth_with_the_mean() {
        let depth = 4;
        let mut avg = FixedAverager::new(1, depth);
        let values = [2.0, 4.0, 6.0, 8.0, 10.0, 20.0, 30.0, 40.0];
        let mut reported = Vec::new();
        for &value in &values {
            let (v, ready) = avg.store_and_get(0, value);
            if ready {
                reported.push(v);
            }
            avg.next_cycle();
        }
        assert_eq!(reported.len(), 2, "one report per full cycle");
        assert!((reported[0] - 5.0).abs() < 1e-6);
        assert!((reported[1] - 25.0).abs() < 1e-6);
    }

    #[test]
    fn max_holds_the_true_maximum_per_cycle() {
        let mut hold = MaxHolder::new(1, 3);
        let mut reported = Vec::new();
        for v in [1.0, 7.0, 3.0, 2.0, 0.5, 1.5] {
            let (out, ready) = hold.store_and_get(0, v);
            if ready {
                reported.push(out);
            }
            hold.next_cycle();
        }
        assert_eq!(reported, vec![7.0, 2.0]);
    }

    #[test]
    fn moving_matches_naive_recomputation() {
        let depth = 8;
        let mut avg = MovingAverager::new(1, depth);
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut fed: Vec<f32> = Vec::new();
        for _ in 0..100 {
            let v: f32 = rng.gen_range(0.0..100.0);
            fed.push(v);
            let (out, ready) = avg.store_and_get(0, v);
            assert!(ready, "moving average reports every call");
            avg.next_cycle();
            // Naive O(N) reference: mean of the last `depth` values, with
            // zeros standing in before the history fills.
            let naive: f32 = fed
                .iter()
                .rev()
                .take(depth)
                .sum::<f32>()
                / depth as f32;
            assert!((out - naive).abs() < 1e-3, "got {}, want {}", out, naive);
        }
    }

    #[test]
    fn moving_is_per_bin() {
        let mut avg = MovingAverager::new(2, 2);
        avg.store_and_get(0, 4.0);
        avg.store_and_get(1, 8.0);
        avg.next_cycle();
        let (b0, _) = avg.store_and_get(0, 4.0);
        let (b1, _) = avg.store_and_get(1, 8.0);
        assert!((b0 - 4.0).abs() < 1e-6);
        assert!((b1 - 8.0).abs() < 1e-6);
    }

    #[test]
    fn depth_one_degenerates_to_identity_everywhere() {
        for mode in [
            AveragingMode::None,
            AveragingMode::Moving,
            AveragingMode::Fixed,
            AveragingMode::Max,
        ] {
            let mut avg = SpectrumAverager::new(mode, 4, 1);
            for v in [3.0, 1.0, 2.0] {
                let (out, ready) = avg.store_and_get(2, v);
                assert!(ready, "{:?} must be always-ready at depth 1", mode);
                assert_eq!(out, v, "{:?} must pass values through at depth 1", mode);
                avg.next_cycle();
            }
        }
    }

    #[test]
    fn depth_zero_is_treated_as_one() {
        let mut avg = SpectrumAverager::new(AveragingMode::Fixed, 2, 0);
        let (out, ready) = avg.store_and_get(0, 9.0);
        assert!(ready);
        assert_eq!(out, 9.0);
    }

    #[test]
    fn resize_is_idempotent_and_zero_fills() {
        let mut avg = SpectrumAverager::new(AveragingMode::Fixed, 2, 3);
        avg.store_and_get(0, 10.0);
        avg.store_and_get(1, 20.0);
        avg.next_cycle();

        avg.resize(2, 3);
        avg.resize(2, 3);

        // After two resizes the accumulator starts a clean cycle: feeding the
        // same value three times must average to exactly that value.
        let mut last = (0.0, false);
        for _ in 0..3 {
            last = avg.store_and_get(0, 6.0);
            avg.next_cycle();
        }
        assert!(last.1);
        assert!((last.0 - 6.0).abs() < 1e-6);
    }

    #[test]
    fn resize_after_width_change_never_reads_stale_data() {
        let mut avg = SpectrumAverager::new(AveragingMode::Max, 8, 2);
        for bin in 0..8 {
            avg.store_and_get(bin, 100.0);
        }
        avg.next_cycle();
        avg.resize(4, 2);
        let (_, ready) = avg.store_and_get(3, 1.0);
        assert!(!ready);
        avg.next_cycle();
        let (held, ready) = avg.store_and_get(3, 0.5);
        assert!(ready);
        assert!((held - 1.0).abs() < 1e-6, "stale max must not survive resize");
    }
}
