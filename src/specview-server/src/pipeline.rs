// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! IQ read loop: pulls sample blocks from the configured source on a
//! dedicated OS thread and feeds them to the spectrum analyzer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use num_complex::Complex;
use specview_dsp::SpectrumAnalyzer;

use crate::source::IqSource;

/// Real-time pacing against absolute deadlines.
///
/// Synthetic sources return instantly, so the loop must sleep off the rest
/// of each block period itself; a blocking hardware source already spends
/// the period inside the read, in which case the delay collapses to zero.
/// Deadlines advance by one period per block and re-anchor when the loop
/// falls behind, so processing time is never double-counted and late blocks
/// never accumulate a sleep debt.
struct Pacer {
    period: Duration,
    deadline: Instant,
}

impl Pacer {
    fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            deadline: start + period,
        }
    }

    /// How long to sleep before the next read, given the current instant.
    fn next_delay(&mut self, now: Instant) -> Duration {
        let delay = self.deadline.saturating_duration_since(now);
        self.deadline = self.deadline.max(now) + self.period;
        delay
    }
}

/// Spawn the IQ read loop on a dedicated OS thread.
///
/// The thread runs for the lifetime of the process; dropping the returned
/// handle detaches it.
pub fn start(
    mut source: Box<dyn IqSource>,
    sample_rate: u32,
    block_size: usize,
    positive_only: bool,
    analyzer: Arc<SpectrumAnalyzer>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("iq-read".to_string())
        .spawn(move || {
            let mut block = vec![Complex::new(0.0_f32, 0.0_f32); block_size];
            let period = if sample_rate > 0 {
                Duration::from_secs_f64(block_size as f64 / sample_rate as f64)
            } else {
                Duration::from_millis(1)
            };
            let mut pacer = Pacer::new(period, Instant::now());

            tracing::info!(
                "IQ read loop started: {} samples/block at {} Hz",
                block_size,
                sample_rate
            );

            loop {
                let n = match source.read_into(&mut block) {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::warn!("IQ source read error: {}; retrying", e);
                        std::thread::sleep(Duration::from_millis(10));
                        continue;
                    }
                };

                if n == 0 {
                    // Source returned zero samples; treat as transient.
                    std::thread::sleep(Duration::from_millis(1));
                    continue;
                }

                analyzer.feed(&block[..n], positive_only);

                let delay = pacer.next_delay(Instant::now());
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
        })
}
