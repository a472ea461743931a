//! Per-run throughput benchmark.
//!
//! Constructed by the batch that wants measuring and dropped with it, so
//! concurrent runs never share counters. Emits a running checkpoint every
//! `breakpoint` items and a final summary line.

use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Throughput recorder for one batch run.
#[derive(Debug)]
pub struct Benchmark {
    name: &'static str,
    breakpoint: usize,
    started: Instant,
    window_started: Instant,
    count: usize,
}

/// Final numbers for a finished run.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkSummary {
    pub count: usize,
    pub elapsed: Duration,
    /// Mean time per item; zero when nothing was processed.
    pub avg_per_item: Duration,
}

impl Benchmark {
    /// Start a benchmark that logs a checkpoint every `breakpoint` items.
    #[must_use]
    pub fn new(name: &'static str, breakpoint: usize) -> Self {
        let now = Instant::now();
        Self {
            name,
            breakpoint,
            started: now,
            window_started: now,
            count: 0,
        }
    }

    /// Record one processed item.
    pub fn tick(&mut self) {
        self.count += 1;
        if self.breakpoint > 0 && self.count % self.breakpoint == 0 {
            debug!(
                benchmark = self.name,
                count = self.count,
                window_ms = self.window_started.elapsed().as_millis() as u64,
                "Benchmark checkpoint"
            );
            self.window_started = Instant::now();
        }
    }

    /// Items recorded so far.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Log the final summary and return it.
    pub fn finish(self) -> BenchmarkSummary {
        let elapsed = self.started.elapsed();
        let avg_per_item = if self.count == 0 {
            Duration::ZERO
        } else {
            elapsed / u32::try_from(self.count).unwrap_or(u32::MAX)
        };

        info!(
            benchmark = self.name,
            count = self.count,
            elapsed_ms = elapsed.as_millis() as u64,
            avg_ms = avg_per_item.as_millis() as u64,
            "Benchmark finished"
        );

        BenchmarkSummary {
            count: self.count,
            elapsed,
            avg_per_item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_ticks_and_summarizes() {
        let mut bench = Benchmark::new("test", 10);
        for _ in 0..25 {
            bench.tick();
        }
        let summary = bench.finish();
        assert_eq!(summary.count, 25);
        assert!(summary.avg_per_item <= summary.elapsed);
    }

    #[test]
    fn empty_run_has_zero_average() {
        let summary = Benchmark::new("empty", 10).finish();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.avg_per_item, Duration::ZERO);
    }
}
