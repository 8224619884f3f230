//! Per-worker performance accounting
//!
//! Each worker owns exactly one [`PerfSample`], created at pipeline start and
//! mutated in place as steps complete. Nothing is shared or locked during
//! steady-state processing; the only cross-worker interaction is the one-shot
//! collective in [`PerfSample::reduce`], which folds the fixed-shape phase
//! vector into a [`PerfReport`] at shutdown.

use crate::error::Result;
use crate::group::{ReduceOp, WorkerGroup};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MB: f64 = 1024.0 * 1024.0;

/// Elapsed time and data volume for one worker's run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerfSample {
    /// Wall time for the whole run, including initialization
    pub total: Duration,
    /// Time spent opening streams and building engines
    pub initialize: Duration,
    /// Cumulative step read time
    pub read: Duration,
    /// Cumulative histogram computation time
    pub compute: Duration,
    /// Cumulative step write time
    pub write: Duration,
    /// Number of steps processed
    pub steps: u64,
    /// Bytes copied out of the input stream
    pub bytes_read: u64,
    /// Bytes pushed into the output stream
    pub bytes_written: u64,
}

impl PerfSample {
    /// Create an empty sample
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one read phase
    pub fn record_read(&mut self, elapsed: Duration, bytes: u64) {
        self.read += elapsed;
        self.bytes_read += bytes;
    }

    /// Account one compute phase
    pub fn record_compute(&mut self, elapsed: Duration) {
        self.compute += elapsed;
    }

    /// Account one write phase
    pub fn record_write(&mut self, elapsed: Duration, bytes: u64) {
        self.write += elapsed;
        self.bytes_written += bytes;
    }

    /// The fixed-shape vector fed to the shutdown collective:
    /// `[total, initialize, read, compute, write]` in seconds.
    fn phase_seconds(&self) -> [f64; 5] {
        [
            self.total.as_secs_f64(),
            self.initialize.as_secs_f64(),
            self.read.as_secs_f64(),
            self.compute.as_secs_f64(),
            self.write.as_secs_f64(),
        ]
    }

    /// Reduce this sample across the worker group.
    ///
    /// Collective: every worker must call it exactly once, at shutdown.
    /// Phase times are reduced with max/min/mean, byte counters with sum.
    pub fn reduce<G: WorkerGroup + ?Sized>(&self, group: &G) -> Result<PerfReport> {
        let phases = self.phase_seconds();
        let max = group.all_reduce(&phases, ReduceOp::Max)?;
        let min = group.all_reduce(&phases, ReduceOp::Min)?;
        let sum = group.all_reduce(&phases, ReduceOp::Sum)?;

        let bytes = group.all_reduce(
            &[self.bytes_read as f64, self.bytes_written as f64],
            ReduceOp::Sum,
        )?;

        let workers = group.size();
        let avg: Vec<f64> = sum.iter().map(|s| s / workers as f64).collect();

        Ok(PerfReport {
            max: PhaseTimes::from_vector(&max),
            min: PhaseTimes::from_vector(&min),
            avg: PhaseTimes::from_vector(&avg),
            steps: self.steps,
            bytes_read: bytes[0] as u64,
            bytes_written: bytes[1] as u64,
            workers,
        })
    }
}

/// Per-phase seconds, one slot per entry of the reduction vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimes {
    pub total: f64,
    pub initialize: f64,
    pub read: f64,
    pub compute: f64,
    pub write: f64,
}

impl PhaseTimes {
    fn from_vector(v: &[f64]) -> Self {
        Self {
            total: v[0],
            initialize: v[1],
            read: v[2],
            compute: v[3],
            write: v[4],
        }
    }
}

/// Group-wide performance summary, rendered by the reporting worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfReport {
    /// Slowest worker per phase
    pub max: PhaseTimes,
    /// Fastest worker per phase
    pub min: PhaseTimes,
    /// Mean across workers per phase
    pub avg: PhaseTimes,
    /// Steps processed (identical on every worker by lockstep)
    pub steps: u64,
    /// Bytes read, summed across workers
    pub bytes_read: u64,
    /// Bytes written, summed across workers
    pub bytes_written: u64,
    /// Group size
    pub workers: usize,
}

impl PerfReport {
    /// Mean per-step wall time, excluding initialization
    pub fn time_per_step(&self) -> Option<f64> {
        if self.steps == 0 {
            return None;
        }
        Some((self.avg.total - self.avg.initialize) / self.steps as f64)
    }

    /// Group read throughput in MB/s
    pub fn read_throughput(&self) -> Option<f64> {
        if self.avg.read <= 0.0 {
            return None;
        }
        Some(self.bytes_read as f64 / MB / self.avg.read)
    }

    /// Group write throughput in MB/s
    pub fn write_throughput(&self) -> Option<f64> {
        if self.avg.write <= 0.0 {
            return None;
        }
        Some(self.bytes_written as f64 / MB / self.avg.write)
    }
}

impl fmt::Display for PerfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("Total execution time (s)", self.max.total, self.min.total, self.avg.total),
            ("Initialization time (s)", self.max.initialize, self.min.initialize, self.avg.initialize),
            ("I/O read time (s)", self.max.read, self.min.read, self.avg.read),
            ("Computation time (s)", self.max.compute, self.min.compute, self.avg.compute),
            ("I/O write time (s)", self.max.write, self.min.write, self.avg.write),
        ];

        writeln!(f, "=== Performance Summary ===")?;
        writeln!(f, "Metric                    | Max      | Min      | Avg      |")?;
        writeln!(f, "--------------------------|----------|----------|----------|")?;
        for (label, max, min, avg) in rows {
            writeln!(f, "{label:<26}| {max:>8.3} | {min:>8.3} | {avg:>8.3} |")?;
        }
        writeln!(f, "===========================")?;
        writeln!(f, "Total steps processed:    {}", self.steps)?;
        writeln!(f, "Data read (MB):           {:.1}", self.bytes_read as f64 / MB)?;
        writeln!(f, "Data written (MB):        {:.1}", self.bytes_written as f64 / MB)?;
        writeln!(f, "Workers:                  {}", self.workers)?;
        if let Some(per_step) = self.time_per_step() {
            writeln!(f, "Average time per step (s):{per_step:>9.3}")?;
        }
        if let Some(rate) = self.read_throughput() {
            writeln!(f, "Read throughput (MB/s):   {rate:>9.1}")?;
        }
        if let Some(rate) = self.write_throughput() {
            writeln!(f, "Write throughput (MB/s):  {rate:>9.1}")?;
        }
        write!(f, "===========================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{LocalGroup, SoloGroup};
    use approx::assert_relative_eq;
    use std::thread;

    fn sample_for_rank(rank: u64) -> PerfSample {
        let mut sample = PerfSample::new();
        sample.total = Duration::from_secs(10 + rank);
        sample.initialize = Duration::from_secs(1);
        sample.record_read(Duration::from_secs(2 + rank), 100 * (rank + 1));
        sample.record_compute(Duration::from_secs(3));
        sample.record_write(Duration::from_secs(1 + rank), 10 * (rank + 1));
        sample.steps = 5;
        sample
    }

    #[test]
    fn test_record_accumulates() {
        let mut sample = PerfSample::new();
        sample.record_read(Duration::from_millis(500), 1024);
        sample.record_read(Duration::from_millis(250), 1024);
        sample.record_compute(Duration::from_millis(100));
        sample.record_write(Duration::from_millis(50), 8);

        assert_eq!(sample.read, Duration::from_millis(750));
        assert_eq!(sample.bytes_read, 2048);
        assert_eq!(sample.compute, Duration::from_millis(100));
        assert_eq!(sample.bytes_written, 8);
    }

    #[test]
    fn test_solo_reduce_is_identity() {
        let sample = sample_for_rank(0);
        let report = sample.reduce(&SoloGroup).unwrap();

        assert_relative_eq!(report.max.total, 10.0);
        assert_relative_eq!(report.min.total, 10.0);
        assert_relative_eq!(report.avg.total, 10.0);
        assert_eq!(report.bytes_read, 100);
        assert_eq!(report.bytes_written, 10);
        assert_eq!(report.workers, 1);
        assert_eq!(report.steps, 5);
    }

    #[test]
    fn test_group_reduce_max_min_avg_sum() {
        let groups = LocalGroup::split(3);
        let handles: Vec<_> = groups
            .into_iter()
            .map(|g| {
                thread::spawn(move || {
                    let sample = sample_for_rank(g.rank() as u64);
                    sample.reduce(&g).unwrap()
                })
            })
            .collect();

        for h in handles {
            let report = h.join().unwrap();
            // totals were 10, 11, 12 seconds
            assert_relative_eq!(report.max.total, 12.0);
            assert_relative_eq!(report.min.total, 10.0);
            assert_relative_eq!(report.avg.total, 11.0);
            // reads were 2, 3, 4 seconds
            assert_relative_eq!(report.max.read, 4.0);
            assert_relative_eq!(report.avg.read, 3.0);
            // bytes sum across ranks: 100 + 200 + 300
            assert_eq!(report.bytes_read, 600);
            assert_eq!(report.bytes_written, 60);
            assert_eq!(report.workers, 3);
        }
    }

    #[test]
    fn test_report_derived_rates() {
        let report = PerfReport {
            max: PhaseTimes { total: 10.0, initialize: 1.0, read: 4.0, compute: 3.0, write: 2.0 },
            min: PhaseTimes { total: 10.0, initialize: 1.0, read: 4.0, compute: 3.0, write: 2.0 },
            avg: PhaseTimes { total: 10.0, initialize: 1.0, read: 4.0, compute: 3.0, write: 2.0 },
            steps: 3,
            bytes_read: (8.0 * MB) as u64,
            bytes_written: (4.0 * MB) as u64,
            workers: 2,
        };

        assert_relative_eq!(report.time_per_step().unwrap(), 3.0);
        assert_relative_eq!(report.read_throughput().unwrap(), 2.0);
        assert_relative_eq!(report.write_throughput().unwrap(), 2.0);

        let rendered = report.to_string();
        assert!(rendered.contains("Performance Summary"));
        assert!(rendered.contains("Total steps processed:    3"));
        assert!(rendered.contains("Workers:                  2"));
    }

    #[test]
    fn test_report_zero_steps_has_no_rates() {
        let zero = PhaseTimes { total: 0.0, initialize: 0.0, read: 0.0, compute: 0.0, write: 0.0 };
        let report = PerfReport {
            max: zero,
            min: zero,
            avg: zero,
            steps: 0,
            bytes_read: 0,
            bytes_written: 0,
            workers: 1,
        };
        assert!(report.time_per_step().is_none());
        assert!(report.read_throughput().is_none());
        assert!(report.write_throughput().is_none());
    }
}
