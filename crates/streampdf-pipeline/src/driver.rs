//! The per-step reduction driver
//!
//! Composes the stream contracts per step: pull one input step, apply the
//! partition's selection, compute the per-row PDFs, push one output step.
//! Step boundaries are the only cross-worker synchronization; everything
//! between them is worker-local.

use crate::config::AnalysisConfig;
use std::time::Instant;
use streampdf_core::{split_rows, CancelToken, Error, PerfSample, Result, RowSpan, WorkerGroup};
use streampdf_histogram::compute_pdf;
use streampdf_io::{SharedWriteMode, StepReader, StepStatus, StepWriter};
use tracing::{debug, info, warn};

/// Output variable definition state, transitioned exactly once
enum OutputLayout {
    Uninitialized,
    Initialized,
}

/// Per-field plan fixed at the first observed step
///
/// The field shape is assumed invariant for the run; later steps are checked
/// against it and drift is fatal.
struct FieldPlan {
    name: String,
    pdf_name: String,
    bins_name: String,
    shape: Vec<usize>,
    span: RowSpan,
}

fn scan_min_max(data: &[f64]) -> (f64, f64) {
    if data.is_empty() {
        // idle workers have nothing to scan; a zero range takes the
        // degenerate-bin path downstream
        return (0.0, 0.0);
    }
    data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

/// One worker's run of the streaming reduction
pub struct PdfPipeline<R, W, G> {
    reader: R,
    writer: W,
    group: G,
    config: AnalysisConfig,
}

impl<R, W, G> PdfPipeline<R, W, G>
where
    R: StepReader,
    W: StepWriter,
    G: WorkerGroup,
{
    pub fn new(reader: R, writer: W, group: G, config: AnalysisConfig) -> Self {
        Self {
            reader,
            writer,
            group,
            config,
        }
    }

    /// Process steps until end-of-stream, cancellation, or a fatal error.
    ///
    /// Accounts read/compute/write phases and data volumes into `sample`;
    /// the caller owns initialization and total-time measurement. On a
    /// normal return both streams have been closed.
    pub fn run(mut self, cancel: &CancelToken, sample: &mut PerfSample) -> Result<()> {
        if self.config.fields.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one field must be configured".to_string(),
            ));
        }
        if self.config.nbins == 0 {
            return Err(Error::InvalidParameter(
                "nbins must be positive".to_string(),
            ));
        }

        let rank = self.group.rank();
        let designated = match self.writer.shared_write_mode() {
            SharedWriteMode::RankZero => rank == 0,
            SharedWriteMode::Collective => true,
        };

        let mut plans: Vec<FieldPlan> = Vec::new();
        let mut layout = OutputLayout::Uninitialized;
        let mut buffers: Vec<Vec<f64>> = vec![Vec::new(); self.config.fields.len()];
        let mut analysis_step: u64 = 0;
        let mut not_ready_polls: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(rank, "cancellation requested; stopping the step loop");
                break;
            }

            let read_started = Instant::now();
            let status = match self.reader.begin_step(self.config.step_timeout) {
                Ok(status) => status,
                Err(err) => {
                    // a terminal engine failure reads as end-of-stream
                    warn!(rank, "input stream failed: {err}; stopping");
                    break;
                }
            };
            match status {
                StepStatus::NotReady => {
                    not_ready_polls += 1;
                    if not_ready_polls > self.config.max_not_ready_polls {
                        return Err(Error::StreamTimeout(format!(
                            "input produced no step within {} polls",
                            self.config.max_not_ready_polls
                        )));
                    }
                    debug!(rank, not_ready_polls, "input stream not ready; waiting");
                    std::thread::sleep(self.config.poll_interval);
                    continue;
                }
                StepStatus::EndOfStream => {
                    debug!(rank, "input stream ended");
                    break;
                }
                StepStatus::Ready => {
                    not_ready_polls = 0;
                }
            }

            let producer_step = self.reader.current_step();

            // Shapes and partitions are fixed at the first step; afterwards
            // only the per-step value range is taken from the metadata.
            let mut ranges: Vec<Option<(f64, f64)>> = Vec::with_capacity(self.config.fields.len());
            if plans.is_empty() {
                for field in &self.config.fields {
                    let meta = self.reader.variable_meta(field)?;
                    if meta.shape.len() != 3 {
                        return Err(Error::bad_rank(meta.shape.len()));
                    }
                    let span = split_rows(meta.shape[0], self.group.size(), rank)?;
                    debug!(rank, field = %field, start = span.start, count = span.count, "partitioned field");
                    ranges.push(meta.min_max);
                    plans.push(FieldPlan {
                        pdf_name: format!("{field}/pdf"),
                        bins_name: format!("{field}/bins"),
                        name: field.clone(),
                        shape: meta.shape,
                        span,
                    });
                }
            } else {
                for plan in &plans {
                    let meta = self.reader.variable_meta(&plan.name)?;
                    if meta.shape != plan.shape {
                        return Err(Error::shape_drift(&plan.name, &plan.shape, &meta.shape));
                    }
                    ranges.push(meta.min_max);
                }
            }

            // Read this worker's slab of every field
            for (plan, buffer) in plans.iter().zip(buffers.iter_mut()) {
                self.reader.set_selection(
                    &plan.name,
                    &[plan.span.start, 0, 0],
                    &[plan.span.count, plan.shape[1], plan.shape[2]],
                )?;
                self.reader.get(&plan.name, buffer)?;
            }
            let sim_step = if designated {
                self.reader.get_scalar("step")?
            } else {
                None
            };
            self.reader.end_step()?;

            let read_elapsed = read_started.elapsed();
            let bytes_read: u64 = buffers.iter().map(|b| (b.len() * 8) as u64).sum();
            sample.record_read(read_elapsed, bytes_read);

            if rank == 0 {
                info!(
                    analysis_step,
                    producer_step,
                    sim_step = ?sim_step,
                    read_seconds = read_elapsed.as_secs_f64(),
                    "processing step"
                );
            }

            // Compute the per-row PDFs
            let compute_started = Instant::now();
            let mut results = Vec::with_capacity(plans.len());
            for ((plan, buffer), range) in plans.iter().zip(&buffers).zip(ranges.iter().copied()) {
                let (min, max) = range.unwrap_or_else(|| scan_min_max(buffer));
                let pdf = compute_pdf(
                    buffer,
                    &plan.shape,
                    plan.span.start,
                    plan.span.count,
                    self.config.nbins,
                    min,
                    max,
                )?;
                results.push(pdf);
            }
            sample.record_compute(compute_started.elapsed());

            // Define the output layout once, on the first successful step
            let write_started = Instant::now();
            if matches!(layout, OutputLayout::Uninitialized) {
                for plan in &plans {
                    self.writer.define_array(
                        &plan.pdf_name,
                        &[plan.shape[0], self.config.nbins],
                        &[plan.span.start, 0],
                        &[plan.span.count, self.config.nbins],
                    )?;
                    if designated {
                        self.writer.define_array(
                            &plan.bins_name,
                            &[self.config.nbins],
                            &[0],
                            &[self.config.nbins],
                        )?;
                    }
                    if self.config.write_input {
                        self.writer.define_array(
                            &plan.name,
                            &plan.shape,
                            &[plan.span.start, 0, 0],
                            &[plan.span.count, plan.shape[1], plan.shape[2]],
                        )?;
                    }
                }
                if designated {
                    self.writer.define_scalar("step")?;
                }
                layout = OutputLayout::Initialized;
                debug!(rank, "output layout initialized");
            }

            // Push one output step
            self.writer.begin_step()?;
            let mut bytes_written: u64 = 0;
            for (plan, (pdf, buffer)) in plans.iter().zip(results.iter().zip(&buffers)) {
                self.writer.put(&plan.pdf_name, pdf.values())?;
                bytes_written += (pdf.values().len() * 8) as u64;
                if designated {
                    self.writer.put(&plan.bins_name, pdf.bins())?;
                    bytes_written += (pdf.bins().len() * 8) as u64;
                }
                if self.config.write_input {
                    self.writer.put(&plan.name, buffer)?;
                    bytes_written += (buffer.len() * 8) as u64;
                }
            }
            if designated {
                if let Some(step) = sim_step {
                    self.writer.put_scalar("step", step)?;
                    bytes_written += 8;
                }
            }
            self.writer.end_step()?;
            sample.record_write(write_started.elapsed(), bytes_written);

            analysis_step += 1;
            sample.steps = analysis_step;
        }

        self.reader.close()?;
        self.writer.close()?;
        Ok(())
    }
}
