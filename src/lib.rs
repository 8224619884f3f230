//! Distributed streaming PDF (histogram) reduction for step-streamed
//! simulation fields
//!
//! A group of cooperating workers consumes a time-stepped 3-D scalar field
//! through a step-stream contract, partitions it along the leading
//! dimension, computes a per-row histogram per step, and re-emits the result
//! through a second step stream, with per-phase performance metrics folded
//! across the group at shutdown.
//!
//! This crate re-exports the workspace members:
//!
//! - [`streampdf_core`] — errors, partitioning, worker groups, metrics
//! - [`streampdf_histogram`] — the per-slice PDF engine
//! - [`streampdf_io`] — step-stream contracts and engines
//! - [`streampdf_pipeline`] — the per-step driver
//!
//! The `pdf_calc` binary in `streampdf-tools` wires them together behind the
//! command line.

pub use streampdf_core::{
    split_rows, CancelToken, Error, LocalGroup, PerfReport, PerfSample, ReduceOp, Result,
    RowSpan, SoloGroup, WorkerGroup,
};
pub use streampdf_histogram::{compute_pdf, FieldPdf};
pub use streampdf_io::{
    CompletedArray, CompletedStep, FileSink, FileStreamReader, MemBroker, MemSink,
    SharedWriteMode, StepReader, StepStatus, StepWriter, VarMeta,
};
pub use streampdf_pipeline::{AnalysisConfig, PdfPipeline, DEFAULT_NBINS};
