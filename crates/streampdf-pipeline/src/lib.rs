//! The streampdf reduction pipeline
//!
//! Composes the step-stream contracts, the domain partitioner and the
//! histogram engine into the per-step driver: every worker pulls its slab of
//! each field, computes per-row PDFs over the step's value range, and pushes
//! the assembled result into the output stream, with per-phase performance
//! accounting folded across the group at shutdown.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//! use streampdf_core::{CancelToken, PerfSample, SoloGroup};
//! use streampdf_io::{CompletedArray, MemBroker, MemSink};
//! use streampdf_pipeline::{AnalysisConfig, PdfPipeline};
//!
//! // one published step of a [2, 1, 2] field named U
//! let broker = MemBroker::new();
//! let mut arrays = BTreeMap::new();
//! arrays.insert(
//!     "U".to_string(),
//!     CompletedArray::from_buffer(vec![2, 1, 2], vec![0.1, 0.1, 0.9, 0.9]),
//! );
//! broker.publish(arrays, BTreeMap::new());
//! broker.finish();
//!
//! let sink = MemSink::create(1);
//! let config = AnalysisConfig {
//!     fields: vec!["U".to_string()],
//!     nbins: 2,
//!     ..AnalysisConfig::default()
//! };
//!
//! let pipeline = PdfPipeline::new(broker.reader(), sink.writer(), SoloGroup, config);
//! let mut sample = PerfSample::new();
//! pipeline.run(&CancelToken::new(), &mut sample).unwrap();
//!
//! assert_eq!(sample.steps, 1);
//! assert_eq!(sink.steps()[0].arrays["U/pdf"].data, vec![2.0, 0.0, 0.0, 2.0]);
//! ```

pub mod config;
pub mod driver;

// Re-export main types
pub use config::{AnalysisConfig, DEFAULT_NBINS};
pub use driver::PdfPipeline;

pub use streampdf_core::Result;
