//! Core types for the streaming PDF reduction
//!
//! This crate provides the pieces of the pipeline that have no I/O of their
//! own: the unified error type, deterministic domain partitioning across the
//! worker group, the worker-group collective abstraction, per-worker
//! performance accounting, and cooperative cancellation.
//!
//! # Example
//!
//! ```rust
//! use streampdf_core::{split_rows, RowSpan};
//!
//! // 65 rows over 4 workers: the last rank absorbs the remainder
//! let spans: Vec<RowSpan> = (0..4)
//!     .map(|rank| split_rows(65, 4, rank).unwrap())
//!     .collect();
//!
//! assert_eq!(spans[0], RowSpan::new(0, 16));
//! assert_eq!(spans[3], RowSpan::new(48, 17));
//! ```

pub mod cancel;
pub mod error;
pub mod group;
pub mod metrics;
pub mod partition;

// Re-export core types
pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use group::{LocalGroup, ReduceOp, SoloGroup, WorkerGroup};
pub use metrics::{PerfReport, PerfSample, PhaseTimes};
pub use partition::{split_rows, RowSpan};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
