//! Step-stream contracts and engines for the streampdf pipeline
//!
//! The reduction consumes and produces data exclusively through the
//! [`StepReader`] and [`StepWriter`] traits: named, shaped variables
//! published one step at a time, with selection windows for partitioned
//! reads and writes and a collective end-of-step on the write side.
//!
//! Two engines implement the contracts:
//!
//! - [`FileSink`] / [`FileStreamReader`] — a directory of atomically
//!   renamed JSON step records plus an end-of-stream marker.
//! - [`MemBroker`] / [`MemSink`] — an in-process broker and capturing sink
//!   for tests and single-process experiments.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//! use streampdf_io::{CompletedArray, MemBroker, StepReader, StepStatus};
//!
//! let broker = MemBroker::new();
//! let mut arrays = BTreeMap::new();
//! arrays.insert(
//!     "U".to_string(),
//!     CompletedArray::from_buffer(vec![2, 1, 2], vec![1.0, 2.0, 3.0, 4.0]),
//! );
//! broker.publish(arrays, BTreeMap::new());
//!
//! let mut reader = broker.reader();
//! assert_eq!(
//!     reader.begin_step(Duration::from_millis(10)).unwrap(),
//!     StepStatus::Ready
//! );
//! assert_eq!(reader.variable_meta("U").unwrap().shape, vec![2, 1, 2]);
//! ```

pub mod assembly;
pub mod file;
pub mod mem;
pub mod traits;

// Re-export main types and traits
pub use assembly::{CollectiveWriter, CompletedArray, CompletedStep};
pub use file::{FileSink, FileStreamReader};
pub use mem::{MemBroker, MemSink, MemStepReader};
pub use traits::{SharedWriteMode, StepReader, StepStatus, StepWriter, VarMeta};

pub use streampdf_core::Result;
