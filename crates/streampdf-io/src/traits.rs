//! Step-stream contracts
//!
//! A step stream publishes a sequence of discrete steps, each carrying named,
//! shaped variables. Readers pull one step at a time; writers assemble one
//! step at a time. All worker-group synchronization around step boundaries
//! happens behind these traits — the pipeline never sees an engine.

use std::time::Duration;
use streampdf_core::Result;

/// Outcome of a reader's `begin_step`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// A step is open; variables can be inquired and read
    Ready,
    /// The producer has not published the next step yet
    NotReady,
    /// The producer closed the stream; no further steps will arrive
    EndOfStream,
}

/// Metadata of a named variable within the open step
#[derive(Debug, Clone, PartialEq)]
pub struct VarMeta {
    /// Extent per dimension; empty for scalars
    pub shape: Vec<usize>,
    /// Value range if the engine tracks it; callers scan the data otherwise
    pub min_max: Option<(f64, f64)>,
}

/// Which ranks an engine requires to write shared (non-partitioned) data
///
/// The designated-writer predicate of the pipeline is derived from this
/// capability, not computed ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedWriteMode {
    /// Only rank 0 writes shared variables (bin edges, step counter)
    RankZero,
    /// Every rank must write shared variables collectively
    Collective,
}

/// Pull side of the step protocol
pub trait StepReader {
    /// Wait up to `timeout` for the next step.
    ///
    /// `NotReady` means the producer has not published it yet; callers
    /// retry with a bounded budget. `EndOfStream` and errors end the loop.
    fn begin_step(&mut self, timeout: Duration) -> Result<StepStatus>;

    /// The producer's index of the currently open step
    fn current_step(&self) -> u64;

    /// Shape and optional min/max of a variable in the open step
    fn variable_meta(&self, name: &str) -> Result<VarMeta>;

    /// Restrict subsequent `get` calls for `name` to a selection window
    fn set_selection(&mut self, name: &str, offset: &[usize], count: &[usize]) -> Result<()>;

    /// Copy the selected region of `name` into a worker-local buffer
    fn get(&mut self, name: &str, out: &mut Vec<f64>) -> Result<()>;

    /// Read a scalar variable; `Ok(None)` when the step does not carry it
    fn get_scalar(&mut self, name: &str) -> Result<Option<i64>>;

    /// Commit the open step and advance to the next
    fn end_step(&mut self) -> Result<()>;

    /// Release the stream
    fn close(&mut self) -> Result<()>;
}

/// Push side of the step protocol
///
/// `define_array`/`define_scalar` are define-once per run; `put` calls are
/// per step. `end_step` is collective across the workers attached to one
/// sink: it commits the step only once every worker has ended it.
pub trait StepWriter {
    /// Open the next output step
    fn begin_step(&mut self) -> Result<()>;

    /// Declare an array variable with its global shape and this worker's
    /// selection window
    fn define_array(
        &mut self,
        name: &str,
        shape: &[usize],
        offset: &[usize],
        count: &[usize],
    ) -> Result<()>;

    /// Declare a scalar variable
    fn define_scalar(&mut self, name: &str) -> Result<()>;

    /// Write this worker's selection of `name` for the open step
    fn put(&mut self, name: &str, data: &[f64]) -> Result<()>;

    /// Write a scalar variable for the open step
    fn put_scalar(&mut self, name: &str, value: i64) -> Result<()>;

    /// Commit the open step once all attached workers have ended it
    fn end_step(&mut self) -> Result<()>;

    /// Release this worker's handle; the sink finishes the stream once every
    /// worker has closed
    fn close(&mut self) -> Result<()>;

    /// The engine's requirement for shared (non-partitioned) variables
    fn shared_write_mode(&self) -> SharedWriteMode {
        SharedWriteMode::RankZero
    }
}
