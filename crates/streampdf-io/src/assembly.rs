//! Collective write-side assembly
//!
//! Every worker attached to one output sink holds a [`CollectiveWriter`]
//! over the same `SharedAssembly`: the variable definitions, the global
//! per-step buffers that per-worker selections are copied into, and the
//! condvar-gated collective end-of-step. The last worker to end a step
//! flushes the assembled arrays through the sink's flush hook; everyone
//! else blocks until the flush commits, which keeps step N's write strictly
//! ordered before step N+1's.

use crate::traits::{SharedWriteMode, StepWriter};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::{Arc, Condvar, Mutex};
use streampdf_core::{Error, Result};
use tracing::debug;

/// One fully assembled output step, handed to the sink's flush hook
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedStep {
    /// Zero-based output step index
    pub index: u64,
    /// Assembled global arrays, keyed by variable name
    pub arrays: BTreeMap<String, CompletedArray>,
    /// Scalar variables written this step
    pub scalars: BTreeMap<String, i64>,
}

/// An assembled global array with its tracked value range
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedArray {
    /// Global extent per dimension
    pub shape: Vec<usize>,
    /// Row-major data
    pub data: Vec<f64>,
    /// Observed value range; `None` for empty arrays
    pub min_max: Option<(f64, f64)>,
}

impl CompletedArray {
    /// Build an array, scanning the data for its value range
    pub fn from_buffer(shape: Vec<usize>, data: Vec<f64>) -> Self {
        let min_max = data.iter().fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });
        Self {
            shape,
            data,
            min_max,
        }
    }
}

/// Flat index range of a contiguous leading-dimension slab selection.
///
/// Selections must span the full extent of every trailing dimension; that is
/// the only selection shape the reduction produces, and anything else would
/// be a strided copy this assembly does not implement.
pub(crate) fn slab_range(
    shape: &[usize],
    offset: &[usize],
    count: &[usize],
) -> Result<Range<usize>> {
    if offset.len() != shape.len() || count.len() != shape.len() {
        return Err(Error::InvalidInput(format!(
            "selection rank {}/{} does not match variable rank {}",
            offset.len(),
            count.len(),
            shape.len()
        )));
    }
    if shape.is_empty() {
        return Err(Error::InvalidInput(
            "selections do not apply to scalar variables".to_string(),
        ));
    }
    for dim in 1..shape.len() {
        if offset[dim] != 0 || count[dim] != shape[dim] {
            return Err(Error::InvalidInput(format!(
                "selection must span the full extent of dimension {dim}"
            )));
        }
    }
    if offset[0] + count[0] > shape[0] {
        return Err(Error::InvalidInput(format!(
            "selection rows {}..{} exceed extent {}",
            offset[0],
            offset[0] + count[0],
            shape[0]
        )));
    }
    let stride: usize = shape[1..].iter().product();
    Ok(offset[0] * stride..(offset[0] + count[0]) * stride)
}

type FlushFn = dyn FnMut(CompletedStep) -> Result<()> + Send;
type CloseFn = dyn FnMut() -> Result<()> + Send;

#[derive(Debug, Clone)]
struct ArrayDef {
    shape: Vec<usize>,
}

struct AssemblyState {
    array_defs: BTreeMap<String, ArrayDef>,
    scalar_defs: BTreeSet<String>,
    buffers: BTreeMap<String, Vec<f64>>,
    scalars: BTreeMap<String, i64>,
    next_index: u64,
    ended: usize,
    closed: usize,
    generation: u64,
    failed: Option<String>,
}

pub(crate) struct SharedAssembly {
    participants: usize,
    mode: SharedWriteMode,
    state: Mutex<AssemblyState>,
    step_done: Condvar,
    flush: Mutex<Box<FlushFn>>,
    on_close: Mutex<Box<CloseFn>>,
}

fn poisoned<T>(_: T) -> Error {
    Error::Stream("output sink poisoned by a panicked worker".to_string())
}

impl SharedAssembly {
    pub(crate) fn new(
        participants: usize,
        mode: SharedWriteMode,
        flush: Box<FlushFn>,
        on_close: Box<CloseFn>,
    ) -> Arc<Self> {
        Arc::new(Self {
            participants,
            mode,
            state: Mutex::new(AssemblyState {
                array_defs: BTreeMap::new(),
                scalar_defs: BTreeSet::new(),
                buffers: BTreeMap::new(),
                scalars: BTreeMap::new(),
                next_index: 0,
                ended: 0,
                closed: 0,
                generation: 0,
                failed: None,
            }),
            step_done: Condvar::new(),
            flush: Mutex::new(flush),
            on_close: Mutex::new(on_close),
        })
    }

    pub(crate) fn writer(self: &Arc<Self>) -> CollectiveWriter {
        CollectiveWriter {
            assembly: Arc::clone(self),
            selections: BTreeMap::new(),
            closed: false,
        }
    }

    fn define_array(&self, name: &str, shape: &[usize]) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        match state.array_defs.get(name) {
            Some(def) if def.shape != shape => Err(Error::InvalidInput(format!(
                "variable '{name}' redefined with shape {:?}, was {:?}",
                shape, def.shape
            ))),
            Some(_) => Ok(()),
            None => {
                state.array_defs.insert(
                    name.to_string(),
                    ArrayDef {
                        shape: shape.to_vec(),
                    },
                );
                Ok(())
            }
        }
    }

    fn define_scalar(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.scalar_defs.insert(name.to_string());
        Ok(())
    }

    fn put(&self, name: &str, range: Range<usize>, data: &[f64]) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        let total: usize = match state.array_defs.get(name) {
            Some(def) => def.shape.iter().product(),
            None => return Err(Error::Stream(format!("put before define: '{name}'"))),
        };
        let buffer = state
            .buffers
            .entry(name.to_string())
            .or_insert_with(|| vec![0.0; total]);
        buffer[range].copy_from_slice(data);
        Ok(())
    }

    fn put_scalar(&self, name: &str, value: i64) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if !state.scalar_defs.contains(name) {
            return Err(Error::Stream(format!("put before define: '{name}'")));
        }
        state.scalars.insert(name.to_string(), value);
        Ok(())
    }

    /// Collective end-of-step: the last arriving worker flushes.
    fn end_step(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if let Some(msg) = &state.failed {
            return Err(Error::Stream(msg.clone()));
        }

        let generation = state.generation;
        state.ended += 1;

        if state.ended == self.participants {
            state.ended = 0;
            let index = state.next_index;
            state.next_index += 1;

            let buffers = std::mem::take(&mut state.buffers);
            let scalars = std::mem::take(&mut state.scalars);
            let arrays = buffers
                .into_iter()
                .map(|(name, data)| {
                    let shape = state.array_defs[&name].shape.clone();
                    (name, CompletedArray::from_buffer(shape, data))
                })
                .collect();
            drop(state);

            let completed = CompletedStep {
                index,
                arrays,
                scalars,
            };
            debug!(step = index, "flushing assembled output step");
            let flush_result = {
                let mut flush = self.flush.lock().map_err(poisoned)?;
                flush(completed)
            };

            let mut state = self.state.lock().map_err(poisoned)?;
            if let Err(err) = &flush_result {
                state.failed = Some(err.to_string());
            }
            state.generation += 1;
            self.step_done.notify_all();
            flush_result
        } else {
            while state.generation == generation {
                state = self.step_done.wait(state).map_err(poisoned)?;
            }
            match &state.failed {
                Some(msg) => Err(Error::Stream(msg.clone())),
                None => Ok(()),
            }
        }
    }

    fn close(&self) -> Result<()> {
        let run_close = {
            let mut state = self.state.lock().map_err(poisoned)?;
            state.closed += 1;
            state.closed == self.participants
        };
        if run_close {
            let mut on_close = self.on_close.lock().map_err(poisoned)?;
            on_close()
        } else {
            Ok(())
        }
    }
}

/// A worker's handle on a shared output sink
///
/// Exactly one handle per attached worker; handles are created by the sink
/// (`FileSink::writer`, `MemSink::writer`) and moved into worker threads.
pub struct CollectiveWriter {
    assembly: Arc<SharedAssembly>,
    selections: BTreeMap<String, Range<usize>>,
    closed: bool,
}

impl StepWriter for CollectiveWriter {
    fn begin_step(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Stream("begin_step on a closed writer".to_string()));
        }
        Ok(())
    }

    fn define_array(
        &mut self,
        name: &str,
        shape: &[usize],
        offset: &[usize],
        count: &[usize],
    ) -> Result<()> {
        let range = slab_range(shape, offset, count)?;
        self.assembly.define_array(name, shape)?;
        self.selections.insert(name.to_string(), range);
        Ok(())
    }

    fn define_scalar(&mut self, name: &str) -> Result<()> {
        self.assembly.define_scalar(name)
    }

    fn put(&mut self, name: &str, data: &[f64]) -> Result<()> {
        let range = self
            .selections
            .get(name)
            .ok_or_else(|| Error::Stream(format!("put before define: '{name}'")))?;
        if data.len() != range.len() {
            return Err(Error::size_mismatch(range.len(), data.len(), name));
        }
        self.assembly.put(name, range.clone(), data)
    }

    fn put_scalar(&mut self, name: &str, value: i64) -> Result<()> {
        self.assembly.put_scalar(name, value)
    }

    fn end_step(&mut self) -> Result<()> {
        self.assembly.end_step()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.assembly.close()
    }

    fn shared_write_mode(&self) -> SharedWriteMode {
        self.assembly.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn capturing_assembly(
        participants: usize,
    ) -> (Arc<SharedAssembly>, Arc<Mutex<Vec<CompletedStep>>>, Arc<AtomicBool>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let sink = Arc::clone(&captured);
        let closed_flag = Arc::clone(&closed);
        let assembly = SharedAssembly::new(
            participants,
            SharedWriteMode::RankZero,
            Box::new(move |step| {
                sink.lock().unwrap().push(step);
                Ok(())
            }),
            Box::new(move || {
                closed_flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
        );
        (assembly, captured, closed)
    }

    #[test]
    fn test_slab_range_valid() {
        assert_eq!(slab_range(&[8, 2, 3], &[2, 0, 0], &[4, 2, 3]).unwrap(), 12..36);
        assert_eq!(slab_range(&[10], &[0], &[10]).unwrap(), 0..10);
        // empty selection is legal for idle workers
        assert_eq!(slab_range(&[8, 2, 3], &[0, 0, 0], &[0, 2, 3]).unwrap(), 0..0);
    }

    #[test]
    fn test_slab_range_rejects_partial_trailing_dims() {
        assert!(slab_range(&[8, 2, 3], &[0, 1, 0], &[4, 1, 3]).is_err());
        assert!(slab_range(&[8, 2, 3], &[0, 0, 0], &[4, 2, 2]).is_err());
        assert!(slab_range(&[8, 2, 3], &[6, 0, 0], &[4, 2, 3]).is_err());
        assert!(slab_range(&[8, 2, 3], &[0, 0], &[4, 2]).is_err());
    }

    #[test]
    fn test_single_worker_assembles_and_flushes() {
        let (assembly, captured, closed) = capturing_assembly(1);
        let mut writer = assembly.writer();

        writer.define_array("pdf", &[4, 2], &[0, 0], &[4, 2]).unwrap();
        writer.define_scalar("step").unwrap();

        writer.begin_step().unwrap();
        writer.put("pdf", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
        writer.put_scalar("step", 17).unwrap();
        writer.end_step().unwrap();

        let steps = captured.lock().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].index, 0);
        let array = &steps[0].arrays["pdf"];
        assert_eq!(array.shape, vec![4, 2]);
        assert_eq!(array.min_max, Some((1.0, 8.0)));
        assert_eq!(steps[0].scalars["step"], 17);
        drop(steps);

        writer.close().unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_two_workers_assemble_disjoint_slabs() {
        let (assembly, captured, _) = capturing_assembly(2);
        let writers: Vec<_> = (0..2).map(|_| assembly.writer()).collect();

        let handles: Vec<_> = writers
            .into_iter()
            .enumerate()
            .map(|(rank, mut writer)| {
                thread::spawn(move || {
                    let offset = [rank * 2, 0];
                    writer.define_array("pdf", &[4, 3], &offset, &[2, 3]).unwrap();
                    for step in 0..3i64 {
                        writer.begin_step().unwrap();
                        let base = (rank as f64) * 100.0 + step as f64;
                        writer
                            .put("pdf", &[base, base + 1.0, base + 2.0, base + 3.0, base + 4.0, base + 5.0])
                            .unwrap();
                        writer.end_step().unwrap();
                    }
                    writer.close().unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let steps = captured.lock().unwrap();
        assert_eq!(steps.len(), 3);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.index, i as u64);
            let array = &step.arrays["pdf"];
            // rank 0 filled rows 0..2, rank 1 rows 2..4
            assert_eq!(array.data[0], i as f64);
            assert_eq!(array.data[6], 100.0 + i as f64);
            assert_eq!(array.data.len(), 12);
        }
    }

    #[test]
    fn test_put_before_define_is_an_error() {
        let (assembly, _, _) = capturing_assembly(1);
        let mut writer = assembly.writer();
        assert!(writer.put("pdf", &[1.0]).is_err());
        assert!(writer.put_scalar("step", 1).is_err());
    }

    #[test]
    fn test_redefinition_with_other_shape_is_an_error() {
        let (assembly, _, _) = capturing_assembly(1);
        let mut writer = assembly.writer();
        writer.define_array("pdf", &[4, 2], &[0, 0], &[4, 2]).unwrap();
        assert!(writer.define_array("pdf", &[5, 2], &[0, 0], &[5, 2]).is_err());
        // same shape is fine (every worker defines)
        writer.define_array("pdf", &[4, 2], &[0, 0], &[4, 2]).unwrap();
    }

    #[test]
    fn test_put_length_must_match_selection() {
        let (assembly, _, _) = capturing_assembly(1);
        let mut writer = assembly.writer();
        writer.define_array("pdf", &[4, 2], &[0, 0], &[2, 2]).unwrap();
        assert!(writer.put("pdf", &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_flush_error_fails_the_whole_group() {
        let assembly = SharedAssembly::new(
            1,
            SharedWriteMode::RankZero,
            Box::new(|_| Err(Error::Stream("disk full".to_string()))),
            Box::new(|| Ok(())),
        );
        let mut writer = assembly.writer();
        writer.define_array("pdf", &[1, 1], &[0, 0], &[1, 1]).unwrap();
        writer.begin_step().unwrap();
        writer.put("pdf", &[1.0]).unwrap();
        assert!(writer.end_step().is_err());
        // the failure is sticky
        assert!(writer.end_step().is_err());
    }
}
