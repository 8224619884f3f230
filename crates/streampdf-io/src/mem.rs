//! In-process step stream engines
//!
//! A broker holds published steps in memory; readers attach a cursor and
//! block in `begin_step` until the producer catches up. The sink mirrors the
//! file engine's collective assembly but captures completed steps for
//! inspection. Both exist for tests and single-process experiments, and the
//! sink can declare `Collective` shared writes to exercise engines that make
//! every rank a designated writer.

use crate::assembly::{slab_range, CollectiveWriter, CompletedArray, CompletedStep, SharedAssembly};
use crate::traits::{SharedWriteMode, StepReader, StepStatus, VarMeta};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use streampdf_core::{Error, Result};

struct BrokerState {
    steps: Vec<Arc<CompletedStep>>,
    finished: bool,
}

/// In-memory step publisher with any number of attached readers
#[derive(Clone)]
pub struct MemBroker {
    shared: Arc<(Mutex<BrokerState>, Condvar)>,
}

impl Default for MemBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new((
                Mutex::new(BrokerState {
                    steps: Vec::new(),
                    finished: false,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Publish the next step; its index is assigned in publication order
    pub fn publish(
        &self,
        arrays: BTreeMap<String, CompletedArray>,
        scalars: BTreeMap<String, i64>,
    ) {
        let (lock, ready) = &*self.shared;
        let mut state = lock.lock().expect("broker poisoned");
        let index = state.steps.len() as u64;
        state.steps.push(Arc::new(CompletedStep {
            index,
            arrays,
            scalars,
        }));
        ready.notify_all();
    }

    /// Mark the stream finished; readers past the last step see `EndOfStream`
    pub fn finish(&self) {
        let (lock, ready) = &*self.shared;
        lock.lock().expect("broker poisoned").finished = true;
        ready.notify_all();
    }

    /// Attach a reader with its own cursor at step 0
    pub fn reader(&self) -> MemStepReader {
        MemStepReader {
            shared: Arc::clone(&self.shared),
            cursor: 0,
            current: None,
            selections: BTreeMap::new(),
        }
    }
}

/// One worker's view of a [`MemBroker`] stream
pub struct MemStepReader {
    shared: Arc<(Mutex<BrokerState>, Condvar)>,
    cursor: u64,
    current: Option<Arc<CompletedStep>>,
    selections: BTreeMap<String, (Vec<usize>, Vec<usize>)>,
}

impl MemStepReader {
    fn current(&self) -> Result<&CompletedStep> {
        self.current
            .as_deref()
            .ok_or_else(|| Error::Stream("no step is open".to_string()))
    }
}

impl StepReader for MemStepReader {
    fn begin_step(&mut self, timeout: Duration) -> Result<StepStatus> {
        let deadline = Instant::now() + timeout;
        let (lock, ready) = &*self.shared;
        let mut state = lock
            .lock()
            .map_err(|_| Error::Stream("broker poisoned".to_string()))?;
        loop {
            if (state.steps.len() as u64) > self.cursor {
                self.current = Some(Arc::clone(&state.steps[self.cursor as usize]));
                return Ok(StepStatus::Ready);
            }
            if state.finished {
                return Ok(StepStatus::EndOfStream);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(StepStatus::NotReady);
            }
            let (next, _) = ready
                .wait_timeout(state, remaining)
                .map_err(|_| Error::Stream("broker poisoned".to_string()))?;
            state = next;
        }
    }

    fn current_step(&self) -> u64 {
        self.current.as_ref().map_or(self.cursor, |s| s.index)
    }

    fn variable_meta(&self, name: &str) -> Result<VarMeta> {
        let step = self.current()?;
        if let Some(array) = step.arrays.get(name) {
            Ok(VarMeta {
                shape: array.shape.clone(),
                min_max: array.min_max,
            })
        } else if step.scalars.contains_key(name) {
            Ok(VarMeta {
                shape: Vec::new(),
                min_max: None,
            })
        } else {
            Err(Error::unknown_variable(name))
        }
    }

    fn set_selection(&mut self, name: &str, offset: &[usize], count: &[usize]) -> Result<()> {
        self.selections
            .insert(name.to_string(), (offset.to_vec(), count.to_vec()));
        Ok(())
    }

    fn get(&mut self, name: &str, out: &mut Vec<f64>) -> Result<()> {
        let step = self
            .current
            .as_deref()
            .ok_or_else(|| Error::Stream("no step is open".to_string()))?;
        let array = step
            .arrays
            .get(name)
            .ok_or_else(|| Error::unknown_variable(name))?;
        let range = match self.selections.get(name) {
            Some((offset, count)) => slab_range(&array.shape, offset, count)?,
            None => 0..array.data.len(),
        };
        out.clear();
        out.extend_from_slice(&array.data[range]);
        Ok(())
    }

    fn get_scalar(&mut self, name: &str) -> Result<Option<i64>> {
        Ok(self.current()?.scalars.get(name).copied())
    }

    fn end_step(&mut self) -> Result<()> {
        if self.current.take().is_none() {
            return Err(Error::Stream("end_step without an open step".to_string()));
        }
        self.cursor += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.current = None;
        Ok(())
    }
}

/// Write side capturing completed steps in memory
pub struct MemSink {
    assembly: Arc<SharedAssembly>,
    captured: Arc<Mutex<Vec<CompletedStep>>>,
    finished: Arc<AtomicBool>,
}

impl MemSink {
    /// Sink for `participants` workers with rank-0 shared writes
    pub fn create(participants: usize) -> Self {
        Self::with_mode(participants, SharedWriteMode::RankZero)
    }

    /// Sink with an explicit shared-write capability, for exercising the
    /// all-ranks designated-writer path
    pub fn with_mode(participants: usize, mode: SharedWriteMode) -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(AtomicBool::new(false));
        let capture = Arc::clone(&captured);
        let finish = Arc::clone(&finished);
        let assembly = SharedAssembly::new(
            participants,
            mode,
            Box::new(move |step| {
                capture
                    .lock()
                    .map_err(|_| Error::Stream("mem sink poisoned".to_string()))?
                    .push(step);
                Ok(())
            }),
            Box::new(move || {
                finish.store(true, Ordering::SeqCst);
                Ok(())
            }),
        );
        Self {
            assembly,
            captured,
            finished,
        }
    }

    /// One worker's writer handle
    pub fn writer(&self) -> CollectiveWriter {
        self.assembly.writer()
    }

    /// Snapshot of the steps flushed so far
    pub fn steps(&self) -> Vec<CompletedStep> {
        self.captured.lock().expect("mem sink poisoned").clone()
    }

    /// True once every attached worker has closed its handle
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StepWriter;
    use std::thread;

    fn field(shape: &[usize], data: Vec<f64>) -> CompletedArray {
        CompletedArray::from_buffer(shape.to_vec(), data)
    }

    fn publish_simple(broker: &MemBroker, values: Vec<f64>, sim_step: i64) {
        let mut arrays = BTreeMap::new();
        arrays.insert("U".to_string(), field(&[2, 1, 2], values));
        let mut scalars = BTreeMap::new();
        scalars.insert("step".to_string(), sim_step);
        broker.publish(arrays, scalars);
    }

    #[test]
    fn test_reader_consumes_published_steps_in_order() {
        let broker = MemBroker::new();
        publish_simple(&broker, vec![1.0, 2.0, 3.0, 4.0], 10);
        publish_simple(&broker, vec![5.0, 6.0, 7.0, 8.0], 20);
        broker.finish();

        let mut reader = broker.reader();
        let mut buf = Vec::new();

        assert_eq!(
            reader.begin_step(Duration::from_millis(10)).unwrap(),
            StepStatus::Ready
        );
        assert_eq!(reader.current_step(), 0);
        let meta = reader.variable_meta("U").unwrap();
        assert_eq!(meta.shape, vec![2, 1, 2]);
        assert_eq!(meta.min_max, Some((1.0, 4.0)));
        reader.get("U", &mut buf).unwrap();
        assert_eq!(buf, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reader.get_scalar("step").unwrap(), Some(10));
        assert_eq!(reader.get_scalar("absent").unwrap(), None);
        reader.end_step().unwrap();

        assert_eq!(
            reader.begin_step(Duration::from_millis(10)).unwrap(),
            StepStatus::Ready
        );
        assert_eq!(reader.get_scalar("step").unwrap(), Some(20));
        reader.end_step().unwrap();

        assert_eq!(
            reader.begin_step(Duration::from_millis(10)).unwrap(),
            StepStatus::EndOfStream
        );
    }

    #[test]
    fn test_selection_reads_one_slab() {
        let broker = MemBroker::new();
        publish_simple(&broker, vec![1.0, 2.0, 3.0, 4.0], 0);

        let mut reader = broker.reader();
        reader.begin_step(Duration::from_millis(10)).unwrap();
        reader.set_selection("U", &[1, 0, 0], &[1, 1, 2]).unwrap();
        let mut buf = Vec::new();
        reader.get("U", &mut buf).unwrap();
        assert_eq!(buf, vec![3.0, 4.0]);
    }

    #[test]
    fn test_not_ready_until_published() {
        let broker = MemBroker::new();
        let mut reader = broker.reader();

        assert_eq!(
            reader.begin_step(Duration::from_millis(5)).unwrap(),
            StepStatus::NotReady
        );

        let publisher = broker.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            publish_simple(&publisher, vec![0.0, 0.0, 0.0, 0.0], 1);
        });

        // blocks past the publication delay, then yields the step
        assert_eq!(
            reader.begin_step(Duration::from_secs(5)).unwrap(),
            StepStatus::Ready
        );
        handle.join().unwrap();
    }

    #[test]
    fn test_two_readers_have_independent_cursors() {
        let broker = MemBroker::new();
        publish_simple(&broker, vec![1.0, 2.0, 3.0, 4.0], 0);

        let mut a = broker.reader();
        let mut b = broker.reader();
        assert_eq!(a.begin_step(Duration::from_millis(10)).unwrap(), StepStatus::Ready);
        assert_eq!(b.begin_step(Duration::from_millis(10)).unwrap(), StepStatus::Ready);
        a.end_step().unwrap();
        assert_eq!(
            a.begin_step(Duration::from_millis(5)).unwrap(),
            StepStatus::NotReady
        );
        // b still has step 0 open
        assert_eq!(b.current_step(), 0);
    }

    #[test]
    fn test_mem_sink_captures_steps_and_finish() {
        let sink = MemSink::create(1);
        let mut writer = sink.writer();
        writer.define_array("U/pdf", &[2, 4], &[0, 0], &[2, 4]).unwrap();
        writer.begin_step().unwrap();
        writer
            .put("U/pdf", &[1.0, 0.0, 0.0, 3.0, 0.0, 2.0, 2.0, 0.0])
            .unwrap();
        writer.end_step().unwrap();
        writer.close().unwrap();

        let steps = sink.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].arrays["U/pdf"].shape, vec![2, 4]);
        assert!(sink.finished());
    }

    #[test]
    fn test_collective_mode_is_reported() {
        let sink = MemSink::with_mode(2, SharedWriteMode::Collective);
        let writer = sink.writer();
        assert_eq!(writer.shared_write_mode(), SharedWriteMode::Collective);
    }
}
