//! Directory-backed step stream engines
//!
//! A stream is a directory of step records, one JSON file per step,
//! published by atomic rename so readers never observe a half-written
//! record. A `stream.done` marker closes the stream; readers report
//! `EndOfStream` once the marker exists and no further record follows.

use crate::assembly::{slab_range, CollectiveWriter, CompletedStep, SharedAssembly};
use crate::traits::{SharedWriteMode, StepReader, StepStatus, VarMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use streampdf_core::{Error, Result};
use tracing::{debug, info};

const DONE_MARKER: &str = "stream.done";
const POLL_SLICE: Duration = Duration::from_millis(50);

fn step_file_name(index: u64) -> String {
    format!("step.{index:09}.json")
}

#[derive(Debug, Serialize, Deserialize)]
struct StepRecord {
    step: u64,
    arrays: BTreeMap<String, ArrayRecord>,
    scalars: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArrayRecord {
    shape: Vec<usize>,
    data: Vec<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

fn write_step_record(dir: &Path, step: CompletedStep) -> Result<()> {
    let record = StepRecord {
        step: step.index,
        arrays: step
            .arrays
            .into_iter()
            .map(|(name, array)| {
                (
                    name,
                    ArrayRecord {
                        shape: array.shape,
                        data: array.data,
                        min: array.min_max.map(|m| m.0),
                        max: array.min_max.map(|m| m.1),
                    },
                )
            })
            .collect(),
        scalars: step.scalars,
    };

    let final_path = dir.join(step_file_name(record.step));
    let tmp_path = final_path.with_extension("json.tmp");
    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    serde_json::to_writer(&mut writer, &record)?;
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp_path, &final_path)?;
    debug!(step = record.step, path = %final_path.display(), "published step record");
    Ok(())
}

/// Write side of a directory stream
///
/// Created once per worker group; every worker takes exactly one handle via
/// [`FileSink::writer`]. The stream is finished (the done marker written)
/// when every handle has been closed.
pub struct FileSink {
    assembly: Arc<SharedAssembly>,
}

impl FileSink {
    /// Create the output directory and the shared sink for `participants`
    /// workers
    pub fn create(dir: impl AsRef<Path>, participants: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(path = %dir.display(), participants, "opened file stream for writing");

        let flush_dir = dir.clone();
        let assembly = SharedAssembly::new(
            participants,
            SharedWriteMode::RankZero,
            Box::new(move |step| write_step_record(&flush_dir, step)),
            Box::new(move || {
                fs::write(dir.join(DONE_MARKER), b"")?;
                Ok(())
            }),
        );
        Ok(Self { assembly })
    }

    /// One worker's writer handle
    pub fn writer(&self) -> CollectiveWriter {
        self.assembly.writer()
    }
}

/// Read side of a directory stream
///
/// Opening records the path only; the directory may not exist yet while the
/// producer is still starting, which reads as `NotReady`.
pub struct FileStreamReader {
    dir: PathBuf,
    next_index: u64,
    current: Option<StepRecord>,
    selections: BTreeMap<String, (Vec<usize>, Vec<usize>)>,
}

impl FileStreamReader {
    /// Open a directory stream for reading
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            next_index: 0,
            current: None,
            selections: BTreeMap::new(),
        }
    }

    fn load(path: &Path) -> Result<StepRecord> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn current(&self) -> Result<&StepRecord> {
        self.current
            .as_ref()
            .ok_or_else(|| Error::Stream("no step is open".to_string()))
    }
}

impl StepReader for FileStreamReader {
    fn begin_step(&mut self, timeout: Duration) -> Result<StepStatus> {
        let deadline = Instant::now() + timeout;
        let path = self.dir.join(step_file_name(self.next_index));
        loop {
            if path.exists() {
                self.current = Some(Self::load(&path)?);
                return Ok(StepStatus::Ready);
            }
            if self.dir.join(DONE_MARKER).exists() {
                // the marker lands after the last record; look once more
                if path.exists() {
                    self.current = Some(Self::load(&path)?);
                    return Ok(StepStatus::Ready);
                }
                return Ok(StepStatus::EndOfStream);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(StepStatus::NotReady);
            }
            std::thread::sleep(POLL_SLICE.min(remaining));
        }
    }

    fn current_step(&self) -> u64 {
        self.current.as_ref().map_or(self.next_index, |r| r.step)
    }

    fn variable_meta(&self, name: &str) -> Result<VarMeta> {
        let record = self.current()?;
        if let Some(array) = record.arrays.get(name) {
            Ok(VarMeta {
                shape: array.shape.clone(),
                min_max: array.min.zip(array.max),
            })
        } else if record.scalars.contains_key(name) {
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
        let record = self
            .current
            .as_ref()
            .ok_or_else(|| Error::Stream("no step is open".to_string()))?;
        let array = record
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
        self.next_index += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.current = None;
        Ok(())
    }
}
