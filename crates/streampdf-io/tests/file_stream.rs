//! Round trips through the directory-backed step stream

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use streampdf_io::{FileSink, FileStreamReader, StepReader, StepStatus, StepWriter};

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("streampdf-io-{tag}-{}", std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    dir
}

#[test]
fn test_round_trip_single_worker() {
    let dir = scratch_dir("round-trip");
    let sink = FileSink::create(&dir, 1).unwrap();
    let mut writer = sink.writer();

    writer.define_array("U", &[2, 1, 3], &[0, 0, 0], &[2, 1, 3]).unwrap();
    writer.define_scalar("step").unwrap();

    for step in 0..2i64 {
        let base = step as f64 * 10.0;
        writer.begin_step().unwrap();
        writer
            .put("U", &[base, base + 1.0, base + 2.0, base + 3.0, base + 4.0, base + 5.0])
            .unwrap();
        writer.put_scalar("step", 100 + step).unwrap();
        writer.end_step().unwrap();
    }
    writer.close().unwrap();

    let mut reader = FileStreamReader::open(&dir);
    let mut buf = Vec::new();

    assert_eq!(
        reader.begin_step(Duration::from_secs(1)).unwrap(),
        StepStatus::Ready
    );
    assert_eq!(reader.current_step(), 0);
    let meta = reader.variable_meta("U").unwrap();
    assert_eq!(meta.shape, vec![2, 1, 3]);
    assert_eq!(meta.min_max, Some((0.0, 5.0)));

    // second row only
    reader.set_selection("U", &[1, 0, 0], &[1, 1, 3]).unwrap();
    reader.get("U", &mut buf).unwrap();
    assert_eq!(buf, vec![3.0, 4.0, 5.0]);
    assert_eq!(reader.get_scalar("step").unwrap(), Some(100));
    assert_eq!(reader.get_scalar("missing").unwrap(), None);
    reader.end_step().unwrap();

    assert_eq!(
        reader.begin_step(Duration::from_secs(1)).unwrap(),
        StepStatus::Ready
    );
    assert_eq!(reader.get_scalar("step").unwrap(), Some(101));
    reader.end_step().unwrap();

    assert_eq!(
        reader.begin_step(Duration::from_secs(1)).unwrap(),
        StepStatus::EndOfStream
    );
    reader.close().unwrap();

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_missing_directory_reads_as_not_ready() {
    let dir = scratch_dir("missing-dir");
    let mut reader = FileStreamReader::open(&dir);
    assert_eq!(
        reader.begin_step(Duration::from_millis(20)).unwrap(),
        StepStatus::NotReady
    );
}

#[test]
fn test_two_workers_assemble_one_record() {
    let dir = scratch_dir("two-workers");
    let sink = FileSink::create(&dir, 2).unwrap();

    let handles: Vec<_> = (0..2usize)
        .map(|rank| {
            let mut writer = sink.writer();
            thread::spawn(move || {
                writer
                    .define_array("U/pdf", &[4, 2], &[rank * 2, 0], &[2, 2])
                    .unwrap();
                writer.begin_step().unwrap();
                let base = rank as f64 * 4.0;
                writer
                    .put("U/pdf", &[base, base + 1.0, base + 2.0, base + 3.0])
                    .unwrap();
                writer.end_step().unwrap();
                writer.close().unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut reader = FileStreamReader::open(&dir);
    assert_eq!(
        reader.begin_step(Duration::from_secs(1)).unwrap(),
        StepStatus::Ready
    );
    let mut buf = Vec::new();
    reader.get("U/pdf", &mut buf).unwrap();
    assert_eq!(buf, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    reader.end_step().unwrap();
    assert_eq!(
        reader.begin_step(Duration::from_secs(1)).unwrap(),
        StepStatus::EndOfStream
    );

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_reader_blocks_until_the_producer_publishes() {
    let dir = scratch_dir("late-producer");
    let producer_dir = dir.clone();

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let sink = FileSink::create(&producer_dir, 1).unwrap();
        let mut writer = sink.writer();
        writer.define_array("U", &[1, 1, 1], &[0, 0, 0], &[1, 1, 1]).unwrap();
        writer.begin_step().unwrap();
        writer.put("U", &[42.0]).unwrap();
        writer.end_step().unwrap();
        writer.close().unwrap();
    });

    let mut reader = FileStreamReader::open(&dir);
    assert_eq!(
        reader.begin_step(Duration::from_secs(5)).unwrap(),
        StepStatus::Ready
    );
    let mut buf = Vec::new();
    reader.get("U", &mut buf).unwrap();
    assert_eq!(buf, vec![42.0]);

    producer.join().unwrap();
    fs::remove_dir_all(&dir).ok();
}
