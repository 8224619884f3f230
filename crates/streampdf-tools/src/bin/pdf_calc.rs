//! Streaming PDF analysis of a step-streamed simulation output.
//!
//! Reads the `U` and `V` fields from the input stream, computes the PDF of
//! every 2-D slice per step, and writes the results through the output
//! stream.
//!
//! Usage: `pdf_calc <input> <output> [N] [output_inputdata]`

use std::env;
use std::process;
use std::thread;
use std::time::Instant;

use streampdf_core::{CancelToken, Error, LocalGroup, PerfSample, Result, WorkerGroup};
use streampdf_io::{FileSink, FileStreamReader};
use streampdf_pipeline::{AnalysisConfig, PdfPipeline};
use tracing::{error, info};

const WORKERS_ENV: &str = "STREAMPDF_WORKERS";

fn print_usage() {
    println!("Usage: pdf_calc input output [N] [output_inputdata]");
    println!("  input:   Name of the input stream directory to read data from");
    println!("  output:  Name of the output stream directory to write results to");
    println!("  N:       Number of bins for the PDF calculation, default = 1000");
    println!("  output_inputdata: YES will write the original variables besides the analysis results");
    println!();
    println!("Set {WORKERS_ENV} to run more than one worker (default 1).");
}

fn parse_workers() -> Result<usize> {
    let value = match env::var(WORKERS_ENV) {
        Ok(value) => value,
        Err(_) => return Ok(1),
    };
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::InvalidParameter(format!(
            "{WORKERS_ENV} must be a positive integer, got '{value}'"
        ))),
    }
}

fn run() -> Result<i32> {
    let start_total = Instant::now();
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        println!("Not enough arguments");
        print_usage();
        return Ok(0);
    }

    let input = args[1].clone();
    let output = args[2].clone();

    let mut config = AnalysisConfig::default();
    if let Some(raw) = args.get(3) {
        let value: i64 = raw.parse().map_err(|_| {
            Error::InvalidParameter(format!("bin count must be an integer, got '{raw}'"))
        })?;
        config = config.with_nbins_arg(value);
    }
    if let Some(flag) = args.get(4) {
        config = config.with_write_input_flag(flag);
    }

    let workers = parse_workers()?;
    info!(
        input = %input,
        output = %output,
        nbins = config.nbins,
        write_input = config.write_input,
        workers,
        "starting PDF analysis"
    );

    let sink = FileSink::create(&output, workers)?;
    let cancel = CancelToken::new();

    let handles: Vec<_> = LocalGroup::split(workers)
        .into_iter()
        .map(|group| {
            let input = input.clone();
            let writer = sink.writer();
            let config = config.clone();
            let cancel = cancel.clone();
            thread::spawn(move || -> Result<()> {
                let worker_started = Instant::now();
                let reader = FileStreamReader::open(&input);
                let mut sample = PerfSample::new();
                sample.initialize = worker_started.elapsed();

                let pipeline = PdfPipeline::new(reader, writer, &group, config);
                pipeline.run(&cancel, &mut sample)?;

                sample.total = worker_started.elapsed();
                let report = sample.reduce(&group)?;
                if group.rank() == 0 {
                    println!("{report}");
                }
                group.barrier();
                Ok(())
            })
        })
        .collect();

    let mut failed = false;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!("worker failed: {err}");
                eprintln!("pdf_calc: {err}");
                cancel.cancel();
                failed = true;
            }
            Err(_) => {
                eprintln!("pdf_calc: a worker panicked");
                cancel.cancel();
                failed = true;
            }
        }
    }

    if failed {
        return Ok(1);
    }
    info!(
        elapsed_seconds = start_total.elapsed().as_secs_f64(),
        "analysis complete"
    );
    Ok(0)
}

fn main() {
    streampdf_tools::init_logging();
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("pdf_calc: {err}");
            process::exit(1);
        }
    }
}
