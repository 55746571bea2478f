//! Reads lines from stdin and "loads" them in batches of 100 lines.
//!
//! Try `seq 1 100000 | cargo run --example load_lines`.
//! All settings can be overridden via "BATCHPROC_*" env vars.
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batchproc::collector::SizeBasedCollector;
use batchproc::logging::{LogConfig, StdOutLogger};
use batchproc::{BatchProcessor, Builder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bytes_loaded = Arc::new(AtomicUsize::new(0));

    let mut builder = Builder::from_env()?
        .processor_name("load-lines")
        .job_log_period(100u64)
        .drain_poll_interval_secs(1u64);

    // This is not necessary and just used
    // to print the configured values
    builder.apply_defaults();
    println!("{:#?}", builder);

    let job = {
        let bytes_loaded = Arc::clone(&bytes_loaded);
        move |batch: Vec<String>| -> Result<(), String> {
            if batch.iter().any(|line| line.trim().is_empty()) {
                return Err(format!("batch of {} lines contains a blank line", batch.len()));
            }
            let bytes: usize = batch.iter().map(String::len).sum();
            bytes_loaded.fetch_add(bytes, Ordering::SeqCst);
            Ok(())
        }
    };

    let processor: BatchProcessor<Vec<String>, _, _> = builder.build_with(
        job,
        SizeBasedCollector::new(100)?,
        StdOutLogger::new(LogConfig::long()),
    )?;

    let stdin = io::stdin();
    let lines = stdin.lock().lines().collect::<Result<Vec<_>, _>>()?;
    processor.process(lines, "still loading lines")?;

    println!(
        "loaded {} bytes in {} batches, {} batches failed",
        bytes_loaded.load(Ordering::SeqCst),
        processor.completed_batches(),
        processor.failed_batches()
    );

    Ok(())
}
