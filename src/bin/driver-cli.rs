//! Minimal demonstration CLI wiring the incremental core to a list of
//! source paths on the command line. Real flag parsing, toolchain
//! resolution, and subprocess launching are out of scope for this
//! crate; this binary exists to exercise [`swift_driver_incremental::Driver`]
//! end to end, not to be a complete `swiftc` frontend.

use std::sync::Arc;
use swift_driver_incremental::{
    config::{JsonOutputFileMap, OutputType, SimpleDriverOptions},
    job::{Job, JobOutcome, JobResult, JobRunner},
    Driver, DriverInput, DriverOptionsBundle,
};

struct AlwaysSucceeds;

impl JobRunner for AlwaysSucceeds {
    fn run(&self, job: &Job) -> JobResult {
        JobResult::Ran(JobOutcome::success(job.id))
    }
}

fn main() -> swift_driver_incremental::Result<()> {
    tracing_subscriber::fmt::init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: driver-cli <source-file>...");
        std::process::exit(1);
    }

    let inputs: Vec<DriverInput> = paths
        .iter()
        .map(|p| DriverInput { path: p.into(), prior_dep_artifact: None, declared_outputs: Vec::new() })
        .collect();

    let driver = Driver::new(DriverOptionsBundle { incremental_requested: false, ..Default::default() });
    let driver_options = SimpleDriverOptions::new();
    let output_file_map = JsonOutputFileMap::new();
    let _ = OutputType::Object; // demonstration wiring only; real map is populated by the planner.

    let report = driver.compile(inputs, &driver_options, &output_file_map, None, Arc::new(AlwaysSucceeds))?;

    println!("succeeded: {}", report.succeeded.len());
    println!("failed: {}", report.failed.len());
    if !report.build_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
