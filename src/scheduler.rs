//! The two-wave scheduler: drives the bounded worker pool through the
//! first wave of mandatory jobs, then dynamically ingests second-wave
//! discoveries as each compile's freshly written per-file artifact is
//! integrated (§4.6/§5).

pub mod pool;

use crate::{
    build_record::{BuildRecord, InputInfo, InputStatus},
    fs::{FileId, FileSystem, Timestamp},
    integrator,
    job::{Job, JobId, JobResult},
    module_graph::ModuleGraph,
    per_file_graph,
    report::{Diagnostic, Reporter},
    tracer::{owning_files, Tracer},
};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Outcome of one whole build: which jobs ran and how.
#[derive(Debug, Default)]
pub struct CompileReport {
    pub succeeded: Vec<JobId>,
    pub failed: Vec<JobId>,
    /// Files that were skipped and never promoted into the running set.
    pub remained_skipped: Vec<FileId>,
    pub succeeded_files: HashSet<FileId>,
    pub failed_files: HashSet<FileId>,
    /// The record to persist for this invocation, filled in by the
    /// driver once the build finishes (§4.5 write path).
    pub build_record: Option<BuildRecord>,
}

impl CompileReport {
    pub fn build_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A job group prepared for a file but not yet submitted, sitting in
/// the skipped pool until the second wave promotes it (§4.6).
pub struct PreparedJob {
    pub file: FileId,
    pub job: Job,
}

/// Drives `first_wave` to completion, promoting files out of `skipped`
/// as the Integrator/Tracer reveal they're newly affected.
///
/// `job_to_file` maps every submitted job back to the input file it
/// belongs to, so a completed compile's fresh artifact can be
/// re-integrated under the right [`FileId`].
#[allow(clippy::too_many_arguments)]
pub fn run(
    graph: &mut ModuleGraph,
    fs: &dyn FileSystem,
    reporter: &dyn Reporter,
    worker_count: usize,
    job_runner: std::sync::Arc<dyn crate::job::JobRunner>,
    first_wave: Vec<Job>,
    mut skipped: HashMap<FileId, PreparedJob>,
    mut job_to_file: HashMap<JobId, FileId>,
) -> CompileReport {
    let pool = pool::WorkerPool::new(worker_count, job_runner);
    let mut unfinished: HashSet<JobId> = first_wave.iter().map(|j| j.id).collect();
    let mut report = CompileReport::default();

    for job in first_wave {
        pool.submit(job);
    }

    while !unfinished.is_empty() {
        let Some(result) = pool.recv() else { break };
        let job_id = result.job_id();
        unfinished.remove(&job_id);

        match result {
            JobResult::SpawnFailed { reason, .. } => {
                reporter.report(Diagnostic::error(format!("failed to spawn job {job_id:?}: {reason}")));
                report.failed.push(job_id);
                // Fatal: drain remaining jobs without waiting further.
                break;
            }
            JobResult::Ran(outcome) => {
                if !outcome.succeeded {
                    report.failed.push(job_id);
                    if let Some(file) = job_to_file.get(&job_id) {
                        report.failed_files.insert(*file);
                    }
                    continue;
                }
                report.succeeded.push(job_id);
                if let Some(file) = job_to_file.get(&job_id) {
                    report.succeeded_files.insert(*file);
                }

                let mut changed = Vec::new();
                for (file, path) in &outcome.written_dep_artifacts {
                    let bytes = match fs.read(path) {
                        Ok(b) => b,
                        Err(e) => {
                            reporter.report(Diagnostic::warning(format!(
                                "could not read dependency artifact {}: {e}",
                                path.display()
                            )));
                            continue;
                        }
                    };
                    let parsed = match per_file_graph::read(&bytes) {
                        Ok(g) => g,
                        Err(e) => {
                            reporter.report(Diagnostic::warning(format!(
                                "malformed dependency artifact {}: {e}",
                                path.display()
                            )));
                            continue;
                        }
                    };
                    match integrator::integrate(graph, *file, &parsed) {
                        Ok(handles) => changed.extend(handles),
                        Err(e) => reporter.report(Diagnostic::error(format!("integration failed: {e}"))),
                    }
                }

                if changed.is_empty() {
                    continue;
                }

                let mut tracer = Tracer::new(false);
                let visited = tracer.trace(graph, changed);
                for affected_file in owning_files(graph, &visited) {
                    if let Some(prepared) = skipped.remove(&affected_file) {
                        unfinished.insert(prepared.job.id);
                        job_to_file.insert(prepared.job.id, affected_file);
                        pool.submit(prepared.job);
                    }
                }
            }
        }
    }

    report.remained_skipped = skipped.keys().copied().collect();
    pool.shutdown();
    report
}

/// Derives the `BuildRecord` to persist for this invocation from its
/// outcome, per the write path of §4.5: a skipped input or a successful
/// compile is recorded `up_to_date`; a failure is recorded
/// `needs_non_cascading_build` if this build had incremental context to
/// isolate it, or the more conservative `needs_cascading_build` if it
/// didn't (a skipped input can never also appear as a job result, so
/// the two cases above are exhaustive and mutually exclusive).
#[allow(clippy::too_many_arguments)]
pub fn derive_build_record(
    report: &CompileReport,
    fs: &dyn FileSystem,
    compiler_version: impl Into<String>,
    args_hash: Option<String>,
    build_time: Timestamp,
    incremental_attempted: bool,
    inputs: &[(FileId, &Path)],
) -> BuildRecord {
    let mut record = BuildRecord::new(compiler_version, build_time);
    record.args_hash = args_hash;

    for (file, path) in inputs {
        let was_skipped = report.remained_skipped.contains(file);
        debug_assert!(
            !(was_skipped && (report.succeeded_files.contains(file) || report.failed_files.contains(file))),
            "a skipped input must not also carry a job result"
        );
        let status = if was_skipped || report.succeeded_files.contains(file) {
            InputStatus::UpToDate
        } else if report.failed_files.contains(file) {
            if incremental_attempted {
                InputStatus::NeedsNonCascadingBuild
            } else {
                InputStatus::NeedsCascadingBuild
            }
        } else {
            InputStatus::UpToDate
        };
        let previous_mod_time = fs.modified(path).unwrap_or(Timestamp::EPOCH);
        record.inputs.insert(path.display().to_string(), InputInfo { status, previous_mod_time });
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::{JobKind, JobOutcome, JobRunner},
        report::CollectingReporter,
    };
    use std::sync::{Arc, Mutex};

    struct AlwaysSucceeds;
    impl JobRunner for AlwaysSucceeds {
        fn run(&self, job: &Job) -> JobResult {
            JobResult::Ran(JobOutcome::success(job.id))
        }
    }

    struct NoopFs;
    impl FileSystem for NoopFs {
        fn exists(&self, _path: &std::path::Path) -> bool {
            false
        }
        fn modified(&self, _path: &std::path::Path) -> crate::error::Result<crate::fs::Timestamp> {
            Ok(crate::fs::Timestamp::EPOCH)
        }
        fn read_to_string(&self, _path: &std::path::Path) -> crate::error::Result<String> {
            unimplemented!()
        }
        fn read(&self, _path: &std::path::Path) -> crate::error::Result<Vec<u8>> {
            unimplemented!()
        }
        fn write(&self, _path: &std::path::Path, _contents: &[u8]) -> crate::error::Result<()> {
            unimplemented!()
        }
    }

    #[test]
    fn first_wave_runs_to_completion_with_no_second_wave() {
        let mut graph = ModuleGraph::new();
        let fs = NoopFs;
        let reporter = CollectingReporter::new();
        let jobs = vec![
            Job { id: JobId(0), kind: JobKind::Compile { primary_input: FileId(0) } },
            Job { id: JobId(1), kind: JobKind::Compile { primary_input: FileId(1) } },
        ];
        let report = run(
            &mut graph,
            &fs,
            &reporter,
            2,
            Arc::new(AlwaysSucceeds),
            jobs,
            HashMap::new(),
            HashMap::new(),
        );
        assert_eq!(report.succeeded.len(), 2);
        assert!(report.build_succeeded());
    }

    struct FailsOnce {
        calls: Mutex<u32>,
    }
    impl JobRunner for FailsOnce {
        fn run(&self, job: &Job) -> JobResult {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                JobResult::Ran(JobOutcome::failure(job.id))
            } else {
                JobResult::Ran(JobOutcome::success(job.id))
            }
        }
    }

    #[test]
    fn failed_compile_marks_build_failed_but_other_jobs_still_run() {
        let mut graph = ModuleGraph::new();
        let fs = NoopFs;
        let reporter = CollectingReporter::new();
        let jobs = vec![
            Job { id: JobId(0), kind: JobKind::Compile { primary_input: FileId(0) } },
            Job { id: JobId(1), kind: JobKind::Compile { primary_input: FileId(1) } },
        ];
        let report = run(
            &mut graph,
            &fs,
            &reporter,
            1,
            Arc::new(FailsOnce { calls: Mutex::new(0) }),
            jobs,
            HashMap::new(),
            HashMap::new(),
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.succeeded.len(), 1);
        assert!(!report.build_succeeded());
    }
}
