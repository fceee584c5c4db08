//! The narrow surface the job executor exposes to the incremental
//! core: identities, kinds, and outcomes. Spawning and the subprocess
//! I/O pump are out of scope (§1); the driver only needs to know what
//! finished and how (§2).

use crate::fs::FileId;

/// Identity of one scheduled job, stable for the lifetime of an
/// invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u32);

/// What a job does. Only `Compile` jobs participate in incremental
/// bookkeeping; pre-compile/link/archive/dsym jobs run unconditionally
/// as part of the external batching policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Compile { primary_input: FileId },
    PreCompile,
    Other { label: String },
}

/// Whether a completed job succeeded, and the per-file dependency
/// artifacts it freshly wrote (if any), which the scheduler re-
/// integrates on a successful compile (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job: JobId,
    pub succeeded: bool,
    /// Paths to per-file dependency artifacts written by this job,
    /// ready to be parsed by [`crate::per_file_graph::read`].
    pub written_dep_artifacts: Vec<(FileId, std::path::PathBuf)>,
}

impl JobOutcome {
    pub fn success(job: JobId) -> Self {
        Self { job, succeeded: true, written_dep_artifacts: Vec::new() }
    }

    pub fn failure(job: JobId) -> Self {
        Self { job, succeeded: false, written_dep_artifacts: Vec::new() }
    }
}

/// One unit of scheduled work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
}

/// Result of spawning and waiting on a job's subprocess, as the
/// scheduler sees it: either it ran to completion (with an outcome)
/// or spawning itself failed outright (fatal to the whole build, §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Ran(JobOutcome),
    SpawnFailed { job: JobId, reason: String },
}

impl JobResult {
    pub fn job_id(&self) -> JobId {
        match self {
            JobResult::Ran(outcome) => outcome.job,
            JobResult::SpawnFailed { job, .. } => *job,
        }
    }
}

/// Capability that actually executes a job. Injected so the scheduler
/// is testable without a real frontend binary (§5).
pub trait JobRunner: Send + Sync {
    fn run(&self, job: &Job) -> JobResult;
}
