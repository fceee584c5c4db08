//! Incremental compilation core for a per-source-file compiler driver.
//!
//! Given a set of inputs, a prior [`build_record::BuildRecord`], and
//! the [`module_graph::ModuleGraph`] reconstructed from every previous
//! per-file dependency artifact, decides which inputs must recompile
//! and drives them through a bounded worker pool, ingesting
//! newly-discovered work as each compile completes.
//!
//! Toolchain resolution, option-table/flag parsing, the subprocess I/O
//! pump, and link/archive/dsym phases are out of scope: they are
//! reached through the narrow capability traits in [`fs`], [`config`],
//! and [`job`].

#[macro_use]
extern crate tracing;

pub mod build_record;
pub mod config;
pub mod dep_key;
pub mod error;
pub mod fs;
pub mod incremental_state;
pub mod integrator;
pub mod job;
pub mod module_graph;
pub mod per_file_graph;
pub mod report;
pub mod scheduler;
pub mod tracer;

pub use error::{Error, Result};

use crate::{
    build_record::BuildRecord,
    config::{DriverOptions, OutputFileMap},
    fs::{FileId, FileSystem, FileTable, RealFileSystem},
    incremental_state::{compute_skipped_inputs, not_incremental_reason, CompilerMode, IncrementalRequest, InputContext},
    job::{Job, JobRunner},
    module_graph::ModuleGraph,
    report::{CollectingReporter, Reporter},
    scheduler::{CompileReport, PreparedJob},
};
use std::{collections::HashMap, path::PathBuf, sync::Arc};

/// One input source file plus the prior dependency artifact path the
/// driver should try to integrate before deciding what to schedule.
pub struct DriverInput {
    pub path: PathBuf,
    pub prior_dep_artifact: Option<PathBuf>,
    pub declared_outputs: Vec<PathBuf>,
}

/// Configuration for one invocation of [`Driver::compile`].
pub struct DriverOptionsBundle {
    pub incremental_requested: bool,
    pub mode: CompilerMode,
    pub embed_bitcode: bool,
    pub always_rebuild_dependents: bool,
    pub worker_count: usize,
    /// Identifies the frontend that will run the actual compiles;
    /// compared against the prior build record's recorded version.
    pub compiler_version: String,
    /// Where to persist the build record this invocation produces.
    /// `None` skips the write (e.g. demonstration/test wiring).
    pub build_record_path: Option<PathBuf>,
}

impl Default for DriverOptionsBundle {
    fn default() -> Self {
        Self {
            incremental_requested: true,
            mode: CompilerMode::Normal,
            embed_bitcode: false,
            always_rebuild_dependents: false,
            worker_count: num_cpus::get(),
            compiler_version: String::new(),
            build_record_path: None,
        }
    }
}

/// Owns the configuration for one build and exposes [`Driver::compile`]
/// as the single external entry point, the way a `Project` exposes
/// `compile()`.
pub struct Driver {
    pub options: DriverOptionsBundle,
    pub file_system: Arc<dyn FileSystem>,
    pub reporter: Arc<dyn Reporter>,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            options: DriverOptionsBundle::default(),
            file_system: Arc::new(RealFileSystem),
            reporter: Arc::new(CollectingReporter::new()),
        }
    }
}

impl Driver {
    pub fn new(options: DriverOptionsBundle) -> Self {
        Self { options, ..Self::default() }
    }

    /// Runs one build: reads the prior [`BuildRecord`] (if any),
    /// reconstructs the [`ModuleGraph`], decides the first wave, and
    /// drives the scheduler to completion.
    pub fn compile(
        &self,
        inputs: Vec<DriverInput>,
        driver_options: &dyn DriverOptions,
        output_file_map: &dyn OutputFileMap,
        prior_build_record: Option<BuildRecord>,
        job_runner: Arc<dyn JobRunner>,
    ) -> Result<CompileReport> {
        let build_time = crate::fs::Timestamp::from_system_time(std::time::SystemTime::now());

        let mut file_table = FileTable::new();
        let mut graph = ModuleGraph::new();
        let mut files: Vec<FileId> = Vec::new();
        let mut malformed_dep_files: std::collections::HashSet<FileId> = std::collections::HashSet::new();

        for input in &inputs {
            let file = file_table.intern(input.path.clone());
            files.push(file);
            if let Some(artifact_path) = &input.prior_dep_artifact {
                if self.file_system.exists(artifact_path) {
                    match self.file_system.read(artifact_path).and_then(|b| per_file_graph::read(&b)) {
                        Ok(parsed) => {
                            integrator::integrate(&mut graph, file, &parsed)?;
                        }
                        Err(e) => {
                            malformed_dep_files.insert(file);
                            self.reporter.report(report::Diagnostic::warning(format!(
                                "could not integrate prior artifact for {}: {e}",
                                input.path.display()
                            )));
                        }
                    }
                }
            }
        }

        let has_master_swift_deps =
            files.first().map(|f| output_file_map.swift_deps_for(*f).is_some()).unwrap_or(false);

        let mismatch = prior_build_record.as_ref().and_then(|record| {
            let current_inputs: Vec<String> = inputs.iter().map(|i| i.path.display().to_string()).collect();
            record.mismatch_reason(&self.options.compiler_version, Some(&driver_options.args_hash()), &current_inputs)
        });

        let request = IncrementalRequest {
            incremental_requested: self.options.incremental_requested,
            mode: self.options.mode,
            embed_bitcode: self.options.embed_bitcode,
            has_output_file_map: true,
            always_rebuild_dependents: self.options.always_rebuild_dependents,
        };

        let not_incremental = not_incremental_reason(
            &request,
            has_master_swift_deps,
            prior_build_record.as_ref(),
            mismatch.as_deref(),
        );

        let incremental_attempted = prior_build_record.is_some() && not_incremental.is_none();

        let (mandatory, mut skipped_files): (Vec<FileId>, Vec<FileId>) = match (&prior_build_record, &not_incremental) {
            (Some(record), None) => {
                let contexts: Vec<InputContext<'_>> = inputs
                    .iter()
                    .zip(&files)
                    .map(|(input, file)| InputContext {
                        file: *file,
                        path: &input.path,
                        declared_outputs: &input.declared_outputs,
                        dep_file_malformed: malformed_dep_files.contains(file),
                    })
                    .collect();
                let selection = compute_skipped_inputs(
                    &mut graph,
                    self.file_system.as_ref(),
                    output_file_map,
                    record,
                    &contexts,
                    self.options.always_rebuild_dependents,
                );
                (selection.mandatory.into_iter().collect(), selection.skipped.into_iter().collect())
            }
            _ => {
                if let Some(reason) = &not_incremental {
                    debug!("incremental compilation disabled: {reason}");
                }
                (files.clone(), Vec::new())
            }
        };

        let mut job_counter = 0u32;
        let mut next_job_id = || {
            let id = crate::job::JobId(job_counter);
            job_counter += 1;
            id
        };

        let mut first_wave = Vec::new();
        let mut job_to_file = HashMap::new();
        for file in &mandatory {
            let id = next_job_id();
            job_to_file.insert(id, *file);
            first_wave.push(Job { id, kind: crate::job::JobKind::Compile { primary_input: *file } });
        }

        let mut skipped = HashMap::new();
        skipped_files.drain(..).for_each(|file| {
            let id = next_job_id();
            job_to_file.insert(id, file);
            skipped.insert(file, PreparedJob { file, job: Job { id, kind: crate::job::JobKind::Compile { primary_input: file } } });
        });

        let mut compile_report = scheduler::run(
            &mut graph,
            self.file_system.as_ref(),
            self.reporter.as_ref(),
            self.options.worker_count,
            job_runner,
            first_wave,
            skipped,
            job_to_file,
        );

        let input_paths: Vec<(FileId, &std::path::Path)> =
            inputs.iter().zip(&files).map(|(input, file)| (*file, input.path.as_path())).collect();
        let new_record = scheduler::derive_build_record(
            &compile_report,
            self.file_system.as_ref(),
            self.options.compiler_version.clone(),
            Some(driver_options.args_hash()),
            build_time,
            incremental_attempted,
            &input_paths,
        );
        if let Some(path) = &self.options.build_record_path {
            self.file_system.write(path, new_record.to_yaml_string()?.as_bytes())?;
        }
        compile_report.build_record = Some(new_record);

        Ok(compile_report)
    }
}
