//! End-to-end scenarios from the incremental core's testable properties:
//! fresh build, no-op rebuild, a touched-but-unchanged leaf, an
//! interface-change cascade, an external-dependency refresh, and an
//! args-hash mismatch forcing a full rebuild. Each drives
//! [`Driver::compile`] against a real filesystem (scratch directory)
//! with a fake compiler standing in for the frontend subprocess.

use std::{
    collections::HashMap,
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use pretty_assertions::assert_eq;
use swift_driver_incremental::{
    build_record::{BuildRecord, InputInfo, InputStatus},
    config::{JsonOutputFileMap, OutputType, SimpleDriverOptions},
    dep_key::{Aspect, DependencyKey},
    fs::{FileId, FileSystem, RealFileSystem, Timestamp},
    job::{Job, JobKind, JobOutcome, JobResult, JobRunner},
    per_file_graph::{self, PerFileGraph, PerFileNode},
    Driver, DriverInput, DriverOptionsBundle,
};

fn write_file(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

/// Sets a file's mtime and reads it back through [`RealFileSystem`] so
/// the returned [`Timestamp`] matches whatever precision the host
/// filesystem actually stores, rather than what we asked it to store.
fn set_mtime(path: &Path, at: SystemTime) -> Timestamp {
    OpenOptions::new().write(true).open(path).unwrap().set_modified(at).unwrap();
    RealFileSystem.modified(path).unwrap()
}

fn provides(key: DependencyKey, fingerprint: Option<&str>, depends_on: Vec<u32>) -> PerFileNode {
    PerFileNode { key, is_provides: true, fingerprint: fingerprint.map(str::to_string), depends_on }
}

fn uses(key: DependencyKey) -> PerFileNode {
    PerFileNode { key, is_provides: false, fingerprint: None, depends_on: vec![] }
}

/// A "Foo.swift" style file that provides one top-level symbol `name`
/// at a given fingerprint, with no outside dependencies.
fn leaf_graph(file_ident: &str, file_fp: &str, symbol: &str, symbol_fp: &str) -> PerFileGraph {
    PerFileGraph {
        major: 1,
        minor: 0,
        compiler_version: "test-1".into(),
        nodes: vec![
            provides(DependencyKey::source_file_provide(Aspect::Interface, file_ident), Some(file_fp), vec![]),
            provides(DependencyKey::source_file_provide(Aspect::Implementation, file_ident), Some(file_fp), vec![]),
            provides(DependencyKey::top_level(Aspect::Interface, symbol), Some(symbol_fp), vec![]),
        ],
    }
}

/// A file that provides its own interface/implementation nodes and
/// additionally *uses* `used_symbol` (recorded as a non-provides node
/// referenced from the implementation node's `depends_on`).
fn dependent_graph(file_ident: &str, file_fp: &str, used_symbol: &str) -> PerFileGraph {
    PerFileGraph {
        major: 1,
        minor: 0,
        compiler_version: "test-1".into(),
        nodes: vec![
            provides(DependencyKey::source_file_provide(Aspect::Interface, file_ident), Some(file_fp), vec![]),
            provides(DependencyKey::source_file_provide(Aspect::Implementation, file_ident), Some(file_fp), vec![2]),
            uses(DependencyKey::top_level(Aspect::Interface, used_symbol)),
        ],
    }
}

/// A file whose implementation depends on an `external_depend` key,
/// used to exercise the externally-dependent-inputs path (§4.6 step 2).
fn external_consumer_graph(file_ident: &str, file_fp: &str, external_path: &str) -> PerFileGraph {
    PerFileGraph {
        major: 1,
        minor: 0,
        compiler_version: "test-1".into(),
        nodes: vec![
            provides(DependencyKey::source_file_provide(Aspect::Interface, file_ident), Some(file_fp), vec![]),
            provides(DependencyKey::source_file_provide(Aspect::Implementation, file_ident), Some(file_fp), vec![2]),
            uses(DependencyKey::external_depend(external_path)),
        ],
    }
}

/// Everything one scenario needs: three source files on disk, their
/// object/dep-artifact output paths, and the fake compiler that will
/// "run" whichever of them get scheduled.
struct Project {
    _dir: tempfile::TempDir,
    paths: [PathBuf; 3],
    swift_deps: [PathBuf; 3],
    objects: [PathBuf; 3],
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let names = ["a.swift", "b.swift", "c.swift"];
        let paths = names.map(|n| dir.path().join(n));
        let swift_deps = names.map(|n| dir.path().join(format!("{n}.deps")));
        let objects = names.map(|n| dir.path().join(format!("{n}.o")));
        for (path, name) in paths.iter().zip(names) {
            write_file(path, &format!("// {name}\n"));
        }
        Self { _dir: dir, paths, swift_deps, objects }
    }

    fn output_file_map(&self) -> JsonOutputFileMap {
        let mut map = JsonOutputFileMap::new();
        for i in 0..3 {
            map.insert(FileId(i as u32), OutputType::SwiftDeps, self.swift_deps[i].clone());
            map.insert(FileId(i as u32), OutputType::Object, self.objects[i].clone());
        }
        map
    }

    fn inputs(&self, prior_artifacts: [Option<&Path>; 3]) -> Vec<DriverInput> {
        (0..3)
            .map(|i| DriverInput {
                path: self.paths[i].clone(),
                prior_dep_artifact: prior_artifacts[i].map(|p| p.to_path_buf()),
                declared_outputs: vec![self.objects[i].clone()],
            })
            .collect()
    }

    fn touch_all_outputs(&self) {
        for path in self.objects.iter().chain(self.swift_deps.iter()) {
            write_file(path, "placeholder");
        }
    }

    fn write_prior_artifact(&self, index: usize, graph: &PerFileGraph) -> PathBuf {
        let path = self.paths[index].with_extension("prior-deps");
        std::fs::write(&path, per_file_graph::write(graph)).unwrap();
        path
    }
}

/// A `JobRunner` standing in for the frontend subprocess: for each
/// `Compile` job it writes the dependency artifact prepared for that
/// file and an object file, then reports success.
struct FakeCompiler {
    graphs: HashMap<FileId, PerFileGraph>,
    swift_deps: HashMap<FileId, PathBuf>,
    objects: HashMap<FileId, PathBuf>,
}

impl JobRunner for FakeCompiler {
    fn run(&self, job: &Job) -> JobResult {
        let JobKind::Compile { primary_input } = job.kind else {
            return JobResult::Ran(JobOutcome::success(job.id));
        };
        let graph = self.graphs.get(&primary_input).expect("no fixture graph prepared for scheduled file");
        let swift_deps_path = self.swift_deps.get(&primary_input).unwrap();
        std::fs::write(swift_deps_path, per_file_graph::write(graph)).unwrap();
        if let Some(object_path) = self.objects.get(&primary_input) {
            write_file(object_path, "compiled");
        }
        JobResult::Ran(JobOutcome {
            job: job.id,
            succeeded: true,
            written_dep_artifacts: vec![(primary_input, swift_deps_path.clone())],
        })
    }
}

fn driver() -> Driver {
    Driver::new(DriverOptionsBundle { compiler_version: "5.9".into(), ..Default::default() })
}

#[test]
fn fresh_build_compiles_every_input() {
    let project = Project::new();
    let inputs = project.inputs([None, None, None]);
    let compiler = Arc::new(FakeCompiler {
        graphs: HashMap::from([
            (FileId(0), leaf_graph("a.swift", "a-v1", "Foo", "foo-v1")),
            (FileId(1), dependent_graph("b.swift", "b-v1", "Foo")),
            (FileId(2), leaf_graph("c.swift", "c-v1", "Bar", "bar-v1")),
        ]),
        swift_deps: HashMap::from([
            (FileId(0), project.swift_deps[0].clone()),
            (FileId(1), project.swift_deps[1].clone()),
            (FileId(2), project.swift_deps[2].clone()),
        ]),
        objects: HashMap::from([
            (FileId(0), project.objects[0].clone()),
            (FileId(1), project.objects[1].clone()),
            (FileId(2), project.objects[2].clone()),
        ]),
    });

    let report = driver()
        .compile(inputs, &SimpleDriverOptions::new(), &project.output_file_map(), None, compiler)
        .unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert!(report.failed.is_empty());
    let record = report.build_record.unwrap();
    for path in &project.paths {
        let key = path.display().to_string();
        assert_eq!(record.inputs.get(&key).unwrap().status, InputStatus::UpToDate);
    }
}

#[test]
fn no_op_rebuild_schedules_nothing() {
    let project = Project::new();
    project.touch_all_outputs();

    let now = SystemTime::now();
    let mtimes: Vec<Timestamp> = project.paths.iter().map(|p| set_mtime(p, now)).collect();

    let mut record = BuildRecord::new("5.9", Timestamp::EPOCH);
    for (path, mtime) in project.paths.iter().zip(&mtimes) {
        record.inputs.insert(
            path.display().to_string(),
            InputInfo { status: InputStatus::UpToDate, previous_mod_time: *mtime },
        );
    }

    let prior = [
        project.write_prior_artifact(0, &leaf_graph("a.swift", "a-v1", "Foo", "foo-v1")),
        project.write_prior_artifact(1, &dependent_graph("b.swift", "b-v1", "Foo")),
        project.write_prior_artifact(2, &leaf_graph("c.swift", "c-v1", "Bar", "bar-v1")),
    ];
    let inputs = project.inputs([Some(&prior[0]), Some(&prior[1]), Some(&prior[2])]);

    let compiler = Arc::new(FakeCompiler { graphs: HashMap::new(), swift_deps: HashMap::new(), objects: HashMap::new() });
    let report = driver()
        .compile(inputs, &SimpleDriverOptions::new(), &project.output_file_map(), Some(record), compiler)
        .unwrap();

    assert!(report.succeeded.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.remained_skipped.len(), 3);
}

#[test]
fn touched_leaf_with_unchanged_fingerprint_does_not_cascade() {
    let project = Project::new();
    project.touch_all_outputs();

    let base_time = set_mtime(&project.paths[1], SystemTime::now());
    let _ = set_mtime(&project.paths[2], SystemTime::now());

    let mut record = BuildRecord::new("5.9", Timestamp::EPOCH);
    record.inputs.insert(
        project.paths[0].display().to_string(),
        InputInfo { status: InputStatus::UpToDate, previous_mod_time: Timestamp::EPOCH },
    );
    record.inputs.insert(
        project.paths[1].display().to_string(),
        InputInfo { status: InputStatus::UpToDate, previous_mod_time: base_time },
    );
    let c_time = RealFileSystem.modified(&project.paths[2]).unwrap();
    record.inputs.insert(project.paths[2].display().to_string(), InputInfo { status: InputStatus::UpToDate, previous_mod_time: c_time });

    // A's mtime is touched (differs from the recorded EPOCH) but its
    // declarations keep the exact fingerprints the prior artifact had.
    let a_graph = leaf_graph("a.swift", "a-v1", "Foo", "foo-v1");
    let prior = [
        project.write_prior_artifact(0, &a_graph),
        project.write_prior_artifact(1, &dependent_graph("b.swift", "b-v1", "Foo")),
        project.write_prior_artifact(2, &leaf_graph("c.swift", "c-v1", "Bar", "bar-v1")),
    ];
    let inputs = project.inputs([Some(&prior[0]), Some(&prior[1]), Some(&prior[2])]);

    let compiler = Arc::new(FakeCompiler {
        graphs: HashMap::from([(FileId(0), a_graph)]),
        swift_deps: HashMap::from([(FileId(0), project.swift_deps[0].clone())]),
        objects: HashMap::from([(FileId(0), project.objects[0].clone())]),
    });

    let report = driver()
        .compile(inputs, &SimpleDriverOptions::new(), &project.output_file_map(), Some(record), compiler)
        .unwrap();

    assert_eq!(report.succeeded_files, [FileId(0)].into_iter().collect());
    assert_eq!(report.remained_skipped.len(), 2);
}

#[test]
fn interface_change_cascades_to_dependent_second_wave() {
    let project = Project::new();
    project.touch_all_outputs();

    let b_time = set_mtime(&project.paths[1], SystemTime::now());
    let c_time = set_mtime(&project.paths[2], SystemTime::now());

    let mut record = BuildRecord::new("5.9", Timestamp::EPOCH);
    record.inputs.insert(
        project.paths[0].display().to_string(),
        InputInfo { status: InputStatus::UpToDate, previous_mod_time: Timestamp::EPOCH },
    );
    record.inputs.insert(project.paths[1].display().to_string(), InputInfo { status: InputStatus::UpToDate, previous_mod_time: b_time });
    record.inputs.insert(project.paths[2].display().to_string(), InputInfo { status: InputStatus::UpToDate, previous_mod_time: c_time });

    let prior = [
        project.write_prior_artifact(0, &leaf_graph("a.swift", "a-v1", "Foo", "foo-v1")),
        project.write_prior_artifact(1, &dependent_graph("b.swift", "b-v1", "Foo")),
        project.write_prior_artifact(2, &leaf_graph("c.swift", "c-v1", "Bar", "bar-v1")),
    ];
    let inputs = project.inputs([Some(&prior[0]), Some(&prior[1]), Some(&prior[2])]);

    // A is touched (its own mtime no longer matches EPOCH) and its
    // `Foo` fingerprint genuinely changes on recompile.
    let new_a_graph = leaf_graph("a.swift", "a-v2", "Foo", "foo-v2");
    let compiler = Arc::new(FakeCompiler {
        graphs: HashMap::from([
            (FileId(0), new_a_graph),
            (FileId(1), dependent_graph("b.swift", "b-v1", "Foo")),
        ]),
        swift_deps: HashMap::from([(FileId(0), project.swift_deps[0].clone()), (FileId(1), project.swift_deps[1].clone())]),
        objects: HashMap::from([(FileId(0), project.objects[0].clone()), (FileId(1), project.objects[1].clone())]),
    });

    let report = driver()
        .compile(inputs, &SimpleDriverOptions::new(), &project.output_file_map(), Some(record), compiler)
        .unwrap();

    assert!(report.succeeded_files.contains(&FileId(0)));
    assert!(report.succeeded_files.contains(&FileId(1)), "B must be promoted into the second wave once A's interface fingerprint changes");
    assert!(!report.succeeded_files.contains(&FileId(2)));
    assert_eq!(report.remained_skipped, vec![FileId(2)]);
}

#[test]
fn stale_external_dependency_schedules_its_consumer() {
    let project = Project::new();
    project.touch_all_outputs();

    let dir = tempfile::tempdir().unwrap();
    let external_path = dir.path().join("External.framework");
    write_file(&external_path, "external");
    let external_path_str = external_path.display().to_string();

    let build_time = set_mtime(&project.paths[0], SystemTime::now() - Duration::from_secs(3600));
    // external file refreshed after the prior build started.
    let _ = set_mtime(&external_path, SystemTime::now());

    let a_time = RealFileSystem.modified(&project.paths[0]).unwrap();
    let b_time = set_mtime(&project.paths[1], SystemTime::now() - Duration::from_secs(3600));
    let c_time = set_mtime(&project.paths[2], SystemTime::now() - Duration::from_secs(3600));

    let mut record = BuildRecord::new("5.9", build_time);
    record.inputs.insert(project.paths[0].display().to_string(), InputInfo { status: InputStatus::UpToDate, previous_mod_time: a_time });
    record.inputs.insert(project.paths[1].display().to_string(), InputInfo { status: InputStatus::UpToDate, previous_mod_time: b_time });
    record.inputs.insert(project.paths[2].display().to_string(), InputInfo { status: InputStatus::UpToDate, previous_mod_time: c_time });

    let prior = [
        project.write_prior_artifact(0, &leaf_graph("a.swift", "a-v1", "Foo", "foo-v1")),
        project.write_prior_artifact(1, &external_consumer_graph("b.swift", "b-v1", &external_path_str)),
        project.write_prior_artifact(2, &leaf_graph("c.swift", "c-v1", "Bar", "bar-v1")),
    ];
    let inputs = project.inputs([Some(&prior[0]), Some(&prior[1]), Some(&prior[2])]);

    let compiler = Arc::new(FakeCompiler {
        graphs: HashMap::from([(FileId(1), external_consumer_graph("b.swift", "b-v1", &external_path_str))]),
        swift_deps: HashMap::from([(FileId(1), project.swift_deps[1].clone())]),
        objects: HashMap::from([(FileId(1), project.objects[1].clone())]),
    });

    let report = driver()
        .compile(inputs, &SimpleDriverOptions::new(), &project.output_file_map(), Some(record), compiler)
        .unwrap();

    assert_eq!(report.succeeded_files, [FileId(1)].into_iter().collect());
    assert!(!report.succeeded_files.contains(&FileId(0)));
    assert!(!report.succeeded_files.contains(&FileId(2)));
}

#[test]
fn args_hash_mismatch_forces_full_rebuild() {
    let project = Project::new();
    project.touch_all_outputs();
    let now = SystemTime::now();
    let mtimes: Vec<Timestamp> = project.paths.iter().map(|p| set_mtime(p, now)).collect();

    let mut record = BuildRecord::new("5.9", Timestamp::EPOCH);
    record.args_hash = Some("old-hash".into());
    for (path, mtime) in project.paths.iter().zip(&mtimes) {
        record.inputs.insert(path.display().to_string(), InputInfo { status: InputStatus::UpToDate, previous_mod_time: *mtime });
    }

    let prior = [
        project.write_prior_artifact(0, &leaf_graph("a.swift", "a-v1", "Foo", "foo-v1")),
        project.write_prior_artifact(1, &dependent_graph("b.swift", "b-v1", "Foo")),
        project.write_prior_artifact(2, &leaf_graph("c.swift", "c-v1", "Bar", "bar-v1")),
    ];
    let inputs = project.inputs([Some(&prior[0]), Some(&prior[1]), Some(&prior[2])]);

    let compiler = Arc::new(FakeCompiler {
        graphs: HashMap::from([
            (FileId(0), leaf_graph("a.swift", "a-v1", "Foo", "foo-v1")),
            (FileId(1), dependent_graph("b.swift", "b-v1", "Foo")),
            (FileId(2), leaf_graph("c.swift", "c-v1", "Bar", "bar-v1")),
        ]),
        swift_deps: HashMap::from([
            (FileId(0), project.swift_deps[0].clone()),
            (FileId(1), project.swift_deps[1].clone()),
            (FileId(2), project.swift_deps[2].clone()),
        ]),
        objects: HashMap::from([
            (FileId(0), project.objects[0].clone()),
            (FileId(1), project.objects[1].clone()),
            (FileId(2), project.objects[2].clone()),
        ]),
    });

    // A different incremental-affecting flag than whatever produced
    // "old-hash" (an empty options table hashes to something else).
    let driver_options = SimpleDriverOptions::new().with_spelling(swift_driver_incremental::config::OptionSpelling {
        option: "-enable-experimental-feature".into(),
        spelling: "-enable-experimental-feature Foo".into(),
        affects_incremental_build: true,
        kind: "flag".into(),
    });

    let report = driver().compile(inputs, &driver_options, &project.output_file_map(), Some(record), compiler).unwrap();

    assert_eq!(report.succeeded.len(), 3, "an args-hash mismatch must disable incremental mode and recompile everything");
}
