//! Decides whether an invocation can attempt incremental compilation
//! at all, and if so computes the first-wave mandatory/skipped input
//! sets (§4.6).

use crate::{
    build_record::{BuildRecord, InputStatus},
    config::OutputFileMap,
    dep_key::Aspect,
    fs::{FileId, FileSystem, Timestamp},
    module_graph::ModuleGraph,
    tracer::{owning_files, Tracer},
};
use std::{collections::HashSet, path::Path};

/// The compilation mode the driver was invoked in. Incremental mode is
/// only legal for `Normal` (per-file) compiles (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerMode {
    Normal,
    SingleCompile,
    Pcm,
}

/// Everything `IncrementalState::evaluate` needs to know about one
/// input, beyond what's already in the `ModuleGraph`.
pub struct InputContext<'a> {
    pub file: FileId,
    pub path: &'a Path,
    pub declared_outputs: &'a [std::path::PathBuf],
    pub dep_file_malformed: bool,
}

/// Flags that gate whether incremental mode is even attempted.
pub struct IncrementalRequest {
    pub incremental_requested: bool,
    pub mode: CompilerMode,
    pub embed_bitcode: bool,
    pub has_output_file_map: bool,
    pub always_rebuild_dependents: bool,
}

/// Outcome of the first-wave computation (§4.6 steps 1-7).
#[derive(Debug, Default)]
pub struct WaveSelection {
    pub mandatory: HashSet<FileId>,
    pub skipped: HashSet<FileId>,
}

/// Short-circuits to "not incremental" per the conditions named in
/// §4.6, before any per-input work happens.
pub fn not_incremental_reason(
    request: &IncrementalRequest,
    master_swift_deps_present: bool,
    build_record: Option<&BuildRecord>,
    mismatch: Option<&str>,
) -> Option<String> {
    if !request.incremental_requested {
        return Some("incremental compilation was not requested".into());
    }
    if request.mode != CompilerMode::Normal {
        return Some("incremental compilation requires per-file compile mode".into());
    }
    if request.embed_bitcode {
        return Some("bitcode embedding is incompatible with incremental compilation".into());
    }
    if !request.has_output_file_map {
        return Some("no output file map was provided".into());
    }
    if !master_swift_deps_present {
        return Some("no master swiftDeps entry exists".into());
    }
    if build_record.is_none() {
        return Some("no prior build record".into());
    }
    if let Some(reason) = mismatch {
        return Some(reason.to_string());
    }
    None
}

/// Classifies one input's previous status against its current
/// modification time, per step 1 of §4.6.
fn classify_changed(current: Timestamp, previous_status: InputStatus, previous_time: Timestamp) -> Option<bool> {
    // Returns Some(should_cascade) if the input must be scheduled, None if
    // it may be skipped.
    let times_match = current == previous_time;
    match previous_status {
        InputStatus::UpToDate => {
            if times_match {
                None
            } else {
                Some(false)
            }
        }
        InputStatus::NewlyAdded => Some(false),
        InputStatus::NeedsCascadingBuild => Some(true),
        InputStatus::NeedsNonCascadingBuild => Some(false),
    }
}

/// Computes the first-wave mandatory/skipped sets (`compute_skipped_inputs`, §4.6).
#[allow(clippy::too_many_arguments)]
pub fn compute_skipped_inputs(
    graph: &mut ModuleGraph,
    fs: &dyn FileSystem,
    output_file_map: &dyn OutputFileMap,
    build_record: &BuildRecord,
    all_inputs: &[InputContext<'_>],
    always_rebuild_dependents: bool,
) -> WaveSelection {
    let mut definitely_required: HashSet<FileId> = HashSet::new();
    let mut cascading: HashSet<FileId> = HashSet::new();

    // Step 1: changed inputs.
    for ctx in all_inputs {
        let path_key = ctx.path.display().to_string();
        let current_mtime = fs.modified(ctx.path).unwrap_or(Timestamp::EPOCH);

        let decision = match build_record.inputs.get(&path_key) {
            None => Some(false), // newly_added: not in the prior record at all.
            Some(info) => classify_changed(current_mtime, info.status, info.previous_mod_time),
        };

        if let Some(cascade) = decision {
            definitely_required.insert(ctx.file);
            if cascade {
                cascading.insert(ctx.file);
            }
        }
    }

    // Step 2: externally-dependent inputs.
    let stale_externals: Vec<String> = graph
        .external_dependencies()
        .iter()
        .filter(|filename| {
            let path = Path::new(filename.as_str());
            fs.modified(path).map(|mtime| mtime >= build_record.build_time).unwrap_or(true)
        })
        .cloned()
        .collect();

    for filename in stale_externals {
        let key = crate::dep_key::DependencyKey::external_depend(filename);
        for use_handle in graph.uses_of(&key).collect::<Vec<_>>() {
            if graph.is_traced(use_handle) {
                continue;
            }
            let mut tracer = Tracer::new(false);
            let visited = tracer.trace(graph, [use_handle]);
            for file in owning_files(graph, &visited) {
                definitely_required.insert(file);
            }
        }
    }

    // Step 3: inputs missing declared outputs.
    for ctx in all_inputs {
        let missing = ctx.declared_outputs.iter().any(|p| !fs.exists(p))
            || output_file_map.swift_deps_for(ctx.file).map(|p| !fs.exists(&p)).unwrap_or(true);
        if missing {
            definitely_required.insert(ctx.file);
        }
    }

    // Step 4: malformed prior dep files.
    for ctx in all_inputs {
        if ctx.dep_file_malformed {
            definitely_required.insert(ctx.file);
        }
    }

    // Step 6: speculative cascade set.
    let mut speculative: HashSet<FileId> = HashSet::new();
    for ctx in all_inputs {
        if !definitely_required.contains(&ctx.file) {
            continue;
        }
        if !(cascading.contains(&ctx.file) || always_rebuild_dependents) {
            continue;
        }
        let path_key = ctx.path.display().to_string();
        let interface_key = crate::dep_key::DependencyKey::source_file_provide(Aspect::Interface, path_key);
        if let Some(handle) = graph.find_handle(Some(ctx.file), &interface_key) {
            let mut tracer = Tracer::new(false);
            let visited = tracer.trace(graph, [handle]);
            for file in owning_files(graph, &visited) {
                if !definitely_required.contains(&file) {
                    speculative.insert(file);
                }
            }
        }
    }

    let mandatory: HashSet<FileId> = definitely_required.union(&speculative).copied().collect();
    let skipped: HashSet<FileId> =
        all_inputs.iter().map(|ctx| ctx.file).filter(|f| !mandatory.contains(f)).collect();

    WaveSelection { mandatory, skipped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        build_record::InputInfo,
        config::{JsonOutputFileMap, OutputType},
    };
    use std::collections::HashMap;

    struct FakeFs {
        mtimes: HashMap<std::path::PathBuf, Timestamp>,
        existing: HashSet<std::path::PathBuf>,
    }

    impl FileSystem for FakeFs {
        fn exists(&self, path: &Path) -> bool {
            self.existing.contains(path)
        }
        fn modified(&self, path: &Path) -> crate::error::Result<Timestamp> {
            Ok(*self.mtimes.get(path).unwrap_or(&Timestamp::EPOCH))
        }
        fn read_to_string(&self, _path: &Path) -> crate::error::Result<String> {
            unimplemented!()
        }
        fn read(&self, _path: &Path) -> crate::error::Result<Vec<u8>> {
            unimplemented!()
        }
        fn write(&self, _path: &Path, _contents: &[u8]) -> crate::error::Result<()> {
            unimplemented!()
        }
    }

    #[test]
    fn unchanged_input_with_up_to_date_status_is_skipped() {
        let mut graph = ModuleGraph::new();
        let mut record = BuildRecord::new("1.0", Timestamp::EPOCH);
        record.inputs.insert(
            "a.swift".into(),
            InputInfo { status: InputStatus::UpToDate, previous_mod_time: Timestamp { seconds: 5, nanos: 0 } },
        );

        let fs = FakeFs {
            mtimes: (HashMap::from([(std::path::PathBuf::from("a.swift"), Timestamp { seconds: 5, nanos: 0 })])),
            existing: (HashSet::from([
                std::path::PathBuf::from("out/a.o"),
                std::path::PathBuf::from("out/a.swiftdeps"),
            ])),
        };
        let mut map = JsonOutputFileMap::new();
        map.insert(FileId(0), OutputType::SwiftDeps, "out/a.swiftdeps");

        let ctx = InputContext {
            file: FileId(0),
            path: Path::new("a.swift"),
            declared_outputs: &[std::path::PathBuf::from("out/a.o")],
            dep_file_malformed: false,
        };

        let selection = compute_skipped_inputs(&mut graph, &fs, &map, &record, &[ctx], false);
        assert!(selection.skipped.contains(&FileId(0)));
        assert!(!selection.mandatory.contains(&FileId(0)));
    }

    #[test]
    fn changed_mtime_forces_scheduling() {
        let mut graph = ModuleGraph::new();
        let mut record = BuildRecord::new("1.0", Timestamp::EPOCH);
        record.inputs.insert(
            "a.swift".into(),
            InputInfo { status: InputStatus::UpToDate, previous_mod_time: Timestamp { seconds: 5, nanos: 0 } },
        );

        let fs = FakeFs {
            mtimes: (HashMap::from([(std::path::PathBuf::from("a.swift"), Timestamp { seconds: 6, nanos: 0 })])),
            existing: (HashSet::from([
                std::path::PathBuf::from("out/a.o"),
                std::path::PathBuf::from("out/a.swiftdeps"),
            ])),
        };
        let mut map = JsonOutputFileMap::new();
        map.insert(FileId(0), OutputType::SwiftDeps, "out/a.swiftdeps");

        let ctx = InputContext {
            file: FileId(0),
            path: Path::new("a.swift"),
            declared_outputs: &[std::path::PathBuf::from("out/a.o")],
            dep_file_malformed: false,
        };

        let selection = compute_skipped_inputs(&mut graph, &fs, &map, &record, &[ctx], false);
        assert!(selection.mandatory.contains(&FileId(0)));
    }

    #[test]
    fn not_incremental_when_no_output_file_map() {
        let request = IncrementalRequest {
            incremental_requested: true,
            mode: CompilerMode::Normal,
            embed_bitcode: false,
            has_output_file_map: false,
            always_rebuild_dependents: false,
        };
        let reason = not_incremental_reason(&request, true, None, None);
        assert!(reason.unwrap().contains("output file map"));
    }
}
