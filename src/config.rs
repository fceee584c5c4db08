//! The two file interfaces the incremental core consumes from the
//! (out-of-scope) option table and output planner (§6): parsed
//! command-line options, and the input→output path map.
//!
//! No flag *parsing* lives here — only the boolean/enum surface an
//! option table would expose, plus minimal concrete implementations
//! sufficient to drive the scheduler end-to-end in tests.

use crate::{
    error::{Error, Result},
    fs::FileId,
};
use std::{collections::HashMap, path::Path};

/// The kind of output an [`OutputFileMap`] entry can name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputType {
    Object,
    /// The per-file dependency artifact read by [`crate::per_file_graph`].
    SwiftDeps,
    Diagnostics,
    Other(String),
}

impl OutputType {
    /// The key this output type is filed under in the on-disk JSON
    /// output-file-map (§6): `{"<input>": {"object": ..., "swiftdeps":
    /// ..., ...}}`.
    fn json_key(&self) -> &str {
        match self {
            OutputType::Object => "object",
            OutputType::SwiftDeps => "swiftdeps",
            OutputType::Diagnostics => "diagnostics",
            OutputType::Other(key) => key,
        }
    }

    fn from_json_key(key: &str) -> Self {
        match key {
            "object" => OutputType::Object,
            "swiftdeps" => OutputType::SwiftDeps,
            "diagnostics" => OutputType::Diagnostics,
            other => OutputType::Other(other.to_string()),
        }
    }
}

/// Given `(input, output_type)`, returns an existing output path or
/// `None`. Must always provide the master `swiftDeps` entry for
/// incremental mode to be legal (§6).
pub trait OutputFileMap: Send + Sync {
    fn output_for(&self, input: FileId, output_type: &OutputType) -> Option<std::path::PathBuf>;

    fn swift_deps_for(&self, input: FileId) -> Option<std::path::PathBuf> {
        self.output_for(input, &OutputType::SwiftDeps)
    }
}

/// A minimal `OutputFileMap` backed by a plain table, the way the
/// teacher ships a default `ConfigurableArtifacts` alongside the
/// `ArtifactOutput` trait it defines.
#[derive(Debug, Default, Clone)]
pub struct JsonOutputFileMap {
    entries: HashMap<(FileId, OutputType), std::path::PathBuf>,
}

impl JsonOutputFileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, input: FileId, output_type: OutputType, path: impl Into<std::path::PathBuf>) {
        self.entries.insert((input, output_type), path.into());
    }

    /// Parses the on-disk JSON output-file-map (§6): a top-level object
    /// keyed by input path, each value an object of output-type to
    /// output-path. Input paths are resolved to [`FileId`]s through
    /// `resolve`; entries for inputs the driver wasn't given (and
    /// therefore has no `FileId` for) are skipped rather than treated
    /// as an error, since the on-disk map commonly outlives the input
    /// set it was generated for.
    pub fn from_json(json: &str, resolve: impl Fn(&Path) -> Option<FileId>) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let top = value.as_object().ok_or_else(|| Error::Message("output file map must be a JSON object".into()))?;

        let mut map = Self::new();
        for (input_path, outputs) in top {
            let Some(file) = resolve(Path::new(input_path)) else { continue };
            let Some(outputs) = outputs.as_object() else {
                return Err(Error::Message(format!("entry for {input_path} must be a JSON object")));
            };
            for (kind, path) in outputs {
                let Some(path) = path.as_str() else {
                    return Err(Error::Message(format!("output path for {input_path}/{kind} must be a string")));
                };
                map.insert(file, OutputType::from_json_key(kind), path);
            }
        }
        Ok(map)
    }

    /// Serializes back to the on-disk JSON shape, given a way to render
    /// each `FileId` back to its path.
    pub fn to_json(&self, path_of: impl Fn(FileId) -> std::path::PathBuf) -> Result<String> {
        let mut top = serde_json::Map::new();
        for ((file, output_type), path) in &self.entries {
            let input_path = path_of(*file).display().to_string();
            let entry = top.entry(input_path).or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            entry
                .as_object_mut()
                .expect("entries are only ever inserted as objects")
                .insert(output_type.json_key().to_string(), serde_json::Value::String(path.display().to_string()));
        }
        Ok(serde_json::to_string_pretty(&serde_json::Value::Object(top))?)
    }
}

impl OutputFileMap for JsonOutputFileMap {
    fn output_for(&self, input: FileId, output_type: &OutputType) -> Option<std::path::PathBuf> {
        self.entries.get(&(input, output_type.clone())).cloned()
    }
}

/// Whether an option's spelling affects the incremental output hash
/// (the args-hash computation excludes the input list itself, §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpelling {
    pub option: String,
    pub spelling: String,
    pub affects_incremental_build: bool,
    pub kind: String,
}

/// The parsed-options capability (§6): membership/argument queries
/// plus an iterator of spellings for args-hash computation.
pub trait DriverOptions: Send + Sync {
    fn contains(&self, option: &str) -> bool;
    fn has_argument(&self, option: &str) -> bool;
    fn spellings(&self) -> Vec<OptionSpelling>;

    /// Stable hash of the sorted spellings of flags that affect
    /// incremental output, excluding the input list (§3). Persisted in
    /// the build record and compared across invocations, so it is
    /// computed with a real digest rather than the process-local
    /// `DefaultHasher`.
    fn args_hash(&self) -> String {
        let mut spellings: Vec<String> = self
            .spellings()
            .into_iter()
            .filter(|s| s.affects_incremental_build)
            .map(|s| format!("{}={}", s.option, s.spelling))
            .collect();
        spellings.sort();

        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for spelling in &spellings {
            hasher.update(spelling.as_bytes());
            hasher.update(b"\0");
        }
        hasher.finalize().iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

/// A minimal `DriverOptions` backed by a plain table.
#[derive(Debug, Default, Clone)]
pub struct SimpleDriverOptions {
    options: HashMap<String, Option<String>>,
    spellings: Vec<OptionSpelling>,
}

impl SimpleDriverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, option: impl Into<String>, argument: Option<String>) {
        self.options.insert(option.into(), argument);
    }

    pub fn with_spelling(mut self, spelling: OptionSpelling) -> Self {
        self.spellings.push(spelling);
        self
    }
}

impl DriverOptions for SimpleDriverOptions {
    fn contains(&self, option: &str) -> bool {
        self.options.contains_key(option)
    }

    fn has_argument(&self, option: &str) -> bool {
        matches!(self.options.get(option), Some(Some(_)))
    }

    fn spellings(&self) -> Vec<OptionSpelling> {
        self.spellings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn args_hash_ignores_non_incremental_flags() {
        let opts = SimpleDriverOptions::new()
            .with_spelling(OptionSpelling {
                option: "-O".into(),
                spelling: "-O".into(),
                affects_incremental_build: true,
                kind: "flag".into(),
            })
            .with_spelling(OptionSpelling {
                option: "-v".into(),
                spelling: "-v".into(),
                affects_incremental_build: false,
                kind: "flag".into(),
            });
        let other = SimpleDriverOptions::new().with_spelling(OptionSpelling {
            option: "-O".into(),
            spelling: "-O".into(),
            affects_incremental_build: true,
            kind: "flag".into(),
        });
        assert_eq!(opts.args_hash(), other.args_hash());
    }

    #[test]
    fn output_file_map_requires_explicit_swift_deps_entry() {
        let mut map = JsonOutputFileMap::new();
        assert!(map.swift_deps_for(FileId(0)).is_none());
        map.insert(FileId(0), OutputType::SwiftDeps, "/tmp/a.swiftdeps");
        assert!(map.swift_deps_for(FileId(0)).is_some());
    }

    #[test]
    fn json_output_file_map_round_trips_through_text() {
        let json = r#"{
            "/src/A.swift": {
                "object": "/build/A.o",
                "swiftdeps": "/build/A.swiftdeps"
            },
            "/src/unrelated.swift": {
                "object": "/build/unrelated.o"
            }
        }"#;
        let a = FileId(0);
        let map = JsonOutputFileMap::from_json(json, |p| {
            (p == Path::new("/src/A.swift")).then_some(a)
        })
        .unwrap();
        assert_eq!(map.output_for(a, &OutputType::Object), Some(PathBuf::from("/build/A.o")));
        assert_eq!(map.swift_deps_for(a), Some(PathBuf::from("/build/A.swiftdeps")));

        let rendered = map.to_json(|id| if id == a { PathBuf::from("/src/A.swift") } else { unreachable!() }).unwrap();
        let reparsed = JsonOutputFileMap::from_json(&rendered, |p| {
            (p == Path::new("/src/A.swift")).then_some(a)
        })
        .unwrap();
        assert_eq!(reparsed.output_for(a, &OutputType::Object), map.output_for(a, &OutputType::Object));
    }
}
