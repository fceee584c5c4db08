//! The persisted record of the previous invocation's inputs, arguments,
//! and compiler version (§4.5): a keyed text document with exactly four
//! top-level fields, serialized with `serde_yaml`.
//!
//! Each input's value is its previous `[seconds, nanos]` modification
//! time tagged with `!dirty`, `!private`, or left untagged for
//! `up_to_date` — the tag on the sequence node carries the status, it
//! is not a separate struct field, so the (de)serialization goes
//! through `serde_yaml::Value` rather than `#[derive]`.

use crate::{
    error::{Error, Result},
    fs::Timestamp,
};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Status of one previously recorded input (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    UpToDate,
    NeedsCascadingBuild,
    NeedsNonCascadingBuild,
    NewlyAdded,
}

impl InputStatus {
    /// The writer collapses `needs_cascading_build` and `newly_added`
    /// to the same `!dirty` tag (§4.5) — both mean "must run".
    fn tag(&self) -> Option<&'static str> {
        match self {
            InputStatus::UpToDate => None,
            InputStatus::NeedsCascadingBuild | InputStatus::NewlyAdded => Some("!dirty"),
            InputStatus::NeedsNonCascadingBuild => Some("!private"),
        }
    }

    fn from_tag(tag: Option<&str>) -> Result<Self> {
        match tag {
            None => Ok(InputStatus::UpToDate),
            Some("!dirty") => Ok(InputStatus::NeedsCascadingBuild),
            Some("!private") => Ok(InputStatus::NeedsNonCascadingBuild),
            Some(other) => Err(Error::msg(format!("unrecognized input tag {other}"))),
        }
    }
}

/// `{status, previous_mod_time}` for one input (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputInfo {
    pub status: InputStatus,
    pub previous_mod_time: Timestamp,
}

/// The persisted record itself (§3/§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub compiler_version: String,
    pub args_hash: Option<String>,
    pub build_time: Timestamp,
    pub inputs: BTreeMap<String, InputInfo>,
    /// Open Question #2: a record missing `args_hash` is treated as
    /// matching unless this is set. Defaults to `false`.
    pub strict_args_hash: bool,
}

fn timestamp_to_value(ts: Timestamp) -> Value {
    Value::Sequence(vec![Value::Number(ts.seconds.into()), Value::Number(ts.nanos.into())])
}

fn value_to_timestamp(value: &Value) -> Result<Timestamp> {
    let seq = value.as_sequence().ok_or_else(|| Error::msg("expected a two-element time tuple"))?;
    if seq.len() != 2 {
        return Err(Error::msg("time tuple must have exactly two elements"));
    }
    let seconds = seq[0].as_i64().ok_or_else(|| Error::msg("time tuple seconds must be an integer"))?;
    let nanos = seq[1].as_u64().ok_or_else(|| Error::msg("time tuple nanos must be an integer"))? as u32;
    Ok(Timestamp { seconds, nanos })
}

fn tag_of(value: &Value) -> Option<String> {
    match value {
        Value::Tagged(tagged) => Some(format!("!{}", tagged.tag.to_string().trim_start_matches('!'))),
        _ => None,
    }
}

fn untagged(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => &tagged.value,
        other => other,
    }
}

impl BuildRecord {
    pub fn new(compiler_version: impl Into<String>, build_time: Timestamp) -> Self {
        Self {
            compiler_version: compiler_version.into(),
            args_hash: None,
            build_time,
            inputs: BTreeMap::new(),
            strict_args_hash: false,
        }
    }

    /// Parses a build record from its YAML text form.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(text)?;
        let mapping = root.as_mapping().ok_or_else(|| Error::msg("build record root must be a mapping"))?;

        const RECOGNIZED: &[&str] = &["version", "options", "build_time", "inputs"];
        for key in mapping.keys() {
            let key = key.as_str().unwrap_or_default();
            if !RECOGNIZED.contains(&key) {
                return Err(Error::msg(format!("unexpected_section: {key}")));
            }
        }

        let version = mapping
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::msg("build record missing required field: version"))?
            .to_string();

        let args_hash = mapping.get("options").and_then(Value::as_str).map(str::to_string);

        let build_time_value =
            mapping.get("build_time").ok_or_else(|| Error::msg("build record missing required field: build_time"))?;
        let build_time = value_to_timestamp(build_time_value)?;

        let inputs_value = mapping.get("inputs").ok_or_else(|| Error::msg("build record missing required field: inputs"))?;
        let inputs_mapping = inputs_value.as_mapping().ok_or_else(|| Error::msg("inputs must be a mapping"))?;

        let mut inputs = BTreeMap::new();
        for (path_value, entry_value) in inputs_mapping {
            let path = path_value
                .as_str()
                .ok_or_else(|| Error::msg("input key must be a string path"))?
                .to_string();
            let tag = tag_of(entry_value);
            let status = InputStatus::from_tag(tag.as_deref())?;
            let previous_mod_time = value_to_timestamp(untagged(entry_value))?;
            inputs.insert(path, InputInfo { status, previous_mod_time });
        }

        Ok(Self { compiler_version: version, args_hash, build_time, inputs, strict_args_hash: false })
    }

    /// Serializes the record to its YAML text form. Inputs are sorted
    /// by path string (§6).
    pub fn to_yaml_string(&self) -> Result<String> {
        let mut root = serde_yaml::Mapping::new();
        root.insert(Value::String("version".into()), Value::String(self.compiler_version.clone()));
        if let Some(hash) = &self.args_hash {
            root.insert(Value::String("options".into()), Value::String(hash.clone()));
        }
        root.insert(Value::String("build_time".into()), timestamp_to_value(self.build_time));

        let mut inputs = serde_yaml::Mapping::new();
        for (path, info) in &self.inputs {
            let time_value = timestamp_to_value(info.previous_mod_time);
            let value = match info.status.tag() {
                Some(tag) => Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                    tag: serde_yaml::value::Tag::new(tag.trim_start_matches('!')),
                    value: time_value,
                })),
                None => time_value,
            };
            inputs.insert(Value::String(path.clone()), value);
        }
        root.insert(Value::String("inputs".into()), Value::Mapping(inputs));

        serde_yaml::to_string(&Value::Mapping(root)).map_err(Error::from)
    }

    /// A human-readable explanation of why this record no longer
    /// matches the current invocation, or `None` if it still applies
    /// (§4.5).
    pub fn mismatch_reason(&self, current_version: &str, current_args_hash: Option<&str>, current_inputs: &[String]) -> Option<String> {
        if self.compiler_version != current_version {
            return Some(format!(
                "compiler version has changed from {} to {current_version}",
                self.compiler_version
            ));
        }
        match (&self.args_hash, current_args_hash) {
            (Some(prev), Some(cur)) if prev != cur => return Some("different arguments".to_string()),
            (Some(_), None) if self.strict_args_hash => return Some("different arguments".to_string()),
            _ => {}
        }
        let current: std::collections::HashSet<&str> = current_inputs.iter().map(String::as_str).collect();
        let missing: Vec<&str> = self.inputs.keys().filter(|p| !current.contains(p.as_str())).map(String::as_str).collect();
        if !missing.is_empty() {
            return Some(format!("inputs used previously but not now: {}", missing.join(", ")));
        }
        None
    }
}
