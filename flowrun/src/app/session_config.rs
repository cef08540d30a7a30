// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::app::errors::{AppResult, invalid_argument, local_error};
use crate::app::services::paths::{join_normalized, relative_to};

pub const DEFAULT_PATTERN: &str = "*.tif";
pub const DEFAULT_OUTPUT_ROOT: &str = "compensated_outputs";
pub const DEFAULT_FINAL_RESULTS: &str = "final_results";

/// `flow_options` is either a path to an options file or an inline mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowOptions {
    Path(String),
    Inline(Mapping),
}

/// Session configuration consumed by the registration pipeline.
///
/// Only the path-valued fields are modelled; every other key is carried
/// through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub root: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_output_root")]
    pub output_root: String,
    #[serde(default = "default_final_results")]
    pub final_results: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_options: Option<FlowOptions>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_output_root() -> String {
    DEFAULT_OUTPUT_ROOT.to_string()
}

fn default_final_results() -> String {
    DEFAULT_FINAL_RESULTS.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Directory,
    File,
    Glob,
    FlowOptions,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Directory => "directory",
            FieldKind::File => "file",
            FieldKind::Glob => "glob",
            FieldKind::FlowOptions => "flow_options",
        }
    }
}

/// Static description of one editable config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: Option<&'static str>,
    pub optional: bool,
    /// Rewritten through the path mappings before upload.
    pub remote_mapped: bool,
}

const SESSION_FIELDS: [FieldDescriptor; 6] = [
    FieldDescriptor {
        name: "root",
        kind: FieldKind::Directory,
        default: None,
        optional: false,
        remote_mapped: true,
    },
    FieldDescriptor {
        name: "pattern",
        kind: FieldKind::Glob,
        default: Some(DEFAULT_PATTERN),
        optional: false,
        remote_mapped: false,
    },
    FieldDescriptor {
        name: "output_root",
        kind: FieldKind::Directory,
        default: Some(DEFAULT_OUTPUT_ROOT),
        optional: false,
        remote_mapped: true,
    },
    FieldDescriptor {
        name: "final_results",
        kind: FieldKind::Directory,
        default: Some(DEFAULT_FINAL_RESULTS),
        optional: false,
        remote_mapped: true,
    },
    FieldDescriptor {
        name: "center",
        kind: FieldKind::File,
        default: None,
        optional: true,
        remote_mapped: true,
    },
    FieldDescriptor {
        name: "flow_options",
        kind: FieldKind::FlowOptions,
        default: None,
        optional: true,
        remote_mapped: true,
    },
];

/// Output locations with relative entries resolved against the input root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputPaths {
    pub output_root: PathBuf,
    pub final_results: PathBuf,
}

impl SessionConfig {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            pattern: default_pattern(),
            output_root: default_output_root(),
            final_results: default_final_results(),
            center: None,
            flow_options: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn field_descriptors() -> &'static [FieldDescriptor] {
        &SESSION_FIELDS
    }

    /// Applies `f` to `root` and every path that depends on it. Empty values
    /// and inline flow options are left alone.
    pub fn map_paths(&mut self, mut f: impl FnMut(&str) -> String) {
        if !self.root.is_empty() {
            self.root = f(&self.root);
        }
        self.map_dependent_paths(f);
    }

    fn map_dependent_paths(&mut self, mut f: impl FnMut(&str) -> String) {
        for value in [&mut self.output_root, &mut self.final_results] {
            if !value.is_empty() {
                *value = f(value);
            }
        }
        if let Some(center) = self.center.as_mut().filter(|v| !v.is_empty()) {
            *center = f(center);
        }
        if let Some(FlowOptions::Path(path)) = self.flow_options.as_mut() {
            if !path.is_empty() {
                *path = f(path);
            }
        }
    }

    pub fn resolve_output_paths(&self) -> ResolvedOutputPaths {
        ResolvedOutputPaths {
            output_root: join_normalized(&self.root, &self.output_root),
            final_results: join_normalized(&self.root, &self.final_results),
        }
    }

    pub fn from_value(value: Value) -> AppResult<Self> {
        let config: SessionConfig = serde_yaml::from_value(value)
            .map_err(|err| invalid_argument(format!("invalid session config: {err}")))?;
        if config.root.trim().is_empty() {
            return Err(invalid_argument("session config `root` must not be empty"));
        }
        Ok(config)
    }
}

/// Loads a YAML session config. A relative `root` is resolved against the
/// config file's directory; other relative paths are resolved against `root`.
pub fn load(path: &Path) -> AppResult<SessionConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| local_error(format!("failed to read {}: {err}", path.display())))?;
    let value: Value = serde_yaml::from_str(&contents)
        .map_err(|err| invalid_argument(format!("failed to parse {}: {err}", path.display())))?;
    let mut config = SessionConfig::from_value(value)?;

    let config_dir = path.parent().unwrap_or_else(|| Path::new(""));
    config.root = path_string(join_normalized(config_dir, &config.root));
    let root = PathBuf::from(&config.root);
    config.map_dependent_paths(|value| path_string(join_normalized(&root, value)));
    Ok(config)
}

/// Renders the YAML that `save` writes. With `prefer_relative`, paths under
/// `root` are stored relative to it; `root` itself is kept as is.
pub fn render_yaml(config: &SessionConfig, prefer_relative: bool) -> AppResult<String> {
    let mut out = config.clone();
    if prefer_relative {
        let root = PathBuf::from(&config.root);
        out.map_dependent_paths(|value| relativize(value, &root));
    }
    serde_yaml::to_string(&out)
        .map_err(|err| local_error(format!("failed to serialize session config: {err}")))
}

pub fn save(config: &SessionConfig, path: &Path, prefer_relative: bool) -> AppResult<()> {
    let yaml = render_yaml(config, prefer_relative)?;
    std::fs::write(path, yaml)
        .map_err(|err| local_error(format!("failed to write {}: {err}", path.display())))
}

fn relativize(value: &str, base: &Path) -> String {
    let path = Path::new(value);
    if !path.is_absolute() {
        return value.to_string();
    }
    match relative_to(path, base) {
        Some(rel) => path_string(rel),
        None => value.to_string(),
    }
}

fn path_string(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}
