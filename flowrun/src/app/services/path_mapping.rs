// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::session_config::SessionConfig;
use crate::app::types::PathMapping;

/// Translates a local path into the remote namespace using the longest
/// matching `local_prefix`. Paths outside every prefix are returned as is.
///
/// A prefix matches when it equals the path or is followed by `/` or `\`.
/// Among prefixes of equal length the first one declared wins.
pub fn map_path(path: &str, mappings: &[PathMapping]) -> String {
    let mut best: Option<(&PathMapping, &str)> = None;
    for mapping in mappings {
        let local = mapping.local_prefix.trim_end_matches(['/', '\\']);
        if local.is_empty() || !prefix_matches(path, local) {
            continue;
        }
        if best.is_none_or(|(_, current)| local.len() > current.len()) {
            best = Some((mapping, local));
        }
    }

    let Some((mapping, local)) = best else {
        return path.to_string();
    };

    let suffix = path[local.len()..].trim_start_matches(['/', '\\']);
    let remote = mapping.remote_prefix.trim_end_matches('/');
    if suffix.is_empty() {
        return remote.to_string();
    }
    format!("{remote}/{}", suffix.replace('\\', "/"))
}

fn prefix_matches(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\'),
        None => false,
    }
}

/// Copy of `config` with every path-valued field translated. Inline flow
/// options are not paths and stay untouched.
pub fn map_config_paths(config: &SessionConfig, mappings: &[PathMapping]) -> SessionConfig {
    let mut mapped = config.clone();
    mapped.map_paths(|value| map_path(value, mappings));
    mapped
}
