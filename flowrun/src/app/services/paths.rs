// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Component, Path, PathBuf};

/// Joins `relative` onto `base` unless it is already absolute, then normalizes
/// the result syntactically. Nothing is read from disk.
pub fn join_normalized(base: impl AsRef<Path>, relative: impl AsRef<Path>) -> PathBuf {
    let relative = relative.as_ref();
    if relative.is_absolute() {
        return normalize_path(relative);
    }
    let relative = relative.strip_prefix("./").unwrap_or(relative);
    normalize_path(base.as_ref().join(relative))
}

/// Normalize a path syntactically
/// - remove `.`
/// - resolve .. where possible
/// - keeps an absolute root/prefix if present
pub fn normalize_path(p: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    let mut comps = p.as_ref().components().peekable();
    while let Some(c) = comps.peek() {
        match c {
            Component::Prefix(prefix) => {
                out.push(Path::new(prefix.as_os_str()));
                comps.next();
            }
            Component::RootDir => {
                out.push(Path::new(std::path::MAIN_SEPARATOR_STR));
                comps.next();
            }
            _ => break,
        }
    }

    for comp in comps {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = out.pop();
                if !popped || out.as_os_str().is_empty() {
                    out.push("..");
                }
            }
            Component::Normal(seg) => out.push(seg),
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    out
}

/// `path` relative to `base` when it lies under it (`.` for `base` itself).
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if base.as_os_str().is_empty() {
        return None;
    }
    let rel = normalize_path(path)
        .strip_prefix(normalize_path(base))
        .ok()?
        .to_path_buf();
    if rel.as_os_str().is_empty() {
        Some(PathBuf::from("."))
    } else {
        Some(rel)
    }
}
