// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use walkdir::WalkDir;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::InputDiscoveryPort;
use crate::app::session_config::SessionConfig;

/// Lists input files under the session root that match its pattern.
///
/// A plain pattern (`*.tif`) matches file names directly under the root; a
/// pattern with a separator (`**/*.tif`) is matched against the path relative
/// to the root at any depth.
#[derive(Clone, Debug, Default)]
pub struct FsInputDiscovery;

fn discovery_error(message: String) -> AppError {
    AppError::with_message(AppErrorKind::Local, codes::DISCOVERY_ERROR, message)
}

fn matcher(pattern: &str) -> AppResult<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|err| discovery_error(format!("invalid pattern '{pattern}': {err}")))
}

fn discover(root: &Path, pattern: &str) -> AppResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(discovery_error(format!(
            "input root {} is not a directory",
            root.display()
        )));
    }
    let matcher = matcher(pattern)?;
    let recursive = pattern.contains('/');
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| discovery_error(format!("failed to scan {}: {err}", root.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let candidate = if recursive {
            entry.path().strip_prefix(root).unwrap_or(entry.path())
        } else {
            Path::new(entry.file_name())
        };
        if matcher.is_match(candidate) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl InputDiscoveryPort for FsInputDiscovery {
    #[tracing::instrument(name = "discovery", level = "debug", skip(self, config), fields(root = %config.root, pattern = %config.pattern))]
    async fn discover_input_files(&self, config: &SessionConfig) -> AppResult<Vec<PathBuf>> {
        let files = discover(Path::new(&config.root), &config.pattern)?;
        tracing::debug!("discovered {} input files", files.len());
        Ok(files)
    }
}
