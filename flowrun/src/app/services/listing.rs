// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::{BTreeSet, HashSet};

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::services::shell::sh_escape;
use crate::app::services::transport::Transport;
use crate::app::types::{RemoteDirectoryListing, RemoteProfile};

pub const BASE_SENTINEL: &str = "__BASE__:";
pub const NOT_DIR_SENTINEL: &str = "__WARN_NOT_DIR__:";

pub const DEFAULT_SHALLOW_DEPTH: u32 = 2;
pub const DEFAULT_SHALLOW_LIMIT: u32 = 200;

/// Remote script listing the immediate subdirectories of `requested`,
/// falling back to `$HOME` when it is not a directory.
pub fn list_directory_command(requested: &str) -> String {
    format!(
        concat!(
            "requested={}; ",
            r#"case "$requested" in "~") requested="$HOME" ;; "~/"*) requested="$HOME/${{requested#??}}" ;; esac; "#,
            r#"if [ ! -d "$requested" ]; then echo "{}$requested"; requested="$HOME"; fi; "#,
            r#"printf "{}%s\n" "$requested"; "#,
            r#"find "$requested" -mindepth 1 -maxdepth 1 -type d 2>/dev/null | sort"#,
        ),
        sh_escape(requested),
        NOT_DIR_SENTINEL,
        BASE_SENTINEL,
    )
}

/// Remote script creating `start` if needed and printing it followed by its
/// subdirectories down to `max_depth` in lexicographic order, at most `limit`
/// of them. The caller trims the combined list to `limit`.
pub fn list_directories_command(start: &str, max_depth: u32, limit: u32) -> String {
    format!(
        concat!(
            "base={}; ",
            r#"case "$base" in "~") base="$HOME" ;; "~/"*) base="$HOME/${{base#??}}" ;; esac; "#,
            r#"mkdir -p "$base" >/dev/null 2>&1 || true; "#,
            r#"printf "%s\n" "$base"; "#,
            r#"find "$base" -mindepth 1 -maxdepth {} -type d 2>/dev/null | sort | head -n {}"#,
        ),
        sh_escape(start),
        max_depth,
        limit,
    )
}

pub fn parse_directory_listing(output: &str) -> AppResult<RemoteDirectoryListing> {
    let mut base = None;
    let mut children = BTreeSet::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(path) = line.strip_prefix(BASE_SENTINEL) {
            base = Some(path.to_string());
            continue;
        }
        if line.starts_with(NOT_DIR_SENTINEL) {
            continue;
        }
        children.insert(line.to_string());
    }

    match base {
        Some(path) if !path.is_empty() => Ok(RemoteDirectoryListing {
            path,
            children: children.into_iter().collect(),
        }),
        _ => Err(AppError::with_message(
            AppErrorKind::Parse,
            codes::MALFORMED_LISTING,
            format!("Could not parse remote directory listing output:\n{output}"),
        )),
    }
}

/// Non-blank lines in first-seen order, duplicates dropped.
pub fn parse_directory_lines(output: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && seen.insert(*line))
        .map(str::to_string)
        .collect()
}

/// Browses remote directories for path pickers.
#[derive(Clone)]
pub struct DirectoryLister {
    transport: Transport,
}

impl DirectoryLister {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn list_directory(
        &self,
        profile: &RemoteProfile,
        path: &str,
    ) -> AppResult<RemoteDirectoryListing> {
        let requested = match path.trim() {
            "" => "~",
            trimmed => trimmed,
        };
        let output = self
            .transport
            .ssh(&profile.host_alias, &list_directory_command(requested))
            .await?;
        let listing = parse_directory_listing(&output)?;
        if output.contains(NOT_DIR_SENTINEL) {
            tracing::info!(requested, resolved = %listing.path, "not a directory; listed home instead");
        }
        Ok(listing)
    }

    /// `start` defaults to the profile's base dir, then `~`. Depth and
    /// limit are clamped to at least 1; the result, start included, holds at
    /// most `limit` entries.
    pub async fn list_directories_shallow(
        &self,
        profile: &RemoteProfile,
        start: Option<&str>,
        max_depth: u32,
        limit: u32,
    ) -> AppResult<Vec<String>> {
        let start = [start.unwrap_or_default(), profile.remote_base_dir.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
            .unwrap_or("~");
        let limit = limit.max(1);
        let command = list_directories_command(start, max_depth.max(1), limit);
        let output = self.transport.ssh(&profile.host_alias, &command).await?;
        let mut dirs = parse_directory_lines(&output);
        dirs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(dirs)
    }
}
