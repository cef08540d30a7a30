// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[async_trait]
/// Local filesystem boundary for bundle staging.
/// Bundle directories are created fresh per upload and are never removed here.
pub trait LocalFilesystemPort: Send + Sync {
    async fn create_bundle_dir(&self) -> AppResult<PathBuf>;
    async fn write_file(&self, path: &Path, contents: &str) -> AppResult<()>;
}
