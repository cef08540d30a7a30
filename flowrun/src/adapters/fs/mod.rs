// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::app::errors::{AppResult, staging_error};
use crate::app::ports::LocalFilesystemPort;

const BUNDLE_PREFIX: &str = "flowrun_bundle_";

/// Stages bundles under the system temp dir, or under `bundle_root` when set.
#[derive(Clone, Debug, Default)]
pub struct LocalFilesystem {
    bundle_root: Option<PathBuf>,
}

impl LocalFilesystem {
    pub fn new(bundle_root: Option<PathBuf>) -> Self {
        Self { bundle_root }
    }
}

#[async_trait]
impl LocalFilesystemPort for LocalFilesystem {
    #[tracing::instrument(name = "fs", level = "debug", skip(self), fields(op = "create_bundle_dir"))]
    async fn create_bundle_dir(&self) -> AppResult<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(BUNDLE_PREFIX);
        let dir = match &self.bundle_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|err| {
                    staging_error(format!("failed to create {}: {err}", root.display()))
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|err| staging_error(format!("failed to create bundle directory: {err}")))?;
        Ok(dir.keep())
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, path, contents), fields(op = "write_file", path = %path.display()))]
    async fn write_file(&self, path: &Path, contents: &str) -> AppResult<()> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|err| staging_error(format!("failed to write {}: {err}", path.display())))
    }
}
