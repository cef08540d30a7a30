// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::session_config::SessionConfig;

#[async_trait]
/// Counts the per-item work a session implies, as seen from the local machine.
pub trait InputDiscoveryPort: Send + Sync {
    async fn discover_input_files(&self, config: &SessionConfig) -> AppResult<Vec<PathBuf>>;
}
