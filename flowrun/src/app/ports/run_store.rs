// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::RemoteRunState;

/// Exclusive hold on the stored run; dropping it releases the run.
pub trait RunLock: Send {}

#[async_trait]
pub trait RunStorePort: Send + Sync {
    /// Takes the single-writer lock without waiting. Fails with `busy` while
    /// another process holds it.
    fn try_lock(&self) -> AppResult<Box<dyn RunLock>>;

    /// Returns an empty state when nothing was saved yet.
    async fn load(&self) -> AppResult<RemoteRunState>;
    async fn save(&self, state: &RemoteRunState) -> AppResult<()>;
}
