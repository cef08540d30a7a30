// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod state_file;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{RunLock, RunStorePort};
use crate::app::types::RemoteRunState;

pub use state_file::{StateFile, StateFileError, StateLock};

impl RunLock for StateLock {}

#[derive(Clone, Debug)]
pub struct JsonRunStore {
    file: StateFile,
}

impl JsonRunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: StateFile::new(path),
        }
    }
}

fn map_store_error(err: StateFileError) -> AppError {
    let (kind, code) = match err {
        StateFileError::Corrupt { .. } => (AppErrorKind::InvalidArgument, codes::INVALID_ARGUMENT),
        StateFileError::Io { .. } => (AppErrorKind::Local, codes::LOCAL_ERROR),
        StateFileError::Serialize(_) => (AppErrorKind::Internal, codes::INTERNAL_ERROR),
        StateFileError::Busy { .. } => (AppErrorKind::FailedPrecondition, codes::BUSY),
    };
    AppError::with_message(kind, code, err.to_string())
}

#[async_trait]
impl RunStorePort for JsonRunStore {
    fn try_lock(&self) -> AppResult<Box<dyn RunLock>> {
        let lock = self.file.try_lock().map_err(map_store_error)?;
        tracing::debug!("run state locked path={}", self.file.lock_path().display());
        Ok(Box::new(lock))
    }

    #[tracing::instrument(name = "store", level = "debug", skip(self), fields(op = "load", path = %self.file.path().display()))]
    async fn load(&self) -> AppResult<RemoteRunState> {
        let state = self.file.read().await.map_err(map_store_error)?;
        Ok(state.unwrap_or_default())
    }

    #[tracing::instrument(name = "store", level = "debug", skip(self, state), fields(op = "save", path = %self.file.path().display()))]
    async fn save(&self, state: &RemoteRunState) -> AppResult<()> {
        self.file.write(state).await.map_err(map_store_error)
    }
}
