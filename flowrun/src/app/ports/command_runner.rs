// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::CommandOutput;

#[async_trait]
/// Outbound process boundary. Every ssh/rsync invocation goes through here.
/// Implementations capture text stdout/stderr and report the exit status;
/// they only return Err when the process could not be started at all.
pub trait CommandRunnerPort: Send + Sync {
    async fn run(&self, argv: &[String]) -> AppResult<CommandOutput>;
}
