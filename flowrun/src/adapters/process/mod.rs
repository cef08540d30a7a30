// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes, invalid_argument};
use crate::app::ports::CommandRunnerPort;
use crate::app::types::CommandOutput;

/// Runs argv vectors as local child processes. stdin is closed so nothing
/// can block on a prompt.
#[derive(Clone, Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunnerPort for ProcessRunner {
    #[tracing::instrument(name = "process", level = "debug", skip(self, argv), fields(program = argv.first().map(String::as_str).unwrap_or_default()))]
    async fn run(&self, argv: &[String]) -> AppResult<CommandOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(invalid_argument("empty command"));
        };
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                AppError::with_message(
                    AppErrorKind::Transport,
                    codes::COMMAND_FAILED,
                    format!("Command failed: {}\n{err}", argv.join(" ")),
                )
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        tracing::debug!(exit_code, "process exited");
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        })
    }
}
