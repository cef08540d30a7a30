// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::ports::CommandRunnerPort;
use crate::app::types::CommandOutput;

pub(crate) fn output(stdout: &str, stderr: &str, exit_code: i32) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code,
    }
}

/// Replays queued results in order and records every argv it was given.
pub(crate) struct ScriptedRunner {
    responses: Mutex<VecDeque<AppResult<CommandOutput>>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn ok(self, stdout: &str) -> Self {
        self.push(Ok(output(stdout, "", 0)))
    }

    pub(crate) fn fail(self, exit_code: i32, stderr: &str) -> Self {
        self.push(Ok(output("", stderr, exit_code)))
    }

    pub(crate) fn push(self, response: AppResult<CommandOutput>) -> Self {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(response);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// The remote command of each recorded ssh call, unwrapped from `sh -lc`.
    pub(crate) fn ssh_commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|argv| argv.first().map(String::as_str) == Some("ssh"))
            .filter_map(|argv| argv.last().cloned())
            .collect()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.responses.lock().expect("responses lock").len()
    }
}

#[async_trait]
impl CommandRunnerPort for ScriptedRunner {
    async fn run(&self, argv: &[String]) -> AppResult<CommandOutput> {
        self.calls.lock().expect("calls lock").push(argv.to_vec());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command: {argv:?}"))
    }
}
