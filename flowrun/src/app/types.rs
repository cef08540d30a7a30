// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST_ALIAS: &str = "deigo";
pub const DEFAULT_REMOTE_BASE_DIR: &str = "~/pyflowreg_runs";
pub const CONFIG_FILENAME: &str = "session_config.yaml";
pub const STAGE1_SCRIPT_NAME: &str = "stage1_array.sbatch";
pub const STAGE23_SCRIPT_NAME: &str = "stage23.sbatch";

/// One local -> remote filesystem prefix translation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    pub local_prefix: String,
    pub remote_prefix: String,
}

impl PathMapping {
    pub fn new(local_prefix: impl Into<String>, remote_prefix: impl Into<String>) -> Self {
        Self {
            local_prefix: local_prefix.into(),
            remote_prefix: remote_prefix.into(),
        }
    }
}

/// Resource requests written into generated batch scripts. Empty strings and
/// zero counts are left out of the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SbatchDefaults {
    pub partition: String,
    pub time: String,
    pub mem: String,
    pub cpus: u32,
    pub gpus: u32,
}

impl Default for SbatchDefaults {
    fn default() -> Self {
        Self {
            partition: String::new(),
            time: String::new(),
            mem: String::new(),
            cpus: 1,
            gpus: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteProfile {
    /// ssh alias, resolved by the user's ssh config.
    pub host_alias: String,
    pub remote_base_dir: String,
    pub env_activation_cmd: String,
    pub sbatch: SbatchDefaults,
}

impl Default for RemoteProfile {
    fn default() -> Self {
        Self {
            host_alias: DEFAULT_HOST_ALIAS.to_string(),
            remote_base_dir: DEFAULT_REMOTE_BASE_DIR.to_string(),
            env_activation_cmd: String::new(),
            sbatch: SbatchDefaults::default(),
        }
    }
}

impl RemoteProfile {
    /// Trimmed copy with blank host alias / base dir replaced by defaults.
    pub fn normalized(&self) -> Self {
        let host_alias = non_blank_or(&self.host_alias, DEFAULT_HOST_ALIAS);
        let remote_base_dir = non_blank_or(&self.remote_base_dir, DEFAULT_REMOTE_BASE_DIR);
        Self {
            host_alias,
            remote_base_dir,
            env_activation_cmd: self.env_activation_cmd.trim().to_string(),
            sbatch: SbatchDefaults {
                partition: self.sbatch.partition.trim().to_string(),
                time: self.sbatch.time.trim().to_string(),
                mem: self.sbatch.mem.trim().to_string(),
                cpus: self.sbatch.cpus,
                gpus: self.sbatch.gpus,
            },
        }
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Staged,
    Stage1Submitted,
    Submitted,
    Completed,
    Failed,
    Cancelled,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Staged => "staged",
            RunPhase::Stage1Submitted => "stage1_submitted",
            RunPhase::Submitted => "submitted",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
            RunPhase::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::Failed | RunPhase::Cancelled
        )
    }
}

/// Lifecycle record of one orchestrated remote run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRunState {
    pub run_name: Option<String>,
    pub remote_run_dir: Option<String>,
    pub local_bundle_dir: Option<PathBuf>,
    pub config_filename: String,
    pub num_tasks: u32,
    pub stage1_job_id: Option<String>,
    pub stage23_job_id: Option<String>,
    pub upload_warnings: Vec<String>,
    pub phase: RunPhase,
}

impl Default for RemoteRunState {
    fn default() -> Self {
        Self {
            run_name: None,
            remote_run_dir: None,
            local_bundle_dir: None,
            config_filename: CONFIG_FILENAME.to_string(),
            num_tasks: 0,
            stage1_job_id: None,
            stage23_job_id: None,
            upload_warnings: Vec::new(),
            phase: RunPhase::Idle,
        }
    }
}

impl RemoteRunState {
    /// Submitted scheduler ids, in submission order.
    pub fn job_ids(&self) -> Vec<String> {
        [&self.stage1_job_id, &self.stage23_job_id]
            .into_iter()
            .flatten()
            .filter(|id| !id.is_empty())
            .cloned()
            .collect()
    }

    pub fn is_staged(&self) -> bool {
        self.remote_run_dir.is_some()
    }

    pub(crate) fn record_stage1(&mut self, job_id: String) {
        self.stage1_job_id = Some(job_id);
        self.stage23_job_id = None;
        self.phase = RunPhase::Stage1Submitted;
    }

    pub(crate) fn record_stage23(&mut self, job_id: String) {
        debug_assert!(self.stage1_job_id.is_some());
        self.stage23_job_id = Some(job_id);
        self.phase = RunPhase::Submitted;
    }

    /// Moves an in-flight run to a terminal phase. Returns false, leaving the
    /// phase untouched, when the run is not in flight.
    pub(crate) fn settle(&mut self, phase: RunPhase) -> bool {
        let in_flight = matches!(
            self.phase,
            RunPhase::Stage1Submitted | RunPhase::Submitted
        );
        if !in_flight || !phase.is_terminal() {
            return false;
        }
        self.phase = phase;
        true
    }
}

/// One remote directory and its immediate subdirectories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteDirectoryListing {
    pub path: String,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// -1 when the process was terminated by a signal.
    pub exit_code: i32,
}

/// Stage-1 array size plus the reasons a fallback bound was used, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCount {
    pub num_tasks: u32,
    pub warnings: Vec<String>,
}

impl TaskCount {
    pub fn used_fallback(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountingOutcome {
    Rows(String),
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub squeue: String,
    pub accounting: AccountingOutcome,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let squeue = if self.squeue.is_empty() {
            "(no rows)"
        } else {
            self.squeue.as_str()
        };
        let sacct = match &self.accounting {
            AccountingOutcome::Rows(rows) if rows.is_empty() => "(no rows)",
            AccountingOutcome::Rows(rows) => rows.as_str(),
            AccountingOutcome::Unavailable { .. } => "(sacct unavailable)",
        };
        write!(f, "squeue:\n{squeue}\n\nsacct:\n{sacct}")
    }
}
