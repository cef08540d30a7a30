// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes, invalid_argument, staging_error};
use crate::app::ports::{ClockPort, CommandRunnerPort, InputDiscoveryPort, LocalFilesystemPort};
use crate::app::services::listing::DirectoryLister;
use crate::app::services::shell::sh_escape_remote_path;
use crate::app::services::transport::Transport;
use crate::app::services::{path_mapping, random, sbatch, slurm};
use crate::app::session_config::{self, SessionConfig};
use crate::app::types::{
    AccountingOutcome, CONFIG_FILENAME, PathMapping, RemoteDirectoryListing, RemoteProfile,
    RemoteRunState, RunPhase, STAGE1_SCRIPT_NAME, STAGE23_SCRIPT_NAME, StatusReport, TaskCount,
};

pub const DEFAULT_FALLBACK_ARRAY_TASKS: u32 = 2048;
pub const DEFAULT_TAIL_LINES: u32 = 200;
const NO_LOGS_MESSAGE: &str = "No slurm logs found.";

#[derive(Clone)]
pub struct RunOrchestrator {
    pub(crate) transport: Transport,
    pub(crate) lister: DirectoryLister,
    pub(crate) local_fs: Arc<dyn LocalFilesystemPort>,
    pub(crate) discovery: Arc<dyn InputDiscoveryPort>,
    pub(crate) clock: Arc<dyn ClockPort>,
    pub(crate) fallback_array_tasks: u32,
}

impl RunOrchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunnerPort>,
        local_fs: Arc<dyn LocalFilesystemPort>,
        discovery: Arc<dyn InputDiscoveryPort>,
        clock: Arc<dyn ClockPort>,
        fallback_array_tasks: u32,
    ) -> Self {
        let transport = Transport::new(runner);
        Self {
            lister: DirectoryLister::new(transport.clone()),
            transport,
            local_fs,
            discovery,
            clock,
            fallback_array_tasks: fallback_array_tasks.max(1),
        }
    }

    pub async fn test_ssh(&self, profile: &RemoteProfile) -> AppResult<String> {
        let profile = profile.normalized();
        self.transport
            .ssh(&profile.host_alias, "echo connected")
            .await
    }

    pub async fn list_directory(
        &self,
        profile: &RemoteProfile,
        path: &str,
    ) -> AppResult<RemoteDirectoryListing> {
        self.lister.list_directory(&profile.normalized(), path).await
    }

    pub async fn list_directories_shallow(
        &self,
        profile: &RemoteProfile,
        start: Option<&str>,
        max_depth: u32,
        limit: u32,
    ) -> AppResult<Vec<String>> {
        self.lister
            .list_directories_shallow(&profile.normalized(), start, max_depth, limit)
            .await
    }

    /// Stage-1 array size for `config`. Discovery problems never fail the
    /// upload: the fallback bound is used instead and the reason recorded.
    pub async fn discover_task_count(&self, config: &SessionConfig) -> TaskCount {
        let mut warnings = Vec::new();
        let discovered = match self.discovery.discover_input_files(config).await {
            Ok(files) => files.len(),
            Err(err) => {
                warnings.push(format!("Local input discovery failed: {err}"));
                0
            }
        };

        if discovered > 0 {
            return TaskCount {
                num_tasks: u32::try_from(discovered).unwrap_or(u32::MAX),
                warnings,
            };
        }

        if warnings.is_empty() {
            warnings.push("Local input discovery found 0 files.".to_string());
        }
        warnings.push(format!(
            "Using fallback Stage1 array size {}. Tasks beyond discovered files will auto-skip on the cluster.",
            self.fallback_array_tasks
        ));
        TaskCount {
            num_tasks: self.fallback_array_tasks,
            warnings,
        }
    }

    /// Builds a fresh bundle (mapped config + Stage-1 script), creates the
    /// remote run directory and syncs the bundle into it.
    #[tracing::instrument(skip_all, fields(host = %profile.host_alias, run = tracing::field::Empty))]
    pub async fn prepare_and_upload(
        &self,
        config: &SessionConfig,
        profile: &RemoteProfile,
        mappings: &[PathMapping],
    ) -> AppResult<RemoteRunState> {
        let profile = profile.normalized();
        let run_name = random::generate_run_name(self.clock.now_utc());
        let remote_run_dir = format!(
            "{}/{}",
            profile.remote_base_dir.trim_end_matches('/'),
            run_name
        );
        tracing::Span::current().record("run", run_name.as_str());

        let task_count = self.discover_task_count(config).await;
        if task_count.used_fallback() {
            for warning in &task_count.warnings {
                tracing::warn!("{warning}");
            }
        }

        let bundle_dir = self.local_fs.create_bundle_dir().await?;
        let mapped = path_mapping::map_config_paths(config, mappings);
        let yaml = session_config::render_yaml(&mapped, false)
            .map_err(|err| staging_error(err.message().to_string()))?;
        self.local_fs
            .write_file(&bundle_dir.join(CONFIG_FILENAME), &yaml)
            .await?;
        let stage1 =
            sbatch::generate_stage1_script(CONFIG_FILENAME, task_count.num_tasks, &profile);
        self.local_fs
            .write_file(&bundle_dir.join(STAGE1_SCRIPT_NAME), &stage1)
            .await?;
        tracing::debug!(
            "bundle written dir={} tasks={}",
            bundle_dir.display(),
            task_count.num_tasks
        );

        self.transport
            .ssh(
                &profile.host_alias,
                &format!("mkdir -p {}", sh_escape_remote_path(&remote_run_dir)),
            )
            .await?;
        self.transport
            .rsync(
                &format!("{}/", bundle_dir.to_string_lossy()),
                &profile.host_alias,
                &format!("{remote_run_dir}/"),
            )
            .await?;
        tracing::info!("bundle uploaded remote_dir={remote_run_dir}");

        Ok(RemoteRunState {
            run_name: Some(run_name),
            remote_run_dir: Some(remote_run_dir),
            local_bundle_dir: Some(bundle_dir),
            config_filename: CONFIG_FILENAME.to_string(),
            num_tasks: task_count.num_tasks,
            stage1_job_id: None,
            stage23_job_id: None,
            upload_warnings: task_count.warnings,
            phase: RunPhase::Staged,
        })
    }

    /// Queues Stage 1, then Stage 2/3 with an `afterok` dependency on it.
    ///
    /// The Stage-1 id is recorded as soon as it is known, so a failure while
    /// queueing Stage 2/3 leaves a state that a second call resumes from
    /// without submitting Stage 1 again.
    #[tracing::instrument(skip_all, fields(run = ?state.run_name))]
    pub async fn submit(
        &self,
        profile: &RemoteProfile,
        state: &mut RemoteRunState,
    ) -> AppResult<(String, String)> {
        let profile = profile.normalized();
        let Some(remote_run_dir) = state.remote_run_dir.clone() else {
            return Err(AppError::with_message(
                AppErrorKind::FailedPrecondition,
                codes::NOT_STAGED,
                "No remote run directory available. Upload first.",
            ));
        };
        if matches!(
            state.phase,
            RunPhase::Submitted | RunPhase::Completed | RunPhase::Failed | RunPhase::Cancelled
        ) {
            return Err(AppError::with_message(
                AppErrorKind::FailedPrecondition,
                codes::ALREADY_SUBMITTED,
                format!(
                    "Run was already submitted (jobs: {}). Upload again to start a new run.",
                    state.job_ids().join(", ")
                ),
            ));
        }
        let Some(bundle_dir) = state.local_bundle_dir.clone() else {
            return Err(staging_error("Local bundle directory is missing."));
        };
        let quoted_dir = sh_escape_remote_path(&remote_run_dir);

        let resumable = state
            .stage1_job_id
            .clone()
            .filter(|id| state.phase == RunPhase::Stage1Submitted && !id.is_empty());
        let stage1_id = match resumable {
            Some(id) => {
                tracing::info!("resuming submission; stage1 job {id} already queued");
                id
            }
            None => {
                let output = self
                    .transport
                    .ssh(
                        &profile.host_alias,
                        &format!("cd {quoted_dir} && sbatch {STAGE1_SCRIPT_NAME}"),
                    )
                    .await?;
                let id = parse_submission(&output)?;
                state.record_stage1(id.clone());
                tracing::info!("stage1 submitted job_id={id}");
                id
            }
        };

        let stage23 =
            sbatch::generate_stage2and3_script(&state.config_filename, &stage1_id, &profile);
        let stage23_path = bundle_dir.join(STAGE23_SCRIPT_NAME);
        self.local_fs.write_file(&stage23_path, &stage23).await?;
        self.transport
            .rsync(
                &stage23_path.to_string_lossy(),
                &profile.host_alias,
                &format!("{remote_run_dir}/{STAGE23_SCRIPT_NAME}"),
            )
            .await?;

        let output = self
            .transport
            .ssh(
                &profile.host_alias,
                &format!(
                    "cd {quoted_dir} && sbatch --dependency=afterok:{stage1_id} {STAGE23_SCRIPT_NAME}"
                ),
            )
            .await?;
        let stage23_id = parse_submission(&output)?;
        state.record_stage23(stage23_id.clone());
        tracing::info!("stage23 submitted job_id={stage23_id} after={stage1_id}");

        Ok((stage1_id, stage23_id))
    }

    /// Queue and accounting snapshot of the run's jobs. Accounting rows that
    /// show a terminal outcome settle the run's phase.
    #[tracing::instrument(skip_all, fields(run = ?state.run_name))]
    pub async fn refresh_status(
        &self,
        profile: &RemoteProfile,
        state: &mut RemoteRunState,
    ) -> AppResult<StatusReport> {
        let profile = profile.normalized();
        let job_ids = state.job_ids();
        if job_ids.is_empty() {
            return Err(AppError::with_message(
                AppErrorKind::FailedPrecondition,
                codes::NO_JOBS,
                "No submitted jobs to query.",
            ));
        }
        let joined = job_ids.join(",");

        let squeue = self
            .transport
            .ssh(
                &profile.host_alias,
                &format!("squeue -j {joined} -o {}", slurm::SQUEUE_FORMAT),
            )
            .await?;

        let accounting = match self
            .transport
            .ssh(
                &profile.host_alias,
                &format!(
                    "sacct -j {joined} --format={} --noheader",
                    slurm::SACCT_FORMAT
                ),
            )
            .await
        {
            Ok(rows) => {
                settle_from_accounting(state, &rows);
                AccountingOutcome::Rows(rows)
            }
            Err(err) => {
                tracing::warn!("sacct check failed for {joined}: {err}");
                AccountingOutcome::Unavailable {
                    reason: err.to_string(),
                }
            }
        };

        Ok(StatusReport { squeue, accounting })
    }

    /// Last `lines` lines of the newest `slurm*.out` in the run directory.
    pub async fn tail_log(
        &self,
        profile: &RemoteProfile,
        state: &RemoteRunState,
        lines: u32,
    ) -> AppResult<String> {
        let profile = profile.normalized();
        let Some(remote_run_dir) = state.remote_run_dir.as_deref() else {
            return Err(AppError::with_message(
                AppErrorKind::FailedPrecondition,
                codes::NOT_STAGED,
                "No remote run directory available.",
            ));
        };
        let command = format!(
            "cd {} && latest=$(ls -1t slurm*.out 2>/dev/null | head -n 1); \
             if [ -n \"$latest\" ]; then tail -n {lines} \"$latest\"; \
             else echo '{NO_LOGS_MESSAGE}'; fi",
            sh_escape_remote_path(remote_run_dir)
        );
        self.transport.ssh(&profile.host_alias, &command).await
    }

    /// Cancels `explicit_ids` when any are given, otherwise the run's own
    /// jobs. Returns the ids passed to `scancel`; empty means nothing ran.
    pub async fn cancel(
        &self,
        profile: &RemoteProfile,
        state: &mut RemoteRunState,
        explicit_ids: &[String],
    ) -> AppResult<Vec<String>> {
        let profile = profile.normalized();
        let explicit: Vec<String> = explicit_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(bad) = explicit.iter().find(|id| !is_job_id(id)) {
            return Err(invalid_argument(format!("invalid job id: {bad}")));
        }

        let from_state = explicit.is_empty();
        let job_ids = if from_state { state.job_ids() } else { explicit };
        if job_ids.is_empty() {
            return Ok(job_ids);
        }

        self.transport
            .ssh(
                &profile.host_alias,
                &format!("scancel {}", job_ids.join(" ")),
            )
            .await?;
        if from_state && state.settle(RunPhase::Cancelled) {
            tracing::info!("run cancelled jobs={}", job_ids.join(","));
        }
        Ok(job_ids)
    }
}

fn parse_submission(output: &str) -> AppResult<String> {
    slurm::parse_job_id(output).ok_or_else(|| {
        AppError::with_message(
            AppErrorKind::Parse,
            codes::UNPARSEABLE_SUBMISSION,
            format!("Could not parse sbatch output: {output}"),
        )
    })
}

fn settle_from_accounting(state: &mut RemoteRunState, rows: &str) {
    let Some(stage1) = state.stage1_job_id.clone() else {
        return;
    };
    let rows = slurm::parse_sacct_rows(rows);
    let Some(phase) = slurm::derive_phase(&rows, &stage1, state.stage23_job_id.as_deref()) else {
        return;
    };
    if state.settle(phase) {
        tracing::info!("run settled phase={}", phase.as_str());
    }
}

/// Plain and array job ids (`123`, `123_4`, `123_[1-5]`).
fn is_job_id(id: &str) -> bool {
    id.chars().next().is_some_and(|c| c.is_ascii_digit())
        && id
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '_' | '[' | ']' | '-'))
}
