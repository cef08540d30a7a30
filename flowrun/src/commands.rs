// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::adapters::cli::{Cmd, ConfigArgs, ConfigCmd, ConvertArgs};
use crate::adapters::discovery::FsInputDiscovery;
use crate::adapters::fs::LocalFilesystem;
use crate::adapters::process::ProcessRunner;
use crate::adapters::store::JsonRunStore;
use crate::adapters::time::SystemClock;
use crate::app::ports::{CommandRunnerPort, RunStorePort};
use crate::app::services::path_mapping;
use crate::app::session_config::{self, SessionConfig};
use crate::app::types::{PathMapping, RemoteProfile, RemoteRunState};
use crate::app::usecases::RunOrchestrator;
use crate::config::Config;
use crate::format;

/// Everything one invocation needs: the orchestrator, the persisted run
/// state and the resolved profile.
pub struct Context {
    orchestrator: RunOrchestrator,
    store: Arc<dyn RunStorePort>,
    profile: RemoteProfile,
    mappings: Vec<PathMapping>,
}

impl Context {
    pub fn new(
        orchestrator: RunOrchestrator,
        store: Arc<dyn RunStorePort>,
        profile: RemoteProfile,
        mappings: Vec<PathMapping>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            profile,
            mappings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    fn with_runner(config: &Config, runner: Arc<dyn CommandRunnerPort>) -> Self {
        let orchestrator = RunOrchestrator::new(
            runner,
            Arc::new(LocalFilesystem::new(config.bundle_root.clone())),
            Arc::new(FsInputDiscovery),
            Arc::new(SystemClock),
            config.fallback_array_tasks,
        );
        Self::new(
            orchestrator,
            Arc::new(JsonRunStore::new(&config.state_path)),
            config.profile.clone(),
            config.path_mappings.clone(),
        )
    }
}

/// Runs one subcommand and returns what should be printed on stdout.
pub async fn run(ctx: &Context, cmd: Cmd) -> Result<String> {
    match cmd {
        Cmd::TestSsh => {
            let out = ctx.orchestrator.test_ssh(&ctx.profile).await?;
            Ok(format!("{out}\n"))
        }
        Cmd::MapPath(args) => Ok(format!(
            "{}\n",
            path_mapping::map_path(&args.path, &ctx.mappings)
        )),
        Cmd::Ls(args) => {
            let listing = ctx
                .orchestrator
                .list_directory(&ctx.profile, args.path.as_deref().unwrap_or(""))
                .await?;
            if args.json {
                format::format_listing_json(&listing)
            } else {
                Ok(format::format_listing(&listing))
            }
        }
        Cmd::Dirs(args) => {
            let dirs = ctx
                .orchestrator
                .list_directories_shallow(&ctx.profile, args.start.as_deref(), args.depth, args.limit)
                .await?;
            if args.json {
                format::format_lines_json(&dirs)
            } else {
                Ok(dirs.iter().map(|dir| format!("{dir}\n")).collect())
            }
        }
        Cmd::Upload(args) => {
            let _lock = ctx.store.try_lock()?;
            let (state, config) = upload(ctx, &args.session).await?;
            ctx.store.save(&state).await?;
            Ok(format!(
                "{}{}",
                format::format_state(&state),
                format::format_output_paths(&config.resolve_output_paths())
            ))
        }
        Cmd::Submit(args) => {
            let _lock = ctx.store.try_lock()?;
            let mut state = ctx.store.load().await?;
            if !state.is_staged()
                && let Some(session) = args.session.as_deref()
            {
                state = upload(ctx, session).await?.0;
                ctx.store.save(&state).await?;
            }
            let result = ctx.orchestrator.submit(&ctx.profile, &mut state).await;
            // Persist even on failure: a recorded Stage-1 id makes the next
            // submit resume instead of queueing Stage 1 twice.
            let saved = ctx.store.save(&state).await;
            let (stage1, stage23) = result?;
            saved?;
            Ok(format!("stage1 job: {stage1}\nstage23 job: {stage23}\n"))
        }
        Cmd::Status => {
            let _lock = ctx.store.try_lock()?;
            let mut state = ctx.store.load().await?;
            let before = state.phase;
            let report = ctx
                .orchestrator
                .refresh_status(&ctx.profile, &mut state)
                .await?;
            if state.phase != before {
                ctx.store.save(&state).await?;
            }
            Ok(format!("phase: {}\n\n{report}\n", state.phase.as_str()))
        }
        Cmd::Logs(args) => {
            let state = ctx.store.load().await?;
            let out = ctx
                .orchestrator
                .tail_log(&ctx.profile, &state, args.lines)
                .await?;
            Ok(format!("{out}\n"))
        }
        Cmd::Cancel(args) => {
            let _lock = ctx.store.try_lock()?;
            let mut state = ctx.store.load().await?;
            let cancelled = ctx
                .orchestrator
                .cancel(&ctx.profile, &mut state, &args.job_ids)
                .await?;
            ctx.store.save(&state).await?;
            if cancelled.is_empty() {
                Ok("No jobs to cancel.\n".to_string())
            } else {
                Ok(format!("Cancelled jobs: {}\n", cancelled.join(", ")))
            }
        }
        Cmd::Show(args) => {
            let state = ctx.store.load().await?;
            if args.json {
                format::format_state_json(&state)
            } else {
                Ok(format::format_state(&state))
            }
        }
        Cmd::Config(ConfigArgs { cmd }) => match cmd {
            ConfigCmd::Fields(args) => {
                let fields = SessionConfig::field_descriptors();
                if args.json {
                    format::format_fields_json(fields)
                } else {
                    Ok(format::format_fields_table(fields))
                }
            }
            ConfigCmd::Convert(args) => convert(ctx, &args),
        },
    }
}

/// Stages `session` and returns the new run with the local config it came from.
async fn upload(ctx: &Context, session: &Path) -> Result<(RemoteRunState, SessionConfig)> {
    let config = session_config::load(session)?;
    tracing::debug!("session loaded path={} root={}", session.display(), config.root);
    let state = ctx
        .orchestrator
        .prepare_and_upload(&config, &ctx.profile, &ctx.mappings)
        .await?;
    Ok((state, config))
}

fn convert(ctx: &Context, args: &ConvertArgs) -> Result<String> {
    let mut config = session_config::load(&args.input)?;
    if args.map_paths {
        config = path_mapping::map_config_paths(&config, &ctx.mappings);
    }
    session_config::save(&config, &args.output, args.prefer_relative)?;
    Ok(format!("wrote {}\n", args.output.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cli::{
        CancelArgs, ConvertArgs, FieldsArgs, MapPathArgs, ShowArgs, SubmitArgs, UploadArgs,
    };
    use crate::app::errors::{AppError, codes};
    use crate::app::test_support::ScriptedRunner;
    use crate::app::types::RunPhase;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        runner: Arc<ScriptedRunner>,
        ctx: Context,
    }

    impl Fixture {
        fn new(runner: ScriptedRunner) -> Self {
            let dir = TempDir::new().unwrap();
            let runner = Arc::new(runner);
            let config = Config {
                state_path: dir.path().join("state/run_state.json"),
                bundle_root: Some(dir.path().join("bundles")),
                fallback_array_tasks: 16,
                verbose: false,
                profile: RemoteProfile {
                    host_alias: "cluster".to_string(),
                    remote_base_dir: "/work/runs".to_string(),
                    ..RemoteProfile::default()
                },
                path_mappings: vec![PathMapping::new("/Volumes/lab", "/bucket/lab")],
                config_path: None,
            };
            let ctx = Context::with_runner(&config, runner.clone());
            Self { dir, runner, ctx }
        }

        fn write_session(&self) -> PathBuf {
            let data = self.dir.path().join("data");
            std::fs::create_dir_all(&data).unwrap();
            std::fs::write(data.join("a.tif"), b"").unwrap();
            std::fs::write(data.join("b.tif"), b"").unwrap();
            let session = self.dir.path().join("session.yaml");
            std::fs::write(&session, "root: data\npattern: \"*.tif\"\n").unwrap();
            session
        }

        async fn state(&self) -> RemoteRunState {
            self.ctx.store.load().await.unwrap()
        }
    }

    fn app_error(err: &anyhow::Error) -> &AppError {
        err.downcast_ref::<AppError>().unwrap()
    }

    #[tokio::test]
    async fn map_path_uses_configured_mappings() {
        let fx = Fixture::new(ScriptedRunner::new());
        let out = run(
            &fx.ctx,
            Cmd::MapPath(MapPathArgs {
                path: "/Volumes/lab/session1".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(out, "/bucket/lab/session1\n");
    }

    #[tokio::test]
    async fn upload_then_submit_persists_state() {
        let fx = Fixture::new(
            ScriptedRunner::new()
                .ok("")
                .ok("")
                .ok("Submitted batch job 101")
                .ok("")
                .ok("Submitted batch job 102"),
        );
        let session = fx.write_session();

        let out = run(&fx.ctx, Cmd::Upload(UploadArgs { session }))
            .await
            .unwrap();
        assert!(out.contains("phase: staged"));
        let data = fx.dir.path().join("data");
        assert!(out.contains(&format!(
            "output_root: {}\n",
            data.join("compensated_outputs").display()
        )));
        assert!(out.contains(&format!(
            "final_results: {}\n",
            data.join("final_results").display()
        )));
        let staged = fx.state().await;
        assert_eq!(staged.num_tasks, 2);
        assert!(staged.upload_warnings.is_empty());
        assert!(staged.remote_run_dir.as_deref().unwrap().starts_with("/work/runs/run_"));

        let out = run(&fx.ctx, Cmd::Submit(SubmitArgs { session: None }))
            .await
            .unwrap();
        assert_eq!(out, "stage1 job: 101\nstage23 job: 102\n");
        let submitted = fx.state().await;
        assert_eq!(submitted.phase, RunPhase::Submitted);
        assert_eq!(submitted.job_ids(), vec!["101", "102"]);
        assert_eq!(fx.runner.remaining(), 0);
    }

    #[tokio::test]
    async fn submit_with_session_uploads_when_not_staged() {
        let fx = Fixture::new(
            ScriptedRunner::new()
                .ok("")
                .ok("")
                .ok("Submitted batch job 7")
                .ok("")
                .ok("Submitted batch job 8"),
        );
        let session = fx.write_session();
        run(
            &fx.ctx,
            Cmd::Submit(SubmitArgs {
                session: Some(session),
            }),
        )
        .await
        .unwrap();
        let commands = fx.runner.ssh_commands();
        assert!(commands[0].contains("mkdir -p"));
        assert_eq!(fx.state().await.phase, RunPhase::Submitted);
    }

    #[tokio::test]
    async fn failed_stage23_submission_keeps_stage1_for_resume() {
        let fx = Fixture::new(
            ScriptedRunner::new()
                .ok("")
                .ok("")
                .ok("Submitted batch job 301")
                .ok("")
                .fail(1, "sbatch: error: invalid partition"),
        );
        let session = fx.write_session();
        run(&fx.ctx, Cmd::Upload(UploadArgs { session }))
            .await
            .unwrap();

        let err = run(&fx.ctx, Cmd::Submit(SubmitArgs { session: None }))
            .await
            .unwrap_err();
        assert_eq!(app_error(&err).code(), codes::COMMAND_FAILED);
        let state = fx.state().await;
        assert_eq!(state.phase, RunPhase::Stage1Submitted);
        assert_eq!(state.stage1_job_id.as_deref(), Some("301"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn concurrent_writer_makes_submit_busy() {
        let fx = Fixture::new(ScriptedRunner::new());
        let other = JsonRunStore::new(fx.dir.path().join("state/run_state.json"));
        let held = other.try_lock().unwrap();

        let err = run(&fx.ctx, Cmd::Submit(SubmitArgs { session: None }))
            .await
            .unwrap_err();
        assert_eq!(app_error(&err).code(), codes::BUSY);
        assert!(fx.runner.calls().is_empty());

        drop(held);
        let err = run(&fx.ctx, Cmd::Submit(SubmitArgs { session: None }))
            .await
            .unwrap_err();
        assert_eq!(app_error(&err).code(), codes::NOT_STAGED);
    }

    #[tokio::test]
    async fn read_only_commands_ignore_the_lock() {
        let fx = Fixture::new(ScriptedRunner::new());
        let _held = fx.ctx.store.try_lock().unwrap();
        assert!(run(&fx.ctx, Cmd::Show(ShowArgs { json: false })).await.is_ok());
    }

    #[tokio::test]
    async fn submit_without_upload_is_not_staged() {
        let fx = Fixture::new(ScriptedRunner::new());
        let err = run(&fx.ctx, Cmd::Submit(SubmitArgs { session: None }))
            .await
            .unwrap_err();
        assert_eq!(app_error(&err).code(), codes::NOT_STAGED);
    }

    #[tokio::test]
    async fn status_saves_settled_phase() {
        let fx = Fixture::new(
            ScriptedRunner::new()
                .ok("JOBID STATE TIME REASON")
                .ok("11 COMPLETED 00:01:00 1K\n12 COMPLETED 00:02:00 2K"),
        );
        let mut state = RemoteRunState {
            remote_run_dir: Some("/work/runs/r".to_string()),
            ..RemoteRunState::default()
        };
        state.record_stage1("11".to_string());
        state.record_stage23("12".to_string());
        fx.ctx.store.save(&state).await.unwrap();

        let out = run(&fx.ctx, Cmd::Status).await.unwrap();
        assert!(out.starts_with("phase: completed\n"));
        assert!(out.contains("sacct:\n11 COMPLETED"));
        assert_eq!(fx.state().await.phase, RunPhase::Completed);
    }

    #[tokio::test]
    async fn cancel_without_jobs_runs_nothing() {
        let fx = Fixture::new(ScriptedRunner::new());
        let out = run(&fx.ctx, Cmd::Cancel(CancelArgs { job_ids: vec![] }))
            .await
            .unwrap();
        assert_eq!(out, "No jobs to cancel.\n");
        assert!(fx.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn show_json_round_trips_state() {
        let fx = Fixture::new(ScriptedRunner::new());
        let out = run(&fx.ctx, Cmd::Show(ShowArgs { json: true }))
            .await
            .unwrap();
        let state: RemoteRunState = serde_json::from_str(&out).unwrap();
        assert_eq!(state, RemoteRunState::default());
    }

    #[tokio::test]
    async fn config_fields_lists_table() {
        let fx = Fixture::new(ScriptedRunner::new());
        let out = run(
            &fx.ctx,
            Cmd::Config(ConfigArgs {
                cmd: ConfigCmd::Fields(FieldsArgs { json: false }),
            }),
        )
        .await
        .unwrap();
        assert!(out.contains("flow_options"));
    }

    #[tokio::test]
    async fn config_convert_maps_and_relativizes() {
        let fx = Fixture::new(ScriptedRunner::new());
        let input = fx.dir.path().join("in.yaml");
        std::fs::write(
            &input,
            "root: /Volumes/lab/session1\noutput_root: out\ngain: 2\n",
        )
        .unwrap();
        let output = fx.dir.path().join("out.yaml");

        run(
            &fx.ctx,
            Cmd::Config(ConfigArgs {
                cmd: ConfigCmd::Convert(ConvertArgs {
                    input,
                    output: output.clone(),
                    prefer_relative: true,
                    map_paths: true,
                }),
            }),
        )
        .await
        .unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("root: /bucket/lab/session1"));
        assert!(written.contains("output_root: out"));
        assert!(written.contains("gain: 2"));
    }
}
