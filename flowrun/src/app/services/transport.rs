// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::CommandRunnerPort;
use crate::app::services::shell::sh_escape;
use crate::app::types::CommandOutput;

const SSH_BATCH_MODE: [&str; 2] = ["-o", "BatchMode=yes"];
const RSYNC_REMOTE_SHELL: &str = "ssh -o BatchMode=yes";
const SSH_AUTH_FAILURE_EXIT: i32 = 255;
const HOST_KEY_FAILURE: &str = "Host key verification failed";

/// Single non-interactive gateway to the cluster. No retries.
#[derive(Clone)]
pub struct Transport {
    runner: Arc<dyn CommandRunnerPort>,
}

impl Transport {
    pub fn new(runner: Arc<dyn CommandRunnerPort>) -> Self {
        Self { runner }
    }

    /// Runs `argv` and returns its trimmed stdout. A non-zero exit becomes an
    /// error carrying the command line and the captured error text.
    pub async fn run(&self, argv: &[String]) -> AppResult<String> {
        tracing::debug!(command = %argv.join(" "), "running command");
        let output = self.runner.run(argv).await?;
        if output.exit_code != 0 {
            let err = classify_failure(argv, &output);
            tracing::debug!(exit_code = output.exit_code, code = err.code(), "command failed");
            return Err(err);
        }
        Ok(output.stdout.trim().to_string())
    }

    pub async fn ssh(&self, host_alias: &str, remote_command: &str) -> AppResult<String> {
        self.run(&ssh_argv(host_alias, remote_command)).await
    }

    pub async fn rsync(&self, local: &str, host_alias: &str, remote_path: &str) -> AppResult<String> {
        self.run(&rsync_argv(local, host_alias, remote_path)).await
    }
}

/// `ssh -o BatchMode=yes <host> "sh -lc <quoted>"`; the login shell picks up
/// the user's module/conda environment on the cluster.
pub fn ssh_argv(host_alias: &str, remote_command: &str) -> Vec<String> {
    let mut argv = vec!["ssh".to_string()];
    argv.extend(SSH_BATCH_MODE.map(str::to_string));
    argv.push(host_alias.to_string());
    argv.push(format!("sh -lc {}", sh_escape(remote_command)));
    argv
}

/// `rsync -az -e "ssh -o BatchMode=yes" <local> <host>:<path>`.
pub fn rsync_argv(local: &str, host_alias: &str, remote_path: &str) -> Vec<String> {
    vec![
        "rsync".to_string(),
        "-az".to_string(),
        "-e".to_string(),
        RSYNC_REMOTE_SHELL.to_string(),
        local.to_string(),
        format!("{host_alias}:{remote_path}"),
    ]
}

/// Builds the error for a command that exited non-zero. ssh exit 255 means
/// connection or authentication failed before the remote command ran, which
/// under BatchMode is almost always a prompt that could not be shown. rsync
/// passes its remote shell's 255 through unchanged.
pub fn classify_failure(argv: &[String], output: &CommandOutput) -> AppError {
    let error_output = match output.stderr.trim() {
        "" => output.stdout.trim(),
        stderr => stderr,
    };
    let command = argv.join(" ");

    let host = match argv.first().map(String::as_str) {
        Some("ssh") => Some(extract_ssh_host(argv)),
        Some("rsync") => Some(extract_rsync_host(argv)),
        _ => None,
    };
    if let Some(host) = host.filter(|_| output.exit_code == SSH_AUTH_FAILURE_EXIT) {
        let hint = ssh_remediation(host, error_output);
        let combined = [error_output, hint.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        return AppError::with_message(
            AppErrorKind::Transport,
            codes::SSH_NON_INTERACTIVE,
            format!("Command failed: {command}\n{}", combined.trim()),
        );
    }

    AppError::with_message(
        AppErrorKind::Transport,
        codes::COMMAND_FAILED,
        format!("Command failed: {command}\n{error_output}"),
    )
}

fn ssh_remediation(host_alias: &str, error_output: &str) -> String {
    let login_test =
        format!("ssh -o StrictHostKeyChecking=accept-new {host_alias} \"echo connected\"");
    let mut lines = vec![
        "SSH interactive prompts are disabled (BatchMode=yes).".to_string(),
        String::new(),
        "Run one of these once in a terminal, then retry:".to_string(),
        format!("1) Accept key + test login: {login_test}"),
    ];
    if error_output.contains(HOST_KEY_FAILURE) {
        lines.push(format!(
            "2) If key changed, clear stale key: ssh-keygen -R {host_alias}"
        ));
        lines.push(format!("3) Retry login test: {login_test}"));
    }
    lines.join("\n")
}

/// Host alias of an argv built by `ssh_argv`: the token before the command.
fn extract_ssh_host(argv: &[String]) -> &str {
    if argv.len() >= 3 && !argv[argv.len() - 2].starts_with('-') {
        return &argv[argv.len() - 2];
    }
    argv.get(1).map_or("<host>", String::as_str)
}

/// Host alias of an argv built by `rsync_argv`: the `<host>:` of the target.
fn extract_rsync_host(argv: &[String]) -> &str {
    argv.last()
        .and_then(|target| target.split_once(':'))
        .map_or("<host>", |(host, _)| host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::ScriptedRunner;

    #[test]
    fn ssh_argv_wraps_command_in_login_shell() {
        assert_eq!(
            ssh_argv("deigo", "echo 'hi'"),
            vec![
                "ssh",
                "-o",
                "BatchMode=yes",
                "deigo",
                "sh -lc 'echo '\\''hi'\\'''",
            ]
        );
    }

    #[test]
    fn rsync_argv_uses_batch_mode_shell() {
        assert_eq!(
            rsync_argv("/tmp/b/", "deigo", "~/runs/r1/"),
            vec![
                "rsync",
                "-az",
                "-e",
                "ssh -o BatchMode=yes",
                "/tmp/b/",
                "deigo:~/runs/r1/"
            ]
        );
    }

    #[tokio::test]
    async fn run_returns_trimmed_stdout() {
        let runner = Arc::new(ScriptedRunner::new().ok("  connected\n"));
        let transport = Transport::new(runner.clone());
        let out = transport.ssh("deigo", "echo connected").await.unwrap();
        assert_eq!(out, "connected");
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn generic_failure_keeps_command_and_stderr() {
        let runner = Arc::new(ScriptedRunner::new().fail(23, "rsync: connection reset\n"));
        let transport = Transport::new(runner);
        let err = transport
            .rsync("/tmp/b/", "deigo", "/scratch/r1/")
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::COMMAND_FAILED);
        assert_eq!(err.kind(), AppErrorKind::Transport);
        assert_eq!(
            err.message(),
            "Command failed: rsync -az -e ssh -o BatchMode=yes /tmp/b/ deigo:/scratch/r1/\nrsync: connection reset"
        );
    }

    #[test]
    fn failure_falls_back_to_stdout() {
        let argv = rsync_argv("a", "h", "b");
        let err = classify_failure(&argv, &crate::app::test_support::output("oops\n", " ", 1));
        assert!(err.message().ends_with("\noops"));
    }

    #[test]
    fn ssh_255_names_host_and_omits_key_reset() {
        let argv = ssh_argv("cluster-login", "echo connected");
        let err = classify_failure(
            &argv,
            &crate::app::test_support::output("", "Permission denied (publickey).", 255),
        );
        assert_eq!(err.code(), codes::SSH_NON_INTERACTIVE);
        let msg = err.message();
        assert!(msg.starts_with("Command failed: ssh -o BatchMode=yes cluster-login "));
        assert!(msg.contains("Permission denied (publickey).\nSSH interactive prompts are disabled"));
        assert!(msg.contains(
            "1) Accept key + test login: ssh -o StrictHostKeyChecking=accept-new cluster-login \"echo connected\""
        ));
        assert!(!msg.contains("ssh-keygen"));
    }

    #[test]
    fn ssh_255_host_key_failure_adds_reset_steps() {
        let argv = ssh_argv("deigo", "squeue");
        let err = classify_failure(
            &argv,
            &crate::app::test_support::output("", "Host key verification failed.\n", 255),
        );
        let msg = err.message();
        let step2 = msg
            .find("2) If key changed, clear stale key: ssh-keygen -R deigo")
            .unwrap();
        let step3 = msg
            .find("3) Retry login test: ssh -o StrictHostKeyChecking=accept-new deigo")
            .unwrap();
        assert!(step2 < step3);
    }

    #[test]
    fn rsync_255_gets_ssh_remediation() {
        let argv = rsync_argv("/tmp/b/", "cluster-login", "~/runs/r1/");
        let err = classify_failure(
            &argv,
            &crate::app::test_support::output(
                "",
                "Host key verification failed.\nrsync: connection unexpectedly closed",
                255,
            ),
        );
        assert_eq!(err.code(), codes::SSH_NON_INTERACTIVE);
        let msg = err.message();
        assert!(msg.contains(
            "1) Accept key + test login: ssh -o StrictHostKeyChecking=accept-new cluster-login \"echo connected\""
        ));
        assert!(msg.contains("ssh-keygen -R cluster-login"));
    }

    #[test]
    fn rsync_partial_transfer_is_generic() {
        let argv = rsync_argv("a", "deigo", "b");
        let err = classify_failure(
            &argv,
            &crate::app::test_support::output("", "rsync error: some files could not be transferred", 23),
        );
        assert_eq!(err.code(), codes::COMMAND_FAILED);
    }

    #[test]
    fn other_programs_255_is_generic() {
        let argv = vec!["sbatch".to_string(), "job.sh".to_string()];
        let err = classify_failure(
            &argv,
            &crate::app::test_support::output("", "Host key verification failed.", 255),
        );
        assert_eq!(err.code(), codes::COMMAND_FAILED);
        assert!(!err.message().contains("BatchMode"));
    }
}
