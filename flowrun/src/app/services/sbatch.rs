// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::types::RemoteProfile;

const LOG_OUTPUT_PATTERN: &str = "slurm-%j.out";

/// Stage-1 array script: one task per discovered input, tasks past the end
/// of the remote discovery exit successfully without work.
pub fn generate_stage1_script(
    config_filename: &str,
    num_tasks: u32,
    profile: &RemoteProfile,
) -> String {
    let mut lines = common_header(profile);
    lines.push(format!("#SBATCH --array=1-{num_tasks}"));
    push_preamble(&mut lines, profile);

    let load = format!(
        "config = SessionConfig.from_file({})",
        python_str_literal(config_filename)
    );
    lines.extend(
        [
            "python - <<'PY'",
            "import os",
            "from pyflowreg.session.config import SessionConfig",
            "from pyflowreg.session.stage1_compensate import discover_input_files, run_stage1",
            load.as_str(),
            "task_index = int(os.environ['SLURM_ARRAY_TASK_ID']) - 1",
            "n_files = len(list(discover_input_files(config)))",
            "if task_index >= n_files:",
            "    print(f'Skipping task {task_index}: only {n_files} files discovered.')",
            "else:",
            "    run_stage1(config, task_index=task_index)",
            "PY",
            "",
        ]
        .map(str::to_string),
    );
    lines.join("\n")
}

/// Stage-2/3 script, held until every Stage-1 task finished successfully.
pub fn generate_stage2and3_script(
    config_filename: &str,
    stage1_job_id: &str,
    profile: &RemoteProfile,
) -> String {
    let mut lines = common_header(profile);
    lines.push(format!("#SBATCH --dependency=afterok:{stage1_job_id}"));
    push_preamble(&mut lines, profile);

    let load = format!(
        "config = SessionConfig.from_file({})",
        python_str_literal(config_filename)
    );
    lines.extend(
        [
            "python - <<'PY'",
            "from pyflowreg.session.config import SessionConfig",
            "from pyflowreg.session.stage2_between_avgs import run_stage2",
            "from pyflowreg.session.stage3_valid_mask import run_stage3",
            load.as_str(),
            "middle_idx, avg, displacements = run_stage2(config)",
            "del avg",
            "run_stage3(config, middle_idx, displacements)",
            "PY",
            "",
        ]
        .map(str::to_string),
    );
    lines.join("\n")
}

fn common_header(profile: &RemoteProfile) -> Vec<String> {
    let sbatch = &profile.sbatch;
    let mut lines = vec![
        "#!/bin/bash".to_string(),
        format!("#SBATCH -o {LOG_OUTPUT_PATTERN}"),
    ];
    if !sbatch.partition.is_empty() {
        lines.push(format!("#SBATCH --partition={}", sbatch.partition));
    }
    if !sbatch.time.is_empty() {
        lines.push(format!("#SBATCH --time={}", sbatch.time));
    }
    if !sbatch.mem.is_empty() {
        lines.push(format!("#SBATCH --mem={}", sbatch.mem));
    }
    if sbatch.cpus > 0 {
        lines.push(format!("#SBATCH --cpus-per-task={}", sbatch.cpus));
    }
    if sbatch.gpus > 0 {
        lines.push(format!("#SBATCH --gres=gpu:{}", sbatch.gpus));
    }
    lines
}

fn push_preamble(lines: &mut Vec<String>, profile: &RemoteProfile) {
    lines.push(String::new());
    lines.push("set -euo pipefail".to_string());
    if !profile.env_activation_cmd.is_empty() {
        lines.push(profile.env_activation_cmd.clone());
    }
}

fn python_str_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}
