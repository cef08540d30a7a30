// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::types::RunPhase;

const SUBMITTED_MARKER: &str = "Submitted batch job ";

pub const SQUEUE_FORMAT: &str = "'%i %T %M %R'";
pub const SACCT_FORMAT: &str = "JobID,State,Elapsed,MaxRSS";

/// Extracts the job id from `sbatch` output such as "Submitted batch job 11".
pub fn parse_job_id(output: &str) -> Option<String> {
    output.match_indices(SUBMITTED_MARKER).find_map(|(idx, _)| {
        let digits: String = output[idx + SUBMITTED_MARKER.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        (!digits.is_empty()).then_some(digits)
    })
}

/// One allocation row of `sacct --noheader` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SacctRow {
    pub job_id: String,
    pub state: String,
}

impl SacctRow {
    /// Job id without the array task suffix (`123_4` -> `123`).
    pub fn base_job_id(&self) -> &str {
        self.job_id
            .split_once('_')
            .map_or(self.job_id.as_str(), |(base, _)| base)
    }
}

/// Parses whitespace separated `JobID State ...` rows. Step rows
/// (`123.batch`, `123_4.extern`) are skipped.
pub fn parse_sacct_rows(output: &str) -> Vec<SacctRow> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let job_id = cols.next()?;
            let state = cols.next()?;
            if job_id.contains('.') {
                return None;
            }
            Some(SacctRow {
                job_id: job_id.to_string(),
                state: normalize_slurm_state(state),
            })
        })
        .collect()
}

/// Terminal phase implied by the accounting rows of the two run jobs, if any.
///
/// A cancellation anywhere wins, then any other failure. Completion needs
/// rows for the Stage-2/3 job and every row of both jobs `COMPLETED`.
pub fn derive_phase(
    rows: &[SacctRow],
    stage1_job_id: &str,
    stage23_job_id: Option<&str>,
) -> Option<RunPhase> {
    let relevant: Vec<&SacctRow> = rows
        .iter()
        .filter(|row| {
            let base = row.base_job_id();
            base == stage1_job_id || stage23_job_id == Some(base)
        })
        .collect();
    if relevant.is_empty() {
        return None;
    }

    if relevant.iter().any(|row| row.state == "CANCELLED") {
        return Some(RunPhase::Cancelled);
    }
    if relevant
        .iter()
        .any(|row| is_slurm_state_terminal(&row.state) && row.state != "COMPLETED")
    {
        return Some(RunPhase::Failed);
    }

    let stage23 = stage23_job_id?;
    let stage23_seen = relevant.iter().any(|row| row.base_job_id() == stage23);
    if stage23_seen && relevant.iter().all(|row| row.state == "COMPLETED") {
        return Some(RunPhase::Completed);
    }
    None
}

fn normalize_slurm_state(state: &str) -> String {
    let token = state
        .split(['+', ':', '('])
        .next()
        .unwrap_or(state)
        .trim();
    token.to_ascii_uppercase()
}

fn is_slurm_state_terminal(state: &str) -> bool {
    matches!(
        state,
        "COMPLETED"
            | "CANCELLED"
            | "FAILED"
            | "TIMEOUT"
            | "NODE_FAIL"
            | "PREEMPTED"
            | "BOOT_FAIL"
            | "OUT_OF_MEMORY"
            | "DEADLINE"
            | "SPECIAL_EXIT"
            | "REVOKED"
    )
}
