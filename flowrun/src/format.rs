// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::session_config::{FieldDescriptor, ResolvedOutputPaths};
use crate::app::types::{RemoteDirectoryListing, RemoteRunState};

pub fn format_json(value: serde_json::Value) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&value)?)
}

fn str_width(value: &str) -> usize {
    value.chars().count()
}

/// Left-aligned columns separated by two spaces.
fn format_table<const N: usize>(headers: [&str; N], rows: &[[String; N]]) -> String {
    let mut widths = headers.map(str_width);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(str_width(cell));
        }
    }

    let render = |cells: Vec<&str>| {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        format!("{}\n", line.trim_end())
    };

    let mut output = render(headers.to_vec());
    for row in rows {
        output.push_str(&render(row.iter().map(String::as_str).collect()));
    }
    output
}

fn field_to_json(field: &FieldDescriptor) -> serde_json::Value {
    serde_json::json!({
        "name": field.name,
        "kind": field.kind.as_str(),
        "default": field.default,
        "optional": field.optional,
        "remote_mapped": field.remote_mapped,
    })
}

pub fn format_fields_table(fields: &[FieldDescriptor]) -> String {
    let rows: Vec<[String; 5]> = fields
        .iter()
        .map(|field| {
            [
                field.name.to_string(),
                field.kind.as_str().to_string(),
                field.default.unwrap_or("-").to_string(),
                if field.optional { "yes" } else { "no" }.to_string(),
                if field.remote_mapped { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    format_table(["field", "kind", "default", "optional", "mapped"], &rows)
}

pub fn format_fields_json(fields: &[FieldDescriptor]) -> anyhow::Result<String> {
    format_json(serde_json::Value::Array(
        fields.iter().map(field_to_json).collect(),
    ))
}

pub fn format_listing(listing: &RemoteDirectoryListing) -> String {
    let mut output = format!("{}\n", listing.path);
    for child in &listing.children {
        output.push_str(&format!("  {child}/\n"));
    }
    output
}

pub fn format_listing_json(listing: &RemoteDirectoryListing) -> anyhow::Result<String> {
    format_json(serde_json::to_value(listing)?)
}

pub fn format_lines_json(lines: &[String]) -> anyhow::Result<String> {
    format_json(serde_json::to_value(lines)?)
}

pub fn format_state(state: &RemoteRunState) -> String {
    let mut output = format!(
        "run: {}\nphase: {}\nremote_dir: {}\nlocal_bundle: {}\nconfig: {}\narray_tasks: {}\nstage1_job: {}\nstage23_job: {}\n",
        state.run_name.as_deref().unwrap_or("-"),
        state.phase.as_str(),
        state.remote_run_dir.as_deref().unwrap_or("-"),
        state
            .local_bundle_dir
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
        state.config_filename,
        state.num_tasks,
        state.stage1_job_id.as_deref().unwrap_or("-"),
        state.stage23_job_id.as_deref().unwrap_or("-"),
    );
    for warning in &state.upload_warnings {
        output.push_str(&format!("warning: {warning}\n"));
    }
    output
}

pub fn format_output_paths(paths: &ResolvedOutputPaths) -> String {
    format!(
        "output_root: {}\nfinal_results: {}\n",
        paths.output_root.display(),
        paths.final_results.display()
    )
}

pub fn format_state_json(state: &RemoteRunState) -> anyhow::Result<String> {
    format_json(serde_json::to_value(state)?)
}
