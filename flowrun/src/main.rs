// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::io::Write;

use flowrun::{adapters, commands, config, logging};

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), Some(source)) => {
            tracing::debug!(
                "config path: {} (source={}, present={})",
                path.display(),
                source.as_str(),
                report.config_file_present
            );
        }
        (Some(path), None) => {
            tracing::debug!(
                "config path: {} (present={})",
                path.display(),
                report.config_file_present
            );
        }
        (None, _) => {
            tracing::debug!("config path: (none)");
        }
    }
    tracing::debug!(
        "config state_path: {} (source={})",
        report.state_path.value.display(),
        report.state_path.source.as_str()
    );
    tracing::debug!(
        "config host_alias: {} (source={})",
        report.host_alias.value,
        report.host_alias.source.as_str()
    );
    tracing::debug!(
        "config remote_base_dir: {} (source={})",
        report.remote_base_dir.value,
        report.remote_base_dir.source.as_str()
    );
    tracing::debug!(
        "config fallback_array_tasks: {} (source={})",
        report.fallback_array_tasks.value,
        report.fallback_array_tasks.source.as_str()
    );
    tracing::debug!(
        "config path_mappings: {} (source={})",
        report.path_mappings.value,
        report.path_mappings.source.as_str()
    );
    tracing::debug!(
        "config verbose: {} (source={})",
        report.verbose.value,
        report.verbose.source.as_str()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = adapters::cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            state_path: opts.state_path,
            bundle_root: opts.bundle_root,
            fallback_array_tasks: opts.fallback_array_tasks,
            verbose: parsed.verbose_override,
            host_alias: opts.host_alias,
            remote_base_dir: opts.remote_base_dir,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);

    let ctx = commands::Context::from_config(&config);
    let output = commands::run(&ctx, opts.cmd).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
