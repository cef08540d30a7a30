// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};

use crate::app::services::listing::{DEFAULT_SHALLOW_DEPTH, DEFAULT_SHALLOW_LIMIT};
use crate::app::usecases::DEFAULT_TAIL_LINES;

#[derive(Parser, Debug)]
#[command(
    name = "flowrun",
    version,
    about = "Stage, submit and monitor motion-correction sessions on a remote Slurm cluster",
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < FLOWRUN_CONFIG_PATH < command-line flags.\n\
If --config is omitted, flowrun tries FLOWRUN_CONFIG_PATH, then the default config file location; missing default config is OK.\n\
Paths in the config file are resolved relative to the config file directory; paths passed as flags are resolved relative to the current working directory.\n\
All remote access goes through the system ssh/rsync with BatchMode; configure keys and host aliases in ~/.ssh/config."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, flowrun uses FLOWRUN_CONFIG_PATH if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Path to the JSON run-state file. Overrides `state_path` from the config file."
    )]
    pub state_path: Option<PathBuf>,
    #[arg(
        long = "host",
        global = true,
        value_name = "ALIAS",
        help = "ssh host alias of the cluster login node. Overrides `profile.host_alias` from the config file."
    )]
    pub host_alias: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Remote directory that holds run directories. Overrides `profile.remote_base_dir` from the config file."
    )]
    pub remote_base_dir: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "N",
        help = "Stage-1 array size used when no local inputs are found. Overrides `fallback_array_tasks` from the config file."
    )]
    pub fallback_array_tasks: Option<u32>,
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Directory that receives local upload bundles. Overrides `bundle_root` from the config file; defaults to the system temp dir."
    )]
    pub bundle_root: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging and include logs from dependencies. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Check that the cluster accepts a non-interactive ssh login.
    TestSsh,
    /// Translate a local path through the configured path mappings.
    MapPath(MapPathArgs),
    /// List the subdirectories of one remote directory.
    Ls(LsArgs),
    /// List remote directories up to a depth, in lexicographic order.
    Dirs(DirsArgs),
    /// Stage a session config and the Stage-1 script in a new remote run directory.
    Upload(UploadArgs),
    /// Submit the Stage-1 array and the dependent Stage-2/3 job.
    Submit(SubmitArgs),
    /// Show the queue and accounting rows of the current run's jobs.
    Status,
    /// Print the tail of the newest Slurm log in the run directory.
    Logs(LogsArgs),
    /// Cancel the current run's jobs, or the given job ids.
    Cancel(CancelArgs),
    /// Print the stored run state.
    Show(ShowArgs),
    /// Inspect and convert session config files.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct MapPathArgs {
    pub path: String,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Remote directory; `~` when omitted.
    pub path: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DirsArgs {
    /// Start directory; the profile's base dir when omitted.
    pub start: Option<String>,
    #[arg(long, default_value_t = DEFAULT_SHALLOW_DEPTH)]
    pub depth: u32,
    #[arg(long, default_value_t = DEFAULT_SHALLOW_LIMIT)]
    pub limit: u32,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Session config (YAML) describing the inputs and outputs.
    #[arg(long, value_name = "PATH")]
    pub session: PathBuf,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Upload this session first when the stored run is not staged.
    #[arg(long, value_name = "PATH")]
    pub session: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    #[arg(long, short = 'n', default_value_t = DEFAULT_TAIL_LINES)]
    pub lines: u32,
}

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Job ids to cancel instead of the run's own; commas also separate ids.
    #[arg(value_delimiter = ',')]
    pub job_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// List the session config fields and their defaults.
    Fields(FieldsArgs),
    /// Load a session config and write it back out normalized.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
pub struct FieldsArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Write paths under the root relative to it.
    #[arg(long)]
    pub prefer_relative: bool,
    /// Apply the configured path mappings before writing.
    #[arg(long)]
    pub map_paths: bool,
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

const HELP_TEMPLATE: &str = r#"  __ _
 / _| | _____      ___ __ _   _ _ __
| |_| |/ _ \ \ /\ / / '__| | | | '_ \
|  _| | (_) \ V  V /| |  | |_| | | | |
|_| |_|\___/ \_/\_/ |_|   \__,_|_| |_|

{before-help}{about-with-newline}{usage-heading} {usage}
{after-help}

{all-args}
"#;

fn apply_help_template_recursively(cmd: &mut clap::Command) {
    let mut owned = std::mem::take(cmd);
    owned = owned.help_template(HELP_TEMPLATE);
    for sub in owned.get_subcommands_mut() {
        apply_help_template_recursively(sub);
    }
    *cmd = owned;
}

pub fn cli_command() -> clap::Command {
    let mut cmd = Opts::command();
    apply_help_template_recursively(&mut cmd);
    cmd
}

pub fn parse_opts() -> ParsedOpts {
    let matches = cli_command().get_matches();
    parsed_from_matches(&matches).unwrap_or_else(|err| err.exit())
}

fn parsed_from_matches(matches: &clap::ArgMatches) -> Result<ParsedOpts, clap::Error> {
    // Absent flag means "defer to the config file", not "false".
    let verbose_override = matches.get_flag("verbose").then_some(true);
    let opts = Opts::from_arg_matches(matches)?;
    Ok(ParsedOpts {
        opts,
        verbose_override,
    })
}
