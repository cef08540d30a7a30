// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::app::types::{
    DEFAULT_HOST_ALIAS, DEFAULT_REMOTE_BASE_DIR, PathMapping, RemoteProfile, SbatchDefaults,
};
use crate::app::usecases::DEFAULT_FALLBACK_ARRAY_TASKS;

const APP_DIR_NAME: &str = "flowrun";
const CONFIG_FILE_NAME: &str = "flowrun.toml";
const CONFIG_ENV_VAR: &str = "FLOWRUN_CONFIG_PATH";
const STATE_FILE_NAME: &str = "run_state.json";

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    state_path: Option<String>,
    bundle_root: Option<String>,
    fallback_array_tasks: Option<u32>,
    verbose: Option<bool>,
    #[serde(default)]
    profile: FileProfile,
    #[serde(default)]
    path_mappings: Vec<PathMapping>,
}

#[derive(Debug, Default, Deserialize)]
struct FileProfile {
    host_alias: Option<String>,
    remote_base_dir: Option<String>,
    env_activation_cmd: Option<String>,
    sbatch: Option<SbatchDefaults>,
}

#[derive(Debug)]
pub struct Config {
    pub state_path: PathBuf,
    /// Parent of the per-upload bundle directories; system temp dir when unset.
    pub bundle_root: Option<PathBuf>,
    pub fallback_array_tasks: u32,
    pub verbose: bool,
    pub profile: RemoteProfile,
    pub path_mappings: Vec<PathMapping>,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub state_path: ConfigValue<PathBuf>,
    pub fallback_array_tasks: ConfigValue<u32>,
    pub verbose: ConfigValue<bool>,
    pub host_alias: ConfigValue<String>,
    pub remote_base_dir: ConfigValue<String>,
    pub path_mappings: ConfigValue<usize>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub state_path: Option<PathBuf>,
    pub bundle_root: Option<PathBuf>,
    pub fallback_array_tasks: Option<u32>,
    pub verbose: Option<bool>,
    pub host_alias: Option<String>,
    pub remote_base_dir: Option<String>,
}

/// First of override, config file, default; with where it came from.
fn layered<T>(
    override_value: Option<T>,
    file_value: Option<T>,
    default: impl FnOnce() -> Result<T>,
) -> Result<(T, ConfigSource)> {
    match (override_value, file_value) {
        (Some(value), _) => Ok((value, ConfigSource::Override)),
        (None, Some(value)) => Ok((value, ConfigSource::ConfigFile)),
        (None, None) => Ok((default()?, ConfigSource::Default)),
    }
}

#[cfg(test)]
pub fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path
        .as_deref()
        .map(|path| path.exists())
        .unwrap_or(false);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };
    let config_dir = config_path.as_deref().and_then(|path| path.parent());

    let (state_path, state_source) = layered(
        overrides.state_path.map(expand_path),
        file_config
            .state_path
            .as_deref()
            .map(|raw| resolve_path(raw, config_dir)),
        || {
            default_state_path().with_context(|| {
                "failed to resolve default state path; specify --state-path or set state_path in the config file"
            })
        },
    )?;

    let bundle_root = match overrides.bundle_root {
        Some(path) => Some(expand_path(path)),
        None => file_config
            .bundle_root
            .as_deref()
            .map(|raw| resolve_path(raw, config_dir)),
    };

    let (fallback_array_tasks, fallback_source) = layered(
        overrides.fallback_array_tasks,
        file_config.fallback_array_tasks,
        || Ok(DEFAULT_FALLBACK_ARRAY_TASKS),
    )?;
    if fallback_array_tasks == 0 {
        anyhow::bail!("fallback_array_tasks must be at least 1");
    }

    let (verbose, verbose_source) =
        layered(overrides.verbose, file_config.verbose, || Ok(false))?;

    let file_profile = file_config.profile;
    let (host_alias, host_source) = layered(
        overrides.host_alias.filter(|v| !v.trim().is_empty()),
        file_profile.host_alias.filter(|v| !v.trim().is_empty()),
        || Ok(DEFAULT_HOST_ALIAS.to_string()),
    )?;
    let (remote_base_dir, base_dir_source) = layered(
        overrides.remote_base_dir.filter(|v| !v.trim().is_empty()),
        file_profile.remote_base_dir.filter(|v| !v.trim().is_empty()),
        || Ok(DEFAULT_REMOTE_BASE_DIR.to_string()),
    )?;
    let sbatch = file_profile.sbatch.unwrap_or_default();
    if sbatch.cpus == 0 {
        anyhow::bail!("profile.sbatch.cpus must be at least 1");
    }
    let profile = RemoteProfile {
        host_alias,
        remote_base_dir,
        env_activation_cmd: file_profile.env_activation_cmd.unwrap_or_default(),
        sbatch,
    }
    .normalized();

    let path_mappings = file_config.path_mappings;
    let mappings_source = if path_mappings.is_empty() {
        ConfigSource::Default
    } else {
        ConfigSource::ConfigFile
    };

    let config = Config {
        state_path,
        bundle_root,
        fallback_array_tasks,
        verbose,
        profile,
        path_mappings,
        config_path: config_path.clone(),
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        state_path: ConfigValue {
            value: config.state_path.clone(),
            source: state_source,
        },
        fallback_array_tasks: ConfigValue {
            value: config.fallback_array_tasks,
            source: fallback_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
        host_alias: ConfigValue {
            value: config.profile.host_alias.clone(),
            source: host_source,
        },
        remote_base_dir: ConfigValue {
            value: config.profile.remote_base_dir.clone(),
            source: base_dir_source,
        },
        path_mappings: ConfigValue {
            value: config.path_mappings.len(),
            source: mappings_source,
        },
    };

    Ok(LoadResult { config, report })
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_state_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME).join(STATE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn clear(key: &'static str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                match &self.prev {
                    Some(value) => std::env::set_var(self.key, value),
                    None => std::env::remove_var(self.key),
                }
            }
        }
    }

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let config_dir = dir.join("config");
        fs::create_dir_all(&config_dir).unwrap();
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, contents).unwrap();
        config_path
    }

    #[test]
    fn missing_optional_config_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let cfg = read_config_file(&dir.path().join("missing.toml"), false).unwrap();
        assert!(cfg.state_path.is_none());
        assert!(cfg.path_mappings.is_empty());
    }

    #[test]
    fn missing_required_config_file_errors() {
        let dir = TempDir::new().unwrap();
        let err = read_config_file(&dir.path().join("missing.toml"), true).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn reads_profile_and_mappings() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            dir.path(),
            r#"
state_path = "state/run.json"
fallback_array_tasks = 512

[profile]
host_alias = "cluster-login"
remote_base_dir = "/flash/runs/"
env_activation_cmd = "module load python"

[profile.sbatch]
partition = "compute"
time = "04:00:00"
cpus = 8

[[path_mappings]]
local_prefix = "/Volumes/lab"
remote_prefix = "/bucket/lab"
"#,
        );

        let LoadResult { config, report } =
            load_with_report(Some(config_path.clone()), Overrides::default()).unwrap();
        let config_dir = config_path.parent().unwrap();
        assert_eq!(config.state_path, config_dir.join("state").join("run.json"));
        assert_eq!(config.fallback_array_tasks, 512);
        assert_eq!(config.profile.host_alias, "cluster-login");
        assert_eq!(config.profile.remote_base_dir, "/flash/runs/");
        assert_eq!(config.profile.env_activation_cmd, "module load python");
        assert_eq!(config.profile.sbatch.partition, "compute");
        assert_eq!(config.profile.sbatch.cpus, 8);
        assert_eq!(config.profile.sbatch.gpus, 0);
        assert_eq!(
            config.path_mappings,
            vec![PathMapping::new("/Volumes/lab", "/bucket/lab")]
        );
        assert_eq!(report.host_alias.source, ConfigSource::ConfigFile);
        assert_eq!(report.path_mappings.value, 1);
    }

    #[test]
    fn defaults_apply_when_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(dir.path(), "");
        let LoadResult { config, report } =
            load_with_report(Some(config_path), Overrides::default()).unwrap();
        assert_eq!(config.profile, RemoteProfile::default());
        assert_eq!(config.fallback_array_tasks, DEFAULT_FALLBACK_ARRAY_TASKS);
        assert!(!config.verbose);
        assert!(config.bundle_root.is_none());
        assert_eq!(report.fallback_array_tasks.source, ConfigSource::Default);
        assert_eq!(report.remote_base_dir.source, ConfigSource::Default);
    }

    #[test]
    fn cli_overrides_take_precedence_over_file_config() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            dir.path(),
            "state_path = \"from_config.json\"\nverbose = false\nfallback_array_tasks = 64\n\n[profile]\nhost_alias = \"from-file\"\n",
        );

        let LoadResult { config, report } = load_with_report(
            Some(config_path),
            Overrides {
                state_path: Some(PathBuf::from("from_flag.json")),
                verbose: Some(true),
                fallback_array_tasks: Some(8),
                host_alias: Some("from-flag".to_string()),
                ..Overrides::default()
            },
        )
        .unwrap();

        assert_eq!(config.state_path, PathBuf::from("from_flag.json"));
        assert!(config.verbose);
        assert_eq!(config.fallback_array_tasks, 8);
        assert_eq!(config.profile.host_alias, "from-flag");
        assert_eq!(report.host_alias.source, ConfigSource::Override);
    }

    #[test]
    fn blank_host_override_falls_through_to_file() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(dir.path(), "[profile]\nhost_alias = \"from-file\"\n");
        let config = load(
            Some(config_path),
            Overrides {
                host_alias: Some("  ".to_string()),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(config.profile.host_alias, "from-file");
    }

    #[test]
    fn zero_fallback_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(dir.path(), "fallback_array_tasks = 0\n");
        let err = load(Some(config_path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("fallback_array_tasks"));
    }

    #[test]
    fn zero_cpus_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(dir.path(), "[profile.sbatch]\ncpus = 0\n");
        let err = load(Some(config_path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("cpus"));
    }

    #[test]
    fn bundle_root_resolves_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(dir.path(), "bundle_root = \"bundles\"\n");
        let config = load(Some(config_path.clone()), Overrides::default()).unwrap();
        assert_eq!(
            config.bundle_root,
            Some(config_path.parent().unwrap().join("bundles"))
        );
    }

    #[test]
    fn env_config_path_used_when_no_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("flowrun.toml");
        fs::write(&config_path, "fallback_array_tasks = 99\n").unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, config_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(None, Overrides::default()).unwrap();
        assert_eq!(config.fallback_array_tasks, 99);
        assert_eq!(config.config_path, Some(config_path));
        assert_eq!(report.config_path_source, Some(ConfigSource::Env));
    }

    #[test]
    fn cli_config_path_takes_precedence_over_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("env.toml");
        let cli_path = dir.path().join("cli.toml");
        fs::write(&env_path, "fallback_array_tasks = 1\n").unwrap();
        fs::write(&cli_path, "fallback_array_tasks = 2\n").unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, env_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(Some(cli_path.clone()), Overrides::default()).unwrap();
        assert_eq!(config.fallback_array_tasks, 2);
        assert_eq!(config.config_path, Some(cli_path));
        assert_eq!(report.config_path_source, Some(ConfigSource::Override));
    }

    #[test]
    fn empty_env_config_path_errors() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, "");
        let err = load_with_report(None, Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("set but empty"));
    }
}
