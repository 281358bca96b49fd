use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{ResolvedSettings, load_config};

pub const CONFIG_FILENAME: &str = "gameid-redirect.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub config: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Runtime {
    pub config_path: PathBuf,
    pub config_source: ValueSource,
    pub config_exists: bool,
    pub settings: ResolvedSettings,
}

impl Runtime {
    pub fn diagnostics(&self) -> String {
        format!(
            "config_path={} ({}{})\n{}",
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            if self.config_exists { "" } else { ", missing" },
            self.settings.diagnostics()
        )
    }
}

/// Locate the config file, load it and resolve the final settings.
pub fn load_runtime(cwd: &Path, overrides: &RuntimeOverrides) -> Result<Runtime> {
    load_runtime_with_lookup(cwd, overrides, |key| env::var(key).ok())
}

pub fn load_runtime_with_lookup<F>(
    cwd: &Path,
    overrides: &RuntimeOverrides,
    lookup_env: F,
) -> Result<Runtime>
where
    F: Fn(&str) -> Option<String>,
{
    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("GAMEID_REDIRECT_CONFIG")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        (absolutize(Path::new(&value), cwd), ValueSource::Env)
    } else {
        (cwd.join(CONFIG_FILENAME), ValueSource::Default)
    };

    let config = load_config(&config_path)?;
    let base_dir = config_path.parent().unwrap_or(cwd);
    let mut settings = config
        .resolve_with_lookup(base_dir, &lookup_env)
        .with_context(|| format!("failed to resolve settings from {}", config_path.display()))?;
    if let Some(db_path) = overrides.db_path.as_deref() {
        settings.store.db_path = absolutize(db_path, cwd);
    }

    Ok(Runtime {
        config_exists: config_path.exists(),
        config_path,
        config_source,
        settings,
    })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
