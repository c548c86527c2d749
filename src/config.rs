#![forbid(unsafe_code)]

//! Runtime settings shared by the tubescan binaries.
//!
//! Values are layered: explicit overrides (command-line flags) win over the
//! process environment, which wins over the `.env` file, which wins over the
//! built-in defaults. Blank values never count as "set".

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::pipeline::PipelineOptions;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_MAX_CONTINUATIONS: usize = 10;
pub const DEFAULT_FETCH_WORKERS: usize = 1;
pub const MAX_FETCH_WORKERS: usize = 16;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TRANSCRIPT_LANG: &str = "en";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
pub const DEFAULT_CLIENT_VERSION: &str = "2.20241126.01.00";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub max_continuations: usize,
    pub fetch_workers: usize,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub client_version: String,
    pub transcripts: bool,
    pub transcript_lang: String,
    pub enrich: bool,
}

impl Settings {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            max_continuations: self.max_continuations,
            fetch_workers: self.fetch_workers,
            enrich: self.enrich,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub fetch_workers: Option<usize>,
    pub transcripts: Option<bool>,
    pub enrich: Option<bool>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Settings {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);
    let parsed = |key: &str| lookup(key).and_then(|value| value.parse::<u64>().ok());

    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("TUBESCAN_HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| lookup("TUBESCAN_PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_PORT);
    let max_continuations = parsed("TUBESCAN_MAX_CONTINUATIONS")
        .map(|value| value as usize)
        .unwrap_or(DEFAULT_MAX_CONTINUATIONS);
    let fetch_workers = overrides
        .fetch_workers
        .or_else(|| parsed("TUBESCAN_FETCH_WORKERS").map(|value| value as usize))
        .unwrap_or(DEFAULT_FETCH_WORKERS)
        .clamp(1, MAX_FETCH_WORKERS);
    let http_timeout = parsed("TUBESCAN_HTTP_TIMEOUT_SECS")
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
    let user_agent = lookup("TUBESCAN_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.into());
    let client_version =
        lookup("TUBESCAN_CLIENT_VERSION").unwrap_or_else(|| DEFAULT_CLIENT_VERSION.into());
    let transcripts = overrides
        .transcripts
        .or_else(|| lookup("TUBESCAN_TRANSCRIPTS").and_then(|value| parse_flag(&value)))
        .unwrap_or(true);
    let transcript_lang =
        lookup("TUBESCAN_TRANSCRIPT_LANG").unwrap_or_else(|| DEFAULT_TRANSCRIPT_LANG.into());
    let enrich = overrides
        .enrich
        .or_else(|| lookup("TUBESCAN_ENRICH").and_then(|value| parse_flag(&value)))
        .unwrap_or(true);

    Settings {
        host,
        port,
        max_continuations,
        fetch_workers,
        http_timeout,
        user_agent,
        client_version,
        transcripts,
        transcript_lang,
        enrich,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
