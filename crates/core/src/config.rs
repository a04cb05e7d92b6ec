use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceCheckError};
use crate::report::FindingKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Sample rows shown per finding class in human output.
    pub max_examples: usize,
    pub top_edges: usize,
    pub tree_examples: usize,
    pub flag_cross_trace: bool,
    /// Finding kinds that make a report unclean.
    pub fail_on: Vec<FindingKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_examples: 10,
            top_edges: 10,
            tree_examples: 5,
            flag_cross_trace: true,
            fail_on: FindingKind::ALL.to_vec(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    max_examples: Option<usize>,
    top_edges: Option<usize>,
    tree_examples: Option<usize>,
    flag_cross_trace: Option<bool>,
    fail_on: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("TRACECHECK_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("tracecheck/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| TraceCheckError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| TraceCheckError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn env_parsed<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TraceCheckError::Config(format!("bad {key} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        max_examples: env_parsed("TRACECHECK_MAX_EXAMPLES")?,
        top_edges: env_parsed("TRACECHECK_TOP_EDGES")?,
        tree_examples: env_parsed("TRACECHECK_TREE_EXAMPLES")?,
        flag_cross_trace: env_parsed("TRACECHECK_FLAG_CROSS_TRACE")?,
        fail_on: env::var("TRACECHECK_FAIL_ON").ok(),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.max_examples {
        cfg.max_examples = v;
    }
    if let Some(v) = overrides.top_edges {
        cfg.top_edges = v;
    }
    if let Some(v) = overrides.tree_examples {
        cfg.tree_examples = v;
    }
    if let Some(v) = overrides.flag_cross_trace {
        cfg.flag_cross_trace = v;
    }
    if let Some(v) = overrides.fail_on {
        cfg.fail_on = parse_fail_on(&v).map_err(|e| {
            TraceCheckError::Config(format!("bad fail_on in {source}: {e} (value={v})"))
        })?;
    }
    Ok(())
}

/// Comma separated finding kinds; `all` and `none` are accepted shorthands.
pub fn parse_fail_on(raw: &str) -> Result<Vec<FindingKind>> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("all") {
        return Ok(FindingKind::ALL.to_vec());
    }
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in trimmed.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let kind = FindingKind::from_str(entry)?;
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    Ok(out)
}
