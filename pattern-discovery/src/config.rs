//! Layered configuration
//!
//! Defaults, then `config.yaml`, then environment, then command-line flags.

use crate::rate_limit::RateLimits;
use crate::supervisor::{ToolCommand, DEFAULT_HEARTBEAT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_ROOT: &str = "PATTERN_DISCOVERY_ROOT";
pub const ENV_TOOL: &str = "PATTERN_DISCOVERY_TOOL";
pub const ENV_MODEL: &str = "PATTERN_DISCOVERY_MODEL";
pub const ENV_LOG: &str = "PATTERN_DISCOVERY_LOG";

const CONFIG_FILE: &str = "config.yaml";
const RATE_FILE: &str = "rate_limit.json";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "pattern-discovery")
}

/// Default location of `config.yaml`
pub fn config_file_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Default location of the persisted rate-limit record
pub fn default_rate_file() -> PathBuf {
    if let Some(dirs) = project_dirs() {
        dirs.data_dir().join(RATE_FILE)
    } else {
        PathBuf::from(".pattern-discovery-rate-limit.json")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Knowledge base root holding `specs/` and `prompts/`
    pub root: Option<PathBuf>,
    pub model: String,
    pub timeout_secs: u64,
    pub heartbeat_secs: u64,
    pub tool: ToolCommand,
    pub limits: RateLimits,
    pub rate_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: None,
            model: "sonnet".to_string(),
            timeout_secs: 300,
            heartbeat_secs: DEFAULT_HEARTBEAT.as_secs(),
            tool: ToolCommand::default(),
            limits: RateLimits::default(),
            rate_file: None,
        }
    }
}

/// Flag values that override everything else when present
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Read the config file
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match config_file_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment overrides through `lookup`
    ///
    /// `PATTERN_DISCOVERY_TOOL` names the program only, verbatim, so paths
    /// with spaces work. Arguments come from `tool.args` in the config file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = non_empty(ENV_ROOT) {
            self.root = Some(PathBuf::from(root));
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.model = model.trim().to_string();
        }
        if let Some(program) = non_empty(ENV_TOOL) {
            self.tool.program = program;
        }
    }

    pub fn apply_cli(&mut self, overrides: CliOverrides) {
        if let Some(root) = overrides.root {
            self.root = Some(root);
        }
        if let Some(model) = overrides.model {
            self.model = model;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.timeout_secs = timeout;
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn rate_file(&self) -> PathBuf {
        self.rate_file.clone().unwrap_or_else(default_rate_file)
    }

    /// Knowledge base root
    ///
    /// Without an explicit root, the first of the working directory and the
    /// source checkout the binary was built from that holds a `specs/`
    /// folder is used.
    pub fn knowledge_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }

        let cwd = std::env::current_dir().ok();
        let checkout = Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .map(Path::to_path_buf);

        find_knowledge_base(cwd.into_iter().chain(checkout)).ok_or_else(|| {
            anyhow::anyhow!(
                "Knowledge base not found (no specs/ directory). Pass --root or set {}",
                ENV_ROOT
            )
        })
    }
}

fn find_knowledge_base(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|dir| dir.join("specs").is_dir())
}
