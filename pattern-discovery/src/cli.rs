//! Command-line argument definitions

use crate::analyzer::Mode;
use crate::config::{CliOverrides, ENV_MODEL, ENV_ROOT};
use anyhow::Result;
use clap::{Parser, Subcommand};
use pattern_discovery_sdk::AnalysisCategory;
use std::path::PathBuf;

/// Discover algorithms, design patterns and architectural patterns in a codebase
///
/// Prompts are composed from the pattern specifications and prompt templates
/// of a knowledge base and, with --execute, handed to an external AI coding
/// assistant. Without --execute the composed prompt is only shown.
#[derive(Parser, Debug, Clone)]
#[command(name = "pattern-discovery")]
#[command(about = "Discover code patterns with an external AI coding assistant")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory to analyze
    #[arg(short = 't', long, value_name = "DIR", default_value = ".", global = true)]
    pub target_path: PathBuf,

    /// Run the analysis through the external tool
    #[arg(short = 'e', long, global = true)]
    pub execute: bool,

    /// Show the composed prompts without running anything (wins over --execute)
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Model passed to the external tool [default: sonnet]
    #[arg(long, value_name = "MODEL", env = ENV_MODEL, global = true)]
    pub model: Option<String>,

    /// Seconds before a running analysis is killed [default: 300]
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Print output line by line while the tool runs
    #[arg(long, global = true)]
    pub stream: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip the confirmation prompt before executing
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Knowledge base root containing specs/ and prompts/
    #[arg(long, value_name = "DIR", env = ENV_ROOT, global = true)]
    pub root: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Analyze algorithms and data structures
    Algorithms,

    /// Analyze design patterns
    DesignPatterns,

    /// Analyze architectural patterns
    Architectural,

    /// Analyze cloud architecture patterns
    Cloud,

    /// Analyze several categories
    All {
        /// Categories to include, in order (default: all four)
        #[arg(long, value_name = "CATEGORY", value_delimiter = ',', num_args = 1..)]
        patterns: Vec<AnalysisCategory>,

        /// Combine every category into a single session
        #[arg(long)]
        chain: bool,
    },

    /// List the available pattern specifications
    ListSpecs,

    /// Show local usage of the external tool
    Usage,

    /// Check that the external tool is installed
    TestClaude,

    /// Start an interactive session with the external tool
    Session {
        /// Open the session with the full chained analysis prompt
        #[arg(long)]
        with_prompt: bool,
    },

    /// Scan for service collaboration patterns
    ServiceCollab,
}

impl Commands {
    /// The single category a verb maps to, if any
    pub fn category(&self) -> Option<AnalysisCategory> {
        match self {
            Commands::Algorithms => Some(AnalysisCategory::Algorithms),
            Commands::DesignPatterns => Some(AnalysisCategory::DesignPatterns),
            Commands::Architectural => Some(AnalysisCategory::Architectural),
            Commands::Cloud => Some(AnalysisCategory::Cloud),
            _ => None,
        }
    }

    /// Whether the verb hands the terminal to the external tool
    pub fn is_interactive(&self) -> bool {
        matches!(self, Commands::Session { .. })
    }
}

impl Args {
    pub fn mode(&self) -> Mode {
        Mode::from_flags(self.execute, self.dry_run)
    }

    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root: self.root.clone(),
            model: self.model.clone(),
            timeout_secs: self.timeout,
        }
    }

    /// Validate arguments that clap cannot check on its own
    pub fn validate(&self) -> Result<()> {
        if !self.target_path.exists() {
            anyhow::bail!(
                "Target path '{}' does not exist",
                self.target_path.display()
            );
        }
        if !self.target_path.is_dir() {
            anyhow::bail!(
                "Target path '{}' is not a directory",
                self.target_path.display()
            );
        }
        if self.timeout == Some(0) {
            anyhow::bail!("--timeout must be greater than zero");
        }
        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                anyhow::bail!("--model must not be empty");
            }
        }
        Ok(())
    }
}

/// Categories for `all`, defaulting to every category when none were given
pub fn selected_categories(patterns: &[AnalysisCategory]) -> Vec<AnalysisCategory> {
    if patterns.is_empty() {
        AnalysisCategory::ALL.to_vec()
    } else {
        patterns.to_vec()
    }
}
