// Re-export async trait for convenience
pub use async_trait::async_trait;

// Re-export the cancellation token used by runners
pub use tokio_util::sync::CancellationToken;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Placeholder substituted with the target path in every prompt template
pub const CODE_PATH_PLACEHOLDER: &str = "[CODE_PATH]";

// ============================================================================
// Analysis categories
// ============================================================================

/// Category of patterns the external tool is asked to look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisCategory {
    Algorithms,
    DesignPatterns,
    Architectural,
    Cloud,
}

impl AnalysisCategory {
    /// Every category, in the order `all` runs them
    pub const ALL: [AnalysisCategory; 4] = [
        AnalysisCategory::Algorithms,
        AnalysisCategory::DesignPatterns,
        AnalysisCategory::Architectural,
        AnalysisCategory::Cloud,
    ];

    /// Stable identifier used on the command line
    pub fn id(&self) -> &'static str {
        match self {
            AnalysisCategory::Algorithms => "algorithms",
            AnalysisCategory::DesignPatterns => "design-patterns",
            AnalysisCategory::Architectural => "architectural",
            AnalysisCategory::Cloud => "cloud",
        }
    }

    /// Human readable title for report headers
    pub fn title(&self) -> &'static str {
        match self {
            AnalysisCategory::Algorithms => "Algorithms & Data Structures",
            AnalysisCategory::DesignPatterns => "Design Patterns",
            AnalysisCategory::Architectural => "Architectural Patterns",
            AnalysisCategory::Cloud => "Cloud Architecture Patterns",
        }
    }

    /// Prompt template file under `prompts/`
    pub fn prompt_file(&self) -> &'static str {
        match self {
            AnalysisCategory::Algorithms => "algorithms-ds-prompt.md",
            AnalysisCategory::DesignPatterns => "design-patterns-prompt.md",
            AnalysisCategory::Architectural => "architectural-prompt.md",
            AnalysisCategory::Cloud => "cloud-architecture-prompt.md",
        }
    }

    /// Reference spec file under `specs/`
    ///
    /// Architectural analysis has no spec of its own and borrows the
    /// cloud architecture catalogue.
    pub fn spec_file(&self) -> &'static str {
        match self {
            AnalysisCategory::Algorithms => "algorithms-data-structures-spec.yaml",
            AnalysisCategory::DesignPatterns => "design-patterns-spec.yaml",
            AnalysisCategory::Architectural | AnalysisCategory::Cloud => {
                "cloud-architecture-spec.yaml"
            }
        }
    }
}

impl fmt::Display for AnalysisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AnalysisCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "algorithms" => Ok(AnalysisCategory::Algorithms),
            "design-patterns" => Ok(AnalysisCategory::DesignPatterns),
            "architectural" => Ok(AnalysisCategory::Architectural),
            "cloud" => Ok(AnalysisCategory::Cloud),
            other => Err(format!(
                "Unknown category '{}'. Expected one of: algorithms, design-patterns, architectural, cloud",
                other
            )),
        }
    }
}

// ============================================================================
// Pattern specifications
// ============================================================================

/// How hard a pattern is to implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImplementationComplexity {
    Low,
    Medium,
    High,
}

/// How hard a pattern is to recognise in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionComplexity {
    Simple,
    Moderate,
    Complex,
}

/// Runtime cost a pattern usually carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceImpact {
    Minimal,
    Moderate,
    Significant,
}

/// Complexity ratings attached to every pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complexity {
    pub implementation: ImplementationComplexity,
    pub detection: DetectionComplexity,
    pub performance_impact: PerformanceImpact,
}

/// A single named pattern record, e.g. "Saga" or "Quick Sort"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub complexity: Complexity,
    #[serde(default)]
    pub detection_hints: Vec<String>,
    #[serde(default)]
    pub report_fields: Vec<String>,
}

/// One YAML spec document describing a category of patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecFile {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
}

impl SpecFile {
    /// Check the required fields of every entry
    pub fn validate(&self) -> Result<(), String> {
        if self.patterns.is_empty() {
            return Err("spec contains no patterns".to_string());
        }

        for (idx, pattern) in self.patterns.iter().enumerate() {
            if pattern.name.trim().is_empty() {
                return Err(format!("pattern #{} has an empty name", idx + 1));
            }
            if pattern.category.trim().is_empty() {
                return Err(format!("pattern '{}' has an empty category", pattern.name));
            }
            if pattern.detection_hints.is_empty() {
                return Err(format!("pattern '{}' has no detection_hints", pattern.name));
            }
            if pattern.report_fields.is_empty() {
                return Err(format!("pattern '{}' has no report_fields", pattern.name));
            }
        }

        Ok(())
    }

    /// Names of all patterns, in file order
    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }
}

// ============================================================================
// Invocations
// ============================================================================

/// How a finished analysis run ended
///
/// Timeouts are reported as runner errors, not as a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Everything a runner needs to launch the external tool once
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub prompt: String,
    pub model: String,
    pub timeout: Duration,
    pub working_dir: PathBuf,
    pub stream: bool,
}

impl InvocationRequest {
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            model: "sonnet".to_string(),
            timeout: Duration::from_secs(300),
            working_dir: working_dir.into(),
            stream: false,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Outcome of one external tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResult {
    pub id: Uuid,
    pub exit_code: Option<i32>,
    /// Full stdout, also populated in streaming mode
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub streamed: bool,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        !self.cancelled && self.exit_code == Some(0)
    }

    pub fn status(&self) -> AnalysisStatus {
        if self.cancelled {
            AnalysisStatus::Cancelled
        } else if self.success() {
            AnalysisStatus::Completed
        } else {
            AnalysisStatus::Failed
        }
    }
}

/// Incremental events published while the external tool runs
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A line of stdout
    Output(String),
    /// A line of stderr
    Diagnostic(String),
    /// Periodic liveness notice
    Heartbeat { elapsed: Duration },
}

pub type EventSender = mpsc::UnboundedSender<StreamEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// Create a channel for stream events
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Seam between orchestration and whatever actually runs the prompt
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run one prompt to completion, timeout or cancellation
    async fn run(
        &self,
        request: InvocationRequest,
        events: Option<EventSender>,
        cancel: CancellationToken,
    ) -> Result<InvocationResult, Self::Error>;
}
