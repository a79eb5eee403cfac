//! Analysis orchestration
//!
//! Ties the store, composer, rate tracker and runner together for one
//! invocation mode. Only `Mode::Execute` ever reaches the runner.

use crate::composer::{compose, compose_chain, service_collaboration_prompt};
use crate::rate_limit::RateTracker;
use crate::store::SpecStore;
use anyhow::{Context, Result};
use pattern_discovery_sdk::{
    AnalysisCategory, AnalysisRunner, CancellationToken, EventSender, InvocationRequest,
    InvocationResult,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// Spec describing service collaboration patterns, relative to `specs/`
pub const SERVICE_COLLABORATION_SPEC: &str =
    "service-collaboration/service-collaboration-patterns.yaml";

const SOURCE_EXTENSIONS: [&str; 8] = ["py", "js", "ts", "java", "cpp", "c", "go", "rs"];
const FILE_TREE_LIMIT: usize = 50;
const FILE_TREE_DEPTH: usize = 3;

/// What to do with a composed prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run the prompt through the external tool
    Execute,
    /// Show the prompt only
    DryRun,
    /// Show the prompt with a file listing and usage hints
    Placeholder,
}

impl Mode {
    /// `--dry-run` wins over `--execute`; neither means placeholder
    pub fn from_flags(execute: bool, dry_run: bool) -> Self {
        match (execute, dry_run) {
            (_, true) => Mode::DryRun,
            (true, false) => Mode::Execute,
            (false, false) => Mode::Placeholder,
        }
    }
}

/// Settings shared by every analysis in one run
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub target: PathBuf,
    pub model: String,
    pub timeout: Duration,
    pub stream: bool,
    pub mode: Mode,
}

/// Output of a single analysis
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Text produced locally (dry-run or placeholder)
    Rendered(String),
    /// Result of an external tool run
    Executed(InvocationResult),
}

impl Outcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Executed(result) if result.cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub title: String,
    pub outcome: Outcome,
}

/// Per-run context the analyzer mutates or forwards
pub struct RunContext<'a> {
    pub tracker: &'a mut RateTracker,
    pub events: Option<EventSender>,
    pub cancel: CancellationToken,
}

pub struct Analyzer<'a, R: AnalysisRunner> {
    store: &'a SpecStore,
    runner: &'a R,
    options: AnalysisOptions,
}

impl<'a, R: AnalysisRunner> Analyzer<'a, R> {
    pub fn new(store: &'a SpecStore, runner: &'a R, options: AnalysisOptions) -> Self {
        Self {
            store,
            runner,
            options,
        }
    }

    /// Composed prompt for one category
    ///
    /// The category's reference spec is loaded as well, so a missing or
    /// malformed spec fails before anything is shown or run.
    pub fn prompt_for(&self, category: AnalysisCategory) -> Result<String> {
        let spec = self
            .store
            .spec_for(category)
            .with_context(|| format!("Failed to load spec for {}", category))?;
        debug!(category = %category, spec = %spec.title, patterns = spec.patterns.len(), "Loaded reference spec");

        let template = self
            .store
            .prompt_for(category)
            .with_context(|| format!("Failed to load prompt for {}", category))?;

        Ok(compose(&template, &self.options.target))
    }

    /// One combined prompt covering `categories` in order
    pub fn chained_prompt(&self, categories: &[AnalysisCategory]) -> Result<String> {
        let mut sections = Vec::with_capacity(categories.len());
        for &category in categories {
            self.store
                .spec_for(category)
                .with_context(|| format!("Failed to load spec for {}", category))?;
            let template = self
                .store
                .prompt_for(category)
                .with_context(|| format!("Failed to load prompt for {}", category))?;
            sections.push((category, template));
        }

        Ok(compose_chain(&sections, &self.options.target))
    }

    pub fn service_collaboration_prompt(&self) -> Result<String> {
        let spec = self
            .store
            .load_spec(SERVICE_COLLABORATION_SPEC)
            .context("Failed to load service collaboration spec")?;
        Ok(service_collaboration_prompt(&spec, &self.options.target))
    }

    /// Opening message for an interactive session
    pub fn session_prompt(&self) -> Result<String> {
        self.chained_prompt(&AnalysisCategory::ALL)
    }

    pub async fn analyze(
        &self,
        category: AnalysisCategory,
        ctx: &mut RunContext<'_>,
    ) -> Result<AnalysisReport> {
        let prompt = self.prompt_for(category)?;
        let outcome = self.handle(&prompt, category.title(), category.id(), ctx).await?;
        Ok(AnalysisReport {
            title: category.title().to_string(),
            outcome,
        })
    }

    /// Run several categories, either chained into one session or one by one
    ///
    /// Separate runs stop early when one is cancelled.
    pub async fn analyze_many(
        &self,
        categories: &[AnalysisCategory],
        chain: bool,
        ctx: &mut RunContext<'_>,
    ) -> Result<Vec<AnalysisReport>> {
        if chain {
            let prompt = self.chained_prompt(categories)?;
            let outcome = self.handle(&prompt, "Chained Analysis", "all --chain", ctx).await?;
            return Ok(vec![AnalysisReport {
                title: "Chained Analysis".to_string(),
                outcome,
            }]);
        }

        let mut reports = Vec::with_capacity(categories.len());
        for &category in categories {
            let report = self.analyze(category, ctx).await?;
            let cancelled = report.outcome.is_cancelled();
            reports.push(report);
            if cancelled {
                break;
            }
        }

        Ok(reports)
    }

    pub async fn service_collaboration(&self, ctx: &mut RunContext<'_>) -> Result<AnalysisReport> {
        let prompt = self.service_collaboration_prompt()?;
        let title = "Service Collaboration Patterns";
        let outcome = self.handle(&prompt, title, "service-collab", ctx).await?;
        Ok(AnalysisReport {
            title: title.to_string(),
            outcome,
        })
    }

    async fn handle(
        &self,
        prompt: &str,
        title: &str,
        verb: &str,
        ctx: &mut RunContext<'_>,
    ) -> Result<Outcome> {
        match self.options.mode {
            Mode::DryRun => Ok(Outcome::Rendered(self.render_dry_run(prompt, title))),
            Mode::Placeholder => Ok(Outcome::Rendered(self.render_placeholder(prompt, title, verb))),
            Mode::Execute => self.execute(prompt, ctx).await.map(Outcome::Executed),
        }
    }

    async fn execute(&self, prompt: &str, ctx: &mut RunContext<'_>) -> Result<InvocationResult> {
        // Cancelled before launch (e.g. Ctrl-C at the confirmation prompt)
        if ctx.cancel.is_cancelled() {
            info!("Cancelled before launch; external tool not started");
            return Ok(not_started());
        }

        ctx.tracker.check()?;

        let request = InvocationRequest::new(prompt, &self.options.target)
            .model(&self.options.model)
            .timeout(self.options.timeout)
            .stream(self.options.stream);

        // Counted at launch so failed runs still consume local quota
        ctx.tracker.record_request();

        let result = self
            .runner
            .run(request, ctx.events.clone(), ctx.cancel.clone())
            .await?;

        info!(
            invocation = %result.id,
            elapsed = ?result.elapsed,
            cancelled = result.cancelled,
            "Analysis finished"
        );
        Ok(result)
    }

    fn render_dry_run(&self, prompt: &str, title: &str) -> String {
        format!(
            "\n=== {} ANALYSIS - DRY RUN ===\n\n\
             Target Directory: {}\n\
             Model: {}\n\n\
             Prompt to be executed:\n{}\n\n\
             [This is a dry run - no actual analysis performed]\n",
            title.to_uppercase(),
            self.options.target.display(),
            self.options.model,
            prompt
        )
    }

    fn render_placeholder(&self, prompt: &str, title: &str, verb: &str) -> String {
        let files = source_files(&self.options.target);
        let file_tree = if files.is_empty() {
            "No source files found.".to_string()
        } else {
            files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "\n=== {} ANALYSIS ===\n\n\
             Target Directory: {}\n\n\
             File Structure:\n{}\n\n\
             Analysis Prompt:\n{}\n\n\
             === ANALYSIS PLACEHOLDER ===\n\
             This is a placeholder for AI-powered analysis. To execute actual analysis:\n\n\
             Use the --execute flag: pattern-discovery --execute {}\n\n\
             The prompt template contains specific instructions for:\n\
             - Pattern identification\n\
             - Quality metrics\n\
             - Code locations\n\
             - Recommendations\n\n\
             === SAMPLE OUTPUT FORMAT ===\n\
             Based on the pattern spec, the output should include:\n\
             - Pattern name and type\n\
             - File locations (file:line)\n\
             - Implementation quality score\n\
             - Complexity analysis\n\
             - Improvement suggestions\n",
            title.to_uppercase(),
            self.options.target.display(),
            file_tree,
            prompt,
            verb
        )
    }
}

fn not_started() -> InvocationResult {
    InvocationResult {
        id: Uuid::new_v4(),
        exit_code: None,
        stdout: String::new(),
        stderr: String::new(),
        elapsed: Duration::ZERO,
        cancelled: true,
        streamed: false,
    }
}

/// Source files under `root`, shallow and capped, in path order
pub fn source_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(FILE_TREE_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .take(FILE_TREE_LIMIT)
        .collect();

    files.sort();
    files
}
