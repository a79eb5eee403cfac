//! Command dispatch
//!
//! Wires configuration, the knowledge base, the rate tracker and the process
//! supervisor together for one parsed command line.

use crate::analyzer::{AnalysisOptions, AnalysisReport, Analyzer, Mode, RunContext};
use crate::cli::{selected_categories, Args, Commands};
use crate::config::Config;
use crate::rate_limit::RateTracker;
use crate::report::{confirm, Printer};
use crate::store::SpecStore;
use crate::supervisor::{ProcessSupervisor, SupervisorError};
use anyhow::{Context, Result};
use pattern_discovery_sdk::{event_channel, CancellationToken};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitStatus;
use tracing::{debug, warn};

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_TIMEOUT: i32 = 124;
pub const EXIT_CANCELLED: i32 = 130;

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    /// An interactive session ended with this exit code
    Exited(i32),
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::Cancelled => EXIT_CANCELLED,
            RunStatus::Exited(code) => *code,
        }
    }
}

/// Pass a session's exit status through, signals included
fn session_status(status: ExitStatus) -> RunStatus {
    if status.success() {
        return RunStatus::Completed;
    }
    if let Some(code) = status.code() {
        return RunStatus::Exited(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return RunStatus::Exited(128 + signal);
        }
    }
    RunStatus::Exited(EXIT_FAILURE)
}

/// Exit code for a failed run
pub fn exit_code(err: &anyhow::Error) -> i32 {
    let timed_out = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<SupervisorError>(),
            Some(SupervisorError::Timeout(_))
        )
    });

    if timed_out {
        EXIT_TIMEOUT
    } else {
        EXIT_FAILURE
    }
}

/// Everything a command needs, resolved from flags, env and config
pub struct App {
    args: Args,
    config: Config,
    store: SpecStore,
    target: PathBuf,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        args.validate()?;

        let mut config = Config::load(args.config.as_deref())?;
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_cli(args.overrides());

        let root = config.knowledge_root()?;
        debug!(root = %root.display(), "Using knowledge base");
        let store = SpecStore::new(root);

        let target = args
            .target_path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", args.target_path.display()))?;

        Ok(Self {
            args,
            config,
            store,
            target,
        })
    }

    /// Whether the command hands the terminal to the external tool
    pub fn is_interactive(&self) -> bool {
        self.args.command.is_interactive()
    }

    /// Run the command, flushing the rate record whatever the outcome
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunStatus> {
        let mut tracker = RateTracker::load(self.config.rate_file(), self.config.limits);

        let result = self.dispatch(&mut tracker, cancel).await;

        if let Err(e) = tracker.flush() {
            warn!(error = %e, "Failed to save rate-limit record");
        }

        result
    }

    async fn dispatch(&self, tracker: &mut RateTracker, cancel: CancellationToken) -> Result<RunStatus> {
        let mut printer = Printer::stdout();

        match &self.args.command {
            Commands::ListSpecs => {
                let entries = self.store.list_specs()?;
                printer.spec_table(&entries)?;
                Ok(RunStatus::Completed)
            }
            Commands::Usage => {
                let stats = tracker.usage();
                let exhausted = tracker.time_until_reset();
                printer.usage(&stats, &exhausted)?;
                Ok(RunStatus::Completed)
            }
            Commands::TestClaude => {
                let probe = self.supervisor().probe().await?;
                printer.probe(&probe)?;
                Ok(RunStatus::Completed)
            }
            Commands::Session { with_prompt } => self.session(*with_prompt, tracker).await,
            command => {
                let stdin = io::stdin();
                let mut input = stdin.lock();
                self.analysis(command, tracker, cancel, &mut printer, &mut input)
                    .await
            }
        }
    }

    fn supervisor(&self) -> ProcessSupervisor {
        ProcessSupervisor::new(self.config.tool.clone()).with_heartbeat(self.config.heartbeat())
    }

    fn options(&self) -> AnalysisOptions {
        AnalysisOptions {
            target: self.target.clone(),
            model: self.config.model.clone(),
            timeout: self.config.timeout(),
            stream: self.args.stream,
            mode: self.args.mode(),
        }
    }

    async fn analysis<W: Write, R: BufRead>(
        &self,
        command: &Commands,
        tracker: &mut RateTracker,
        cancel: CancellationToken,
        printer: &mut Printer<W>,
        input: &mut R,
    ) -> Result<RunStatus> {
        let supervisor = self.supervisor();
        let options = self.options();
        let mode = options.mode;
        let analyzer = Analyzer::new(&self.store, &supervisor, options);

        printer.mode_banner(mode, &self.config.model)?;

        if mode == Mode::Execute && !self.args.yes {
            let question = format!(
                "This will run {} with '{}' (model: {}) in {}.",
                describe_runs(command),
                self.config.tool.program,
                self.config.model,
                self.target.display()
            );
            if !confirm(&question, input, &mut io::stdout())? {
                printer.line("Aborted.")?;
                return Ok(RunStatus::Cancelled);
            }
        }

        let streaming = mode == Mode::Execute && self.args.stream;
        let (events, forwarder) = if streaming {
            let (tx, mut rx) = event_channel();
            let handle = tokio::spawn(async move {
                let mut out = Printer::stdout();
                while let Some(event) = rx.recv().await {
                    if out.event(&event).is_err() {
                        break;
                    }
                }
            });
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        let mut ctx = RunContext {
            tracker,
            events,
            cancel,
        };

        let reports = match command {
            Commands::All { patterns, chain } => {
                let categories = selected_categories(patterns);
                analyzer.analyze_many(&categories, *chain, &mut ctx).await
            }
            Commands::ServiceCollab => analyzer.service_collaboration(&mut ctx).await.map(|r| vec![r]),
            other => match other.category() {
                Some(category) => analyzer.analyze(category, &mut ctx).await.map(|r| vec![r]),
                None => anyhow::bail!("'{:?}' is not an analysis command", other),
            },
        };

        // Closing the channel lets the forwarder drain and stop
        drop(ctx);
        if let Some(handle) = forwarder {
            let _ = handle.await;
        }

        let reports = reports?;
        print_reports(printer, &reports)?;

        if reports.iter().any(|r| r.outcome.is_cancelled()) {
            Ok(RunStatus::Cancelled)
        } else {
            Ok(RunStatus::Completed)
        }
    }

    async fn session(&self, with_prompt: bool, tracker: &mut RateTracker) -> Result<RunStatus> {
        let supervisor = self.supervisor();
        let opening = if with_prompt {
            let analyzer = Analyzer::new(&self.store, &supervisor, self.options());
            Some(analyzer.session_prompt()?)
        } else {
            None
        };

        tracker.check()?;
        tracker.record_request();

        let status = supervisor
            .interactive(&self.target, &self.config.model, opening.as_deref())
            .await?;

        debug!(status = %status, "Interactive session ended");
        Ok(session_status(status))
    }
}

fn describe_runs(command: &Commands) -> String {
    match command {
        Commands::All { patterns, chain } => {
            let count = selected_categories(patterns).len();
            if *chain {
                format!("one chained analysis of {} categories", count)
            } else {
                format!("{} separate analyses", count)
            }
        }
        _ => "1 analysis".to_string(),
    }
}

fn print_reports<W: Write>(printer: &mut Printer<W>, reports: &[AnalysisReport]) -> io::Result<()> {
    for report in reports {
        printer.analysis(report)?;
    }
    Ok(())
}
