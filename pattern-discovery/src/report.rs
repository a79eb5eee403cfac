//! Terminal output
//!
//! Everything user-facing goes through [`Printer`]. Styling is applied only
//! when the destination is a terminal.

use crate::analyzer::{AnalysisReport, Mode, Outcome};
use crate::rate_limit::{UsageStats, Window};
use chrono::Duration;
use crate::store::SpecEntry;
use crate::supervisor::ToolProbe;
use crossterm::style::{style, Stylize};
use pattern_discovery_sdk::{AnalysisStatus, StreamEvent};
use std::io::{self, BufRead, IsTerminal, Write};

const RULE_WIDTH: usize = 60;

pub struct Printer<W: Write> {
    out: W,
    styled: bool,
}

impl Printer<io::Stdout> {
    pub fn stdout() -> Self {
        let out = io::stdout();
        let styled = out.is_terminal();
        Self { out, styled }
    }
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, styled: bool) -> Self {
        Self { out, styled }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn bold(&self, text: &str) -> String {
        if self.styled {
            style(text).bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn cyan(&self, text: &str) -> String {
        if self.styled {
            style(text).cyan().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        if self.styled {
            style(text).green().to_string()
        } else {
            text.to_string()
        }
    }

    fn yellow(&self, text: &str) -> String {
        if self.styled {
            style(text).yellow().to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.styled {
            style(text).dim().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn header(&mut self, title: &str) -> io::Result<()> {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(self.out, "\n{}", self.dim(&rule))?;
        writeln!(self.out, "{}", self.cyan(title))?;
        writeln!(self.out, "{}", self.dim(&rule))
    }

    pub fn mode_banner(&mut self, mode: Mode, model: &str) -> io::Result<()> {
        let line = match mode {
            Mode::Execute => format!("Mode: execute (model: {})", model),
            Mode::DryRun => "Mode: dry run (prompts are shown, nothing is executed)".to_string(),
            Mode::Placeholder => {
                "Mode: placeholder (use --execute to run the analysis)".to_string()
            }
        };
        writeln!(self.out, "{}", self.yellow(&line))
    }

    pub fn analysis(&mut self, report: &AnalysisReport) -> io::Result<()> {
        match &report.outcome {
            Outcome::Rendered(text) => writeln!(self.out, "{}", text),
            Outcome::Executed(result) => {
                self.header(&format!("{} Results", report.title))?;
                match result.status() {
                    AnalysisStatus::Cancelled => {
                        writeln!(self.out, "{}", self.yellow("Analysis cancelled."))?;
                    }
                    _ => {
                        // Streamed output already reached the terminal line by line
                        if !result.streamed {
                            writeln!(self.out, "{}", result.stdout.trim_end())?;
                        }
                        writeln!(
                            self.out,
                            "\n{}",
                            self.green(&format!(
                                "Completed in {:.1}s",
                                result.elapsed.as_secs_f64()
                            ))
                        )?;
                    }
                }
                Ok(())
            }
        }
    }

    pub fn spec_table(&mut self, entries: &[SpecEntry]) -> io::Result<()> {
        self.header("Available Pattern Specifications")?;

        let mut current_group: Option<&str> = None;
        for entry in entries {
            if current_group != Some(entry.group.as_str()) {
                writeln!(self.out, "\n{}", self.bold(&format!("{}:", entry.group)))?;
                current_group = Some(entry.group.as_str());
            }
            writeln!(self.out, "  - {}: {}", entry.file, entry.description)?;
        }

        if entries.is_empty() {
            writeln!(self.out, "No specifications found.")?;
        }
        Ok(())
    }

    /// Usage table; `exhausted` lists windows currently refusing requests
    pub fn usage(&mut self, stats: &UsageStats, exhausted: &[(Window, Duration)]) -> io::Result<()> {
        self.header("External Tool Usage")?;

        for window in &stats.windows {
            let resets = match window.resets_in {
                Some(d) => format!("resets in {}s", d.num_seconds()),
                None => "idle".to_string(),
            };
            let line = format!(
                "  {:<8} {:>4} / {:<4} ({})",
                format!("{}:", window.window),
                window.used,
                window.limit,
                resets
            );
            if window.used >= window.limit {
                writeln!(self.out, "{}", self.yellow(&line))?;
            } else {
                writeln!(self.out, "{}", line)?;
            }
        }

        if let Some(wait) = exhausted.iter().map(|(_, d)| *d).max() {
            let windows: Vec<String> = exhausted.iter().map(|(w, _)| w.to_string()).collect();
            let line = format!(
                "\n  Limit reached ({}); next request allowed in {}s",
                windows.join(", "),
                wait.num_seconds()
            );
            writeln!(self.out, "{}", self.yellow(&line))?;
        }

        writeln!(self.out, "\n  Total requests: {}", stats.total_requests)?;
        match stats.last_request {
            Some(at) => writeln!(
                self.out,
                "  Last request:   {}",
                at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => writeln!(self.out, "  Last request:   never"),
        }
    }

    pub fn probe(&mut self, probe: &ToolProbe) -> io::Result<()> {
        self.header("External Tool Check")?;
        writeln!(self.out, "  Path:    {}", probe.path.display())?;
        writeln!(self.out, "  Version: {}", probe.version)?;
        writeln!(self.out, "{}", self.green("External tool is available."))
    }

    pub fn event(&mut self, event: &StreamEvent) -> io::Result<()> {
        match event {
            StreamEvent::Output(line) => writeln!(self.out, "{}", line)?,
            StreamEvent::Diagnostic(line) => writeln!(self.out, "{}", self.dim(line))?,
            StreamEvent::Heartbeat { elapsed } => writeln!(
                self.out,
                "{}",
                self.dim(&format!("... still running ({}s)", elapsed.as_secs()))
            )?,
        }
        self.out.flush()
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)
    }
}

/// Ask before spending external tool quota
///
/// Anything other than `y`/`yes` (including end of input) declines.
pub fn confirm<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> io::Result<bool> {
    write!(output, "{} Proceed? [y/N] ", question)?;
    output.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        writeln!(output)?;
        return Ok(false);
    }

    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
