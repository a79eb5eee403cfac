//! Process supervisor for the external AI coding tool
//!
//! One prompt, one child process. The supervisor owns the child from spawn
//! to reap: it reads stdout/stderr concurrently, enforces the timeout,
//! forwards lines and heartbeats in streaming mode and kills the child on
//! cancellation. Every exit path either reaps the child or drops it with
//! `kill_on_drop` set.

use pattern_discovery_sdk::{
    async_trait, AnalysisRunner, CancellationToken, EventSender, InvocationRequest,
    InvocationResult, StreamEvent,
};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Interval between "still alive" notices in streaming mode
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// How long a killed child (and its output pipes) get to wind down
const KILL_GRACE: Duration = Duration::from_secs(3);

/// Deadline for `--version` probes
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Lines read from one pipe so far, shared with its reader task
type Captured = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("External tool '{0}' not found. Install it and ensure it is on your PATH.")]
    ToolNotFound(String),

    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("External tool timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("External tool failed ({}): {stderr}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("I/O error while supervising external tool: {0}")]
    Io(#[from] io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// How to invoke the external tool
///
/// `args` are the non-interactive arguments placed before `--model`;
/// interactive sessions launch `program` without them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ToolCommand {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["--print".to_string()],
        }
    }
}

/// Result of probing the external tool
#[derive(Debug, Clone)]
pub struct ToolProbe {
    pub path: PathBuf,
    pub version: String,
}

enum Outcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Launches and supervises the external tool
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    tool: ToolCommand,
    heartbeat: Duration,
}

impl ProcessSupervisor {
    pub fn new(tool: ToolCommand) -> Self {
        Self {
            tool,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat.max(Duration::from_millis(10));
        self
    }

    /// Build the non-interactive command line for a request
    ///
    /// `<program> <args...> --model <model> <prompt>`, run inside the target
    /// directory with both output streams piped.
    pub fn build_command(&self, request: &InvocationRequest) -> Command {
        let mut cmd = Command::new(&self.tool.program);
        cmd.args(&self.tool.args)
            .arg("--model")
            .arg(&request.model)
            .arg(&request.prompt)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a kill reaches anything the tool spawned
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    fn spawn(&self, request: &InvocationRequest) -> Result<Child, SupervisorError> {
        self.build_command(request)
            .spawn()
            .map_err(|e| self.launch_error(e))
    }

    fn launch_error(&self, source: io::Error) -> SupervisorError {
        if source.kind() == io::ErrorKind::NotFound {
            SupervisorError::ToolNotFound(self.tool.program.clone())
        } else {
            SupervisorError::Spawn {
                program: self.tool.program.clone(),
                source,
            }
        }
    }

    /// Run one prompt to completion, timeout or cancellation
    pub async fn supervise(
        &self,
        request: InvocationRequest,
        events: Option<EventSender>,
        cancel: CancellationToken,
    ) -> Result<InvocationResult, SupervisorError> {
        let started = Instant::now();
        let id = Uuid::new_v4();
        let events = if request.stream { events } else { None };
        let streamed = events.is_some();

        let mut child = self.spawn(&request)?;
        let pid = child.id();
        info!(
            invocation = %id,
            program = %self.tool.program,
            model = %request.model,
            pid = ?pid,
            prompt_len = request.prompt.len(),
            "Launched external tool"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stderr not captured"))?;

        let stdout_lines = Captured::default();
        let stderr_lines = Captured::default();
        let stdout_task = tokio::spawn(read_lines(
            stdout,
            events.clone(),
            StreamEvent::Output,
            stdout_lines.clone(),
        ));
        let stderr_task = tokio::spawn(read_lines(
            stderr,
            events.clone(),
            StreamEvent::Diagnostic,
            stderr_lines.clone(),
        ));

        let deadline = tokio::time::sleep(request.timeout);
        tokio::pin!(deadline);

        let mut heartbeat = tokio::time::interval_at(started + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                status = child.wait() => break Outcome::Exited(status?),
                _ = &mut deadline => break Outcome::TimedOut,
                _ = cancel.cancelled() => break Outcome::Cancelled,
                _ = heartbeat.tick(), if events.is_some() => {
                    if let Some(tx) = &events {
                        let _ = tx.send(StreamEvent::Heartbeat { elapsed: started.elapsed() });
                    }
                }
            }
        };

        match outcome {
            Outcome::Exited(_) => {
                // Background processes the tool left behind would keep the pipes open
                if let Some(pid) = pid {
                    kill_group(pid);
                }
            }
            _ => terminate(&mut child).await,
        }

        let stdout = collect(stdout_task, &stdout_lines, KILL_GRACE).await;
        let stderr = collect(stderr_task, &stderr_lines, KILL_GRACE).await;
        let elapsed = started.elapsed();

        match outcome {
            Outcome::TimedOut => {
                warn!(invocation = %id, timeout = ?request.timeout, "External tool timed out");
                Err(SupervisorError::Timeout(request.timeout))
            }
            Outcome::Cancelled => {
                info!(invocation = %id, elapsed = ?elapsed, "External tool cancelled");
                Ok(InvocationResult {
                    id,
                    exit_code: None,
                    stdout,
                    stderr,
                    elapsed,
                    cancelled: true,
                    streamed,
                })
            }
            Outcome::Exited(status) if status.success() => {
                info!(invocation = %id, elapsed = ?elapsed, "External tool completed");
                Ok(InvocationResult {
                    id,
                    exit_code: status.code(),
                    stdout,
                    stderr,
                    elapsed,
                    cancelled: false,
                    streamed,
                })
            }
            Outcome::Exited(status) => {
                debug!(invocation = %id, status = %status, "External tool failed");
                Err(SupervisorError::NonZeroExit {
                    code: status.code(),
                    stderr: filter_stderr(&stderr),
                })
            }
        }
    }

    /// Locate the tool on PATH and ask it for its version
    pub async fn probe(&self) -> Result<ToolProbe, SupervisorError> {
        let path = which::which(&self.tool.program)
            .map_err(|_| SupervisorError::ToolNotFound(self.tool.program.clone()))?;

        let output = Command::new(&path)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(PROBE_TIMEOUT, output)
            .await
            .map_err(|_| SupervisorError::Timeout(PROBE_TIMEOUT))?
            .map_err(|e| self.launch_error(e))?;

        if !output.status.success() {
            return Err(SupervisorError::NonZeroExit {
                code: output.status.code(),
                stderr: filter_stderr(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        Ok(ToolProbe {
            path,
            version: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }

    /// Hand the terminal to an interactive session of the tool
    ///
    /// The child shares our stdio and process group, so Ctrl-C reaches it
    /// directly. Callers must keep Ctrl-C from stopping this process while
    /// the session runs.
    pub async fn interactive(
        &self,
        working_dir: &Path,
        model: &str,
        opening_prompt: Option<&str>,
    ) -> Result<ExitStatus, SupervisorError> {
        let mut cmd = Command::new(&self.tool.program);
        cmd.arg("--model")
            .arg(model)
            .current_dir(working_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(prompt) = opening_prompt {
            cmd.arg(prompt);
        }

        let mut child = cmd.spawn().map_err(|e| self.launch_error(e))?;
        info!(pid = ?child.id(), "Started interactive session");
        Ok(child.wait().await?)
    }
}

#[async_trait]
impl AnalysisRunner for ProcessSupervisor {
    type Error = SupervisorError;

    async fn run(
        &self,
        request: InvocationRequest,
        events: Option<EventSender>,
        cancel: CancellationToken,
    ) -> Result<InvocationResult, SupervisorError> {
        self.supervise(request, events, cancel).await
    }
}

/// Read a pipe line by line until EOF, forwarding and capturing each line
///
/// Lines are split on raw bytes and decoded lossily, so invalid UTF-8 never
/// stops the drain.
async fn read_lines<R>(
    pipe: R,
    events: Option<EventSender>,
    wrap: fn(String) -> StreamEvent,
    captured: Captured,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                if let Some(tx) = &events {
                    let _ = tx.send(wrap(line.clone()));
                }
                if let Ok(mut lines) = captured.lock() {
                    lines.push(line);
                }
            }
            Err(e) => {
                debug!(error = %e, "Stopped reading child output");
                break;
            }
        }
    }
}

fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Wait for a reader task, then return everything it captured
///
/// A reader still blocked after `grace` is aborted; lines it already read
/// are kept.
async fn collect(task: JoinHandle<()>, captured: &Captured, grace: Duration) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(grace, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Output reader task failed"),
        Err(_) => {
            abort.abort();
            warn!("Output pipe still open after the child exited; later output dropped");
        }
    }

    captured
        .lock()
        .map(|lines| lines.join("\n"))
        .unwrap_or_default()
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // SAFETY: plain syscall on the process group created at spawn
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc == 0 {
        debug!(pgid = pid, "Killed process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

/// Kill the child (and its process group) and reap it
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill failed; child already gone");
    }

    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(status = %status, "Reaped killed child"),
        Ok(Err(e)) => warn!(error = %e, "Failed to reap killed child"),
        Err(_) => warn!("Killed child did not exit within the grace period"),
    }
}

/// Drop Node.js warning noise from stderr
pub fn filter_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .filter(|line| {
            !line.contains("ExperimentalWarning")
                && !line.contains("node --trace-warnings")
                && !line.trim().is_empty()
        })
        .collect();

    if lines.is_empty() {
        "Unknown error".to_string()
    } else {
        lines.join("\n")
    }
}
