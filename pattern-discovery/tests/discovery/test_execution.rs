//! End-to-end runs of the analyzer through the real process supervisor
#![cfg(unix)]

use super::common::{project_root, Sandbox};
use pattern_discovery::analyzer::{AnalysisOptions, Analyzer, Mode, Outcome, RunContext};
use pattern_discovery::rate_limit::{RateLimits, RateTracker};
use pattern_discovery::store::SpecStore;
use pattern_discovery::supervisor::{ProcessSupervisor, ToolCommand};
use pattern_discovery_sdk::{event_channel, AnalysisCategory, CancellationToken, StreamEvent};
use std::time::Duration;

fn echo_prompt_supervisor(sandbox: &Sandbox) -> ProcessSupervisor {
    // $1 --print, $2 --model, $3 model, $4 prompt
    let tool = sandbox.fake_tool("echo-prompt", r#"printf '%s\n' "$4""#);
    ProcessSupervisor::new(ToolCommand {
        program: tool.display().to_string(),
        args: vec!["--print".to_string()],
    })
    .with_heartbeat(Duration::from_millis(50))
}

fn options(sandbox: &Sandbox, stream: bool) -> AnalysisOptions {
    AnalysisOptions {
        target: sandbox.target.clone(),
        model: "sonnet".to_string(),
        timeout: Duration::from_secs(20),
        stream,
        mode: Mode::Execute,
    }
}

#[tokio::test]
async fn test_chained_execution_sends_one_ordered_prompt() {
    let sandbox = Sandbox::new();
    let store = SpecStore::new(project_root());
    let supervisor = echo_prompt_supervisor(&sandbox);
    let analyzer = Analyzer::new(&store, &supervisor, options(&sandbox, false));
    let mut tracker = RateTracker::load(sandbox.rate_file(), RateLimits::default());
    let mut ctx = RunContext {
        tracker: &mut tracker,
        events: None,
        cancel: CancellationToken::new(),
    };

    let categories = [AnalysisCategory::DesignPatterns, AnalysisCategory::Cloud];
    let reports = analyzer
        .analyze_many(&categories, true, &mut ctx)
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    let stdout = match &reports[0].outcome {
        Outcome::Executed(result) => {
            assert!(result.success());
            result.stdout.clone()
        }
        other => panic!("unexpected outcome {:?}", other),
    };

    let design = stdout.find("1. Design Patterns Analysis:").unwrap();
    let cloud = stdout.find("2. Cloud Architecture Patterns Analysis:").unwrap();
    assert!(design < cloud);
    assert!(stdout.contains(&sandbox.target.display().to_string()));
    assert!(!stdout.contains("[CODE_PATH]"));

    assert_eq!(tracker.record().total_requests, 1);
    tracker.flush().unwrap();
    assert!(sandbox.rate_file().exists());
}

#[tokio::test]
async fn test_streaming_execution_forwards_output() {
    let sandbox = Sandbox::new();
    let store = SpecStore::new(project_root());
    let supervisor = echo_prompt_supervisor(&sandbox);
    let analyzer = Analyzer::new(&store, &supervisor, options(&sandbox, true));
    let mut tracker = RateTracker::load(sandbox.rate_file(), RateLimits::default());
    let (tx, mut rx) = event_channel();
    let mut ctx = RunContext {
        tracker: &mut tracker,
        events: Some(tx),
        cancel: CancellationToken::new(),
    };

    let report = analyzer
        .analyze(AnalysisCategory::Algorithms, &mut ctx)
        .await
        .unwrap();
    drop(ctx);

    let mut lines = Vec::new();
    while let Some(event) = rx.recv().await {
        if let StreamEvent::Output(line) = event {
            lines.push(line);
        }
    }

    assert!(lines
        .iter()
        .any(|l| l.contains("Algorithms & Data Structures Discovery")));
    match report.outcome {
        Outcome::Executed(result) => assert!(result.streamed),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_cancelled_execution_is_reported() {
    let sandbox = Sandbox::new();
    let store = SpecStore::new(project_root());
    let tool = sandbox.fake_tool("slow-tool", "sleep 30");
    let supervisor = ProcessSupervisor::new(ToolCommand {
        program: tool.display().to_string(),
        args: vec![],
    });
    let analyzer = Analyzer::new(&store, &supervisor, options(&sandbox, false));
    let mut tracker = RateTracker::load(sandbox.rate_file(), RateLimits::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });
    let mut ctx = RunContext {
        tracker: &mut tracker,
        events: None,
        cancel,
    };

    let started = std::time::Instant::now();
    let reports = analyzer
        .analyze_many(&AnalysisCategory::ALL, false, &mut ctx)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(reports.len(), 1);
    assert!(reports[0].outcome.is_cancelled());
}
