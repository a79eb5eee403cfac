//! Local rate-limit bookkeeping for external tool invocations
//!
//! The record is loaded once at start-up, mutated around each subprocess
//! launch and flushed back to disk on exit. Nothing here is global: `main`
//! owns the tracker and passes it to whoever launches the tool.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Request ceilings per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 100,
            per_day: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Minute, Window::Hour, Window::Day];

    fn length(&self) -> Duration {
        match self {
            Window::Minute => Duration::minutes(1),
            Window::Hour => Duration::hours(1),
            Window::Day => Duration::days(1),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Minute => f.write_str("minute"),
            Window::Hour => f.write_str("hour"),
            Window::Day => f.write_str("day"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded: {used}/{limit} requests per {window} (resets in {}s)", .reset_in.num_seconds().max(0))]
    RateLimited {
        window: Window,
        used: u32,
        limit: u32,
        reset_in: Duration,
    },

    #[error("Failed to persist rate-limit record to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize rate-limit record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Counter for one fixed window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub used: u32,
    /// When the current window ends; `None` until the first request
    pub reset_at: Option<DateTime<Utc>>,
}

impl Bucket {
    fn roll_over(&mut self, now: DateTime<Utc>) {
        if let Some(reset_at) = self.reset_at {
            if now >= reset_at {
                self.used = 0;
                self.reset_at = None;
            }
        }
    }

    fn hit(&mut self, now: DateTime<Utc>, window: Window) {
        self.roll_over(now);
        if self.reset_at.is_none() {
            self.reset_at = Some(now + window.length());
        }
        self.used += 1;
    }

    fn resets_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.reset_at.map(|at| (at - now).max(Duration::zero()))
    }
}

/// Persisted usage record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub minute: Bucket,
    pub hour: Bucket,
    pub day: Bucket,
    pub total_requests: u64,
    pub last_request: Option<DateTime<Utc>>,
}

impl RateLimitRecord {
    fn bucket(&self, window: Window) -> &Bucket {
        match window {
            Window::Minute => &self.minute,
            Window::Hour => &self.hour,
            Window::Day => &self.day,
        }
    }

    fn bucket_mut(&mut self, window: Window) -> &mut Bucket {
        match window {
            Window::Minute => &mut self.minute,
            Window::Hour => &mut self.hour,
            Window::Day => &mut self.day,
        }
    }
}

/// Usage for a single window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowUsage {
    pub window: Window,
    pub used: u32,
    pub limit: u32,
    pub resets_in: Option<Duration>,
}

/// Snapshot of all windows
#[derive(Debug, Clone, PartialEq)]
pub struct UsageStats {
    pub windows: Vec<WindowUsage>,
    pub total_requests: u64,
    pub last_request: Option<DateTime<Utc>>,
}

/// Owner of the rate-limit record for one process run
#[derive(Debug)]
pub struct RateTracker {
    path: PathBuf,
    limits: RateLimits,
    record: RateLimitRecord,
    dirty: bool,
}

impl RateTracker {
    /// Load the record from `path`, starting fresh when it is missing or corrupt
    pub fn load(path: impl Into<PathBuf>, limits: RateLimits) -> Self {
        let path = path.into();
        let record = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt rate-limit record");
                    RateLimitRecord::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RateLimitRecord::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read rate-limit record");
                RateLimitRecord::default()
            }
        };

        Self {
            path,
            limits,
            record,
            dirty: false,
        }
    }

    pub fn record(&self) -> &RateLimitRecord {
        &self.record
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn limit(&self, window: Window) -> u32 {
        match window {
            Window::Minute => self.limits.per_minute,
            Window::Hour => self.limits.per_hour,
            Window::Day => self.limits.per_day,
        }
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        for window in Window::ALL {
            let bucket = self.record.bucket_mut(window);
            let before = bucket.clone();
            bucket.roll_over(now);
            if *bucket != before {
                self.dirty = true;
            }
        }
    }

    pub fn check(&mut self) -> Result<(), RateLimitError> {
        self.check_at(Utc::now())
    }

    /// Refuse when any window is already at its limit
    pub fn check_at(&mut self, now: DateTime<Utc>) -> Result<(), RateLimitError> {
        self.roll_over(now);

        for window in Window::ALL {
            let bucket = self.record.bucket(window);
            let limit = self.limit(window);
            if bucket.used >= limit {
                return Err(RateLimitError::RateLimited {
                    window,
                    used: bucket.used,
                    limit,
                    reset_in: bucket.resets_in(now).unwrap_or_else(Duration::zero),
                });
            }
        }

        Ok(())
    }

    pub fn record_request(&mut self) {
        self.record_at(Utc::now());
    }

    pub fn record_at(&mut self, now: DateTime<Utc>) {
        for window in Window::ALL {
            self.record.bucket_mut(window).hit(now, window);
        }
        self.record.total_requests += 1;
        self.record.last_request = Some(now);
        self.dirty = true;

        debug!(
            minute = self.record.minute.used,
            hour = self.record.hour.used,
            day = self.record.day.used,
            "Recorded external tool request"
        );
    }

    pub fn usage(&mut self) -> UsageStats {
        self.usage_at(Utc::now())
    }

    pub fn usage_at(&mut self, now: DateTime<Utc>) -> UsageStats {
        self.roll_over(now);

        let windows = Window::ALL
            .iter()
            .map(|&window| {
                let bucket = self.record.bucket(window);
                WindowUsage {
                    window,
                    used: bucket.used,
                    limit: self.limit(window),
                    resets_in: bucket.resets_in(now),
                }
            })
            .collect();

        UsageStats {
            windows,
            total_requests: self.record.total_requests,
            last_request: self.record.last_request,
        }
    }

    pub fn time_until_reset(&mut self) -> Vec<(Window, Duration)> {
        self.time_until_reset_at(Utc::now())
    }

    /// Exhausted windows and how long until each one resets
    pub fn time_until_reset_at(&mut self, now: DateTime<Utc>) -> Vec<(Window, Duration)> {
        self.usage_at(now)
            .windows
            .into_iter()
            .filter(|w| w.used >= w.limit)
            .map(|w| (w.window, w.resets_in.unwrap_or_else(Duration::zero)))
            .collect()
    }

    /// Write the record back if anything changed
    ///
    /// The file is replaced through a temporary sibling so a crash never
    /// leaves a half-written record behind.
    pub fn flush(&mut self) -> Result<(), RateLimitError> {
        if !self.dirty {
            return Ok(());
        }

        let persist = |source: std::io::Error| RateLimitError::Persist {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(persist)?;
            }
        }

        let content = serde_json::to_string_pretty(&self.record)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(persist)?;
        std::fs::rename(&tmp, &self.path).map_err(persist)?;

        self.dirty = false;
        debug!(path = %self.path.display(), "Flushed rate-limit record");
        Ok(())
    }
}
