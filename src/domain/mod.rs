//! Domain types for subtitle reconciliation and acquisition runs.
//!
//! Everything here is ephemeral: video records and missing-subtitle entries are
//! recomputed on every scan, and run summaries live only until the run's
//! notifications have been dispatched.

pub mod events;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

/// A video file discovered under one of the configured search paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VideoRecord {
    path: PathBuf,
}

impl VideoRecord {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used in log lines.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Sibling path `<stem>.<language>.<extension>` next to the video.
    #[must_use]
    pub fn subtitle_path(&self, language: &str, extension: &str) -> PathBuf {
        let mut name = self
            .path
            .file_stem()
            .map(OsStr::to_os_string)
            .unwrap_or_default();
        name.push(format!(".{language}.{extension}"));
        self.path.with_file_name(name)
    }
}

impl fmt::Display for VideoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Ordered, de-duplicated set of requested language codes.
///
/// # Examples
///
/// ```rust
/// use subtitlarr::domain::LanguageSet;
///
/// let langs = LanguageSet::new(&["en", " es ", "en", ""]);
/// assert_eq!(langs.as_slice(), ["en", "es"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LanguageSet(Vec<String>);

impl LanguageSet {
    #[must_use]
    pub fn new<S: AsRef<str>>(codes: &[S]) -> Self {
        let mut langs: Vec<String> = Vec::with_capacity(codes.len());
        for code in codes {
            let code = code.as_ref().trim();
            if !code.is_empty() && !langs.iter().any(|l| l == code) {
                langs.push(code.to_string());
            }
        }
        Self(langs)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for LanguageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

/// A video together with the requested languages it has no subtitle for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingSubtitleEntry {
    pub video: VideoRecord,
    pub missing: LanguageSet,
}

impl MissingSubtitleEntry {
    #[must_use]
    pub fn needs_acquisition(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// One unit of reconciler output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileItem {
    Entry(MissingSubtitleEntry),
    PathError { path: String, error: String },
}

/// Per-path aggregate returned by the scan-status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathStatus {
    Scanned {
        path: String,
        videos: usize,
        missing: usize,
    },
    Error {
        path: String,
        error: String,
    },
}

/// Desired timer policy of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleState {
    pub enabled: bool,
    pub interval_minutes: i64,
}

impl ScheduleState {
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            interval_minutes: 0,
        }
    }

    /// Interval of the timer this state arms, if any. Non-positive intervals disable it.
    #[must_use]
    pub fn period(&self) -> Option<std::time::Duration> {
        if !self.enabled || self.interval_minutes <= 0 {
            return None;
        }
        let minutes = u64::try_from(self.interval_minutes).ok()?;
        Some(std::time::Duration::from_secs(minutes.saturating_mul(60)))
    }
}

/// Which entry point asked for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Scheduled,
    Cli,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Cli => write!(f, "cli"),
        }
    }
}

/// Answer given synchronously to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Accepted,
    RejectedAlreadyRunning,
}

impl StartOutcome {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Lifecycle phase of the run coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Starting,
    Reconciling,
    Acquiring,
    Summarizing,
    NotifyingCompletion,
    Failed,
    NotifyingFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub trigger: TriggerSource,
    pub total_videos: usize,
    pub saved_count: usize,
    pub failed_videos: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
}

impl RunSummary {
    #[must_use]
    pub fn begin(trigger: TriggerSource) -> Self {
        Self {
            trigger,
            total_videos: 0,
            saved_count: 0,
            failed_videos: 0,
            started_at: Utc::now(),
            finished_at: None,
            outcome: RunOutcome::Success,
        }
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        self.finished_at = Some(Utc::now());
        self.outcome = outcome;
    }

    #[must_use]
    pub fn completion_message(&self) -> String {
        format!(
            "Scan and download finished. Processed {} video(s) and saved {} subtitle(s), with {} error(s).",
            self.total_videos, self.saved_count, self.failed_videos
        )
    }
}
