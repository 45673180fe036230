//! ## Exclusion Log
//!
//! The pipeline never drops a row silently: every filtering stage records what it removed in an
//! [`ExclusionLog`]. The log is a plain collector object that is passed into the pipeline, so
//! callers (and tests) can inspect the structured [`AuditEvent`]s directly, and it can be rendered
//! as timestamped text lines and appended to a log file for auditability.
//!
//! Every recorded event is also emitted through `tracing` at INFO level.

use chrono::{DateTime, Local};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Why a row was excluded.
#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    MissingValue,
    InvalidCoordinates,
    InvalidSpeed(f64),
    InvalidDuration,
    InvalidDistance,
    InvalidPassengerCount(i64),
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::MissingValue => write!(f, "missing value"),
            ExclusionReason::InvalidCoordinates => write!(f, "invalid coordinates"),
            ExclusionReason::InvalidSpeed(speed) => write!(f, "invalid speed {:.1} km/h", speed),
            ExclusionReason::InvalidDuration => write!(f, "invalid duration"),
            ExclusionReason::InvalidDistance => write!(f, "invalid distance"),
            ExclusionReason::InvalidPassengerCount(count) => {
                write!(f, "invalid passenger count {}", count)
            }
        }
    }
}

/// One structured entry of the exclusion log.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    InitialCount(usize),
    DuplicatesDropped(usize),
    MissingValues { column: String, count: usize },
    Excluded {
        id: String,
        stage: String,
        reasons: Vec<ExclusionReason>,
    },
    StageTotal { stage: String, removed: usize },
    Summary {
        initial: usize,
        final_count: usize,
        removed: usize,
    },
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEvent::InitialCount(count) => write!(f, "Initial records loaded: {}", count),
            AuditEvent::DuplicatesDropped(count) => {
                write!(f, "Dropped {} duplicate rows", count)
            }
            AuditEvent::MissingValues { column, count } => {
                write!(f, "Column '{}' has {} missing values", column, count)
            }
            AuditEvent::Excluded { id, reasons, .. } => {
                let reasons: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
                write!(f, "Excluded trip {} - {}", id, reasons.join(", "))
            }
            AuditEvent::StageTotal { stage, removed } => {
                write!(f, "Total records removed by {}: {}", stage, removed)
            }
            AuditEvent::Summary {
                initial,
                final_count,
                removed,
            } => write!(
                f,
                "Cleaning summary - initial records: {}, final records: {}, total removed: {}",
                initial, final_count, removed
            ),
        }
    }
}

/// A recorded event with its wall-clock time.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub at: DateTime<Local>,
    pub event: AuditEvent,
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.at.format("%Y-%m-%d %H:%M:%S,%3f"), self.event)
    }
}

/// Append-only collector of audit events for one pipeline run.
#[derive(Debug, Default)]
pub struct ExclusionLog {
    entries: Vec<AuditEntry>,
}

impl ExclusionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: AuditEvent) {
        info!(target: "trip_cleaner::exclusions", "{}", event);
        self.entries.push(AuditEntry {
            at: Local::now(),
            event,
        });
    }

    /// Records a sampled excluded row.
    pub fn exclude(&mut self, id: &str, stage: &str, reasons: Vec<ExclusionReason>) {
        self.record(AuditEvent::Excluded {
            id: id.to_string(),
            stage: stage.to_string(),
            reasons,
        });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn events(&self) -> impl Iterator<Item = &AuditEvent> {
        self.entries.iter().map(|entry| &entry.event)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the reasons recorded for a trip, across all stages.
    pub fn reasons_for(&self, id: &str) -> Vec<&ExclusionReason> {
        self.events()
            .filter_map(|event| match event {
                AuditEvent::Excluded {
                    id: excluded, reasons, ..
                } if excluded == id => Some(reasons.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Total number of duplicate rows reported.
    pub fn duplicates_dropped(&self) -> usize {
        self.events()
            .map(|event| match event {
                AuditEvent::DuplicatesDropped(count) => *count,
                _ => 0,
            })
            .sum()
    }

    /// Renders every entry as one text line.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.to_string()).collect()
    }

    /// Appends the rendered entries to a log file, creating it and its parent directory if needed.
    pub fn append_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for line in self.lines() {
            writeln!(file, "{}", line)?;
        }
        file.flush()
    }
}
