//! Ordered record of pipeline stage events
//!
//! Every stage that runs appends exactly one [`TimelineEvent`]; a failed
//! run appends one terminal error event after whatever completed before
//! it. The timeline is append-only and serializes as a flat JSON array.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

/// Upper bound on captured command output embedded in events and reports
pub(crate) const MAX_SNIPPET_BYTES: usize = 64 * 1024;

/// Marker appended to captured output that hit the size cap
pub(crate) const TRUNCATION_MARKER: &str = "... [output truncated]";

/// Pipeline stage a timeline event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Script upload and write-integrity check
    #[serde(rename = "File Upload")]
    FileUpload,
    /// Optional data file upload
    #[serde(rename = "Data Upload")]
    DataUpload,
    /// Batched package install
    #[serde(rename = "Dependencies")]
    Dependencies,
    /// LLM rewrite of the uploaded script
    #[serde(rename = "Code Optimization")]
    Optimization,
    /// Rewritten script execution
    #[serde(rename = "Execution")]
    Execution,
    /// Generated artifact collection
    #[serde(rename = "Artifact Collection")]
    Collection,
}

impl Stage {
    /// Wire label for this stage
    pub fn label(&self) -> &'static str {
        match self {
            Stage::FileUpload => "File Upload",
            Stage::DataUpload => "Data Upload",
            Stage::Dependencies => "Dependencies",
            Stage::Optimization => "Code Optimization",
            Stage::Execution => "Execution",
            Stage::Collection => "Artifact Collection",
        }
    }

    /// Display color for a completed event of this stage
    pub fn color(&self) -> &'static str {
        match self {
            Stage::FileUpload => "blue",
            Stage::DataUpload => "purple",
            Stage::Dependencies => "orange",
            Stage::Optimization => "yellow",
            Stage::Execution => "teal",
            Stage::Collection => "green",
        }
    }
}

/// Completion status of a timeline event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Stage finished
    Complete,
    /// Stage (or the run as a whole) failed
    Error,
}

/// One recorded pipeline event
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    /// Stage this event belongs to
    pub step: Stage,
    /// Completion status
    pub status: EventStatus,
    /// Human-readable summary
    pub details: String,
    /// Display color
    pub color: String,
    /// What went into the stage
    pub input: String,
    /// What came out of the stage
    pub output: String,
    /// Wall-clock time the event was recorded
    #[serde(serialize_with = "serialize_clock_time")]
    pub timestamp: DateTime<Utc>,
}

impl TimelineEvent {
    /// Record a completed stage
    pub fn complete(
        step: Stage,
        details: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        TimelineEvent {
            step,
            status: EventStatus::Complete,
            details: details.into(),
            color: step.color().to_string(),
            input: truncate_snippet(&input.into()),
            output: truncate_snippet(&output.into()),
            timestamp: Utc::now(),
        }
    }

    /// Record a failed stage
    pub fn error(
        step: Stage,
        details: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        TimelineEvent {
            step,
            status: EventStatus::Error,
            details: details.into(),
            color: "red".to_string(),
            input: truncate_snippet(&input.into()),
            output: truncate_snippet(&output.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only sequence of timeline events
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Timeline {
    events: Vec<TimelineEvent>,
}

impl Timeline {
    /// Create an empty timeline
    pub fn new() -> Self {
        Timeline::default()
    }

    /// Append an event
    pub fn record(&mut self, event: TimelineEvent) {
        debug!(step = event.step.label(), status = ?event.status, "timeline event");
        self.events.push(event);
    }

    /// Events in recording order
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events have been recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Serialize a timestamp as clock time (HH:MM:SS)
fn serialize_clock_time<S>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.format("%H:%M:%S").to_string())
}

/// Clamp captured output to the embedding cap, marking the cut
pub(crate) fn truncate_snippet(text: &str) -> String {
    if text.len() <= MAX_SNIPPET_BYTES {
        return text.to_string();
    }

    let mut end = MAX_SNIPPET_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}\n{}", &text[..end], TRUNCATION_MARKER)
}
