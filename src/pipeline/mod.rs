//! The job pipeline: requests, the stage timeline, and the orchestrator

mod job;
mod orchestrator;
mod timeline;

pub use job::{DataFile, JobReport, JobRequest, JobStatus, SourceFile};
pub use orchestrator::{
    PipelineOrchestrator, DATA_DIR, REQUIRED_PACKAGES, REWRITTEN_SCRIPT_PATH, SCRIPT_PATH,
};
pub use timeline::{EventStatus, Stage, Timeline, TimelineEvent};
