//! Job request and report types

use crate::artifacts::GeneratedArtifact;
use crate::pipeline::timeline::Timeline;
use crate::Error;
use serde::Serialize;

/// The script a job should run
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Filename as uploaded by the caller
    pub name: String,
    /// UTF-8 script text
    pub content: String,
}

/// One data file uploaded alongside the script
#[derive(Debug, Clone)]
pub struct DataFile {
    /// Filename as uploaded by the caller
    pub name: String,
    /// Raw file bytes
    pub content: Vec<u8>,
}

/// Inbound job: a script plus optional data files
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    /// Script to execute, if one was supplied
    pub script: Option<SourceFile>,
    /// Data files to place in the sandbox data directory
    pub data_files: Vec<DataFile>,
}

impl JobRequest {
    /// Create a request carrying a script
    pub fn new(script_name: impl Into<String>, script_content: impl Into<String>) -> Self {
        JobRequest {
            script: Some(SourceFile {
                name: script_name.into(),
                content: script_content.into(),
            }),
            data_files: Vec::new(),
        }
    }

    /// Create a request with no script (rejected during upload validation)
    pub fn empty() -> Self {
        JobRequest::default()
    }

    /// Attach a data file
    pub fn with_data_file(mut self, name: impl Into<String>, content: Vec<u8>) -> Self {
        self.data_files.push(DataFile {
            name: name.into(),
            content,
        });
        self
    }
}

/// Overall outcome of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Pipeline ran to completion
    Success,
    /// Pipeline aborted
    Error,
}

/// Final result of one pipeline run.
///
/// Always well-formed: a failed run carries a message and the timeline as
/// recorded up to and including the terminal error event, with the
/// success-only fields omitted from serialization.
#[derive(Debug, Serialize)]
pub struct JobReport {
    /// Overall outcome
    pub status: JobStatus,
    /// Failure description, present only on error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Ordered stage events
    pub timeline_events: Timeline,
    /// Sandbox that ran the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<String>,
    /// Script as uploaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python_code: Option<String>,
    /// Script as rewritten by the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimized_code: Option<String>,
    /// Captured execution output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Artifacts collected after execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_files: Option<Vec<GeneratedArtifact>>,
}

impl JobReport {
    /// Assemble a success report
    pub fn success(
        sandbox_id: String,
        timeline: Timeline,
        python_code: String,
        optimized_code: String,
        output: String,
        generated_files: Vec<GeneratedArtifact>,
    ) -> Self {
        JobReport {
            status: JobStatus::Success,
            message: None,
            timeline_events: timeline,
            sandbox_id: Some(sandbox_id),
            python_code: Some(python_code),
            optimized_code: Some(optimized_code),
            output: Some(output),
            generated_files: Some(generated_files),
        }
    }

    /// Assemble a failure report from the timeline recorded so far
    pub fn failure(timeline: Timeline, error: &Error) -> Self {
        JobReport {
            status: JobStatus::Error,
            message: Some(error.to_string()),
            timeline_events: timeline,
            sandbox_id: None,
            python_code: None,
            optimized_code: None,
            output: None,
            generated_files: None,
        }
    }

    /// Whether the pipeline ran to completion
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::timeline::{Stage, TimelineEvent};

    #[test]
    fn test_request_builder() {
        let request = JobRequest::new("script.py", "print(1)")
            .with_data_file("input.csv", b"a,b\n1,2\n".to_vec());

        assert_eq!(request.script.as_ref().unwrap().name, "script.py");
        assert_eq!(request.data_files.len(), 1);
        assert_eq!(request.data_files[0].name, "input.csv");
    }

    #[test]
    fn test_success_report_carries_wire_fields() {
        let mut timeline = Timeline::new();
        timeline.record(TimelineEvent::complete(Stage::FileUpload, "up", "", ""));

        let report = JobReport::success(
            "sb-1".to_string(),
            timeline,
            "print(1)".to_string(),
            "print(1)".to_string(),
            "1\n".to_string(),
            Vec::new(),
        );

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["sandbox_id"], "sb-1");
        assert_eq!(value["python_code"], "print(1)");
        assert!(value["timeline_events"].is_array());
        assert!(value["generated_files"].as_array().unwrap().is_empty());
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_failure_report_omits_success_fields() {
        let error = Error::Validation("No Python file uploaded".to_string());
        let report = JobReport::failure(Timeline::new(), &error);

        assert!(!report.is_success());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value["message"]
            .as_str()
            .unwrap()
            .contains("No Python file uploaded"));
        assert!(value.get("sandbox_id").is_none());
        assert!(value.get("output").is_none());
        assert!(value.get("generated_files").is_none());
    }
}
