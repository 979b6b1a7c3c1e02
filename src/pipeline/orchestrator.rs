//! Stage sequencing for one job
//!
//! The orchestrator drives a provisioned sandbox through upload, optional
//! data upload, dependency install, rewrite, execution, and artifact
//! collection, recording one timeline event per stage. Teardown runs on
//! every exit path; a teardown failure is logged and never masks the
//! primary result.

use crate::artifacts::{collect_artifacts, GeneratedArtifact};
use crate::error::{Error, Result};
use crate::pipeline::job::{DataFile, JobReport, JobRequest};
use crate::pipeline::timeline::{truncate_snippet, Stage, Timeline, TimelineEvent};
use crate::rewriter::{strip_code_fences, CodeRewriter, REWRITE_DIRECTIVE};
use crate::sandbox::{SandboxHandle, SandboxProvider};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Where the uploaded script lands in the sandbox
pub const SCRIPT_PATH: &str = "script.py";

/// Where the rewritten script lands, alongside the original
pub const REWRITTEN_SCRIPT_PATH: &str = "optimized_script.py";

/// Subdirectory for uploaded data files
pub const DATA_DIR: &str = "data";

/// Packages installed into every sandbox before execution
pub const REQUIRED_PACKAGES: [&str; 6] = [
    "pandas",
    "numpy",
    "matplotlib",
    "scikit-learn",
    "seaborn",
    "requests",
];

/// Everything the stages produce for a successful report
struct StageOutputs {
    python_code: String,
    optimized_code: String,
    output: String,
    artifacts: Vec<GeneratedArtifact>,
}

/// Runs jobs against injected sandbox and rewriter collaborators
pub struct PipelineOrchestrator {
    /// Sandbox fleet access
    provider: Arc<dyn SandboxProvider>,
    /// Code rewrite collaborator
    rewriter: Arc<dyn CodeRewriter>,
}

impl PipelineOrchestrator {
    /// Create an orchestrator over the given collaborators
    pub fn new(provider: Arc<dyn SandboxProvider>, rewriter: Arc<dyn CodeRewriter>) -> Self {
        PipelineOrchestrator { provider, rewriter }
    }

    /// Run one job to a terminal state.
    ///
    /// Never fails at the type level: every outcome, including provisioning
    /// failure, is folded into a well-formed [`JobReport`].
    pub async fn run(&self, request: JobRequest) -> JobReport {
        let mut timeline = Timeline::new();

        let handle = match self.provider.provision().await {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "sandbox provisioning failed");
                timeline.record(terminal_failure_event(&e));
                return JobReport::failure(timeline, &e);
            }
        };

        let sandbox_id = handle.id().to_string();
        info!(sandbox_id = %sandbox_id, "sandbox created");

        let outcome = self
            .run_stages(handle.as_ref(), &request, &mut timeline)
            .await;

        if let Err(e) = handle.terminate().await {
            warn!(sandbox_id = %sandbox_id, error = %e, "sandbox teardown failed");
        }

        match outcome {
            Ok(outputs) => {
                info!(sandbox_id = %sandbox_id, events = timeline.len(), "job completed");
                JobReport::success(
                    sandbox_id,
                    timeline,
                    outputs.python_code,
                    outputs.optimized_code,
                    outputs.output,
                    outputs.artifacts,
                )
            }
            Err(e) => {
                error!(sandbox_id = %sandbox_id, error = %e, "job failed");
                timeline.record(terminal_failure_event(&e));
                JobReport::failure(timeline, &e)
            }
        }
    }

    /// Run one job on a detached task, returning its join handle.
    ///
    /// A running job holds a live sandbox, so it must reach teardown even
    /// when the caller stops waiting, as happens when an HTTP connection is
    /// dropped mid-request. Awaiting the handle yields the report; dropping
    /// it abandons the wait, not the job.
    pub fn spawn_run(self: Arc<Self>, request: JobRequest) -> JoinHandle<JobReport> {
        tokio::spawn(async move { self.run(request).await })
    }

    /// Stages 1 through 6, aborting on the first error
    async fn run_stages(
        &self,
        sandbox: &dyn SandboxHandle,
        request: &JobRequest,
        timeline: &mut Timeline,
    ) -> Result<StageOutputs> {
        let python_code = self.upload_script(sandbox, request, timeline).await?;

        if !request.data_files.is_empty() {
            self.upload_data_files(sandbox, &request.data_files, timeline)
                .await?;
        }

        self.install_dependencies(sandbox, timeline).await?;

        let optimized_code = self.rewrite_script(sandbox, &python_code, timeline).await?;
        let output = self.execute_script(sandbox, timeline).await?;
        let artifacts = self.collect(sandbox, timeline).await;

        Ok(StageOutputs {
            python_code,
            optimized_code,
            output,
            artifacts,
        })
    }

    /// Stage 1: validate and upload the script, then read it back
    async fn upload_script(
        &self,
        sandbox: &dyn SandboxHandle,
        request: &JobRequest,
        timeline: &mut Timeline,
    ) -> Result<String> {
        let script = request
            .script
            .as_ref()
            .ok_or_else(|| Error::Validation("No Python file uploaded".to_string()))?;

        if !script.name.ends_with(".py") {
            return Err(Error::Validation(
                "Invalid file type. Must be a .py file".to_string(),
            ));
        }

        sandbox
            .write_file(SCRIPT_PATH, script.content.as_bytes())
            .await?;

        // Write-integrity check; a mismatch is logged, not fatal
        let readback = sandbox.run_command(&format!("cat {}", SCRIPT_PATH)).await?;
        if readback.stdout != script.content {
            warn!(sandbox_id = %sandbox.id(), "script read-back does not match uploaded content");
        }

        timeline.record(TimelineEvent::complete(
            Stage::FileUpload,
            format!("Uploaded Python file: {}", script.name),
            script.content.clone(),
            readback.stdout,
        ));

        Ok(script.content.clone())
    }

    /// Stage 2: place data files under the data subdirectory
    async fn upload_data_files(
        &self,
        sandbox: &dyn SandboxHandle,
        data_files: &[DataFile],
        timeline: &mut Timeline,
    ) -> Result<()> {
        let mkdir = sandbox.run_command(&format!("mkdir -p {}", DATA_DIR)).await?;
        if !mkdir.success() {
            return Err(Error::Transfer(format!(
                "Failed to create data directory: {}",
                mkdir.stderr
            )));
        }

        for file in data_files {
            let remote_path = format!("{}/{}", DATA_DIR, file.name);
            sandbox.write_file(&remote_path, &file.content).await?;
        }

        let listing = sandbox.run_command(&format!("ls -la {}", DATA_DIR)).await?;
        let names: Vec<&str> = data_files.iter().map(|f| f.name.as_str()).collect();

        timeline.record(TimelineEvent::complete(
            Stage::DataUpload,
            format!("Uploaded data files: {}", names.join(", ")),
            format!("{:?}", names),
            listing.stdout,
        ));

        Ok(())
    }

    /// Stage 3: one batched install of the fixed package set
    async fn install_dependencies(
        &self,
        sandbox: &dyn SandboxHandle,
        timeline: &mut Timeline,
    ) -> Result<()> {
        let install_command = format!("pip install {} --quiet", REQUIRED_PACKAGES.join(" "));
        let install = sandbox.run_command(&install_command).await?;
        if !install.success() {
            warn!(
                sandbox_id = %sandbox.id(),
                exit_code = install.exit_code,
                "package install exited non-zero"
            );
        }

        // The installer may legitimately print nothing; confirm via pip list
        let verify_command = format!("pip list | grep -E \"{}\"", REQUIRED_PACKAGES.join("|"));
        let verify = sandbox.run_command(&verify_command).await?;
        let output = if verify.stdout.is_empty() {
            "Installation completed silently".to_string()
        } else {
            verify.stdout
        };

        timeline.record(TimelineEvent::complete(
            Stage::Dependencies,
            "Installed required packages",
            install_command,
            output,
        ));

        Ok(())
    }

    /// Stage 4: rewrite the script and store the result alongside the original
    async fn rewrite_script(
        &self,
        sandbox: &dyn SandboxHandle,
        python_code: &str,
        timeline: &mut Timeline,
    ) -> Result<String> {
        let rewritten = self.rewriter.rewrite(python_code, REWRITE_DIRECTIVE).await?;

        // Rewriters are not required to strip markdown framing themselves
        let optimized_code = strip_code_fences(&rewritten);

        sandbox
            .write_file(REWRITTEN_SCRIPT_PATH, optimized_code.as_bytes())
            .await?;

        timeline.record(TimelineEvent::complete(
            Stage::Optimization,
            "Code optimized successfully",
            python_code.to_string(),
            optimized_code.clone(),
        ));

        Ok(optimized_code)
    }

    /// Stage 5: run the rewritten script; a non-zero exit is data, not an error
    async fn execute_script(
        &self,
        sandbox: &dyn SandboxHandle,
        timeline: &mut Timeline,
    ) -> Result<String> {
        let run_command = format!("python {}", REWRITTEN_SCRIPT_PATH);
        let result = sandbox.run_command(&run_command).await?;

        let mut captured = result.stdout.clone();
        if !result.success() && !result.stderr.is_empty() {
            if !captured.is_empty() {
                captured.push('\n');
            }
            captured.push_str(&result.stderr);
        }
        let captured = truncate_snippet(&captured);

        let details = if result.success() {
            "Code executed successfully".to_string()
        } else {
            format!("Script exited with code {}", result.exit_code)
        };

        timeline.record(TimelineEvent::complete(
            Stage::Execution,
            details,
            "Running optimized script",
            captured.clone(),
        ));

        Ok(captured)
    }

    /// Stage 6: gather artifacts, degrading to an empty set on failure
    async fn collect(
        &self,
        sandbox: &dyn SandboxHandle,
        timeline: &mut Timeline,
    ) -> Vec<GeneratedArtifact> {
        match collect_artifacts(sandbox).await {
            Ok(artifacts) => {
                let details = if artifacts.is_empty() {
                    "No generated files found".to_string()
                } else {
                    format!("Collected {} generated files", artifacts.len())
                };
                let output = if artifacts.is_empty() {
                    "No artifacts found".to_string()
                } else {
                    artifacts
                        .iter()
                        .map(|a| a.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                };

                timeline.record(TimelineEvent::complete(
                    Stage::Collection,
                    details,
                    "Scanning working directory",
                    output,
                ));

                artifacts
            }
            Err(e) => {
                warn!(sandbox_id = %sandbox.id(), error = %e, "artifact collection failed");
                timeline.record(TimelineEvent::complete(
                    Stage::Collection,
                    "Artifact collection failed, continuing without artifacts",
                    "Scanning working directory",
                    e.to_string(),
                ));
                Vec::new()
            }
        }
    }
}

/// The single error event a failed run ends with
fn terminal_failure_event(error: &Error) -> TimelineEvent {
    TimelineEvent::error(
        Stage::Execution,
        format!("Error during execution: {}", error),
        "Error occurred during processing",
        error.to_string(),
    )
}
