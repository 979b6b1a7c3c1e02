//! Remote sandbox fleet access
//!
//! A sandbox is a disposable remote execution environment reached over the
//! fleet API. [`SandboxProvider`] covers the control plane (provision, list,
//! kill) and [`SandboxHandle`] covers I/O against one live sandbox.
//! Control-plane failures surface as `Error::Provisioning`, in-sandbox file
//! and command I/O as `Error::Transfer`.

mod remote;

pub use remote::{RemoteSandbox, RemoteSandboxProvider};

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Captured output of a command executed inside a sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Process exit code
    pub exit_code: i64,
}

impl CommandOutput {
    /// Whether the command exited with code zero
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Identifying record for a live sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInfo {
    /// Fleet-assigned sandbox id
    pub sandbox_id: String,
}

/// One live sandbox
#[async_trait]
pub trait SandboxHandle: Send + Sync {
    /// Fleet-assigned id of this sandbox
    fn id(&self) -> &str;

    /// Whether this handle has not yet been terminated
    fn is_live(&self) -> bool;

    /// Run a shell command inside the sandbox
    async fn run_command(&self, command: &str) -> Result<CommandOutput>;

    /// Write a file into the sandbox working directory
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Read a file out of the sandbox
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// List a directory inside the sandbox, one raw listing line per entry
    async fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let output = self.run_command(&format!("ls -la {}", path)).await?;
        Ok(output.stdout.lines().map(|line| line.to_string()).collect())
    }

    /// Tear the sandbox down. Repeat calls are no-ops.
    async fn terminate(&self) -> Result<()>;
}

/// Sandbox fleet control plane
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provision a fresh sandbox
    async fn provision(&self) -> Result<Box<dyn SandboxHandle>>;

    /// List every live sandbox owned by this account
    async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>>;

    /// Kill one sandbox by id
    async fn kill_sandbox(&self, sandbox_id: &str) -> Result<()>;
}
