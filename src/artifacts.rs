//! Generated artifact collection
//!
//! After execution the sandbox working directory is scanned for files the
//! pipeline recognizes as artifacts (plots and rendered documents). The
//! directory listing comes back as raw long-listing text from an untrusted
//! environment, so filename extraction is confined to [`artifact_names`];
//! nothing else in the crate parses listing lines.

use crate::sandbox::SandboxHandle;
use crate::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// File extensions collected as artifacts
pub const ARTIFACT_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".pdf"];

/// One collected artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Filename inside the sandbox working directory
    pub name: String,
    /// Base64-encoded file content
    pub content: String,
}

/// Extract artifact filenames from raw directory-listing lines.
///
/// The trailing whitespace-delimited token of each line is taken as the
/// filename; lines whose last token does not end in a recognized extension
/// are ignored, which also drops the `total` header and the `.`/`..`
/// entries a long listing carries.
pub fn artifact_names<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    lines
        .into_iter()
        .filter_map(|line| line.split_whitespace().last())
        .filter(|name| ARTIFACT_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
        .map(|name| name.to_string())
        .collect()
}

/// Collect recognized artifacts from the sandbox working directory.
///
/// A file that fails to download after being listed is skipped with a
/// warning; zero matches yields an empty collection, not an error.
pub async fn collect_artifacts(handle: &dyn SandboxHandle) -> Result<Vec<GeneratedArtifact>> {
    let lines = handle.list_dir(".").await?;
    let names = artifact_names(lines.iter().map(String::as_str));

    let mut artifacts = Vec::new();

    for name in names {
        match handle.read_file(&name).await {
            Ok(bytes) => {
                debug!(file = %name, size = bytes.len(), "collected artifact");
                artifacts.push(GeneratedArtifact {
                    content: BASE64.encode(&bytes),
                    name,
                });
            }
            Err(e) => {
                warn!(file = %name, error = %e, "skipping unreadable artifact");
            }
        }
    }

    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sandbox::CommandOutput;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn listing() -> Vec<&'static str> {
        vec![
            "total 24",
            "drwxr-xr-x  2 user user 4096 Jan  1 00:00 .",
            "drwxr-xr-x 20 user user 4096 Jan  1 00:00 ..",
            "-rw-r--r--  1 user user  220 Jan  1 00:00 script.py",
            "-rw-r--r--  1 user user 8123 Jan  1 00:01 plot.png",
            "-rw-r--r--  1 user user 9001 Jan  1 00:01 report.pdf",
            "-rw-r--r--  1 user user  312 Jan  1 00:01 results.csv",
        ]
    }

    #[test]
    fn test_recognized_extensions_extracted() {
        let names = artifact_names(listing());
        assert_eq!(names, vec!["plot.png", "report.pdf"]);
    }

    #[test]
    fn test_no_matches_is_empty() {
        let names = artifact_names(vec![
            "total 8",
            "-rw-r--r-- 1 user user 220 Jan  1 00:00 script.py",
        ]);
        assert!(names.is_empty());
    }

    #[test]
    fn test_header_and_blank_lines_ignored() {
        let names = artifact_names(vec!["total 0", "", "   "]);
        assert!(names.is_empty());
    }

    #[test]
    fn test_extension_match_is_on_trailing_token() {
        // A size column or date must never be mistaken for a filename
        let names = artifact_names(vec!["-rw-r--r-- 1 user user 1024 Jan  1 00:00 fig.jpeg"]);
        assert_eq!(names, vec!["fig.jpeg"]);
    }

    #[test]
    fn test_names_with_dots_keep_full_token() {
        let names = artifact_names(vec!["-rw-r--r-- 1 user user 99 Jan  1 00:00 run.2.png"]);
        assert_eq!(names, vec!["run.2.png"]);
    }

    struct ScanSandbox {
        listing: Vec<String>,
        files: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl SandboxHandle for ScanSandbox {
        fn id(&self) -> &str {
            "sb-scan"
        }

        fn is_live(&self) -> bool {
            true
        }

        async fn run_command(&self, command: &str) -> Result<CommandOutput> {
            let stdout = if command.starts_with("ls -la") {
                self.listing.join("\n")
            } else {
                String::new()
            };
            Ok(CommandOutput {
                stdout,
                stderr: String::new(),
                exit_code: 0,
            })
        }

        async fn write_file(&self, _path: &str, _content: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| Error::Transfer(format!("File download failed (500): {}", path)))
        }

        async fn terminate(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unreadable_artifact_is_skipped() {
        let mut files = HashMap::new();
        files.insert("plot.png".to_string(), vec![1u8, 2, 3]);

        // report.pdf is listed but cannot be downloaded
        let sandbox = ScanSandbox {
            listing: vec![
                "-rw-r--r-- 1 user user 8123 Jan  1 00:01 plot.png".to_string(),
                "-rw-r--r-- 1 user user 9001 Jan  1 00:01 report.pdf".to_string(),
            ],
            files,
        };

        let artifacts = collect_artifacts(&sandbox).await.unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "plot.png");
        assert_eq!(artifacts[0].content, BASE64.encode([1u8, 2, 3]));
    }
}
