//! LLM-assisted code rewriting
//!
//! The pipeline hands the uploaded script to a [`CodeRewriter`] together
//! with a directive describing the rewrite, and executes whatever comes
//! back. The production implementation is [`ChatClient`], which talks to an
//! OpenAI-compatible chat completions API. Models are told not to wrap the
//! code in markdown, but some do anyway, so every rewrite passes through
//! [`strip_code_fences`] before it is trusted.

mod client;

pub use client::ChatClient;

use crate::Result;
use async_trait::async_trait;

/// Directive for the optimization rewrite applied to every uploaded script
pub const REWRITE_DIRECTIVE: &str = "\
You are an expert Python programmer. Analyze and optimize the provided Python code for:
1. Better performance
2. Better readability
3. Better error handling
4. Better data validation
5. Better visualization if applicable
6. Include any dependencies that may be missing as part of the dependency install step (e.g. pip install)

Return only the optimized Python code without any markdown formatting, code blocks, or explanations.";

/// Rewrites source code according to a directive
#[async_trait]
pub trait CodeRewriter: Send + Sync {
    /// Rewrite `source` as instructed by `directive`, returning plain
    /// source text with no markdown framing
    async fn rewrite(&self, source: &str, directive: &str) -> Result<String>;
}

/// Strip a surrounding markdown code fence, if present.
///
/// Handles ```` ```python ```` and bare ```` ``` ```` openers, with or
/// without a trailing fence. Idempotent: text without a leading fence is
/// only trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the info string ("python", "py", or empty) through end of line
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => "",
    };

    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);

    body.trim().to_string()
}
