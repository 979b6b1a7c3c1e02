//! Configuration management for OpenOperator
//!
//! Loads configuration from environment variables.

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};

/// Sandbox fleet API configuration
#[derive(Debug, Clone)]
pub struct SandboxApiConfig {
    /// API key for the sandbox fleet service
    pub api_key: SecretString,
    /// Base URL for the sandbox fleet API
    pub base_url: String,
    /// Deadline for control-plane and file transfer requests, in seconds
    pub request_timeout_secs: u64,
    /// Deadline for a single in-sandbox command, in seconds
    pub command_timeout_secs: u64,
}

/// Code rewrite provider configuration
#[derive(Debug, Clone)]
pub struct RewriterConfig {
    /// API key for the completion provider
    pub api_key: SecretString,
    /// Base URL for the OpenAI-compatible chat completions API
    pub base_url: String,
    /// Model used for code rewrites
    pub model: String,
    /// Deadline for a completion request, in seconds
    pub timeout_secs: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter
    pub level: String,
    /// Log format (pretty, json)
    pub format: String,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Sandbox fleet API settings
    pub sandbox_api: SandboxApiConfig,
    /// Code rewrite provider settings
    pub rewriter: RewriterConfig,
    /// HTTP server settings
    pub server: ServerConfig,
    /// Logging settings
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Config {
            sandbox_api: SandboxApiConfig {
                api_key: SecretString::from(std::env::var("SANDBOX_API_KEY")?),
                base_url: std::env::var("SANDBOX_API_URL")?,
                request_timeout_secs: std::env::var("SANDBOX_REQUEST_TIMEOUT")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                command_timeout_secs: std::env::var("SANDBOX_COMMAND_TIMEOUT")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
            },
            rewriter: RewriterConfig {
                api_key: SecretString::from(std::env::var("REWRITER_API_KEY")?),
                base_url: std::env::var("REWRITER_BASE_URL")
                    .unwrap_or_else(|_| "https://api.mistral.ai/v1".to_string()),
                model: std::env::var("REWRITER_MODEL")
                    .unwrap_or_else(|_| "mistral-large-latest".to_string()),
                timeout_secs: std::env::var("REWRITER_TIMEOUT")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .unwrap_or(120),
            },
            server: ServerConfig {
                bind: std::env::var("SERVER_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .unwrap_or(8000),
            },
            log: LogConfig {
                level: std::env::var("RUST_LOG")
                    .unwrap_or_else(|_| "info,openoperator=debug".to_string()),
                format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
        })
    }

    /// Create a minimal config for tests that don't need full config
    pub fn minimal() -> Self {
        Config {
            sandbox_api: SandboxApiConfig {
                api_key: SecretString::from(""),
                base_url: "http://localhost:3000".to_string(),
                request_timeout_secs: 30,
                command_timeout_secs: 300,
            },
            rewriter: RewriterConfig {
                api_key: SecretString::from(""),
                base_url: "https://api.mistral.ai/v1".to_string(),
                model: "mistral-large-latest".to_string(),
                timeout_secs: 120,
            },
            server: ServerConfig {
                bind: "0.0.0.0".to_string(),
                port: 8000,
            },
            log: LogConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    /// Validate that all required configuration is present
    pub fn validate(&self) -> Result<()> {
        if self.sandbox_api.api_key.expose_secret().is_empty() {
            return Err(Error::Config("SANDBOX_API_KEY is required".to_string()));
        }
        if self.sandbox_api.base_url.is_empty() {
            return Err(Error::Config("SANDBOX_API_URL is required".to_string()));
        }
        if self.rewriter.api_key.expose_secret().is_empty() {
            return Err(Error::Config("REWRITER_API_KEY is required".to_string()));
        }
        Ok(())
    }
}
