//! OpenOperator server - accepts script uploads, runs the sandbox pipeline, and sweeps leaked sandboxes.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use openoperator::config::{Config, LogConfig};
use openoperator::pipeline::{JobReport, JobRequest, PipelineOrchestrator, SourceFile};
use openoperator::reaper::{reap_all, ReapReport};
use openoperator::rewriter::{ChatClient, CodeRewriter};
use openoperator::sandbox::{RemoteSandboxProvider, SandboxProvider};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Directive for the connectivity smoke test
const SMOKE_DIRECTIVE: &str = "You are a helpful assistant that writes Python. \
Respond only with the code to run and nothing else.";

/// Prompt for the connectivity smoke test
const SMOKE_PROMPT: &str = "Write a simple Python program that prints \
'Hello from the sandbox!' and computes 2 + 2";

// ---- CLI ----

#[derive(Parser)]
#[command(name = "openoperator-server", about = "OpenOperator execution server")]
struct Args {
    /// Bind address (defaults to SERVER_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Port (defaults to SERVER_PORT)
    #[arg(long, short)]
    port: Option<u16>,
}

// ---- App State ----

#[derive(Clone)]
struct ServerState {
    orchestrator: Arc<PipelineOrchestrator>,
    provider: Arc<dyn SandboxProvider>,
    rewriter: Arc<dyn CodeRewriter>,
}

// ---- Error Handling ----

struct AppError(openoperator::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<openoperator::Error> for AppError {
    fn from(err: openoperator::Error) -> Self {
        AppError(err)
    }
}

// ---- Response Types ----

#[derive(Serialize)]
struct ReapResponse {
    status: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    killed_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_count: Option<usize>,
    errors: Vec<String>,
}

#[derive(Serialize)]
struct SmokeResponse {
    status: String,
    message: String,
    generated_code: String,
    test_output: String,
}

// ---- Handlers ----

async fn execute(
    State(state): State<ServerState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JobReport>), AppError> {
    let request = parse_execute_form(multipart).await?;

    let request_id = Uuid::new_v4();
    info!(%request_id, "execute request received");

    // The job holds a live sandbox; it must reach teardown even if the
    // client disconnects and this handler future is dropped
    let report = state
        .orchestrator
        .clone()
        .spawn_run(request)
        .await
        .map_err(|e| openoperator::Error::Internal(format!("Job task failed: {}", e)))?;

    let status = if report.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok((status, Json(report)))
}

/// Pull the script and data files out of the multipart form
async fn parse_execute_form(mut multipart: Multipart) -> Result<JobRequest, AppError> {
    let mut request = JobRequest::empty();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError(openoperator::Error::Validation(format!(
            "Malformed multipart body: {}",
            e
        )))
    })? {
        let field_name = field.name().map(|n| n.to_string());

        match field_name.as_deref() {
            Some("python_file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content = field.text().await.map_err(|e| {
                    AppError(openoperator::Error::Validation(format!(
                        "Could not read python_file: {}",
                        e
                    )))
                })?;
                request.script = Some(SourceFile {
                    name: file_name,
                    content,
                });
            }
            Some("data_files") => {
                let file_name = match field.file_name() {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => continue,
                };
                let content = field.bytes().await.map_err(|e| {
                    AppError(openoperator::Error::Validation(format!(
                        "Could not read data file: {}",
                        e
                    )))
                })?;
                request = request.with_data_file(file_name, content.to_vec());
            }
            _ => {}
        }
    }

    Ok(request)
}

async fn kill_sandboxes(State(state): State<ServerState>) -> (StatusCode, Json<ReapResponse>) {
    reap_response(reap_all(state.provider.as_ref()).await)
}

/// Map a sweep outcome onto the wire shape: a completed sweep reports its
/// counts; a failure to enumerate sandboxes at all reports only the error.
fn reap_response(
    result: openoperator::Result<ReapReport>,
) -> (StatusCode, Json<ReapResponse>) {
    match result {
        Ok(report) => (
            StatusCode::OK,
            Json(ReapResponse {
                status: "success".to_string(),
                message: report.message,
                killed_count: Some(report.killed_count),
                failed_count: Some(report.failed_count),
                errors: report.errors,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ReapResponse {
                status: "error".to_string(),
                message: format!("Failed to list/kill sandboxes: {}", e),
                killed_count: None,
                failed_count: None,
                errors: vec![e.to_string()],
            }),
        ),
    }
}

async fn smoke_test(State(state): State<ServerState>) -> Result<Json<SmokeResponse>, AppError> {
    let code = state.rewriter.rewrite(SMOKE_PROMPT, SMOKE_DIRECTIVE).await?;

    // Same detachment as /execute: the provisioned sandbox must be torn
    // down even if the client goes away
    let provider = state.provider.clone();
    let script = code.clone();
    let run = tokio::spawn(async move {
        let handle = provider.provision().await?;

        let result = async {
            handle.write_file("smoke_test.py", script.as_bytes()).await?;
            handle.run_command("python smoke_test.py").await
        }
        .await;

        if let Err(e) = handle.terminate().await {
            warn!(error = %e, "smoke test sandbox teardown failed");
        }

        result
    })
    .await
    .map_err(|e| openoperator::Error::Internal(format!("Smoke test task failed: {}", e)))?;

    let output = run?;

    Ok(Json(SmokeResponse {
        status: "success".to_string(),
        message: "Sandbox and rewriter connectivity verified".to_string(),
        generated_code: code,
        test_output: output.stdout,
    }))
}

// ---- Router ----

fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/kill-sandboxes", post(kill_sandboxes))
        .route("/test", get(smoke_test))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
}

// ---- Main ----

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&log.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if log.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load config
    let config = Config::from_env()?;
    config.validate()?;

    init_tracing(&config.log);

    // Build collaborators
    let provider: Arc<dyn SandboxProvider> =
        Arc::new(RemoteSandboxProvider::new(config.sandbox_api.clone())?);
    let rewriter: Arc<dyn CodeRewriter> = Arc::new(ChatClient::new(config.rewriter.clone())?);
    let orchestrator = Arc::new(PipelineOrchestrator::new(provider.clone(), rewriter.clone()));

    let state = ServerState {
        orchestrator,
        provider,
        rewriter,
    };

    // Build router
    let app = build_router(state);

    // Bind and serve
    let bind = args.bind.unwrap_or(config.server.bind);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!(version = openoperator::VERSION, "listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reap_success_body_carries_counts() {
        let report = ReapReport {
            killed_count: 2,
            failed_count: 1,
            errors: vec!["Failed to kill sandbox b: boom".to_string()],
            message: "Killed 2 sandboxes, failed to kill 1".to_string(),
        };

        let (status, Json(body)) = reap_response(Ok(report));

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "success");
        assert_eq!(body.killed_count, Some(2));
        assert_eq!(body.failed_count, Some(1));
        assert_eq!(body.errors.len(), 1);
    }

    #[test]
    fn test_reap_enumeration_failure_body() {
        let err =
            openoperator::Error::Provisioning("List sandboxes failed (503): down".to_string());

        let (status, Json(body)) = reap_response(Err(err));

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status, "error");
        assert!(body.message.starts_with("Failed to list/kill sandboxes:"));
        assert!(body.message.contains("503"));
        assert_eq!(body.errors.len(), 1);
        assert!(body.killed_count.is_none());
        assert!(body.failed_count.is_none());

        // The counts are omitted from the error body entirely
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("killed_count").is_none());
        assert!(value.get("failed_count").is_none());
    }
}
