use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClauditError {
    #[error("missing credential: set {0} to use the API backend")]
    MissingCredential(String),
    #[error(
        "no analysis backend available: install the `{tool}` CLI (free tier with Google login) or export GEMINI_API_KEY (https://aistudio.google.com)"
    )]
    NoBackendAvailable { tool: String },
    #[error("--force-cli and --force-api cannot be combined")]
    ConflictingBackendFlags,
    #[error("config invalid: {0}")]
    InvalidConfig(String),
    #[error("project not found: {0} (run `claudit projects` to list known projects)")]
    ProjectNotFound(String),
    #[error("project directory not found: {}", .0.display())]
    ProjectDirMissing(PathBuf),
    #[error("no conversation logs (*.jsonl) found in {}", .0.display())]
    NoLogFiles(PathBuf),
    #[error("no analyzable records found in {}", .0.display())]
    NoRecords(PathBuf),
    #[error("{tool} still rate limited after {attempts} attempts")]
    RateLimitExhausted { tool: String, attempts: u32 },
    #[error("{tool} timed out after {secs}s without a rate-limit signature")]
    ToolTimedOut { tool: String, secs: u64 },
    #[error("{tool} failed (exit {code}): {stderr}")]
    ToolFailed {
        tool: String,
        code: String,
        stderr: String,
    },
    #[error("failed to spawn `{tool}`: {reason}")]
    ToolSpawn { tool: String, reason: String },
    #[error("api call failed with status {status}: {body}")]
    ApiStatus { status: u16, body: String },
    #[error("api response missing text content")]
    ApiMalformed,
}
