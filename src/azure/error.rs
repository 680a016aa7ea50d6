//! Query errors
//!
//! Failure modes of a single resource graph query, plus helpers to turn
//! them into short messages suitable for logs and the terminal.

use std::time::Duration;
use thiserror::Error;

/// Maximum length of CLI stderr kept in an error (to avoid dumping tokens or huge payloads)
const MAX_STDERR_LENGTH: usize = 200;

/// Error returned by a [`QuerySource`](crate::resource::QuerySource)
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query program could not be started at all
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The query did not finish within the configured timeout
    #[error("query timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// The query program exited unsuccessfully
    #[error("query exited with status {status}: {stderr}")]
    Failed { status: String, stderr: String },
    /// The query output was not valid JSON
    #[error("query returned malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    /// The query output was JSON, but neither an array nor an object with a `data` array
    #[error("query returned an unexpected document shape: {0}")]
    UnexpectedShape(String),
}

impl QueryError {
    /// Build a [`QueryError::Failed`] from raw process output
    pub fn failed(status: impl ToString, stderr: &[u8]) -> Self {
        Self::Failed {
            status: status.to_string(),
            stderr: sanitize_for_log(&String::from_utf8_lossy(stderr)),
        }
    }
}

/// Sanitize CLI output for logging
/// Truncates long output and drops control characters
pub fn sanitize_for_log(body: &str) -> String {
    let body = body.trim();
    let truncated = if body.len() > MAX_STDERR_LENGTH {
        let mut end = MAX_STDERR_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control() && c != ' ', " ")
}

/// Format a query error for display
pub fn format_query_error(error: &QueryError) -> String {
    match error {
        QueryError::Spawn { program, .. } => {
            format!("Could not run '{}'. Is the Azure CLI installed and on PATH?", program)
        }
        QueryError::Timeout(limit) => {
            format!("Azure CLI did not answer within {}s.", limit.as_secs())
        }
        QueryError::Failed { stderr, .. } => {
            if stderr.contains("az login") {
                return "Not logged in. Run 'az login' first.".to_string();
            }
            if stderr.contains("resource-graph") || stderr.contains("'graph' is misspelled") {
                return "Resource Graph extension missing. Run 'az extension add --name resource-graph'.".to_string();
            }
            if stderr.contains("429") || stderr.contains("Throttl") {
                return "Resource Graph throttled the request. Please try again later.".to_string();
            }
            if stderr.contains("AuthorizationFailed") || stderr.contains("403") {
                return "Permission denied. Check your Azure RBAC role assignments.".to_string();
            }

            let short = stderr.chars().take(80).collect::<String>();
            if short.len() < stderr.len() {
                format!("Query failed: {}...", short)
            } else {
                format!("Query failed: {}", short)
            }
        }
        QueryError::MalformedJson(_) => "Azure CLI returned output that is not JSON.".to_string(),
        QueryError::UnexpectedShape(kind) => {
            format!("Azure CLI returned an unexpected {} document.", kind)
        }
    }
}
