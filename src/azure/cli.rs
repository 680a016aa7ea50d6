//! Azure CLI query source
//!
//! Runs `az graph query` as a child process and parses its JSON output.

use super::error::QueryError;
use crate::resource::{QuerySource, QueryTarget};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default program name for the Azure CLI
pub const DEFAULT_AZ_PATH: &str = "az";

/// Default per-query timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Query source backed by `az graph query`
#[derive(Debug, Clone)]
pub struct AzCliQuery {
    program: String,
    timeout: Duration,
}

impl AzCliQuery {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Arguments passed to the Azure CLI for a target
    fn args(target: &QueryTarget) -> Vec<String> {
        vec![
            "graph".to_string(),
            "query".to_string(),
            "-q".to_string(),
            build_kql(target),
            "-o".to_string(),
            "json".to_string(),
        ]
    }
}

impl Default for AzCliQuery {
    fn default() -> Self {
        Self::new(DEFAULT_AZ_PATH, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl QuerySource for AzCliQuery {
    async fn query(&self, target: &QueryTarget) -> Result<Vec<Value>, QueryError> {
        let args = Self::args(target);
        tracing::debug!("Executing: {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| QueryError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the wait future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| QueryError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                tracing::warn!("Query for {} timed out after {:?}", target, self.timeout);
                return Err(QueryError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            let err = QueryError::failed(output.status, &output.stderr);
            tracing::error!("Query for {} failed: {}", target, err);
            return Err(err);
        }

        parse_query_output(&output.stdout)
    }
}

/// Build the Resource Graph (KQL) query for a target
pub fn build_kql(target: &QueryTarget) -> String {
    match target {
        QueryTarget::All => "Resources".to_string(),
        QueryTarget::Id(id) => format!("Resources | where id == '{}'", escape_kql_string(id)),
    }
}

/// Escape a value for use inside a single-quoted KQL string literal
fn escape_kql_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Parse `az graph query` output into rows
///
/// Older CLI versions print a bare array; current ones print
/// `{"count": .., "data": [..], ..}`.
pub fn parse_query_output(stdout: &[u8]) -> Result<Vec<Value>, QueryError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    match serde_json::from_slice::<Value>(stdout)? {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => Err(QueryError::UnexpectedShape(json_kind(&other).to_string())),
            None => Err(QueryError::UnexpectedShape("object".to_string())),
        },
        other => Err(QueryError::UnexpectedShape(json_kind(&other).to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kql_for_single_id() {
        let target = QueryTarget::Id("/subscriptions/s/resourceGroups/rg".to_string());
        assert_eq!(
            build_kql(&target),
            "Resources | where id == '/subscriptions/s/resourceGroups/rg'"
        );
    }

    #[test]
    fn test_kql_for_all() {
        assert_eq!(build_kql(&QueryTarget::All), "Resources");
    }

    #[test]
    fn test_kql_escapes_quotes() {
        let target = QueryTarget::Id("x' or 1==1 or id=='y".to_string());
        assert_eq!(
            build_kql(&target),
            "Resources | where id == 'x\\' or 1==1 or id==\\'y'"
        );
    }

    #[test]
    fn test_args_request_json_output() {
        let args = AzCliQuery::args(&QueryTarget::All);
        assert_eq!(args, vec!["graph", "query", "-q", "Resources", "-o", "json"]);
    }

    #[test]
    fn test_parse_bare_array() {
        let rows = parse_query_output(br#"[{"id": "a"}, {"id": "b"}]"#).unwrap();
        assert_eq!(rows, vec![json!({"id": "a"}), json!({"id": "b"})]);
    }

    #[test]
    fn test_parse_data_envelope() {
        let out = br#"{"count": 1, "data": [{"id": "a"}], "skip_token": null, "total_records": 1}"#;
        let rows = parse_query_output(out).unwrap();
        assert_eq!(rows, vec![json!({"id": "a"})]);
    }

    #[test]
    fn test_parse_empty_output_is_no_rows() {
        assert!(parse_query_output(b"").unwrap().is_empty());
        assert!(parse_query_output(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_json() {
        let err = parse_query_output(b"{not json").unwrap_err();
        assert!(matches!(err, QueryError::MalformedJson(_)));
    }

    #[test]
    fn test_parse_unexpected_shape() {
        let err = parse_query_output(b"42").unwrap_err();
        assert!(matches!(err, QueryError::UnexpectedShape(ref kind) if kind == "number"));

        let err = parse_query_output(br#"{"rows": []}"#).unwrap_err();
        assert!(matches!(err, QueryError::UnexpectedShape(ref kind) if kind == "object"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let query = AzCliQuery::new("azinfo-test-no-such-binary", Duration::from_secs(5));
        let err = query.query(&QueryTarget::All).await.unwrap_err();
        assert!(matches!(err, QueryError::Spawn { .. }));
    }
}
