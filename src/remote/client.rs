//! HTTP client for a remote libSQL (Turso) database.
//!
//! Speaks the pipeline protocol (`POST /v2/pipeline`). Configuration is via
//! environment variables:
//! - `AUTOENV_TURSO_URL` - Database URL (`libsql://` is rewritten to `https://`)
//! - `AUTOENV_TURSO_AUTH_TOKEN` - Bearer token

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: check AUTOENV_TURSO_AUTH_TOKEN")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Statement failed: {0}")]
    Statement(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),
}

/// A SQL value on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { value: s.into() }
    }

    pub fn opt_text(s: Option<impl Into<String>>) -> Self {
        s.map_or(Self::Null, Self::text)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { value } => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A statement with positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

/// Rows returned by one statement.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct PipelineRequest {
    baton: Option<String>,
    requests: Vec<StreamRequest>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamRequest {
    Execute { stmt: Statement },
    Batch { batch: Batch },
    Close,
}

#[derive(Debug, Serialize)]
struct Batch {
    steps: Vec<BatchStep>,
}

#[derive(Debug, Serialize)]
struct BatchStep {
    stmt: Statement,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<BatchCondition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BatchCondition {
    Ok { step: usize },
    Not { cond: Box<BatchCondition> },
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    results: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: StreamError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResponse {
    Execute { result: QueryResult },
    Batch { result: BatchResult },
    Close,
}

#[derive(Debug, Deserialize)]
struct BatchResult {
    step_results: Vec<Option<QueryResult>>,
    step_errors: Vec<Option<StreamError>>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

/// HTTP client for the remote registry replica.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: String,
    auth_token: Option<String>,
    client: Client,
}

impl RemoteClient {
    /// Create client from configuration; `None` when no remote is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let url = config.turso_url.as_deref()?;
        Some(Self::new(url, config.turso_auth_token.clone()))
    }

    /// Create with explicit configuration.
    pub fn new(url: &str, auth_token: Option<String>) -> Self {
        Self {
            base_url: http_base_url(url),
            auth_token,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with optional auth header.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(ref token) = self.auth_token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn pipeline(&self, requests: Vec<StreamRequest>) -> Result<Vec<StreamResult>, ClientError> {
        let body = PipelineRequest {
            baton: None,
            requests,
        };
        let response = self
            .request(reqwest::Method::POST, "/v2/pipeline")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized,
                _ => ClientError::Server(format!("{}: {}", status, body)),
            });
        }

        let parsed: PipelineResponse = response.json().await?;
        Ok(parsed.results)
    }

    /// Run statements one after another; each result is returned in order.
    ///
    /// Statements are independent: a failure does not undo earlier ones.
    pub async fn execute(&self, stmts: Vec<Statement>) -> Result<Vec<QueryResult>, ClientError> {
        let count = stmts.len();
        let mut requests: Vec<StreamRequest> = stmts
            .into_iter()
            .map(|stmt| StreamRequest::Execute { stmt })
            .collect();
        requests.push(StreamRequest::Close);

        let results = self.pipeline(requests).await?;
        collect_execute_results(results, count)
    }

    /// Run statements inside one remote transaction. Nothing is committed
    /// unless every statement succeeds.
    pub async fn transaction(&self, stmts: Vec<Statement>) -> Result<(), ClientError> {
        if stmts.is_empty() {
            return Ok(());
        }
        let batch = transaction_batch(stmts);
        let commit_step = batch.steps.len() - 2;

        let results = self
            .pipeline(vec![StreamRequest::Batch { batch }, StreamRequest::Close])
            .await?;
        check_transaction_result(results, commit_step)
    }
}

/// `libsql://host` → `https://host`, without a trailing slash.
fn http_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    match url.strip_prefix("libsql://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

fn collect_execute_results(
    results: Vec<StreamResult>,
    expected: usize,
) -> Result<Vec<QueryResult>, ClientError> {
    let mut out = Vec::with_capacity(expected);
    for result in results.into_iter().take(expected) {
        match result {
            StreamResult::Ok {
                response: StreamResponse::Execute { result },
            } => out.push(result),
            StreamResult::Ok { response } => {
                return Err(ClientError::Protocol(format!(
                    "expected execute response, got {:?}",
                    response
                )))
            }
            StreamResult::Error { error } => return Err(ClientError::Statement(error.message)),
        }
    }
    if out.len() != expected {
        return Err(ClientError::Protocol(format!(
            "expected {} results, got {}",
            expected,
            out.len()
        )));
    }
    Ok(out)
}

// BEGIN; each statement only if the previous step succeeded; COMMIT if the
// last statement succeeded; ROLLBACK if COMMIT did not run.
fn transaction_batch(stmts: Vec<Statement>) -> Batch {
    let mut steps = vec![BatchStep {
        stmt: Statement::new("BEGIN"),
        condition: None,
    }];
    for stmt in stmts {
        let previous = steps.len() - 1;
        steps.push(BatchStep {
            stmt,
            condition: Some(BatchCondition::Ok { step: previous }),
        });
    }
    let last = steps.len() - 1;
    steps.push(BatchStep {
        stmt: Statement::new("COMMIT"),
        condition: Some(BatchCondition::Ok { step: last }),
    });
    let commit = steps.len() - 1;
    steps.push(BatchStep {
        stmt: Statement::new("ROLLBACK"),
        condition: Some(BatchCondition::Not {
            cond: Box::new(BatchCondition::Ok { step: commit }),
        }),
    });
    Batch { steps }
}

fn check_transaction_result(
    results: Vec<StreamResult>,
    commit_step: usize,
) -> Result<(), ClientError> {
    let result = match results.into_iter().next() {
        Some(StreamResult::Ok {
            response: StreamResponse::Batch { result },
        }) => result,
        Some(StreamResult::Error { error }) => return Err(ClientError::Statement(error.message)),
        other => {
            return Err(ClientError::Protocol(format!(
                "expected batch response, got {:?}",
                other
            )))
        }
    };

    let committed = matches!(result.step_results.get(commit_step), Some(Some(_)));
    if committed {
        return Ok(());
    }

    let message = result
        .step_errors
        .into_iter()
        .flatten()
        .next()
        .map(|e| e.message)
        .unwrap_or_else(|| "transaction was not committed".to_string());
    Err(ClientError::Statement(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn libsql_urls_become_https() {
        assert_eq!(
            http_base_url("libsql://db-org.turso.io/"),
            "https://db-org.turso.io"
        );
        assert_eq!(http_base_url("http://127.0.0.1:8080"), "http://127.0.0.1:8080");
    }

    #[test]
    fn execute_request_serializes_to_pipeline_json() {
        let body = PipelineRequest {
            baton: None,
            requests: vec![
                StreamRequest::Execute {
                    stmt: Statement::with_args(
                        "SELECT ?",
                        vec![Value::text("a"), Value::Null],
                    ),
                },
                StreamRequest::Close,
            ],
        };

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "baton": null,
                "requests": [
                    {"type": "execute", "stmt": {"sql": "SELECT ?", "args": [
                        {"type": "text", "value": "a"},
                        {"type": "null"}
                    ]}},
                    {"type": "close"}
                ]
            })
        );
    }

    #[test]
    fn parses_execute_results() {
        let raw = json!({
            "baton": null,
            "base_url": null,
            "results": [
                {"type": "ok", "response": {"type": "execute", "result": {
                    "cols": [{"name": "path", "decltype": "TEXT"}],
                    "rows": [[{"type": "text", "value": "/a"}], [{"type": "null"}]],
                    "affected_row_count": 0,
                    "last_insert_rowid": null
                }}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        });
        let parsed: PipelineResponse = serde_json::from_value(raw).unwrap();

        let results = collect_execute_results(parsed.results, 1).unwrap();

        assert_eq!(results[0].rows.len(), 2);
        assert_eq!(results[0].rows[0][0].as_text(), Some("/a"));
        assert!(results[0].rows[1][0].is_null());
    }

    #[test]
    fn statement_errors_surface() {
        let raw = json!({
            "results": [
                {"type": "error", "error": {"message": "no such table: projects", "code": "SQLITE_ERROR"}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        });
        let parsed: PipelineResponse = serde_json::from_value(raw).unwrap();

        let err = collect_execute_results(parsed.results, 1).unwrap_err();

        assert!(matches!(err, ClientError::Statement(m) if m.contains("no such table")));
    }

    #[test]
    fn transaction_batch_chains_conditions() {
        let batch = transaction_batch(vec![Statement::new("A"), Statement::new("B")]);
        let json = serde_json::to_value(&batch).unwrap();
        let steps = json["steps"].as_array().unwrap();

        assert_eq!(steps.len(), 5);
        assert_eq!(steps[0]["stmt"]["sql"], "BEGIN");
        assert!(steps[0].get("condition").is_none());
        assert_eq!(steps[2]["condition"], json!({"type": "ok", "step": 1}));
        assert_eq!(steps[3]["stmt"]["sql"], "COMMIT");
        assert_eq!(steps[3]["condition"], json!({"type": "ok", "step": 2}));
        assert_eq!(
            steps[4]["condition"],
            json!({"type": "not", "cond": {"type": "ok", "step": 3}})
        );
    }

    #[test]
    fn uncommitted_transaction_reports_first_error() {
        let raw = json!({
            "results": [
                {"type": "ok", "response": {"type": "batch", "result": {
                    "step_results": [{"cols": [], "rows": []}, null, null, {"cols": [], "rows": []}],
                    "step_errors": [null, {"message": "constraint failed"}, null, null]
                }}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        });
        let parsed: PipelineResponse = serde_json::from_value(raw).unwrap();

        let err = check_transaction_result(parsed.results, 2).unwrap_err();

        assert!(matches!(err, ClientError::Statement(m) if m == "constraint failed"));
    }

    #[test]
    fn committed_transaction_is_ok() {
        let raw = json!({
            "results": [
                {"type": "ok", "response": {"type": "batch", "result": {
                    "step_results": [{}, {}, {}, null],
                    "step_errors": [null, null, null, null]
                }}}
            ]
        });
        let parsed: PipelineResponse = serde_json::from_value(raw).unwrap();

        assert!(check_transaction_result(parsed.results, 2).is_ok());
    }
}
