// supabase_client.rs - Thin PostgREST/GraphQL client for Supabase targets
// Purpose: Issue the raw HTTP requests the analysis pipeline needs
//          (description documents, bounded selects, head counts, RPC
//          calls) and hand back loosely-parsed {data, error, count}
//          responses. Deliberately pass-through, not a query builder.

use anyhow::{Context, Result, bail};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::types::Credentials;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// PostgREST explain plan format, mirroring the full option set the
/// query client exposes.
const EXPLAIN_ACCEPT: &str =
    "application/vnd.pgrst.plan+text; options=analyze|verbose|settings|buffers|wal";

/// Query-level error body returned by PostgREST. An RLS denial arrives
/// in this shape with a 4xx status, not as a transport failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryError {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// The `{data, error, count}` triple every table/RPC query yields.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub data: Option<Value>,
    pub error: Option<QueryError>,
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct RpcOptions {
    pub limit: Option<usize>,
    pub explain: bool,
    pub get: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDump {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
    pub count: i64,
}

pub struct SupabaseClient {
    http: reqwest::Client,
    url: String,
    key: String,
}

impl SupabaseClient {
    pub fn new(
        url: &str,
        key: &str,
        extra_headers: Option<&HashMap<String, String>>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(key).context("API key is not a valid header value")?,
        );
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {key}"))
                .context("API key is not a valid header value")?,
        );
        if let Some(extra) = extra_headers {
            for (name, value) in extra {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .with_context(|| format!("invalid header name: {name}"))?;
                let value = HeaderValue::from_str(value)
                    .with_context(|| format!("invalid header value for {name}"))?;
                headers.insert(name, value);
            }
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        Self::new(
            &credentials.url,
            &credentials.key,
            credentials.headers.as_ref(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/", self.url)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url, table)
    }

    /// Fetch the schema's self-describing OpenAPI document. Fails on a
    /// non-OK status; use [`probe_schema`](Self::probe_schema) when the
    /// error body itself is the interesting part.
    pub async fn fetch_rest_description(&self, schema: &str) -> Result<Value> {
        let res = self
            .http
            .get(self.rest_url())
            .header("Accept", "application/openapi+json")
            .header("Accept-Profile", schema)
            .send()
            .await
            .context("description document fetch failed")?;

        if !res.status().is_success() {
            bail!("OpenAPI fetch failed: {}", res.status().as_u16());
        }

        res.json::<Value>()
            .await
            .context("description document is not valid JSON")
    }

    /// Same request as `fetch_rest_description` but returns the response
    /// body regardless of status. The schema enumerator reads the error
    /// body of a deliberately invalid probe.
    pub async fn probe_schema(&self, schema: &str) -> Result<Value> {
        let res = self
            .http
            .get(self.rest_url())
            .header("Accept", "application/openapi+json")
            .header("Accept-Profile", schema)
            .send()
            .await
            .context("schema probe request failed")?;

        res.json::<Value>()
            .await
            .context("schema probe response is not valid JSON")
    }

    /// POST a GraphQL query and return the raw response body.
    pub async fn graphql(&self, query: &str) -> Result<Value> {
        let res = self
            .http
            .post(format!("{}/graphql/v1", self.url))
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .context("GraphQL request failed")?;

        if !res.status().is_success() {
            bail!("GraphQL introspection failed: {}", res.status().as_u16());
        }

        res.json::<Value>()
            .await
            .context("GraphQL response is not valid JSON")
    }

    /// Bounded `select * limit N` against one table.
    pub async fn select_rows(
        &self,
        schema: &str,
        table: &str,
        limit: usize,
    ) -> Result<QueryResponse> {
        let limit = limit.to_string();
        let res = self
            .http
            .get(self.table_url(table))
            .query(&[("select", "*"), ("limit", limit.as_str())])
            .header("Accept-Profile", schema)
            .send()
            .await
            .context("table select request failed")?;

        let status = res.status();
        let body = res.text().await.unwrap_or_default();

        if !status.is_success() {
            return Ok(QueryResponse {
                data: None,
                error: Some(parse_error_body(&body, status.as_u16())),
                count: None,
            });
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(data) => Ok(QueryResponse {
                data: Some(data),
                error: None,
                count: None,
            }),
            Err(e) => Ok(QueryResponse {
                data: None,
                error: Some(QueryError {
                    message: format!("invalid JSON response: {e}"),
                    ..Default::default()
                }),
                count: None,
            }),
        }
    }

    /// Estimated row count via a head-only select. Returns `None` when
    /// the backend does not report one.
    pub async fn head_count(&self, schema: &str, table: &str) -> Result<Option<i64>> {
        let res = self
            .http
            .head(self.table_url(table))
            .query(&[("select", "*")])
            .header("Accept-Profile", schema)
            .header("Prefer", "count=estimated")
            .send()
            .await
            .context("head count request failed")?;

        if !res.status().is_success() {
            return Ok(None);
        }

        Ok(res
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total))
    }

    /// Bounded dump of one table with an exact count.
    pub async fn dump_table(&self, schema: &str, table: &str, limit: usize) -> Result<TableDump> {
        let limit = limit.to_string();
        let res = self
            .http
            .get(self.table_url(table))
            .query(&[("select", "*"), ("limit", limit.as_str())])
            .header("Accept-Profile", schema)
            .header("Prefer", "count=exact")
            .send()
            .await
            .context("table dump request failed")?;

        let status = res.status();
        let total = res
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        let body = res.text().await.unwrap_or_default();

        if !status.is_success() {
            let error = parse_error_body(&body, status.as_u16());
            bail!("table dump failed: {}", error.message);
        }

        let rows: Vec<Value> = serde_json::from_str(&body)
            .context("table dump response is not a JSON array")?;

        let columns = rows
            .first()
            .and_then(|row| row.as_object())
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();

        let count = total.unwrap_or(rows.len() as i64);

        Ok(TableDump {
            columns,
            rows,
            count,
        })
    }

    /// Invoke a named server-side function. `opts.get` switches to a
    /// read-only GET invocation with args passed as query parameters.
    pub async fn call_rpc(
        &self,
        schema: &str,
        rpc_name: &str,
        args: &Value,
        opts: &RpcOptions,
    ) -> Result<Value> {
        let url = format!("{}/rest/v1/rpc/{}", self.url, rpc_name);

        let mut req = if opts.get {
            let mut builder = self.http.get(&url).header("Accept-Profile", schema);
            if let Some(map) = args.as_object() {
                let params: Vec<(String, String)> = map
                    .iter()
                    .map(|(k, v)| {
                        let value = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), value)
                    })
                    .collect();
                builder = builder.query(&params);
            }
            builder
        } else {
            self.http
                .post(&url)
                .header("Content-Profile", schema)
                .json(args)
        };

        if opts.explain {
            req = req.header("Accept", EXPLAIN_ACCEPT);
        } else if let Some(limit) = opts.limit {
            req = req.header("Range-Unit", "items").header(
                "Range",
                format!("0-{}", limit.saturating_sub(1)),
            );
        }

        let res = req.send().await.context("RPC request failed")?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();

        if !status.is_success() {
            let error = parse_error_body(&body, status.as_u16());
            bail!("RPC call failed: {}", error.message);
        }

        if opts.explain {
            return Ok(Value::String(body));
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).context("RPC response is not valid JSON")
    }
}

fn parse_error_body(body: &str, status: u16) -> QueryError {
    serde_json::from_str::<QueryError>(body)
        .ok()
        .filter(|e| !e.message.is_empty())
        .unwrap_or_else(|| QueryError {
            message: format!("HTTP {status}"),
            ..Default::default()
        })
}

/// `Content-Range: 0-9/123` -> 123. A `*` total means unknown.
fn parse_content_range_total(value: &str) -> Option<i64> {
    let total = value.rsplit('/').next()?;
    total.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-9/123"), Some(123));
        assert_eq!(parse_content_range_total("*/3391"), Some(3391));
        assert_eq!(parse_content_range_total("0-0/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_parse_error_body_prefers_message() {
        let error = parse_error_body(
            r#"{"message":"permission denied for table users","code":"42501"}"#,
            401,
        );
        assert_eq!(error.message, "permission denied for table users");
        assert_eq!(error.code.as_deref(), Some("42501"));
    }

    #[test]
    fn test_parse_error_body_falls_back_to_status() {
        assert_eq!(parse_error_body("not json", 404).message, "HTTP 404");
        assert_eq!(parse_error_body("{}", 500).message, "HTTP 500");
    }

    #[test]
    fn test_client_normalizes_trailing_slash() {
        let client = SupabaseClient::new("https://abc.supabase.co/", "key", None).unwrap();
        assert_eq!(client.url(), "https://abc.supabase.co");
        assert_eq!(client.rest_url(), "https://abc.supabase.co/rest/v1/");
    }
}
