use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use log::debug;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::UnderwritingConfig;
use crate::error::{Result, UnderwritingError};
use crate::schema::Record;
use crate::warehouse::{ParameterizedQuery, QueryExecutor, WarehouseError};

const BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const QUERY_TIMEOUT_MS: u64 = 10_000;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

type QueryResult<T> = std::result::Result<T, WarehouseError>;

/// Runs standard-SQL queries through the `jobs.query` REST endpoint.
#[derive(Clone)]
pub struct BigQueryClient {
    client: Client,
    project_id: String,
    access_token: String,
    base_url: String,
}

impl BigQueryClient {
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            project_id: project_id.into(),
            access_token: access_token.into(),
            base_url: BIGQUERY_BASE_URL.to_string(),
        }
    }

    pub fn from_config(config: &UnderwritingConfig) -> Result<Self> {
        let token = config.bigquery_access_token.clone().ok_or_else(|| {
            UnderwritingError::MissingConfig(crate::config::ENV_ACCESS_TOKEN.to_string())
        })?;
        Ok(Self::new(config.project_id.clone(), token))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn start_query(&self, query: &ParameterizedQuery) -> QueryResult<QueryResponse> {
        let url = format!("{}/projects/{}/queries", self.base_url, self.project_id);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&build_query_request(query))
            .send()
            .await
            .map_err(transport)?;

        read_response(res).await
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> QueryResult<QueryResponse> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, job.project_id, job.job_id
        );

        let mut params = vec![("timeoutMs", QUERY_TIMEOUT_MS.to_string())];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let res = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await
            .map_err(transport)?;

        read_response(res).await
    }
}

#[async_trait]
impl QueryExecutor for BigQueryClient {
    async fn run(&self, query: &ParameterizedQuery) -> QueryResult<Vec<Record>> {
        debug!("Running query: {}", query.sql);

        let mut response = self.start_query(query).await?;
        let mut schema: Option<TableSchema> = None;
        let mut rows = Vec::new();

        loop {
            if let Some(errors) = response.errors.as_ref().filter(|e| !e.is_empty()) {
                return Err(WarehouseError::Transport(
                    errors
                        .iter()
                        .map(|e| e.message.clone())
                        .collect::<Vec<_>>()
                        .join("; "),
                ));
            }

            if response.job_complete {
                if schema.is_none() {
                    schema = response.schema.take();
                }
                if let Some(page) = response.rows.take() {
                    let fields = schema
                        .as_ref()
                        .map(|s| s.fields.as_slice())
                        .ok_or_else(|| {
                            WarehouseError::Unexpected(
                                "Query returned rows without a schema".to_string(),
                            )
                        })?;
                    for row in page {
                        rows.push(convert_row(fields, row)?);
                    }
                }
            }

            let next_page = if response.job_complete {
                match response.page_token.take() {
                    Some(token) => Some(token),
                    None => break,
                }
            } else {
                sleep(POLL_INTERVAL).await;
                None
            };

            let job = response.job_reference.take().ok_or_else(|| {
                WarehouseError::Unexpected(
                    "Query response is missing its job reference".to_string(),
                )
            })?;
            response = self.query_results(&job, next_page.as_deref()).await?;
            if response.job_reference.is_none() {
                response.job_reference = Some(job);
            }
        }

        debug!("Query returned {} rows", rows.len());
        Ok(rows)
    }
}

fn transport(err: reqwest::Error) -> WarehouseError {
    WarehouseError::Transport(err.to_string())
}

async fn read_response(res: Response) -> QueryResult<QueryResponse> {
    let status = res.status();
    let body = res.text().await.map_err(transport)?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(WarehouseError::Transport(format!(
            "BigQuery returned status {}: {}",
            status, message
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| WarehouseError::Unexpected(format!("Malformed query response: {}", e)))
}

fn build_query_request(query: &ParameterizedQuery) -> Value {
    let parameters: Vec<Value> = query
        .parameters
        .iter()
        .map(|p| {
            // An empty parameterValue binds a typed NULL.
            let value = if p.value.is_null() {
                json!({})
            } else {
                json!({ "value": p.value.to_string() })
            };
            json!({
                "name": p.name,
                "parameterType": { "type": p.value.type_name() },
                "parameterValue": value,
            })
        })
        .collect();

    json!({
        "query": query.sql,
        "useLegacySql": false,
        "parameterMode": "NAMED",
        "queryParameters": parameters,
        "timeoutMs": QUERY_TIMEOUT_MS,
    })
}

fn convert_row(fields: &[FieldSchema], row: Value) -> QueryResult<Record> {
    let cells = match row {
        Value::Object(mut obj) => match obj.remove("f") {
            Some(Value::Array(cells)) => cells,
            _ => {
                return Err(WarehouseError::Unexpected(
                    "Row is missing its cell list".to_string(),
                ))
            }
        },
        _ => return Err(WarehouseError::Unexpected("Row is not an object".to_string())),
    };

    if cells.len() != fields.len() {
        return Err(WarehouseError::Unexpected(format!(
            "Row has {} cells but the schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    let mut record = Record::new();
    for (field, cell) in fields.iter().zip(cells) {
        let raw = match cell {
            Value::Object(mut obj) => obj.remove("v").unwrap_or(Value::Null),
            other => other,
        };
        record.insert(field.name.clone(), convert_value(field, raw)?);
    }
    Ok(record)
}

fn convert_value(field: &FieldSchema, raw: Value) -> QueryResult<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    if field.mode.as_deref() == Some("REPEATED") {
        let items = match raw {
            Value::Array(items) => items,
            other => return Ok(other),
        };
        let element = FieldSchema {
            mode: None,
            ..field.clone()
        };
        return items
            .into_iter()
            .map(|item| {
                let inner = match item {
                    Value::Object(mut obj) if obj.contains_key("v") => {
                        obj.remove("v").unwrap_or(Value::Null)
                    }
                    other => other,
                };
                convert_value(&element, inner)
            })
            .collect::<QueryResult<Vec<_>>>()
            .map(Value::Array);
    }

    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => match &field.fields {
            Some(nested) => Ok(Value::Object(convert_row(nested, raw)?)),
            None => Ok(raw),
        },
        "INTEGER" | "INT64" => parse_scalar(&raw, |s| s.parse::<i64>().ok().map(Value::from)),
        "FLOAT" | "FLOAT64" => parse_scalar(&raw, |s| s.parse::<f64>().ok().map(Value::from)),
        "BOOLEAN" | "BOOL" => parse_scalar(&raw, |s| match s.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        }),
        "TIMESTAMP" => parse_scalar(&raw, |s| {
            let seconds = s.parse::<f64>().ok()?;
            let micros = (seconds * 1_000_000.0).round() as i64;
            DateTime::from_timestamp_micros(micros)
                .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
        }),
        // NUMERIC, BIGNUMERIC, DATE, DATETIME and the rest stay strings so no
        // precision is lost.
        _ => Ok(match raw {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }),
    }
}

fn parse_scalar<F>(raw: &Value, parse: F) -> QueryResult<Value>
where
    F: Fn(&str) -> Option<Value>,
{
    let text = match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    parse(&text).ok_or_else(|| {
        WarehouseError::Unexpected(format!("Cannot convert cell value '{}'", text))
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    mode: Option<String>,
    fields: Option<Vec<FieldSchema>>,
}

#[derive(Debug, Clone, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorProto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    rows: Option<Vec<Value>>,
    page_token: Option<String>,
    errors: Option<Vec<ErrorProto>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, field_type: &str) -> FieldSchema {
        FieldSchema {
            name: name.to_string(),
            field_type: field_type.to_string(),
            mode: None,
            fields: None,
        }
    }

    #[test]
    fn test_query_request_binds_named_parameters() {
        let query = ParameterizedQuery::new("SELECT * FROM t WHERE property_id = @property_id")
            .bind("property_id", 101_i64);
        let body = build_query_request(&query);

        assert_eq!(body["parameterMode"], "NAMED");
        assert_eq!(body["useLegacySql"], false);
        assert_eq!(
            body["queryParameters"][0],
            json!({
                "name": "property_id",
                "parameterType": { "type": "INT64" },
                "parameterValue": { "value": "101" }
            })
        );
    }

    #[test]
    fn test_convert_row_by_schema_type() {
        let fields = vec![
            field("property_id", "INTEGER"),
            field("address", "STRING"),
            field("cap_rate", "FLOAT"),
            field("is_active", "BOOLEAN"),
            field("lease_end_date", "DATE"),
            field("updated_at", "TIMESTAMP"),
            field("notes", "STRING"),
        ];
        let row = json!({ "f": [
            { "v": "101" },
            { "v": "440 N Wabash Ave" },
            { "v": "6.25" },
            { "v": "true" },
            { "v": "2026-06-30" },
            { "v": "1.6725312E9" },
            { "v": null }
        ]});

        let record = convert_row(&fields, row).unwrap();

        assert_eq!(record["property_id"], 101);
        assert_eq!(record["address"], "440 N Wabash Ave");
        assert_eq!(record["cap_rate"], 6.25);
        assert_eq!(record["is_active"], true);
        assert_eq!(record["lease_end_date"], "2026-06-30");
        assert_eq!(record["updated_at"], "2023-01-01T00:00:00Z");
        assert!(record["notes"].is_null());
    }

    #[test]
    fn test_convert_repeated_and_record_cells() {
        let fields = vec![
            FieldSchema {
                mode: Some("REPEATED".to_string()),
                ..field("floors", "INTEGER")
            },
            FieldSchema {
                fields: Some(vec![field("city", "STRING"), field("zip", "STRING")]),
                ..field("location", "RECORD")
            },
        ];
        let row = json!({ "f": [
            { "v": [{ "v": "1" }, { "v": "2" }] },
            { "v": { "f": [{ "v": "Chicago" }, { "v": "60611" }] } }
        ]});

        let record = convert_row(&fields, row).unwrap();

        assert_eq!(record["floors"], json!([1, 2]));
        assert_eq!(record["location"], json!({ "city": "Chicago", "zip": "60611" }));
    }

    #[test]
    fn test_bad_integer_cell_is_unexpected() {
        let fields = vec![field("property_id", "INTEGER")];
        let err = convert_row(&fields, json!({ "f": [{ "v": "abc" }] })).unwrap_err();
        assert!(matches!(err, WarehouseError::Unexpected(_)));
    }

    #[test]
    fn test_cell_count_mismatch_is_unexpected() {
        let fields = vec![field("a", "STRING"), field("b", "STRING")];
        assert!(convert_row(&fields, json!({ "f": [{ "v": "x" }] })).is_err());
    }

    #[test]
    fn test_null_parameter_binds_empty_value() {
        let query = ParameterizedQuery::new("SELECT * FROM t WHERE state = @state")
            .bind("state", None::<&str>);
        let body = build_query_request(&query);

        assert_eq!(
            body["queryParameters"][0],
            json!({
                "name": "state",
                "parameterType": { "type": "STRING" },
                "parameterValue": {}
            })
        );
    }

    #[test]
    fn test_numeric_cells_keep_full_precision() {
        let fields = vec![field("sale_price", "BIGNUMERIC"), field("cap_rate", "NUMERIC")];
        let row = json!({ "f": [
            { "v": "123456789012345678901234.123456789" },
            { "v": "6.125" }
        ]});

        let record = convert_row(&fields, row).unwrap();

        assert_eq!(record["sale_price"], "123456789012345678901234.123456789");
        assert_eq!(record["cap_rate"], "6.125");
    }

    fn stub_client(server: &mockito::ServerGuard) -> BigQueryClient {
        BigQueryClient::new("acme", "token").with_base_url(server.url())
    }

    fn comp_query() -> ParameterizedQuery {
        ParameterizedQuery::new("SELECT comp_id FROM `acme.cre_data.market_comps`")
    }

    fn comp_schema() -> Value {
        json!({ "fields": [{ "name": "comp_id", "type": "INTEGER" }] })
    }

    #[tokio::test]
    async fn test_run_polls_until_job_completes() {
        let mut server = mockito::Server::new_async().await;
        let start = server
            .mock("POST", "/projects/acme/queries")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jobReference": { "projectId": "acme", "jobId": "job-poll", "location": "US" },
                    "jobComplete": false
                })
                .to_string(),
            )
            .create_async()
            .await;
        let poll = server
            .mock("GET", "/projects/acme/queries/job-poll")
            .match_query(mockito::Matcher::UrlEncoded(
                "location".into(),
                "US".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jobReference": { "projectId": "acme", "jobId": "job-poll", "location": "US" },
                    "jobComplete": true,
                    "schema": comp_schema(),
                    "rows": [{ "f": [{ "v": "401" }] }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let rows = stub_client(&server).run(&comp_query()).await.unwrap();

        start.assert_async().await;
        poll.assert_async().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["comp_id"], 401);
    }

    #[tokio::test]
    async fn test_run_joins_pages_in_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/projects/acme/queries")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jobReference": { "projectId": "acme", "jobId": "job-pages" },
                    "jobComplete": true,
                    "schema": comp_schema(),
                    "rows": [{ "f": [{ "v": "401" }] }],
                    "pageToken": "page-2"
                })
                .to_string(),
            )
            .create_async()
            .await;
        // Later pages omit the job reference and schema; both carry over.
        let second = server
            .mock("GET", "/projects/acme/queries/job-pages")
            .match_query(mockito::Matcher::UrlEncoded(
                "pageToken".into(),
                "page-2".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jobComplete": true,
                    "rows": [{ "f": [{ "v": "402" }] }],
                    "pageToken": "page-3"
                })
                .to_string(),
            )
            .create_async()
            .await;
        let third = server
            .mock("GET", "/projects/acme/queries/job-pages")
            .match_query(mockito::Matcher::UrlEncoded(
                "pageToken".into(),
                "page-3".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jobComplete": true,
                    "rows": [{ "f": [{ "v": "403" }] }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let rows = stub_client(&server).run(&comp_query()).await.unwrap();

        second.assert_async().await;
        third.assert_async().await;
        let ids: Vec<i64> = rows.iter().map(|r| r["comp_id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![401, 402, 403]);
    }

    #[tokio::test]
    async fn test_run_maps_error_status_to_transport() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/projects/acme/queries")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "error": { "code": 403, "message": "Access Denied: Table acme:cre_data.market_comps" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let err = stub_client(&server).run(&comp_query()).await.unwrap_err();

        match err {
            WarehouseError::Transport(msg) => {
                assert!(msg.contains("403"));
                assert!(msg.contains("Access Denied"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_maps_error_payload_to_transport() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/projects/acme/queries")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jobReference": { "projectId": "acme", "jobId": "job-err" },
                    "jobComplete": true,
                    "errors": [{ "message": "Resources exceeded during query execution" }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let err = stub_client(&server).run(&comp_query()).await.unwrap_err();

        assert_eq!(
            err,
            WarehouseError::Transport("Resources exceeded during query execution".to_string())
        );
    }

    #[tokio::test]
    async fn test_run_maps_malformed_body_to_unexpected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/projects/acme/queries")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let err = stub_client(&server).run(&comp_query()).await.unwrap_err();

        assert!(matches!(err, WarehouseError::Unexpected(msg) if msg.contains("Malformed")));
    }

    #[test]
    fn test_from_config_requires_access_token() {
        let config = UnderwritingConfig::new("acme", "key");
        assert!(matches!(
            BigQueryClient::from_config(&config),
            Err(UnderwritingError::MissingConfig(_))
        ));
        assert!(BigQueryClient::from_config(&config.with_access_token("token")).is_ok());
    }
}
