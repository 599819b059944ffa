// analyzer_test.rs - Full analysis pipeline against a mock backend:
// schema enumeration, per-schema isolation, access classification and
// target summary derivation.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use std::sync::{Arc, Mutex};
use supascan::analyzer::{AnalyzeOptions, analyze};
use supascan::progress::{ProgressReporter, ScanEvent};
use supascan::supabase_client::SupabaseClient;
use supascan::types::{AccessStatus, IntrospectionMethod};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SENTINEL: &str = "nonexistent_schema_that_should_not_exist";

fn anon_key() -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({"iss": "supabase", "role": "anon", "ref": "mockproj", "exp": 2000000000})
            .to_string()
            .as_bytes(),
    );
    format!("{header}.{payload}.mock_signature")
}

/// Three schemas; the middle one fails both introspection tiers and
/// must be skipped without failing the run.
async fn mount_backend(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .and(header("Accept-Profile", SENTINEL))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "message": "The schema must be one of the following: alpha, broken, gamma"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .and(header("Accept-Profile", "alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "swagger": "2.0",
            "paths": {
                "/": {},
                "/items": {},
                "/locked": {},
                "/empty_logs": {},
                "/rpc/ping": {
                    "post": {
                        "parameters": [{
                            "in": "body",
                            "schema": {
                                "type": "object",
                                "properties": {"name": {"type": "string"}},
                                "required": ["name"]
                            }
                        }],
                        "responses": {"200": {"schema": {"type": "string"}}}
                    }
                }
            },
            "definitions": {
                "items": {
                    "properties": {
                        "id": {"type": "integer"},
                        "label": {"type": "string"}
                    },
                    "required": ["id"]
                }
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .and(header("Accept-Profile", "broken"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql/v1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .and(header("Accept-Profile", "gamma"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "swagger": "2.0",
            "paths": {"/widgets": {}}
        })))
        .mount(server)
        .await;

    // alpha.items: readable with an estimated count.
    Mock::given(method("GET"))
        .and(path("/rest/v1/items"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "label": "first"}])),
        )
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/items"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "0-0/41"))
        .mount(server)
        .await;

    // alpha.locked: hard denial.
    Mock::given(method("GET"))
        .and(path("/rest/v1/locked"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "permission denied for table locked",
            "code": "42501"
        })))
        .mount(server)
        .await;

    // alpha.empty_logs and gamma.widgets: zero rows visible.
    Mock::given(method("GET"))
        .and(path("/rest/v1/empty_logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_analyze_skips_broken_schema_and_classifies_access() {
    let server = MockServer::start().await;
    mount_backend(&server).await;

    let key = anon_key();
    let client = SupabaseClient::new(&server.uri(), &key, None).unwrap();

    let skipped = Arc::new(Mutex::new(Vec::new()));
    let sink = skipped.clone();
    let reporter = ProgressReporter::new(move |event| {
        if let ScanEvent::SchemaSkipped { schema, .. } = event {
            sink.lock().unwrap().push(schema.clone());
        }
    });

    let result = analyze(
        &client,
        &server.uri(),
        &key,
        &AnalyzeOptions::default(),
        &reporter,
    )
    .await
    .unwrap();

    // Enumeration saw all three; only the healthy two were analyzed.
    assert_eq!(result.schemas, ["alpha", "broken", "gamma"]);
    let mut analyzed: Vec<&String> = result.schema_details.keys().collect();
    analyzed.sort();
    assert_eq!(analyzed, ["alpha", "gamma"]);
    assert_eq!(skipped.lock().unwrap().as_slice(), ["broken"]);

    let alpha = &result.schema_details["alpha"];
    assert_eq!(alpha.method, IntrospectionMethod::OpenApi);

    // Every introspected table has exactly one access entry.
    assert_eq!(alpha.tables.len(), 3);
    assert_eq!(alpha.table_access.len(), 3);
    for table in &alpha.tables {
        assert!(alpha.table_access.contains_key(&table.name));
    }

    let items = &alpha.table_access["items"];
    assert_eq!(items.status, AccessStatus::Readable);
    assert!(items.accessible && items.has_data);
    assert_eq!(items.row_count, Some(41));

    let locked = &alpha.table_access["locked"];
    assert_eq!(locked.status, AccessStatus::Denied);
    assert!(!locked.accessible && !locked.has_data);
    assert_eq!(locked.row_count, None);

    let empty = &alpha.table_access["empty_logs"];
    assert_eq!(empty.status, AccessStatus::Empty);
    assert!(empty.accessible && !empty.has_data);
    assert_eq!(empty.row_count, Some(0));

    assert_eq!(alpha.rpcs, ["ping"]);
    assert_eq!(alpha.rpc_functions.len(), 1);
    assert_eq!(alpha.rpc_functions[0].name, "ping");
    assert!(alpha.rpc_functions[0].parameters[0].required);

    let gamma = &result.schema_details["gamma"];
    assert_eq!(gamma.table_access["widgets"].status, AccessStatus::Empty);
}

#[tokio::test]
async fn test_analyze_summary_decodes_key_and_url() {
    let server = MockServer::start().await;
    mount_backend(&server).await;

    let key = anon_key();
    let client = SupabaseClient::new(&server.uri(), &key, None).unwrap();

    let result = analyze(
        &client,
        &server.uri(),
        &key,
        &AnalyzeOptions::default(),
        &ProgressReporter::silent(),
    )
    .await
    .unwrap();

    assert_eq!(result.summary.domain, "127.0.0.1");

    let jwt = result.summary.jwt_info.as_ref().unwrap();
    assert_eq!(jwt.role.as_deref(), Some("anon"));
    assert_eq!(jwt.project_ref.as_deref(), Some("mockproj"));

    let metadata = result.summary.metadata.as_ref().unwrap();
    assert_eq!(metadata.protocol.as_deref(), Some("http"));
    // A mock server host is not a managed Supabase host.
    assert!(metadata.service.is_none());
}

#[tokio::test]
async fn test_analyze_single_schema_option() {
    let server = MockServer::start().await;
    mount_backend(&server).await;

    let key = anon_key();
    let client = SupabaseClient::new(&server.uri(), &key, None).unwrap();

    let result = analyze(
        &client,
        &server.uri(),
        &key,
        &AnalyzeOptions {
            schema: Some("gamma".to_string()),
        },
        &ProgressReporter::silent(),
    )
    .await
    .unwrap();

    // The discovered list is still complete, but only the requested
    // schema was analyzed.
    assert_eq!(result.schemas, ["alpha", "broken", "gamma"]);
    let analyzed: Vec<&String> = result.schema_details.keys().collect();
    assert_eq!(analyzed, ["gamma"]);
}

#[tokio::test]
async fn test_analyze_fails_without_schema_list() {
    let server = MockServer::start().await;

    // Enumeration probe returns nothing parseable and analysis must
    // abort; a body with no message yields an empty schema list, so
    // return transport-level garbage instead.
    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(&server)
        .await;

    let key = anon_key();
    let client = SupabaseClient::new(&server.uri(), &key, None).unwrap();

    let err = analyze(
        &client,
        &server.uri(),
        &key,
        &AnalyzeOptions::default(),
        &ProgressReporter::silent(),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("not valid JSON"));
}
