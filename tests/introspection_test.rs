// introspection_test.rs - Schema enumeration and tiered introspection
// against a mock PostgREST/GraphQL backend.

use serde_json::json;
use supascan::progress::ProgressReporter;
use supascan::schema_introspector::{get_schema, get_schemas};
use supascan::supabase_client::SupabaseClient;
use supascan::types::IntrospectionMethod;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> SupabaseClient {
    SupabaseClient::new(&server.uri(), "test-key", None).unwrap()
}

fn introspection_body() -> serde_json::Value {
    json!({
        "data": {
            "__schema": {
                "types": [
                    {"name": "Query", "kind": "OBJECT", "fields": []},
                    {
                        "name": "notes",
                        "kind": "OBJECT",
                        "fields": [
                            {"name": "id", "type": {"name": null, "kind": "NON_NULL", "ofType": {"name": "UUID", "kind": "SCALAR"}}},
                            {"name": "body", "type": {"name": "String", "kind": "SCALAR"}}
                        ]
                    },
                    {"name": "notesConnection", "kind": "OBJECT", "fields": []}
                ]
            }
        }
    })
}

#[tokio::test]
async fn test_get_schemas_parses_message_listing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "message": "The schema must be one of the following: public, storage, graphql_public"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let schemas = get_schemas(&client, &ProgressReporter::silent())
        .await
        .unwrap();

    assert_eq!(schemas, ["public", "storage", "graphql_public"]);
}

#[tokio::test]
async fn test_get_schemas_falls_back_to_hint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "message": "Invalid schema",
            "hint": "Only the schemas in the search path are exposed: public, auth"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let schemas = get_schemas(&client, &ProgressReporter::silent())
        .await
        .unwrap();

    assert_eq!(schemas, ["public", "auth"]);
}

#[tokio::test]
async fn test_get_schemas_rejects_resolving_sentinel() {
    let server = MockServer::start().await;

    // The sentinel probe somehow returned a real description document.
    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paths": {"/users": {}}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = get_schemas(&client, &ProgressReporter::silent())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("shouldn't happen"));
}

#[tokio::test]
async fn test_get_schema_prefers_description_document() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .and(header("Accept-Profile", "public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "swagger": "2.0",
            "paths": {"/": {}, "/notes": {}},
            "definitions": {
                "notes": {
                    "properties": {
                        "id": {"type": "integer"},
                        "body": {"type": "string"}
                    },
                    "required": ["id"]
                }
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let introspected = get_schema(&client, "public", &ProgressReporter::silent())
        .await
        .unwrap();

    assert_eq!(introspected.method, IntrospectionMethod::OpenApi);
    assert_eq!(introspected.schema.tables.len(), 1);
    assert_eq!(introspected.schema.tables[0].name, "notes");
    assert_eq!(introspected.schema.tables[0].columns.len(), 2);
}

#[tokio::test]
async fn test_get_schema_falls_back_to_graphql() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(introspection_body()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let introspected = get_schema(&client, "public", &ProgressReporter::silent())
        .await
        .unwrap();

    assert_eq!(introspected.method, IntrospectionMethod::GraphQl);
    let names: Vec<&str> = introspected
        .schema
        .tables
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(names, ["notes"]);
}

#[tokio::test]
async fn test_get_schema_reports_both_tier_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "pg_graphql extension is not enabled"}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = get_schema(&client, "public", &ProgressReporter::silent())
        .await
        .unwrap_err()
        .to_string();

    assert!(err.contains("OpenAPI"), "missing OpenAPI failure: {err}");
    assert!(err.contains("404"), "missing OpenAPI status: {err}");
    assert!(err.contains("GraphQL"), "missing GraphQL failure: {err}");
    assert!(
        err.contains("pg_graphql extension is not enabled"),
        "missing GraphQL message: {err}"
    );
}
