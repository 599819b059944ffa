// schema_introspector.rs - Schema Discovery & Introspection
// Purpose: Enumerate exposed schemas via a sentinel probe, then describe
//          each schema's tables/columns/RPCs from the REST description
//          document, falling back to GraphQL introspection when the
//          description endpoint is unavailable.

use anyhow::{Context, Result, bail};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::progress::{ProgressReporter, ScanEvent};
use crate::supabase_client::SupabaseClient;
use crate::types::{
    ColumnType, DatabaseSchema, IntrospectionMethod, RpcParameter, RpcSchema, TableSchema,
};

// ═══════════════════════════════════════════════════════════════════
// SCHEMA ENUMERATION
// ═══════════════════════════════════════════════════════════════════

// Queried under a schema name that should never exist: the backend
// rejects it before touching any table and lists the schemas that ARE
// exposed in the error message or hint.
const SENTINEL_SCHEMA: &str = "nonexistent_schema_that_should_not_exist";

lazy_static! {
    static ref RE_FOLLOWING: Regex = Regex::new(r"(?i)following:\s*(.+)").unwrap();
    static ref RE_EXPOSED: Regex = Regex::new(r"(?i)exposed:\s*(.+)").unwrap();
}

/// Discover which schemas the target exposes at all.
pub async fn get_schemas(
    client: &SupabaseClient,
    _reporter: &ProgressReporter,
) -> Result<Vec<String>> {
    let body = client.probe_schema(SENTINEL_SCHEMA).await?;

    // The sentinel resolving to a real description document would mean
    // the probe assumption failed.
    if body.get("paths").is_some_and(|p| p.is_object()) {
        bail!("Schema exists, this shouldn't happen");
    }

    let message = body.get("message").and_then(|v| v.as_str()).unwrap_or("");
    let hint = body.get("hint").and_then(|v| v.as_str()).unwrap_or("");

    Ok(parse_exposed_schemas(message, hint))
}

/// Parse the exposed-schema list out of the probe's error text. The
/// message-based `following:` form is preferred; `exposed:` from the
/// hint is the fallback.
pub fn parse_exposed_schemas(message: &str, hint: &str) -> Vec<String> {
    let captures = RE_FOLLOWING
        .captures(message)
        .or_else(|| RE_FOLLOWING.captures(hint))
        .or_else(|| RE_EXPOSED.captures(message))
        .or_else(|| RE_EXPOSED.captures(hint));

    let Some(caps) = captures else {
        return Vec::new();
    };

    caps[1]
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════
// REST DESCRIPTION (OpenAPI-style) PATH
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct OpenApiSpec {
    #[serde(default)]
    paths: BTreeMap<String, PathItem>,
    #[serde(default)]
    definitions: Option<BTreeMap<String, Definition>>,
    #[serde(default)]
    components: Option<Components>,
}

#[derive(Debug, Default, Deserialize)]
struct PathItem {
    post: Option<Operation>,
}

#[derive(Debug, Deserialize)]
struct Components {
    schemas: Option<BTreeMap<String, Definition>>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    parameters: Option<Vec<Parameter>>,
    responses: Option<BTreeMap<String, ResponseDef>>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Parameter {
    #[serde(rename = "in")]
    location: Option<String>,
    schema: Option<SchemaRef>,
}

#[derive(Debug, Deserialize)]
struct ResponseDef {
    schema: Option<SchemaRef>,
}

#[derive(Debug, Deserialize)]
struct SchemaRef {
    #[serde(rename = "$ref")]
    reference: Option<String>,
    #[serde(rename = "type")]
    type_name: Option<String>,
    items: Option<Box<SchemaRef>>,
    properties: Option<BTreeMap<String, PropertyDef>>,
    required: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Definition {
    properties: Option<BTreeMap<String, PropertyDef>>,
    required: Option<Vec<String>>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PropertyDef {
    #[serde(rename = "type")]
    type_name: Option<String>,
    format: Option<String>,
    description: Option<String>,
    #[serde(rename = "$ref")]
    reference: Option<String>,
    items: Option<PropertyItems>,
}

#[derive(Debug, Deserialize)]
struct PropertyItems {
    #[serde(rename = "type")]
    type_name: Option<String>,
    #[serde(rename = "$ref")]
    reference: Option<String>,
}

fn ref_name(reference: &str) -> Option<String> {
    reference.rsplit('/').next().map(String::from)
}

fn resolve_ref<'a>(reference: &str, spec: &'a OpenApiSpec) -> Option<&'a Definition> {
    let name = reference.rsplit('/').next()?;
    spec.definitions
        .as_ref()
        .and_then(|defs| defs.get(name))
        .or_else(|| {
            spec.components
                .as_ref()
                .and_then(|c| c.schemas.as_ref())
                .and_then(|schemas| schemas.get(name))
        })
}

fn parse_property_type(prop: &PropertyDef) -> (String, Option<String>, bool) {
    if prop.type_name.as_deref() == Some("array") {
        if let Some(items) = &prop.items {
            let item_type = items
                .type_name
                .clone()
                .or_else(|| items.reference.as_deref().and_then(ref_name))
                .unwrap_or_else(|| "unknown".to_string());
            return (item_type, None, true);
        }
    }

    let type_name = prop
        .type_name
        .clone()
        .or_else(|| prop.reference.as_deref().and_then(ref_name))
        .unwrap_or_else(|| "unknown".to_string());
    (type_name, prop.format.clone(), false)
}

fn parse_table_from_definition(name: &str, def: &Definition) -> TableSchema {
    let required: BTreeSet<&str> = def
        .required
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();

    let columns = def
        .properties
        .iter()
        .flatten()
        .map(|(col_name, prop)| {
            let (type_name, format, is_array) = parse_property_type(prop);
            ColumnType {
                name: col_name.clone(),
                type_name,
                format,
                nullable: !required.contains(col_name.as_str()),
                is_primary_key: col_name == "id",
                is_array,
                description: prop.description.clone(),
            }
        })
        .collect();

    TableSchema {
        name: name.to_string(),
        columns,
        description: def.description.clone(),
    }
}

fn parse_rpc_from_path(path: &str, item: &PathItem, spec: &OpenApiSpec) -> Option<RpcSchema> {
    let post = item.post.as_ref()?;
    let rpc_name = path.trim_start_matches("/rpc/").to_string();

    let mut parameters = Vec::new();
    for param in post.parameters.iter().flatten() {
        if param.location.as_deref() != Some("body") {
            continue;
        }
        let Some(schema_ref) = &param.schema else {
            continue;
        };

        // The body schema may sit behind a $ref indirection.
        let (properties, required) = if let Some(reference) = &schema_ref.reference {
            match resolve_ref(reference, spec) {
                Some(def) => (def.properties.as_ref(), def.required.as_ref()),
                None => (None, None),
            }
        } else {
            (schema_ref.properties.as_ref(), schema_ref.required.as_ref())
        };

        let required: BTreeSet<&str> = required
            .iter()
            .flat_map(|r| r.iter())
            .map(String::as_str)
            .collect();

        for (param_name, prop) in properties.iter().flat_map(|p| p.iter()) {
            let (type_name, format, _) = parse_property_type(prop);
            parameters.push(RpcParameter {
                name: param_name.clone(),
                type_name,
                format,
                required: required.contains(param_name.as_str()),
                description: prop.description.clone(),
            });
        }
    }

    let mut return_type = None;
    let mut returns_array = false;

    if let Some(response) = post.responses.as_ref().and_then(|r| r.get("200")) {
        if let Some(schema) = &response.schema {
            if schema.type_name.as_deref() == Some("array") {
                returns_array = true;
                return_type = schema.items.as_ref().and_then(|items| {
                    items
                        .reference
                        .as_deref()
                        .and_then(ref_name)
                        .or_else(|| items.type_name.clone())
                });
            } else if let Some(reference) = &schema.reference {
                return_type = ref_name(reference);
            } else {
                return_type = schema.type_name.clone();
            }
        }
    }

    Some(RpcSchema {
        name: rpc_name,
        parameters,
        return_type,
        returns_array,
        description: post.description.clone(),
    })
}

/// Turn a REST description document into the normalized schema shape.
/// Every non-RPC path is reported as a table even when no matching
/// definition exists; presence in the path list is enough.
pub fn parse_openapi_spec(spec: &OpenApiSpec, schema_name: &str) -> DatabaseSchema {
    let table_names: BTreeSet<String> = spec
        .paths
        .keys()
        .filter(|path| !path.starts_with("/rpc/") && path.as_str() != "/")
        .map(|path| path.trim_start_matches('/').to_string())
        .filter(|name| !name.is_empty())
        .collect();

    let lookup = |name: &str| -> Option<&Definition> {
        spec.definitions
            .as_ref()
            .and_then(|defs| defs.get(name))
            .or_else(|| {
                spec.components
                    .as_ref()
                    .and_then(|c| c.schemas.as_ref())
                    .and_then(|schemas| schemas.get(name))
            })
    };

    let tables = table_names
        .iter()
        .map(|name| match lookup(name) {
            Some(def) => parse_table_from_definition(name, def),
            None => TableSchema {
                name: name.clone(),
                columns: Vec::new(),
                description: None,
            },
        })
        .collect();

    let rpcs = spec
        .paths
        .iter()
        .filter(|(path, _)| path.starts_with("/rpc/"))
        .filter_map(|(path, item)| parse_rpc_from_path(path, item, spec))
        .collect();

    DatabaseSchema {
        name: schema_name.to_string(),
        tables,
        views: Vec::new(),
        rpcs,
    }
}

pub async fn fetch_schema_via_openapi(
    client: &SupabaseClient,
    schema_name: &str,
    reporter: &ProgressReporter,
) -> Result<DatabaseSchema> {
    reporter.emit(ScanEvent::DescriptionFetchStarted {
        schema: schema_name.to_string(),
    });

    let value = client.fetch_rest_description(schema_name).await?;

    reporter.emit(ScanEvent::DescriptionFetched {
        schema: schema_name.to_string(),
    });

    let spec: OpenApiSpec =
        serde_json::from_value(value).context("unexpected description document shape")?;

    Ok(parse_openapi_spec(&spec, schema_name))
}

// ═══════════════════════════════════════════════════════════════════
// GRAPHQL INTROSPECTION PATH
// ═══════════════════════════════════════════════════════════════════

// Four levels of ofType nesting see through NON_NULL/LIST wrappers to
// the underlying named type.
const INTROSPECTION_QUERY: &str = r#"
  query IntrospectionQuery {
    __schema {
      types {
        name
        kind
        description
        fields {
          name
          description
          type {
            name
            kind
            ofType {
              name
              kind
              ofType {
                name
                kind
                ofType {
                  name
                  kind
                }
              }
            }
          }
        }
        inputFields {
          name
          description
          type {
            name
            kind
            ofType {
              name
              kind
            }
          }
        }
      }
    }
  }
"#;

// Generated machinery the schema generator emits alongside real table
// types. Best-effort and generator-specific.
const TYPE_SUFFIX_DENYLIST: &[&str] = &[
    "Connection",
    "Edge",
    "Aggregate",
    "OrderBy",
    "Filter",
    "InsertInput",
    "UpdateInput",
    "Response",
];

const ROOT_TYPE_DENYLIST: &[&str] = &["Query", "Mutation", "Subscription", "PageInfo", "Node"];

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    data: Option<IntrospectionData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct IntrospectionData {
    #[serde(rename = "__schema")]
    schema: TypeListing,
}

#[derive(Debug, Deserialize)]
struct TypeListing {
    types: Vec<TypeDef>,
}

#[derive(Debug, Deserialize)]
struct TypeDef {
    name: Option<String>,
    kind: String,
    description: Option<String>,
    fields: Option<Vec<FieldDef>>,
}

#[derive(Debug, Deserialize)]
struct FieldDef {
    name: String,
    description: Option<String>,
    #[serde(rename = "type")]
    type_ref: TypeRef,
}

#[derive(Debug, Deserialize)]
struct TypeRef {
    name: Option<String>,
    kind: Option<String>,
    #[serde(rename = "ofType")]
    of_type: Option<Box<TypeRef>>,
}

/// Walk the wrapper chain to the named type, noting list and non-null
/// wrappers on the way.
fn unwrap_type(type_ref: &TypeRef) -> (String, bool, bool) {
    let mut current = Some(type_ref);
    let mut is_array = false;
    let mut nullable = true;

    while let Some(t) = current {
        match t.kind.as_deref() {
            Some("NON_NULL") => {
                nullable = false;
                current = t.of_type.as_deref();
            }
            Some("LIST") => {
                is_array = true;
                current = t.of_type.as_deref();
            }
            _ => {
                let name = t.name.clone().unwrap_or_else(|| "unknown".to_string());
                return (name, is_array, nullable);
            }
        }
    }

    ("unknown".to_string(), is_array, nullable)
}

fn is_table_type(type_def: &TypeDef) -> bool {
    if type_def.kind != "OBJECT" {
        return false;
    }
    let Some(name) = &type_def.name else {
        return false;
    };
    if name.is_empty() || name.starts_with("__") {
        return false;
    }
    if TYPE_SUFFIX_DENYLIST.iter().any(|s| name.ends_with(s)) {
        return false;
    }
    if ROOT_TYPE_DENYLIST.contains(&name.as_str()) {
        return false;
    }
    true
}

fn parse_table_from_type(type_def: &TypeDef) -> TableSchema {
    let columns = type_def
        .fields
        .iter()
        .flatten()
        .filter(|f| !f.name.starts_with("__"))
        .filter(|f| !f.name.ends_with("Collection"))
        .map(|field| {
            let (type_name, is_array, nullable) = unwrap_type(&field.type_ref);
            ColumnType {
                name: field.name.clone(),
                type_name,
                format: None,
                nullable,
                is_primary_key: field.name == "id" || field.name == "nodeId",
                is_array,
                description: field.description.clone(),
            }
        })
        .collect();

    TableSchema {
        name: type_def.name.clone().unwrap_or_default(),
        columns,
        description: type_def.description.clone(),
    }
}

/// User-defined RPCs surface as Mutation fields; the generated CRUD
/// mutations are filtered out by prefix. Introspection does not expose
/// argument shapes here, so parameters stay empty.
fn extract_rpcs_from_mutation(types: &[TypeDef]) -> Vec<RpcSchema> {
    let Some(mutation) = types
        .iter()
        .find(|t| t.name.as_deref() == Some("Mutation"))
    else {
        return Vec::new();
    };

    mutation
        .fields
        .iter()
        .flatten()
        .filter(|f| !f.name.starts_with("insert"))
        .filter(|f| !f.name.starts_with("update"))
        .filter(|f| !f.name.starts_with("delete"))
        .map(|field| {
            let (return_type, returns_array, _) = unwrap_type(&field.type_ref);
            RpcSchema {
                name: field.name.clone(),
                parameters: Vec::new(),
                return_type: (return_type != "unknown").then_some(return_type),
                returns_array,
                description: field.description.clone(),
            }
        })
        .collect()
}

pub fn parse_graphql_introspection(data: &IntrospectionData, schema_name: &str) -> DatabaseSchema {
    let types = &data.schema.types;

    let tables = types
        .iter()
        .filter(|t| is_table_type(t))
        .map(parse_table_from_type)
        .collect();

    let rpcs = extract_rpcs_from_mutation(types);

    DatabaseSchema {
        name: schema_name.to_string(),
        tables,
        views: Vec::new(),
        rpcs,
    }
}

pub async fn fetch_schema_via_graphql(
    client: &SupabaseClient,
    schema_name: &str,
) -> Result<DatabaseSchema> {
    let value = client.graphql(INTROSPECTION_QUERY).await?;

    let response: IntrospectionResponse =
        serde_json::from_value(value).context("unexpected introspection response shape")?;

    if let Some(errors) = &response.errors {
        if let Some(first) = errors.first() {
            bail!("{}", first.message);
        }
    }

    let data = response
        .data
        .context("introspection response carried no data")?;

    Ok(parse_graphql_introspection(&data, schema_name))
}

// ═══════════════════════════════════════════════════════════════════
// TIERED FALLBACK
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct IntrospectedSchema {
    pub schema: DatabaseSchema,
    pub method: IntrospectionMethod,
}

/// Describe one schema, preferring the REST description document and
/// falling back to GraphQL introspection only when it fails outright.
pub async fn get_schema(
    client: &SupabaseClient,
    schema_name: &str,
    reporter: &ProgressReporter,
) -> Result<IntrospectedSchema> {
    let openapi_err = match fetch_schema_via_openapi(client, schema_name, reporter).await {
        Ok(schema) => {
            return Ok(IntrospectedSchema {
                schema,
                method: IntrospectionMethod::OpenApi,
            });
        }
        Err(e) => e,
    };

    reporter.emit(ScanEvent::IntrospectionFallback {
        schema: schema_name.to_string(),
        error: openapi_err.to_string(),
    });

    match fetch_schema_via_graphql(client, schema_name).await {
        Ok(schema) => Ok(IntrospectedSchema {
            schema,
            method: IntrospectionMethod::GraphQl,
        }),
        Err(graphql_err) => bail!(
            "Schema introspection failed. OpenAPI: {openapi_err}. GraphQL: {graphql_err}"
        ),
    }
}
