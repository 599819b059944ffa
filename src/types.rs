// types.rs - Core data model for Supabase reconnaissance results
// Purpose: Typed report payload shared by the extractor, introspector,
//          prober and analyzer; serializes to the JSON report consumed
//          by downstream renderers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A Supabase project URL / API key pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub url: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// Credentials recovered from a public page or script bundle.
/// `source` records where the pair was found, for display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedCredentials {
    pub url: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Which introspection strategy produced a schema description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntrospectionMethod {
    OpenApi,
    GraphQl,
}

impl std::fmt::Display for IntrospectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntrospectionMethod::OpenApi => write!(f, "openapi"),
            IntrospectionMethod::GraphQl => write!(f, "graphql"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnType {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub nullable: bool,
    /// Naming heuristic (`id` / `nodeId`), not real constraint metadata.
    pub is_primary_key: bool,
    pub is_array: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A server-side function exposed for direct invocation.
/// The OpenAPI and GraphQL parsers both normalize into this shape;
/// the GraphQL path cannot recover parameters and leaves them empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcSchema {
    pub name: String,
    pub parameters: Vec<RpcParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    pub returns_array: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Normalized description of one exposed schema, rebuilt fresh on
/// every run regardless of which introspection tier produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSchema {
    pub name: String,
    pub tables: Vec<TableSchema>,
    pub views: Vec<TableSchema>,
    pub rpcs: Vec<RpcSchema>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Denied,
    Empty,
    Readable,
}

impl std::fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessStatus::Denied => write!(f, "denied"),
            AccessStatus::Empty => write!(f, "empty"),
            AccessStatus::Readable => write!(f, "readable"),
        }
    }
}

/// Outcome of a single bounded read probe against a table.
///
/// `Empty` covers both a genuinely empty table and a table fully hidden
/// by a row-level policy that filters instead of denying; the target's
/// observable behavior cannot distinguish the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableAccessResult {
    pub status: AccessStatus,
    pub accessible: bool,
    pub has_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

/// One schema's full analysis: introspected structure plus per-table
/// access classification. Every table name in `tables` has exactly one
/// entry in `table_access`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAnalysis {
    pub tables: Vec<TableSchema>,
    pub rpcs: Vec<String>,
    pub rpc_functions: Vec<RpcSchema>,
    pub table_access: HashMap<String, TableAccessResult>,
    pub method: IntrospectionMethod,
}

/// Claims decoded from the API key's payload segment. Supabase anon
/// keys carry `role`, `ref` and the standard registered claims.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwtInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub project_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Descriptive facts about the target, derived independently of
/// per-schema analysis success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_info: Option<JwtInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SummaryMetadata>,
}

/// Terminal artifact of an analysis run. Schemas that failed
/// introspection or probing are absent from `schema_details` entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub schemas: Vec<String>,
    pub schema_details: HashMap<String, SchemaAnalysis>,
    pub summary: TargetSummary,
}

impl TableAccessResult {
    pub fn denied() -> Self {
        Self {
            status: AccessStatus::Denied,
            accessible: false,
            has_data: false,
            row_count: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            status: AccessStatus::Empty,
            accessible: true,
            has_data: false,
            row_count: Some(0),
        }
    }

    pub fn readable(row_count: Option<i64>) -> Self {
        Self {
            status: AccessStatus::Readable,
            accessible: true,
            has_data: true,
            row_count,
        }
    }
}
