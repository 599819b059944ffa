// analyzer.rs - Analysis Orchestration & Target Summary
// Purpose: Drive schema enumeration, per-schema introspection and
//          access probing into a single report. One broken schema is
//          skipped, never fatal; only enumeration failure aborts the
//          run.

use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::HashMap;
use url::Url;

use crate::access_prober::test_tables_read;
use crate::progress::{ProgressReporter, ScanEvent};
use crate::schema_introspector::{get_schema, get_schemas};
use crate::supabase_client::SupabaseClient;
use crate::types::{
    AccessStatus, AnalysisResult, JwtInfo, SchemaAnalysis, SummaryMetadata, TargetSummary,
};

const MANAGED_HOST_SUFFIX: &str = ".supabase.co";

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Restrict the run to a single schema instead of every discovered
    /// one.
    pub schema: Option<String>,
}

/// Run the full analysis pipeline against a target.
pub async fn analyze(
    client: &SupabaseClient,
    url: &str,
    key: &str,
    options: &AnalyzeOptions,
    reporter: &ProgressReporter,
) -> Result<AnalysisResult> {
    reporter.emit(ScanEvent::AnalysisStarted);

    // Nothing to introspect without a schema list.
    let schemas = get_schemas(client, reporter).await?;

    let targets: Vec<String> = match &options.schema {
        Some(schema) => vec![schema.clone()],
        None => schemas.clone(),
    };

    let mut schema_details: HashMap<String, SchemaAnalysis> = HashMap::new();

    for schema_name in &targets {
        reporter.emit(ScanEvent::SchemaAnalysisStarted {
            schema: schema_name.clone(),
        });

        let introspected = match get_schema(client, schema_name, reporter).await {
            Ok(i) => i,
            Err(e) => {
                reporter.emit(ScanEvent::SchemaSkipped {
                    schema: schema_name.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let table_names: Vec<String> = introspected
            .schema
            .tables
            .iter()
            .map(|t| t.name.clone())
            .collect();
        let rpc_names: Vec<String> = introspected
            .schema
            .rpcs
            .iter()
            .map(|r| r.name.clone())
            .collect();

        reporter.emit(ScanEvent::TablesDiscovered {
            schema: schema_name.clone(),
            count: table_names.len(),
        });
        reporter.emit(ScanEvent::RpcsDiscovered {
            schema: schema_name.clone(),
            count: rpc_names.len(),
        });

        let table_access =
            match test_tables_read(client, schema_name, &table_names, reporter).await {
                Ok(map) => map,
                Err(e) => {
                    reporter.emit(ScanEvent::SchemaSkipped {
                        schema: schema_name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

        let readable = table_access
            .values()
            .filter(|r| r.status == AccessStatus::Readable)
            .count();

        reporter.emit(ScanEvent::SchemaAnalysisCompleted {
            schema: schema_name.clone(),
            tables: table_names.len(),
            readable,
        });

        schema_details.insert(
            schema_name.clone(),
            SchemaAnalysis {
                tables: introspected.schema.tables,
                rpcs: rpc_names,
                rpc_functions: introspected.schema.rpcs,
                table_access,
                method: introspected.method,
            },
        );
    }

    let summary = extract_summary(client, url, key).await;

    reporter.emit(ScanEvent::AnalysisCompleted {
        schemas: schema_details.len(),
    });

    Ok(AnalysisResult {
        schemas,
        schema_details,
        summary,
    })
}

/// Descriptive target facts, derived independently of per-schema
/// success. Every internal failure here becomes an absent field.
async fn extract_summary(client: &SupabaseClient, url: &str, key: &str) -> TargetSummary {
    let domain = extract_domain(url);
    let jwt_info = decode_jwt(key);

    let mut metadata = extract_metadata(url);
    if let Some(info) = fetch_description_info(client).await {
        metadata.title = info.title;
        metadata.description = info.description;
        metadata.version = info.version;
    }

    TargetSummary {
        domain,
        jwt_info,
        metadata: (metadata != SummaryMetadata::default()).then_some(metadata),
    }
}

/// Hostname of the target, or the raw input when it does not parse.
pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| url.to_string())
}

/// Decode the key as a three-segment token and parse the middle
/// segment's claims. Any malformation yields `None`; an unparseable key
/// is not fatal to the rest of the analysis.
pub fn decode_jwt(key: &str) -> Option<JwtInfo> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let payload = parts[1].trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&decoded).ok()
}

pub fn extract_metadata(url: &str) -> SummaryMetadata {
    let mut metadata = SummaryMetadata::default();

    let Ok(parsed) = Url::parse(url) else {
        return metadata;
    };

    metadata.protocol = Some(parsed.scheme().to_string());
    metadata.port = Some(match parsed.port() {
        Some(port) => port.to_string(),
        None if parsed.scheme() == "https" => "443".to_string(),
        None => "80".to_string(),
    });

    if let Some(host) = parsed.host_str() {
        if host.ends_with(MANAGED_HOST_SUFFIX) {
            metadata.service = Some("Supabase".to_string());
            metadata.project_id = Some(host.trim_end_matches(MANAGED_HOST_SUFFIX).to_string());
        }
    }

    metadata
}

#[derive(Debug, Default)]
struct DescriptionInfo {
    title: Option<String>,
    description: Option<String>,
    version: Option<String>,
}

/// Best-effort harvest of the public description document's info
/// block. Any failure is silently ignored.
async fn fetch_description_info(client: &SupabaseClient) -> Option<DescriptionInfo> {
    let value = client.fetch_rest_description("public").await.ok()?;
    let info = value.get("info")?;

    let field = |name: &str| {
        info.get(name)
            .and_then(|v| v.as_str())
            .map(String::from)
    };

    Some(DescriptionInfo {
        title: field("title"),
        description: field("description"),
        version: field("version"),
    })
}
