// access_prober.rs - Table Read-Access Probing
// Purpose: Classify each table as denied / empty / readable under the
//          active access policy, with an estimated row count for
//          readable tables.
// Note: a zero-row result cannot be told apart from an RLS policy that
//       filters every row; both are reported as empty.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;

use crate::progress::{ProgressReporter, ScanEvent};
use crate::supabase_client::{QueryResponse, SupabaseClient};
use crate::types::TableAccessResult;

/// Upper bound on in-flight probes per schema batch.
const PROBE_CONCURRENCY: usize = 8;

enum SelectOutcome {
    Denied,
    Empty,
    HasData,
}

/// A query-level error is a denial; no retry, a single denial is
/// conclusive for this probe's purpose.
fn classify_select(response: &QueryResponse) -> SelectOutcome {
    if response.error.is_some() {
        return SelectOutcome::Denied;
    }

    match &response.data {
        Some(Value::Array(rows)) if !rows.is_empty() => SelectOutcome::HasData,
        _ => SelectOutcome::Empty,
    }
}

/// Probe a single table with a bounded select.
pub async fn test_table_read(
    client: &SupabaseClient,
    schema: &str,
    table: &str,
    reporter: &ProgressReporter,
) -> Result<TableAccessResult> {
    reporter.emit(ScanEvent::TableProbeStarted {
        schema: schema.to_string(),
        table: table.to_string(),
    });

    let response = client.select_rows(schema, table, 1).await?;

    let result = match classify_select(&response) {
        SelectOutcome::Denied => TableAccessResult::denied(),
        SelectOutcome::Empty => TableAccessResult::empty(),
        SelectOutcome::HasData => {
            // The table is genuinely exposed; fetch a cheap estimate of
            // how much is readable.
            let count = client.head_count(schema, table).await.ok().flatten();
            TableAccessResult::readable(count)
        }
    };

    reporter.emit(ScanEvent::TableProbeCompleted {
        schema: schema.to_string(),
        table: table.to_string(),
        status: result.status,
    });

    Ok(result)
}

/// Probe a batch of tables. Probes run concurrently up to
/// [`PROBE_CONCURRENCY`]; the batch is collected before returning, so
/// callers see it as atomic. Every table name gets exactly one entry;
/// a probe whose request itself fails is recorded as denied.
pub async fn test_tables_read(
    client: &SupabaseClient,
    schema: &str,
    tables: &[String],
    reporter: &ProgressReporter,
) -> Result<HashMap<String, TableAccessResult>> {
    let results: Vec<(String, TableAccessResult)> = stream::iter(tables.to_vec())
        .map(|table| async move {
            let result = test_table_read(client, schema, &table, reporter)
                .await
                .unwrap_or_else(|_| TableAccessResult::denied());
            (table, result)
        })
        .buffer_unordered(PROBE_CONCURRENCY)
        .collect()
        .await;

    Ok(results.into_iter().collect())
}
