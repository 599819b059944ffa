// progress.rs - Scan progress events
// Purpose: Let callers observe extraction/analysis progress without
//          blocking the final result. The scanning functions push events
//          into a pluggable callback; silent by default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AccessStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    ExtractionStarted { url: String },
    ContentFetched { url: String, size: usize, content_type: String },
    HtmlDetected { script_count: usize },
    ScriptChecking { script_url: String },
    CredentialsFound { source: String },
    AnalysisStarted,
    SchemaAnalysisStarted { schema: String },
    DescriptionFetchStarted { schema: String },
    DescriptionFetched { schema: String },
    TablesDiscovered { schema: String, count: usize },
    RpcsDiscovered { schema: String, count: usize },
    IntrospectionFallback { schema: String, error: String },
    TableProbeStarted { schema: String, table: String },
    TableProbeCompleted { schema: String, table: String, status: AccessStatus },
    SchemaAnalysisCompleted { schema: String, tables: usize, readable: usize },
    SchemaSkipped { schema: String, reason: String },
    AnalysisCompleted { schemas: usize },
}

/// A timestamped event record, for callers that persist progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ScanEvent,
}

impl ProgressRecord {
    pub fn new(event: ScanEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

type EventCallback = dyn Fn(&ScanEvent) + Send + Sync;

/// Handle the scanning functions emit progress through. Constructed with
/// a callback for observing callers, or silent for library use.
pub struct ProgressReporter {
    callback: Option<Box<EventCallback>>,
}

impl ProgressReporter {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&ScanEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    pub fn silent() -> Self {
        Self { callback: None }
    }

    pub fn emit(&self, event: ScanEvent) {
        if let Some(cb) = &self.callback {
            cb(&event);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}
