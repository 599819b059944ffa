// lib.rs - SupaScan library surface
// Purpose: Expose the extraction and analysis primitives to the CLI and
//          to embedding callers; the binary in main.rs is a thin front.

pub mod access_prober;
pub mod analyzer;
pub mod credential_extractor;
pub mod progress;
pub mod schema_introspector;
pub mod supabase_client;
pub mod types;
