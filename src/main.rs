// main.rs - SupaScan v0.3.0 - Supabase Security Reconnaissance Tool
// Purpose: Discover exposed schemas, enumerate tables and RPC functions,
//          and probe per-table read access on Supabase-backed targets,
//          with credential extraction from public pages and bundles.
// License: MIT

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;

use supascan::analyzer::{self, AnalyzeOptions};
use supascan::credential_extractor::{self, ExtractorOptions};
use supascan::progress::{ProgressReporter, ScanEvent};
use supascan::schema_introspector;
use supascan::supabase_client::{RpcOptions, SupabaseClient};
use supascan::types::{self, AccessStatus, AnalysisResult, RpcSchema};

/// SupaScan - Supabase security reconnaissance
#[derive(Parser, Debug)]
#[command(
    name = "supascan",
    version = "0.3.0",
    about = "Supabase security reconnaissance: schema discovery, table enumeration and read-access probing",
    long_about = r#"
SupaScan analyzes Supabase-backed applications from the outside:

  CREDENTIAL EXTRACTION
     Recovers the project URL / anon key pair from a public page or
     JavaScript bundle (inline and external scripts).

  SCHEMA DISCOVERY
     Enumerates exposed schemas via a sentinel probe, then introspects
     each schema's tables, columns and RPC functions through the REST
     description document, falling back to GraphQL introspection.

  ACCESS PROBING
     Classifies every table as denied, empty or readable under the
     active row-level security policy, with estimated row counts.

EXAMPLES:

  Analyze with known credentials:
    supascan analyze --url https://abcd1234.supabase.co --key eyJhbG...

  Extract credentials from a page, then analyze:
    supascan analyze --target https://app.example.com

  Single schema, JSON report:
    supascan analyze --url ... --key ... --schema public --json

  Dump a readable table:
    supascan dump --url ... --key ... public.users --limit 20

  Inspect and call an RPC:
    supascan rpc --url ... --key ... public.get_user
    supascan rpc --url ... --key ... public.get_user --args '{"p_id":1}'
"#
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full analysis pipeline against a target
    Analyze {
        /// Supabase project URL (e.g. https://abcd1234.supabase.co)
        #[arg(short, long, value_name = "URL", help_heading = "Target Options")]
        url: Option<String>,

        /// API key (anon or service-role JWT)
        #[arg(short, long, value_name = "KEY", help_heading = "Target Options")]
        key: Option<String>,

        /// Page or bundle URL to extract credentials from first
        #[arg(
            short,
            long,
            value_name = "PAGE_URL",
            help_heading = "Target Options",
            conflicts_with_all = ["url", "key"]
        )]
        target: Option<String>,

        /// Analyze a single schema instead of every discovered one
        #[arg(short, long, value_name = "SCHEMA", help_heading = "Analysis Options")]
        schema: Option<String>,

        /// Extra request header as NAME:VALUE (repeatable)
        #[arg(long = "header", value_name = "NAME:VALUE", help_heading = "Analysis Options")]
        headers: Vec<String>,

        /// Print the raw JSON report instead of the console report
        #[arg(long, help_heading = "Output Options")]
        json: bool,

        /// Suppress progress output
        #[arg(short, long, help_heading = "Output Options")]
        quiet: bool,
    },

    /// Extract Supabase credentials from a public page or script
    Extract {
        /// Page or script URL to scan
        #[arg(value_name = "URL")]
        target: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Suppress warnings about unreachable scripts
        #[arg(short, long)]
        quiet: bool,
    },

    /// Dump rows from a single table
    Dump {
        /// Supabase project URL
        #[arg(short, long, value_name = "URL")]
        url: String,

        /// API key
        #[arg(short, long, value_name = "KEY")]
        key: String,

        /// Table to dump, as schema.table
        #[arg(value_name = "SCHEMA.TABLE")]
        table: String,

        /// Maximum rows to fetch
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or call an exposed RPC function
    Rpc {
        /// Supabase project URL
        #[arg(short, long, value_name = "URL")]
        url: String,

        /// API key
        #[arg(short, long, value_name = "KEY")]
        key: String,

        /// Function to call, as schema.function
        #[arg(value_name = "SCHEMA.FUNCTION")]
        function: String,

        /// JSON object of arguments; omit to list the function's parameters
        #[arg(short, long, value_name = "JSON")]
        args: Option<String>,

        /// Bound the number of returned rows
        #[arg(short, long)]
        limit: Option<usize>,

        /// Fetch the query plan instead of executing
        #[arg(long)]
        explain: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Analyze {
            url,
            key,
            target,
            schema,
            headers,
            json,
            quiet,
        } => run_analyze(url, key, target, schema, headers, json, quiet).await,
        Command::Extract {
            target,
            json,
            quiet,
        } => run_extract(target, json, quiet).await,
        Command::Dump {
            url,
            key,
            table,
            limit,
            json,
        } => run_dump(url, key, table, limit, json).await,
        Command::Rpc {
            url,
            key,
            function,
            args,
            limit,
            explain,
        } => run_rpc(url, key, function, args, limit, explain).await,
    }
}

// ═══════════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════════

async fn run_analyze(
    url: Option<String>,
    key: Option<String>,
    target: Option<String>,
    schema: Option<String>,
    headers: Vec<String>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let quiet = quiet || json;
    let (reporter, spinner) = make_reporter(quiet);

    let (url, key) = match target {
        Some(page_url) => {
            let http = reqwest::Client::new();
            let opts = ExtractorOptions {
                suppress_warnings: quiet,
            };
            let creds =
                credential_extractor::extract_from_url(&http, &page_url, &opts, &reporter).await?;
            (creds.url, creds.key)
        }
        None => match (url, key) {
            (Some(url), Some(key)) => (url, key),
            _ => bail!("Provide --url and --key, or --target to extract them from a page"),
        },
    };

    let credentials = types::Credentials {
        url: url.clone(),
        key: key.clone(),
        headers: parse_headers(&headers)?,
    };
    let client = SupabaseClient::from_credentials(&credentials)?;

    let options = AnalyzeOptions { schema };
    let result = analyzer::analyze(&client, &url, &key, &options, &reporter).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        display_analysis(&result);
    }

    Ok(())
}

async fn run_extract(target: String, json: bool, quiet: bool) -> Result<()> {
    let quiet = quiet || json;
    let (reporter, spinner) = make_reporter(quiet);

    let http = reqwest::Client::new();
    let opts = ExtractorOptions {
        suppress_warnings: quiet,
    };
    let result = credential_extractor::extract_from_url(&http, &target, &opts, &reporter).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let creds = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&creds)?);
        return Ok(());
    }

    println!();
    println!("{}", "CREDENTIALS FOUND".green().bold());
    println!("{}", "─".repeat(20).dimmed());
    println!("{} {}", "URL:".bold(), creds.url);
    println!("{} {}", "Key:".bold(), creds.key);
    if let Some(source) = &creds.source {
        println!("{} {}", "Source:".bold(), source.dimmed());
    }

    Ok(())
}

async fn run_dump(
    url: String,
    key: String,
    table: String,
    limit: usize,
    json: bool,
) -> Result<()> {
    let (schema, table_name) = parse_qualified(&table, "table")?;
    let client = SupabaseClient::new(&url, &key, None)?;

    let dump = client.dump_table(&schema, &table_name, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dump)?);
        return Ok(());
    }

    println!();
    println!(
        "{}",
        format!("  {}.{} ({} total rows)", schema, table_name, dump.count)
            .cyan()
            .bold()
    );
    println!("{}", "─".repeat(40).dimmed());

    if dump.rows.is_empty() {
        println!("{}", "  (no rows readable)".yellow());
        return Ok(());
    }

    println!("{}", dump.columns.join(" | ").bold());
    for row in &dump.rows {
        println!("{}", serde_json::to_string(row)?);
    }

    Ok(())
}

async fn run_rpc(
    url: String,
    key: String,
    function: String,
    args: Option<String>,
    limit: Option<usize>,
    explain: bool,
) -> Result<()> {
    let (schema, rpc_name) = parse_qualified(&function, "function")?;
    let client = SupabaseClient::new(&url, &key, None)?;

    let Some(raw_args) = args else {
        // Without arguments, show the function's discovered signature.
        let reporter = ProgressReporter::silent();
        let rpc_schema = match schema_introspector::get_schema(&client, &schema, &reporter).await {
            Ok(introspected) => introspected
                .schema
                .rpcs
                .into_iter()
                .find(|r| r.name == rpc_name),
            Err(e) => {
                println!(
                    "{}",
                    format!("[!] Could not introspect schema for validation: {e}").yellow()
                );
                None
            }
        };
        display_rpc_help(&schema, &rpc_name, rpc_schema.as_ref());
        return Ok(());
    };

    let parsed: serde_json::Value =
        serde_json::from_str(&raw_args).context("failed to parse RPC arguments as JSON")?;
    if !parsed.is_object() {
        bail!("RPC arguments must be a JSON object, e.g. '{{\"p_id\": 1}}'");
    }

    let opts = RpcOptions {
        limit,
        explain,
        get: false,
    };
    let result = client.call_rpc(&schema, &rpc_name, &parsed, &opts).await?;

    match &result {
        serde_json::Value::String(text) if explain => println!("{text}"),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════
// OUTPUT
// ═══════════════════════════════════════════════════════════════════

/// Progress reporter backed by a spinner; notable findings are printed
/// above it, transient states become the spinner message.
fn make_reporter(quiet: bool) -> (ProgressReporter, Option<ProgressBar>) {
    if quiet {
        return (ProgressReporter::silent(), None);
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}").unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let sink = pb.clone();
    let reporter = ProgressReporter::new(move |event| match event {
        ScanEvent::ExtractionStarted { url } => {
            sink.set_message(format!("Fetching {url}"));
        }
        ScanEvent::ContentFetched {
            size, content_type, ..
        } => {
            sink.println(format!(
                "{}",
                format!("[*] Fetched {size} bytes ({content_type})").cyan()
            ));
        }
        ScanEvent::HtmlDetected { script_count } => {
            sink.println(format!(
                "{}",
                format!("[*] HTML page with {script_count} scripts").cyan()
            ));
        }
        ScanEvent::ScriptChecking { script_url } => {
            sink.set_message(format!("Checking script {script_url}"));
        }
        ScanEvent::CredentialsFound { source } => {
            sink.println(format!(
                "{}",
                format!("[+] Credentials found in {source}").green()
            ));
        }
        ScanEvent::AnalysisStarted => {
            sink.set_message("Enumerating schemas");
        }
        ScanEvent::SchemaAnalysisStarted { schema } => {
            sink.println(format!("{}", format!("[*] Analyzing schema: {schema}").cyan()));
        }
        ScanEvent::DescriptionFetchStarted { schema } => {
            sink.set_message(format!("Fetching description document for {schema}"));
        }
        ScanEvent::IntrospectionFallback { schema, error } => {
            sink.println(format!(
                "{}",
                format!("[!] Description fetch failed for {schema}, trying GraphQL ({error})")
                    .yellow()
            ));
        }
        ScanEvent::TablesDiscovered { schema, count } => {
            sink.println(format!(
                "{}",
                format!("[+] {count} tables in {schema}").green()
            ));
        }
        ScanEvent::RpcsDiscovered { schema, count } => {
            if *count > 0 {
                sink.println(format!(
                    "{}",
                    format!("[+] {count} RPC functions in {schema}").green()
                ));
            }
        }
        ScanEvent::TableProbeStarted { schema, table } => {
            sink.set_message(format!("Probing {schema}.{table}"));
        }
        ScanEvent::TableProbeCompleted {
            schema,
            table,
            status,
        } => {
            if *status == AccessStatus::Readable {
                sink.println(format!(
                    "{}",
                    format!("[!] {schema}.{table} is readable").red().bold()
                ));
            }
        }
        ScanEvent::SchemaAnalysisCompleted {
            schema,
            tables,
            readable,
        } => {
            sink.println(format!(
                "{}",
                format!("[+] Schema {schema} done: {tables} tables, {readable} readable").green()
            ));
        }
        ScanEvent::SchemaSkipped { schema, reason } => {
            sink.println(format!(
                "{}",
                format!("[!] Skipping schema {schema}: {reason}").yellow()
            ));
        }
        ScanEvent::DescriptionFetched { .. } | ScanEvent::AnalysisCompleted { .. } => {}
    });

    (reporter, Some(pb))
}

fn display_analysis(result: &AnalysisResult) {
    println!();
    println!("{}", "━".repeat(60).cyan().bold());
    println!("{}", "  SUPABASE DATABASE ANALYSIS".cyan().bold());
    println!("{}", "━".repeat(60).cyan().bold());
    println!();

    println!("{}", "TARGET SUMMARY".yellow().bold());
    println!("{}", "─".repeat(20).dimmed());
    println!("{} {}", "Domain:".bold(), result.summary.domain);

    if let Some(metadata) = &result.summary.metadata {
        if let Some(service) = &metadata.service {
            println!("{} {}", "Service:".bold(), service);
        }
        if let Some(project_id) = &metadata.project_id {
            println!("{} {}", "Project ID:".bold(), project_id);
        }
        if let Some(title) = &metadata.title {
            println!("{} {}", "Title:".bold(), title);
        }
        if let Some(version) = &metadata.version {
            println!("{} {}", "Version:".bold(), version);
        }
    }

    if let Some(jwt) = &result.summary.jwt_info {
        println!();
        println!("{}", "API KEY CLAIMS".yellow().bold());
        println!("{}", "─".repeat(20).dimmed());
        if let Some(iss) = &jwt.iss {
            println!("{} {}", "Issuer:".bold(), iss);
        }
        if let Some(role) = &jwt.role {
            let colored_role = if role == "service_role" {
                role.red().bold()
            } else {
                role.normal()
            };
            println!("{} {}", "Role:".bold(), colored_role);
        }
        if let Some(aud) = &jwt.aud {
            println!("{} {}", "Audience:".bold(), aud);
        }
        if let Some(exp) = jwt.exp {
            println!("{} {}", "Expires:".bold(), format_timestamp(exp));
        }
        if let Some(iat) = jwt.iat {
            println!("{} {}", "Issued:".bold(), format_timestamp(iat));
        }
    }

    println!();
    println!("{}", "DATABASE ANALYSIS".cyan().bold());
    println!("{}", "─".repeat(20).dimmed());
    println!(
        "{} {}",
        "Schemas discovered:".bold(),
        result.schemas.len().to_string().green()
    );
    if !result.schemas.is_empty() {
        println!("  {}", result.schemas.join(", "));
    }

    let mut names: Vec<&String> = result.schema_details.keys().collect();
    names.sort();

    for name in names {
        let analysis = &result.schema_details[name];
        println!();
        println!(
            "{}",
            format!("  SCHEMA: {name} (via {})", analysis.method)
                .cyan()
                .bold()
        );

        let mut tables: Vec<_> = analysis.tables.iter().collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));

        for table in tables {
            let access = analysis.table_access.get(&table.name);
            let status_str = match access {
                Some(a) if a.status == AccessStatus::Readable => {
                    let count = a
                        .row_count
                        .map(|c| format!(" (~{c} rows)"))
                        .unwrap_or_default();
                    format!("READABLE{count}").red().bold()
                }
                Some(a) if a.status == AccessStatus::Empty => "empty".yellow(),
                Some(_) => "denied".green(),
                None => "unknown".normal(),
            };
            println!(
                "    {} {} [{} columns] {}",
                "→".dimmed(),
                table.name,
                table.columns.len(),
                status_str
            );
        }

        if !analysis.rpc_functions.is_empty() {
            println!("    {}", "RPC functions:".bold());
            for rpc in &analysis.rpc_functions {
                println!("      {} {}", "ƒ".dimmed(), format_rpc_signature(rpc));
            }
        }
    }

    println!();
}

fn display_rpc_help(schema: &str, rpc_name: &str, rpc: Option<&RpcSchema>) {
    println!();
    println!(
        "{}",
        format!("  RPC: {schema}.{rpc_name}").cyan().bold()
    );
    println!("{}", "─".repeat(40).dimmed());

    match rpc {
        Some(rpc) => {
            if let Some(description) = &rpc.description {
                println!("  {}", description.dimmed());
            }
            println!("  {}", format_rpc_signature(rpc));
            if rpc.parameters.is_empty() {
                println!("  {}", "Takes no arguments.".dimmed());
            } else {
                println!();
                for param in &rpc.parameters {
                    let required = if param.required {
                        "required".red().to_string()
                    } else {
                        "optional".dimmed().to_string()
                    };
                    println!(
                        "    --args '{{\"{}\": <{}>}}' ({})",
                        param.name, param.type_name, required
                    );
                }
            }
        }
        None => {
            println!(
                "  {}",
                "No parameter information available for this function.".yellow()
            );
        }
    }

    println!();
    println!(
        "  Invoke with: supascan rpc ... {}.{} --args '{{...}}'",
        schema, rpc_name
    );
}

fn format_rpc_signature(rpc: &RpcSchema) -> String {
    let params: Vec<String> = rpc
        .parameters
        .iter()
        .map(|p| {
            if p.required {
                format!("{}: {}", p.name, p.type_name)
            } else {
                format!("{}?: {}", p.name, p.type_name)
            }
        })
        .collect();

    let ret = match (&rpc.return_type, rpc.returns_array) {
        (Some(t), true) => format!(" -> {t}[]"),
        (Some(t), false) => format!(" -> {t}"),
        (None, true) => " -> unknown[]".to_string(),
        (None, false) => String::new(),
    };

    format!("{}({}){}", rpc.name, params.join(", "), ret)
}

fn format_timestamp(unix: i64) -> String {
    chrono::DateTime::from_timestamp(unix, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| unix.to_string())
}

// ═══════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════

fn parse_headers(raw: &[String]) -> Result<Option<HashMap<String, String>>> {
    if raw.is_empty() {
        return Ok(None);
    }

    let mut headers = HashMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once(':') else {
            bail!("Invalid header format: {entry}. Use NAME:VALUE");
        };
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(Some(headers))
}

fn parse_qualified(input: &str, kind: &str) -> Result<(String, String)> {
    match input.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
            Ok((schema.to_string(), name.to_string()))
        }
        _ => bail!("Invalid {kind} format: {input}. Use: schema.{kind}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified() {
        assert_eq!(
            parse_qualified("public.users", "table").unwrap(),
            ("public".to_string(), "users".to_string())
        );
        assert!(parse_qualified("users", "table").is_err());
        assert!(parse_qualified(".users", "table").is_err());
        assert!(parse_qualified("public.", "table").is_err());
    }

    #[test]
    fn test_parse_headers() {
        let parsed = parse_headers(&["X-Custom: value".to_string()]).unwrap().unwrap();
        assert_eq!(parsed.get("X-Custom").map(String::as_str), Some("value"));

        assert!(parse_headers(&[]).unwrap().is_none());
        assert!(parse_headers(&["no-colon".to_string()]).is_err());
    }

    #[test]
    fn test_format_rpc_signature() {
        let rpc = RpcSchema {
            name: "get_user".to_string(),
            parameters: vec![
                types::RpcParameter {
                    name: "p_id".to_string(),
                    type_name: "integer".to_string(),
                    format: None,
                    required: true,
                    description: None,
                },
                types::RpcParameter {
                    name: "p_verbose".to_string(),
                    type_name: "boolean".to_string(),
                    format: None,
                    required: false,
                    description: None,
                },
            ],
            return_type: Some("users".to_string()),
            returns_array: true,
            description: None,
        };

        assert_eq!(
            format_rpc_signature(&rpc),
            "get_user(p_id: integer, p_verbose?: boolean) -> users[]"
        );
    }
}
