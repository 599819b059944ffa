// credential_extractor.rs - Supabase Credential Extraction from Web Content
// Purpose: Recover a project URL / anon key pair from arbitrary
//          HTML/JS content, walking inline and external scripts.
// Heuristic: a URL and its key are typically declared near each other,
//            so the closest URL/key pair by character offset wins.

use anyhow::{Context, Result, bail};
use colored::*;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

use crate::progress::{ProgressReporter, ScanEvent};
use crate::types::ExtractedCredentials;

lazy_static! {
    static ref RE_PROJECT_URL: Regex =
        Regex::new(r"https://[a-z0-9-]+\.supabase\.co/?").unwrap();
    static ref RE_PROJECT_URL_QUOTED: Regex =
        Regex::new(r#"['"`]https://[a-z0-9-]+\.supabase\.co/?['"`]"#).unwrap();

    // Anon keys are JWTs with the standard HS256 header segment.
    static ref RE_ANON_KEY: Regex =
        Regex::new(r"eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+")
            .unwrap();
    static ref RE_ANON_KEY_QUOTED: Regex = Regex::new(
        r#"['"`]eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+['"`]"#
    )
    .unwrap();

    // Client construction with both literals in place encodes the actual
    // call site, so it outranks any co-occurrence pair. The optional `)`
    // covers the minified `(0,r.createBrowserClient)(...)` form.
    static ref RE_CLIENT_CONSTRUCTION: Regex = Regex::new(
        r#"create(?:Browser)?Client\)?\s*\(\s*["']([^"']+)["']\s*,\s*["']([^"']+)["']"#
    )
    .unwrap();
}

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Default)]
pub struct ExtractorOptions {
    /// Skip the console warnings for unreachable external scripts.
    pub suppress_warnings: bool,
}

#[derive(Debug, Clone)]
struct CandidatePair {
    url: String,
    key: String,
    distance: usize,
}

/// Fetch a page or script and extract credentials from it. HTML content
/// is walked script by script: inline bodies first in document order,
/// then external scripts, stopping at the first success.
pub async fn extract_from_url(
    http: &reqwest::Client,
    url: &str,
    opts: &ExtractorOptions,
    reporter: &ProgressReporter,
) -> Result<ExtractedCredentials> {
    reporter.emit(ScanEvent::ExtractionStarted {
        url: url.to_string(),
    });

    let response = http
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("failed to fetch {url}"))?;

    if !response.status().is_success() {
        let status = response.status();
        bail!(
            "Failed to fetch URL: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let content = response.text().await.context("failed to read response body")?;

    reporter.emit(ScanEvent::ContentFetched {
        url: url.to_string(),
        size: content.len(),
        content_type: content_type.clone(),
    });

    let trimmed = content.trim_start();
    let is_html = content_type.contains("text/html")
        || trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html");
    let is_js = url.ends_with(".js")
        || content_type.contains("javascript")
        || content_type.contains("ecmascript");

    if is_js {
        let result = extract_from_content(&content, Some(url))?;
        reporter.emit(ScanEvent::CredentialsFound {
            source: url.to_string(),
        });
        return Ok(result);
    }

    if is_html {
        return extract_from_html(http, &content, url, opts, reporter).await;
    }

    let result = extract_from_content(&content, Some(url))?;
    reporter.emit(ScanEvent::CredentialsFound {
        source: url.to_string(),
    });
    Ok(result)
}

async fn extract_from_html(
    http: &reqwest::Client,
    html: &str,
    base_url: &str,
    opts: &ExtractorOptions,
    reporter: &ProgressReporter,
) -> Result<ExtractedCredentials> {
    let (inline_scripts, script_srcs) = collect_scripts(html);

    reporter.emit(ScanEvent::HtmlDetected {
        script_count: inline_scripts.len() + script_srcs.len(),
    });

    for body in &inline_scripts {
        if let Ok(result) = extract_from_content(body, Some("inline script")) {
            reporter.emit(ScanEvent::CredentialsFound {
                source: "inline script".to_string(),
            });
            return Ok(result);
        }
    }

    for src in &script_srcs {
        let script_url = match resolve_url(src, base_url) {
            Ok(u) => u,
            Err(_) => continue,
        };

        reporter.emit(ScanEvent::ScriptChecking {
            script_url: script_url.clone(),
        });

        let response = match http.get(&script_url).timeout(FETCH_TIMEOUT).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                if !opts.suppress_warnings {
                    println!(
                        "{}",
                        format!("[!] Script fetch returned {}: {}", r.status(), script_url)
                            .yellow()
                    );
                }
                continue;
            }
            Err(e) => {
                if !opts.suppress_warnings {
                    println!(
                        "{}",
                        format!("[!] Failed to fetch script {script_url}: {e}").yellow()
                    );
                }
                continue;
            }
        };

        let content = match response.text().await {
            Ok(c) => c,
            Err(_) => continue,
        };

        if let Ok(result) = extract_from_content(&content, Some(&script_url)) {
            reporter.emit(ScanEvent::CredentialsFound {
                source: script_url.clone(),
            });
            return Ok(result);
        }
    }

    bail!("No Supabase credentials found in any scripts")
}

/// Extract a URL/key pair from raw text. The client-construction call
/// pattern takes precedence; otherwise the closest URL/key pair by
/// character offset is chosen.
pub fn extract_from_content(
    content: &str,
    source: Option<&str>,
) -> Result<ExtractedCredentials> {
    if let Some(caps) = RE_CLIENT_CONSTRUCTION.captures(content) {
        let url = caps[1].to_string();
        let key = caps[2].to_string();
        if !url.is_empty() && !key.is_empty() {
            return Ok(ExtractedCredentials {
                url,
                key,
                source: source.map(String::from),
            });
        }
    }

    let pairs = find_closest_pairs(content);
    let Some(pair) = pairs.into_iter().next() else {
        bail!("No Supabase URL-key pairs found in content");
    };

    Ok(ExtractedCredentials {
        url: pair.url,
        key: pair.key,
        source: source.map(String::from),
    })
}

fn find_closest_pairs(content: &str) -> Vec<CandidatePair> {
    let url_matches = find_all_matches(
        content,
        &[&RE_PROJECT_URL, &RE_PROJECT_URL_QUOTED],
    );
    let key_matches = find_all_matches(content, &[&RE_ANON_KEY, &RE_ANON_KEY_QUOTED]);

    let mut pairs = Vec::with_capacity(url_matches.len() * key_matches.len());
    for (url_offset, url_text) in &url_matches {
        for (key_offset, key_text) in &key_matches {
            pairs.push(CandidatePair {
                url: strip_delimiters(url_text),
                key: strip_delimiters(key_text),
                distance: url_offset.abs_diff(*key_offset),
            });
        }
    }

    // Stable sort keeps generation order on ties.
    pairs.sort_by_key(|p| p.distance);
    pairs
}

fn find_all_matches(content: &str, patterns: &[&Regex]) -> Vec<(usize, String)> {
    let mut matches = Vec::new();
    for pattern in patterns {
        for mat in pattern.find_iter(content) {
            matches.push((mat.start(), mat.as_str().to_string()));
        }
    }
    matches
}

fn strip_delimiters(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\'' | '"' | '`' | ';'))
        .collect()
}

/// Split a document's scripts into inline bodies and external `src`
/// references, both in document order.
fn collect_scripts(html: &str) -> (Vec<String>, Vec<String>) {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script").unwrap();

    let mut inline = Vec::new();
    let mut external = Vec::new();

    for element in document.select(&selector) {
        if let Some(src) = element.value().attr("src") {
            if !src.is_empty() {
                external.push(src.to_string());
            }
        } else {
            let body: String = element.text().collect();
            if !body.trim().is_empty() {
                inline.push(body);
            }
        }
    }

    (inline, external)
}

/// Resolve a script reference against the page it appeared on. Handles
/// protocol-relative, root-relative and directory-relative forms.
pub fn resolve_url(raw: &str, base_url: &str) -> Result<String> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Ok(raw.to_string());
    }

    let base = Url::parse(base_url).with_context(|| format!("invalid base URL: {base_url}"))?;

    if raw.starts_with("//") {
        return Ok(format!("{}:{}", base.scheme(), raw));
    }

    let joined = base
        .join(raw)
        .with_context(|| format!("cannot resolve {raw} against {base_url}"))?;
    Ok(joined.to_string())
}
