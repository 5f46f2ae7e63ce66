//! Batch input and run accounting
//!
//! Supports:
//! - Text files with one domain per line
//! - CSV files with one domain per line or a "domain" column
//! - JSON files with an array of domain strings or objects with a "domain" field
//!
//! Inputs are cleaned (scheme, `www.` and paths removed, lower-cased),
//! de-duplicated in first-seen order, and invalid hostnames are dropped.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::domain_utils::{clean_domain_input, is_valid_domain};
use crate::evidence::SourceKind;
use crate::resolver::Stage;

/// Input format for domain files
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputFormat {
    Text,
    Csv,
    Json,
}

impl InputFormat {
    /// Detect format from file extension; anything unknown is read as text
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
            Some("csv") => Self::Csv,
            Some("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Parse domain list from a file (format from extension)
pub fn parse_domain_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;

    match InputFormat::from_path(path) {
        InputFormat::Text => Ok(parse_text_domains(&content)),
        InputFormat::Csv => parse_csv_domains(&content),
        InputFormat::Json => parse_json_domains(&content),
    }
}

/// Clean, validate and de-duplicate raw inputs, keeping input order.
pub fn normalize_domains<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|d| clean_domain_input(d.as_ref()))
        .filter(|d| is_valid_domain(d))
        .filter(|d| seen.insert(d.clone()))
        .collect()
}

/// One domain per line. Blank lines and `#` comments are skipped.
pub fn parse_text_domains(content: &str) -> Vec<String> {
    normalize_domains(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
}

/// CSV with a "domain" header column, or first column without a header.
pub fn parse_csv_domains(content: &str) -> Result<Vec<String>> {
    let first_line = content.lines().next().unwrap_or_default().to_lowercase();
    let has_header = first_line.split(',').any(|h| h.trim() == "domain");

    if !has_header {
        return Ok(parse_text_domains(
            &content
                .lines()
                .map(|line| line.split(',').next().unwrap_or(line))
                .collect::<Vec<_>>()
                .join("\n"),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().context("Failed to read CSV headers")?.clone();
    let domain_idx = headers
        .iter()
        .position(|h| h.trim().to_lowercase() == "domain")
        .context("CSV must have a 'domain' column when using headers")?;

    let mut raw = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to parse CSV record")?;
        if let Some(domain) = record.get(domain_idx) {
            let domain = domain.trim();
            if !domain.is_empty() && !domain.starts_with('#') {
                raw.push(domain.to_string());
            }
        }
    }

    Ok(normalize_domains(raw))
}

/// `["a.com"]`, `[{"domain": "a.com"}]` or `{"domains": [...]}`
pub fn parse_json_domains(content: &str) -> Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(content).context("Failed to parse JSON content")?;

    let items = match &value {
        serde_json::Value::Array(arr) => arr,
        serde_json::Value::Object(obj) => match obj.get("domains") {
            Some(serde_json::Value::Array(arr)) => arr,
            Some(_) => bail!("'domains' field must be an array"),
            None => bail!("JSON object must have a 'domains' array field"),
        },
        _ => bail!("JSON must be an array of domains or an object with 'domains' field"),
    };

    let raw = items.iter().filter_map(|item| match item {
        serde_json::Value::String(domain) => Some(domain.as_str()),
        serde_json::Value::Object(obj) => obj.get("domain").and_then(|v| v.as_str()),
        _ => None,
    });

    Ok(normalize_domains(raw))
}

/// Where a batch was stopped by an anti-bot block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedAt {
    pub domain: String,
    pub stage: Stage,
    pub source: SourceKind,
}

/// Summary of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total_domains: usize,
    /// Domains a resolution was attempted for (skipped ones excluded)
    pub processed: usize,
    pub stored: usize,
    /// Already had a stored result
    pub skipped: usize,
    /// Faulted and were logged, batch continued
    pub failed: usize,
    /// Never reached because of a block or an interrupt
    pub not_attempted: usize,
    pub blocked: Option<BlockedAt>,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    pub fn new(total_domains: usize) -> Self {
        Self {
            total_domains,
            processed: 0,
            stored: 0,
            skipped: 0,
            failed: 0,
            not_attempted: 0,
            blocked: None,
            interrupted: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn finalize(&mut self) {
        self.completed_at = Some(Utc::now());
        self.not_attempted = self.total_domains.saturating_sub(self.processed + self.skipped);
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.is_some()
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
