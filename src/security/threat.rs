//! Signature scanning of request URL, query and body, plus the registry of
//! client addresses that have tripped a signature.

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

struct ThreatPattern {
    name: &'static str,
    regex: Regex,
}

const SIGNATURES: &[(&str, &str)] = &[
    ("sql_union", r"(?i)\bunion\b[\s(]+(all\s+)?select\b"),
    (
        "sql_statement",
        r"(?i)(;|'|\))\s*(select|insert|update|delete|drop|alter|create|truncate|exec)\b",
    ),
    // The quote closing the literal must be matched by a quoted comparison.
    (
        "sql_tautology",
        r#"(?i)('\s*(or|and)\s+'?\w+'?\s*=\s*'?\w+|\\?"\s*(or|and)\s+\\?"\w+\\?"\s*=\s*\\?"\w+)"#,
    ),
    ("sql_numeric_tautology", r"(?i)\b(or|and)\s+(\d+)\s*=\s*(\d+)\b"),
    ("sql_comment", r"(?i)('|;)\s*(--|#|/\*)"),
    ("sql_sleep", r"(?i)\b(sleep|benchmark|pg_sleep|waitfor\s+delay)\s*\("),
    ("script_tag", r"(?i)<\s*/?\s*script\b"),
    ("javascript_uri", r"(?i)javascript\s*:"),
    ("event_handler", r#"(?i)<[^>]+\bon[a-z]+\s*="#),
    ("embedded_frame", r"(?i)<\s*(iframe|object|embed)\b"),
    ("path_traversal", r"(?i)(\.\./|\.\.\\|%2e%2e(%2f|%5c|/|\\)|\.\.%2f|\.\.%5c)"),
    // Command followed by a flag or path argument, another operator, or the
    // end of input.
    (
        "shell_command",
        r"(?i)((;|\|\||&&|\||`)\s*(rm|cat|ls|wget|curl|bash|sh|nc|chmod|python|perl)(\s+[-/~.$]|\s*([;|&`]|$))|\|\s*(ba)?sh\b)",
    ),
    ("shell_substitution", r"\$\([^)]*\)"),
    (
        "nosql_operator",
        r#"(?i)["'\[]\$(where|ne|gt|gte|lt|lte|in|nin|regex|exists|expr|or|and)\b"#,
    ),
];

static PATTERNS: Lazy<Vec<ThreatPattern>> = Lazy::new(|| {
    SIGNATURES
        .iter()
        .filter_map(|&(name, source)| match Regex::new(source) {
            Ok(regex) => Some(ThreatPattern { name, regex }),
            Err(e) => {
                tracing::error!("Threat signature '{}' failed to compile: {}", name, e);
                None
            }
        })
        .collect()
});

/// Stateless scanner over the fixed signature list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreatDetector;

impl ThreatDetector {
    pub fn new() -> Self {
        Self
    }

    /// Name of the first signature found in `input`.
    pub fn scan(&self, input: &str) -> Option<&'static str> {
        PATTERNS.iter().find(|p| p.regex.is_match(input)).map(|p| p.name)
    }

    /// Scan URL, decoded query and body as one haystack.
    pub fn inspect(&self, uri: &str, query: Option<&str>, body: Option<&str>) -> Option<&'static str> {
        let mut haystack = String::with_capacity(uri.len() + body.map_or(0, str::len) + 64);
        haystack.push_str(uri);
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                haystack.push('\n');
                haystack.push_str(&key);
                haystack.push('=');
                haystack.push_str(&value);
            }
        }
        if let Some(body) = body {
            haystack.push('\n');
            haystack.push_str(body);
        }
        self.scan(&haystack)
    }
}

/// Addresses that have sent a request matching a signature.
///
/// The in-memory registry lives for the process only and is not shared
/// between instances; a shared backend implements the same trait.
#[async_trait]
pub trait SuspiciousIpRegistry: Send + Sync {
    async fn mark(&self, ip: IpAddr, signature: &'static str);

    async fn is_suspicious(&self, ip: IpAddr) -> bool;
}

#[derive(Debug, Clone)]
pub struct SuspiciousEntry {
    pub first_seen: DateTime<Utc>,
    pub last_signature: &'static str,
    pub hits: u32,
}

#[derive(Default)]
pub struct MemorySuspiciousIps {
    entries: DashMap<IpAddr, SuspiciousEntry>,
}

impl MemorySuspiciousIps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, ip: IpAddr) -> Option<SuspiciousEntry> {
        self.entries.get(&ip).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SuspiciousIpRegistry for MemorySuspiciousIps {
    async fn mark(&self, ip: IpAddr, signature: &'static str) {
        self.entries
            .entry(ip)
            .and_modify(|e| {
                e.hits += 1;
                e.last_signature = signature;
            })
            .or_insert_with(|| SuspiciousEntry {
                first_seen: Utc::now(),
                last_signature: signature,
                hits: 1,
            });
    }

    async fn is_suspicious(&self, ip: IpAddr) -> bool {
        self.entries.contains_key(&ip)
    }
}
