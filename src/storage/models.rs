//! Inventory records and shared value types.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vulnerability severity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Unknown,
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_db_value(self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// SQL expression ranking severities for ORDER BY in the vuln feed.
    pub const ORDER_EXPR: &'static str = "CASE severity \
        WHEN 'critical' THEN 5 WHEN 'high' THEN 4 WHEN 'medium' THEN 3 \
        WHEN 'low' THEN 2 WHEN 'info' THEN 1 ELSE 0 END";

    pub const ALL: [Severity; 6] = [
        Severity::Unknown,
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_value())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unknown" | "" => Ok(Severity::Unknown),
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(anyhow!("Unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub id: i64,
    pub address: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub comment: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub id: i64,
    pub host_id: i64,
    pub proto: String,
    pub port: i64,
    pub state: Option<String>,
    pub name: Option<String>,
    pub info: Option<String>,
    pub comment: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: i64,
    pub host_id: i64,
    pub service_id: Option<i64>,
    pub ntype: Option<String>,
    pub data: Option<String>,
    pub comment: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Vuln {
    pub id: i64,
    pub host_id: i64,
    pub service_id: Option<i64>,
    pub name: String,
    pub xtype: Option<String>,
    pub severity: Severity,
    pub descr: Option<String>,
    pub data: Option<String>,
    pub refs: Vec<String>,
    pub tags: Vec<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Normalize a tag list: trim, lowercase, drop blanks, sort and deduplicate.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Parse a JSON-array tags column; corrupt values read as empty.
pub fn tags_from_json(value: &str) -> Vec<String> {
    serde_json::from_str(value).unwrap_or_default()
}

pub fn tags_to_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags_lowercases_and_dedups() {
        let tags = normalize_tags(["Work", "IMPORTANT", "work"]);
        assert_eq!(tags, vec!["important".to_string(), "work".to_string()]);
    }

    #[test]
    fn test_normalize_tags_drops_blanks() {
        let tags = normalize_tags(["  ", "", "reviewed"]);
        assert_eq!(tags, vec!["reviewed".to_string()]);
    }

    #[test]
    fn test_tags_json_roundtrip() {
        let tags = vec!["a".to_string(), "b".to_string()];
        assert_eq!(tags_from_json(&tags_to_json(&tags)), tags);
        assert!(tags_from_json("{broken").is_empty());
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("".parse::<Severity>().unwrap(), Severity::Unknown);
        assert!("severe".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_display_matches_db_value() {
        for severity in Severity::ALL {
            assert_eq!(severity.to_string(), severity.as_db_value());
        }
    }
}
