//! Decoders for the three text layouts used by cgroup v2 interface files.
//!
//! Every layout turns the raw file content into a map from derived metric name
//! (`<prefix>` or `<prefix>_<key>...`) to value. The line-oriented layouts skip
//! malformed lines with a warning instead of failing the whole file.

use crate::errors::CollectorError;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Parsed values keyed by derived metric name.
pub type ParsedMetrics = HashMap<String, f64>;

/// Layout of a cgroup v2 interface file, carrying the metric name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parser {
    /// One scalar for the whole file, e.g. `memory.current`. `max` means unlimited.
    SingleValue { prefix: String },
    /// `key value` per line, e.g. `memory.stat`.
    FlatKeyValue { prefix: String },
    /// `group key=value key=value ...` per line, e.g. `memory.pressure`.
    NestedKeyValue { prefix: String },
}

impl Parser {
    pub fn parse(&self, content: &str) -> Result<ParsedMetrics, CollectorError> {
        match self {
            Parser::SingleValue { prefix } => Self::parse_single(prefix, content),
            Parser::FlatKeyValue { prefix } => Ok(Self::parse_flat(prefix, content)),
            Parser::NestedKeyValue { prefix } => Ok(Self::parse_nested(prefix, content)),
        }
    }

    fn parse_single(prefix: &str, content: &str) -> Result<ParsedMetrics, CollectorError> {
        let content = content.trim();

        // cgroup v2 writes "max" for an unset limit
        let value = if content == "max" {
            debug!(prefix, "converting max to +Inf");
            f64::INFINITY
        } else {
            content
                .parse::<f64>()
                .map_err(|e| CollectorError::Parse {
                    path: prefix.to_string(),
                    raw: content.to_string(),
                    reason: e.to_string(),
                })?
        };

        Ok(HashMap::from([(prefix.to_string(), value)]))
    }

    fn parse_flat(prefix: &str, content: &str) -> ParsedMetrics {
        let mut metrics = HashMap::new();

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            if parts.len() != 2 {
                warn!(prefix, line, "expected 2 fields in key value line, got {}", parts.len());
                continue;
            }
            let name = format!("{}_{}", prefix, parts[0]);
            let value = parse_or_zero(&name, parts[1]);
            metrics.insert(name, value);
        }

        metrics
    }

    fn parse_nested(prefix: &str, content: &str) -> ParsedMetrics {
        let mut metrics = HashMap::new();

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            if parts.len() < 2 {
                warn!(prefix, line, "expected a group followed by key=value fields");
                continue;
            }

            let group = parts[0];
            for field in &parts[1..] {
                let kv: Vec<&str> = field.split('=').collect();
                if kv.len() != 2 {
                    warn!(prefix, group, field, "failed to parse field as key=value");
                    continue;
                }
                let name = format!("{}_{}_{}", prefix, group, kv[0]);
                let value = parse_or_zero(&name, kv[1]);
                metrics.insert(name, value);
            }
        }

        metrics
    }
}

/// Unparsable values are reported as zero so the exported series set stays stable.
fn parse_or_zero(name: &str, raw: &str) -> f64 {
    raw.parse::<f64>().unwrap_or_else(|e| {
        warn!(metric = name, raw, error = %e, "non-numeric value, reporting 0");
        0.0
    })
}
