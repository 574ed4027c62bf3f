pub mod exporter;
pub mod file;
pub mod registry;

pub use exporter::Exporter;
pub use file::FileCollector;
pub use registry::CollectorRegistry;

use crate::errors::{CollectorError, ConfigError};
use crate::parsers::Parser;
use crate::sanitize::sanitize_metric_name;
use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use tokio::sync::mpsc;

/// Namespace shared by every exported metric.
pub const NAMESPACE: &str = "cgroupv2";

/// Sending half of the per-scrape sample stream.
pub type MetricSender = mpsc::Sender<MetricFamily>;

#[async_trait]
pub trait Collector: Send + Sync {
    /// name of the collector as used in flags and bookkeeping labels
    fn name(&self) -> &str;

    /// read current state and push the resulting metric families to `tx`.
    async fn update(&self, tx: &MetricSender) -> Result<(), CollectorError>;
}

/// Parser layout of a built-in collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Single,
    Flat,
    Nested,
}

/// Built-in cgroup v2 files: (file name, default enabled, layout).
pub const BUILTIN_FILES: &[(&str, bool, Layout)] = &[
    ("memory.pressure", true, Layout::Nested),
    ("memory.current", true, Layout::Single),
    ("memory.swap.current", true, Layout::Single),
    ("memory.high", true, Layout::Single),
    ("memory.stat", false, Layout::Flat),
    ("memory.max", false, Layout::Single),
    ("memory.min", false, Layout::Single),
    ("memory.low", false, Layout::Single),
    ("memory.swap.max", false, Layout::Single),
    ("memory.events", false, Layout::Flat),
    ("pids.current", false, Layout::Single),
    ("pids.max", false, Layout::Single),
    ("cpu.stat", false, Layout::Flat),
    ("cpu.pressure", false, Layout::Nested),
    ("io.pressure", false, Layout::Nested),
];

impl Layout {
    /// Parser for `file`, prefixed with the sanitized file name.
    pub fn parser_for(self, file: &str) -> Parser {
        let prefix = sanitize_metric_name(file);
        match self {
            Layout::Single => Parser::SingleValue { prefix },
            Layout::Flat => Parser::FlatKeyValue { prefix },
            Layout::Nested => Parser::NestedKeyValue { prefix },
        }
    }
}

/// Registry holding one file collector per built-in cgroup v2 file.
pub fn builtin_registry() -> Result<CollectorRegistry, ConfigError> {
    let mut registry = CollectorRegistry::new();
    for &(file, enabled, layout) in BUILTIN_FILES {
        registry.register_file(file, enabled, layout)?;
    }
    Ok(registry)
}
