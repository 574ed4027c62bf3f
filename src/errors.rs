use thiserror::Error;

//create types errors for easy testability

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason} (raw: {raw:?})")]
    Parse {
        path: String,
        raw: String,
        reason: String,
    },

    #[error("collector returned no data")]
    NoData,

    #[error("metric error: {0}")]
    Metric(#[from] prometheus::Error),

    #[error("sample channel closed before collection finished")]
    ChannelClosed,

    #[error("collector task did not complete: {0}")]
    Aborted(String),
}

impl CollectorError {
    /// True for the outcome where a collector found nothing to report.
    pub fn is_no_data(&self) -> bool {
        matches!(self, CollectorError::NoData)
    }

    /// Attach the file path to a parse error produced from raw content.
    pub fn with_path(self, file: &std::path::Path) -> Self {
        match self {
            CollectorError::Parse { raw, reason, .. } => CollectorError::Parse {
                path: file.display().to_string(),
                raw,
                reason,
            },
            other => other,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing collector: {0}")]
    UnknownCollector(String),

    #[error("disabled collector: {0}")]
    DisabledCollector(String),

    #[error("collector {0} registered twice")]
    DuplicateCollector(String),

    #[error("failed to construct collector {name}: {source}")]
    Construction {
        name: String,
        source: CollectorError,
    },
}
