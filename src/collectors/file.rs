use super::{Collector, MetricSender, NAMESPACE};
use crate::errors::CollectorError;
use crate::parsers::Parser;
use crate::sanitize::sanitize_metric_name;
use async_trait::async_trait;
use prometheus::core::Collector as _;
use prometheus::{GaugeVec, Opts};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs;
use tracing::{debug, error};

/// Reads one cgroup v2 interface file from every monitored directory.
///
/// Gauges are created on first sight of a metric name and kept for the lifetime of
/// the collector, so label values from earlier scrapes stay exported.
pub struct FileCollector {
    name: String,
    file_name: String,
    parser: Parser,
    dirs: Vec<PathBuf>,
    gauges: Mutex<HashMap<String, GaugeVec>>,
}

impl FileCollector {
    pub fn new(name: impl Into<String>, file_name: impl Into<String>, parser: Parser, dirs: &[PathBuf]) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            parser,
            dirs: dirs.to_vec(),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    /// Label value identifying a monitored directory.
    fn cgroup_label(dir: &Path) -> String {
        let base = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.to_string_lossy().into_owned());
        sanitize_metric_name(&base)
    }

    /// Set `value` for `cgroup` on the gauge named `metric`, returning its full state.
    fn record(
        &self,
        metric: &str,
        cgroup: &str,
        value: f64,
    ) -> Result<Vec<prometheus::proto::MetricFamily>, CollectorError> {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        if !gauges.contains_key(metric) {
            let opts = Opts::new(
                metric,
                format!("metric {} from file {}", metric, self.file_name),
            )
            .namespace(NAMESPACE);
            gauges.insert(metric.to_string(), GaugeVec::new(opts, &["cgroup"])?);
        }

        let gauge = &gauges[metric];
        gauge.with_label_values(&[cgroup]).set(value);
        Ok(gauge.collect())
    }
}

#[async_trait]
impl Collector for FileCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn update(&self, tx: &MetricSender) -> Result<(), CollectorError> {
        for dir in &self.dirs {
            let path = dir.join(&self.file_name);
            let content = fs::read_to_string(&path).await.map_err(|e| {
                error!(file = %self.file_name, dir = %dir.display(), error = %e, "failed to read");
                CollectorError::Read {
                    path: path.display().to_string(),
                    source: e,
                }
            })?;

            let metrics = self.parser.parse(&content).map_err(|e| {
                let e = e.with_path(&path);
                error!(file = %self.file_name, dir = %dir.display(), error = %e, "failed to parse");
                e
            })?;

            let cgroup = Self::cgroup_label(dir);
            for (key, value) in metrics {
                let metric = sanitize_metric_name(&key);
                for family in self.record(&metric, &cgroup, value)? {
                    tx.send(family)
                        .await
                        .map_err(|_| CollectorError::ChannelClosed)?;
                }
                debug!(file = %self.file_name, metric = %metric, value, cgroup = %cgroup, "collected metric");
            }
        }
        Ok(())
    }
}
