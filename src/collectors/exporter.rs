use super::{Collector, MetricSender, NAMESPACE};
use crate::errors::CollectorError;
use prometheus::core::Collector as _;
use prometheus::proto::{Metric, MetricFamily};
use prometheus::{Gauge, Opts, TextEncoder};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Runs a fixed set of collectors concurrently and gathers their samples.
pub struct Exporter {
    collectors: BTreeMap<String, Arc<dyn Collector>>,
    channel_buffer: usize,
}

impl Exporter {
    pub fn new(collectors: BTreeMap<String, Arc<dyn Collector>>) -> Self {
        Self {
            collectors,
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
        }
    }

    /// Capacity of the bounded sample channel shared by all collectors.
    pub fn with_channel_buffer(mut self, size: usize) -> Self {
        self.channel_buffer = size.max(1);
        self
    }

    pub fn collector_names(&self) -> impl Iterator<Item = &str> {
        self.collectors.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// One scrape: every collector runs in its own task; returns once all have finished.
    ///
    /// Families come back in arrival order and may repeat a name, see [`merge_families`].
    pub async fn scrape(&self) -> Vec<MetricFamily> {
        let (tx, mut rx) = mpsc::channel(self.channel_buffer);
        let mut tasks = JoinSet::new();

        for (name, collector) in &self.collectors {
            tasks.spawn(execute(name.clone(), Arc::clone(collector), tx.clone()));
        }
        drop(tx);

        let mut families = Vec::new();
        while let Some(family) = rx.recv().await {
            families.push(family);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "scrape task did not complete");
            }
        }

        families
    }

    /// Scrape and merge into one family per metric name, sorted by name.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        merge_families(self.scrape().await)
    }
}

/// Run one collector and emit its duration and success samples.
///
/// The update runs in its own task so a panic inside it still ends in bookkeeping.
async fn execute(name: String, collector: Arc<dyn Collector>, tx: MetricSender) {
    let begin = Instant::now();
    let worker = {
        let tx = tx.clone();
        tokio::spawn(async move { collector.update(&tx).await })
    };
    let result = worker
        .await
        .unwrap_or_else(|e| Err(CollectorError::Aborted(e.to_string())));
    let duration = begin.elapsed().as_secs_f64();

    let success = match result {
        Ok(()) => {
            debug!(collector = %name, duration_seconds = duration, "collector succeeded");
            1.0
        }
        Err(e) if e.is_no_data() => {
            debug!(collector = %name, duration_seconds = duration, error = %e, "collector returned no data");
            0.0
        }
        Err(e) => {
            error!(collector = %name, duration_seconds = duration, error = %e, "collector failed");
            0.0
        }
    };

    let samples = [
        ("collector_duration_seconds", "cgroupv2_exporter: Duration of a collector scrape.", duration),
        ("collector_success", "cgroupv2_exporter: Whether a collector succeeded.", success),
    ];
    for (metric, help, value) in samples {
        let families = match scrape_gauge(metric, help, &name, value) {
            Ok(families) => families,
            Err(e) => {
                error!(collector = %name, metric, error = %e, "failed to build scrape metric");
                continue;
            }
        };
        for family in families {
            if tx.send(family).await.is_err() {
                warn!(collector = %name, "sample channel closed");
                return;
            }
        }
    }
}

fn scrape_gauge(
    metric: &str,
    help: &str,
    collector: &str,
    value: f64,
) -> Result<Vec<MetricFamily>, prometheus::Error> {
    let opts = Opts::new(metric, help)
        .namespace(NAMESPACE)
        .subsystem("scrape")
        .const_label("collector", collector);
    let gauge = Gauge::with_opts(opts)?;
    gauge.set(value);
    Ok(gauge.collect())
}

type LabelKey = Vec<(String, String)>;

fn label_key(metric: &Metric) -> LabelKey {
    metric
        .get_label()
        .iter()
        .map(|l| (l.get_name().to_string(), l.get_value().to_string()))
        .collect()
}

/// Fold repeated families into one per name.
///
/// Series with an identical label set keep the value that arrived last.
pub fn merge_families(families: Vec<MetricFamily>) -> Vec<MetricFamily> {
    let mut merged: BTreeMap<String, (MetricFamily, HashMap<LabelKey, usize>)> = BTreeMap::new();

    for mut family in families {
        let incoming = family.take_metric();
        let name = family.get_name().to_string();
        let (entry, index) = merged
            .entry(name)
            .or_insert_with(move || (family, HashMap::new()));
        let metrics = entry.mut_metric();

        for metric in incoming {
            match index.entry(label_key(&metric)) {
                Entry::Occupied(slot) => metrics[*slot.get()] = metric,
                Entry::Vacant(slot) => {
                    slot.insert(metrics.len());
                    metrics.push(metric);
                }
            }
        }
    }

    merged
        .into_values()
        .map(|(mut family, _)| {
            family.mut_metric().sort_by_cached_key(label_key);
            family
        })
        .collect()
}

/// Render families in the Prometheus text exposition format.
///
/// The encoder prints non-finite values the way Rust formats them (`inf`), so sample
/// values are rewritten to the exposition spelling (`+Inf`, `-Inf`).
pub fn encode_text(families: &[MetricFamily]) -> Result<String, prometheus::Error> {
    let raw = TextEncoder::new().encode_to_string(families)?;

    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        match line.rsplit_once(' ') {
            Some((series, value)) if !line.starts_with('#') => {
                out.push_str(series);
                out.push(' ');
                out.push_str(match value {
                    "inf" => "+Inf",
                    "-inf" => "-Inf",
                    other => other,
                });
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }
    Ok(out)
}
