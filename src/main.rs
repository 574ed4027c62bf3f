use anyhow::Context;
use cgroupv2_exporter::collectors::exporter::{encode_text, Exporter};
use cgroupv2_exporter::collectors::{builtin_registry, CollectorRegistry};
use cgroupv2_exporter::config::Config;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut registry = builtin_registry().context("registering built-in collectors")?;
    let config = Config::parse_with(&mut registry);
    init_tracing(&config);

    if config.list_collectors {
        print_collectors(&registry);
        return Ok(());
    }

    let exporter = registry
        .resolve(&config.cgroups, &config.collect)
        .context("resolving collectors")?
        .with_channel_buffer(config.channel_buffer);
    let names: Vec<&str> = exporter.collector_names().collect();
    info!(collectors = ?names, cgroups = ?config.cgroups, "starting cgroupv2 exporter");

    let mut ticker = tokio::time::interval(config.scrape_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }

        match publish(&exporter, &config).await {
            Ok(()) if config.once => break,
            Ok(()) => {}
            Err(e) if config.once => return Err(e),
            Err(e) => error!(error = %format!("{e:#}"), "failed to publish scrape"),
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_collectors(registry: &CollectorRegistry) {
    for name in registry.names() {
        let state = if registry.is_enabled(name) { "enabled" } else { "disabled" };
        println!("{name}\t{state}");
    }
}

/// Scrape once and write the exposition to the configured output.
async fn publish(exporter: &Exporter, config: &Config) -> anyhow::Result<()> {
    let families = exporter.gather().await;
    let text = encode_text(&families).context("encoding metrics")?;

    match &config.output {
        Some(path) => write_atomic(path, &text).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(text.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    debug!(families = families.len(), "published scrape");
    Ok(())
}

/// Staging file next to `path`: the full file name with `.tmp` appended.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn write_atomic(path: &Path, text: &str) -> anyhow::Result<()> {
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, text)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
    Ok(())
}
