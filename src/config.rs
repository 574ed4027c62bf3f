use crate::collectors::CollectorRegistry;
use crate::errors::ConfigError;
use clap::{Arg, ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "cgroupv2-exporter", version, about)]
pub struct Config {
    /// Comma-separated list of cgroup directories to monitor.
    #[arg(
        long = "cgroup",
        env = "CGROUPV2_EXPORTER_CGROUPS",
        value_delimiter = ',',
        default_value = "/sys/fs/cgroup"
    )]
    pub cgroups: Vec<PathBuf>,

    /// Only run the named collectors (comma-separated). Each must be enabled.
    #[arg(long = "collect", env = "CGROUPV2_EXPORTER_COLLECT", value_delimiter = ',')]
    pub collect: Vec<String>,

    /// Disable every collector not explicitly enabled or disabled by flag.
    #[arg(long = "collector.disable-defaults", default_value_t = false)]
    pub disable_defaults: bool,

    /// Print the registered collectors with their state and exit.
    #[arg(long = "collector.list", default_value_t = false)]
    pub list_collectors: bool,

    /// Interval between scrapes in milliseconds.
    #[arg(long, env = "CGROUPV2_EXPORTER_SCRAPE_INTERVAL_MS", default_value_t = 15000)]
    pub scrape_interval_ms: u64,

    /// Run a single scrape and exit.
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Write the exposition to this file (atomically replaced) instead of stdout.
    #[arg(long, env = "CGROUPV2_EXPORTER_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Sample channel buffer size (bounded to enforce backpressure).
    #[arg(long, env = "CGROUPV2_EXPORTER_CHANNEL_BUFFER", default_value_t = 256)]
    pub channel_buffer: usize,

    /// Enable JSON structured logging.
    #[arg(long, env = "CGROUPV2_EXPORTER_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "CGROUPV2_EXPORTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_millis(self.scrape_interval_ms.max(1))
    }

    /// Command line with a `--collector.<name>` / `--no-collector.<name>` pair per collector.
    pub fn command_for(registry: &CollectorRegistry) -> clap::Command {
        let mut cmd = Self::command();
        for name in registry.names() {
            let state = if registry.is_default_enabled(name) {
                "enabled"
            } else {
                "disabled"
            };
            cmd = cmd
                .arg(
                    Arg::new(enable_flag(name))
                        .long(enable_flag(name))
                        .action(ArgAction::SetTrue)
                        .help(format!("Enable the {} collector (default: {}).", name, state))
                        .overrides_with(disable_flag(name)),
                )
                .arg(
                    Arg::new(disable_flag(name))
                        .long(disable_flag(name))
                        .action(ArgAction::SetTrue)
                        .hide(true)
                        .overrides_with(enable_flag(name)),
                );
        }
        cmd
    }

    /// Parse `args` and apply collector flags to `registry`.
    pub fn try_parse_with<I, T>(registry: &mut CollectorRegistry, args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command_for(registry).try_get_matches_from(args)?;
        let config = Self::from_arg_matches(&matches)?;
        config
            .apply(registry, &matches)
            .map_err(|e| clap::Error::raw(clap::error::ErrorKind::ArgumentConflict, e))?;
        Ok(config)
    }

    /// Parse the process arguments, exiting with usage on error.
    pub fn parse_with(registry: &mut CollectorRegistry) -> Self {
        Self::try_parse_with(registry, std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    fn apply(&self, registry: &mut CollectorRegistry, matches: &ArgMatches) -> Result<(), ConfigError> {
        let names: Vec<String> = registry.names().map(str::to_string).collect();
        for name in &names {
            if matches.get_flag(&enable_flag(name)) {
                registry.set_enabled(name, true)?;
            } else if matches.get_flag(&disable_flag(name)) {
                registry.set_enabled(name, false)?;
            }
        }
        if self.disable_defaults {
            registry.disable_defaults();
        }
        Ok(())
    }
}

fn enable_flag(name: &str) -> String {
    format!("collector.{}", name)
}

fn disable_flag(name: &str) -> String {
    format!("no-collector.{}", name)
}
