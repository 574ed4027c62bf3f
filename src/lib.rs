//! Prometheus exporter for cgroup v2 interface files.
//!
//! Each collector reads one interface file (`memory.current`, `memory.pressure`, ...)
//! from every monitored cgroup directory and exports the values as gauges labeled
//! by directory name.

pub mod collectors;
pub mod config;
pub mod errors;
pub mod parsers;
pub mod sanitize;
