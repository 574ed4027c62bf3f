use super::{Collector, Exporter, FileCollector, Layout};
use crate::errors::{CollectorError, ConfigError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Builds a collector instance for the given cgroup directories.
pub type Factory = Box<dyn Fn(&[PathBuf]) -> Result<Arc<dyn Collector>, CollectorError> + Send + Sync>;

struct Registration {
    default_enabled: bool,
    enabled: bool,
    /// explicitly enabled or disabled by configuration
    forced: bool,
    factory: Factory,
}

/// Table of known collectors and their enabled state.
///
/// Registration and enable/disable happen during startup through `&mut self`.
/// Once shared, only [`CollectorRegistry::resolve`] is used; it hands out one
/// instance per collector name for the lifetime of the registry.
pub struct CollectorRegistry {
    entries: BTreeMap<String, Registration>,
    initiated: Mutex<HashMap<String, Arc<dyn Collector>>>,
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            initiated: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        default_enabled: bool,
        factory: Factory,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(ConfigError::DuplicateCollector(name));
        }
        self.entries.insert(
            name,
            Registration {
                default_enabled,
                enabled: default_enabled,
                forced: false,
                factory,
            },
        );
        Ok(())
    }

    /// Register a [`FileCollector`] reading `file` with the parser for `layout`.
    pub fn register_file(&mut self, file: &str, default_enabled: bool, layout: Layout) -> Result<(), ConfigError> {
        let name = file.to_string();
        let parser = layout.parser_for(file);
        let factory: Factory = Box::new(move |dirs: &[PathBuf]| {
            Ok(Arc::new(FileCollector::new(name.clone(), name.clone(), parser.clone(), dirs)) as Arc<dyn Collector>)
        });
        self.register(file, default_enabled, factory)
    }

    /// Explicitly enable or disable a collector; marks it as forced.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownCollector(name.to_string()))?;
        entry.enabled = enabled;
        entry.forced = true;
        Ok(())
    }

    /// Disable every collector that configuration did not explicitly set.
    pub fn disable_defaults(&mut self) {
        for entry in self.entries.values_mut().filter(|e| !e.forced) {
            entry.enabled = false;
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.enabled)
    }

    pub fn is_default_enabled(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.default_enabled)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Collectors to run for `dirs`, restricted to `filters` when any are given.
    ///
    /// A filter naming an unknown or disabled collector is rejected. Instances are
    /// cached by name, so later calls get the same collector (and its `dirs`).
    pub fn resolve(&self, dirs: &[PathBuf], filters: &[String]) -> Result<Exporter, ConfigError> {
        let mut wanted = HashSet::new();
        for filter in filters {
            match self.entries.get(filter) {
                None => return Err(ConfigError::UnknownCollector(filter.clone())),
                Some(e) if !e.enabled => return Err(ConfigError::DisabledCollector(filter.clone())),
                Some(_) => {
                    wanted.insert(filter.as_str());
                }
            }
        }

        let mut initiated = self.initiated.lock().unwrap_or_else(PoisonError::into_inner);
        let mut collectors = BTreeMap::new();
        for (name, entry) in &self.entries {
            if !entry.enabled || (!wanted.is_empty() && !wanted.contains(name.as_str())) {
                continue;
            }
            let collector = match initiated.get(name) {
                Some(collector) => Arc::clone(collector),
                None => {
                    let collector = (entry.factory)(dirs).map_err(|source| ConfigError::Construction {
                        name: name.clone(),
                        source,
                    })?;
                    debug!(collector = %name, "constructed collector");
                    initiated.insert(name.clone(), Arc::clone(&collector));
                    collector
                }
            };
            collectors.insert(name.clone(), collector);
        }

        Ok(Exporter::new(collectors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::MetricSender;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Nop(String);

    #[async_trait]
    impl Collector for Nop {
        fn name(&self) -> &str {
            &self.0
        }

        async fn update(&self, _tx: &MetricSender) -> Result<(), CollectorError> {
            Ok(())
        }
    }

    fn nop(name: &'static str, built: Arc<AtomicUsize>) -> Factory {
        Box::new(move |_dirs: &[PathBuf]| {
            built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Nop(name.to_string())) as Arc<dyn Collector>)
        })
    }

    fn registry(built: &Arc<AtomicUsize>) -> CollectorRegistry {
        let mut registry = CollectorRegistry::new();
        registry.register("a", true, nop("a", built.clone())).unwrap();
        registry.register("b", true, nop("b", built.clone())).unwrap();
        registry.register("c", false, nop("c", built.clone())).unwrap();
        registry
    }

    fn names(exporter: &Exporter) -> Vec<&str> {
        exporter.collector_names().collect()
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut registry = registry(&built);
        let err = registry.register("a", false, nop("a", built.clone())).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateCollector(ref n) if n == "a"));
    }

    #[test]
    fn test_resolve_without_filter_uses_enabled() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = registry(&built);
        let exporter = registry.resolve(&[], &[]).unwrap();
        assert_eq!(names(&exporter), vec!["a", "b"]);
    }

    #[test]
    fn test_resolve_filter_subset() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = registry(&built);
        let exporter = registry.resolve(&[], &["b".to_string()]).unwrap();
        assert_eq!(names(&exporter), vec!["b"]);
    }

    #[test]
    fn test_resolve_rejects_unknown_and_disabled() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = registry(&built);
        assert!(matches!(
            registry.resolve(&[], &["nope".to_string()]),
            Err(ConfigError::UnknownCollector(_))
        ));
        assert!(matches!(
            registry.resolve(&[], &["a".to_string(), "c".to_string()]),
            Err(ConfigError::DisabledCollector(ref n)) if n == "c"
        ));
    }

    #[test]
    fn test_instances_are_reused() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = registry(&built);
        registry.resolve(&[], &[]).unwrap();
        registry.resolve(&[], &["a".to_string()]).unwrap();
        registry.resolve(&[], &[]).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disable_defaults_keeps_forced() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut registry = registry(&built);
        registry.set_enabled("c", true).unwrap();
        registry.set_enabled("b", true).unwrap();
        registry.disable_defaults();
        assert!(!registry.is_enabled("a"));
        assert!(registry.is_enabled("b"));
        assert!(registry.is_enabled("c"));
        assert!(registry.is_default_enabled("a"));
        assert!(!registry.is_default_enabled("c"));
        assert!(registry.set_enabled("zzz", true).is_err());
    }

    #[test]
    fn test_construction_failure_is_reported() {
        let mut registry = CollectorRegistry::new();
        registry
            .register("broken", true, Box::new(|_dirs: &[PathBuf]| Err(CollectorError::NoData)))
            .unwrap();
        assert!(matches!(
            registry.resolve(&[], &[]),
            Err(ConfigError::Construction { ref name, .. }) if name == "broken"
        ));
    }
}
