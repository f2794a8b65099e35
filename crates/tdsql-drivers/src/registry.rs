//! Driver registry for managing available database drivers

use std::collections::HashMap;
use std::sync::Arc;
use tdsql_core::DatabaseDriver;

/// Alternative names accepted by [`DriverRegistry::get`]
const ALIASES: &[(&str, &str)] = &[("sqlserver", "mssql")];

/// Registry of available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "mssql")]
        registry.register(Arc::new(crate::mssql::MssqlDriver::new()));

        registry
    }

    /// Register a new driver, replacing any driver with the same name
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::info!(driver = %name, "registering database driver");
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name or alias
    ///
    /// Lookup ignores ASCII case, so `"MSSQL"` and `"SqlServer"` both find
    /// the SQL Server driver.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let key = self.resolve(name);
        let driver = self.drivers.get(&key).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a driver is registered under a name or alias
    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(&self.resolve(name))
    }

    fn resolve(&self, name: &str) -> String {
        let lower = name.to_ascii_lowercase();
        if self.drivers.contains_key(&lower) {
            return lower;
        }
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == lower)
            .map(|(_, target)| target.to_string())
            .unwrap_or(lower)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
