use crate::{Permission, Plugin, PluginError, PluginOutput};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of the tools offered to the model.
///
/// Plugins are keyed by name; iteration is in name order so the function
/// declarations sent with every request are stable.
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
    granted_permissions: Permission,
}

impl PluginRegistry {
    pub fn new(granted_permissions: Permission) -> Self {
        Self {
            plugins: BTreeMap::new(),
            granted_permissions,
        }
    }

    /// Register a plugin if permissions allow.
    /// Returns true if the plugin was registered, false if denied by permissions.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> bool {
        let required = plugin.required_permission();

        if !self.granted_permissions.allows(&required) {
            return false;
        }

        self.plugins.insert(plugin.name().to_string(), plugin);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.get(name)
    }

    pub fn all(&self) -> Vec<&Arc<dyn Plugin>> {
        self.plugins.values().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Execute a plugin by name.
    pub async fn execute(&self, name: &str, input: Value) -> Result<PluginOutput, PluginError> {
        let plugin = self
            .get(name)
            .ok_or_else(|| PluginError::UnknownTool(name.to_string()))?;

        plugin.execute(input).await
    }
}
