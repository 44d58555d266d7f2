use crate::config::AppConfig;
use std::sync::Arc;
use wirekit::ConfigProvider;

/// [`ConfigProvider`] over the loaded [`AppConfig`] module bag.
#[derive(Debug, Clone)]
pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn from_arc(config: Arc<AppConfig>) -> Self {
        Self(config)
    }

    pub fn inner(&self) -> &AppConfig {
        &self.0
    }

    /// A global section serialized to JSON (`server` or `logging`).
    pub fn get_config_raw(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "server" => serde_json::to_value(&self.0.server).ok(),
            "logging" => self
                .0
                .logging
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            _ => None,
        }
    }
}

impl ConfigProvider for AppConfigProvider {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.modules.get(module_name)
    }
}
