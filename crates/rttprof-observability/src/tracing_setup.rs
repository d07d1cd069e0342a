//! Tracing / logging initialisation helpers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: component_name → level
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
    /// Let `RUST_LOG` replace the directives built from this config
    #[serde(default = "default_env_override")]
    pub env_override: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_env_override() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: BTreeMap::new(),
            json: false,
            env_override: default_env_override(),
        }
    }
}

impl LogConfig {
    /// Raise one component to `level`.
    pub fn with_component(mut self, component: &str, level: &str) -> Self {
        self.components.insert(component.to_string(), level.to_string());
        self
    }

    /// Filter directives, e.g. `"info,rttprof_stream=debug"`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (component, level) in &self.components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }

    fn filter(&self) -> EnvFilter {
        if self.env_override {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::try_new(self.directives()).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialise tracing with the given log config.
/// Should be called once at application startup; later calls are ignored.
pub fn init_tracing(config: &LogConfig) {
    let filter = config.filter();

    let result = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}
