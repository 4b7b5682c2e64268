use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::db::Store;
use crate::generate::{Generate, OllamaClient};

/// Handles shared by every command, built once in `main`.
pub struct AppContext {
    pub settings: Settings,
    pub store: Store,
}

impl AppContext {
    /// Load settings and open the store. Failing to open the store is fatal.
    pub fn new(config: Option<&Path>, db_override: Option<&Path>) -> Result<Self> {
        let mut settings = Settings::load(config).context("Failed to load configuration")?;
        if let Some(db) = db_override {
            settings.database.path = db.to_path_buf();
        }
        let store = Store::open(&settings.database.path).with_context(|| {
            format!("Failed to open database {}", settings.database.path.display())
        })?;
        Ok(Self { settings, store })
    }

    /// Generation client for `model`, or the configured default.
    pub fn generator(&self, model: Option<&str>) -> Arc<dyn Generate> {
        let model = model.unwrap_or(&self.settings.ollama.model);
        Arc::new(OllamaClient::new(self.settings.ollama.url.clone(), model))
    }
}
