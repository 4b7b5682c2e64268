use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

const DEFAULT_CONFIG_FILE: &str = "config";
const ENV_PREFIX: &str = "FLASHGEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ollama: OllamaSettings,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaSettings {
    pub model: String,
    pub url: String,
    /// Per-file deadline for one generation call.
    pub timeout_secs: u64,
}

impl OllamaSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Settings {
    /// Defaults, then `config.{yaml,toml,json}` in the working directory (or
    /// the explicit `file`), then `FLASHGEN_*` environment variables, e.g.
    /// `FLASHGEN_OLLAMA__MODEL=mistral`.
    pub fn load(file: Option<&Path>) -> Result<Settings> {
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__");
        Self::build(file, env)
    }

    fn build(file: Option<&Path>, env: Environment) -> Result<Settings> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .set_default("ollama.model", "llama3")?
            .set_default("ollama.url", "http://localhost:11434/api/generate")?
            .set_default("ollama.timeout_secs", 300i64)?
            .set_default("database.path", "flashcards.db")?
            .add_source(file_source)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
