//! Environment-driven settings for the pipeline binaries.

use crate::error::{NlqError, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub run_log_path: Option<PathBuf>,
}

impl Settings {
    /// Read settings from the environment. `DATABASE_URL` is required,
    /// everything else has a default.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| NlqError::Config("DATABASE_URL is not set".to_string()))?;
        let ollama_base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let ollama_model = std::env::var("OLLAMA_MODEL")
            .unwrap_or_else(|_| "llama3.1".to_string());
        let run_log_path = std::env::var("NLQ_RUN_LOG").ok().map(PathBuf::from);

        Ok(Self {
            database_url,
            ollama_base_url,
            ollama_model,
            run_log_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_require_database_url() {
        std::env::remove_var("DATABASE_URL");
        assert!(Settings::from_env().is_err());

        std::env::set_var("DATABASE_URL", "postgres://localhost/app");
        std::env::remove_var("OLLAMA_BASE_URL");
        std::env::remove_var("OLLAMA_MODEL");
        std::env::remove_var("NLQ_RUN_LOG");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.database_url, "postgres://localhost/app");
        assert_eq!(settings.ollama_base_url, "http://localhost:11434");
        assert_eq!(settings.ollama_model, "llama3.1");
        assert!(settings.run_log_path.is_none());
    }
}
