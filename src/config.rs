use std::time::Duration;

use anyhow::{anyhow, Context};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub llm_timeout: Duration,
    /// Workflow-engine webhook (WEBHOOK_URL); notifications are skipped when unset.
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("DB_MAX_CONNECTIONS must be a positive integer"))?,
            None => 5,
        };

        let llm_timeout_secs = match lookup("LLM_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| anyhow!("LLM_TIMEOUT_SECS must be a whole number of seconds"))?,
            None => 30,
        };

        Ok(Self {
            database_url,
            db_max_connections,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            ollama_url: lookup("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            ollama_model: lookup("OLLAMA_MODEL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            webhook_url: lookup("WEBHOOK_URL").filter(|url| !url.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let cfg = config_from(&[("DATABASE_URL", "postgres://localhost/research")]).unwrap();
        assert_eq!(cfg.db_max_connections, 5);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(cfg.ollama_model, DEFAULT_OLLAMA_MODEL);
        assert_eq!(cfg.llm_timeout, Duration::from_secs(30));
        assert!(cfg.webhook_url.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("DATABASE_URL", "  ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config_from(&[
            ("DATABASE_URL", "postgres://localhost/research"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("LLM_TIMEOUT_SECS", "90"),
            ("WEBHOOK_URL", "http://localhost:5678/webhook/research"),
        ])
        .unwrap();
        assert_eq!(cfg.db_max_connections, 12);
        assert_eq!(cfg.llm_timeout, Duration::from_secs(90));
        assert_eq!(
            cfg.webhook_url.as_deref(),
            Some("http://localhost:5678/webhook/research")
        );
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(config_from(&[
            ("DATABASE_URL", "postgres://localhost/research"),
            ("DB_MAX_CONNECTIONS", "0"),
        ])
        .is_err());
        assert!(config_from(&[
            ("DATABASE_URL", "postgres://localhost/research"),
            ("LLM_TIMEOUT_SECS", "soon"),
        ])
        .is_err());
    }
}
