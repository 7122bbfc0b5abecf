use std::env;

use thiserror::Error;

const DEFAULT_GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    GitHub(GitHubConfig),
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub admin_key: String,
    pub public_base_url: String,
    pub storage: StorageConfig,
}

impl Config {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match var("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => 8080,
        };

        let admin_key = required("ADMIN_KEY")?;

        let public_base_url = var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{host}:{port}"))
            .trim_end_matches('/')
            .to_string();

        let storage = match var("STORAGE_BACKEND").as_deref().unwrap_or("github") {
            "github" => StorageConfig::GitHub(GitHubConfig {
                token: required("GITHUB_TOKEN")?,
                owner: required("GITHUB_OWNER")?,
                repo: required("GITHUB_REPO")?,
                branch: var("GITHUB_BRANCH"),
                api_url: var("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_GITHUB_API.to_string()),
            }),
            "memory" => StorageConfig::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    reason: format!("unknown backend `{other}` (expected github or memory)"),
                })
            }
        };

        Ok(Self {
            host,
            port,
            admin_key,
            public_base_url,
            storage,
        })
    }
}
