use anyhow::{bail, Result};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub api_keys: Vec<String>,
}

/// Which storage backend to connect to.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Sqlite { path: String },
    MySql(MySqlParams),
}

#[derive(Debug, Clone)]
pub struct MySqlParams {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub schema: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let backend =
            std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let storage = match backend.as_str() {
            "sqlite" => StorageConfig::Sqlite {
                path: std::env::var("DATABASE_PATH")
                    .unwrap_or_else(|_| "./tubescope.db".to_string()),
            },
            "mysql" => StorageConfig::MySql(MySqlParams {
                host: std::env::var("MYSQL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                user: std::env::var("MYSQL_USER").unwrap_or_else(|_| "root".to_string()),
                password: std::env::var("MYSQL_PASSWORD").unwrap_or_default(),
                port: std::env::var("MYSQL_PORT")
                    .unwrap_or_else(|_| "3306".to_string())
                    .parse()
                    .unwrap_or(3306),
                schema: std::env::var("MYSQL_SCHEMA")
                    .unwrap_or_else(|_| "tubescope".to_string()),
            }),
            other => bail!("unsupported STORAGE_BACKEND {other:?} (expected sqlite or mysql)"),
        };

        // Ordered credential pool; endpoints fall back key by key.
        let api_keys = std::env::var("YOUTUBE_API_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self { storage, api_keys })
    }
}
