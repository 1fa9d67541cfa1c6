use anyhow::{Context, Result};

/// Largest workbook accepted for import, matching the upload form limit
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

pub const DEFAULT_IMPORT_USER: &str = "Sistema";

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    db_url: Option<String>,
    pub import_user: String,
    pub max_file_bytes: u64,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            db_url: var("DB_URL"),
            import_user: var("IMPORT_USER").unwrap_or_else(|| DEFAULT_IMPORT_USER.to_string()),
            max_file_bytes: match var("MAX_FILE_BYTES") {
                Some(v) => v.parse().context("MAX_FILE_BYTES must be a byte count")?,
                None => DEFAULT_MAX_FILE_BYTES,
            },
            db_max_connections: match var("DB_MAX_CONNECTIONS") {
                Some(v) => v.parse().context("DB_MAX_CONNECTIONS must be a number")?,
                None => DEFAULT_DB_MAX_CONNECTIONS,
            },
        })
    }

    /// Only live imports need the database.
    pub fn db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }
}
