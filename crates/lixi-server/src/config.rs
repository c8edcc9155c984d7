use std::path::PathBuf;

use anyhow::{Context, Result};

/// Process configuration, read from `LIXI_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_path: PathBuf,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("LIXI_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("LIXI_PORT")
            .or_else(|| lookup("PORT"))
            .unwrap_or_else(|| "8080".into());
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid port {port:?}"))?;
        let data_path = lookup("LIXI_DATA_PATH")
            .unwrap_or_else(|| "envelopes.json".into())
            .into();
        let static_dir = lookup("LIXI_STATIC_DIR")
            .unwrap_or_else(|| "public".into())
            .into();

        Ok(Self {
            host,
            port,
            data_path,
            static_dir,
        })
    }
}
