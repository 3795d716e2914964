//! Daemon configuration: TOML file overlaid with command-line flags

use crate::cli::DaemonOpts;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// host:port to listen on
    pub bind: String,
    /// The one directory clients can list, download from and upload to
    pub root: PathBuf,
    /// "username password" records
    pub credentials: PathBuf,
    /// Session log destination; stderr when unset
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:12345".to_string(),
            root: PathBuf::from("filedir"),
            credentials: PathBuf::from("access.txt"),
            log_file: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Config file (if any) first, then explicit flags on top
    pub fn from_opts(opts: &DaemonOpts) -> Result<Self> {
        let mut cfg = match opts.config {
            Some(ref p) => Self::load(p)?,
            None => Self::default(),
        };
        if let Some(port) = opts.port {
            cfg.bind = format!("0.0.0.0:{}", port);
        }
        if let Some(ref bind) = opts.bind {
            cfg.bind = bind.clone();
        }
        if let Some(ref root) = opts.root {
            cfg.root = root.clone();
        }
        if let Some(ref creds) = opts.credentials {
            cfg.credentials = creds.clone();
        }
        if opts.log_file.is_some() {
            cfg.log_file = opts.log_file.clone();
        }
        Ok(cfg)
    }
}
