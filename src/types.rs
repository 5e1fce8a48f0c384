// src/types.rs
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub quiet: bool,
    pub progress: bool,
    pub output_file: Option<PathBuf>,
    pub storage: Option<PathBuf>,
    pub extra: HashMap<String, String>,
    pub queue: Option<QueueConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 20,
            timeout: Duration::from_millis(1500),
            max_redirects: 4,
            user_agent: None,
            proxy: None,
            quiet: false,
            progress: false,
            output_file: None,
            storage: None,
            extra: HashMap::new(),
            queue: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub tube_fetch: String,
    pub tube_resp: String,
    pub reserve_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 14711,
            tube_fetch: "probehose_jobs".to_string(),
            tube_resp: "probehose_resp".to_string(),
            reserve_timeout: Duration::from_secs(2),
        }
    }
}

/// One confirmed hit, in the shape published to the respond tube and the
/// output file. Merged job/global metadata keys are added on top of this
/// at serialization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitRecord {
    pub url: String,
    pub hist: Vec<(u16, String)>,
    pub sc: u16,
    pub hds: Vec<String>,
    pub cks: Vec<String>,
    pub hd: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunStats {
    pub completed: u64,
    pub hits: u64,
    pub duration: Duration,
}

#[derive(Debug, Error)]
pub enum ProbeHoseError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Too many redirects for {0}")]
    TooManyRedirects(String),

    #[error("Queue connection failed: {0}")]
    QueueConnect(String),

    #[error("Queue command failed: {0}")]
    QueueCommand(String),

    #[error("Queue connection closed")]
    QueueClosed,

    #[error("Malformed job payload: {0}")]
    MalformedJob(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Output error: {0}")]
    OutputError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
