use crate::cli::Args;
use crate::error::Result;
use crate::types::{Config, ProbeHoseError, QueueConfig};
use crate::utils;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Build the run configuration: defaults, then the optional TOML file, then
/// environment overrides, then command-line flags. The result is immutable
/// for the rest of the run and threaded through every constructor.
pub fn from_args(args: &Args) -> Result<Config> {
    let mut config = match args.config_path.as_deref() {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    apply_env_overrides(&mut config);

    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(timeout) = args.timeout {
        if timeout <= 0.0 || !timeout.is_finite() {
            return Err(ProbeHoseError::ConfigError(format!(
                "Invalid timeout: {}",
                timeout
            )));
        }
        config.timeout = Duration::from_secs_f64(timeout);
    }
    if let Some(redirects) = args.redirects {
        config.max_redirects = redirects;
    }
    if let Some(agent) = &args.agent {
        config.user_agent = Some(agent.clone());
    }
    if args.quiet {
        config.quiet = true;
    }
    if args.progress {
        config.progress = true;
    }
    if let Some(output) = &args.output {
        config.output_file = Some(output.clone());
    }
    if let Some(storage) = &args.storage {
        config.storage = Some(storage.clone());
    }
    for (key, value) in utils::parse_extra(&args.extra)? {
        config.extra.insert(key, value);
    }
    if let Some(addr) = &args.beanstalk {
        let mut queue = config.queue.clone().unwrap_or_default();
        let (host, port) = utils::parse_queue_addr(addr, queue.port)?;
        queue.host = host;
        queue.port = port;
        queue.tube_fetch = args.tube_fetch.clone();
        queue.tube_resp = args.tube_resp.clone();
        config.queue = Some(queue);
    }

    validate_config(&config)?;
    Ok(config)
}

pub fn load_config(config_path: &str) -> Result<Config> {
    let mut config = Config::default();

    if Path::new(config_path).exists() {
        let contents = fs::read_to_string(config_path).map_err(|e| {
            ProbeHoseError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let toml_config: toml::Value = toml::from_str(&contents).map_err(|e| {
            ProbeHoseError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        if let Some(table) = toml_config.as_table() {
            if let Some(v) = table.get("concurrency").and_then(|v| v.as_integer()) {
                config.concurrency = v as usize;
            }
            if let Some(v) = table.get("timeout").and_then(as_seconds) {
                config.timeout = Duration::from_secs_f64(v);
            }
            if let Some(v) = table.get("redirects").and_then(|v| v.as_integer()) {
                config.max_redirects = v as usize;
            }
            if let Some(v) = table.get("agent").and_then(|v| v.as_str()) {
                config.user_agent = Some(v.to_string());
            }
            if let Some(v) = table.get("proxy").and_then(|v| v.as_str()) {
                config.proxy = Some(v.to_string());
            }
            if let Some(extra) = table.get("extra").and_then(|v| v.as_table()) {
                for (key, value) in extra {
                    if let Some(value) = value.as_str() {
                        config.extra.insert(key.clone(), value.to_string());
                    }
                }
            }
            if let Some(queue) = table.get("queue").and_then(|v| v.as_table()) {
                let mut queue_config = QueueConfig::default();
                if let Some(v) = queue.get("host").and_then(|v| v.as_str()) {
                    queue_config.host = v.to_string();
                }
                if let Some(v) = queue.get("port").and_then(|v| v.as_integer()) {
                    queue_config.port = v as u16;
                }
                if let Some(v) = queue.get("tube_fetch").and_then(|v| v.as_str()) {
                    queue_config.tube_fetch = v.to_string();
                }
                if let Some(v) = queue.get("tube_resp").and_then(|v| v.as_str()) {
                    queue_config.tube_resp = v.to_string();
                }
                config.queue = Some(queue_config);
            }
        }
    }

    Ok(config)
}

fn as_seconds(value: &toml::Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|v| v as f64))
        .filter(|v| *v > 0.0 && v.is_finite())
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(agent) = env::var("PROBEHOSE_AGENT") {
        config.user_agent = Some(agent);
    }
    if let Ok(proxy) = env::var("PROBEHOSE_PROXY") {
        config.proxy = Some(proxy);
    }
}

fn validate_config(config: &Config) -> Result<()> {
    if config.concurrency == 0 {
        return Err(ProbeHoseError::ConfigError(
            "Concurrency must be greater than 0".to_string(),
        ));
    }
    if config.timeout.is_zero() {
        return Err(ProbeHoseError::ConfigError(
            "Timeout must be greater than 0".to_string(),
        ));
    }
    if config.max_redirects > 30 {
        return Err(ProbeHoseError::ConfigError(
            "Redirect limit is unreasonably high".to_string(),
        ));
    }
    Ok(())
}
