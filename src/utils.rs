// src/utils.rs
use crate::error::Result;
use crate::types::ProbeHoseError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Parse candidate path names from newline-delimited text. Lines are
/// trimmed; blank lines and `#` comments are skipped. Order is preserved,
/// it defines the probe order for every domain.
pub fn parse_names(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect()
}

/// Load candidate path names from a file.
pub fn load_names(path: &Path) -> Result<Vec<String>> {
    let mut text = String::new();
    File::open(path)?.read_to_string(&mut text)?;
    Ok(parse_names(&text))
}

/// Load target domains from a file, one per line, skipping blanks.
pub fn load_domains(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut domains = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            domains.push(line.to_string());
        }
    }
    Ok(domains)
}

/// Normalize a domain into a probe base URL: trailing slashes stripped,
/// `http://` prefixed when no scheme is present.
pub fn normalize_domain(domain: &str) -> String {
    let base = domain.trim().trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        base.to_string()
    } else {
        format!("http://{}", base)
    }
}

/// Parse repeated `KEY=VALUE` arguments into a map.
pub fn parse_extra(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut extra = HashMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) => {
                extra.insert(key.to_string(), value.to_string());
            }
            None => {
                return Err(ProbeHoseError::ConfigError(format!(
                    "Invalid extra variable (expected KEY=VALUE): {}",
                    pair
                )));
            }
        }
    }
    Ok(extra)
}

/// Split a `HOST[:PORT]` queue address, falling back to the default port.
pub fn parse_queue_addr(addr: &str, default_port: u16) -> Result<(String, u16)> {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|e| {
                ProbeHoseError::ConfigError(format!("Invalid queue port in {}: {}", addr, e))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((addr.to_string(), default_port)),
    }
}
