// src/session.rs
use crate::types::{Config, ProbeHoseError};
use log::debug;
use rand::seq::SliceRandom;
use reqwest::header::{LOCATION, USER_AGENT};
use reqwest::{redirect, Client, Proxy};
use std::time::Duration;
use url::Url;

/// Realistic browser user-agents, one picked at random per probe task when no
/// explicit agent is configured. Keeps a single fixed fingerprint from being
/// trivially filtered by a target.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0",
];

#[derive(Clone)]
pub struct Session {
    client: Client,
    max_redirects: usize,
    user_agent: Option<String>,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self, ProbeHoseError> {
        // Redirects are followed manually in fetch() so the hop history can
        // be captured; certificate verification stays off because
        // enumeration targets are frequently self-signed or misconfigured.
        let mut client_builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .gzip(true)
            .deflate(true);

        if let Some(proxy_url) = &config.proxy {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| ProbeHoseError::ConfigError(format!("Invalid proxy URL: {}", e)))?;
            client_builder = client_builder.proxy(proxy);
        }

        let client = client_builder.build().map_err(|e| {
            ProbeHoseError::ConfigError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Session {
            client,
            max_redirects: config.max_redirects,
            user_agent: config.user_agent.clone(),
        })
    }

    /// The user-agent for one probe task: the configured value, or a random
    /// pick from the pool.
    pub fn pick_agent(&self) -> String {
        match &self.user_agent {
            Some(agent) => agent.clone(),
            None => USER_AGENTS
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(USER_AGENTS[0])
                .to_string(),
        }
    }

    /// GET `url`, following up to `max_redirects` Location hops by hand and
    /// recording each as `(status, url)`. The returned response body has not
    /// been read; callers stream it only if they need it.
    pub async fn fetch(
        &self,
        url: &str,
        user_agent: &str,
    ) -> Result<ProbeResponse, ProbeHoseError> {
        let mut current = Url::parse(url)
            .map_err(|e| ProbeHoseError::InvalidUrl(format!("{}: {}", url, e)))?;
        let mut history: Vec<(u16, String)> = Vec::new();

        loop {
            let response = self
                .client
                .get(current.clone())
                .header(USER_AGENT, user_agent)
                .send()
                .await?;

            let status = response.status();
            if !status.is_redirection() {
                return Ok(ProbeResponse {
                    requested: url.to_string(),
                    history,
                    response,
                });
            }

            if history.len() >= self.max_redirects {
                return Err(ProbeHoseError::TooManyRedirects(url.to_string()));
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());
            let location = match location {
                Some(location) => location,
                // Redirect status without a Location header: nowhere to go,
                // treat it as the final response.
                None => {
                    return Ok(ProbeResponse {
                        requested: url.to_string(),
                        history,
                        response,
                    });
                }
            };

            let next = current.join(&location).map_err(|e| {
                ProbeHoseError::InvalidUrl(format!("{}: {}", location, e))
            })?;
            debug!("{} redirects to {}", current, next);
            history.push((status.as_u16(), current.to_string()));
            current = next;
        }
    }
}

/// The outcome of one probe: final response plus the redirect trail that led
/// to it. Metadata accessors leave the body unread; `into_inner` hands the
/// response over for streaming.
pub struct ProbeResponse {
    requested: String,
    history: Vec<(u16, String)>,
    response: reqwest::Response,
}

impl ProbeResponse {
    pub fn requested_url(&self) -> &str {
        &self.requested
    }

    pub fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    pub fn final_url(&self) -> String {
        self.response.url().to_string()
    }

    pub fn history(&self) -> &[(u16, String)] {
        &self.history
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    }

    pub fn header_names(&self) -> Vec<String> {
        self.response
            .headers()
            .keys()
            .map(|k| k.as_str().to_string())
            .collect()
    }

    pub fn cookie_names(&self) -> Vec<String> {
        self.response
            .cookies()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn into_inner(self) -> reqwest::Response {
        self.response
    }
}
