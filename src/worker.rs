// src/worker.rs
use crate::output::ResultSink;
use crate::session::Session;
use crate::types::ProbeHoseError;
use crate::utils::normalize_domain;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// A response counts as a hit iff it succeeded outright and the requested
/// name survived into the final URL. Servers that soft-404 by redirecting
/// every unknown path to a catch-all page fail the second test.
pub fn is_hit(status: u16, final_url: &str, name: &str) -> bool {
    (200..300).contains(&status) && final_url.contains(name)
}

/// One probe task: a single domain crossed with the shared ordered name
/// list, plus the metadata of the job it came from. Consumed exactly once
/// by the execution engine.
pub struct Worker {
    domain: String,
    names: Arc<Vec<String>>,
    meta: Option<Arc<HashMap<String, String>>>,
}

impl Worker {
    pub fn new(
        domain: String,
        names: Arc<Vec<String>>,
        meta: Option<Arc<HashMap<String, String>>>,
    ) -> Result<Self, ProbeHoseError> {
        if domain.trim().is_empty() {
            return Err(ProbeHoseError::InvalidDomain(domain));
        }
        Ok(Self {
            domain,
            names,
            meta,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn metadata(&self) -> Option<&HashMap<String, String>> {
        self.meta.as_deref()
    }

    /// Probe every name in list order against this worker's domain. Request
    /// failures are a "no" for that single name, never fatal to the task.
    pub async fn run(self, session: &Session, sink: &ResultSink) {
        let base = normalize_domain(&self.domain);
        let agent = session.pick_agent();
        for name in self.names.iter() {
            let url = format!("{}/{}", base, name);
            match session.fetch(&url, &agent).await {
                Ok(resp) => {
                    if is_hit(resp.status(), &resp.final_url(), name) {
                        sink.report(&url, resp, self.meta.as_deref()).await;
                    }
                }
                Err(e) => {
                    debug!("{}: {}", url, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Config;

    #[test]
    fn test_hit_heuristic() {
        // Redirect statuses never hit, even with the name present.
        assert!(!is_hit(301, "http://x.com/admin", "admin"));
        assert!(!is_hit(302, "http://x.com/admin", "admin"));
        // Success without the requested name in the final URL is a soft-404.
        assert!(!is_hit(200, "http://x.com/landing", "admin"));
        // Any 2xx with the name surviving counts.
        assert!(is_hit(200, "http://x.com/admin", "admin"));
        assert!(is_hit(204, "http://x.com/admin", "admin"));
        assert!(!is_hit(300, "http://x.com/admin", "admin"));
        assert!(!is_hit(404, "http://x.com/admin", "admin"));
    }

    #[test]
    fn test_worker_rejects_blank_domain() {
        let names = Arc::new(vec!["admin".to_string()]);
        assert!(matches!(
            Worker::new("   ".to_string(), names.clone(), None),
            Err(ProbeHoseError::InvalidDomain(_))
        ));
        assert!(Worker::new("example.com".to_string(), names, None).is_ok());
    }

    async fn run_against(server: &mockito::ServerGuard, names: &[&str]) -> Vec<serde_json::Value> {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hits.json");
        let config = Config {
            quiet: true,
            output_file: Some(out.clone()),
            ..Config::default()
        };
        let session = Session::new(&config).unwrap();
        let sink = ResultSink::new(&config, None).unwrap();
        let names = Arc::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>());

        let worker = Worker::new(server.url(), names, None).unwrap();
        worker.run(&session, &sink).await;

        std::fs::read_to_string(&out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_worker_reports_only_hits() {
        let mut server = mockito::Server::new_async().await;
        let _m1 = server
            .mock("GET", "/admin")
            .with_status(200)
            .with_header("server", "nginx")
            .with_body("secret")
            .create_async()
            .await;
        let _m2 = server
            .mock("GET", "/backup")
            .with_status(404)
            .create_async()
            .await;

        let records = run_against(&server, &["admin", "backup"]).await;
        assert_eq!(records.len(), 1);
        assert!(records[0]["url"].as_str().unwrap().ends_with("/admin"));
        assert_eq!(records[0]["sc"], 200);
    }

    #[tokio::test]
    async fn test_worker_ignores_soft_404_redirect() {
        let mut server = mockito::Server::new_async().await;
        let _m3 = server
            .mock("GET", "/admin")
            .with_status(302)
            .with_header("location", "/landing")
            .create_async()
            .await;
        let _m4 = server
            .mock("GET", "/landing")
            .with_status(200)
            .with_body("welcome")
            .create_async()
            .await;

        let records = run_against(&server, &["admin"]).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_worker_survives_unreachable_target() {
        // Nothing listens here; every probe errs and the task still ends.
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hits.json");
        let config = Config {
            quiet: true,
            output_file: Some(out.clone()),
            timeout: std::time::Duration::from_millis(200),
            ..Config::default()
        };
        let session = Session::new(&config).unwrap();
        let sink = ResultSink::new(&config, None).unwrap();
        let names = Arc::new(vec!["admin".to_string(), "backup".to_string()]);

        let worker = Worker::new("127.0.0.1:1".to_string(), names, None).unwrap();
        worker.run(&session, &sink).await;

        assert!(std::fs::read_to_string(&out).unwrap().is_empty());
    }
}
