// src/output.rs
use crate::channel::JobChannel;
use crate::hash::fingerprint;
use crate::session::ProbeResponse;
use crate::types::{Config, HitRecord, ProbeHoseError};
use futures::StreamExt;
use log::error;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Length of the content-hash prefix used for record ids and storage paths.
const ID_LEN: usize = 12;

/// Fans every hit out to up to three independent destinations: stdout, a
/// JSON-lines output file and the job channel's respond tube. One failing
/// destination is reported and never suppresses the others.
pub struct ResultSink {
    quiet: bool,
    storage: Option<PathBuf>,
    extra: HashMap<String, String>,
    output: Option<Mutex<tokio::fs::File>>,
    channel: Option<Arc<JobChannel>>,
    hits: AtomicU64,
}

impl ResultSink {
    pub fn new(
        config: &Config,
        channel: Option<Arc<JobChannel>>,
    ) -> Result<Self, ProbeHoseError> {
        let output = match &config.output_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let file = std::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(path)
                    .map_err(|e| {
                        ProbeHoseError::OutputError(format!(
                            "Failed to open {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                Some(Mutex::new(tokio::fs::File::from_std(file)))
            }
            None => None,
        };

        Ok(Self {
            quiet: config.quiet,
            storage: config.storage.clone(),
            extra: config.extra.clone(),
            output,
            channel,
            hits: AtomicU64::new(0),
        })
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Turn one hit into a serialized record and emit it. Per-job metadata is
    /// merged over the base record, then the body is persisted (when storage
    /// is configured) and the id attached, then the run-wide extra metadata
    /// is merged on top. Metadata keys may shadow base keys.
    pub async fn report(
        &self,
        requested_url: &str,
        resp: ProbeResponse,
        job_meta: Option<&HashMap<String, String>>,
    ) {
        let record = build_record(&resp);
        let mut doc = match serde_json::to_value(&record) {
            Ok(Value::Object(map)) => map,
            _ => {
                error!("Failed to serialize record for {}", requested_url);
                return;
            }
        };

        if let Some(meta) = job_meta {
            for (key, value) in meta {
                doc.insert(key.clone(), Value::String(value.clone()));
            }
        }

        if let Some(root) = self.storage.clone() {
            match persist_body(&root, &record, resp).await {
                Ok(id) => {
                    doc.insert("id".to_string(), Value::String(id));
                }
                Err(e) => {
                    // Degrade to a record without an id rather than dropping
                    // the hit.
                    error!("Failed to store body for {}: {}", record.url, e);
                }
            }
        }

        for (key, value) in &self.extra {
            doc.insert(key.clone(), Value::String(value.clone()));
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        self.emit(&Value::Object(doc).to_string()).await;
    }

    async fn emit(&self, line: &str) {
        if !self.quiet {
            println!("{}", line);
        }

        if let Some(output) = &self.output {
            let mut file = output.lock().await;
            let result = async {
                file.write_all(line.as_bytes()).await?;
                file.write_all(b"\n").await?;
                file.flush().await
            }
            .await;
            if let Err(e) = result {
                error!("Failed to write output file: {}", e);
            }
        }

        if let Some(channel) = &self.channel {
            if let Err(e) = channel.put(line).await {
                error!("Failed to publish record: {}", e);
            }
        }
    }
}

fn build_record(resp: &ProbeResponse) -> HitRecord {
    let mut hd = BTreeMap::new();
    for (key, name) in [
        ("lm", "last-modified"),
        ("ct", "content-type"),
        ("cl", "content-length"),
        ("sv", "server"),
    ] {
        if let Some(value) = resp.header(name) {
            hd.insert(key.to_string(), value);
        }
    }

    HitRecord {
        url: resp.final_url(),
        hist: resp.history().to_vec(),
        sc: resp.status(),
        hds: resp.header_names(),
        cks: resp.cookie_names(),
        hd,
        id: None,
    }
}

/// Stream the response body into content-addressed storage and return the
/// record id: a 12-character prefix of the fingerprint over the response's
/// identifying metadata, laid out as `<root>/<hash[1]>/<hash[1..]>` so one
/// directory never accumulates every blob.
async fn persist_body(
    root: &Path,
    record: &HitRecord,
    resp: ProbeResponse,
) -> Result<String, ProbeHoseError> {
    let status = record.sc.to_string();
    let date = resp.header("date");
    let mut digest = fingerprint([
        record.url.as_str(),
        status.as_str(),
        record.hd.get("lm").map(String::as_str).unwrap_or(""),
        date.as_deref().unwrap_or(""),
        record.hd.get("cl").map(String::as_str).unwrap_or(""),
    ]);
    digest.truncate(ID_LEN);

    let dir = root.join(&digest[1..2]);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ProbeHoseError::StorageError(format!("{}: {}", dir.display(), e)))?;
    let path = dir.join(&digest[1..]);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| ProbeHoseError::StorageError(format!("{}: {}", path.display(), e)))?;

    let mut stream = resp.into_inner().bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| ProbeHoseError::StorageError(format!("{}: {}", record.url, e)))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ProbeHoseError::StorageError(format!("{}: {}", path.display(), e)))?;
    }
    file.flush()
        .await
        .map_err(|e| ProbeHoseError::StorageError(format!("{}: {}", path.display(), e)))?;

    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::session::Session;
    use crate::types::QueueConfig;

    async fn fetch_from(server: &mockito::ServerGuard, path: &str) -> ProbeResponse {
        let session = Session::new(&Config::default()).unwrap();
        session
            .fetch(&format!("{}{}", server.url(), path), "test-agent")
            .await
            .unwrap()
    }

    fn read_records(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_record_fields_and_metadata_merge() {
        let mut server = mockito::Server::new_async().await;
        let _m1 = server
            .mock("GET", "/admin")
            .with_status(200)
            .with_header("server", "nginx")
            .with_header("content-type", "text/html")
            .with_header("set-cookie", "sid=abc; Path=/")
            .with_body("hello")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hits.json");
        let mut extra = HashMap::new();
        extra.insert("src".to_string(), "global".to_string());
        let config = Config {
            quiet: true,
            output_file: Some(out.clone()),
            extra,
            ..Config::default()
        };
        let sink = ResultSink::new(&config, None).unwrap();

        let mut job_meta = HashMap::new();
        job_meta.insert("campaign".to_string(), "x".to_string());
        job_meta.insert("src".to_string(), "job".to_string());

        let resp = fetch_from(&server, "/admin").await;
        let requested = format!("{}/admin", server.url());
        sink.report(&requested, resp, Some(&job_meta)).await;

        let records = read_records(&out);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record["url"].as_str().unwrap().ends_with("/admin"));
        assert_eq!(record["sc"], 200);
        assert_eq!(record["hd"]["sv"], "nginx");
        assert_eq!(record["hd"]["ct"], "text/html");
        assert!(record["hds"]
            .as_array()
            .unwrap()
            .iter()
            .any(|h| h == "server"));
        assert!(record["cks"].as_array().unwrap().iter().any(|c| c == "sid"));
        assert_eq!(record["campaign"], "x");
        // Run-wide extra metadata wins over per-job metadata.
        assert_eq!(record["src"], "global");
        assert_eq!(sink.hits(), 1);
    }

    #[tokio::test]
    async fn test_storage_is_content_addressed_and_idempotent() {
        let mut server = mockito::Server::new_async().await;
        let _m2 = server
            .mock("GET", "/admin")
            .with_status(200)
            .with_header("last-modified", "Tue, 01 Jul 2025 10:00:00 GMT")
            .with_header("date", "Tue, 01 Jul 2025 10:00:01 GMT")
            .with_body("file body")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hits.json");
        let storage = dir.path().join("blobs");
        let config = Config {
            quiet: true,
            output_file: Some(out.clone()),
            storage: Some(storage.clone()),
            ..Config::default()
        };
        let sink = ResultSink::new(&config, None).unwrap();
        let requested = format!("{}/admin", server.url());

        let resp = fetch_from(&server, "/admin").await;
        sink.report(&requested, resp, None).await;
        let resp = fetch_from(&server, "/admin").await;
        sink.report(&requested, resp, None).await;

        let records = read_records(&out);
        assert_eq!(records.len(), 2);
        let id = records[0]["id"].as_str().unwrap();
        assert_eq!(id.len(), ID_LEN);
        assert_eq!(records[1]["id"].as_str().unwrap(), id);

        let blob = storage.join(&id[1..2]).join(&id[1..]);
        assert_eq!(std::fs::read_to_string(blob).unwrap(), "file body");
    }

    #[tokio::test]
    async fn test_storage_failure_degrades_to_record_without_id() {
        let mut server = mockito::Server::new_async().await;
        let _m3 = server
            .mock("GET", "/admin")
            .with_status(200)
            .with_body("body")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hits.json");
        // A file where the storage root should be makes every write fail.
        let storage = dir.path().join("blobs");
        std::fs::write(&storage, b"occupied").unwrap();
        let config = Config {
            quiet: true,
            output_file: Some(out.clone()),
            storage: Some(storage),
            ..Config::default()
        };
        let sink = ResultSink::new(&config, None).unwrap();

        let requested = format!("{}/admin", server.url());
        let resp = fetch_from(&server, "/admin").await;
        sink.report(&requested, resp, None).await;

        let records = read_records(&out);
        assert_eq!(records.len(), 1);
        assert!(records[0].get("id").is_none());
    }

    #[tokio::test]
    async fn test_records_publish_to_respond_tube() {
        let mut server = mockito::Server::new_async().await;
        let _m4 = server
            .mock("GET", "/admin")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let respond = MemoryQueue::new();
        let channel = JobChannel::new(
            Box::new(MemoryQueue::new()),
            Box::new(respond.clone()),
            QueueConfig::default().reserve_timeout,
        );
        let config = Config {
            quiet: true,
            ..Config::default()
        };
        let sink = ResultSink::new(&config, Some(Arc::new(channel))).unwrap();

        let requested = format!("{}/admin", server.url());
        let resp = fetch_from(&server, "/admin").await;
        sink.report(&requested, resp, None).await;

        let puts = respond.puts();
        assert_eq!(puts.len(), 1);
        let record: Value = serde_json::from_slice(&puts[0]).unwrap();
        assert_eq!(record["sc"], 200);
        assert!(!puts[0].contains(&b'\n'));
    }
}
