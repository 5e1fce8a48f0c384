// src/channel.rs
use crate::queue::{BeanstalkQueue, QueueConn};
use crate::types::{ProbeHoseError, QueueConfig};
use log::warn;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task;

/// The two payload shapes accepted on the fetch tube, decoded once at the
/// queue boundary into the canonical (domains, extra) form. Everything
/// downstream only ever sees the canonical form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JobPayload {
    Domains(Vec<String>),
    Batch {
        domains: Vec<String>,
        #[serde(default)]
        extra: Option<HashMap<String, String>>,
    },
}

pub fn decode_payload(
    body: &[u8],
) -> Result<(Vec<String>, Option<HashMap<String, String>>), ProbeHoseError> {
    let payload: JobPayload = serde_json::from_slice(body)
        .map_err(|e| ProbeHoseError::MalformedJob(e.to_string()))?;
    match payload {
        JobPayload::Domains(domains) => Ok((domains, None)),
        JobPayload::Batch { domains, extra } => Ok((domains, extra)),
    }
}

type SharedConn = Arc<Mutex<Box<dyn QueueConn>>>;

/// Reliable hand-off of work and results across process boundaries. The two
/// logical directions (fetch: source of work, respond: sink for results) ride
/// independent connections so a blocked reserve never delays a put; each
/// direction sits behind its own lock so one logical operation touches a
/// connection at a time. The underlying clients block, so every operation is
/// driven through `spawn_blocking`.
pub struct JobChannel {
    fetch: SharedConn,
    respond: SharedConn,
    reserve_timeout: Duration,
}

impl JobChannel {
    /// Connect both directions to beanstalkd. Any failure here (TCP, watch,
    /// use) is fatal and surfaced to the caller.
    pub fn connect(config: &QueueConfig) -> Result<Self, ProbeHoseError> {
        let mut fetch = BeanstalkQueue::connect(&config.host, config.port)?;
        fetch.watch(&config.tube_fetch)?;
        let mut respond = BeanstalkQueue::connect(&config.host, config.port)?;
        respond.use_tube(&config.tube_resp)?;
        Ok(Self::new(
            Box::new(fetch),
            Box::new(respond),
            config.reserve_timeout,
        ))
    }

    /// Assemble a channel from already-prepared connections. This is how
    /// alternative queue backends (and tests) plug in.
    pub fn new(
        fetch: Box<dyn QueueConn>,
        respond: Box<dyn QueueConn>,
        reserve_timeout: Duration,
    ) -> Self {
        Self {
            fetch: Arc::new(Mutex::new(fetch)),
            respond: Arc::new(Mutex::new(respond)),
            reserve_timeout,
        }
    }

    async fn with_conn<T, F>(conn: &SharedConn, op: F) -> Result<T, ProbeHoseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn QueueConn) -> Result<T, ProbeHoseError> + Send + 'static,
    {
        let conn = conn.clone();
        task::spawn_blocking(move || {
            let mut guard = conn.lock().expect("queue lock poisoned");
            op(&mut **guard)
        })
        .await
        .map_err(|e| ProbeHoseError::QueueCommand(format!("queue worker failed: {}", e)))?
    }

    /// Block until a structurally valid job is reserved. Malformed payloads
    /// are buried and the wait continues; they are never handed to the
    /// caller. Queue errors propagate.
    pub async fn get(
        &self,
    ) -> Result<(u64, Vec<String>, Option<HashMap<String, String>>), ProbeHoseError> {
        loop {
            let timeout = self.reserve_timeout;
            let reserved =
                Self::with_conn(&self.fetch, move |conn| conn.reserve(timeout)).await?;
            let job = match reserved {
                Some(job) => job,
                None => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };
            match decode_payload(&job.body) {
                Ok((domains, extra)) => return Ok((job.id, domains, extra)),
                Err(e) => {
                    warn!("Burying malformed job {}: {}", job.id, e);
                    self.bury(job.id).await?;
                }
            }
        }
    }

    pub async fn delete(&self, id: u64) -> Result<(), ProbeHoseError> {
        Self::with_conn(&self.fetch, move |conn| conn.delete(id)).await
    }

    pub async fn bury(&self, id: u64) -> Result<(), ProbeHoseError> {
        Self::with_conn(&self.fetch, move |conn| conn.bury(id)).await
    }

    /// Publish one serialized result record on the respond tube.
    pub async fn put(&self, line: &str) -> Result<u64, ProbeHoseError> {
        let body = line.as_bytes().to_vec();
        Self::with_conn(&self.respond, move |conn| conn.put(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;

    fn channel_over(fetch: &MemoryQueue, respond: &MemoryQueue) -> JobChannel {
        JobChannel::new(
            Box::new(fetch.clone()),
            Box::new(respond.clone()),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_decode_array_payload() {
        let (domains, extra) = decode_payload(br#"["a.com", "b.com"]"#).unwrap();
        assert_eq!(domains, vec!["a.com", "b.com"]);
        assert!(extra.is_none());
    }

    #[test]
    fn test_decode_batch_payload() {
        let (domains, extra) =
            decode_payload(br#"{"domains": ["a.com"], "extra": {"campaign": "x"}}"#).unwrap();
        assert_eq!(domains, vec!["a.com"]);
        assert_eq!(extra.unwrap().get("campaign").unwrap(), "x");

        let (domains, extra) = decode_payload(br#"{"domains": []}"#).unwrap();
        assert!(domains.is_empty());
        assert!(extra.is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        let malformed: &[&[u8]] = &[
            br#""not a list or object""#,
            br#"42"#,
            br#"{"no_domains": true}"#,
            br#"{"domains": "a.com"}"#,
            br#"{"domains": [1, 2]}"#,
            br#"{"domains": ["a.com"], "extra": "nope"}"#,
            br#"{"domains": ["a.com"], "extra": {"k": 1}}"#,
            b"not json at all",
        ];
        for body in malformed {
            assert!(
                matches!(decode_payload(body), Err(ProbeHoseError::MalformedJob(_))),
                "payload accepted: {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[tokio::test]
    async fn test_get_returns_valid_job() {
        let fetch = MemoryQueue::new();
        let respond = MemoryQueue::new();
        let id = fetch.push_job(br#"{"domains": ["a.com"], "extra": {"campaign": "x"}}"#);

        let channel = channel_over(&fetch, &respond);
        let (job_id, domains, extra) = channel.get().await.unwrap();
        assert_eq!(job_id, id);
        assert_eq!(domains, vec!["a.com"]);
        assert_eq!(extra.unwrap().get("campaign").unwrap(), "x");
    }

    #[tokio::test]
    async fn test_get_buries_malformed_and_continues() {
        let fetch = MemoryQueue::new();
        let respond = MemoryQueue::new();
        let bad = fetch.push_job(br#""not a list or object""#);
        let good = fetch.push_job(br#"["ok.com"]"#);

        let channel = channel_over(&fetch, &respond);
        let (job_id, domains, _) = channel.get().await.unwrap();
        assert_eq!(job_id, good);
        assert_eq!(domains, vec!["ok.com"]);
        assert_eq!(fetch.buried(), vec![bad]);
        assert!(fetch.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_get_propagates_queue_errors() {
        let fetch = MemoryQueue::new();
        fetch.close();
        let channel = channel_over(&fetch, &MemoryQueue::new());
        assert!(matches!(
            channel.get().await,
            Err(ProbeHoseError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_put_lands_on_respond_direction() {
        let fetch = MemoryQueue::new();
        let respond = MemoryQueue::new();
        let channel = channel_over(&fetch, &respond);

        channel.put(r#"{"url":"http://a.com/admin","sc":200}"#).await.unwrap();
        let puts = respond.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0], br#"{"url":"http://a.com/admin","sc":200}"#);
        assert!(fetch.puts().is_empty());
    }
}
