// src/sources/channel.rs
use super::WorkSource;
use crate::channel::JobChannel;
use crate::worker::Worker;
use async_trait::async_trait;
use log::{error, warn};
use std::collections::HashMap;
use std::sync::Arc;

struct CurrentJob {
    id: u64,
    domains: std::vec::IntoIter<String>,
    meta: Option<Arc<HashMap<String, String>>>,
}

/// Unbounded work source draining the job channel. Each reserved job expands
/// into one task per domain; the job is deleted once fully expanded, or
/// buried if expanding a domain fails. Tasks already handed out before a
/// failure stay out: delivery is at-least-once, not exactly-once.
pub struct ChannelSource {
    channel: Arc<JobChannel>,
    names: Arc<Vec<String>>,
    current: Option<CurrentJob>,
}

impl ChannelSource {
    pub fn new(channel: Arc<JobChannel>, names: Arc<Vec<String>>) -> Self {
        Self {
            channel,
            names,
            current: None,
        }
    }
}

#[async_trait]
impl WorkSource for ChannelSource {
    fn total(&self) -> Option<u64> {
        None
    }

    async fn next_task(&mut self) -> Option<Worker> {
        loop {
            if let Some(job) = self.current.as_mut() {
                match job.domains.next() {
                    Some(domain) => {
                        let id = job.id;
                        match Worker::new(domain, self.names.clone(), job.meta.clone()) {
                            Ok(worker) => return Some(worker),
                            Err(e) => {
                                warn!("Job {} failed to expand: {}", id, e);
                                self.current = None;
                                if let Err(e) = self.channel.bury(id).await {
                                    error!("Failed to bury job {}: {}", id, e);
                                }
                            }
                        }
                    }
                    None => {
                        let id = job.id;
                        self.current = None;
                        if let Err(e) = self.channel.delete(id).await {
                            error!("Failed to delete job {}: {}", id, e);
                        }
                    }
                }
                continue;
            }

            match self.channel.get().await {
                Ok((id, domains, extra)) => {
                    self.current = Some(CurrentJob {
                        id,
                        domains: domains.into_iter(),
                        meta: extra.map(Arc::new),
                    });
                }
                Err(e) => {
                    error!("Job channel terminated: {}", e);
                    return None;
                }
            }
        }
    }
}
