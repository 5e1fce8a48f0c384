// src/sources/list.rs
use super::WorkSource;
use crate::worker::Worker;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

/// Finite work source: a static domain list crossed with the shared name
/// list, one task per domain.
pub struct ListSource {
    domains: std::vec::IntoIter<String>,
    names: Arc<Vec<String>>,
    total: u64,
}

impl ListSource {
    pub fn new(domains: Vec<String>, names: Arc<Vec<String>>) -> Self {
        let total = domains.len() as u64 * names.len() as u64;
        Self {
            domains: domains.into_iter(),
            names,
            total,
        }
    }
}

#[async_trait]
impl WorkSource for ListSource {
    fn total(&self) -> Option<u64> {
        Some(self.total)
    }

    async fn next_task(&mut self) -> Option<Worker> {
        loop {
            let domain = self.domains.next()?;
            match Worker::new(domain, self.names.clone(), None) {
                Ok(worker) => return Some(worker),
                Err(e) => warn!("Skipping domain: {}", e),
            }
        }
    }
}
