// src/queue.rs
use crate::types::ProbeHoseError;
use beanstalkc::Beanstalkc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Priority used when burying malformed or unexpandable jobs.
const BURY_PRIORITY: u32 = 1024;

/// A reserved unit of work, detached from the underlying client so the
/// handle can outlive the reserve call. The job stays reserved server-side
/// until `delete` or `bury` acknowledges it.
#[derive(Debug, Clone)]
pub struct RawJob {
    pub id: u64,
    pub body: Vec<u8>,
}

/// Capability contract for one direction of the shared work queue. The wire
/// protocol lives entirely behind this trait; everything above it only knows
/// reserve/delete/bury/put/use/watch semantics.
pub trait QueueConn: Send {
    /// Wait up to `timeout` for a job. `Ok(None)` means the wait elapsed
    /// with nothing to hand out.
    fn reserve(&mut self, timeout: Duration) -> Result<Option<RawJob>, ProbeHoseError>;
    fn delete(&mut self, id: u64) -> Result<(), ProbeHoseError>;
    fn bury(&mut self, id: u64) -> Result<(), ProbeHoseError>;
    fn put(&mut self, body: &[u8]) -> Result<u64, ProbeHoseError>;
    fn use_tube(&mut self, tube: &str) -> Result<(), ProbeHoseError>;
    fn watch(&mut self, tube: &str) -> Result<(), ProbeHoseError>;
}

/// Beanstalkd-backed queue connection.
pub struct BeanstalkQueue {
    conn: Beanstalkc,
}

impl BeanstalkQueue {
    pub fn connect(host: &str, port: u16) -> Result<Self, ProbeHoseError> {
        let conn = Beanstalkc::new()
            .host(host)
            .port(port)
            .connection_timeout(Some(Duration::from_secs(10)))
            .connect()
            .map_err(|e| {
                ProbeHoseError::QueueConnect(format!("{}:{}: {}", host, port, e))
            })?;
        Ok(Self { conn })
    }
}

impl QueueConn for BeanstalkQueue {
    fn reserve(&mut self, timeout: Duration) -> Result<Option<RawJob>, ProbeHoseError> {
        match self.conn.reserve_with_timeout(timeout) {
            Ok(job) => Ok(Some(RawJob {
                id: job.id(),
                body: job.body().to_vec(),
            })),
            Err(e) => {
                let message = e.to_string();
                if message.contains("TIMED_OUT") || message.contains("DEADLINE_SOON") {
                    Ok(None)
                } else {
                    Err(ProbeHoseError::QueueCommand(message))
                }
            }
        }
    }

    fn delete(&mut self, id: u64) -> Result<(), ProbeHoseError> {
        self.conn
            .delete(id)
            .map_err(|e| ProbeHoseError::QueueCommand(format!("delete {}: {}", id, e)))
    }

    fn bury(&mut self, id: u64) -> Result<(), ProbeHoseError> {
        self.conn
            .bury(id, BURY_PRIORITY)
            .map_err(|e| ProbeHoseError::QueueCommand(format!("bury {}: {}", id, e)))
    }

    fn put(&mut self, body: &[u8]) -> Result<u64, ProbeHoseError> {
        self.conn
            .put_default(body)
            .map_err(|e| ProbeHoseError::QueueCommand(format!("put: {}", e)))
    }

    fn use_tube(&mut self, tube: &str) -> Result<(), ProbeHoseError> {
        self.conn
            .use_tube(tube)
            .map(|_| ())
            .map_err(|e| ProbeHoseError::QueueCommand(format!("use {}: {}", tube, e)))
    }

    fn watch(&mut self, tube: &str) -> Result<(), ProbeHoseError> {
        self.conn
            .watch(tube)
            .map(|_| ())
            .map_err(|e| ProbeHoseError::QueueCommand(format!("watch {}: {}", tube, e)))?;
        // Jobs on the default tube are not ours to reserve.
        if tube != "default" {
            self.conn
                .ignore("default")
                .map(|_| ())
                .map_err(|e| ProbeHoseError::QueueCommand(format!("ignore default: {}", e)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryQueueState {
    next_id: u64,
    ready: VecDeque<RawJob>,
    deleted: Vec<u64>,
    buried: Vec<u64>,
    puts: Vec<Vec<u8>>,
    used: Option<String>,
    watched: Vec<String>,
    closed: bool,
}

/// In-process queue implementation. Primarily test infrastructure: it records
/// every acknowledgement and publication for inspection, and can be closed so
/// otherwise-infinite channel sources run dry. Cloning yields another handle
/// onto the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<MemoryQueueState>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job body, returning its id.
    pub fn push_job(&self, body: &[u8]) -> u64 {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.ready.push_back(RawJob {
            id,
            body: body.to_vec(),
        });
        id
    }

    /// After the ready backlog drains, reserve calls fail with `QueueClosed`
    /// instead of reporting an empty wait.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn deleted(&self) -> Vec<u64> {
        self.lock().deleted.clone()
    }

    pub fn buried(&self) -> Vec<u64> {
        self.lock().buried.clone()
    }

    pub fn puts(&self) -> Vec<Vec<u8>> {
        self.lock().puts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryQueueState> {
        self.state.lock().expect("memory queue lock poisoned")
    }
}

impl QueueConn for MemoryQueue {
    fn reserve(&mut self, _timeout: Duration) -> Result<Option<RawJob>, ProbeHoseError> {
        let mut state = self.lock();
        match state.ready.pop_front() {
            Some(job) => Ok(Some(job)),
            None if state.closed => Err(ProbeHoseError::QueueClosed),
            None => Ok(None),
        }
    }

    fn delete(&mut self, id: u64) -> Result<(), ProbeHoseError> {
        self.lock().deleted.push(id);
        Ok(())
    }

    fn bury(&mut self, id: u64) -> Result<(), ProbeHoseError> {
        self.lock().buried.push(id);
        Ok(())
    }

    fn put(&mut self, body: &[u8]) -> Result<u64, ProbeHoseError> {
        let mut state = self.lock();
        state.puts.push(body.to_vec());
        state.next_id += 1;
        let id = state.next_id;
        state.ready.push_back(RawJob {
            id,
            body: body.to_vec(),
        });
        Ok(id)
    }

    fn use_tube(&mut self, tube: &str) -> Result<(), ProbeHoseError> {
        self.lock().used = Some(tube.to_string());
        Ok(())
    }

    fn watch(&mut self, tube: &str) -> Result<(), ProbeHoseError> {
        self.lock().watched.push(tube.to_string());
        Ok(())
    }
}
