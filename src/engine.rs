use crate::channel::JobChannel;
use crate::output::ResultSink;
use crate::session::Session;
use crate::sources::{ChannelSource, ListSource, WorkSource};
use crate::types::{Config, ProbeHoseError, RunStats};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Runs an unbounded stream of probe tasks with a fixed cap on how many are
/// in flight at once. Admission acquires a semaphore permit before pulling
/// the next task, so a saturated pool throttles generator consumption (and
/// with it the queue reservation rate) down to the configured concurrency.
pub struct ProbeEngine {
    config: Config,
    session: Session,
    channel: Option<Arc<JobChannel>>,
    sink: Arc<ResultSink>,
    stop: Arc<watch::Sender<bool>>,
}

/// Requests a graceful stop: no new tasks are admitted, everything in
/// flight is allowed to finish.
#[derive(Clone)]
pub struct ShutdownHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

impl ProbeEngine {
    pub async fn new(config: Config) -> Result<Self, ProbeHoseError> {
        let channel = match config.queue.clone() {
            Some(queue_config) => {
                // Connecting talks blocking TCP; keep it off the runtime.
                let channel =
                    tokio::task::spawn_blocking(move || JobChannel::connect(&queue_config))
                        .await
                        .map_err(|e| {
                            ProbeHoseError::QueueConnect(format!("connect worker failed: {}", e))
                        })??;
                Some(Arc::new(channel))
            }
            None => None,
        };
        Self::with_channel(config, channel)
    }

    /// Assemble an engine around an already-connected channel (or none).
    /// This is the seam alternative queue backends plug into.
    pub fn with_channel(
        config: Config,
        channel: Option<Arc<JobChannel>>,
    ) -> Result<Self, ProbeHoseError> {
        let session = Session::new(&config)?;
        let sink = Arc::new(ResultSink::new(&config, channel.clone())?);
        let (stop, _) = watch::channel(false);
        Ok(Self {
            config,
            session,
            channel,
            sink,
            stop: Arc::new(stop),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: self.stop.clone(),
        }
    }

    /// Probe `domains` × `names`, or drain the job queue when no domains are
    /// given. Returns once the source runs dry or a shutdown was requested
    /// and in-flight tasks have drained.
    pub async fn run(
        &self,
        domains: Vec<String>,
        names: Vec<String>,
    ) -> Result<RunStats, ProbeHoseError> {
        if names.is_empty() {
            return Err(ProbeHoseError::ConfigError(
                "No probe names loaded".to_string(),
            ));
        }

        let names = Arc::new(names);
        let probes_per_task = names.len() as u64;
        let source: Box<dyn WorkSource> = if !domains.is_empty() {
            info!("{} names, {} domains", names.len(), domains.len());
            Box::new(ListSource::new(domains, names))
        } else if let Some(channel) = &self.channel {
            info!("{} names, domains from job queue", names.len());
            Box::new(ChannelSource::new(channel.clone(), names))
        } else {
            return Err(ProbeHoseError::ConfigError(
                "No domains given and no job queue configured".to_string(),
            ));
        };

        self.execute(source, probes_per_task).await
    }

    async fn execute(
        &self,
        mut source: Box<dyn WorkSource>,
        probes_per_task: u64,
    ) -> Result<RunStats, ProbeHoseError> {
        let started = Instant::now();
        let progress = if self.config.progress {
            Some(make_progress(source.total()))
        } else {
            None
        };
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut stop = self.stop.subscribe();
        let mut completed = 0u64;

        loop {
            while let Some(result) = tasks.try_join_next() {
                completed += 1;
                if let Some(pb) = &progress {
                    pb.inc(probes_per_task);
                }
                if let Err(e) = result {
                    error!("Probe task failed: {}", e);
                }
            }

            let permit = tokio::select! {
                _ = stop.wait_for(|stopped| *stopped) => break,
                permit = semaphore.clone().acquire_owned() => {
                    permit.expect("semaphore closed")
                }
            };

            let task = tokio::select! {
                _ = stop.wait_for(|stopped| *stopped) => {
                    drop(permit);
                    break;
                }
                task = source.next_task() => match task {
                    Some(task) => task,
                    None => {
                        drop(permit);
                        break;
                    }
                },
            };

            let session = self.session.clone();
            let sink = self.sink.clone();
            tasks.spawn(async move {
                let _permit = permit;
                task.run(&session, &sink).await;
            });
        }

        // Admission has stopped; let everything in flight finish.
        while let Some(result) = tasks.join_next().await {
            completed += 1;
            if let Some(pb) = &progress {
                pb.inc(probes_per_task);
            }
            if let Err(e) = result {
                error!("Probe task failed: {}", e);
            }
        }
        if let Some(pb) = &progress {
            pb.finish();
        }

        Ok(RunStats {
            completed,
            hits: self.sink.hits(),
            duration: started.elapsed(),
        })
    }
}

fn make_progress(total: Option<u64>) -> ProgressBar {
    match total {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template("{percent:>3}% {bar:40} {pos}/{len} (eta {eta})")
                    .expect("static progress template"),
            );
            pb
        }
        None => {
            // The queue never announces how much work is coming.
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner} {pos} probes")
                    .expect("static progress template"),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        }
    }
}
