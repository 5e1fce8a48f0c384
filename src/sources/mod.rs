// src/sources/mod.rs
use crate::worker::Worker;
use async_trait::async_trait;

mod channel;
mod list;

pub use channel::ChannelSource;
pub use list::ListSource;

/// A lazy sequence of probe tasks, pulled one at a time by the execution
/// engine, plus an optional known total for progress display. Sources are
/// not rewindable; a task handed out is consumed.
#[async_trait]
pub trait WorkSource: Send {
    /// The number of individual probes this source will produce, when known
    /// up front. `None` means unbounded.
    fn total(&self) -> Option<u64>;

    /// Produce the next task, or `None` at end of stream.
    async fn next_task(&mut self) -> Option<Worker>;
}
