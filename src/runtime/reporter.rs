//! Status fan-in.
//!
//! Workers push whole-row [`StreamStatus`] updates over one channel; the
//! reporter holds the authoritative snapshot and drives the sink. It is the
//! only component that writes to stdout. Table-style sinks are repainted on
//! a coalescing interval; event-style sinks see every update.

use crate::runtime::state::{RunResult, RunSnapshot, StreamStatus};
use std::time::Duration;
use tokio::sync::mpsc;

pub const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// Rendering target for run status.
pub trait StatusSink: Send {
    /// Called once before the first update.
    fn start(&mut self, snapshot: &RunSnapshot);

    /// Called on refresh: per event for event sinks, at most every
    /// [`REFRESH_INTERVAL`] for coalescing sinks.
    fn update(&mut self, snapshot: &RunSnapshot);

    /// Called once with the final snapshot and run outcome.
    fn finish(&mut self, snapshot: &RunSnapshot, result: &RunResult);

    /// Whether updates should be coalesced onto a repaint interval.
    fn coalesce(&self) -> bool {
        false
    }
}

/// Sender side handed to every worker.
pub type StatusTx = mpsc::UnboundedSender<StreamStatus>;

pub struct Reporter {
    rx: mpsc::UnboundedReceiver<StreamStatus>,
    sink: Box<dyn StatusSink>,
    snapshot: RunSnapshot,
}

impl Reporter {
    /// Build the reporter and the channel workers publish updates on.
    pub fn new(sink: Box<dyn StatusSink>, snapshot: RunSnapshot) -> (Reporter, StatusTx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Reporter { rx, sink, snapshot }, tx)
    }

    /// Consume updates until every sender is dropped, then hand back the
    /// sink and final snapshot for the finish render.
    pub async fn run(mut self) -> (Box<dyn StatusSink>, RunSnapshot) {
        self.sink.start(&self.snapshot);

        if self.sink.coalesce() {
            self.run_coalescing().await;
        } else {
            while let Some(status) = self.rx.recv().await {
                self.snapshot.apply(status);
                self.sink.update(&self.snapshot);
            }
        }

        (self.sink, self.snapshot)
    }

    async fn run_coalescing(&mut self) {
        let mut repaint = tokio::time::interval(REFRESH_INTERVAL);
        repaint.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut dirty = false;
        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(status) => {
                        self.snapshot.apply(status);
                        dirty = true;
                    }
                    None => {
                        if dirty {
                            self.sink.update(&self.snapshot);
                        }
                        return;
                    }
                },
                _ = repaint.tick() => {
                    if dirty {
                        self.sink.update(&self.snapshot);
                        dirty = false;
                    }
                }
            }
        }
    }
}
