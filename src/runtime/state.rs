//! Runtime stream state, snapshots, and run outcomes.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Lifecycle of one resolved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Declared but its broker handshake has not completed.
    Pending,
    /// Publishing on its cadence.
    Running,
    /// Last publish attempt failed; keeps ticking under keep-going.
    Errored,
    /// Graceful exit after cancellation or duration expiry.
    Stopped,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamState::Pending => "pending",
            StreamState::Running => "running",
            StreamState::Errored => "errored",
            StreamState::Stopped => "stopped",
        })
    }
}

/// Telemetry row for one stream; mutated only by that stream's worker and
/// shipped to the reporter as a whole row.
#[derive(Debug, Clone)]
pub struct StreamStatus {
    pub id: String,
    pub topic: String,
    pub interval: f64,
    pub state: StreamState,
    pub publish_count: u64,
    pub error_count: u64,
    pub last_publish: Option<DateTime<Utc>>,
    pub last_preview: String,
    pub last_bytes: usize,
    pub last_error: String,
    pub last_error_kind: String,
}

impl StreamStatus {
    pub fn new(id: impl Into<String>, topic: impl Into<String>, interval: f64) -> StreamStatus {
        StreamStatus {
            id: id.into(),
            topic: topic.into(),
            interval,
            state: StreamState::Pending,
            publish_count: 0,
            error_count: 0,
            last_publish: None,
            last_preview: String::new(),
            last_bytes: 0,
            last_error: String::new(),
            last_error_kind: String::new(),
        }
    }
}

/// Consistent view of every stream row plus run totals.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub started_at: DateTime<Utc>,
    pub streams: Vec<StreamStatus>,
    pub total_publishes: u64,
    pub total_errors: u64,
}

impl RunSnapshot {
    pub fn new(started_at: DateTime<Utc>, streams: Vec<StreamStatus>) -> RunSnapshot {
        RunSnapshot {
            started_at,
            streams,
            total_publishes: 0,
            total_errors: 0,
        }
    }

    /// Replace the row with the same stream id and refresh totals.
    pub fn apply(&mut self, status: StreamStatus) {
        if let Some(row) = self.streams.iter_mut().find(|row| row.id == status.id) {
            *row = status;
        }
        self.total_publishes = self.streams.iter().map(|row| row.publish_count).sum();
        self.total_errors = self.streams.iter().map(|row| row.error_count).sum();
    }
}

/// Outcome summary for one engine run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: i32,
    pub total_publishes: u64,
    pub total_errors: u64,
    pub failed_fast: bool,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replaces_row_and_totals() {
        let mut snapshot = RunSnapshot::new(
            Utc::now(),
            vec![
                StreamStatus::new("a", "t/a", 1.0),
                StreamStatus::new("b", "t/b", 1.0),
            ],
        );
        let mut update = StreamStatus::new("b", "t/b", 1.0);
        update.publish_count = 3;
        update.error_count = 1;
        update.state = StreamState::Running;
        snapshot.apply(update);

        assert_eq!(snapshot.total_publishes, 3);
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.streams[1].state, StreamState::Running);
        assert_eq!(snapshot.streams[0].state, StreamState::Pending);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(StreamState::Pending.to_string(), "pending");
        assert_eq!(StreamState::Stopped.to_string(), "stopped");
    }
}
