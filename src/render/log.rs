//! Line-log sink for non-interactive output.
//!
//! One line per publish outcome and one per error, derived by diffing the
//! per-stream counters between snapshots.

use crate::runtime::reporter::StatusSink;
use crate::runtime::state::{RunResult, RunSnapshot, StreamStatus};
use chrono::Local;
use std::collections::HashMap;

pub struct LogSink {
    verbose: bool,
    started: bool,
    // stream id -> (publish_count, error_count) at the last render
    last_counts: HashMap<String, (u64, u64)>,
}

impl LogSink {
    pub fn new(verbose: bool) -> LogSink {
        LogSink {
            verbose,
            started: false,
            last_counts: HashMap::new(),
        }
    }

    fn render_stream(&mut self, stream: &StreamStatus) -> Vec<String> {
        let current = (stream.publish_count, stream.error_count);
        let previous = self
            .last_counts
            .insert(stream.id.clone(), current)
            .unwrap_or((0, 0));
        let mut lines = Vec::new();
        if current.1 > previous.1 {
            lines.push(format!(
                "{} ERROR topic={} kind={} msg={}",
                timestamp(),
                stream.topic,
                stream.last_error_kind,
                stream.last_error
            ));
        }
        if current.0 > previous.0 {
            let mut line = format!(
                "{} INFO PUBLISH topic={} count={} bytes={}",
                timestamp(),
                stream.topic,
                stream.publish_count,
                stream.last_bytes
            );
            if self.verbose {
                line.push_str(&format!(" payload={}", stream.last_preview));
            }
            lines.push(line);
        }
        lines
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

impl StatusSink for LogSink {
    fn start(&mut self, snapshot: &RunSnapshot) {
        if self.started {
            return;
        }
        self.started = true;
        println!("Starting simulator: streams={}", snapshot.streams.len());
    }

    fn update(&mut self, snapshot: &RunSnapshot) {
        for stream in &snapshot.streams {
            for line in self.render_stream(stream) {
                println!("{line}");
            }
        }
    }

    fn finish(&mut self, snapshot: &RunSnapshot, result: &RunResult) {
        // flush anything the final coalesced update missed
        self.update(snapshot);
        let status = if result.failed_fast {
            "failed-fast"
        } else {
            "done"
        };
        println!(
            "Finished ({status}): streams={} published={} errors={} duration={:.2}s",
            snapshot.streams.len(),
            result.total_publishes,
            result.total_errors,
            result.duration.as_secs_f64()
        );
    }
}
