//! Live table sink for interactive terminals.

use crate::runtime::reporter::StatusSink;
use crate::runtime::state::{RunResult, RunSnapshot, StreamState, StreamStatus};
use crate::sim::payloads::truncate_preview;
use chrono::Local;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use std::io::Write;

pub struct TableSink {
    painted: bool,
}

impl TableSink {
    pub fn new() -> TableSink {
        TableSink { painted: false }
    }

    fn paint(&mut self, snapshot: &RunSnapshot) {
        let mut stdout = std::io::stdout().lock();
        // full repaint: clear screen, cursor home
        let _ = write!(stdout, "\x1b[2J\x1b[H");
        let _ = writeln!(stdout, "{}", title(snapshot));
        let _ = writeln!(stdout, "{}", build_table(snapshot));
        let _ = stdout.flush();
        self.painted = true;
    }
}

impl Default for TableSink {
    fn default() -> Self {
        TableSink::new()
    }
}

fn title(snapshot: &RunSnapshot) -> String {
    format!(
        "MQTT Simulator (streams={} published={} errors={})",
        snapshot.streams.len(),
        snapshot.total_publishes,
        snapshot.total_errors
    )
}

fn build_table(snapshot: &RunSnapshot) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "TOPIC", "STATE", "INTERVAL", "COUNT", "LAST PUB", "PAYLOAD", "ERR",
    ]);
    for stream in &snapshot.streams {
        table.add_row(row_cells(stream));
    }
    table
}

fn row_cells(stream: &StreamStatus) -> Vec<Cell> {
    let state_cell = match stream.state {
        StreamState::Running => Cell::new("running").fg(Color::Green),
        StreamState::Errored => Cell::new("errored").fg(Color::Red),
        StreamState::Stopped => Cell::new("stopped").fg(Color::Yellow),
        StreamState::Pending => Cell::new("pending").fg(Color::DarkGrey),
    };
    let last_pub = stream
        .last_publish
        .map(|ts| ts.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    vec![
        Cell::new(&stream.topic),
        state_cell,
        Cell::new(format!("{:.2}s", stream.interval)),
        Cell::new(stream.publish_count),
        Cell::new(last_pub),
        Cell::new(truncate_preview(&stream.last_preview)),
        Cell::new(truncate_preview(&stream.last_error)),
    ]
}

impl StatusSink for TableSink {
    fn start(&mut self, snapshot: &RunSnapshot) {
        self.paint(snapshot);
    }

    fn update(&mut self, snapshot: &RunSnapshot) {
        self.paint(snapshot);
    }

    fn finish(&mut self, snapshot: &RunSnapshot, result: &RunResult) {
        self.paint(snapshot);
        let status = if result.failed_fast {
            "failed-fast"
        } else {
            "done"
        };
        println!(
            "\n{status}: published={} errors={} duration={:.2}s",
            result.total_publishes,
            result.total_errors,
            result.duration.as_secs_f64()
        );
    }

    fn coalesce(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot() -> RunSnapshot {
        let mut ok = StreamStatus::new("s-0", "devices/1/status", 0.1);
        ok.state = StreamState::Running;
        ok.publish_count = 3;
        ok.last_preview = "hello-1".to_string();
        ok.last_publish = Some(Utc::now());

        let mut bad = StreamStatus::new("s-1", "devices/2/status", 0.1);
        bad.state = StreamState::Errored;
        bad.error_count = 2;
        bad.last_error = "x".repeat(100);

        let mut snapshot = RunSnapshot::new(Utc::now(), vec![ok.clone(), bad.clone()]);
        snapshot.apply(ok);
        snapshot.apply(bad);
        snapshot
    }

    #[test]
    fn test_table_has_all_columns_and_rows() {
        let table = build_table(&snapshot());
        let rendered = table.to_string();
        for column in ["TOPIC", "STATE", "INTERVAL", "COUNT", "LAST PUB", "PAYLOAD", "ERR"] {
            assert!(rendered.contains(column), "missing column {column}");
        }
        assert!(rendered.contains("devices/1/status"));
        assert!(rendered.contains("running"));
        assert!(rendered.contains("errored"));
        assert!(rendered.contains("hello-1"));
    }

    #[test]
    fn test_errors_are_truncated_in_cells() {
        let rendered = build_table(&snapshot()).to_string();
        assert!(!rendered.contains(&"x".repeat(100)));
        assert!(rendered.contains(&format!("{}...", "x".repeat(45))));
    }

    #[test]
    fn test_title_totals() {
        let text = title(&snapshot());
        assert!(text.contains("streams=2"));
        assert!(text.contains("published=3"));
        assert!(text.contains("errors=2"));
    }
}
