//! Scheduler, telemetry state, and status fan-in.

pub mod engine;
pub mod reporter;
pub mod state;

pub use engine::{run, EngineError, EngineOptions, SHUTDOWN_BUDGET};
pub use reporter::{Reporter, StatusSink, StatusTx};
pub use state::{RunResult, RunSnapshot, StreamState, StreamStatus};
