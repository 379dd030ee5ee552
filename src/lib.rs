//! mqtt-sim: a configurable MQTT traffic generator.
//!
//! A declarative JSON plan names brokers and publish streams; stream
//! templates expand into resolved streams, payloads come from composable
//! stateful generators, and a scheduler drives one timed worker per stream
//! through shared broker publishers with live table or log-line status.

pub mod config;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod render;
pub mod runtime;
pub mod sim;

pub use config::{load_plan, resolve_streams, validate_plan, Plan};
pub use error::{ConfigError, GeneratorError, PayloadError, TransportError};
pub use runtime::{EngineError, EngineOptions, RunResult};
