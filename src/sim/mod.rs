//! Payload generation: values, generators, expressions, and builders.

pub mod expr;
pub mod generators;
pub mod payloads;
pub mod rng;
pub mod value;

pub use generators::ValueGenerator;
pub use payloads::{BuiltPayload, PayloadBuilder};
pub use rng::{SharedRng, SimRng};
pub use value::Value;
