//! Simulated thing behavior.
//!
//! A thing waits for its start delay, optionally subscribes to its command
//! topic, then publishes telemetry until the run stops.

mod thing;

pub use thing::{ThingBehavior, expand_topic, publish_label, qos_from_level, subscribe_label};
