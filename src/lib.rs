//! # mqtt-loadgen
//!
//! `mqtt-loadgen` drives many simulated things against an MQTT broker and
//! measures the latency and outcome of every publish and subscribe.
//!
//! ## Core Modules
//!
//! - `tracker`: correlates each submitted operation with its acknowledgment and turns it into an outcome.
//! - `session`: the boundary to the MQTT protocol library (`rumqttc`).
//! - `supervisor`: connect, TLS setup, and reconnects with backoff.
//! - `client`: one simulated thing, wiring a session to its tracker and supervisor.
//! - `outcome`: the normalized success/failure events and their sinks.
//! - `stats`: aggregates outcomes into the end-of-run report.
//! - `scenario`: what a simulated thing does once connected.
//! - `runner`: spawns things at a hatch rate and runs them for a duration.
//! - `config`: layered settings from file and environment.
//! - `utils`: error types and logging.

pub mod client;
pub mod config;
pub mod outcome;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod stats;
pub mod supervisor;
pub mod tracker;
pub mod utils;
