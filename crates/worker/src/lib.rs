//! Job worker: pops queued jobs and drives each one through the model
//! chain until a backend produces usable output or the chain runs out.

pub mod config;
mod worker;

pub use config::{ConfigError, WorkerConfig};
pub use worker::{Worker, WorkerError};
