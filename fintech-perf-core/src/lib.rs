//! Core of `fintech-perf`: configuration resolution, load profiles, journey
//! descriptions and the post-transaction consistency checks.
//!
//! Nothing in here performs network I/O. The engine in the `fintech-perf` crate
//! consumes these shapes and drives the actual HTTP traffic.
pub mod consistency;
pub mod constants;
pub mod journey;
pub mod load_profile;
pub mod scenarios;
pub mod users;

mod config;
mod error;
mod profile;

pub use config::*;
pub use consistency::{ConsistencyCheck, ConsistencyViolation};
pub use error::*;
pub use journey::{Extraction, JourneyStep, JsonPath, Method, ScenarioSpec, Session};
pub use load_profile::{InjectionPhase, SlaThresholds};
pub use profile::*;
pub use scenarios::{Assertion, SimulationKind, SimulationPlan};
