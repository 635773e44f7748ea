#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod http;
pub mod iteration;
pub mod report;
pub mod simulation;
#[doc(hidden)]
pub mod transaction;

mod error;
mod injector;
mod measurement;
mod recorder;

pub use error::EngineError;
pub use fintech_perf_core as core;
pub use report::RunReport;
pub use simulation::Simulation;

pub mod prelude {
    pub use crate::report::{AssertionResult, RequestSummary, RunReport};
    pub use crate::simulation::Simulation;
    pub use fintech_perf_core::{
        Assertion, InjectionPhase, Profile, Properties, RuntimeConfig, SimulationKind,
        SimulationPlan,
    };
}
