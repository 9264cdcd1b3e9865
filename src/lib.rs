pub mod agent;
pub mod arena;
pub mod compartment;
pub mod config;
pub mod counters;
pub mod distributions;
pub mod error;
pub mod intervention;
pub mod logging;
pub mod metrics;
pub mod runner;
mod simulation;
pub mod transmission;

#[cfg(test)]
mod tests;

pub use agent::{Agent, DiseaseTimeline, EpiProfile, Illness, Serology, MAX_AGE};
pub use arena::{AgentArena, Occupancy};
pub use compartment::{Compartment, CompartmentId, HerdLevels, InfectionRates, Population};
pub use config::{ParameterSource, SimulationConfig};
pub use counters::{Counters, RunningAverages};
pub use distributions::{DayOffset, Sampler, ShiftedBinomial};
pub use error::{Result, SimError};
pub use intervention::{InterventionPolicy, Phase};
pub use metrics::{BatchSummary, DayRecord, MetricsSink, RunSummary};
pub use runner::Runner;
pub use simulation::*;
