//! A discrete-TTI simulator of network-slicing radio resource allocation.
//!
//! Each transmission time interval, packets arrive at per-user buffers
//! governed by stochastic flows; a two-level scheduler partitions a fixed
//! pool of resource-block groups between slices and then between users
//! within each slice; buffers drain at a throughput set by per-user
//! spectral efficiency and the number of RBGs granted.
//!
//! The crate is a library: building configurations, running experiments,
//! and plotting results are the caller's job. See `demos/` for a runnable
//! scenario.

pub mod basestation;
pub mod buffer;
pub mod error;
pub mod flow;
pub mod rbg;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
pub mod slice;
pub mod user;

pub use basestation::BaseStation;
pub use buffer::DiscreteBuffer;
pub use error::{SimError, SimResult};
pub use flow::{Flow, FlowConfiguration};
pub use rbg::{Rb, Rbg};
pub use scenario::{BaseStationScenario, RunConfig, ScenarioFile, build_simulation};
pub use scheduler::{InterScheduler, SacPolicy};
pub use simulation::{Numerology, Simulation};
pub use slice::{Slice, SliceConfiguration, SliceRequirements, SliceType};
pub use user::{User, UserConfiguration};
