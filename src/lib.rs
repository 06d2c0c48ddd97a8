//! Off-grid electrical installation simulator.

pub mod cli;
pub mod config;
pub mod error;
/// The component/port/connection graph and its traversal queries.
pub mod graph;
pub mod persist;
/// Clock, environment, power flow, protection, automation, resources.
pub mod sim;
pub mod telemetry;
