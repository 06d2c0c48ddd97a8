//! The tick-driven simulation: clock, environment, power flow,
//! protection, automation, and resource flow, orchestrated by
//! [`engine::SimEngine`].

pub mod automation;
pub mod clock;
pub mod engine;
pub mod environment;
pub mod power_flow;
pub mod protection;
pub mod resource;
pub mod state;
