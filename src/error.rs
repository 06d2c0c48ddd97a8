//! Error types for graph mutations.
//!
//! Only mutations of the circuit graph can fail: an invalid connection is
//! refused at the call boundary with a reason, and the graph is left
//! unchanged. Traversal never errors — a stale id is treated as "no path"
//! and skipped. Breaker trips are state transitions, not errors.

use thiserror::Error;

use crate::graph::component::ComponentId;
use crate::graph::connection::ConnectionId;
use crate::graph::port::Polarity;

/// A rejected graph mutation or a missing reference at the call boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("component {0} not found")]
    ComponentNotFound(ComponentId),

    #[error("component {component} has no port \"{key}\"")]
    PortNotFound { component: ComponentId, key: String },

    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    #[error("ports with polarities {a:?} and {b:?} may not be wired together")]
    IncompatiblePolarity { a: Polarity, b: Polarity },

    // Field must not be named `source`: thiserror would treat it as the
    // error's cause and demand `std::error::Error`.
    #[error("{load_volts}V load is not compatible with a {circuit}V circuit")]
    VoltageMismatch { load_volts: f32, circuit: String },

    #[error("a port may not be wired to itself")]
    SelfConnection,
}
