//! Connections: the wires of the circuit graph.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::component::ComponentId;

/// Unique id of a connection within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// One end of a wire: a component and one of its port keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub component: ComponentId,
    pub port: String,
}

impl Endpoint {
    pub fn new(component: ComponentId, port: impl Into<String>) -> Self {
        Self {
            component,
            port: port.into(),
        }
    }
}

/// An undirected wire between two ports. The source/target labels record
/// which end the user dragged from and only disambiguate current direction
/// for telemetry; they never affect validity or traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: Endpoint,
    pub target: Endpoint,
}

impl Connection {
    /// The endpoint on the far side of `component`, if this wire touches it.
    pub fn other_end(&self, component: ComponentId) -> Option<&Endpoint> {
        if self.source.component == component {
            Some(&self.target)
        } else if self.target.component == component {
            Some(&self.source)
        } else {
            None
        }
    }

    /// Whether this wire attaches to the given component/port pair.
    pub fn touches(&self, component: ComponentId, port: &str) -> bool {
        (self.source.component == component && self.source.port == port)
            || (self.target.component == component && self.target.port == port)
    }
}
