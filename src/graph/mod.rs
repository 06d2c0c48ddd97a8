//! The circuit graph: an owned repository of components and wires.
//!
//! All subsystems take the graph as an explicit parameter; there is no
//! ambient state. Mutations validate at the call boundary and either apply
//! fully or leave the graph unchanged. Two version counters (`topology`,
//! `switch`) bump on every mutation and key the power-flow cache.

pub mod component;
pub mod connection;
pub mod port;
pub mod topology;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use component::{Component, ComponentId, ComponentKind};
use connection::{Connection, ConnectionId, Endpoint};
use port::Port;

/// Arena of components and connections, addressed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitGraph {
    components: BTreeMap<ComponentId, Component>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_component: u64,
    next_connection: u64,
    topology_version: u64,
    switch_version: u64,
}

impl CircuitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component built by one of the [`Component`] kind constructors
    /// and returns its assigned id.
    pub fn add_component(&mut self, mut component: Component) -> ComponentId {
        let id = ComponentId(self.next_component);
        self.next_component += 1;
        component.id = id;
        self.components.insert(id, component);
        self.topology_version += 1;
        id
    }

    /// Removes a component, first removing every incident connection so no
    /// dangling reference can ever exist.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<(), GraphError> {
        if !self.components.contains_key(&id) {
            return Err(GraphError::ComponentNotFound(id));
        }
        let incident: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.source.component == id || c.target.component == id)
            .map(|c| c.id)
            .collect();
        for conn in incident {
            // The connection exists, so this cannot fail.
            let _ = self.remove_connection(conn);
        }
        self.components.remove(&id);
        self.topology_version += 1;
        Ok(())
    }

    /// Wires two ports together after validating polarity and voltage
    /// compatibility. On rejection the graph is unchanged.
    pub fn add_connection(
        &mut self,
        a: ComponentId,
        port_a: &str,
        b: ComponentId,
        port_b: &str,
    ) -> Result<ConnectionId, GraphError> {
        if a == b && port_a == port_b {
            return Err(GraphError::SelfConnection);
        }
        let polarity_a = self.port(a, port_a)?.polarity;
        let polarity_b = self.port(b, port_b)?.polarity;
        if !polarity_a.compatible_with(polarity_b) {
            return Err(GraphError::IncompatiblePolarity {
                a: polarity_a,
                b: polarity_b,
            });
        }
        self.check_load_voltage(a, port_a, b, port_b)?;
        self.check_load_voltage(b, port_b, a, port_a)?;

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        let connection = Connection {
            id,
            source: Endpoint::new(a, port_a),
            target: Endpoint::new(b, port_b),
        };
        self.connections.insert(id, connection);
        self.port_mut(a, port_a).connections.insert(id);
        self.port_mut(b, port_b).connections.insert(id);
        self.topology_version += 1;
        Ok(id)
    }

    /// Rejects wiring an AC load onto a circuit whose source voltage it
    /// cannot run on. A 240V circuit may feed a 120V load only through a
    /// split-phase source; a pure 120V path never feeds a 240V load. A path
    /// with no reachable source is allowed.
    fn check_load_voltage(
        &self,
        load_comp: ComponentId,
        load_port: &str,
        far_comp: ComponentId,
        far_port: &str,
    ) -> Result<(), GraphError> {
        let Some(load) = self.component(load_comp) else {
            return Ok(());
        };
        if load.kind != ComponentKind::AcLoad || load_port != "plug" {
            return Ok(());
        }
        let load_volts = load.specs.voltage;
        match topology::source_voltage_at(self, far_comp, far_port) {
            None => Ok(()),
            Some(topology::SourceVoltage::Split) => {
                if load_volts == 120.0 || load_volts == 240.0 {
                    Ok(())
                } else {
                    Err(GraphError::VoltageMismatch {
                        load_volts,
                        circuit: "split 120/240".to_string(),
                    })
                }
            }
            Some(topology::SourceVoltage::Fixed(v)) => {
                if load_volts == v {
                    Ok(())
                } else {
                    Err(GraphError::VoltageMismatch {
                        load_volts,
                        circuit: format!("{v}"),
                    })
                }
            }
        }
    }

    /// Removes a wire, symmetrically clearing both port back-references.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<(), GraphError> {
        let connection = self
            .connections
            .remove(&id)
            .ok_or(GraphError::ConnectionNotFound(id))?;
        for end in [&connection.source, &connection.target] {
            if let Some(component) = self.components.get_mut(&end.component)
                && let Some(port) = component.ports.get_mut(&end.port)
            {
                port.connections.remove(&id);
            }
        }
        self.topology_version += 1;
        Ok(())
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// Mutable access for switch-state edits (manual breaker toggles).
    /// Bumps the switch version so the flow cache invalidates.
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.switch_version += 1;
        self.components.get_mut(&id)
    }

    /// Mutable access for resource-storage updates. Does not bump the
    /// switch version: stored litres never affect electrical flow, so the
    /// memoized flow snapshot stays valid across producer ticks.
    pub(crate) fn component_storage_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn components_of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> {
        self.components.values().filter(move |c| c.kind == kind)
    }

    fn port(&self, component: ComponentId, key: &str) -> Result<&Port, GraphError> {
        let comp = self
            .components
            .get(&component)
            .ok_or(GraphError::ComponentNotFound(component))?;
        comp.ports.get(key).ok_or_else(|| GraphError::PortNotFound {
            component,
            key: key.to_string(),
        })
    }

    /// Only called for ports already validated by `port`.
    fn port_mut(&mut self, component: ComponentId, key: &str) -> &mut Port {
        self.components
            .get_mut(&component)
            .and_then(|c| c.ports.get_mut(key))
            .expect("port validated before mutation")
    }

    /// Wires attached to the given port. Stale ids resolve to nothing.
    pub fn connections_at<'a>(
        &'a self,
        component: ComponentId,
        key: &str,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        let ids: Vec<ConnectionId> = self
            .components
            .get(&component)
            .and_then(|c| c.ports.get(key))
            .map(|p| p.connections.iter().copied().collect())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.connections.get(&id))
    }

    pub fn topology_version(&self) -> u64 {
        self.topology_version
    }

    pub fn switch_version(&self) -> u64 {
        self.switch_version
    }
}
