//! Transient live-simulation state.
//!
//! Created when live mode starts, discarded when it stops. Holds the
//! switch overlays (loads, breakers), battery state of charge, cumulative
//! energy counters, and the cached power-flow map.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::CircuitGraph;
use crate::graph::component::{ComponentId, OperationalState};
use crate::sim::power_flow::{FlowKey, FlowMap};

/// Lower clamp for battery state of charge. Batteries are never drained
/// below this floor.
pub const SOC_FLOOR: f32 = 0.05;

/// State of charge assigned to batteries when live mode starts.
pub const INITIAL_SOC: f32 = 0.5;

/// Addresses one protective circuit: a plain breaker (`circuit: None`),
/// a panel/spider-box main (`None` on those kinds), or one branch circuit
/// (`Some(index)`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CircuitRef {
    pub component: ComponentId,
    pub circuit: Option<usize>,
}

impl CircuitRef {
    pub fn breaker(component: ComponentId) -> Self {
        Self {
            component,
            circuit: None,
        }
    }

    pub fn branch(component: ComponentId, circuit: usize) -> Self {
        Self {
            component,
            circuit: Some(circuit),
        }
    }
}

impl fmt::Display for CircuitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.circuit {
            Some(i) => write!(f, "{}#{}", self.component, i),
            None => write!(f, "{}", self.component),
        }
    }
}

/// Live switch state of one protective circuit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakerState {
    pub is_closed: bool,
    pub was_tripped: bool,
}

impl BreakerState {
    pub fn closed() -> Self {
        Self {
            is_closed: true,
            was_tripped: false,
        }
    }
}

/// All state that exists only while live mode is active.
#[derive(Debug, Clone, Default)]
pub struct LiveState {
    /// Whether each load (or producer) is switched on. Absent means off.
    pub load_states: BTreeMap<ComponentId, bool>,
    /// Live overlay over the manual breaker switches, seeded at start.
    pub breakers: BTreeMap<CircuitRef, BreakerState>,
    /// State of charge per battery, each in [SOC_FLOOR, 1.0].
    pub battery_soc: BTreeMap<ComponentId, f32>,
    /// Cumulative solar energy that irradiance made possible (Wh).
    pub possible_wh: f64,
    /// Cumulative solar energy actually captured after derating (Wh).
    pub captured_wh: f64,
    /// Cumulative energy curtailed by the float/derate rule (Wh).
    pub derated_wh: f64,
    /// Cached power-flow map; valid only while `flow_key` matches.
    pub flow: FlowMap,
    pub flow_key: Option<FlowKey>,
}

impl LiveState {
    /// Builds fresh live state for the given graph: breakers seeded from
    /// the manual switches, batteries at the initial state of charge,
    /// every load off.
    pub fn start(graph: &CircuitGraph) -> Self {
        let mut state = Self::default();
        for comp in graph.components() {
            state.adopt_component(graph, comp.id);
        }
        state
    }

    /// Seeds tracking entries for one component: breaker overlays from
    /// its manual switches, batteries at the initial state of charge.
    /// Used at live start and when a component is added mid-session.
    pub fn adopt_component(&mut self, graph: &CircuitGraph, id: ComponentId) {
        let Some(comp) = graph.component(id) else {
            return;
        };
        match &comp.state {
            OperationalState::Breaker { is_closed } => {
                self.breakers.insert(
                    CircuitRef::breaker(comp.id),
                    BreakerState {
                        is_closed: *is_closed,
                        was_tripped: false,
                    },
                );
            }
            OperationalState::Panelboard { main_on, circuits } => {
                self.breakers.insert(
                    CircuitRef::breaker(comp.id),
                    BreakerState {
                        is_closed: *main_on,
                        was_tripped: false,
                    },
                );
                for (i, on) in circuits.iter().enumerate() {
                    self.breakers.insert(
                        CircuitRef::branch(comp.id, i),
                        BreakerState {
                            is_closed: *on,
                            was_tripped: false,
                        },
                    );
                }
            }
            _ => {}
        }
        if comp.kind.is_battery() {
            self.battery_soc.insert(comp.id, INITIAL_SOC);
        }
    }

    /// Drops every tracking entry for a removed component.
    pub fn forget_component(&mut self, id: ComponentId) {
        self.load_states.remove(&id);
        self.battery_soc.remove(&id);
        self.breakers.retain(|c, _| c.component != id);
    }

    /// Whether a load is switched on.
    pub fn load_on(&self, id: ComponentId) -> bool {
        self.load_states.get(&id).copied().unwrap_or(false)
    }

    /// Whether a protective circuit is closed: the circuit's own live
    /// switch, gated by the owning panel's main breaker for branch
    /// circuits.
    pub fn circuit_closed(&self, circuit: CircuitRef) -> bool {
        let own = self
            .breakers
            .get(&circuit)
            .map(|b| b.is_closed)
            .unwrap_or(false);
        if circuit.circuit.is_some() {
            let main = CircuitRef::breaker(circuit.component);
            own && self
                .breakers
                .get(&main)
                .map(|b| b.is_closed)
                .unwrap_or(true)
        } else {
            own
        }
    }

    /// Capacity-weighted mean state of charge over all batteries in the
    /// graph, or 0 when there are none.
    pub fn weighted_soc(&self, graph: &CircuitGraph) -> f32 {
        let mut total_capacity = 0.0f32;
        let mut weighted = 0.0f32;
        for (id, soc) in &self.battery_soc {
            if let Some(comp) = graph.component(*id) {
                total_capacity += comp.specs.capacity_wh;
                weighted += soc * comp.specs.capacity_wh;
            }
        }
        if total_capacity > 0.0 {
            weighted / total_capacity
        } else {
            0.0
        }
    }

    /// Solar capture efficiency in percent: captured / possible.
    pub fn efficiency_pct(&self) -> f32 {
        if self.possible_wh > 0.0 {
            (self.captured_wh / self.possible_wh * 100.0) as f32
        } else {
            100.0
        }
    }

    /// Drops the cached flow map. Must be called synchronously by any
    /// topology or switch mutation.
    pub fn invalidate_flow(&mut self) {
        self.flow_key = None;
        self.flow.clear();
    }
}
