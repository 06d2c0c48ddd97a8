//! Overload protection.
//!
//! Breakers cycle closed -> tripped -> closed (manual reset). The overload
//! check is a strict three-phase pass: collect every closed circuit,
//! calculate each one's current without mutating anything, then apply all
//! trips in one batch. A trip decided in a pass never influences another
//! circuit's calculation within the same pass.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::graph::CircuitGraph;
use crate::graph::component::{ComponentId, ComponentKind};
use crate::sim::environment::closed_predicate;
use crate::sim::power_flow::FlowMap;
use crate::sim::state::{BreakerState, CircuitRef, LiveState};

/// Present current through a protective circuit, in amps.
///
/// AC circuits are priced from the switched-on loads downstream of the
/// circuit's output port. DC breakers carry PV or battery current, which
/// only the resolved flow snapshot knows, so they read their own wires.
fn circuit_amps(
    graph: &CircuitGraph,
    live: &LiveState,
    flow: &FlowMap,
    circuit: CircuitRef,
) -> f32 {
    let Some(comp) = graph.component(circuit.component) else {
        return 0.0;
    };
    let Some(out_port) = comp.circuit_output_port(circuit.circuit) else {
        return 0.0;
    };

    if comp.kind == ComponentKind::DcBreaker {
        return graph
            .connections_at(comp.id, &out_port)
            .filter_map(|c| flow.get(&c.id))
            .filter(|r| r.has_active_flow)
            .map(|r| r.amps)
            .fold(0.0, f32::max);
    }

    let voltage = comp.specs.voltage;
    if voltage <= 0.0 {
        return 0.0;
    }
    let closed = closed_predicate(graph, live);
    let load_on = |id: ComponentId| live.load_on(id);
    let watts: f32 = crate::graph::topology::downstream_loads(
        graph,
        comp.id,
        &out_port,
        voltage,
        &closed,
        &load_on,
    )
    .iter()
    .filter_map(|l| graph.component(*l))
    .map(|l| l.specs.watts)
    .sum();
    watts / voltage
}

/// Runs one three-phase overload pass and returns the circuits that
/// tripped. Loads fed by a tripped circuit are forced off so they do not
/// silently stay on while unpowered. The caller recomputes power flow and
/// re-checks once after any trips.
pub fn check_tripping(
    graph: &CircuitGraph,
    live: &mut LiveState,
    flow: &FlowMap,
) -> Vec<CircuitRef> {
    // Phase 1: collect closed circuits with a protective rating.
    let candidates: Vec<CircuitRef> = live
        .breakers
        .keys()
        .copied()
        .filter(|c| live.circuit_closed(*c))
        .filter(|c| {
            graph
                .component(c.component)
                .map(|comp| {
                    comp.specs.rating_amps > 0.0
                        && comp.circuit_output_port(c.circuit).is_some()
                })
                .unwrap_or(false)
        })
        .collect();

    // Phase 2: calculate, touching nothing.
    let mut tripped: Vec<(CircuitRef, f32, f32)> = Vec::new();
    let mut orphaned: BTreeSet<ComponentId> = BTreeSet::new();
    {
        let closed = closed_predicate(graph, live);
        let load_on = |id: ComponentId| live.load_on(id);
        for circuit in candidates {
            let comp = graph
                .component(circuit.component)
                .expect("collected from live graph");
            let amps = circuit_amps(graph, live, flow, circuit);
            if amps <= comp.specs.rating_amps {
                continue;
            }
            if let Some(out_port) = comp.circuit_output_port(circuit.circuit) {
                orphaned.extend(crate::graph::topology::downstream_loads(
                    graph,
                    comp.id,
                    &out_port,
                    comp.specs.voltage,
                    &closed,
                    &load_on,
                ));
            }
            tripped.push((circuit, amps, comp.specs.rating_amps));
        }
    }

    // Phase 3: apply in one batch.
    for (circuit, amps, rating) in &tripped {
        warn!(circuit = %circuit, amps, rating, "breaker tripped on overload");
        live.breakers.insert(
            *circuit,
            BreakerState {
                is_closed: false,
                was_tripped: true,
            },
        );
    }
    for load in orphaned {
        live.load_states.insert(load, false);
    }

    tripped.into_iter().map(|(c, _, _)| c).collect()
}

/// Manually resets one circuit: closes it and clears the trip flag.
pub fn reset_breaker(live: &mut LiveState, circuit: CircuitRef) {
    if let Some(state) = live.breakers.get_mut(&circuit) {
        if state.was_tripped {
            info!(circuit = %circuit, "breaker reset");
        }
        *state = BreakerState::closed();
    }
}

/// Resets every tracked circuit, restoring panel and spider-box branch
/// circuits along with plain breakers.
pub fn reset_all(live: &mut LiveState) {
    for state in live.breakers.values_mut() {
        *state = BreakerState::closed();
    }
}
