//! Stateless topology queries over the circuit graph.
//!
//! All traversals are cycle-guarded with visited sets and treat missing
//! ids as "no path". Switch state is injected through predicates so the
//! same walkers serve power flow (live breaker overlay) and plain graph
//! queries (manual switch state only).

use std::collections::BTreeSet;

use crate::graph::CircuitGraph;
use crate::graph::component::{Component, ComponentId, ComponentKind, OperationalState};
use crate::graph::connection::ConnectionId;

/// Whether a protective circuit is closed. The `Option<usize>` selects a
/// branch circuit on panels/spider boxes; `None` addresses a plain breaker.
pub type ClosedFn<'a> = dyn Fn(ComponentId, Option<usize>) -> bool + 'a;

/// Whether a load (or producer) is currently switched on.
pub type LoadOnFn<'a> = dyn Fn(ComponentId) -> bool + 'a;

/// A closed predicate reading only the manual switch state in the graph.
pub fn manual_closed(graph: &CircuitGraph) -> impl Fn(ComponentId, Option<usize>) -> bool + '_ {
    |id, circuit| {
        graph
            .component(id)
            .map(|c| c.manual_switch_on(circuit))
            .unwrap_or(false)
    }
}

/// Voltage classification of the source feeding a port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceVoltage {
    /// A single fixed circuit voltage.
    Fixed(f32),
    /// Split-phase 120/120: feeds both 120V and 240V loads.
    Split,
}

/// Whether a load of `load_volts` may run on a circuit of `circuit_volts`.
/// A 240V circuit may also feed a 120V load, never the reverse.
pub fn load_voltage_matches(load_volts: f32, circuit_volts: f32) -> bool {
    load_volts == circuit_volts || (circuit_volts == 240.0 && load_volts == 120.0)
}

/// Classifies the source voltage reachable from a port by walking toward
/// the sources. The nearest voltage-bearing component wins. Returns `None`
/// when no source is reachable (which is not an error).
pub fn source_voltage_at(
    graph: &CircuitGraph,
    component: ComponentId,
    port: &str,
) -> Option<SourceVoltage> {
    let mut visited: BTreeSet<ComponentId> = BTreeSet::new();
    let mut queue: Vec<(ComponentId, String)> = vec![(component, port.to_string())];

    while let Some((id, arrived_at)) = queue.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(comp) = graph.component(id) else {
            continue;
        };
        match comp.kind {
            ComponentKind::AcOutlet => return Some(SourceVoltage::Fixed(comp.specs.voltage)),
            ComponentKind::SpiderBox | ComponentKind::BreakerPanel => {
                return Some(SourceVoltage::Fixed(comp.specs.voltage));
            }
            ComponentKind::Controller => return Some(SourceVoltage::Fixed(comp.specs.voltage)),
            ComponentKind::DoubleVoltageHub => {
                return Some(match arrived_at.as_str() {
                    "out_120" => SourceVoltage::Fixed(120.0),
                    // Both 240V legs and the feed side expose the split pair.
                    _ => SourceVoltage::Split,
                });
            }
            _ => {}
        }
        for key in upstream_ports(comp) {
            for conn in graph.connections_at(id, key) {
                if let Some(far) = conn.other_end(id) {
                    queue.push((far.component, far.port.clone()));
                }
            }
        }
    }
    None
}

/// Ports through which a component is fed from upstream.
fn upstream_ports(comp: &Component) -> Vec<&'static str> {
    match comp.kind {
        ComponentKind::AcLoad => vec!["plug"],
        ComponentKind::AcOutlet => vec!["input"],
        ComponentKind::DoubleVoltageHub => vec!["input"],
        ComponentKind::BreakerPanel => vec!["main"],
        ComponentKind::SpiderBox => vec!["input"],
        ComponentKind::AcBreaker | ComponentKind::DcBreaker => vec!["line"],
        ComponentKind::Combiner | ComponentKind::SolarCombiner => vec!["out"],
        _ => vec![],
    }
}

/// Collects the switched-on AC loads fed from a port, walking through
/// outlets (including daisy chains), split-phase hubs, combiner legs with
/// closed leg breakers, nested breakers that are closed, and panel/spider
/// box circuits that are closed. Loads must be voltage-compatible with the
/// circuit.
pub fn downstream_loads(
    graph: &CircuitGraph,
    start: ComponentId,
    start_port: &str,
    circuit_voltage: f32,
    closed: &ClosedFn,
    load_on: &LoadOnFn,
) -> Vec<ComponentId> {
    let mut queue: Vec<(ComponentId, String)> = Vec::new();
    for conn in graph.connections_at(start, start_port) {
        if let Some(far) = conn.other_end(start) {
            queue.push((far.component, far.port.clone()));
        }
    }
    let mut visited = BTreeSet::new();
    visited.insert(start);
    collect_loads(graph, queue, visited, circuit_voltage, closed, load_on)
}

/// Like [`downstream_loads`] but starting on the far side of a wire: the
/// walk enters at `(component, port)` directly. Used by power flow to
/// price one branch at a time.
pub fn loads_from_entry(
    graph: &CircuitGraph,
    component: ComponentId,
    port: &str,
    circuit_voltage: f32,
    closed: &ClosedFn,
    load_on: &LoadOnFn,
) -> Vec<ComponentId> {
    collect_loads(
        graph,
        vec![(component, port.to_string())],
        BTreeSet::new(),
        circuit_voltage,
        closed,
        load_on,
    )
}

fn collect_loads(
    graph: &CircuitGraph,
    mut queue: Vec<(ComponentId, String)>,
    mut visited: BTreeSet<ComponentId>,
    circuit_voltage: f32,
    closed: &ClosedFn,
    load_on: &LoadOnFn,
) -> Vec<ComponentId> {
    let mut found: Vec<ComponentId> = Vec::new();

    while let Some((id, arrived_at)) = queue.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(comp) = graph.component(id) else {
            continue;
        };
        match comp.kind {
            ComponentKind::AcLoad => {
                if load_on(id) && load_voltage_matches(comp.specs.voltage, circuit_voltage) {
                    found.push(id);
                }
            }
            ComponentKind::AcOutlet | ComponentKind::DoubleVoltageHub => {
                // Pass through every port; outlets may daisy-chain
                // input-to-input, so the arrival port itself also fans out.
                // The visited set stops the walk from doubling back.
                for key in comp.ports.keys() {
                    push_far_ends(graph, id, key, &mut queue);
                }
            }
            ComponentKind::AcBreaker => {
                if arrived_at == "line" && closed(id, None) {
                    push_far_ends(graph, id, "load", &mut queue);
                }
            }
            ComponentKind::BreakerPanel | ComponentKind::SpiderBox => {
                let fed_from = if comp.kind == ComponentKind::BreakerPanel {
                    "main"
                } else {
                    "input"
                };
                if arrived_at == fed_from {
                    for i in 0..comp.circuit_count() {
                        if closed(id, Some(i))
                            && let Some(out) = comp.circuit_output_port(Some(i))
                        {
                            push_far_ends(graph, id, &out, &mut queue);
                        }
                    }
                }
            }
            ComponentKind::Combiner | ComponentKind::SolarCombiner => {
                // An open leg breaker isolates the arrival leg entirely.
                let keys = leg_keys(comp);
                let arrival_open = keys
                    .iter()
                    .position(|k| k == &arrived_at)
                    .is_some_and(|i| !leg_closed(comp, i));
                if !arrival_open {
                    for (i, key) in keys.iter().enumerate() {
                        if key != &arrived_at && leg_closed(comp, i) {
                            push_far_ends(graph, id, key, &mut queue);
                        }
                    }
                    if arrived_at != "out" {
                        push_far_ends(graph, id, "out", &mut queue);
                    }
                }
            }
            _ => {}
        }
    }
    found.sort();
    found
}

fn push_far_ends(
    graph: &CircuitGraph,
    id: ComponentId,
    key: &str,
    queue: &mut Vec<(ComponentId, String)>,
) {
    for conn in graph.connections_at(id, key) {
        if let Some(far) = conn.other_end(id) {
            queue.push((far.component, far.port.clone()));
        }
    }
}

fn leg_keys(comp: &Component) -> Vec<String> {
    let legs = match &comp.state {
        OperationalState::LegBreakers { legs } => legs.len(),
        _ => 0,
    };
    (1..=legs).map(|i| format!("in_{i}")).collect()
}

fn leg_closed(comp: &Component, leg: usize) -> bool {
    match &comp.state {
        OperationalState::LegBreakers { legs } => legs.get(leg).copied().unwrap_or(false),
        _ => false,
    }
}

/// Finds the nearest breaker, breaker panel, or spider box governing a
/// connection, walking toward the sources. Informational only; overload
/// safety uses explicit per-circuit rating checks instead.
pub fn protective_ancestor(graph: &CircuitGraph, connection: ConnectionId) -> Option<ComponentId> {
    let conn = graph.connection(connection)?;
    let mut visited: BTreeSet<ComponentId> = BTreeSet::new();
    let mut queue: Vec<(ComponentId, String)> = vec![
        (conn.source.component, conn.source.port.clone()),
        (conn.target.component, conn.target.port.clone()),
    ];

    while let Some((id, arrived_at)) = queue.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(comp) = graph.component(id) else {
            continue;
        };
        if comp.kind.is_breaker_bearing() && arrived_downstream(comp, &arrived_at) {
            return Some(id);
        }
        for key in upstream_ports(comp) {
            for c in graph.connections_at(id, key) {
                if let Some(far) = c.other_end(id) {
                    queue.push((far.component, far.port.clone()));
                }
            }
        }
    }
    None
}

/// Whether a breaker-bearing component was reached from its protected side.
fn arrived_downstream(comp: &Component, port: &str) -> bool {
    match comp.kind {
        ComponentKind::AcBreaker | ComponentKind::DcBreaker => port == "load",
        ComponentKind::BreakerPanel => port.starts_with("circuit_"),
        ComponentKind::SpiderBox => port.starts_with("outlet_"),
        _ => false,
    }
}

/// One traversed wire on an electrical path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathHop {
    pub connection: ConnectionId,
    /// The component on the far side of the wire, seen from the traversal.
    pub far: ComponentId,
}

/// Generic DC path trace from a port: records every wire crossed, passes
/// through combiners (closed legs only) and DC breakers (closed only), and
/// terminates at panels, batteries, and controllers. The shared `visited`
/// set lets callers trace several start ports without double-tagging.
pub fn trace_electrical_path(
    graph: &CircuitGraph,
    start: ComponentId,
    start_port: &str,
    closed: &ClosedFn,
    visited: &mut BTreeSet<ConnectionId>,
) -> Vec<PathHop> {
    let mut hops: Vec<PathHop> = Vec::new();
    let mut queue: Vec<(ComponentId, String)> = vec![(start, start_port.to_string())];
    let mut seen: BTreeSet<ComponentId> = BTreeSet::new();
    seen.insert(start);

    while let Some((id, port)) = queue.pop() {
        let conns: Vec<ConnectionId> = graph
            .connections_at(id, &port)
            .map(|c| c.id)
            .collect();
        for conn_id in conns {
            if !visited.insert(conn_id) {
                continue;
            }
            let Some(conn) = graph.connection(conn_id) else {
                continue;
            };
            let Some(far) = conn.other_end(id) else {
                continue;
            };
            let far_id = far.component;
            hops.push(PathHop {
                connection: conn_id,
                far: far_id,
            });
            let Some(far_comp) = graph.component(far_id) else {
                continue;
            };
            if far_comp.kind.is_path_terminal() || !seen.insert(far_id) {
                continue;
            }
            match far_comp.kind {
                ComponentKind::DcBreaker => {
                    if closed(far_id, None) {
                        let onward = if far.port == "line" { "load" } else { "line" };
                        queue.push((far_id, onward.to_string()));
                    }
                }
                ComponentKind::Combiner | ComponentKind::SolarCombiner => {
                    // An open leg breaker isolates the arrival leg entirely.
                    let keys = leg_keys(far_comp);
                    let arrival_open = keys
                        .iter()
                        .position(|k| k == &far.port)
                        .is_some_and(|i| !leg_closed(far_comp, i));
                    if !arrival_open {
                        for (i, key) in keys.iter().enumerate() {
                            if key != &far.port && leg_closed(far_comp, i) {
                                queue.push((far_id, key.clone()));
                            }
                        }
                        if far.port != "out" {
                            queue.push((far_id, "out".to_string()));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    hops
}

/// Whether a panel's PV output can reach a controller through the present
/// switch state. Disconnected panels contribute no solar input.
pub fn panel_reaches_controller(
    graph: &CircuitGraph,
    panel: ComponentId,
    closed: &ClosedFn,
) -> bool {
    let mut visited = BTreeSet::new();
    for port in ["pv_pos", "pv_neg"] {
        for hop in trace_electrical_path(graph, panel, port, closed, &mut visited) {
            if graph
                .component(hop.far)
                .is_some_and(|c| c.kind == ComponentKind::Controller)
            {
                return true;
            }
        }
    }
    false
}
