//! The power-flow resolver.
//!
//! Computes, for every wire, whether it is energized, at what wattage /
//! current / voltage, and in which direction. A pure function of the
//! graph, the live switch state, and the environment readings; the engine
//! memoizes the result under a structural [`FlowKey`] and recomputes
//! whenever any input changes.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::CircuitGraph;
use crate::graph::component::{ComponentId, ComponentKind};
use crate::graph::connection::ConnectionId;
use crate::graph::topology::{self, ClosedFn};
use crate::sim::environment::{EnvReadings, closed_predicate};
use crate::sim::state::LiveState;

/// Direction tag for telemetry/rendering. Derived solely from the
/// traversal origin, which is unique per physical role, so conflicting
/// tags on one wire cannot occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    /// AC power flowing from a source toward loads.
    SourceToLoad,
    /// PV positive leg: panel current into the controller.
    PvToController,
    /// PV negative leg: return path (opposite the physical electron flow).
    ControllerToPv,
    /// Battery terminal wires while the bank charges.
    Charging,
    /// Battery terminal wires while the bank discharges.
    Discharging,
}

/// Resolved electrical state of one wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowReading {
    pub watts: f32,
    pub amps: f32,
    pub voltage: f32,
    /// Energized given present switch/breaker state.
    pub is_live: bool,
    pub direction: FlowDirection,
    /// Carrying current that is actually consumed/produced right now, as
    /// opposed to merely energized and idle.
    pub has_active_flow: bool,
}

pub type FlowMap = BTreeMap<ConnectionId, FlowReading>;

/// Structural memoization key: graph versions plus quantized environment
/// readings. Two equal keys guarantee an identical flow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowKey {
    topology: u64,
    switches: u64,
    solar_mw: i64,
    load_mw: i64,
    battery_mw: i64,
    active_loads: usize,
}

impl FlowKey {
    pub fn new(graph: &CircuitGraph, live: &LiveState, env: &EnvReadings) -> Self {
        Self {
            topology: graph.topology_version(),
            switches: graph.switch_version(),
            solar_mw: (env.solar_w * 1000.0) as i64,
            load_mw: (env.load_w * 1000.0) as i64,
            battery_mw: (env.battery_flow_w * 1000.0) as i64,
            active_loads: live.load_states.values().filter(|on| **on).count(),
        }
    }
}

fn safe_amps(watts: f32, voltage: f32) -> f32 {
    if voltage > 0.0 { watts / voltage } else { 0.0 }
}

/// Computes the full flow map. Wires with no path to any source are
/// simply absent. The caller (engine) runs the protection check on the
/// result so trip decisions always see a complete snapshot.
pub fn compute_flow(graph: &CircuitGraph, live: &LiveState, env: &EnvReadings) -> FlowMap {
    let mut flow = FlowMap::new();
    let closed = closed_predicate(graph, live);

    for controller in graph.components_of_kind(ComponentKind::Controller) {
        let has_dc_side = graph.connections_at(controller.id, "pv_pos").next().is_some()
            || graph.connections_at(controller.id, "batt_pos").next().is_some();
        if !has_dc_side {
            continue;
        }

        // AC output side: energize downstream through breakers, panels,
        // hubs, and outlet chains.
        energize_ac(graph, live, controller.id, "ac_out", controller.specs.voltage, &closed, &mut flow);

        // PV side: split solar across the connected positive legs and tag
        // the whole path back to the panels.
        let system_v = dc_system_voltage(graph, controller.id, &closed);
        let legs = graph.connections_at(controller.id, "pv_pos").count().max(1) as f32;
        let per_leg = env.solar_w / legs;
        let mut visited = BTreeSet::new();
        tag_dc_path(
            graph,
            controller.id,
            "pv_pos",
            per_leg,
            system_v,
            FlowDirection::PvToController,
            &closed,
            &mut visited,
            &mut flow,
        );
        tag_dc_path(
            graph,
            controller.id,
            "pv_neg",
            per_leg,
            system_v,
            FlowDirection::ControllerToPv,
            &closed,
            &mut visited,
            &mut flow,
        );
    }

    // Battery terminals: live whenever the instantaneous battery flow is
    // non-zero, split across banks by capacity share.
    if env.battery_flow_w != 0.0 {
        let direction = if env.battery_flow_w > 0.0 {
            FlowDirection::Charging
        } else {
            FlowDirection::Discharging
        };
        let total_capacity: f32 = live
            .battery_soc
            .keys()
            .filter_map(|id| graph.component(*id))
            .map(|c| c.specs.capacity_wh)
            .sum();
        for id in live.battery_soc.keys() {
            let Some(battery) = graph.component(*id) else {
                continue;
            };
            let share = if total_capacity > 0.0 {
                battery.specs.capacity_wh / total_capacity
            } else {
                0.0
            };
            let watts = env.battery_flow_w.abs() * share;
            let mut visited = BTreeSet::new();
            for port in ["pos", "neg"] {
                tag_dc_path(
                    graph,
                    *id,
                    port,
                    watts,
                    battery.specs.voltage,
                    direction,
                    &closed,
                    &mut visited,
                    &mut flow,
                );
            }
        }
    }

    flow
}

/// Tags every wire on a DC path (through combiners and closed DC
/// breakers) with the same wattage, voltage, and direction.
#[expect(clippy::too_many_arguments)]
fn tag_dc_path(
    graph: &CircuitGraph,
    start: ComponentId,
    port: &str,
    watts: f32,
    voltage: f32,
    direction: FlowDirection,
    closed: &ClosedFn,
    visited: &mut BTreeSet<ConnectionId>,
    flow: &mut FlowMap,
) {
    for hop in topology::trace_electrical_path(graph, start, port, closed, visited) {
        flow.insert(
            hop.connection,
            FlowReading {
                watts,
                amps: safe_amps(watts, voltage),
                voltage,
                is_live: true,
                direction,
                has_active_flow: watts > 0.0,
            },
        );
    }
}

/// Nominal DC system voltage of a controller: the voltage of the first
/// battery bank reachable from its battery terminals, defaulting to 48V.
fn dc_system_voltage(graph: &CircuitGraph, controller: ComponentId, closed: &ClosedFn) -> f32 {
    let mut visited = BTreeSet::new();
    for port in ["batt_pos", "batt_neg"] {
        for hop in topology::trace_electrical_path(graph, controller, port, closed, &mut visited) {
            if let Some(comp) = graph.component(hop.far)
                && comp.kind.is_battery()
            {
                return comp.specs.voltage;
            }
        }
    }
    48.0
}

/// Energizes the AC side outward from a source port. Each wire is priced
/// with the draw of the switched-on loads beyond it, which also yields
/// `has_active_flow` directly: a wire is active exactly when some
/// downstream consumer is on.
fn energize_ac(
    graph: &CircuitGraph,
    live: &LiveState,
    source: ComponentId,
    source_port: &str,
    voltage: f32,
    closed: &ClosedFn,
    flow: &mut FlowMap,
) {
    let load_on = |id: ComponentId| live.load_on(id);
    let mut visited: BTreeSet<ConnectionId> = BTreeSet::new();
    let mut queue: Vec<(ComponentId, String, f32)> =
        vec![(source, source_port.to_string(), voltage)];

    while let Some((id, port, volts)) = queue.pop() {
        let conns: Vec<ConnectionId> = graph.connections_at(id, &port).map(|c| c.id).collect();
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
            let Some(far_comp) = graph.component(far.component) else {
                continue;
            };

            // Price the branch beyond this wire.
            let watts = match far_comp.kind {
                ComponentKind::AcLoad => {
                    if load_on(far.component)
                        && topology::load_voltage_matches(far_comp.specs.voltage, volts)
                    {
                        far_comp.specs.watts
                    } else {
                        0.0
                    }
                }
                _ => topology::loads_from_entry(
                    graph,
                    far.component,
                    &far.port,
                    volts,
                    closed,
                    &load_on,
                )
                .iter()
                .filter_map(|l| graph.component(*l))
                .map(|l| l.specs.watts)
                .sum(),
            };
            flow.insert(
                conn_id,
                FlowReading {
                    watts,
                    amps: safe_amps(watts, volts),
                    voltage: volts,
                    is_live: true,
                    direction: FlowDirection::SourceToLoad,
                    has_active_flow: watts > 0.0,
                },
            );

            // Continue downstream, gated by breakers.
            let far_id = far.component;
            match far_comp.kind {
                ComponentKind::AcBreaker => {
                    if far.port == "line" && closed(far_id, None) {
                        queue.push((far_id, "load".to_string(), volts));
                    }
                }
                ComponentKind::BreakerPanel if far.port == "main" => {
                    for i in 0..far_comp.circuit_count() {
                        if closed(far_id, Some(i)) {
                            queue.push((far_id, format!("circuit_{}", i + 1), volts));
                        }
                    }
                }
                ComponentKind::SpiderBox if far.port == "input" => {
                    for i in 0..far_comp.circuit_count() {
                        if closed(far_id, Some(i)) {
                            queue.push((far_id, format!("outlet_{}", i + 1), volts));
                        }
                    }
                }
                ComponentKind::DoubleVoltageHub if far.port == "input" => {
                    queue.push((far_id, "out_120".to_string(), 120.0));
                    queue.push((far_id, "out_240".to_string(), 240.0));
                }
                ComponentKind::AcOutlet => {
                    // Outlets pass through every port and may daisy-chain
                    // input-to-input; visited wires stop the walk from
                    // doubling back.
                    for key in far_comp.ports.keys() {
                        queue.push((far_id, key.clone(), volts));
                    }
                }
                _ => {}
            }
        }
    }
}
