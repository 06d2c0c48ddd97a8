//! Integration tests for overload protection running through the full
//! engine tick pipeline.

mod common;

use offgrid_sim::graph::CircuitGraph;
use offgrid_sim::graph::component::{Component, ComponentId, ComponentKind};
use offgrid_sim::sim::engine::SimEngine;
use offgrid_sim::sim::state::CircuitRef;

/// Cabin engine with a 2500 W heater daisy-chained behind the kitchen
/// outlet, putting about 20.8 A on the 20 A main breaker when switched on.
fn overloaded_cabin() -> (SimEngine, ComponentId, ComponentId) {
    let mut engine = common::cabin_engine();
    let outlet = common::find_kind(&engine, ComponentKind::AcOutlet);
    let bench = engine.add_component(Component::ac_outlet(120.0));
    let heater = engine.add_component(Component::ac_load(2500.0, 120.0));
    engine.add_connection(outlet, "load_2", bench, "input").unwrap();
    engine.add_connection(heater, "plug", bench, "load_1").unwrap();
    let breaker = common::find_kind(&engine, ComponentKind::AcBreaker);
    (engine, breaker, heater)
}

#[test]
fn overload_trips_the_main_breaker_within_one_tick() {
    let (mut engine, breaker, heater) = overloaded_cabin();
    engine.start_live();
    engine.toggle_load(heater);

    let reports = common::run_minutes(&mut engine, 1);
    assert_eq!(reports[0].tripped, vec![CircuitRef::breaker(breaker)]);

    let live = engine.live().unwrap();
    let state = live.breakers[&CircuitRef::breaker(breaker)];
    assert!(!state.is_closed);
    assert!(state.was_tripped);
    assert!(!live.load_on(heater), "orphaned load forced off");

    // The post-trip flow map no longer energizes anything past the breaker.
    let out_wire = engine
        .graph()
        .connections_at(breaker, "load")
        .next()
        .unwrap()
        .id;
    assert!(engine.flow().unwrap().get(&out_wire).is_none());
}

#[test]
fn rated_load_runs_without_tripping() {
    let mut engine = common::cabin_engine();
    let breaker = common::find_kind(&engine, ComponentKind::AcBreaker);
    let loads = common::find_all(&engine, ComponentKind::AcLoad);

    engine.start_live();
    for id in &loads {
        engine.toggle_load(*id); // lamp + fridge: 210 W, 1.75 A
    }
    let reports = common::run_minutes(&mut engine, 30);
    assert!(reports.iter().all(|r| r.tripped.is_empty()));

    let live = engine.live().unwrap();
    assert!(live.circuit_closed(CircuitRef::breaker(breaker)));
    let flow = engine.flow().unwrap();
    for id in &loads {
        let plug = engine.graph().connections_at(*id, "plug").next().unwrap().id;
        assert!(flow[&plug].has_active_flow);
    }
}

#[test]
fn tripped_breaker_holds_until_reset() {
    let (mut engine, breaker, heater) = overloaded_cabin();
    engine.start_live();
    engine.toggle_load(heater);
    common::run_minutes(&mut engine, 1);

    // Nothing re-trips while the circuit sits open.
    let reports = common::run_minutes(&mut engine, 5);
    assert!(reports.iter().all(|r| r.tripped.is_empty()));
    assert!(
        !engine
            .live()
            .unwrap()
            .circuit_closed(CircuitRef::breaker(breaker))
    );

    engine.reset_breaker(CircuitRef::breaker(breaker));
    let state = engine.live().unwrap().breakers[&CircuitRef::breaker(breaker)];
    assert!(state.is_closed);
    assert!(!state.was_tripped);

    // A modest load runs fine after the reset.
    let lamp = *common::find_all(&engine, ComponentKind::AcLoad)
        .iter()
        .find(|id| **id != heater)
        .unwrap();
    engine.toggle_load(lamp);
    let reports = common::run_minutes(&mut engine, 1);
    assert!(reports[0].tripped.is_empty());
    let plug = engine
        .graph()
        .connections_at(lamp, "plug")
        .next()
        .unwrap()
        .id;
    assert!(engine.flow().unwrap()[&plug].has_active_flow);
}

#[test]
fn branch_circuit_trips_alone_in_the_workshop() {
    let mut engine = common::workshop_engine();
    let panel = common::find_kind(&engine, ComponentKind::BreakerPanel);
    let outlet = common::find_kind(&engine, ComponentKind::AcOutlet);
    let saw = common::find_kind(&engine, ComponentKind::AcLoad);
    // Saw plus heater: 2000 W on a 15 A / 120 V branch circuit.
    let heater = engine.add_component(Component::ac_load(600.0, 120.0));
    engine.add_connection(heater, "plug", outlet, "load_2").unwrap();

    engine.start_live();
    engine.toggle_load(saw);
    engine.toggle_load(heater);
    let reports = common::run_minutes(&mut engine, 1);
    assert_eq!(reports[0].tripped, vec![CircuitRef::branch(panel, 0)]);

    let live = engine.live().unwrap();
    assert!(!live.circuit_closed(CircuitRef::branch(panel, 0)));
    assert!(live.circuit_closed(CircuitRef::branch(panel, 1)), "sibling stays");
    assert!(live.circuit_closed(CircuitRef::breaker(panel)), "main stays");
    assert!(!live.load_on(saw));
    assert!(!live.load_on(heater));
}

#[test]
fn manually_opened_breaker_never_trips() {
    let (mut engine, breaker, heater) = overloaded_cabin();
    engine.start_live();
    engine.toggle_circuit(CircuitRef::breaker(breaker));
    engine.toggle_load(heater);

    let reports = common::run_minutes(&mut engine, 2);
    assert!(reports.iter().all(|r| r.tripped.is_empty()));

    let live = engine.live().unwrap();
    let state = live.breakers[&CircuitRef::breaker(breaker)];
    assert!(!state.is_closed);
    assert!(!state.was_tripped, "opened by hand, not by overload");
    assert!(live.load_on(heater), "switch position kept behind a dead circuit");

    let plug = engine
        .graph()
        .connections_at(heater, "plug")
        .next()
        .unwrap()
        .id;
    assert!(engine.flow().unwrap().get(&plug).is_none());
}

#[test]
fn spider_box_outlet_trips_like_a_panel_circuit() {
    let mut engine = SimEngine::new(CircuitGraph::new());
    let controller = engine.add_component(Component::controller(120.0));
    let battery = engine.add_component(Component::battery(48.0, 4800.0));
    let spider = engine.add_component(Component::spider_box(2, 15.0));
    let heater = engine.add_component(Component::ac_load(2000.0, 120.0));
    let lamp = engine.add_component(Component::ac_load(100.0, 120.0));
    engine.add_connection(controller, "batt_pos", battery, "pos").unwrap();
    engine.add_connection(controller, "batt_neg", battery, "neg").unwrap();
    engine.add_connection(controller, "ac_out", spider, "input").unwrap();
    engine.add_connection(heater, "plug", spider, "outlet_1").unwrap();
    engine.add_connection(lamp, "plug", spider, "outlet_2").unwrap();

    engine.start_live();
    engine.toggle_load(heater); // 16.7 A on outlet 1
    engine.toggle_load(lamp);
    let reports = common::run_minutes(&mut engine, 1);
    assert_eq!(reports[0].tripped, vec![CircuitRef::branch(spider, 0)]);

    let live = engine.live().unwrap();
    assert!(!live.load_on(heater));
    assert!(live.load_on(lamp), "other outlet unaffected");
    assert!(live.circuit_closed(CircuitRef::branch(spider, 1)));
}
