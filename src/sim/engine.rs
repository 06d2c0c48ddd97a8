//! The simulation engine.
//!
//! Owns the circuit graph, the clock, the automation rules, and the
//! transient live state, and runs the tick pipeline: environment ->
//! power flow -> protection -> automation -> resources. Single-threaded
//! and cooperative: every tick runs to completion before the next one,
//! and a paused clock simply yields zero-length ticks.

use tracing::{debug, info};

use crate::error::GraphError;
use crate::graph::CircuitGraph;
use crate::graph::component::{Component, ComponentId};
use crate::graph::connection::ConnectionId;
use crate::sim::automation::{self, AutomationRule, RuleId, SwitchOp, Target, Trigger};
use crate::sim::clock::SimClock;
use crate::sim::environment::{self, EnvReadings, EnvironmentConfig};
use crate::sim::power_flow::{self, FlowKey, FlowMap};
use crate::sim::protection;
use crate::sim::resource;
use crate::sim::state::{CircuitRef, LiveState};

/// What one tick did, for observers.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Simulated minutes the tick covered. Zero while paused or stopped.
    pub advanced_min: f32,
    pub readings: EnvReadings,
    /// Circuits that tripped this tick, including the re-check after the
    /// first trip batch.
    pub tripped: Vec<CircuitRef>,
    pub fired_rules: Vec<RuleId>,
}

pub struct SimEngine {
    graph: CircuitGraph,
    clock: SimClock,
    env: EnvironmentConfig,
    rules: Vec<AutomationRule>,
    next_rule: u64,
    live: Option<LiveState>,
    last_readings: EnvReadings,
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new(CircuitGraph::new())
    }
}

impl SimEngine {
    pub fn new(graph: CircuitGraph) -> Self {
        Self {
            graph,
            clock: SimClock::new(),
            env: EnvironmentConfig::default(),
            rules: Vec::new(),
            next_rule: 1,
            live: None,
            last_readings: EnvReadings::default(),
        }
    }

    pub fn with_environment(mut self, env: EnvironmentConfig) -> Self {
        self.env = env;
        self
    }

    // --- tick pipeline ---

    /// Runs one tick given elapsed real seconds. A no-op unless live mode
    /// is active and the clock is playing.
    pub fn tick(&mut self, elapsed_secs: f32) -> TickReport {
        let Some(live) = self.live.as_mut() else {
            return TickReport::default();
        };

        let dt_min = self.clock.tick(elapsed_secs);
        let readings =
            environment::advance(&self.graph, live, &self.env, self.clock.minutes(), dt_min);
        self.last_readings = readings;

        Self::refresh_flow(&self.graph, live, &readings);

        // Protection sees the resolved snapshot. After a trip batch the
        // flow is recomputed and the pass re-run exactly once, so a trip
        // that unloads a sibling circuit settles within the tick.
        let mut tripped = Self::run_protection(&self.graph, live);
        if !tripped.is_empty() {
            live.invalidate_flow();
            Self::refresh_flow(&self.graph, live, &readings);
            tripped.extend(Self::run_protection(&self.graph, live));
        }

        let fired_rules = automation::evaluate(
            &mut self.rules,
            &self.graph,
            live,
            &readings,
            self.clock.minutes(),
            self.clock.total_minutes(),
        );
        if !fired_rules.is_empty() {
            // Rebuild the snapshot in the same tick so queries before the
            // next one already see the switches the rules just threw.
            live.invalidate_flow();
            Self::refresh_flow(&self.graph, live, &readings);
        }

        resource::advance(&mut self.graph, live, dt_min);

        TickReport {
            advanced_min: dt_min,
            readings,
            tripped,
            fired_rules,
        }
    }

    fn refresh_flow(graph: &CircuitGraph, live: &mut LiveState, readings: &EnvReadings) {
        let key = FlowKey::new(graph, live, readings);
        if live.flow_key != Some(key) {
            live.flow = power_flow::compute_flow(graph, live, readings);
            live.flow_key = Some(key);
            debug!(wires = live.flow.len(), "power flow recomputed");
        }
    }

    /// Recomputes the live snapshot after a command invalidated it, so
    /// `flow()` between ticks never serves a stale or empty map. Uses the
    /// most recent readings; a no-op outside live mode.
    fn refresh_live(&mut self) {
        if let Some(live) = self.live.as_mut() {
            Self::refresh_flow(&self.graph, live, &self.last_readings);
        }
    }

    fn run_protection(graph: &CircuitGraph, live: &mut LiveState) -> Vec<CircuitRef> {
        // The flow map is lent out for the duration of the pass.
        let flow = std::mem::take(&mut live.flow);
        let tripped = protection::check_tripping(graph, live, &flow);
        live.flow = flow;
        tripped
    }

    // --- live mode ---

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Enters live mode: fresh transient state seeded from the manual
    /// switches, clock total zeroed, clock playing.
    pub fn start_live(&mut self) {
        info!("live mode started");
        self.live = Some(LiveState::start(&self.graph));
        self.clock.reset(self.clock.minutes());
        self.clock.play();
    }

    /// Leaves live mode, discarding all transient state.
    pub fn stop_live(&mut self) {
        info!("live mode stopped");
        self.live = None;
        self.clock.pause();
        self.last_readings = EnvReadings::default();
    }

    // --- graph commands (valid in and out of live mode) ---

    pub fn add_component(&mut self, component: Component) -> ComponentId {
        let id = self.graph.add_component(component);
        if let Some(live) = self.live.as_mut() {
            live.adopt_component(&self.graph, id);
            live.invalidate_flow();
        }
        self.refresh_live();
        id
    }

    pub fn remove_component(&mut self, id: ComponentId) -> Result<(), GraphError> {
        self.graph.remove_component(id)?;
        if let Some(live) = self.live.as_mut() {
            live.forget_component(id);
            live.invalidate_flow();
        }
        self.refresh_live();
        Ok(())
    }

    pub fn add_connection(
        &mut self,
        a: ComponentId,
        port_a: &str,
        b: ComponentId,
        port_b: &str,
    ) -> Result<ConnectionId, GraphError> {
        let id = self.graph.add_connection(a, port_a, b, port_b)?;
        if let Some(live) = self.live.as_mut() {
            live.invalidate_flow();
        }
        self.refresh_live();
        Ok(id)
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<(), GraphError> {
        self.graph.remove_connection(id)?;
        if let Some(live) = self.live.as_mut() {
            live.invalidate_flow();
        }
        self.refresh_live();
        Ok(())
    }

    // --- switch commands ---

    /// Toggles a load (or producer). Only meaningful in live mode.
    pub fn toggle_load(&mut self, id: ComponentId) {
        if let Some(live) = self.live.as_mut() {
            let on = live.load_on(id);
            live.load_states.insert(id, !on);
            live.invalidate_flow();
        }
        self.refresh_live();
    }

    /// Toggles a protective circuit: the live overlay in live mode, the
    /// manual switch otherwise.
    pub fn toggle_circuit(&mut self, circuit: CircuitRef) {
        match self.live.as_mut() {
            Some(live) => {
                if let Some(state) = live.breakers.get_mut(&circuit) {
                    state.is_closed = !state.is_closed;
                }
                live.invalidate_flow();
            }
            None => {
                if let Some(comp) = self.graph.component_mut(circuit.component) {
                    comp.toggle_manual_switch(circuit.circuit);
                }
            }
        }
        self.refresh_live();
    }

    pub fn reset_breaker(&mut self, circuit: CircuitRef) {
        if let Some(live) = self.live.as_mut() {
            protection::reset_breaker(live, circuit);
            live.invalidate_flow();
        }
        self.refresh_live();
    }

    pub fn reset_all_breakers(&mut self) {
        if let Some(live) = self.live.as_mut() {
            protection::reset_all(live);
            live.invalidate_flow();
        }
        self.refresh_live();
    }

    // --- clock commands ---

    pub fn play(&mut self) {
        self.clock.play();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn seek(&mut self, minutes: f32) {
        self.clock.seek(minutes);
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.clock.set_speed(speed);
    }

    // --- automation rule commands ---

    pub fn add_rule(
        &mut self,
        name: impl Into<String>,
        trigger: Trigger,
        op: SwitchOp,
        target: Target,
    ) -> RuleId {
        let id = RuleId(self.next_rule);
        self.next_rule += 1;
        self.rules
            .push(AutomationRule::new(id, name, trigger, op, target));
        id
    }

    pub fn set_rule_enabled(&mut self, id: RuleId, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn remove_rule(&mut self, id: RuleId) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    // --- query surface ---

    pub fn graph(&self) -> &CircuitGraph {
        &self.graph
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn rules(&self) -> &[AutomationRule] {
        &self.rules
    }

    pub fn live(&self) -> Option<&LiveState> {
        self.live.as_ref()
    }

    /// The current power-flow map, or `None` outside live mode.
    pub fn flow(&self) -> Option<&FlowMap> {
        self.live.as_ref().map(|l| &l.flow)
    }

    /// Readings published by the most recent tick.
    pub fn readings(&self) -> &EnvReadings {
        &self.last_readings
    }

    pub fn formatted_time(&self) -> String {
        self.clock.formatted()
    }

    /// Capacity-weighted battery state of charge, or `None` outside live
    /// mode.
    pub fn battery_soc(&self) -> Option<f32> {
        self.live.as_ref().map(|l| l.weighted_soc(&self.graph))
    }

    // --- persistence hooks ---

    pub(crate) fn restore(
        graph: CircuitGraph,
        rules: Vec<AutomationRule>,
        clock_minutes: f32,
        battery_soc: std::collections::BTreeMap<ComponentId, f32>,
    ) -> Self {
        let next_rule = rules.iter().map(|r| r.id.0 + 1).max().unwrap_or(1);
        let mut engine = Self::new(graph);
        engine.rules = rules;
        engine.next_rule = next_rule;
        engine.clock.reset(clock_minutes);
        if !battery_soc.is_empty() {
            engine.start_live();
            engine.clock.pause();
            if let Some(live) = engine.live.as_mut() {
                for (id, soc) in battery_soc {
                    if live.battery_soc.contains_key(&id) {
                        live.battery_soc.insert(id, soc);
                    }
                }
            }
        }
        engine
    }
    /// Mutable access for scenario setup in tests and the CLI runner.
    pub fn graph_mut(&mut self) -> &mut CircuitGraph {
        if let Some(live) = self.live.as_mut() {
            live.invalidate_flow();
        }
        &mut self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::component::ComponentKind;

    /// Panel, controller, battery, a breaker-protected outlet circuit,
    /// and a lamp.
    fn cabin() -> (SimEngine, ComponentId, ComponentId) {
        let mut engine = SimEngine::new(CircuitGraph::new());
        let panel = engine.add_component(Component::panel(400.0));
        let controller = engine.add_component(Component::controller(120.0));
        let battery = engine.add_component(Component::battery(48.0, 4800.0));
        let breaker = engine.add_component(Component::ac_breaker(20.0));
        let outlet = engine.add_component(Component::ac_outlet(120.0));
        let lamp = engine.add_component(Component::ac_load(100.0, 120.0));
        engine.add_connection(panel, "pv_pos", controller, "pv_pos").unwrap();
        engine.add_connection(panel, "pv_neg", controller, "pv_neg").unwrap();
        engine.add_connection(controller, "batt_pos", battery, "pos").unwrap();
        engine.add_connection(controller, "batt_neg", battery, "neg").unwrap();
        engine.add_connection(controller, "ac_out", breaker, "line").unwrap();
        engine.add_connection(breaker, "load", outlet, "input").unwrap();
        engine.add_connection(lamp, "plug", outlet, "load_1").unwrap();
        (engine, lamp, breaker)
    }

    #[test]
    fn tick_is_noop_outside_live_mode() {
        let (mut engine, _, _) = cabin();
        let report = engine.tick(1.0);
        assert_eq!(report.advanced_min, 0.0);
        assert!(engine.flow().is_none());
    }

    #[test]
    fn tick_advances_and_charges_at_noon() {
        let (mut engine, _, _) = cabin();
        engine.start_live();
        engine.seek(12.0 * 60.0);
        engine.set_speed(60.0);

        let report = engine.tick(1.0);
        assert_eq!(report.advanced_min, 60.0);
        assert!(report.readings.solar_w > 0.0);
        assert!(engine.battery_soc().unwrap() > 0.5);
    }

    #[test]
    fn flow_cache_survives_identical_ticks() {
        let (mut engine, _, _) = cabin();
        engine.start_live();
        // Midnight, no solar, nothing on: two ticks produce the same key.
        engine.seek(0.0);
        engine.tick(1.0);
        let key = engine.live().unwrap().flow_key;
        engine.tick(1.0);
        assert_eq!(engine.live().unwrap().flow_key, key);
        assert!(key.is_some());
    }

    #[test]
    fn toggling_a_load_refreshes_the_flow_snapshot() {
        let (mut engine, lamp, _) = cabin();
        engine.start_live();
        engine.tick(1.0);
        let key = engine.live().unwrap().flow_key;
        assert!(key.is_some());

        engine.toggle_load(lamp);
        let plug = engine
            .graph()
            .connections()
            .find(|c| c.touches(lamp, "plug"))
            .unwrap()
            .id;
        let live = engine.live().unwrap();
        assert!(live.flow_key.is_some(), "snapshot rebuilt, not left empty");
        assert_ne!(live.flow_key, key);
        assert!(
            live.flow.get(&plug).is_some_and(|r| r.has_active_flow),
            "snapshot already reflects the toggled load"
        );
    }

    #[test]
    fn overload_trips_within_one_tick() {
        let (mut engine, _, breaker) = cabin();
        let outlet2 = engine.add_component(Component::ac_outlet(120.0));
        let heater = engine.add_component(Component::ac_load(2500.0, 120.0));
        // Daisy-chain a second outlet onto the protected circuit.
        let graph = engine.graph();
        let first_outlet = graph
            .components_of_kind(ComponentKind::AcOutlet)
            .map(|c| c.id)
            .min()
            .unwrap();
        engine
            .add_connection(first_outlet, "load_2", outlet2, "input")
            .unwrap();
        engine.add_connection(heater, "plug", outlet2, "load_1").unwrap();

        engine.start_live();
        engine.toggle_load(heater);
        let report = engine.tick(1.0);
        assert_eq!(report.tripped, vec![CircuitRef::breaker(breaker)]);
        assert!(!engine.live().unwrap().load_on(heater));
    }

    #[test]
    fn sunset_rule_fires_once_and_refreshes_the_flow() {
        let (mut engine, lamp, _) = cabin();
        engine.add_rule(
            "evening light",
            Trigger::Sunset,
            SwitchOp::TurnOn,
            Target::Components(vec![lamp]),
        );
        engine.start_live();
        engine.seek(18.0 * 60.0);
        engine.set_speed(1.0);

        let report = engine.tick(1.0); // one sim-minute
        assert_eq!(report.fired_rules.len(), 1);
        assert!(engine.live().unwrap().load_on(lamp));

        // The firing rebuilt the snapshot within the tick: the lamp's
        // wire is already active without waiting for the next tick.
        let plug = engine
            .graph()
            .connections()
            .find(|c| c.touches(lamp, "plug"))
            .unwrap()
            .id;
        let live = engine.live().unwrap();
        assert!(live.flow_key.is_some());
        assert!(live.flow.get(&plug).is_some_and(|r| r.has_active_flow));

        // Still inside the sunset window: the condition keeps holding,
        // so there is no new edge to fire on.
        let report = engine.tick(1.0);
        assert!(report.fired_rules.is_empty());
    }

    #[test]
    fn stop_live_discards_transient_state() {
        let (mut engine, lamp, _) = cabin();
        engine.start_live();
        engine.toggle_load(lamp);
        engine.stop_live();
        assert!(!engine.is_live());
        assert!(engine.flow().is_none());

        engine.start_live();
        assert!(!engine.live().unwrap().load_on(lamp), "fresh state on restart");
    }

    #[test]
    fn components_added_during_live_mode_are_adopted() {
        let (mut engine, _, _) = cabin();
        engine.start_live();
        let battery = engine.add_component(Component::battery(48.0, 2400.0));
        assert!(engine.live().unwrap().battery_soc.contains_key(&battery));

        engine.remove_component(battery).unwrap();
        assert!(!engine.live().unwrap().battery_soc.contains_key(&battery));
    }

    #[test]
    fn producer_runs_alongside_the_battery_model() {
        let (mut engine, _, _) = cabin();
        let producer = engine.add_component(Component::producer(2.0, 100.0));
        let tank = engine.add_component(Component::container(500.0));
        engine.add_connection(producer, "pipe", tank, "pipe").unwrap();

        engine.start_live();
        engine.toggle_load(producer);
        engine.set_speed(60.0);
        engine.tick(1.0); // one sim-hour

        let stored = match &engine.graph().component(tank).unwrap().state {
            crate::graph::component::OperationalState::Container { stored } => *stored,
            _ => unreachable!(),
        };
        assert_eq!(stored, 120.0);
    }

    #[test]
    fn flow_memo_survives_producer_ticks() {
        let (mut engine, _, _) = cabin();
        let producer = engine.add_component(Component::producer(2.0, 100.0));
        let tank = engine.add_component(Component::container(500.0));
        engine.add_connection(producer, "pipe", tank, "pipe").unwrap();

        engine.start_live();
        engine.seek(0.0); // midnight: readings identical every tick
        engine.toggle_load(producer);
        engine.tick(1.0);
        let key = engine.live().unwrap().flow_key;
        assert!(key.is_some());

        // The tank fills every tick, but storage is not switch state:
        // the memo key must hold and no recompute happen.
        engine.tick(1.0);
        engine.tick(1.0);
        assert_eq!(engine.live().unwrap().flow_key, key);
    }
}
