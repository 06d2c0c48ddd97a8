//! Trigger/action automation rules.
//!
//! Every enabled rule is evaluated once per tick against the current
//! clock, battery, and solar readings. A rule fires only on the tick its
//! condition turns true, not on every tick the condition holds, so a
//! sunset window crossed one minute at a time acts exactly once. A short
//! simulated-time debounce additionally holds rules whose condition
//! re-crosses rapidly (a load toggled off drops solar below the threshold
//! that turns it back on) so feedback loops cannot oscillate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::CircuitGraph;
use crate::graph::component::{ComponentId, ComponentKind};
use crate::sim::clock::MINUTES_PER_DAY;
use crate::sim::environment::EnvReadings;
use crate::sim::state::{CircuitRef, LiveState};

/// Half-width of the `Time` trigger window, simulated minutes.
const TIME_WINDOW_MIN: f32 = 2.0;
/// Half-width of the sunrise/sunset windows, simulated minutes.
const SUN_WINDOW_MIN: f32 = 10.0;
const SUNRISE_MIN: f32 = 6.0 * 60.0;
const SUNSET_MIN: f32 = 18.0 * 60.0;
/// Minimum simulated minutes between two firings of the same rule.
const DEBOUNCE_MIN: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires within a +/- 2 minute window of the target minute of day.
    Time { minute: f32 },
    /// Fires while the clock is in [start, end), wrapping past midnight
    /// when start > end.
    TimeRange { start: f32, end: f32 },
    /// Battery state of charge threshold, percent.
    BatteryBelow { pct: f32 },
    BatteryAbove { pct: f32 },
    /// Effective solar output threshold, watts.
    SolarBelow { watts: f32 },
    SolarAbove { watts: f32 },
    /// Fires within +/- 10 minutes of 06:00 / 18:00.
    Sunrise,
    Sunset,
}

/// Shortest distance between two minutes-of-day, across midnight.
fn circular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(MINUTES_PER_DAY);
    d.min(MINUTES_PER_DAY - d)
}

impl Trigger {
    pub fn matches(
        &self,
        minutes_of_day: f32,
        battery_pct: f32,
        solar_w: f32,
    ) -> bool {
        match *self {
            Trigger::Time { minute } => {
                circular_distance(minutes_of_day, minute) <= TIME_WINDOW_MIN
            }
            Trigger::TimeRange { start, end } => {
                if start <= end {
                    minutes_of_day >= start && minutes_of_day < end
                } else {
                    minutes_of_day >= start || minutes_of_day < end
                }
            }
            Trigger::BatteryBelow { pct } => battery_pct < pct,
            Trigger::BatteryAbove { pct } => battery_pct > pct,
            Trigger::SolarBelow { watts } => solar_w < watts,
            Trigger::SolarAbove { watts } => solar_w > watts,
            Trigger::Sunrise => circular_distance(minutes_of_day, SUNRISE_MIN) <= SUN_WINDOW_MIN,
            Trigger::Sunset => circular_distance(minutes_of_day, SUNSET_MIN) <= SUN_WINDOW_MIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchOp {
    TurnOn,
    TurnOff,
    Toggle,
}

/// What a firing rule acts on: an explicit component list, or every
/// component of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Components(Vec<ComponentId>),
    Kind(ComponentKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    pub enabled: bool,
    pub trigger: Trigger,
    pub op: SwitchOp,
    pub target: Target,
    /// Monotonic simulated minutes at last firing; not persisted.
    #[serde(skip)]
    pub last_fired: Option<f64>,
    /// Whether the trigger matched on the previous evaluation; firing
    /// happens on the false-to-true edge. Not persisted.
    #[serde(skip)]
    pub was_matching: bool,
}

impl AutomationRule {
    pub fn new(id: RuleId, name: impl Into<String>, trigger: Trigger, op: SwitchOp, target: Target) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            trigger,
            op,
            target,
            last_fired: None,
            was_matching: false,
        }
    }
}

fn apply_to_component(graph: &CircuitGraph, live: &mut LiveState, id: ComponentId, op: SwitchOp) {
    let Some(comp) = graph.component(id) else {
        return;
    };
    if comp.kind.is_breaker_bearing() {
        let key = CircuitRef::breaker(id);
        if let Some(state) = live.breakers.get_mut(&key) {
            state.is_closed = match op {
                SwitchOp::TurnOn => true,
                SwitchOp::TurnOff => false,
                SwitchOp::Toggle => !state.is_closed,
            };
        }
    } else {
        let on = live.load_on(id);
        let next = match op {
            SwitchOp::TurnOn => true,
            SwitchOp::TurnOff => false,
            SwitchOp::Toggle => !on,
        };
        live.load_states.insert(id, next);
    }
}

/// Evaluates every rule once and applies the actions of those that fire.
/// Returns the fired rule ids. A rule fires when its trigger goes from
/// not-matching to matching; ticks on which the condition merely keeps
/// holding do nothing. `total_minutes` is the clock's monotonic counter,
/// immune to the midnight wrap, which makes the debounce correct across
/// day boundaries.
pub fn evaluate(
    rules: &mut [AutomationRule],
    graph: &CircuitGraph,
    live: &mut LiveState,
    readings: &EnvReadings,
    minutes_of_day: f32,
    total_minutes: f64,
) -> Vec<RuleId> {
    let battery_pct = live.weighted_soc(graph) * 100.0;
    let mut fired = Vec::new();

    for rule in rules.iter_mut() {
        if !rule.enabled {
            continue;
        }
        let matching = rule.trigger.matches(minutes_of_day, battery_pct, readings.solar_w);
        let rising_edge = matching && !rule.was_matching;
        rule.was_matching = matching;
        if !rising_edge {
            continue;
        }
        if let Some(last) = rule.last_fired
            && total_minutes - last < DEBOUNCE_MIN
        {
            continue;
        }

        let targets: Vec<ComponentId> = match &rule.target {
            Target::Components(ids) => ids.clone(),
            Target::Kind(kind) => graph.components_of_kind(*kind).map(|c| c.id).collect(),
        };
        for id in targets {
            apply_to_component(graph, live, id, rule.op);
        }
        debug!(rule = %rule.name, "automation rule fired");
        rule.last_fired = Some(total_minutes);
        fired.push(rule.id);
    }

    fired
}
