//! Environmental model and battery integration.
//!
//! Irradiance follows a sinusoidal sunrise→solar-noon→sunset curve scaled
//! by a fixed atmospheric haze factor. Each tick aggregates panel output
//! and load draw, applies the float/derate rule near full charge, and
//! integrates the net power into the batteries proportionally to their
//! capacity share.

use std::f32::consts::PI;

use serde::Deserialize;

use crate::graph::CircuitGraph;
use crate::graph::component::{ComponentId, ComponentKind};
use crate::graph::topology;
use crate::sim::state::{CircuitRef, LiveState, SOC_FLOOR};

/// Weighted-average state of charge at or above which solar output is
/// derated to match demand (charge-controller float behavior).
pub const FLOAT_SOC: f32 = 0.999;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Hour of sunrise (fractional, 0-24).
    pub sunrise_hour: f32,
    /// Hour of sunset (fractional, 0-24).
    pub sunset_hour: f32,
    /// Atmospheric haze factor applied to the daylight sine curve.
    pub haze: f32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            sunrise_hour: 6.0,
            sunset_hour: 18.0,
            haze: 0.95,
        }
    }
}

impl EnvironmentConfig {
    /// Irradiance fraction for a time of day: 0 outside the daylight
    /// window, `sin(pi * t) * haze` inside it, where t sweeps 0..1 from
    /// sunrise to sunset.
    pub fn irradiance(&self, minutes_of_day: f32) -> f32 {
        let hour = minutes_of_day / 60.0;
        if hour < self.sunrise_hour || hour >= self.sunset_hour {
            return 0.0;
        }
        let t = (hour - self.sunrise_hour) / (self.sunset_hour - self.sunrise_hour);
        (PI * t).sin() * self.haze
    }
}

/// Instantaneous readings published to power flow, automation, and
/// telemetry after each environment step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvReadings {
    /// Irradiance fraction (0-1).
    pub irradiance: f32,
    /// Aggregate panel output before derating (W).
    pub solar_possible_w: f32,
    /// Effective solar input after the float/derate rule (W).
    pub solar_w: f32,
    /// Aggregate draw of switched-on loads (W).
    pub load_w: f32,
    /// Net power into (+) or out of (-) the batteries (W), after SOC clamping.
    pub battery_flow_w: f32,
    /// Power curtailed by the float rule right now (W).
    pub derated_w: f32,
}

/// A closed-circuit predicate that prefers the live overlay and falls back
/// to the manual switch for circuits live mode does not track.
pub fn closed_predicate<'a>(
    graph: &'a CircuitGraph,
    live: &'a LiveState,
) -> impl Fn(ComponentId, Option<usize>) -> bool + 'a {
    move |id, circuit| {
        let key = CircuitRef {
            component: id,
            circuit,
        };
        if live.breakers.contains_key(&key) {
            live.circuit_closed(key)
        } else {
            graph
                .component(id)
                .map(|c| c.manual_switch_on(circuit))
                .unwrap_or(false)
        }
    }
}

/// Aggregate rated output of panels that can reach a controller (W),
/// before irradiance scaling.
pub fn connected_panel_watts(graph: &CircuitGraph, live: &LiveState) -> f32 {
    let closed = closed_predicate(graph, live);
    graph
        .components_of_kind(ComponentKind::Panel)
        .filter(|p| topology::panel_reaches_controller(graph, p.id, &closed))
        .map(|p| p.specs.watts)
        .sum()
}

/// Aggregate draw of switched-on AC loads (W).
pub fn active_load_watts(graph: &CircuitGraph, live: &LiveState) -> f32 {
    graph
        .components_of_kind(ComponentKind::AcLoad)
        .filter(|l| live.load_on(l.id))
        .map(|l| l.specs.watts)
        .sum()
}

/// Runs one environment step: derives irradiance for the given time of
/// day, applies the float/derate rule, integrates battery state of charge
/// over `dt_min` simulated minutes, and updates the cumulative energy
/// counters. Pure except for `live`.
pub fn advance(
    graph: &CircuitGraph,
    live: &mut LiveState,
    config: &EnvironmentConfig,
    minutes_of_day: f32,
    dt_min: f32,
) -> EnvReadings {
    let irradiance = config.irradiance(minutes_of_day);
    let solar_possible_w = connected_panel_watts(graph, live) * irradiance;
    let load_w = active_load_watts(graph, live);

    // Float/derate: near full charge, curtail solar to exactly match
    // demand instead of over-charging the batteries.
    let mean_soc = live.weighted_soc(graph);
    let (solar_w, derated_w) = if mean_soc >= FLOAT_SOC && solar_possible_w > load_w {
        (load_w, solar_possible_w - load_w)
    } else {
        (solar_possible_w, 0.0)
    };

    let net_w = solar_w - load_w;
    let dt_hours = dt_min / 60.0;

    // Integrate into the batteries proportionally to capacity share; the
    // per-battery SOC delta is then uniform. Clamp individually.
    let total_capacity: f32 = live
        .battery_soc
        .keys()
        .filter_map(|id| graph.component(*id))
        .map(|c| c.specs.capacity_wh)
        .sum();

    let mut applied_wh = 0.0f32;
    if total_capacity > 0.0 && dt_hours > 0.0 {
        let delta_soc = net_w * dt_hours / total_capacity;
        let ids: Vec<ComponentId> = live.battery_soc.keys().copied().collect();
        for id in ids {
            let capacity = graph
                .component(id)
                .map(|c| c.specs.capacity_wh)
                .unwrap_or(0.0);
            if let Some(soc) = live.battery_soc.get_mut(&id) {
                let before = *soc;
                *soc = (before + delta_soc).clamp(SOC_FLOOR, 1.0);
                applied_wh += (*soc - before) * capacity;
            }
        }
    }
    let battery_flow_w = if dt_hours > 0.0 {
        applied_wh / dt_hours
    } else {
        0.0
    };

    live.possible_wh += (solar_possible_w * dt_min / 60.0) as f64;
    live.captured_wh += (solar_w * dt_min / 60.0) as f64;
    live.derated_wh += (derated_w * dt_min / 60.0) as f64;

    EnvReadings {
        irradiance,
        solar_possible_w,
        solar_w,
        load_w,
        battery_flow_w,
        derated_w,
    }
}
