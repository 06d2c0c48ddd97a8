//! TOML-based installation configuration and preset definitions.
//!
//! An installation is a list of named components plus the wires between
//! them, written as `alias.port` endpoint pairs. Parsed configs are
//! validated field-by-field before being built into a [`CircuitGraph`].

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::graph::CircuitGraph;
use crate::graph::component::{Component, ComponentId, ComponentKind};
use crate::sim::environment::EnvironmentConfig;

/// Top-level installation configuration parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallationConfig {
    /// Simulation timing parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Sunrise/sunset model parameters.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// The components of the installation.
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentConfig>,
    /// The wires between component ports.
    #[serde(default, rename = "wire")]
    pub wires: Vec<WireConfig>,
}

/// Simulation timing parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Time of day the clock starts at (fractional hours).
    pub start_hour: f32,
    /// Simulated minutes per real second.
    pub speed: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_hour: 8.0,
            speed: 60.0,
        }
    }
}

/// One component: a unique alias, a kind, and the specs that kind uses.
/// Unused spec fields are simply ignored by the builder.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub name: String,
    pub kind: ComponentKind,
    /// Rated power (panel output, load draw) in watts.
    #[serde(default)]
    pub watts: f32,
    /// Nominal voltage.
    #[serde(default)]
    pub voltage: f32,
    /// Protective rating in amps.
    #[serde(default)]
    pub rating_amps: f32,
    /// Battery capacity in watt-hours.
    #[serde(default)]
    pub capacity_wh: f32,
    /// Branch circuit / input leg count for panels, boxes, and combiners.
    #[serde(default)]
    pub circuits: usize,
    /// Producer output per simulated minute.
    #[serde(default)]
    pub output_per_minute: f32,
    /// Producer/container storage capacity.
    #[serde(default)]
    pub storage_capacity: f32,
}

/// One wire, endpoints written as `alias.port`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireConfig {
    pub from: String,
    pub to: String,
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"component.array.watts"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

fn split_endpoint(endpoint: &str) -> Option<(&str, &str)> {
    endpoint
        .split_once('.')
        .filter(|(name, port)| !name.is_empty() && !port.is_empty())
}

const CABIN_TOML: &str = r#"
[environment]
sunrise_hour = 6.0
sunset_hour = 18.0

[[component]]
name = "array"
kind = "panel"
watts = 400.0

[[component]]
name = "mppt"
kind = "controller"
voltage = 120.0

[[component]]
name = "bank"
kind = "battery"
voltage = 48.0
capacity_wh = 4800.0

[[component]]
name = "main_breaker"
kind = "ac_breaker"
rating_amps = 20.0
voltage = 120.0

[[component]]
name = "kitchen_outlet"
kind = "ac_outlet"
voltage = 120.0

[[component]]
name = "lamp"
kind = "ac_load"
watts = 60.0
voltage = 120.0

[[component]]
name = "fridge"
kind = "ac_load"
watts = 150.0
voltage = 120.0

[[wire]]
from = "array.pv_pos"
to = "mppt.pv_pos"

[[wire]]
from = "array.pv_neg"
to = "mppt.pv_neg"

[[wire]]
from = "mppt.batt_pos"
to = "bank.pos"

[[wire]]
from = "mppt.batt_neg"
to = "bank.neg"

[[wire]]
from = "mppt.ac_out"
to = "main_breaker.line"

[[wire]]
from = "main_breaker.load"
to = "kitchen_outlet.input"

[[wire]]
from = "lamp.plug"
to = "kitchen_outlet.load_1"

[[wire]]
from = "fridge.plug"
to = "kitchen_outlet.load_2"
"#;

const WORKSHOP_TOML: &str = r#"
[environment]
sunrise_hour = 6.5
sunset_hour = 19.0

[simulation]
start_hour = 7.0

[[component]]
name = "array_east"
kind = "panel"
watts = 300.0

[[component]]
name = "array_west"
kind = "panel"
watts = 300.0

[[component]]
name = "roof_combiner"
kind = "solar_combiner"
circuits = 2

[[component]]
name = "pv_disconnect"
kind = "dc_breaker"
rating_amps = 30.0

[[component]]
name = "mppt"
kind = "controller"
voltage = 120.0

[[component]]
name = "bank_a"
kind = "battery"
voltage = 24.0
capacity_wh = 2400.0

[[component]]
name = "bank_b"
kind = "battery"
voltage = 24.0
capacity_wh = 2400.0

[[component]]
name = "panelboard"
kind = "breaker_panel"
circuits = 2
rating_amps = 15.0

[[component]]
name = "bench_outlet"
kind = "ac_outlet"
voltage = 120.0

[[component]]
name = "saw"
kind = "ac_load"
watts = 1400.0
voltage = 120.0

[[component]]
name = "well_pump"
kind = "producer"
output_per_minute = 1.5
storage_capacity = 20.0

[[component]]
name = "cistern"
kind = "container"
storage_capacity = 400.0

[[wire]]
from = "array_east.pv_pos"
to = "roof_combiner.in_1"

[[wire]]
from = "array_west.pv_pos"
to = "roof_combiner.in_2"

[[wire]]
from = "roof_combiner.out"
to = "pv_disconnect.line"

[[wire]]
from = "pv_disconnect.load"
to = "mppt.pv_pos"

[[wire]]
from = "mppt.batt_pos"
to = "bank_a.pos"

[[wire]]
from = "mppt.batt_neg"
to = "bank_a.neg"

[[wire]]
from = "mppt.batt_pos"
to = "bank_b.pos"

[[wire]]
from = "mppt.batt_neg"
to = "bank_b.neg"

[[wire]]
from = "mppt.ac_out"
to = "panelboard.main"

[[wire]]
from = "panelboard.circuit_1"
to = "bench_outlet.input"

[[wire]]
from = "saw.plug"
to = "bench_outlet.load_1"

[[wire]]
from = "well_pump.pipe"
to = "cistern.pipe"
"#;

impl InstallationConfig {
    /// The single-room cabin preset: one panel, one battery bank, one
    /// breaker-protected outlet circuit.
    pub fn cabin() -> Self {
        Self::from_toml_str(CABIN_TOML).expect("preset parses")
    }

    /// The workshop preset: combined PV strings behind a DC disconnect,
    /// two battery banks, a branch-circuit panelboard, and a well pump.
    pub fn workshop() -> Self {
        Self::from_toml_str(WORKSHOP_TOML).expect("preset parses")
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["cabin", "workshop"];

    /// Loads an installation from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "cabin" => Ok(Self::cabin()),
            "workshop" => Ok(Self::workshop()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses an installation from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is
    /// invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "installation".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses an installation from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown
    /// fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.environment.sunrise_hour >= self.environment.sunset_hour {
            errors.push(ConfigError {
                field: "environment.sunrise_hour".into(),
                message: "must be < environment.sunset_hour".into(),
            });
        }
        if self.simulation.speed <= 0.0 {
            errors.push(ConfigError {
                field: "simulation.speed".into(),
                message: "must be > 0".into(),
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for comp in &self.components {
            let field = |suffix: &str| format!("component.{}.{suffix}", comp.name);
            if comp.name.is_empty() {
                errors.push(ConfigError {
                    field: "component.name".into(),
                    message: "must not be empty".into(),
                });
                continue;
            }
            if !seen.insert(comp.name.as_str()) {
                errors.push(ConfigError {
                    field: field("name"),
                    message: "duplicate component name".into(),
                });
            }
            match comp.kind {
                ComponentKind::Panel | ComponentKind::AcLoad => {
                    if comp.watts <= 0.0 {
                        errors.push(ConfigError {
                            field: field("watts"),
                            message: "must be > 0".into(),
                        });
                    }
                }
                ComponentKind::Battery | ComponentKind::SmartBattery => {
                    if comp.capacity_wh <= 0.0 {
                        errors.push(ConfigError {
                            field: field("capacity_wh"),
                            message: "must be > 0".into(),
                        });
                    }
                    if comp.voltage <= 0.0 {
                        errors.push(ConfigError {
                            field: field("voltage"),
                            message: "must be > 0".into(),
                        });
                    }
                }
                ComponentKind::AcBreaker
                | ComponentKind::DcBreaker
                | ComponentKind::BreakerPanel
                | ComponentKind::SpiderBox => {
                    if comp.rating_amps <= 0.0 {
                        errors.push(ConfigError {
                            field: field("rating_amps"),
                            message: "must be > 0".into(),
                        });
                    }
                }
                ComponentKind::Producer => {
                    if comp.output_per_minute <= 0.0 {
                        errors.push(ConfigError {
                            field: field("output_per_minute"),
                            message: "must be > 0".into(),
                        });
                    }
                }
                ComponentKind::Container => {
                    if comp.storage_capacity <= 0.0 {
                        errors.push(ConfigError {
                            field: field("storage_capacity"),
                            message: "must be > 0".into(),
                        });
                    }
                }
                _ => {}
            }
            match comp.kind {
                ComponentKind::BreakerPanel
                | ComponentKind::SpiderBox
                | ComponentKind::Combiner
                | ComponentKind::SolarCombiner
                    if comp.circuits == 0 =>
                {
                    errors.push(ConfigError {
                        field: field("circuits"),
                        message: "must be > 0".into(),
                    });
                }
                _ => {}
            }
        }

        for (i, wire) in self.wires.iter().enumerate() {
            for (label, endpoint) in [("from", &wire.from), ("to", &wire.to)] {
                match split_endpoint(endpoint) {
                    None => errors.push(ConfigError {
                        field: format!("wire[{i}].{label}"),
                        message: format!("\"{endpoint}\" is not \"name.port\""),
                    }),
                    Some((name, _)) if !seen.contains(name) => errors.push(ConfigError {
                        field: format!("wire[{i}].{label}"),
                        message: format!("unknown component \"{name}\""),
                    }),
                    Some(_) => {}
                }
            }
        }

        errors
    }

    /// Builds the circuit graph this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or a wiring error if a
    /// connection is rejected (bad port key, polarity, or voltage).
    pub fn build(&self) -> Result<CircuitGraph, ConfigError> {
        if let Some(error) = self.validate().into_iter().next() {
            return Err(error);
        }

        let mut graph = CircuitGraph::new();
        let mut ids: std::collections::BTreeMap<&str, ComponentId> =
            std::collections::BTreeMap::new();
        for comp in &self.components {
            let built = self.build_component(comp);
            ids.insert(comp.name.as_str(), graph.add_component(built));
        }

        for (i, wire) in self.wires.iter().enumerate() {
            let (from_name, from_port) = split_endpoint(&wire.from).expect("validated");
            let (to_name, to_port) = split_endpoint(&wire.to).expect("validated");
            graph
                .add_connection(ids[from_name], from_port, ids[to_name], to_port)
                .map_err(|e| ConfigError {
                    field: format!("wire[{i}]"),
                    message: e.to_string(),
                })?;
        }

        Ok(graph)
    }

    fn build_component(&self, comp: &ComponentConfig) -> Component {
        let or = |v: f32, default: f32| if v > 0.0 { v } else { default };
        match comp.kind {
            ComponentKind::Panel => Component::panel(comp.watts),
            ComponentKind::Battery => Component::battery(comp.voltage, comp.capacity_wh),
            ComponentKind::SmartBattery => {
                Component::smart_battery(comp.voltage, comp.capacity_wh)
            }
            ComponentKind::Controller => Component::controller(or(comp.voltage, 120.0)),
            ComponentKind::AcBreaker => {
                Component::ac_breaker_at(comp.rating_amps, or(comp.voltage, 120.0))
            }
            ComponentKind::DcBreaker => Component::dc_breaker(comp.rating_amps),
            ComponentKind::AcOutlet => Component::ac_outlet(or(comp.voltage, 120.0)),
            ComponentKind::AcLoad => Component::ac_load(comp.watts, or(comp.voltage, 120.0)),
            ComponentKind::Combiner => Component::combiner(comp.circuits),
            ComponentKind::SolarCombiner => Component::solar_combiner(comp.circuits),
            ComponentKind::BreakerPanel => {
                Component::breaker_panel(comp.circuits, comp.rating_amps)
            }
            ComponentKind::SpiderBox => Component::spider_box(comp.circuits, comp.rating_amps),
            ComponentKind::DoubleVoltageHub => Component::double_voltage_hub(),
            ComponentKind::Producer => {
                Component::producer(comp.output_per_minute, comp.storage_capacity)
            }
            ComponentKind::Container => Component::container(comp.storage_capacity),
        }
    }
}
