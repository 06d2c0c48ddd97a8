//! Components: the nodes of the circuit graph.
//!
//! Every component has a closed [`ComponentKind`], kind-specific [`Specs`],
//! a set of named [`Port`]s, and kind-specific mutable [`OperationalState`]
//! (breaker switches, panel circuit arrays, producer storage). Kind
//! constructors build the right port set so callers can never assemble a
//! component with the wrong terminals.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::port::{Polarity, Port};

/// Unique id of a component within one [`CircuitGraph`](crate::graph::CircuitGraph).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Closed set of component kinds. Every subsystem matches exhaustively on
/// this enum, so adding a kind is a compiler-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Panel,
    Battery,
    SmartBattery,
    Controller,
    AcBreaker,
    DcBreaker,
    AcOutlet,
    AcLoad,
    Combiner,
    SolarCombiner,
    BreakerPanel,
    SpiderBox,
    DoubleVoltageHub,
    Producer,
    Container,
}

impl ComponentKind {
    /// Kinds that hold stored energy and carry a state of charge.
    pub fn is_battery(self) -> bool {
        matches!(self, Self::Battery | Self::SmartBattery)
    }

    /// Kinds that own at least one protective circuit.
    pub fn is_breaker_bearing(self) -> bool {
        matches!(
            self,
            Self::AcBreaker | Self::DcBreaker | Self::BreakerPanel | Self::SpiderBox
        )
    }

    /// Kinds that terminate an electrical path trace.
    pub fn is_path_terminal(self) -> bool {
        matches!(
            self,
            Self::Panel | Self::Battery | Self::SmartBattery | Self::Controller
        )
    }
}

/// Kind-specific numeric attributes. Unused fields stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Specs {
    /// Rated power (panel output, load draw) in watts.
    pub watts: f32,
    /// Nominal voltage (battery pack, AC circuit, load) in volts.
    pub voltage: f32,
    /// Protective rating of a breaker or per-circuit rating of a panel, in amps.
    pub rating_amps: f32,
    /// Battery energy capacity in watt-hours.
    pub capacity_wh: f32,
    /// Producer output rate in resource units per simulated minute.
    pub output_per_minute: f32,
    /// Producer internal buffer or container tank capacity, in resource units.
    pub storage_capacity: f32,
}

/// Kind-specific mutable operational state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalState {
    /// No operational state for this kind.
    Fixed,
    /// Manual switch of a plain AC/DC breaker.
    Breaker { is_closed: bool },
    /// Main breaker plus per-circuit switch array of a panel or spider box.
    Panelboard { main_on: bool, circuits: Vec<bool> },
    /// Per-input-leg breakers of a combiner.
    LegBreakers { legs: Vec<bool> },
    /// Producer buffer holding resource units not yet pushed to a container.
    Producer { internal_storage: f32 },
    /// Container tank level in resource units.
    Container { stored: f32 },
}

/// A node of the circuit graph. Owns its ports exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub specs: Specs,
    /// Ports keyed by a stable name (`"pv_pos"`, `"circuit_2"`, ...).
    /// Insertion order is irrelevant; `BTreeMap` keeps iteration deterministic.
    pub ports: BTreeMap<String, Port>,
    pub state: OperationalState,
}

impl Component {
    fn with_ports(
        kind: ComponentKind,
        specs: Specs,
        state: OperationalState,
        ports: &[(&str, Polarity)],
    ) -> Self {
        let ports = ports
            .iter()
            .map(|(key, polarity)| ((*key).to_string(), Port::detached(*polarity)))
            .collect();
        Self {
            id: ComponentId::default(),
            kind,
            specs,
            ports,
            state,
        }
    }

    /// A solar panel with the given rated output.
    pub fn panel(watts: f32) -> Self {
        Self::with_ports(
            ComponentKind::Panel,
            Specs {
                watts,
                ..Specs::default()
            },
            OperationalState::Fixed,
            &[
                ("pv_pos", Polarity::PvPositive),
                ("pv_neg", Polarity::PvNegative),
            ],
        )
    }

    /// A battery bank with the given nominal voltage and capacity.
    pub fn battery(voltage: f32, capacity_wh: f32) -> Self {
        Self::with_ports(
            ComponentKind::Battery,
            Specs {
                voltage,
                capacity_wh,
                ..Specs::default()
            },
            OperationalState::Fixed,
            &[("pos", Polarity::Positive), ("neg", Polarity::Negative)],
        )
    }

    /// A smart battery: a battery bank with a parallel link port.
    pub fn smart_battery(voltage: f32, capacity_wh: f32) -> Self {
        Self::with_ports(
            ComponentKind::SmartBattery,
            Specs {
                voltage,
                capacity_wh,
                ..Specs::default()
            },
            OperationalState::Fixed,
            &[
                ("pos", Polarity::Positive),
                ("neg", Polarity::Negative),
                ("link", Polarity::SmartBattery),
            ],
        )
    }

    /// A charge controller / inverter with the given AC output voltage.
    pub fn controller(output_voltage: f32) -> Self {
        Self::with_ports(
            ComponentKind::Controller,
            Specs {
                voltage: output_voltage,
                ..Specs::default()
            },
            OperationalState::Fixed,
            &[
                ("pv_pos", Polarity::PvPositive),
                ("pv_neg", Polarity::PvNegative),
                ("batt_pos", Polarity::Positive),
                ("batt_neg", Polarity::Negative),
                ("ac_out", Polarity::Ac),
            ],
        )
    }

    /// An AC breaker with the given protective rating on a 120V circuit.
    pub fn ac_breaker(rating_amps: f32) -> Self {
        Self::ac_breaker_at(rating_amps, 120.0)
    }

    /// An AC breaker with the given protective rating and circuit voltage.
    pub fn ac_breaker_at(rating_amps: f32, voltage: f32) -> Self {
        Self::with_ports(
            ComponentKind::AcBreaker,
            Specs {
                rating_amps,
                voltage,
                ..Specs::default()
            },
            OperationalState::Breaker { is_closed: true },
            &[("line", Polarity::Ac), ("load", Polarity::Ac)],
        )
    }

    /// A DC breaker with the given protective rating.
    pub fn dc_breaker(rating_amps: f32) -> Self {
        Self::with_ports(
            ComponentKind::DcBreaker,
            Specs {
                rating_amps,
                ..Specs::default()
            },
            OperationalState::Breaker { is_closed: true },
            &[("line", Polarity::Positive), ("load", Polarity::Positive)],
        )
    }

    /// An AC outlet at the given voltage with two load sockets.
    pub fn ac_outlet(voltage: f32) -> Self {
        Self::with_ports(
            ComponentKind::AcOutlet,
            Specs {
                voltage,
                ..Specs::default()
            },
            OperationalState::Fixed,
            &[
                ("input", Polarity::Ac),
                ("load_1", Polarity::Load),
                ("load_2", Polarity::Load),
            ],
        )
    }

    /// An AC appliance drawing `watts` at `voltage`.
    pub fn ac_load(watts: f32, voltage: f32) -> Self {
        Self::with_ports(
            ComponentKind::AcLoad,
            Specs {
                watts,
                voltage,
                ..Specs::default()
            },
            OperationalState::Fixed,
            &[("plug", Polarity::Load)],
        )
    }

    /// A DC combiner with `legs` breaker-protected input legs.
    pub fn combiner(legs: usize) -> Self {
        let mut ports: Vec<(String, Polarity)> = (1..=legs)
            .map(|i| (format!("in_{i}"), Polarity::Positive))
            .collect();
        ports.push(("out".to_string(), Polarity::Positive));
        Self::combiner_like(ComponentKind::Combiner, legs, ports)
    }

    /// A solar combiner with `legs` breaker-protected PV input legs.
    pub fn solar_combiner(legs: usize) -> Self {
        let mut ports: Vec<(String, Polarity)> = (1..=legs)
            .map(|i| (format!("in_{i}"), Polarity::PvPositive))
            .collect();
        ports.push(("out".to_string(), Polarity::PvPositive));
        Self::combiner_like(ComponentKind::SolarCombiner, legs, ports)
    }

    fn combiner_like(kind: ComponentKind, legs: usize, ports: Vec<(String, Polarity)>) -> Self {
        let ports = ports
            .into_iter()
            .map(|(key, polarity)| (key, Port::detached(polarity)))
            .collect();
        Self {
            id: ComponentId::default(),
            kind,
            specs: Specs::default(),
            ports,
            state: OperationalState::LegBreakers {
                legs: vec![true; legs],
            },
        }
    }

    /// A breaker panel with `circuits` branch circuits of the given rating.
    pub fn breaker_panel(circuits: usize, rating_amps: f32) -> Self {
        let mut ports: Vec<(String, Polarity)> = vec![("main".to_string(), Polarity::Ac)];
        ports.extend((1..=circuits).map(|i| (format!("circuit_{i}"), Polarity::Ac)));
        let ports = ports
            .into_iter()
            .map(|(key, polarity)| (key, Port::detached(polarity)))
            .collect();
        Self {
            id: ComponentId::default(),
            kind: ComponentKind::BreakerPanel,
            specs: Specs {
                rating_amps,
                voltage: 120.0,
                ..Specs::default()
            },
            ports,
            state: OperationalState::Panelboard {
                main_on: true,
                circuits: vec![true; circuits],
            },
        }
    }

    /// A spider box: a portable distribution box with protected outlets.
    pub fn spider_box(outlets: usize, rating_amps: f32) -> Self {
        let mut ports: Vec<(String, Polarity)> = vec![("input".to_string(), Polarity::Ac)];
        ports.extend((1..=outlets).map(|i| (format!("outlet_{i}"), Polarity::Ac)));
        let ports = ports
            .into_iter()
            .map(|(key, polarity)| (key, Port::detached(polarity)))
            .collect();
        Self {
            id: ComponentId::default(),
            kind: ComponentKind::SpiderBox,
            specs: Specs {
                rating_amps,
                voltage: 120.0,
                ..Specs::default()
            },
            ports,
            state: OperationalState::Panelboard {
                main_on: true,
                circuits: vec![true; outlets],
            },
        }
    }

    /// A split-phase hub exposing both 120V and 240V output legs.
    pub fn double_voltage_hub() -> Self {
        Self::with_ports(
            ComponentKind::DoubleVoltageHub,
            Specs {
                voltage: 240.0,
                ..Specs::default()
            },
            OperationalState::Fixed,
            &[
                ("input", Polarity::Ac),
                ("out_120", Polarity::Ac),
                ("out_240", Polarity::Ac),
            ],
        )
    }

    /// A resource producer (e.g. a well pump) with an internal buffer.
    pub fn producer(output_per_minute: f32, storage_capacity: f32) -> Self {
        Self::with_ports(
            ComponentKind::Producer,
            Specs {
                output_per_minute,
                storage_capacity,
                ..Specs::default()
            },
            OperationalState::Producer {
                internal_storage: 0.0,
            },
            &[("pipe", Polarity::Pipe)],
        )
    }

    /// A resource container (tank) with the given capacity.
    pub fn container(storage_capacity: f32) -> Self {
        Self::with_ports(
            ComponentKind::Container,
            Specs {
                storage_capacity,
                ..Specs::default()
            },
            OperationalState::Container { stored: 0.0 },
            &[("pipe", Polarity::Pipe)],
        )
    }

    /// Looks up a port by key.
    pub fn port(&self, key: &str) -> Option<&Port> {
        self.ports.get(key)
    }

    /// Number of protective circuits this component owns: one for plain
    /// breakers, one per branch circuit for panels and spider boxes.
    pub fn circuit_count(&self) -> usize {
        match &self.state {
            OperationalState::Breaker { .. } => 1,
            OperationalState::Panelboard { circuits, .. } => circuits.len(),
            _ => 0,
        }
    }

    /// Whether the manual switch for the given circuit is on. `None` circuit
    /// index addresses a plain breaker.
    pub fn manual_switch_on(&self, circuit: Option<usize>) -> bool {
        match (&self.state, circuit) {
            (OperationalState::Breaker { is_closed }, None) => *is_closed,
            (OperationalState::Panelboard { main_on, circuits }, Some(i)) => {
                *main_on && circuits.get(i).copied().unwrap_or(false)
            }
            (OperationalState::Panelboard { main_on, .. }, None) => *main_on,
            (OperationalState::LegBreakers { legs }, Some(i)) => {
                legs.get(i).copied().unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Flips the manual switch for the given circuit. `None` addresses a
    /// plain breaker or a panelboard main.
    pub fn toggle_manual_switch(&mut self, circuit: Option<usize>) {
        match (&mut self.state, circuit) {
            (OperationalState::Breaker { is_closed }, None) => *is_closed = !*is_closed,
            (OperationalState::Panelboard { main_on, .. }, None) => *main_on = !*main_on,
            (OperationalState::Panelboard { circuits, .. }, Some(i)) => {
                if let Some(on) = circuits.get_mut(i) {
                    *on = !*on;
                }
            }
            (OperationalState::LegBreakers { legs }, Some(i)) => {
                if let Some(on) = legs.get_mut(i) {
                    *on = !*on;
                }
            }
            _ => {}
        }
    }

    /// The port key feeding the given protective circuit's downstream side.
    pub fn circuit_output_port(&self, circuit: Option<usize>) -> Option<String> {
        match (self.kind, circuit) {
            (ComponentKind::AcBreaker | ComponentKind::DcBreaker, None) => {
                Some("load".to_string())
            }
            (ComponentKind::BreakerPanel, Some(i)) => Some(format!("circuit_{}", i + 1)),
            (ComponentKind::SpiderBox, Some(i)) => Some(format!("outlet_{}", i + 1)),
            _ => None,
        }
    }
}
