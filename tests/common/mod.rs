//! Shared test fixtures for integration tests.

use offgrid_sim::config::InstallationConfig;
use offgrid_sim::graph::component::{ComponentId, ComponentKind};
use offgrid_sim::sim::engine::{SimEngine, TickReport};

/// Engine built from the cabin preset: one panel, one bank, one
/// breaker-protected outlet circuit with a lamp and a fridge.
pub fn cabin_engine() -> SimEngine {
    let config = InstallationConfig::cabin();
    SimEngine::new(config.build().expect("preset builds"))
        .with_environment(config.environment.clone())
}

/// Engine built from the workshop preset: combined PV strings, two
/// banks, a panelboard, and a well pump with a cistern.
pub fn workshop_engine() -> SimEngine {
    let config = InstallationConfig::workshop();
    SimEngine::new(config.build().expect("preset builds"))
        .with_environment(config.environment.clone())
}

/// First component of the given kind, by id order.
pub fn find_kind(engine: &SimEngine, kind: ComponentKind) -> ComponentId {
    engine
        .graph()
        .components_of_kind(kind)
        .map(|c| c.id)
        .min()
        .expect("fixture contains the kind")
}

/// All components of the given kind, by id order.
pub fn find_all(engine: &SimEngine, kind: ComponentKind) -> Vec<ComponentId> {
    engine
        .graph()
        .components_of_kind(kind)
        .map(|c| c.id)
        .collect()
}

/// Runs the engine one simulated minute per tick and returns the reports.
pub fn run_minutes(engine: &mut SimEngine, minutes: usize) -> Vec<TickReport> {
    engine.set_speed(1.0);
    (0..minutes).map(|_| engine.tick(1.0)).collect()
}
