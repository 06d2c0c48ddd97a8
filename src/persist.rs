//! Save/load of the full installation: the circuit graph, the automation
//! rules, and the minimal simulator state (clock, battery charge). The
//! transient power-flow cache and switch overlays are derived data and
//! are not persisted.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::CircuitGraph;
use crate::graph::component::ComponentId;
use crate::sim::automation::AutomationRule;
use crate::sim::engine::SimEngine;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot io: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// The flat on-disk record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub graph: CircuitGraph,
    #[serde(default)]
    pub rules: Vec<AutomationRule>,
    /// Clock time of day, minutes since midnight.
    #[serde(default)]
    pub clock_minutes: f32,
    /// Battery state of charge at save time. Empty when the engine was
    /// not in live mode.
    #[serde(default)]
    pub battery_soc: BTreeMap<ComponentId, f32>,
}

impl Snapshot {
    pub fn of(engine: &SimEngine) -> Self {
        Self {
            graph: engine.graph().clone(),
            rules: engine.rules().to_vec(),
            clock_minutes: engine.clock().minutes(),
            battery_soc: engine
                .live()
                .map(|l| l.battery_soc.clone())
                .unwrap_or_default(),
        }
    }

    /// Rebuilds an engine from the record. A non-empty battery map means
    /// the save was taken in live mode, so live mode is re-entered with
    /// the saved charge levels (the clock stays paused).
    pub fn into_engine(self) -> SimEngine {
        SimEngine::restore(self.graph, self.rules, self.clock_minutes, self.battery_soc)
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}
