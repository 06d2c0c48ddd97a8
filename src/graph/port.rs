//! Ports and the polarity compatibility matrix.
//!
//! A port is a typed terminal on a component. Which ports may be wired
//! together is decided entirely by their polarities, checked once at
//! connection-creation time and never re-validated afterwards.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::connection::ConnectionId;

/// Electrical role of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    Positive,
    Negative,
    PvPositive,
    PvNegative,
    Ac,
    Load,
    Parallel,
    SmartBattery,
    Pipe,
}

impl Polarity {
    fn is_dc_positive(self) -> bool {
        matches!(self, Self::Positive | Self::PvPositive)
    }

    fn is_dc_negative(self) -> bool {
        matches!(self, Self::Negative | Self::PvNegative)
    }

    /// The compatibility matrix. Symmetric; every pair outside it is
    /// rejected at connection time.
    pub fn compatible_with(self, other: Polarity) -> bool {
        use Polarity::*;
        if self.is_dc_positive() && (other.is_dc_positive() || other.is_dc_negative()) {
            return true; // parallel or series
        }
        if self.is_dc_negative() && (other.is_dc_positive() || other.is_dc_negative()) {
            return true;
        }
        matches!(
            (self, other),
            (Ac, Ac)
                | (Ac, Load)
                | (Load, Ac)
                | (Load, Load)
                | (Parallel, Ac)
                | (Ac, Parallel)
                | (SmartBattery, SmartBattery)
                | (Pipe, Pipe)
        )
    }
}

/// A typed terminal on a component. The owning component id is stored on
/// the graph side; the port itself holds only its polarity and the set of
/// connections attached to it (a port may carry more than one wire, e.g. a
/// breaker-panel circuit port).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub polarity: Polarity,
    pub connections: BTreeSet<ConnectionId>,
}

impl Port {
    /// A port with no connections yet.
    pub fn detached(polarity: Polarity) -> Self {
        Self {
            polarity,
            connections: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Polarity::*;
    use super::*;

    const ALL: [Polarity; 9] = [
        Positive,
        Negative,
        PvPositive,
        PvNegative,
        Ac,
        Load,
        Parallel,
        SmartBattery,
        Pipe,
    ];

    #[test]
    fn matrix_is_symmetric() {
        for a in ALL {
            for b in ALL {
                assert_eq!(
                    a.compatible_with(b),
                    b.compatible_with(a),
                    "asymmetry for {a:?} / {b:?}"
                );
            }
        }
    }

    #[test]
    fn dc_pairs_allowed() {
        assert!(Positive.compatible_with(PvPositive));
        assert!(Positive.compatible_with(Negative));
        assert!(PvPositive.compatible_with(PvNegative));
        assert!(Negative.compatible_with(PvNegative));
    }

    #[test]
    fn ac_pairs_allowed() {
        assert!(Ac.compatible_with(Ac));
        assert!(Ac.compatible_with(Load));
        assert!(Load.compatible_with(Load));
        assert!(Parallel.compatible_with(Ac));
    }

    #[test]
    fn cross_domain_pairs_rejected() {
        assert!(!Positive.compatible_with(Ac));
        assert!(!PvPositive.compatible_with(Load));
        assert!(!Ac.compatible_with(Pipe));
        assert!(!SmartBattery.compatible_with(Positive));
        assert!(!Parallel.compatible_with(Load));
        assert!(!Parallel.compatible_with(Parallel));
        assert!(!Pipe.compatible_with(Load));
        assert!(!SmartBattery.compatible_with(Ac));
    }
}
