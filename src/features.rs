//! Feature gates guarding the reconcilers
//!
//! Gates are named booleans that may flip at any time through external
//! configuration. Reconcilers are never unregistered; the runner simply
//! skips ticks while a gate is off.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};

use crate::models::NodeSLO;

/// Known reconciler features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    BECPUSuppress,
    BEMemoryEvict,
    BECPUEvict,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::BECPUSuppress => write!(f, "BECPUSuppress"),
            Feature::BEMemoryEvict => write!(f, "BEMemoryEvict"),
            Feature::BECPUEvict => write!(f, "BECPUEvict"),
        }
    }
}

/// Togglable map of feature gates, shared by the host and every runner.
///
/// Clones share the same underlying state. All known features default
/// to disabled.
#[derive(Debug, Clone)]
pub struct FeatureGates {
    gates: Arc<RwLock<HashMap<Feature, bool>>>,
}

impl Default for FeatureGates {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureGates {
    pub fn new() -> Self {
        let gates = HashMap::from([
            (Feature::BECPUSuppress, false),
            (Feature::BEMemoryEvict, false),
            (Feature::BECPUEvict, false),
        ]);
        Self {
            gates: Arc::new(RwLock::new(gates)),
        }
    }

    /// Build gates with the given features switched on.
    pub fn with_enabled(features: &[Feature]) -> Self {
        let gates = Self::new();
        for feature in features {
            gates.set(*feature, true);
        }
        gates
    }

    pub fn enabled(&self, feature: Feature) -> bool {
        self.gates
            .read()
            .unwrap()
            .get(&feature)
            .copied()
            .unwrap_or(false)
    }

    pub fn all_enabled(&self, features: &[Feature]) -> bool {
        features.iter().all(|f| self.enabled(*f))
    }

    pub fn set(&self, feature: Feature, enabled: bool) {
        self.gates.write().unwrap().insert(feature, enabled);
    }
}

/// Whether a best-effort feature is disabled by the node SLO.
///
/// A missing SLO, a missing threshold strategy or a missing `enable`
/// flag cannot be interpreted and is reported as an error; callers skip
/// the tick in that case.
pub fn be_feature_disabled(node_slo: Option<&NodeSLO>, feature: Feature) -> Result<bool> {
    let Some(slo) = node_slo else {
        bail!("cannot parse feature config for missing node SLO");
    };

    match feature {
        Feature::BECPUSuppress | Feature::BEMemoryEvict | Feature::BECPUEvict => {
            let enable = slo
                .spec
                .resource_used_threshold_with_be
                .as_ref()
                .and_then(|strategy| strategy.enable);
            match enable {
                Some(enable) => Ok(!enable),
                None => bail!("cannot parse feature config for invalid node SLO"),
            }
        }
    }
}
