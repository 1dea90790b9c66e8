//! Configurable finalization rules.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::behandling::BehandlingType;

/// Rules applied by [`Behandling::finalize`](crate::Behandling::finalize)
/// on top of the fixed terminal and hand-off checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeRules {
    /// Case types that may only finalize after a co-signer has returned the
    /// case. Empty by default.
    #[serde(default)]
    pub require_medunderskriver_for: BTreeSet<BehandlingType>,
}

impl FinalizeRules {
    /// Rules requiring a co-signer decision for the given case types.
    pub fn requiring_medunderskriver_for(types: impl IntoIterator<Item = BehandlingType>) -> Self {
        Self {
            require_medunderskriver_for: types.into_iter().collect(),
        }
    }

    /// Whether a case of `behandling_type` needs a returned co-signer flow
    /// before it can finalize.
    pub fn requires_medunderskriver(&self, behandling_type: BehandlingType) -> bool {
        self.require_medunderskriver_for.contains(&behandling_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requires_nothing() {
        let rules = FinalizeRules::default();
        for t in BehandlingType::all() {
            assert!(!rules.requires_medunderskriver(*t));
        }
    }

    #[test]
    fn configured_types_require_co_signer() {
        let rules = FinalizeRules::requiring_medunderskriver_for([BehandlingType::Anke]);
        assert!(rules.requires_medunderskriver(BehandlingType::Anke));
        assert!(!rules.requires_medunderskriver(BehandlingType::Klage));
    }
}
