//! Control gate for actor-driving subsystems.
//!
//! Movement and input consumers start disabled. Only an authority grant turns
//! them on and only a revoke turns them off again. Repeated notifications are
//! absorbed so each grant or revoke takes effect once.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlGate {
    enabled: bool,
}

/// Edge produced by a gate notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Enabled,
    Disabled,
}

impl ControlGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn on_authority_granted(&mut self) -> Option<GateTransition> {
        if self.enabled {
            return None;
        }
        self.enabled = true;
        Some(GateTransition::Enabled)
    }

    pub fn on_authority_revoked(&mut self) -> Option<GateTransition> {
        if !self.enabled {
            return None;
        }
        self.enabled = false;
        Some(GateTransition::Disabled)
    }
}
