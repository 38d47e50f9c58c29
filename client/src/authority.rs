//! Client-side actor control
//!
//! Everything that drives the local actor implements [`ControlSubsystem`] and
//! starts disabled. Subsystems are switched on when the server grants
//! authority over our actor and off when it revokes it. The trigger is the
//! grant itself, so a client running next to the server process behaves the
//! same as a remote one.

use log::{debug, info};
use shared::{ActorId, ControlGate, GateTransition};

pub trait ControlSubsystem {
    fn name(&self) -> &'static str;
    fn set_enabled(&mut self, enabled: bool);
}

#[derive(Debug, Default)]
pub struct ActorControl {
    actor_id: Option<ActorId>,
    gate: ControlGate,
}

impl ActorControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor_id(&self) -> Option<ActorId> {
        self.actor_id
    }

    pub fn is_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    /// Returns true the first time a grant arrives for an actor.
    pub fn on_granted(
        &mut self,
        actor_id: ActorId,
        subsystems: &mut [&mut dyn ControlSubsystem],
    ) -> bool {
        self.actor_id = Some(actor_id);
        match self.gate.on_authority_granted() {
            Some(GateTransition::Enabled) => {
                info!("Control of actor {} granted", actor_id);
                for subsystem in subsystems.iter_mut() {
                    debug!("Enabling {}", subsystem.name());
                    subsystem.set_enabled(true);
                }
                true
            }
            _ => {
                debug!("Duplicate grant for actor {}", actor_id);
                false
            }
        }
    }

    pub fn on_revoked(
        &mut self,
        actor_id: ActorId,
        subsystems: &mut [&mut dyn ControlSubsystem],
    ) -> bool {
        if self.actor_id != Some(actor_id) {
            debug!("Revoke for foreign actor {}", actor_id);
            return false;
        }
        match self.gate.on_authority_revoked() {
            Some(GateTransition::Disabled) => {
                info!("Control of actor {} revoked", actor_id);
                for subsystem in subsystems.iter_mut() {
                    debug!("Disabling {}", subsystem.name());
                    subsystem.set_enabled(false);
                }
                true
            }
            _ => false,
        }
    }
}
