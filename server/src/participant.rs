//! Authoritative per-participant state
//!
//! Health, role and status are only writable by the server itself. Every
//! setter takes an [`Origin`] so that a write arriving from a connection is
//! rejected before it touches state. Status moves one way: once a participant
//! has escaped or died it never returns to `Alive`.

use crate::error::Rejection;
use crate::flashlight::Flashlight;
use shared::{
    ActorId, Exposure, ParticipantId, ParticipantView, Role, ServerEvent, Status, Vec3,
    HEALTH_REGEN_COOLDOWN_SECS, HEALTH_REGEN_PER_SEC, HOSTILE_LIGHT_DAMAGE_PER_SEC,
    SHADOW_MAX_HEALTH,
};

/// Who is attempting a write to authoritative state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Server,
    Connection(u32),
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub connection_id: u32,
    pub actor_id: ActorId,
    pub name: String,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// Set once the owning connection acknowledged its spawn.
    pub spawn_acknowledged: bool,
    pub flashlight: Option<Flashlight>,
    role: Role,
    status: Status,
    health: f32,
    max_health: f32,
    exposure: Exposure,
    in_shadow_form: bool,
    regen_timer: f32,
}

impl Participant {
    pub fn new(
        id: ParticipantId,
        connection_id: u32,
        actor_id: ActorId,
        name: String,
        role: Role,
    ) -> Self {
        Self {
            id,
            connection_id,
            actor_id,
            name,
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            spawn_acknowledged: false,
            flashlight: match role {
                Role::Guardian => Some(Flashlight::new()),
                Role::Shadow => None,
            },
            role,
            status: Status::Alive,
            health: SHADOW_MAX_HEALTH,
            max_health: SHADOW_MAX_HEALTH,
            exposure: Exposure::default(),
            in_shadow_form: false,
            regen_timer: 0.0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn exposure(&self) -> Exposure {
        self.exposure
    }

    pub fn in_shadow_form(&self) -> bool {
        self.in_shadow_form
    }

    pub fn is_alive(&self) -> bool {
        self.status == Status::Alive
    }

    pub fn set_health(&mut self, origin: Origin, value: f32) -> Result<ServerEvent, Rejection> {
        if let Origin::Connection(_) = origin {
            return Err(Rejection::ReadOnlyField(self.id));
        }

        let new = value.clamp(0.0, self.max_health);
        if new == self.health {
            return Err(Rejection::NoChange);
        }

        let old = self.health;
        self.health = new;
        Ok(ServerEvent::HealthChanged {
            participant_id: self.id,
            old,
            new,
        })
    }

    pub fn set_role(&mut self, origin: Origin, role: Role) -> Result<ServerEvent, Rejection> {
        if let Origin::Connection(_) = origin {
            return Err(Rejection::ReadOnlyField(self.id));
        }
        if role == self.role {
            return Err(Rejection::NoChange);
        }

        self.role = role;
        self.flashlight = match role {
            Role::Guardian => Some(Flashlight::new()),
            Role::Shadow => None,
        };
        Ok(ServerEvent::RoleAssigned {
            participant_id: self.id,
            role,
        })
    }

    /// Moves an alive participant to a terminal status.
    pub fn set_status(&mut self, new: Status) -> Result<ServerEvent, Rejection> {
        if self.status.is_terminal() {
            return Err(Rejection::NotAlive(self.id));
        }
        if new == self.status {
            return Err(Rejection::NoChange);
        }

        let old = self.status;
        self.status = new;
        self.in_shadow_form = false;
        if let Some(flashlight) = self.flashlight.as_mut() {
            flashlight.switch_off();
        }
        Ok(ServerEvent::StatusChanged {
            participant_id: self.id,
            old,
            new,
        })
    }

    /// Stores the latest exposure. Being lit forces shadow form off.
    pub fn apply_exposure(&mut self, exposure: Exposure, events: &mut Vec<ServerEvent>) {
        if exposure != self.exposure {
            self.exposure = exposure;
            events.push(ServerEvent::ExposureChanged {
                participant_id: self.id,
                in_light: exposure.in_light,
                in_hostile_light: exposure.in_hostile_light,
            });
        }

        if exposure.in_light && self.in_shadow_form {
            self.in_shadow_form = false;
            self.regen_timer = 0.0;
            events.push(ServerEvent::ShadowFormChanged {
                participant_id: self.id,
                active: false,
            });
        }
    }

    /// A client proposal can only raise exposure until the next evaluation.
    pub fn raise_exposure(&mut self, proposal: Exposure, events: &mut Vec<ServerEvent>) {
        let merged = Exposure {
            in_light: self.exposure.in_light || proposal.in_light,
            in_hostile_light: self.exposure.in_hostile_light || proposal.in_hostile_light,
        };
        self.apply_exposure(merged, events);
    }

    pub fn request_shadow_form(&mut self, active: bool) -> Result<ServerEvent, Rejection> {
        if self.role != Role::Shadow {
            return Err(Rejection::WrongRole {
                participant: self.id,
                role: self.role,
            });
        }
        if active && !self.is_alive() {
            return Err(Rejection::NotAlive(self.id));
        }
        if active == self.in_shadow_form {
            return Err(Rejection::NoChange);
        }
        if active && self.exposure.in_light {
            return Err(Rejection::Lit);
        }

        self.in_shadow_form = active;
        self.regen_timer = 0.0;
        Ok(ServerEvent::ShadowFormChanged {
            participant_id: self.id,
            active,
        })
    }

    /// Applies hostile-light damage and shadow-form regeneration for one tick.
    ///
    /// Guardians are exempt. Returns true when this tick killed the participant.
    pub fn tick_health(&mut self, dt: f32, events: &mut Vec<ServerEvent>) -> bool {
        if self.role != Role::Shadow || !self.is_alive() {
            return false;
        }

        let mut target = self.health;
        if self.exposure.in_hostile_light {
            self.regen_timer = 0.0;
            target -= HOSTILE_LIGHT_DAMAGE_PER_SEC * dt;
        } else if self.in_shadow_form {
            self.regen_timer += dt;
            if self.regen_timer >= HEALTH_REGEN_COOLDOWN_SECS {
                target += HEALTH_REGEN_PER_SEC * dt;
            }
        } else {
            self.regen_timer = 0.0;
        }

        if let Ok(event) = self.set_health(Origin::Server, target) {
            events.push(event);
        }

        if self.health <= 0.0 {
            if let Ok(event) = self.set_status(Status::Dead) {
                events.push(event);
                return true;
            }
        }
        false
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            id: self.id,
            actor_id: self.actor_id,
            name: self.name.clone(),
            role: self.role,
            status: self.status,
            health: self.health,
            position: self.position,
            yaw: self.yaw,
            in_shadow_form: self.in_shadow_form,
            in_light: self.exposure.in_light,
            in_hostile_light: self.exposure.in_hostile_light,
            flashlight_on: self.flashlight.as_ref().map_or(false, |f| f.is_on()),
            battery_percent: self.flashlight.as_ref().map(|f| f.battery_percent()),
        }
    }
}
