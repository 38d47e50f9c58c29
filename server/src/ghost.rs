//! Wandering ghost that plays with the lamps
//!
//! The ghost belongs to the server alone. It walks between the level's
//! waypoints, picking the next one at random on arrival, and switches the
//! first lamp within reach at most once per cooldown. Its lamp changes go
//! through [`ToggleSet::set`] and reach clients as ordinary toggle events.

use crate::toggles::ToggleSet;
use log::debug;
use rand::Rng;
use shared::{ServerEvent, Vec3};

pub const GHOST_SPEED: f32 = 2.0;
pub const GHOST_LAMP_REACH: f32 = 1.5;
pub const GHOST_TOGGLE_COOLDOWN_SECS: f32 = 2.0;

const ARRIVAL_DISTANCE: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct Ghost {
    position: Vec3,
    waypoints: Vec<Vec3>,
    target: usize,
    since_toggle: f32,
}

impl Ghost {
    /// Starts at the first waypoint. A level without waypoints has no ghost.
    pub fn new(waypoints: Vec<Vec3>) -> Option<Self> {
        let position = *waypoints.first()?;
        Some(Self {
            position,
            waypoints,
            target: 0,
            since_toggle: GHOST_TOGGLE_COOLDOWN_SECS,
        })
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn tick<R: Rng>(
        &mut self,
        dt: f32,
        rng: &mut R,
        toggles: &mut ToggleSet,
        events: &mut Vec<ServerEvent>,
    ) {
        self.walk(dt, rng);

        self.since_toggle += dt;
        if self.since_toggle < GHOST_TOGGLE_COOLDOWN_SECS {
            return;
        }
        let Some((lamp, is_on)) = toggles.lamp_near(self.position, GHOST_LAMP_REACH) else {
            return;
        };

        match toggles.set(lamp, !is_on) {
            Ok(event) => {
                debug!("Ghost switched lamp {} to {}", lamp, !is_on);
                events.push(event);
                self.since_toggle = 0.0;
            }
            Err(rejection) => debug!("Ghost left lamp {} alone: {}", lamp, rejection),
        }
    }

    fn walk<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        let target = self.waypoints[self.target];
        let to_target = target - self.position;
        let distance = to_target.length();
        let step = GHOST_SPEED * dt;

        self.position = if distance <= step {
            target
        } else {
            self.position + to_target * (step / distance)
        };

        if self.position.distance(target) < ARRIVAL_DISTANCE {
            self.target = rng.gen_range(0..self.waypoints.len());
        }
    }
}
