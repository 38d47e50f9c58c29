//! Server half of binary interactable replication (doors, lamps, windows)
//!
//! Requests are validated here and applied only by the server. Every applied
//! change produces a declarative `ToggleStateChanged { old, new }` event. A
//! request against an object that is still settling from an earlier change
//! (mid-transition, or already changed this tick) is a silent no-op, so
//! concurrent requests collapse to a single result.

use crate::error::Rejection;
use shared::{
    EmitterKey, LightEmitter, ObjectId, ParticipantId, ServerEvent, SphereEmitter, ToggleKind,
    ToggleView, Vec3, DOOR_AUTO_CLOSE_SECS, DOOR_TRANSITION_SECS,
};
use std::collections::BTreeMap;

pub const DEFAULT_LAMP_RADIUS: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct InteractableToggle {
    pub id: ObjectId,
    pub kind: ToggleKind,
    pub position: Vec3,
    pub range: f32,
    is_on: bool,
    transition_remaining: f32,
    changed_this_tick: bool,
    idle_timer: f32,
    light_radius: f32,
}

impl InteractableToggle {
    pub fn new(id: ObjectId, kind: ToggleKind, position: Vec3, range: f32, is_on: bool) -> Self {
        Self {
            id,
            kind,
            position,
            range,
            is_on,
            transition_remaining: 0.0,
            changed_this_tick: false,
            idle_timer: 0.0,
            light_radius: DEFAULT_LAMP_RADIUS,
        }
    }

    pub fn with_light_radius(mut self, radius: f32) -> Self {
        self.light_radius = radius;
        self
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// Reach is measured on the ground plane.
    pub fn in_range(&self, position: Vec3) -> bool {
        self.position.flatten().distance(position.flatten()) <= self.range
    }

    fn is_settling(&self) -> bool {
        self.changed_this_tick || self.transition_remaining > 0.0
    }

    fn apply(&mut self, new: bool) -> ServerEvent {
        let old = self.is_on;
        self.is_on = new;
        self.changed_this_tick = true;
        self.idle_timer = 0.0;
        self.transition_remaining = match self.kind {
            ToggleKind::Door | ToggleKind::Window => DOOR_TRANSITION_SECS,
            ToggleKind::Lamp => 0.0,
        };
        ServerEvent::ToggleStateChanged {
            object_id: self.id,
            old,
            new,
        }
    }

    /// Flips the object for a participant standing at `requester`.
    pub fn request_flip(
        &mut self,
        participant: ParticipantId,
        requester: Vec3,
    ) -> Result<ServerEvent, Rejection> {
        if !self.in_range(requester) {
            return Err(Rejection::OutOfRange {
                participant,
                object: self.id,
            });
        }
        if self.is_settling() {
            return Err(Rejection::InTransition(self.id));
        }
        Ok(self.apply(!self.is_on))
    }

    /// Drives a specific value from server logic. Unchanged targets are no-ops.
    pub fn set(&mut self, target: bool) -> Result<ServerEvent, Rejection> {
        if target == self.is_on {
            return Err(Rejection::NoChange);
        }
        if self.is_settling() {
            return Err(Rejection::InTransition(self.id));
        }
        Ok(self.apply(target))
    }

    /// Advances transition timers. Open doors close on their own after
    /// sitting unattended.
    pub fn tick(&mut self, dt: f32, anyone_near: bool) -> Option<ServerEvent> {
        self.changed_this_tick = false;
        self.transition_remaining = (self.transition_remaining - dt).max(0.0);

        if self.kind != ToggleKind::Door || !self.is_on || self.transition_remaining > 0.0 {
            return None;
        }

        if anyone_near {
            self.idle_timer = 0.0;
            return None;
        }

        self.idle_timer += dt;
        if self.idle_timer >= DOOR_AUTO_CLOSE_SECS {
            return Some(self.apply(false));
        }
        None
    }

    /// Lamps drive a sphere light whose radius drops to zero when off.
    pub fn emitter(&self) -> Option<LightEmitter> {
        match self.kind {
            ToggleKind::Lamp => Some(LightEmitter::Sphere(SphereEmitter {
                position: self.position,
                radius: if self.is_on { self.light_radius } else { 0.0 },
                enabled: true,
            })),
            _ => None,
        }
    }

    pub fn view(&self) -> ToggleView {
        ToggleView {
            id: self.id,
            kind: self.kind,
            position: self.position,
            range: self.range,
            is_on: self.is_on,
            light_radius: match self.kind {
                ToggleKind::Lamp => Some(self.light_radius),
                _ => None,
            },
        }
    }
}

/// All toggles in the level, keyed by object id.
#[derive(Debug, Clone, Default)]
pub struct ToggleSet {
    toggles: BTreeMap<ObjectId, InteractableToggle>,
}

impl ToggleSet {
    pub fn new(toggles: impl IntoIterator<Item = InteractableToggle>) -> Self {
        Self {
            toggles: toggles.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&InteractableToggle> {
        self.toggles.get(&id)
    }

    pub fn len(&self) -> usize {
        self.toggles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toggles.is_empty()
    }

    pub fn request_flip(
        &mut self,
        id: ObjectId,
        participant: ParticipantId,
        requester: Vec3,
    ) -> Result<ServerEvent, Rejection> {
        self.toggles
            .get_mut(&id)
            .ok_or(Rejection::UnknownObject(id))?
            .request_flip(participant, requester)
    }

    pub fn set(&mut self, id: ObjectId, target: bool) -> Result<ServerEvent, Rejection> {
        self.toggles
            .get_mut(&id)
            .ok_or(Rejection::UnknownObject(id))?
            .set(target)
    }

    /// First lamp within `reach` of `position` on the ground plane, with its
    /// current value.
    pub fn lamp_near(&self, position: Vec3, reach: f32) -> Option<(ObjectId, bool)> {
        self.toggles
            .values()
            .filter(|t| t.kind == ToggleKind::Lamp)
            .find(|t| t.position.flatten().distance(position.flatten()) <= reach)
            .map(|t| (t.id, t.is_on))
    }

    /// `occupants` are the positions of every alive participant.
    pub fn tick(&mut self, dt: f32, occupants: &[Vec3], events: &mut Vec<ServerEvent>) {
        for toggle in self.toggles.values_mut() {
            let anyone_near = occupants.iter().any(|&p| toggle.in_range(p));
            if let Some(event) = toggle.tick(dt, anyone_near) {
                events.push(event);
            }
        }
    }

    pub fn emitters(&self) -> impl Iterator<Item = (EmitterKey, LightEmitter)> + '_ {
        self.toggles
            .values()
            .filter_map(|t| t.emitter().map(|e| (EmitterKey::Lamp(t.id), e)))
    }

    /// Current values sent as `old == new` so a late joiner updates visuals
    /// without replaying transition cues.
    pub fn resync_events(&self) -> Vec<ServerEvent> {
        self.toggles
            .values()
            .map(|t| ServerEvent::ToggleStateChanged {
                object_id: t.id,
                old: t.is_on,
                new: t.is_on,
            })
            .collect()
    }

    pub fn views(&self) -> Vec<ToggleView> {
        self.toggles.values().map(InteractableToggle::view).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn door() -> InteractableToggle {
        InteractableToggle::new(1, ToggleKind::Door, Vec3::ZERO, 2.0, false)
    }

    fn lamp(is_on: bool) -> InteractableToggle {
        InteractableToggle::new(2, ToggleKind::Lamp, Vec3::new(5.0, 2.0, 0.0), 1.0, is_on)
    }

    #[test]
    fn test_flip_reports_old_and_new() {
        let mut door = door();
        let event = door.request_flip(7, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(
            event,
            ServerEvent::ToggleStateChanged {
                object_id: 1,
                old: false,
                new: true
            }
        );
        assert!(door.is_on());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut door = door();
        assert_eq!(
            door.request_flip(7, Vec3::new(3.0, 0.0, 0.0)),
            Err(Rejection::OutOfRange {
                participant: 7,
                object: 1
            })
        );
        assert!(!door.is_on());
    }

    #[test]
    fn test_concurrent_requests_collapse() {
        let mut lamp = lamp(true);
        let at = Vec3::new(5.0, 1.5, 0.0);
        assert!(lamp.request_flip(1, at).is_ok());
        assert_eq!(lamp.request_flip(2, at), Err(Rejection::InTransition(2)));
        assert!(!lamp.is_on());

        lamp.tick(0.033, true);
        assert!(lamp.request_flip(2, at).is_ok());
        assert!(lamp.is_on());
    }

    #[test]
    fn test_mid_transition_request_is_noop() {
        let mut door = door();
        door.request_flip(1, Vec3::ZERO).unwrap();
        door.tick(0.2, true);
        assert_eq!(
            door.request_flip(1, Vec3::ZERO),
            Err(Rejection::InTransition(1))
        );
        door.tick(0.4, true);
        assert!(door.request_flip(1, Vec3::ZERO).is_ok());
    }

    #[test]
    fn test_unchanged_target_is_noop() {
        let mut door = door();
        assert_eq!(door.set(false), Err(Rejection::NoChange));
    }

    #[test]
    fn test_door_auto_closes_when_unattended() {
        let mut door = door();
        door.request_flip(1, Vec3::ZERO).unwrap();

        // Someone lingering keeps it open
        for _ in 0..100 {
            assert_eq!(door.tick(0.1, true), None);
        }

        let mut closed = None;
        for _ in 0..25 {
            if let Some(event) = door.tick(0.1, false) {
                closed = Some(event);
                break;
            }
        }
        assert_eq!(
            closed,
            Some(ServerEvent::ToggleStateChanged {
                object_id: 1,
                old: true,
                new: false
            })
        );
    }

    #[test]
    fn test_lamp_radius_follows_state() {
        let on = lamp(true).emitter();
        let off = lamp(false).emitter();
        match (on, off) {
            (Some(LightEmitter::Sphere(on)), Some(LightEmitter::Sphere(off))) => {
                assert_eq!(on.radius, DEFAULT_LAMP_RADIUS);
                assert_eq!(off.radius, 0.0);
            }
            _ => panic!("lamp should drive a sphere emitter"),
        }
        assert!(door().emitter().is_none());
    }

    #[test]
    fn test_resync_events_are_silent() {
        let set = ToggleSet::new(vec![door(), lamp(true)]);
        for event in set.resync_events() {
            match event {
                ServerEvent::ToggleStateChanged { old, new, .. } => assert_eq!(old, new),
                _ => panic!("unexpected event"),
            }
        }
        assert_eq!(set.emitters().count(), 1);
    }

    #[test]
    fn test_unknown_object() {
        let mut set = ToggleSet::new(vec![door()]);
        assert_eq!(
            set.request_flip(99, 1, Vec3::ZERO),
            Err(Rejection::UnknownObject(99))
        );
    }
}
