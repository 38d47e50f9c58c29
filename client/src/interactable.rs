//! Observer side of doors, lamps and windows
//!
//! The mirror only follows what the server declares. A transition cue plays
//! when a change actually flips the value; re-sync notifications that carry
//! the same old and new value update the visual state silently. Proximity
//! hints are computed locally and carry no authority.

use log::debug;
use shared::{
    EmitterKey, LightEmitter, ObjectId, SphereEmitter, ToggleKind, ToggleView, Vec3,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    DoorOpen,
    DoorClose,
    LampOn,
    LampOff,
    WindowOpen,
    WindowClose,
}

impl SoundCue {
    fn for_transition(kind: ToggleKind, now_on: bool) -> Self {
        match (kind, now_on) {
            (ToggleKind::Door, true) => SoundCue::DoorOpen,
            (ToggleKind::Door, false) => SoundCue::DoorClose,
            (ToggleKind::Lamp, true) => SoundCue::LampOn,
            (ToggleKind::Lamp, false) => SoundCue::LampOff,
            (ToggleKind::Window, true) => SoundCue::WindowOpen,
            (ToggleKind::Window, false) => SoundCue::WindowClose,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityHint {
    Show(ObjectId),
    Hide(ObjectId),
}

#[derive(Debug, Clone)]
pub struct ToggleMirror {
    pub view: ToggleView,
    hint_visible: bool,
}

impl ToggleMirror {
    pub fn new(view: ToggleView) -> Self {
        Self {
            view,
            hint_visible: false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.view.is_on
    }

    /// Applies a declared change and returns the cue to play, if any.
    pub fn apply_change(&mut self, old: bool, new: bool) -> Option<SoundCue> {
        self.view.is_on = new;
        if old == new {
            return None;
        }
        Some(SoundCue::for_transition(self.view.kind, new))
    }

    pub fn update_proximity(&mut self, position: Vec3) -> Option<ProximityHint> {
        let near = self.view.position.flatten().distance(position.flatten()) <= self.view.range;
        if near == self.hint_visible {
            return None;
        }
        self.hint_visible = near;
        Some(if near {
            ProximityHint::Show(self.view.id)
        } else {
            ProximityHint::Hide(self.view.id)
        })
    }

    pub fn emitter(&self) -> Option<LightEmitter> {
        let radius = self.view.light_radius?;
        Some(LightEmitter::Sphere(SphereEmitter {
            position: self.view.position,
            radius: if self.view.is_on { radius } else { 0.0 },
            enabled: true,
        }))
    }
}

#[derive(Debug, Default)]
pub struct ToggleBoard {
    mirrors: BTreeMap<ObjectId, ToggleMirror>,
}

impl ToggleBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, views: &[ToggleView]) {
        self.mirrors = views
            .iter()
            .map(|v| (v.id, ToggleMirror::new(v.clone())))
            .collect();
    }

    pub fn get(&self, id: ObjectId) -> Option<&ToggleMirror> {
        self.mirrors.get(&id)
    }

    pub fn apply_change(&mut self, id: ObjectId, old: bool, new: bool) -> Option<SoundCue> {
        match self.mirrors.get_mut(&id) {
            Some(mirror) => mirror.apply_change(old, new),
            None => {
                debug!("Change for unknown object {}", id);
                None
            }
        }
    }

    pub fn update_proximity(&mut self, position: Vec3) -> Vec<ProximityHint> {
        self.mirrors
            .values_mut()
            .filter_map(|m| m.update_proximity(position))
            .collect()
    }

    pub fn emitters(&self) -> impl Iterator<Item = (EmitterKey, LightEmitter)> + '_ {
        self.mirrors
            .values()
            .filter_map(|m| m.emitter().map(|e| (EmitterKey::Lamp(m.view.id), e)))
    }
}
