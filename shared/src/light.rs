//! Light-exposure evaluation for concealment-capable actors
//!
//! Both the server and the client run the same evaluation: the server writes
//! the result into authoritative state, while a client only evaluates its own
//! actor and proposes the result to the server.
//!
//! An actor is sampled at its feet, centre, and head. A sample counts as lit
//! when an enabled emitter contains it and no occluder sits on the segment
//! between the emitter and the sample.

use crate::math::{Aabb, Vec3};
use serde::{Deserialize, Serialize};

/// Handheld spot light. Containment ignores height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConeEmitter {
    pub position: Vec3,
    pub forward: Vec3,
    pub range: f32,
    /// Full cone angle in degrees.
    pub spot_angle: f32,
    pub enabled: bool,
    pub hostile: bool,
}

impl ConeEmitter {
    fn contains(&self, point: Vec3) -> bool {
        let to_point = point - self.position;
        let to_point_flat = to_point.flatten();

        if to_point_flat.length() > self.range {
            return false;
        }

        let forward_flat = self.forward.flatten();
        forward_flat.angle_deg(to_point_flat) <= self.spot_angle / 2.0
    }
}

/// Omni light. A radius of zero means the controlling lamp is off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereEmitter {
    pub position: Vec3,
    pub radius: f32,
    pub enabled: bool,
}

impl SphereEmitter {
    fn contains(&self, point: Vec3) -> bool {
        self.position.distance(point) <= self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightEmitter {
    Cone(ConeEmitter),
    Sphere(SphereEmitter),
}

impl LightEmitter {
    pub fn position(&self) -> Vec3 {
        match self {
            LightEmitter::Cone(cone) => cone.position,
            LightEmitter::Sphere(sphere) => sphere.position,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            LightEmitter::Cone(cone) => cone.enabled,
            LightEmitter::Sphere(sphere) => sphere.enabled,
        }
    }

    /// Only the Guardian's flashlight hurts Shadows.
    pub fn is_hostile(&self) -> bool {
        match self {
            LightEmitter::Cone(cone) => cone.hostile,
            LightEmitter::Sphere(_) => false,
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        match self {
            LightEmitter::Cone(cone) => cone.contains(point),
            LightEmitter::Sphere(sphere) => sphere.contains(point),
        }
    }
}

/// Which game object an emitter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmitterKey {
    Fixture(u32),
    Lamp(u32),
    Flashlight(u32),
}

/// Registry of emitters rebuilt every evaluation, since emitters toggle.
#[derive(Debug, Clone, Default)]
pub struct LightRegistry {
    emitters: Vec<(EmitterKey, LightEmitter)>,
}

impl LightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an emitter, replacing any previous entry with the same key.
    pub fn register(&mut self, key: EmitterKey, emitter: LightEmitter) {
        if let Some(slot) = self.emitters.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = emitter;
        } else {
            self.emitters.push((key, emitter));
        }
    }

    pub fn deregister(&mut self, key: EmitterKey) -> bool {
        let before = self.emitters.len();
        self.emitters.retain(|(k, _)| *k != key);
        self.emitters.len() != before
    }

    pub fn clear(&mut self) {
        self.emitters.clear();
    }

    pub fn get(&self, key: EmitterKey) -> Option<&LightEmitter> {
        self.emitters
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, emitter)| emitter)
    }

    pub fn emitters(&self) -> impl Iterator<Item = &LightEmitter> {
        self.emitters.iter().map(|(_, emitter)| emitter)
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Exposure {
    pub in_light: bool,
    pub in_hostile_light: bool,
}

/// Feet, centre, and head of an actor standing at `feet`.
pub fn sample_points(feet: Vec3, body_height: f32) -> [Vec3; 3] {
    let half = body_height / 2.0;
    let center = feet + Vec3::UP * half;
    [center - Vec3::UP * half, center, center + Vec3::UP * half]
}

pub fn is_occluded(from: Vec3, to: Vec3, occluders: &[Aabb]) -> bool {
    occluders.iter().any(|o| o.intersects_segment(from, to))
}

/// Evaluates one actor's exposure against every registered emitter.
pub fn evaluate_exposure<'a>(
    samples: &[Vec3],
    emitters: impl IntoIterator<Item = &'a LightEmitter>,
    occluders: &[Aabb],
) -> Exposure {
    let mut exposure = Exposure::default();

    for emitter in emitters {
        if !emitter.is_enabled() {
            continue;
        }

        let origin = emitter.position();
        let lit = samples
            .iter()
            .any(|&sample| emitter.contains(sample) && !is_occluded(origin, sample, occluders));

        if lit {
            exposure.in_light = true;
            if emitter.is_hostile() {
                exposure.in_hostile_light = true;
                break;
            }
        }
    }

    exposure
}
