//! Level layout loaded from JSON
//!
//! A layout lists where keys and players may spawn, the interactable toggles,
//! fixed light fixtures, light-blocking boxes, exits and charging stations.
//! When no file is given the server uses a small built-in house.

use crate::error::ServerError;
use crate::flashlight::ChargingStation;
use crate::toggles::{InteractableToggle, ToggleSet, DEFAULT_LAMP_RADIUS};
use serde::{Deserialize, Serialize};
use shared::{
    Aabb, ExitView, LevelView, LightEmitter, ObjectId, SphereEmitter, StationId, ToggleKind,
    Vec3,
};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleLayout {
    pub id: ObjectId,
    pub kind: ToggleKind,
    pub position: Vec3,
    #[serde(default)]
    pub range: Option<f32>,
    #[serde(default)]
    pub is_on: Option<bool>,
    #[serde(default)]
    pub light_radius: Option<f32>,
}

impl ToggleLayout {
    fn build(&self) -> InteractableToggle {
        let (range, is_on) = match self.kind {
            ToggleKind::Door => (2.0, false),
            ToggleKind::Lamp => (1.0, true),
            ToggleKind::Window => (4.0, false),
        };
        InteractableToggle::new(
            self.id,
            self.kind,
            self.position,
            self.range.unwrap_or(range),
            self.is_on.unwrap_or(is_on),
        )
        .with_light_radius(self.light_radius.unwrap_or(DEFAULT_LAMP_RADIUS))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationLayout {
    pub id: StationId,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Level {
    #[serde(default)]
    pub key_spawn_points: Vec<Vec3>,
    #[serde(default)]
    pub player_spawns: Vec<Vec3>,
    #[serde(default)]
    pub toggles: Vec<ToggleLayout>,
    #[serde(default)]
    pub fixtures: Vec<LightEmitter>,
    #[serde(default)]
    pub occluders: Vec<Aabb>,
    #[serde(default)]
    pub exits: Vec<ExitView>,
    #[serde(default)]
    pub stations: Vec<StationLayout>,
    /// Patrol route of the ghost. Empty means no ghost.
    #[serde(default)]
    pub ghost_waypoints: Vec<Vec3>,
}

impl Level {
    pub fn from_json(text: &str) -> Result<Self, ServerError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn build_toggles(&self) -> ToggleSet {
        ToggleSet::new(self.toggles.iter().map(ToggleLayout::build))
    }

    pub fn build_stations(&self) -> Vec<ChargingStation> {
        self.stations
            .iter()
            .map(|s| ChargingStation::new(s.id, s.position))
            .collect()
    }

    /// Player spawn for the n-th participant, cycling through the list.
    pub fn player_spawn(&self, index: usize) -> Vec3 {
        if self.player_spawns.is_empty() {
            return Vec3::new(index as f32 * 1.5, 0.0, 0.0);
        }
        self.player_spawns[index % self.player_spawns.len()]
    }

    pub fn view(&self, toggles: &ToggleSet, stations: &[ChargingStation]) -> LevelView {
        LevelView {
            toggles: toggles.views(),
            fixtures: self.fixtures.clone(),
            occluders: self.occluders.clone(),
            exits: self.exits.clone(),
            stations: stations.iter().map(ChargingStation::view).collect(),
        }
    }

    /// Two rooms split by a wall with a door, a hallway lamp and a window.
    pub fn default_house() -> Self {
        Self {
            key_spawn_points: vec![
                Vec3::new(-8.0, 0.0, -8.0),
                Vec3::new(8.0, 0.0, -8.0),
                Vec3::new(-8.0, 0.0, 8.0),
                Vec3::new(8.0, 0.0, 8.0),
                Vec3::new(0.0, 0.0, -12.0),
                Vec3::new(0.0, 0.0, 12.0),
            ],
            player_spawns: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(-4.0, 0.0, 4.0),
                Vec3::new(4.0, 0.0, 4.0),
                Vec3::new(-4.0, 0.0, -4.0),
                Vec3::new(4.0, 0.0, -4.0),
            ],
            toggles: vec![
                ToggleLayout {
                    id: 1,
                    kind: ToggleKind::Door,
                    position: Vec3::new(0.0, 0.0, 6.0),
                    range: None,
                    is_on: None,
                    light_radius: None,
                },
                ToggleLayout {
                    id: 2,
                    kind: ToggleKind::Lamp,
                    position: Vec3::new(-6.0, 2.0, 0.0),
                    range: None,
                    is_on: None,
                    light_radius: None,
                },
                ToggleLayout {
                    id: 3,
                    kind: ToggleKind::Window,
                    position: Vec3::new(10.0, 1.0, 0.0),
                    range: None,
                    is_on: None,
                    light_radius: None,
                },
            ],
            fixtures: vec![LightEmitter::Sphere(SphereEmitter {
                position: Vec3::new(0.0, 3.0, -12.0),
                radius: 3.0,
                enabled: true,
            })],
            occluders: vec![
                Aabb::new(Vec3::new(-14.0, 0.0, 5.9), Vec3::new(-1.0, 3.0, 6.1)),
                Aabb::new(Vec3::new(1.0, 0.0, 5.9), Vec3::new(14.0, 3.0, 6.1)),
            ],
            exits: vec![ExitView {
                position: Vec3::new(0.0, 0.0, 14.0),
                radius: 2.0,
            }],
            stations: vec![StationLayout {
                id: 1,
                position: Vec3::new(12.0, 0.0, -10.0),
            }],
            ghost_waypoints: vec![
                Vec3::new(8.0, 0.0, -4.0),
                Vec3::new(-5.0, 0.0, -1.0),
                Vec3::new(-10.0, 0.0, -10.0),
                Vec3::new(6.0, 0.0, 10.0),
            ],
        }
    }
}
