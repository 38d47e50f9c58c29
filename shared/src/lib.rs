pub mod control;
pub mod light;
pub mod math;

pub use control::{ControlGate, GateTransition};
pub use light::{
    evaluate_exposure, sample_points, ConeEmitter, EmitterKey, Exposure, LightEmitter,
    LightRegistry, SphereEmitter,
};
pub use math::{Aabb, Vec3};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PACKET_SIZE: usize = 8192;

pub const MATCH_DURATION_SECS: f32 = 300.0;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_NAME_CHARS: usize = 32;

pub const BODY_HEIGHT: f32 = 2.0;
pub const SHADOW_MAX_HEALTH: f32 = 20.0;
pub const HOSTILE_LIGHT_DAMAGE_PER_SEC: f32 = 8.0;
pub const HEALTH_REGEN_COOLDOWN_SECS: f32 = 2.0;
pub const HEALTH_REGEN_PER_SEC: f32 = 2.0;
pub const LIGHT_CHECK_INTERVAL_SECS: f32 = 0.1;

pub const FLASHLIGHT_RANGE: f32 = 10.0;
pub const FLASHLIGHT_SPOT_ANGLE: f32 = 30.0;
pub const FLASHLIGHT_HAND_HEIGHT: f32 = 1.5;
pub const FLASHLIGHT_MAX_BATTERY_SECS: f32 = 240.0;
pub const CHARGING_TIME_SECS: f32 = 5.0;
pub const CHARGING_RANGE: f32 = 3.0;

pub const KEY_PICKUP_RANGE: f32 = 1.5;
pub const DOOR_AUTO_CLOSE_SECS: f32 = 2.0;
pub const DOOR_TRANSITION_SECS: f32 = 0.5;

pub const SPAWN_POLL_INTERVAL_SECS: f32 = 0.5;
pub const SPAWN_MAX_POLLS: u32 = 20;

pub type ParticipantId = u32;
pub type ActorId = u32;
pub type ObjectId = u32;
pub type KeyId = u32;
pub type StationId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Guardian,
    Shadow,
}

impl Role {
    pub fn side(self) -> Side {
        match self {
            Role::Guardian => Side::Guardians,
            Role::Shadow => Side::Shadows,
        }
    }
}

/// Participant status. Alive is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Alive,
    Escaped,
    Dead,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Alive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Guardians,
    Shadows,
}

/// Time of night derived from match progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Evening,
    Night,
    Dawn,
}

impl Phase {
    /// `progress` is a percentage in [0, 100].
    pub fn from_progress(progress: f32) -> Self {
        if progress < 33.0 {
            Phase::Evening
        } else if progress < 66.0 {
            Phase::Night
        } else {
            Phase::Dawn
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToggleKind {
    Door,
    Lamp,
    Window,
}

/// Replicated view of one participant, sent in every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub actor_id: ActorId,
    pub name: String,
    pub role: Role,
    pub status: Status,
    pub health: f32,
    pub position: Vec3,
    pub yaw: f32,
    pub in_shadow_form: bool,
    pub in_light: bool,
    pub in_hostile_light: bool,
    pub flashlight_on: bool,
    pub battery_percent: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleView {
    pub id: ObjectId,
    pub kind: ToggleKind,
    pub position: Vec3,
    pub range: f32,
    pub is_on: bool,
    /// Radius of the sphere light a lamp drives.
    pub light_radius: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitView {
    pub position: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationView {
    pub id: StationId,
    pub position: Vec3,
    pub range: f32,
}

/// Static level data a client needs for hints and local light evaluation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LevelView {
    pub toggles: Vec<ToggleView>,
    pub fixtures: Vec<LightEmitter>,
    pub occluders: Vec<Aabb>,
    pub exits: Vec<ExitView>,
    pub stations: Vec<StationView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySeat {
    pub client_id: u32,
    pub name: String,
    pub ready: bool,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub participant_id: ParticipantId,
    pub role: Role,
    pub won: bool,
}

/// Raw writes to authoritative fields. Never honored from a connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StateMutation {
    Health {
        participant_id: ParticipantId,
        value: f32,
    },
    Role {
        participant_id: ParticipantId,
        role: Role,
    },
    Toggle {
        object_id: ObjectId,
        is_on: bool,
    },
}

/// State-change notifications pushed from the server to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    LobbyUpdated {
        seats: Vec<LobbySeat>,
    },
    LevelSync(LevelView),
    RoleAssigned {
        participant_id: ParticipantId,
        role: Role,
    },
    AuthorityGranted {
        actor_id: ActorId,
    },
    AuthorityRevoked {
        actor_id: ActorId,
    },
    MatchStarted {
        duration_secs: f32,
    },
    MatchStartFailed {
        reason: String,
    },
    HealthChanged {
        participant_id: ParticipantId,
        old: f32,
        new: f32,
    },
    StatusChanged {
        participant_id: ParticipantId,
        old: Status,
        new: Status,
    },
    ExposureChanged {
        participant_id: ParticipantId,
        in_light: bool,
        in_hostile_light: bool,
    },
    ShadowFormChanged {
        participant_id: ParticipantId,
        active: bool,
    },
    FlashlightChanged {
        participant_id: ParticipantId,
        on: bool,
    },
    ChargingChanged {
        station_id: StationId,
        participant_id: ParticipantId,
        active: bool,
    },
    ToggleStateChanged {
        object_id: ObjectId,
        old: bool,
        new: bool,
    },
    KeySpawned {
        key_id: KeyId,
        position: Vec3,
    },
    KeyCollected {
        key_id: KeyId,
        participant_id: ParticipantId,
    },
    KeyCountChanged {
        collected: u32,
        total: u32,
    },
    PhaseChanged {
        phase: Phase,
    },
    MatchEnded {
        winning_side: Side,
        results: Vec<ParticipantResult>,
    },
    GameOver {
        winning_side: Side,
        won: bool,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        display_name: Option<String>,
    },
    Heartbeat {
        timestamp: u64,
    },
    SpawnReady,
    Move {
        sequence: u32,
        timestamp: u64,
        position: Vec3,
        yaw: f32,
        pitch: f32,
    },
    RequestRoleReadyToggle,
    RequestToggle {
        object_id: ObjectId,
    },
    RequestKeyPickup {
        key_id: KeyId,
    },
    RequestEscape,
    RequestShadowForm {
        active: bool,
    },
    RequestFlashlight {
        on: bool,
    },
    RequestRecharge {
        station_id: StationId,
    },
    ReportLightStatus {
        in_light: bool,
        in_hostile_light: bool,
    },
    Mutate(StateMutation),
    Disconnect,

    Connected {
        client_id: u32,
    },
    Snapshot {
        tick: u32,
        timestamp: u64,
        time_remaining: f32,
        phase: Phase,
        last_processed_input: HashMap<u32, u32>,
        participants: Vec<ParticipantView>,
    },
    Event(ServerEvent),
    Disconnected {
        reason: String,
    },
}

/// One movement sample reported by the connection driving an actor.
#[derive(Debug, Clone)]
pub struct MoveInput {
    pub sequence: u32,
    pub timestamp: u64,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}
