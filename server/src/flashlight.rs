//! Guardian flashlight battery and charging stations

use crate::error::Rejection;
use shared::{
    ConeEmitter, ParticipantId, ServerEvent, StationId, StationView, Vec3, CHARGING_RANGE,
    CHARGING_TIME_SECS, FLASHLIGHT_HAND_HEIGHT, FLASHLIGHT_MAX_BATTERY_SECS, FLASHLIGHT_RANGE,
    FLASHLIGHT_SPOT_ANGLE,
};

/// Battery is measured in seconds of light left.
#[derive(Debug, Clone, PartialEq)]
pub struct Flashlight {
    on: bool,
    battery: f32,
}

impl Default for Flashlight {
    fn default() -> Self {
        Self::new()
    }
}

impl Flashlight {
    pub fn new() -> Self {
        Self {
            on: false,
            battery: FLASHLIGHT_MAX_BATTERY_SECS,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn battery(&self) -> f32 {
        self.battery
    }

    pub fn battery_percent(&self) -> f32 {
        self.battery / FLASHLIGHT_MAX_BATTERY_SECS * 100.0
    }

    pub fn missing(&self) -> f32 {
        FLASHLIGHT_MAX_BATTERY_SECS - self.battery
    }

    pub fn switch(&mut self, on: bool) -> Result<(), Rejection> {
        if on == self.on {
            return Err(Rejection::NoChange);
        }
        if on && self.battery <= 0.0 {
            return Err(Rejection::BatteryEmpty);
        }
        self.on = on;
        Ok(())
    }

    pub fn switch_off(&mut self) {
        self.on = false;
    }

    /// Drains the battery while on. Returns true if it just ran flat.
    pub fn drain(&mut self, dt: f32) -> bool {
        if !self.on {
            return false;
        }
        self.battery = (self.battery - dt).max(0.0);
        if self.battery <= 0.0 {
            self.on = false;
            return true;
        }
        false
    }

    pub fn charge(&mut self, amount: f32) {
        self.battery = (self.battery + amount).min(FLASHLIGHT_MAX_BATTERY_SECS);
    }

    pub fn fill(&mut self) {
        self.battery = FLASHLIGHT_MAX_BATTERY_SECS;
    }

    /// Hostile cone held at hand height, pointing along the holder's view.
    pub fn emitter(&self, feet: Vec3, yaw: f32, pitch: f32) -> ConeEmitter {
        ConeEmitter {
            position: feet + Vec3::UP * FLASHLIGHT_HAND_HEIGHT,
            forward: Vec3::from_yaw_pitch(yaw, pitch),
            range: FLASHLIGHT_RANGE,
            spot_angle: FLASHLIGHT_SPOT_ANGLE,
            enabled: self.on,
            hostile: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ChargeSession {
    participant_id: ParticipantId,
    rate: f32,
    elapsed: f32,
}

#[derive(Debug, Clone)]
pub struct ChargingStation {
    pub id: StationId,
    pub position: Vec3,
    pub range: f32,
    session: Option<ChargeSession>,
}

impl ChargingStation {
    pub fn new(id: StationId, position: Vec3) -> Self {
        Self {
            id,
            position,
            range: CHARGING_RANGE,
            session: None,
        }
    }

    pub fn charging(&self) -> Option<ParticipantId> {
        self.session.as_ref().map(|s| s.participant_id)
    }

    pub fn in_range(&self, position: Vec3) -> bool {
        self.position.distance(position) <= self.range
    }

    pub fn start(
        &mut self,
        participant_id: ParticipantId,
        position: Vec3,
        flashlight: &Flashlight,
    ) -> Result<ServerEvent, Rejection> {
        if self.session.is_some() {
            return Err(Rejection::StationBusy(self.id));
        }
        if !self.in_range(position) {
            return Err(Rejection::OutOfRange {
                participant: participant_id,
                object: self.id,
            });
        }
        if flashlight.missing() <= 0.0 {
            return Err(Rejection::NoChange);
        }

        self.session = Some(ChargeSession {
            participant_id,
            rate: flashlight.missing() / CHARGING_TIME_SECS,
            elapsed: 0.0,
        });
        Ok(ServerEvent::ChargingChanged {
            station_id: self.id,
            participant_id,
            active: true,
        })
    }

    /// Ends the session, keeping whatever charge was already added.
    pub fn cancel(&mut self) -> Option<ServerEvent> {
        self.session.take().map(|s| ServerEvent::ChargingChanged {
            station_id: self.id,
            participant_id: s.participant_id,
            active: false,
        })
    }

    /// Advances the active session. `holder` is where the charging
    /// participant currently stands.
    pub fn tick(
        &mut self,
        dt: f32,
        holder: Vec3,
        flashlight: &mut Flashlight,
    ) -> Option<ServerEvent> {
        if !self.in_range(holder) {
            return self.cancel();
        }

        let session = self.session.as_mut()?;
        session.elapsed += dt;
        if session.elapsed >= CHARGING_TIME_SECS {
            flashlight.fill();
            return self.cancel();
        }

        flashlight.charge(session.rate * dt);
        None
    }

    pub fn view(&self) -> StationView {
        StationView {
            id: self.id,
            position: self.position,
            range: self.range,
        }
    }
}
