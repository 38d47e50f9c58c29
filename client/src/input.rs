//! Text command input with movement sequencing
//!
//! The headless client reads one command per line. Movement commands are
//! stamped with a sequence number and timestamp so the server can order them
//! and acknowledge the last one it applied.

use crate::authority::ControlSubsystem;
use shared::{Packet, Vec3};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ready,
    Toggle(u32),
    Key(u32),
    Escape,
    ShadowForm(bool),
    Flashlight(bool),
    Recharge(u32),
    Move { x: f32, z: f32, yaw: f32, pitch: f32 },
    Status,
    Quit,
}

pub const HELP: &str = "commands: ready | toggle <id> | key <id> | escape | shadow on|off | \
flash on|off | recharge <id> | move <x> <z> [yaw] [pitch] | status | quit";

fn parse_switch(word: Option<&str>) -> Result<bool, String> {
    match word {
        Some("on") | Some("1") | Some("true") => Ok(true),
        Some("off") | Some("0") | Some("false") => Ok(false),
        other => Err(format!("expected on/off, got {:?}", other)),
    }
}

fn parse_id(word: Option<&str>) -> Result<u32, String> {
    let word = word.ok_or_else(|| "missing id".to_string())?;
    word.parse().map_err(|_| format!("invalid id: {}", word))
}

fn parse_float(word: Option<&str>, default: Option<f32>) -> Result<f32, String> {
    match (word, default) {
        (Some(word), _) => word.parse().map_err(|_| format!("invalid number: {}", word)),
        (None, Some(default)) => Ok(default),
        (None, None) => Err("missing number".to_string()),
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, String> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "empty command".to_string())?;

        match verb.to_ascii_lowercase().as_str() {
            "ready" => Ok(Command::Ready),
            "toggle" | "use" => Ok(Command::Toggle(parse_id(words.next())?)),
            "key" | "pickup" => Ok(Command::Key(parse_id(words.next())?)),
            "escape" => Ok(Command::Escape),
            "shadow" => Ok(Command::ShadowForm(parse_switch(words.next())?)),
            "flash" | "flashlight" => Ok(Command::Flashlight(parse_switch(words.next())?)),
            "recharge" => Ok(Command::Recharge(parse_id(words.next())?)),
            "move" => {
                let x = parse_float(words.next(), None)?;
                let z = parse_float(words.next(), None)?;
                let yaw = parse_float(words.next(), Some(0.0))?;
                let pitch = parse_float(words.next(), Some(0.0))?;
                Ok(Command::Move { x, z, yaw, pitch })
            }
            "status" => Ok(Command::Status),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

/// Turns commands into request packets. Disabled until the server grants
/// control of an actor.
pub struct InputManager {
    next_sequence: u32,
    enabled: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the packet for a command, or `None` for local-only commands
    /// and actor commands while control is disabled.
    pub fn to_packet(&mut self, command: &Command) -> Option<Packet> {
        let packet = match *command {
            Command::Ready => return Some(Packet::RequestRoleReadyToggle),
            Command::Status | Command::Quit => return None,
            _ if !self.enabled => return None,
            Command::Toggle(object_id) => Packet::RequestToggle { object_id },
            Command::Key(key_id) => Packet::RequestKeyPickup { key_id },
            Command::Escape => Packet::RequestEscape,
            Command::ShadowForm(active) => Packet::RequestShadowForm { active },
            Command::Flashlight(on) => Packet::RequestFlashlight { on },
            Command::Recharge(station_id) => Packet::RequestRecharge { station_id },
            Command::Move { x, z, yaw, pitch } => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                Packet::Move {
                    sequence,
                    timestamp: Self::get_timestamp(),
                    position: Vec3::new(x, 0.0, z),
                    yaw,
                    pitch,
                }
            }
        };
        Some(packet)
    }

    pub fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSubsystem for InputManager {
    fn name(&self) -> &'static str {
        "input"
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("ready"), Ok(Command::Ready));
        assert_eq!(Command::parse("toggle 3"), Ok(Command::Toggle(3)));
        assert_eq!(Command::parse("  KEY 2 "), Ok(Command::Key(2)));
        assert_eq!(Command::parse("shadow on"), Ok(Command::ShadowForm(true)));
        assert_eq!(Command::parse("flash off"), Ok(Command::Flashlight(false)));
        assert_eq!(
            Command::parse("move 1.5 -2 90"),
            Ok(Command::Move {
                x: 1.5,
                z: -2.0,
                yaw: 90.0,
                pitch: 0.0
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("toggle").is_err());
        assert!(Command::parse("toggle door").is_err());
        assert!(Command::parse("shadow maybe").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn test_actor_commands_need_control() {
        let mut input = InputManager::new();
        assert!(input.to_packet(&Command::Escape).is_none());
        assert!(matches!(
            input.to_packet(&Command::Ready),
            Some(Packet::RequestRoleReadyToggle)
        ));

        input.set_enabled(true);
        assert!(matches!(
            input.to_packet(&Command::Escape),
            Some(Packet::RequestEscape)
        ));
    }

    #[test]
    fn test_move_sequences_increase() {
        let mut input = InputManager::new();
        input.set_enabled(true);
        let command = Command::Move {
            x: 0.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
        };

        let sequences: Vec<u32> = (0..3)
            .filter_map(|_| match input.to_packet(&command) {
                Some(Packet::Move { sequence, .. }) => Some(sequence),
                _ => None,
            })
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_get_timestamp() {
        let timestamp1 = InputManager::get_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let timestamp2 = InputManager::get_timestamp();
        assert!(timestamp2 > timestamp1);
    }
}
