//! # Headless Game Client Library
//!
//! Client side of the hide-and-seek match. The client never decides
//! anything on its own: it forwards player commands as requests, mirrors the
//! state the server replicates, and proposes its own light exposure for the
//! server to weigh.
//!
//! ## Module Organization
//!
//! ### Authority Module (`authority`)
//! Gates every subsystem that drives the local actor. Subsystems start
//! disabled and only switch on when the server grants control of our actor.
//!
//! ### Game Module (`game`)
//! The replicated mirror:
//! - Participant views from snapshots
//! - Keys, phase and remaining time from events
//! - Local light evaluation for the exposure proposal
//!
//! ### Input Module (`input`)
//! Parses text commands and turns them into sequenced request packets.
//!
//! ### Interactable Module (`interactable`)
//! Doors, lamps and windows as observed from the client, with transition
//! cues and proximity hints.
//!
//! ### Network Module (`network`)
//! UDP socket, stdin command loop, heartbeats and the periodic light report.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = client::network::Client::new("127.0.0.1:8080", None, 0).await?;
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod authority;
pub mod game;
pub mod input;
pub mod interactable;
pub mod network;
