//! Packet types and in-process network simulation
//!
//! The wire format stops here: packets are plain serde-able values and the
//! transport encoding is the integrator's business. `SimulatedLink` stands
//! in for a real socket during development and testing, adding seeded
//! latency jitter and drop of unreliable packets.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::consts::MAX_PLAYER_NMB;
use crate::{Frame, PhysicsState, PlayerInput, PlayerNumber};

/// A window of one player's recent inputs. Unreliable: redundancy inside
/// the window covers lost packets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInputPacket {
    pub player_number: PlayerNumber,
    pub current_frame: Frame,
    /// Newest first: `inputs[i]` belongs to frame `current_frame - i`
    pub inputs: Vec<PlayerInput>,
}

/// Server-confirmed frame plus the per-player physics fingerprints to
/// check against. Reliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmFramePacket {
    pub frame: Frame,
    pub physics_states: [PhysicsState; MAX_PLAYER_NMB],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPlayerPacket {
    pub player_number: PlayerNumber,
    pub position: Vec2,
    /// Radians
    pub rotation: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnBallPacket {
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnBoundaryPacket {
    pub position: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnHomePacket {
    pub player_number: PlayerNumber,
    pub position: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnHealthBarPacket {
    pub player_number: PlayerNumber,
    pub position: Vec2,
}

/// Everything that crosses the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    PlayerInput(PlayerInputPacket),
    ConfirmFrame(ConfirmFramePacket),
    SpawnPlayer(SpawnPlayerPacket),
    SpawnBall(SpawnBallPacket),
    SpawnBoundary(SpawnBoundaryPacket),
    SpawnHome(SpawnHomePacket),
    SpawnHealthBar(SpawnHealthBarPacket),
}

#[derive(Debug, Clone)]
struct InFlight {
    remaining: f32,
    packet: Packet,
}

/// One direction of a fake connection: packets sit in flight for
/// `avg_delay ± margin_delay` seconds, and unreliable sends are dropped
/// with probability `packet_loss`. Seeded, so a test run is repeatable.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    avg_delay: f32,
    margin_delay: f32,
    packet_loss: f32,
    rng: Pcg32,
    in_flight: Vec<InFlight>,
}

impl SimulatedLink {
    /// A perfect link: no delay, no loss. Shape it with `with_delay` and
    /// `with_loss`.
    pub fn new(seed: u64) -> Self {
        Self {
            avg_delay: 0.0,
            margin_delay: 0.0,
            packet_loss: 0.0,
            rng: Pcg32::seed_from_u64(seed),
            in_flight: Vec::new(),
        }
    }

    pub fn with_delay(mut self, avg_delay: f32, margin_delay: f32) -> Self {
        self.avg_delay = avg_delay;
        self.margin_delay = margin_delay;
        self
    }

    pub fn with_loss(mut self, packet_loss: f32) -> Self {
        self.packet_loss = packet_loss;
        self
    }

    /// Queue a packet that must arrive (still subject to delay).
    pub fn send_reliable(&mut self, packet: Packet) {
        self.queue(packet);
    }

    /// Queue a packet that may be dropped.
    pub fn send_unreliable(&mut self, packet: Packet) {
        if self.packet_loss > 0.0 && self.rng.gen_range(0.0..1.0f32) < self.packet_loss {
            return;
        }
        self.queue(packet);
    }

    fn queue(&mut self, packet: Packet) {
        let jitter = if self.margin_delay > 0.0 {
            self.rng.gen_range(-self.margin_delay..=self.margin_delay)
        } else {
            0.0
        };
        self.in_flight.push(InFlight {
            remaining: (self.avg_delay + jitter).max(0.0),
            packet,
        });
    }

    /// Advance time; packets whose delay has elapsed are delivered.
    /// Jittered delays can reorder deliveries, exactly like the real thing.
    pub fn update(&mut self, dt: f32) -> Vec<Packet> {
        let mut delivered = Vec::new();
        self.in_flight.retain_mut(|in_flight| {
            in_flight.remaining -= dt;
            if in_flight.remaining <= 0.0 {
                delivered.push(in_flight.packet.clone());
                false
            } else {
                true
            }
        });
        delivered
    }

    /// Packets still in the air.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }
}
