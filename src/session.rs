//! Session coordination around the rollback engine
//!
//! [`SessionCoordinator`] is the client half: it turns wall-clock time into
//! fixed 50 Hz frames, feeds local input into the engine, emits input
//! packets, and applies whatever the network delivers. [`HostSession`] is
//! the authoritative half: it replays every player's inputs, advances the
//! validated line as soon as all inputs for a frame have arrived, and
//! hands out confirmations carrying the physics fingerprints.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::consts;
use crate::ecs::{mask, Entity};
use crate::error::EngineError;
use crate::net::{
    ConfirmFramePacket, Packet, PlayerInputPacket, SpawnBallPacket, SpawnBoundaryPacket,
    SpawnHealthBarPacket, SpawnHomePacket, SpawnPlayerPacket,
};
use crate::physics::Transform;
use crate::rollback::RollbackEngine;
use crate::{Frame, PlayerInput, PlayerNumber, INVALID_PLAYER};

/// Client-side driver: one engine, one local player, a fixed-step residual.
pub struct SessionCoordinator {
    engine: RollbackEngine,
    client_player: PlayerNumber,
    fixed_timer: f32,
    started: bool,
}

impl SessionCoordinator {
    /// `client_player` is the locally controlled slot; pass
    /// [`INVALID_PLAYER`] for a spectator.
    pub fn new(client_player: PlayerNumber) -> Self {
        Self {
            engine: RollbackEngine::new(),
            client_player,
            fixed_timer: 0.0,
            started: false,
        }
    }

    #[inline]
    pub fn engine(&self) -> &RollbackEngine {
        &self.engine
    }

    #[inline]
    pub fn client_player(&self) -> PlayerNumber {
        self.client_player
    }

    /// Begin ticking. Called once every spawn packet has been applied.
    pub fn start_game(&mut self) {
        self.started = true;
    }

    #[inline]
    pub fn started(&self) -> bool {
        self.started
    }

    /// The match is over once a winner is decided.
    #[inline]
    pub fn finished(&self) -> bool {
        self.engine.winner().is_some()
    }

    #[inline]
    pub fn winner(&self) -> Option<PlayerNumber> {
        self.engine.winner()
    }

    #[inline]
    pub fn current_frame(&self) -> Frame {
        self.engine.current_frame()
    }

    #[inline]
    pub fn last_validate_frame(&self) -> Frame {
        self.engine.last_validate_frame()
    }

    /// Accumulate wall-clock time and advance whole 20 ms frames. Each new
    /// frame records the local input and emits an input packet for the
    /// server; the predicted world is rebuilt once per call.
    pub fn tick(
        &mut self,
        dt: f32,
        local_input: PlayerInput,
    ) -> Result<Vec<PlayerInputPacket>, EngineError> {
        let mut outgoing = Vec::new();
        if !self.started {
            return Ok(outgoing);
        }

        self.fixed_timer += dt;
        let mut stepped = false;
        while self.fixed_timer >= consts::FIXED_PERIOD {
            self.fixed_timer -= consts::FIXED_PERIOD;
            if self.finished() {
                continue;
            }
            let next_frame = self.engine.current_frame() + 1;
            self.engine.start_new_frame(next_frame);
            if self.client_player != INVALID_PLAYER {
                self.engine
                    .set_player_input(self.client_player, local_input, next_frame);
                outgoing.push(self.make_input_packet());
            }
            stepped = true;
        }

        if stepped {
            self.engine.simulate_to_current_frame()?;
        }
        Ok(outgoing)
    }

    /// Snapshot of the local player's input window, newest first, ready to
    /// send. Early in a match the window is shorter than the packet cap.
    pub fn make_input_packet(&self) -> PlayerInputPacket {
        let current_frame = self.engine.current_frame();
        let window = self.engine.input_window(self.client_player);
        let count = consts::MAX_INPUTS_PER_PACKET
            .min(current_frame as usize + 1)
            .min(window.len());
        PlayerInputPacket {
            player_number: self.client_player,
            current_frame,
            inputs: window[..count].to_vec(),
        }
    }

    /// Apply a remote player's input window. Our own packets echo back from
    /// the relay and are ignored.
    pub fn on_input_packet(&mut self, packet: &PlayerInputPacket) {
        if packet.player_number == self.client_player {
            return;
        }
        apply_input_window(&mut self.engine, packet);
    }

    /// Apply a server confirmation. Confirms older than our validated line
    /// or ahead of the inputs we hold are logged and dropped; a later
    /// confirmation covers the same ground.
    pub fn on_confirm_packet(&mut self, packet: &ConfirmFramePacket) -> Result<(), EngineError> {
        if packet.frame < self.engine.last_validate_frame() {
            log::warn!(
                "stale confirm for frame {} dropped (already validated through {})",
                packet.frame,
                self.engine.last_validate_frame()
            );
            return Ok(());
        }
        for player in 0..consts::MAX_PLAYER_NMB as PlayerNumber {
            let last_received = self.engine.last_received_frame(player);
            if last_received < packet.frame {
                log::warn!(
                    "confirm for frame {} dropped: player {player} inputs only through {last_received}",
                    packet.frame
                );
                return Ok(());
            }
        }
        self.engine.confirm_frame(packet.frame, &packet.physics_states)
    }

    /// Dispatch any received packet to its handler.
    pub fn on_packet(&mut self, packet: &Packet) -> Result<(), EngineError> {
        match packet {
            Packet::PlayerInput(packet) => {
                self.on_input_packet(packet);
                Ok(())
            }
            Packet::ConfirmFrame(packet) => self.on_confirm_packet(packet),
            Packet::SpawnPlayer(packet) => {
                self.engine
                    .spawn_player(packet.player_number, packet.position, packet.rotation);
                Ok(())
            }
            Packet::SpawnBall(packet) => {
                self.engine.spawn_ball(packet.position, packet.velocity);
                Ok(())
            }
            Packet::SpawnBoundary(packet) => {
                self.engine.spawn_boundary(packet.position);
                Ok(())
            }
            Packet::SpawnHome(packet) => {
                self.engine.spawn_home(packet.player_number, packet.position);
                Ok(())
            }
            Packet::SpawnHealthBar(packet) => {
                self.engine
                    .spawn_healthbar(packet.player_number, packet.position);
                Ok(())
            }
        }
    }

    /// Render-facing poses of every live, not-tentatively-destroyed entity.
    /// Read-only by design.
    pub fn transforms(&self) -> impl Iterator<Item = (Entity, &Transform)> {
        let engine = &self.engine;
        engine
            .registry()
            .entities()
            .filter(move |&entity| {
                engine.registry().has_component(entity, mask::TRANSFORM)
                    && !engine.registry().has_component(entity, mask::DESTROYED)
            })
            .map(move |entity| (entity, engine.transforms().get(entity)))
    }

    /// Predicted health of one player, if they are spawned.
    pub fn player_health(&self, player: PlayerNumber) -> Option<i16> {
        let entity = self.engine.player_entity(player);
        if !self.engine.registry().has_component(entity, mask::PLAYER) {
            return None;
        }
        Some(self.engine.current_world().players.get(entity).health)
    }
}

/// Authoritative session: validates frames as inputs arrive and emits the
/// confirmations clients check themselves against.
pub struct HostSession {
    engine: RollbackEngine,
    rng: Pcg32,
}

impl HostSession {
    pub fn new(seed: u64) -> Self {
        Self {
            engine: RollbackEngine::new(),
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn engine(&self) -> &RollbackEngine {
        &self.engine
    }

    #[inline]
    pub fn winner(&self) -> Option<PlayerNumber> {
        self.engine.winner()
    }

    /// Build the court and both players, serving the ball in a random
    /// diagonal. Returns the spawn packets to broadcast so every client
    /// mirrors the exact same world.
    pub fn start_match(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();

        for player in 0..consts::MAX_PLAYER_NMB as PlayerNumber {
            let position = consts::SPAWN_POSITIONS[player as usize];
            self.engine.spawn_player(player, position, 0.0);
            packets.push(Packet::SpawnPlayer(SpawnPlayerPacket {
                player_number: player,
                position,
                rotation: 0.0,
            }));

            let home_position = consts::HOME_POSITIONS[player as usize];
            self.engine.spawn_home(player, home_position);
            packets.push(Packet::SpawnHome(SpawnHomePacket {
                player_number: player,
                position: home_position,
            }));

            let bar_position = consts::HEALTHBAR_POSITIONS[player as usize];
            self.engine.spawn_healthbar(player, bar_position);
            packets.push(Packet::SpawnHealthBar(SpawnHealthBarPacket {
                player_number: player,
                position: bar_position,
            }));
        }

        for position in [consts::TOP_BOUNDARY_POS, consts::BOTTOM_BOUNDARY_POS] {
            self.engine.spawn_boundary(position);
            packets.push(Packet::SpawnBoundary(SpawnBoundaryPacket { position }));
        }

        let velocity = Vec2::new(
            if self.rng.gen_range(-1..=1) <= 0 {
                -consts::BALL_INITIAL_SPEED
            } else {
                consts::BALL_INITIAL_SPEED
            },
            if self.rng.gen_range(-1..=1) <= 0 {
                -consts::BALL_INITIAL_SPEED
            } else {
                consts::BALL_INITIAL_SPEED
            },
        );
        let position = Vec2::ZERO;
        self.engine.spawn_ball(position, velocity);
        packets.push(Packet::SpawnBall(SpawnBallPacket { position, velocity }));

        packets
    }

    /// Record an arriving input window, then try to push the validated line
    /// forward. A confirmation comes back whenever it moved.
    pub fn on_input_packet(
        &mut self,
        packet: &PlayerInputPacket,
    ) -> Result<Option<ConfirmFramePacket>, EngineError> {
        apply_input_window(&mut self.engine, packet);
        self.try_validate()
    }

    fn try_validate(&mut self) -> Result<Option<ConfirmFramePacket>, EngineError> {
        for player in 0..consts::MAX_PLAYER_NMB as PlayerNumber {
            if self.engine.player_entity(player) == Entity::INVALID {
                return Ok(None);
            }
        }
        let target = (0..consts::MAX_PLAYER_NMB as PlayerNumber)
            .map(|player| self.engine.last_received_frame(player))
            .min()
            .unwrap_or(0);
        if target <= self.engine.last_validate_frame() {
            return Ok(None);
        }

        self.engine.validate_frame(target)?;
        let mut physics_states = [0; consts::MAX_PLAYER_NMB];
        for player in 0..consts::MAX_PLAYER_NMB {
            physics_states[player] = self.engine.validate_physics_state(player as PlayerNumber)?;
        }
        Ok(Some(ConfirmFramePacket {
            frame: target,
            physics_states,
        }))
    }
}

/// Unpack a newest-first input window into per-frame engine inputs.
fn apply_input_window(engine: &mut RollbackEngine, packet: &PlayerInputPacket) {
    let count = packet.inputs.len().min(consts::MAX_INPUTS_PER_PACKET);
    for offset in 0..count as Frame {
        if offset > packet.current_frame {
            break;
        }
        engine.set_player_input(
            packet.player_number,
            packet.inputs[offset as usize],
            packet.current_frame - offset,
        );
    }
}
