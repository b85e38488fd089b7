//! Rollo Pong - two-player networked pong with rollback netcode
//!
//! Core modules:
//! - `ecs`: Minimal entity registry and dense component storage
//! - `physics`: Kinematic bodies, AABB triggers, fixed-step world
//! - `game`: Gameplay components and collision-category rules
//! - `input`: Per-player frame-indexed input window
//! - `rollback`: Prediction, rewind and resimulation over two world snapshots
//! - `session`: Client/host coordinators driving the engine at 50 Hz
//! - `net`: Packet types and an in-process simulated link
//!
//! The simulation must stay bit-exact across peers: fixed timestep only,
//! plain f32 math in a stable order, and iteration sorted by entity handle.
//! A compact physics fingerprint exchanged at frame confirmation is the
//! canary for divergence.

pub mod ecs;
pub mod error;
pub mod game;
pub mod input;
pub mod net;
pub mod physics;
pub mod rollback;
pub mod session;

pub use error::EngineError;
pub use rollback::RollbackEngine;
pub use session::{HostSession, SessionCoordinator};

/// Player slot index, `0..consts::MAX_PLAYER_NMB`.
pub type PlayerNumber = u8;

/// Marks an unassigned or unknown player slot.
pub const INVALID_PLAYER: PlayerNumber = PlayerNumber::MAX;

/// Monotonic simulation frame counter (20 ms per frame).
pub type Frame = u32;

/// One player's buttons for one frame, packed as a bitset.
pub type PlayerInput = u8;

/// Compact per-player physics digest exchanged at frame confirmation.
pub type PhysicsState = u16;

/// Button bits inside a [`PlayerInput`].
pub mod input_flags {
    use super::PlayerInput;

    pub const NONE: PlayerInput = 0;
    pub const UP: PlayerInput = 1 << 0;
    pub const DOWN: PlayerInput = 1 << 1;
    pub const LEFT: PlayerInput = 1 << 2;
    pub const RIGHT: PlayerInput = 1 << 3;
    pub const SHOOT: PlayerInput = 1 << 4;
}

/// Fixed simulation constants. These must match bit-exactly between peers.
pub mod consts {
    use glam::Vec2;

    /// Fixed simulation timestep (50 Hz)
    pub const FIXED_PERIOD: f32 = 0.02;
    /// Input window size per player: 5 seconds of frames at 50 Hz
    pub const WINDOW_BUFFER_SIZE: usize = 5 * 50;
    /// Maximum number of inputs carried by one input packet
    pub const MAX_INPUTS_PER_PACKET: usize = 50;
    /// Number of players in a match
    pub const MAX_PLAYER_NMB: usize = 2;

    /// Player defaults
    pub const PLAYER_MAX_HEALTH: i16 = 5;
    pub const PLAYER_SPEED: f32 = 200.0;
    /// How long a player is marked hurt after conceding a goal (seconds)
    pub const PLAYER_HURT_PERIOD: f32 = 1.15;
    /// Paddle collider half-extents
    pub const PLAYER_BOX_EXTENTS: Vec2 = Vec2::new(0.1, 3.0);
    pub const SPAWN_POSITIONS: [Vec2; MAX_PLAYER_NMB] =
        [Vec2::new(-3.0, 0.0), Vec2::new(3.0, 0.0)];

    /// Ball defaults
    pub const BALL_INITIAL_SPEED: f32 = 3.0;
    pub const BALL_MAX_SPEED: f32 = 25.0;
    /// Speed boost when the ball hits a paddle (multiplicative)
    pub const BALL_RATIO_SPEED_INCREASE: f32 = 1.15;
    /// |x| where the ball reappears after a goal, on the scorer's side
    pub const BALL_RESPAWN_X: f32 = 8.5;
    /// Render scale of the ball sprite; the collider is a fraction of it
    pub const BALL_SCALE: f32 = 0.75;
    pub const BALL_BOX_EXTENTS: Vec2 = Vec2::splat(BALL_SCALE * 0.17);

    /// Court boundaries
    pub const TOP_BOUNDARY_Y: f32 = 4.3;
    pub const BOTTOM_BOUNDARY_Y: f32 = -4.3;
    pub const TOP_BOUNDARY_POS: Vec2 = Vec2::new(0.0, TOP_BOUNDARY_Y);
    pub const BOTTOM_BOUNDARY_POS: Vec2 = Vec2::new(0.0, BOTTOM_BOUNDARY_Y);
    /// Boundary collider half-extents; the body is pushed outward by one
    /// extent so the inner face sits exactly on the boundary line
    pub const BOUNDARY_BOX_EXTENTS: Vec2 = Vec2::new(1000.0, 1000.0);

    /// Homes (goals). Same outward-offset trick as the boundaries: the
    /// trigger face sits exactly on the home x
    pub const HOME_POSITIONS: [Vec2; MAX_PLAYER_NMB] =
        [Vec2::new(-9.5, 0.0), Vec2::new(9.5, 0.0)];
    pub const HOME_BOX_EXTENTS: Vec2 = Vec2::new(500.0, 4.25);

    /// Health bars (render-only entities, rescaled on health change)
    pub const HEALTHBAR_POSITIONS: [Vec2; MAX_PLAYER_NMB] =
        [Vec2::new(-9.47, 4.5), Vec2::new(7.67, 4.5)];
    pub const HEALTHBAR_SCALE: Vec2 = Vec2::new(1.8, 0.25);
}
