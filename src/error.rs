//! Session-fatal error taxonomy
//!
//! Anything in here means the two peers can no longer agree on the ground
//! truth; the session must be torn down. Recoverable conditions (stale
//! confirms, duplicate spawns) are logged and dropped instead of erroring.

use thiserror::Error;

use crate::ecs::Entity;
use crate::{Frame, PhysicsState, PlayerNumber};

/// Errors that terminate a rollback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Requested an input older than the buffered window
    #[error("input for player {player} at frame {frame} is outside the input window (current frame {current})")]
    InputOutOfWindow {
        player: PlayerNumber,
        frame: Frame,
        current: Frame,
    },

    /// Tried to validate a frame before every player's input arrived
    #[error("cannot validate frame {frame}: player {player} has only sent inputs up to frame {last_received}")]
    InputsNotReceived {
        player: PlayerNumber,
        frame: Frame,
        last_received: Frame,
    },

    /// The server's physics fingerprint disagrees with ours
    #[error("physics desync for player {player} at frame {frame}: server {server:#06x}, local {local:#06x}")]
    PhysicsDesync {
        player: PlayerNumber,
        frame: Frame,
        server: PhysicsState,
        local: PhysicsState,
    },

    /// Lookup on a freed or never-created entity handle
    #[error("entity {0:?} is not alive")]
    UnknownEntity(Entity),
}
