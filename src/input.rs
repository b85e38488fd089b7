//! Per-player frame-indexed input buffering
//!
//! Each player gets a fixed window of the last 250 frames of input (5
//! seconds at 50 Hz), stored newest-first: offset 0 is the current frame.
//! Frames whose real input has not arrived yet hold a prediction — a
//! repeat of the newest input actually received from that player.

use crate::consts::{MAX_PLAYER_NMB, WINDOW_BUFFER_SIZE};
use crate::error::EngineError;
use crate::{Frame, PlayerInput};

/// Sliding input window for every player in the match.
#[derive(Debug, Clone)]
pub struct InputRingBuffer {
    /// Newest-first: `inputs[p][0]` is player p's input for the current frame
    inputs: [[PlayerInput; WINDOW_BUFFER_SIZE]; MAX_PLAYER_NMB],
    /// Highest frame each player has actually sent an input for
    last_received_frame: [Frame; MAX_PLAYER_NMB],
}

impl InputRingBuffer {
    pub fn new() -> Self {
        Self {
            inputs: [[0; WINDOW_BUFFER_SIZE]; MAX_PLAYER_NMB],
            last_received_frame: [0; MAX_PLAYER_NMB],
        }
    }

    /// Highest frame this player has sent a real input for.
    #[inline]
    pub fn last_received_frame(&self, player: usize) -> Frame {
        self.last_received_frame[player]
    }

    /// Store an arrived input. When it is the newest ever received from this
    /// player, every more-recent slot is back-filled with it: until the real
    /// inputs arrive, the best prediction is "they kept holding the same
    /// buttons".
    ///
    /// Inputs older than the window are dropped with a warning; redundant
    /// retransmissions land there routinely under heavy delay.
    pub fn set_input(
        &mut self,
        player: usize,
        input: PlayerInput,
        frame: Frame,
        current_frame: Frame,
    ) {
        debug_assert!(frame <= current_frame);
        let offset = (current_frame - frame) as usize;
        if offset >= WINDOW_BUFFER_SIZE {
            log::warn!(
                "dropping input from player {player} for frame {frame}: \
                 outside the window at frame {current_frame}"
            );
            return;
        }
        self.inputs[player][offset] = input;
        if self.last_received_frame[player] < frame {
            self.last_received_frame[player] = frame;
            for slot in 0..offset {
                self.inputs[player][slot] = input;
            }
        }
    }

    /// Input (real or predicted) for `frame`. Asking beyond the buffered
    /// window is unrecoverable: the history needed to resimulate is gone.
    pub fn get(
        &self,
        player: usize,
        frame: Frame,
        current_frame: Frame,
    ) -> Result<PlayerInput, EngineError> {
        let offset = current_frame
            .checked_sub(frame)
            .map(|offset| offset as usize)
            .ok_or(EngineError::InputOutOfWindow {
                player: player as crate::PlayerNumber,
                frame,
                current: current_frame,
            })?;
        if offset >= WINDOW_BUFFER_SIZE {
            return Err(EngineError::InputOutOfWindow {
                player: player as crate::PlayerNumber,
                frame,
                current: current_frame,
            });
        }
        Ok(self.inputs[player][offset])
    }

    /// Slide the window forward by `delta` frames: everything shifts toward
    /// the past and the freshly exposed head repeats the last known input.
    pub fn shift(&mut self, delta: Frame) {
        let delta = delta as usize;
        for inputs in &mut self.inputs {
            let latest = inputs[0];
            if delta >= WINDOW_BUFFER_SIZE {
                inputs.fill(latest);
                continue;
            }
            for slot in (delta..WINDOW_BUFFER_SIZE).rev() {
                inputs[slot] = inputs[slot - delta];
            }
            for slot in 0..delta {
                inputs[slot] = latest;
            }
        }
    }

    /// Newest-first slice of one player's window, for building input packets.
    #[inline]
    pub fn window(&self, player: usize) -> &[PlayerInput] {
        &self.inputs[player]
    }
}

impl Default for InputRingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
