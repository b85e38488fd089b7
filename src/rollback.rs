//! Prediction, rewind and resimulation
//!
//! The engine owns two copies of the world. `Validated` is the ground
//! truth both peers have agreed on, frozen at `last_validate_frame`.
//! `Current` is a prediction: every simulation pass throws it away,
//! restores it from `Validated`, and replays forward with the freshest
//! buffered inputs. Mis-predictions therefore heal for free, at the cost
//! of resimulating the unconfirmed window each pass.
//!
//! Entity bookkeeping across rewinds:
//! - entities spawned after the validated frame are destroyed at the start
//!   of each pass (a resimulation that still wants them respawns them);
//! - entities destroyed after the validated frame only carry a `DESTROYED`
//!   tag, which the pass clears, so they re-emerge until a validation
//!   makes the destruction final.

use glam::Vec2;

use crate::consts;
use crate::ecs::{mask, ComponentStore, Entity, EntityRegistry};
use crate::error::EngineError;
use crate::game::{self, Boundary, HealthBar, Home, PlayerCharacter, SimContext, WorldSnapshot};
use crate::input::InputRingBuffer;
use crate::physics::{Body, BodyKind, BoxCollider, PhysicsWorld, Transform};
use crate::{Frame, PhysicsState, PlayerInput, PlayerNumber};

#[derive(Debug, Clone, Copy)]
struct CreatedEntity {
    entity: Entity,
    created_frame: Frame,
}

/// The rollback simulation core.
pub struct RollbackEngine {
    registry: EntityRegistry,
    physics: PhysicsWorld,
    current: WorldSnapshot,
    validated: WorldSnapshot,
    /// Render-facing poses, synced from `current` after each pass
    transforms: ComponentStore<Transform>,
    inputs: InputRingBuffer,
    current_frame: Frame,
    last_validate_frame: Frame,
    /// Frame being resimulated right now; spawns are stamped with it
    tested_frame: Frame,
    created_entities: Vec<CreatedEntity>,
    player_entities: [Entity; consts::MAX_PLAYER_NMB],
    winner: Option<PlayerNumber>,
}

impl RollbackEngine {
    pub fn new() -> Self {
        let mut physics = PhysicsWorld::new();
        physics.register_trigger_listener(game::paddle_trigger);
        physics.register_trigger_listener(game::boundary_trigger);
        physics.register_trigger_listener(game::home_trigger);
        Self {
            registry: EntityRegistry::new(),
            physics,
            current: WorldSnapshot::new(),
            validated: WorldSnapshot::new(),
            transforms: ComponentStore::new(),
            inputs: InputRingBuffer::new(),
            current_frame: 0,
            last_validate_frame: 0,
            tested_frame: 0,
            created_entities: Vec::new(),
            player_entities: [Entity::INVALID; consts::MAX_PLAYER_NMB],
            winner: None,
        }
    }

    #[inline]
    pub fn current_frame(&self) -> Frame {
        self.current_frame
    }

    #[inline]
    pub fn last_validate_frame(&self) -> Frame {
        self.last_validate_frame
    }

    /// Decided winner, if the match is over.
    #[inline]
    pub fn winner(&self) -> Option<PlayerNumber> {
        self.winner
    }

    pub fn player_entity(&self, player: PlayerNumber) -> Entity {
        self.player_entities
            .get(player as usize)
            .copied()
            .unwrap_or(Entity::INVALID)
    }

    #[inline]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    #[inline]
    pub fn current_world(&self) -> &WorldSnapshot {
        &self.current
    }

    #[inline]
    pub fn validated_world(&self) -> &WorldSnapshot {
        &self.validated
    }

    #[inline]
    pub fn transforms(&self) -> &ComponentStore<Transform> {
        &self.transforms
    }

    #[inline]
    pub fn last_received_frame(&self, player: PlayerNumber) -> Frame {
        self.inputs.last_received_frame(player as usize)
    }

    /// Newest-first input window for one player, for outgoing packets.
    #[inline]
    pub fn input_window(&self, player: PlayerNumber) -> &[PlayerInput] {
        self.inputs.window(player as usize)
    }

    /// Rebuild the predicted world: rewind to the validated snapshot and
    /// replay every frame up to `current_frame` with the freshest inputs,
    /// then hand the resulting poses to the transform store.
    pub fn simulate_to_current_frame(&mut self) -> Result<(), EngineError> {
        self.rewind_to_validated();
        self.resimulate(self.current_frame)?;
        self.sync_transforms();
        Ok(())
    }

    /// Record an arrived input. An input ahead of the current frame starts
    /// the frames in between, repeating last known inputs.
    pub fn set_player_input(&mut self, player: PlayerNumber, input: PlayerInput, frame: Frame) {
        if player as usize >= consts::MAX_PLAYER_NMB {
            return;
        }
        if self.current_frame < frame {
            self.start_new_frame(frame);
        }
        self.inputs
            .set_input(player as usize, input, frame, self.current_frame);
    }

    /// Advance the head of time. No-op when `new_frame` is not ahead.
    pub fn start_new_frame(&mut self, new_frame: Frame) {
        if new_frame <= self.current_frame {
            return;
        }
        self.inputs.shift(new_frame - self.current_frame);
        self.current_frame = new_frame;
    }

    /// Advance the agreed-on line of history to `new_validate_frame`.
    ///
    /// Requires every player's real input up to that frame; validating on
    /// predictions would freeze a guess into the ground truth.
    pub fn validate_frame(&mut self, new_validate_frame: Frame) -> Result<(), EngineError> {
        for player in 0..consts::MAX_PLAYER_NMB {
            let last_received = self.inputs.last_received_frame(player);
            if last_received < new_validate_frame {
                return Err(EngineError::InputsNotReceived {
                    player: player as PlayerNumber,
                    frame: new_validate_frame,
                    last_received,
                });
            }
        }
        if self.current_frame < new_validate_frame {
            self.start_new_frame(new_validate_frame);
        }

        self.rewind_to_validated();
        self.resimulate(new_validate_frame)?;

        // Destructions that survived resimulation are final: free the slots
        for index in 0..self.registry.len() {
            let entity = Entity::from_raw(index as u32);
            if self.registry.has_component(entity, mask::DESTROYED) {
                self.registry.destroy(entity);
            }
        }

        self.validated.copy_all_from(&self.current);
        self.last_validate_frame = new_validate_frame;
        self.created_entities.clear();
        Ok(())
    }

    /// Validate up to `new_validate_frame`, then check our snapshot against
    /// the server's physics fingerprints. A mismatch means the peers have
    /// diverged for good.
    pub fn confirm_frame(
        &mut self,
        new_validate_frame: Frame,
        server_states: &[PhysicsState; consts::MAX_PLAYER_NMB],
    ) -> Result<(), EngineError> {
        self.validate_frame(new_validate_frame)?;
        for player in 0..consts::MAX_PLAYER_NMB {
            let local = self.validate_physics_state(player as PlayerNumber)?;
            if server_states[player] != local {
                return Err(EngineError::PhysicsDesync {
                    player: player as PlayerNumber,
                    frame: new_validate_frame,
                    server: server_states[player],
                    local,
                });
            }
        }
        Ok(())
    }

    /// Physics fingerprint of one player, taken from the validated snapshot.
    pub fn validate_physics_state(
        &self,
        player: PlayerNumber,
    ) -> Result<PhysicsState, EngineError> {
        let entity = self.player_entity(player);
        if !self.registry.has_component(entity, mask::PLAYER | mask::BODY) {
            return Err(EngineError::UnknownEntity(entity));
        }
        Ok(physics_fingerprint(self.validated.bodies.get(entity)))
    }

    /// Drop everything newer than the validated frame and restore the
    /// validated component stores into the current ones.
    fn rewind_to_validated(&mut self) {
        for created in &self.created_entities {
            if created.created_frame > self.last_validate_frame {
                self.registry.destroy(created.entity);
            }
        }
        self.created_entities.clear();

        // Tentative destroys come back; resimulation decides their fate again
        for index in 0..self.registry.len() {
            let entity = Entity::from_raw(index as u32);
            if self.registry.has_component(entity, mask::DESTROYED) {
                self.registry.remove_component(entity, mask::DESTROYED);
            }
        }

        self.current.copy_all_from(&self.validated);
    }

    /// Replay frames `last_validate_frame + 1 ..= to_frame` over the
    /// current snapshot.
    fn resimulate(&mut self, to_frame: Frame) -> Result<(), EngineError> {
        for frame in (self.last_validate_frame + 1)..=to_frame {
            self.tested_frame = frame;

            for player in 0..consts::MAX_PLAYER_NMB {
                let input = self.inputs.get(player, frame, self.current_frame)?;
                let entity = self.player_entities[player];
                if !self.registry.has_component(entity, mask::PLAYER) {
                    log::warn!("no entity for player {player} while simulating frame {frame}");
                    continue;
                }
                self.current.players.get_mut(entity).input = input;
            }

            game::update_players(
                &self.registry,
                &mut self.current,
                &self.player_entities,
                consts::FIXED_PERIOD,
            );
            let mut ctx = SimContext {
                registry: &self.registry,
                world: &mut self.current,
                transforms: &mut self.transforms,
                player_entities: &self.player_entities,
                winner: &mut self.winner,
            };
            self.physics.step(&mut ctx, consts::FIXED_PERIOD);
        }
        Ok(())
    }

    /// Hand the predicted poses to the render-facing transform store.
    fn sync_transforms(&mut self) {
        for index in 0..self.registry.len() {
            let entity = Entity::from_raw(index as u32);
            if !self
                .registry
                .has_component(entity, mask::BODY | mask::TRANSFORM)
            {
                continue;
            }
            let body = self.current.bodies.get(entity);
            let transform = self.transforms.get_mut(entity);
            transform.position = body.position;
            transform.rotation = body.rotation;
        }
    }

    /// Spawn a paddle for `player_number`. Spawning an already-present
    /// player is dropped with a warning.
    pub fn spawn_player(
        &mut self,
        player_number: PlayerNumber,
        position: Vec2,
        rotation: f32,
    ) -> Entity {
        if player_number as usize >= consts::MAX_PLAYER_NMB {
            log::warn!("spawn for out-of-range player {player_number} dropped");
            return Entity::INVALID;
        }
        let existing = self.player_entities[player_number as usize];
        if self.registry.is_alive(existing) {
            log::warn!("duplicate spawn for player {player_number} dropped");
            return existing;
        }
        log::debug!("spawning player {player_number} at {position}");

        let entity = self.registry.create();
        self.registry.add_component(
            entity,
            mask::TRANSFORM | mask::BODY | mask::BOX | mask::PLAYER,
        );
        self.created_entities.push(CreatedEntity {
            entity,
            created_frame: self.tested_frame,
        });

        let body = Body {
            position,
            rotation,
            ..Default::default()
        };
        let collider = BoxCollider {
            extents: consts::PLAYER_BOX_EXTENTS,
        };
        let character = PlayerCharacter {
            player_number,
            ..Default::default()
        };
        for world in [&mut self.current, &mut self.validated] {
            world.bodies.add(entity);
            world.bodies.set(entity, body);
            world.boxes.add(entity);
            world.boxes.set(entity, collider);
            world.players.add(entity);
            world.players.set(entity, character);
        }

        self.transforms.add(entity);
        self.transforms.set(
            entity,
            Transform {
                position,
                rotation,
                scale: Vec2::ONE,
            },
        );
        self.player_entities[player_number as usize] = entity;
        entity
    }

    pub fn spawn_ball(&mut self, position: Vec2, velocity: Vec2) -> Entity {
        log::debug!("spawning ball at {position} with velocity {velocity}");
        let entity = self.registry.create();
        self.registry
            .add_component(entity, mask::TRANSFORM | mask::BODY | mask::BOX | mask::BALL);
        self.created_entities.push(CreatedEntity {
            entity,
            created_frame: self.tested_frame,
        });

        let body = Body {
            position,
            velocity,
            ..Default::default()
        };
        let collider = BoxCollider {
            extents: consts::BALL_BOX_EXTENTS,
        };
        for world in [&mut self.current, &mut self.validated] {
            world.bodies.add(entity);
            world.bodies.set(entity, body);
            world.boxes.add(entity);
            world.boxes.set(entity, collider);
            world.balls.add(entity);
        }

        self.transforms.add(entity);
        self.transforms.set(
            entity,
            Transform {
                position,
                scale: Vec2::splat(consts::BALL_SCALE),
                ..Default::default()
            },
        );
        entity
    }

    /// Spawn a court edge. The oversized collider is pushed outward so its
    /// inner face sits exactly on the boundary line.
    pub fn spawn_boundary(&mut self, position: Vec2) -> Entity {
        let entity = self.registry.create();
        self.registry.add_component(
            entity,
            mask::TRANSFORM | mask::BODY | mask::BOX | mask::BOUNDARY,
        );
        self.created_entities.push(CreatedEntity {
            entity,
            created_frame: self.tested_frame,
        });

        let offset = if position.y > 0.0 {
            consts::BOUNDARY_BOX_EXTENTS.y
        } else {
            -consts::BOUNDARY_BOX_EXTENTS.y
        };
        let body = Body {
            position: Vec2::new(position.x, position.y + offset),
            kind: BodyKind::Static,
            ..Default::default()
        };
        let collider = BoxCollider {
            extents: consts::BOUNDARY_BOX_EXTENTS,
        };
        for world in [&mut self.current, &mut self.validated] {
            world.bodies.add(entity);
            world.bodies.set(entity, body);
            world.boxes.add(entity);
            world.boxes.set(entity, collider);
            world.boundaries.add(entity);
            world.boundaries.set(entity, Boundary { position });
        }

        self.transforms.add(entity);
        self.transforms.set(
            entity,
            Transform {
                position,
                ..Default::default()
            },
        );
        entity
    }

    /// Spawn `player_number`'s goal area behind their paddle. Same
    /// outward-offset trick as the boundaries.
    pub fn spawn_home(&mut self, player_number: PlayerNumber, position: Vec2) -> Entity {
        let entity = self.registry.create();
        self.registry
            .add_component(entity, mask::TRANSFORM | mask::BODY | mask::BOX | mask::HOME);
        self.created_entities.push(CreatedEntity {
            entity,
            created_frame: self.tested_frame,
        });

        let offset = if position.x > 0.0 {
            consts::HOME_BOX_EXTENTS.x
        } else {
            -consts::HOME_BOX_EXTENTS.x
        };
        let body = Body {
            position: Vec2::new(position.x + offset, position.y),
            kind: BodyKind::Static,
            ..Default::default()
        };
        let collider = BoxCollider {
            extents: consts::HOME_BOX_EXTENTS,
        };
        for world in [&mut self.current, &mut self.validated] {
            world.bodies.add(entity);
            world.bodies.set(entity, body);
            world.boxes.add(entity);
            world.boxes.set(entity, collider);
            world.homes.add(entity);
            world.homes.set(
                entity,
                Home {
                    player_number,
                    position,
                },
            );
        }

        self.transforms.add(entity);
        self.transforms.set(
            entity,
            Transform {
                position,
                ..Default::default()
            },
        );
        entity
    }

    /// Spawn a health bar display for `player_number`. Render-only: no body,
    /// no collider; goals rescale its transform.
    pub fn spawn_healthbar(&mut self, player_number: PlayerNumber, position: Vec2) -> Entity {
        let entity = self.registry.create();
        self.registry
            .add_component(entity, mask::TRANSFORM | mask::HEALTHBAR);
        self.created_entities.push(CreatedEntity {
            entity,
            created_frame: self.tested_frame,
        });

        for world in [&mut self.current, &mut self.validated] {
            world.healthbars.add(entity);
            world.healthbars.set(entity, HealthBar { player_number });
        }

        self.transforms.add(entity);
        self.transforms.set(
            entity,
            Transform {
                position,
                scale: consts::HEALTHBAR_SCALE,
                ..Default::default()
            },
        );
        entity
    }

    /// Destroy an entity, rollback-safely. Entities never seen by a
    /// validation are freed on the spot; anything older is only tagged and
    /// reclaimed at the next validation, so a rewind can resurrect it.
    pub fn destroy_entity(&mut self, entity: Entity) {
        if !self.registry.is_alive(entity) {
            return;
        }
        if let Some(index) = self
            .created_entities
            .iter()
            .position(|created| created.entity == entity)
        {
            self.created_entities.swap_remove(index);
            self.registry.destroy(entity);
            return;
        }
        self.registry.add_component(entity, mask::DESTROYED);
    }
}

impl Default for RollbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Compact digest of one body's motion state: the wrapping sum of the
/// sixteen-bit words of (position, velocity, rotation, angular velocity).
/// Bit-exact floats in, equal fingerprints out, on any conforming peer.
pub fn physics_fingerprint(body: &Body) -> PhysicsState {
    let words = [
        body.position.x,
        body.position.y,
        body.velocity.x,
        body.velocity.y,
        body.rotation,
        body.angular_velocity,
    ];
    let mut state: PhysicsState = 0;
    for value in words {
        let bits = value.to_bits();
        state = state.wrapping_add(bits as PhysicsState);
        state = state.wrapping_add((bits >> 16) as PhysicsState);
    }
    state
}
