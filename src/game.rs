//! Gameplay components and collision-category rules
//!
//! Everything here is a stateless transformer over a world snapshot: paddle
//! control runs once per simulated frame, the trigger listeners react to
//! the overlap events the physics step reports. The rollback engine calls
//! both during plain prediction and during resimulation, so none of it may
//! read anything outside the snapshot it is handed.

use glam::Vec2;

use crate::consts;
use crate::ecs::{mask, ComponentStore, Entity, EntityRegistry};
use crate::input_flags;
use crate::physics::{Body, BoxCollider, Transform};
use crate::{PlayerInput, PlayerNumber, INVALID_PLAYER};

/// Paddle state for one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerCharacter {
    pub input: PlayerInput,
    pub player_number: PlayerNumber,
    /// Remaining lives, `0..=PLAYER_MAX_HEALTH`
    pub health: i16,
    /// Seconds left of the post-goal hurt flash
    pub hurt_time: f32,
}

impl Default for PlayerCharacter {
    fn default() -> Self {
        Self {
            input: input_flags::NONE,
            player_number: INVALID_PLAYER,
            health: consts::PLAYER_MAX_HEALTH,
            hurt_time: 0.0,
        }
    }
}

/// The ball remembers who touched it last; that player scores on the next
/// home contact.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ball {
    pub last_touching_player: PlayerNumber,
}

/// Top or bottom court edge. The collider lives in the body/box stores.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Boundary {
    pub position: Vec2,
}

/// A player's goal area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Home {
    /// The defender: this player loses health when the ball arrives
    pub player_number: PlayerNumber,
    pub position: Vec2,
}

impl Default for Home {
    fn default() -> Self {
        Self {
            player_number: INVALID_PLAYER,
            position: Vec2::ZERO,
        }
    }
}

/// Render-only health display, rescaled whenever its owner is hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthBar {
    pub player_number: PlayerNumber,
}

impl Default for HealthBar {
    fn default() -> Self {
        Self {
            player_number: INVALID_PLAYER,
        }
    }
}

/// One complete copy of the simulated world: every component store, no
/// registry (the registry is shared between snapshots and repaired during
/// rollback). Two of these exist at all times, the predicted Current and
/// the confirmed Validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldSnapshot {
    pub bodies: ComponentStore<Body>,
    pub boxes: ComponentStore<BoxCollider>,
    pub players: ComponentStore<PlayerCharacter>,
    pub balls: ComponentStore<Ball>,
    pub boundaries: ComponentStore<Boundary>,
    pub homes: ComponentStore<Home>,
    pub healthbars: ComponentStore<HealthBar>,
}

impl WorldSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale store overwrite; the restore half of a rollback.
    pub fn copy_all_from(&mut self, other: &Self) {
        self.bodies.copy_all_from(&other.bodies);
        self.boxes.copy_all_from(&other.boxes);
        self.players.copy_all_from(&other.players);
        self.balls.copy_all_from(&other.balls);
        self.boundaries.copy_all_from(&other.boundaries);
        self.homes.copy_all_from(&other.homes);
        self.healthbars.copy_all_from(&other.healthbars);
    }
}

/// Mutable view over one snapshot plus the bits of engine state the trigger
/// reactions touch. Built fresh for every simulated frame.
pub struct SimContext<'a> {
    pub registry: &'a EntityRegistry,
    pub world: &'a mut WorldSnapshot,
    pub transforms: &'a mut ComponentStore<Transform>,
    pub player_entities: &'a [Entity; consts::MAX_PLAYER_NMB],
    pub winner: &'a mut Option<PlayerNumber>,
}

impl SimContext<'_> {
    fn player_entity(&self, player: PlayerNumber) -> Entity {
        self.player_entities
            .get(player as usize)
            .copied()
            .unwrap_or(Entity::INVALID)
    }
}

/// Per-frame paddle control: vertical motion from the buffered input, held
/// inside the court, plus hurt-timer decay.
pub fn update_players(
    registry: &EntityRegistry,
    world: &mut WorldSnapshot,
    player_entities: &[Entity; consts::MAX_PLAYER_NMB],
    dt: f32,
) {
    for &entity in player_entities {
        if !registry.has_component(entity, mask::PLAYER | mask::BODY | mask::BOX) {
            continue;
        }
        let input = world.players.get(entity).input;
        let extents = world.boxes.get(entity).extents;
        let body = world.bodies.get_mut(entity);

        let up = input & input_flags::UP != 0
            && body.position.y + extents.y < consts::TOP_BOUNDARY_Y;
        let down = input & input_flags::DOWN != 0
            && body.position.y - extents.y > consts::BOTTOM_BOUNDARY_Y;

        let vertical = (if up { consts::PLAYER_SPEED } else { 0.0 })
            + (if down { -consts::PLAYER_SPEED } else { 0.0 });
        body.velocity = Vec2::new(0.0, vertical * dt);

        let player = world.players.get_mut(entity);
        if player.hurt_time > 0.0 {
            player.hurt_time = (player.hurt_time - dt).max(0.0);
        }
    }
}

/// Ball vs paddle: mirror the horizontal velocity and speed the rally up.
pub fn paddle_trigger(ctx: &mut SimContext<'_>, a: Entity, b: Entity) {
    if ctx.registry.has_component(a, mask::PLAYER) && ctx.registry.has_component(b, mask::BALL) {
        reflect_off_paddle(ctx, a, b);
    }
    if ctx.registry.has_component(b, mask::PLAYER) && ctx.registry.has_component(a, mask::BALL) {
        reflect_off_paddle(ctx, b, a);
    }
}

fn reflect_off_paddle(ctx: &mut SimContext<'_>, paddle: Entity, ball: Entity) {
    let paddle_x = ctx.world.bodies.get(paddle).position.x;
    let velocity = ctx.world.bodies.get(ball).velocity;

    // React only when the ball travels toward the paddle's half, so an
    // overlap lasting several frames reflects exactly once
    let toward_left = velocity.x < 0.0 && paddle_x < 0.0;
    let toward_right = velocity.x > 0.0 && paddle_x > 0.0;
    if !(toward_left || toward_right) {
        return;
    }

    let mut reflected = Vec2::new(-velocity.x, velocity.y) * consts::BALL_RATIO_SPEED_INCREASE;
    if reflected.x.abs() >= consts::BALL_MAX_SPEED {
        // Capped: keep the mirror, drop the speed-up
        reflected = Vec2::new(-velocity.x, velocity.y);
    }
    ctx.world.bodies.get_mut(ball).velocity = reflected;

    let player_number = ctx.world.players.get(paddle).player_number;
    ctx.world.balls.get_mut(ball).last_touching_player = player_number;
}

/// Ball vs court edge: mirror the vertical velocity, position untouched.
pub fn boundary_trigger(ctx: &mut SimContext<'_>, a: Entity, b: Entity) {
    if ctx.registry.has_component(a, mask::BOUNDARY) && ctx.registry.has_component(b, mask::BALL) {
        reflect_off_boundary(ctx, b);
    }
    if ctx.registry.has_component(b, mask::BOUNDARY) && ctx.registry.has_component(a, mask::BALL) {
        reflect_off_boundary(ctx, a);
    }
}

fn reflect_off_boundary(ctx: &mut SimContext<'_>, ball: Entity) {
    let body = ctx.world.bodies.get_mut(ball);
    body.velocity = Vec2::new(body.velocity.x, -body.velocity.y);
}

/// Ball vs home: the goal rule.
pub fn home_trigger(ctx: &mut SimContext<'_>, a: Entity, b: Entity) {
    if ctx.registry.has_component(a, mask::HOME) && ctx.registry.has_component(b, mask::BALL) {
        score(ctx, a, b);
    }
    if ctx.registry.has_component(b, mask::HOME) && ctx.registry.has_component(a, mask::BALL) {
        score(ctx, b, a);
    }
}

fn score(ctx: &mut SimContext<'_>, home: Entity, ball: Entity) {
    let registry = ctx.registry;
    let defender = ctx.world.homes.get(home).player_number;
    let attacker = ctx.world.balls.get(ball).last_touching_player;
    let defender_entity = ctx.player_entity(defender);
    let attacker_entity = ctx.player_entity(attacker);
    if defender_entity == Entity::INVALID || attacker_entity == Entity::INVALID {
        log::warn!("goal against player {defender} dropped: player entity missing");
        return;
    }

    let player = ctx.world.players.get_mut(defender_entity);
    player.hurt_time = consts::PLAYER_HURT_PERIOD;
    player.health = (player.health - 1).max(0);
    let health = player.health;

    for entity in registry.entities() {
        if registry.has_component(entity, mask::HEALTHBAR)
            && ctx.world.healthbars.get(entity).player_number == defender
        {
            let transform = ctx.transforms.get_mut(entity);
            transform.scale.x =
                consts::HEALTHBAR_SCALE.x * health as f32 / consts::PLAYER_MAX_HEALTH as f32;
        }
    }

    let winner = check_winner(registry, ctx.world);
    if winner != INVALID_PLAYER && ctx.winner.is_none() {
        log::debug!("player {winner} wins the match");
        *ctx.winner = Some(winner);
    }

    // Serve again from the scorer's side, at the scorer's height
    let attacker_position = ctx.world.bodies.get(attacker_entity).position;
    let side = if attacker_position.x < 0.0 { -1.0 } else { 1.0 };
    let body = ctx.world.bodies.get_mut(ball);
    let velocity = body.velocity;
    body.position = Vec2::new(side * consts::BALL_RESPAWN_X, attacker_position.y);
    if (velocity.x * consts::BALL_RATIO_SPEED_INCREASE).abs() >= consts::BALL_MAX_SPEED {
        // The rally outran the speed cap: reset to serve speed, headed back
        // into play
        let vertical = if velocity.y < 0.0 {
            -consts::BALL_INITIAL_SPEED
        } else {
            consts::BALL_INITIAL_SPEED
        };
        body.velocity = Vec2::new(-side * consts::BALL_INITIAL_SPEED, vertical);
    }
}

/// The match is decided when exactly one player still has health.
pub fn check_winner(registry: &EntityRegistry, world: &WorldSnapshot) -> PlayerNumber {
    let mut alive = 0;
    let mut winner = INVALID_PLAYER;
    for entity in registry.entities() {
        if !registry.has_component(entity, mask::PLAYER) {
            continue;
        }
        let player = world.players.get(entity);
        if player.health > 0 {
            alive += 1;
            winner = player.player_number;
        }
    }
    if alive == 1 {
        winner
    } else {
        INVALID_PLAYER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::BodyKind;

    struct Fixture {
        registry: EntityRegistry,
        world: WorldSnapshot,
        transforms: ComponentStore<Transform>,
        player_entities: [Entity; consts::MAX_PLAYER_NMB],
        winner: Option<PlayerNumber>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: EntityRegistry::new(),
                world: WorldSnapshot::new(),
                transforms: ComponentStore::new(),
                player_entities: [Entity::INVALID; consts::MAX_PLAYER_NMB],
                winner: None,
            }
        }

        fn ctx(&mut self) -> SimContext<'_> {
            SimContext {
                registry: &self.registry,
                world: &mut self.world,
                transforms: &mut self.transforms,
                player_entities: &self.player_entities,
                winner: &mut self.winner,
            }
        }

        fn spawn_player(&mut self, player_number: PlayerNumber, position: Vec2) -> Entity {
            let entity = self.registry.create();
            self.registry
                .add_component(entity, mask::TRANSFORM | mask::BODY | mask::BOX | mask::PLAYER);
            self.world.bodies.add(entity);
            self.world.bodies.set(
                entity,
                Body {
                    position,
                    ..Default::default()
                },
            );
            self.world.boxes.add(entity);
            self.world.boxes.set(
                entity,
                BoxCollider {
                    extents: consts::PLAYER_BOX_EXTENTS,
                },
            );
            self.world.players.add(entity);
            self.world.players.set(
                entity,
                PlayerCharacter {
                    player_number,
                    ..Default::default()
                },
            );
            self.transforms.add(entity);
            self.player_entities[player_number as usize] = entity;
            entity
        }

        fn spawn_ball(&mut self, position: Vec2, velocity: Vec2) -> Entity {
            let entity = self.registry.create();
            self.registry
                .add_component(entity, mask::TRANSFORM | mask::BODY | mask::BOX | mask::BALL);
            self.world.bodies.add(entity);
            self.world.bodies.set(
                entity,
                Body {
                    position,
                    velocity,
                    ..Default::default()
                },
            );
            self.world.boxes.add(entity);
            self.world.boxes.set(
                entity,
                BoxCollider {
                    extents: consts::BALL_BOX_EXTENTS,
                },
            );
            self.world.balls.add(entity);
            self.transforms.add(entity);
            entity
        }

        fn spawn_home(&mut self, player_number: PlayerNumber, position: Vec2) -> Entity {
            let entity = self.registry.create();
            self.registry
                .add_component(entity, mask::TRANSFORM | mask::BODY | mask::BOX | mask::HOME);
            self.world.bodies.add(entity);
            self.world.bodies.set(
                entity,
                Body {
                    position,
                    kind: BodyKind::Static,
                    ..Default::default()
                },
            );
            self.world.boxes.add(entity);
            self.world.homes.add(entity);
            self.world.homes.set(
                entity,
                Home {
                    player_number,
                    position,
                },
            );
            self.transforms.add(entity);
            entity
        }

        fn spawn_healthbar(&mut self, player_number: PlayerNumber) -> Entity {
            let entity = self.registry.create();
            self.registry
                .add_component(entity, mask::TRANSFORM | mask::HEALTHBAR);
            self.world.healthbars.add(entity);
            self.world
                .healthbars
                .set(entity, HealthBar { player_number });
            self.transforms.add(entity);
            self.transforms.set(
                entity,
                Transform {
                    scale: consts::HEALTHBAR_SCALE,
                    ..Default::default()
                },
            );
            entity
        }
    }

    #[test]
    fn test_paddle_moves_up_on_input() {
        let mut fx = Fixture::new();
        let paddle = fx.spawn_player(0, Vec2::new(-3.0, 0.0));
        fx.world.players.get_mut(paddle).input = input_flags::UP;

        update_players(
            &fx.registry,
            &mut fx.world,
            &fx.player_entities,
            consts::FIXED_PERIOD,
        );

        let expected = consts::PLAYER_SPEED * consts::FIXED_PERIOD;
        assert_eq!(fx.world.bodies.get(paddle).velocity, Vec2::new(0.0, expected));
    }

    #[test]
    fn test_paddle_blocked_at_boundary() {
        let mut fx = Fixture::new();
        let paddle = fx.spawn_player(0, Vec2::new(-3.0, 0.0));

        // Flush against the top edge: UP is refused, DOWN still allowed
        fx.world.bodies.get_mut(paddle).position.y =
            consts::TOP_BOUNDARY_Y - consts::PLAYER_BOX_EXTENTS.y;
        fx.world.players.get_mut(paddle).input = input_flags::UP;
        update_players(
            &fx.registry,
            &mut fx.world,
            &fx.player_entities,
            consts::FIXED_PERIOD,
        );
        assert_eq!(fx.world.bodies.get(paddle).velocity, Vec2::ZERO);

        fx.world.players.get_mut(paddle).input = input_flags::DOWN;
        update_players(
            &fx.registry,
            &mut fx.world,
            &fx.player_entities,
            consts::FIXED_PERIOD,
        );
        let expected = -consts::PLAYER_SPEED * consts::FIXED_PERIOD;
        assert_eq!(fx.world.bodies.get(paddle).velocity, Vec2::new(0.0, expected));
    }

    #[test]
    fn test_opposed_inputs_cancel() {
        let mut fx = Fixture::new();
        let paddle = fx.spawn_player(0, Vec2::new(-3.0, 0.0));
        fx.world.players.get_mut(paddle).input = input_flags::UP | input_flags::DOWN;

        update_players(
            &fx.registry,
            &mut fx.world,
            &fx.player_entities,
            consts::FIXED_PERIOD,
        );
        assert_eq!(fx.world.bodies.get(paddle).velocity, Vec2::ZERO);
    }

    #[test]
    fn test_hurt_time_decays_to_zero() {
        let mut fx = Fixture::new();
        let paddle = fx.spawn_player(0, Vec2::new(-3.0, 0.0));
        fx.world.players.get_mut(paddle).hurt_time = 0.03;

        update_players(
            &fx.registry,
            &mut fx.world,
            &fx.player_entities,
            consts::FIXED_PERIOD,
        );
        assert!((fx.world.players.get(paddle).hurt_time - 0.01).abs() < 1e-6);

        update_players(
            &fx.registry,
            &mut fx.world,
            &fx.player_entities,
            consts::FIXED_PERIOD,
        );
        assert_eq!(fx.world.players.get(paddle).hurt_time, 0.0);
    }

    #[test]
    fn test_paddle_reflects_incoming_ball() {
        let mut fx = Fixture::new();
        let paddle = fx.spawn_player(1, Vec2::new(3.0, 0.0));
        let ball = fx.spawn_ball(Vec2::new(2.9, 0.0), Vec2::new(3.0, 3.0));

        paddle_trigger(&mut fx.ctx(), paddle, ball);

        let velocity = fx.world.bodies.get(ball).velocity;
        assert!((velocity.x - (-3.45)).abs() < 1e-6);
        assert!((velocity.y - 3.45).abs() < 1e-6);
        assert_eq!(fx.world.balls.get(ball).last_touching_player, 1);
    }

    #[test]
    fn test_paddle_ignores_outgoing_ball() {
        let mut fx = Fixture::new();
        let paddle = fx.spawn_player(1, Vec2::new(3.0, 0.0));
        let ball = fx.spawn_ball(Vec2::new(3.1, 0.0), Vec2::new(-3.45, 3.45));

        // Still overlapping after last frame's reflection: no double hit
        paddle_trigger(&mut fx.ctx(), paddle, ball);

        assert_eq!(fx.world.bodies.get(ball).velocity, Vec2::new(-3.45, 3.45));
        assert_eq!(fx.world.balls.get(ball).last_touching_player, 0);
    }

    #[test]
    fn test_speed_cap_skips_multiplier() {
        let mut fx = Fixture::new();
        let paddle = fx.spawn_player(1, Vec2::new(3.0, 0.0));
        let ball = fx.spawn_ball(Vec2::new(2.9, 0.0), Vec2::new(22.0, 1.0));

        // |22 * 1.15| = 25.3 >= 25: mirror without the boost
        paddle_trigger(&mut fx.ctx(), paddle, ball);

        assert_eq!(fx.world.bodies.get(ball).velocity, Vec2::new(-22.0, 1.0));
    }

    #[test]
    fn test_boundary_flips_vertical_velocity() {
        let mut fx = Fixture::new();
        let boundary = {
            let entity = fx.registry.create();
            fx.registry
                .add_component(entity, mask::BODY | mask::BOX | mask::BOUNDARY);
            fx.world.bodies.add(entity);
            fx.world.boxes.add(entity);
            fx.world.boundaries.add(entity);
            entity
        };
        let ball = fx.spawn_ball(Vec2::new(0.0, 4.2), Vec2::new(1.0, 3.0));

        boundary_trigger(&mut fx.ctx(), boundary, ball);

        let body = fx.world.bodies.get(ball);
        assert_eq!(body.velocity, Vec2::new(1.0, -3.0));
        assert_eq!(body.position, Vec2::new(0.0, 4.2));
    }

    #[test]
    fn test_goal_hurts_defender_and_respawns_ball() {
        let mut fx = Fixture::new();
        fx.spawn_player(0, Vec2::new(-3.0, 0.0));
        let defender = fx.spawn_player(1, Vec2::new(3.0, 0.0));
        let home = fx.spawn_home(1, Vec2::new(9.5, 0.0));
        let bar = fx.spawn_healthbar(1);
        let ball = fx.spawn_ball(Vec2::new(9.4, 0.0), Vec2::new(5.0, 0.0));

        home_trigger(&mut fx.ctx(), home, ball);

        let player = fx.world.players.get(defender);
        assert_eq!(player.health, 4);
        assert_eq!(player.hurt_time, consts::PLAYER_HURT_PERIOD);

        // Health bar rescaled to 4/5 of its base width
        let expected_scale = consts::HEALTHBAR_SCALE.x * 4.0 / 5.0;
        assert!((fx.transforms.get(bar).scale.x - expected_scale).abs() < 1e-6);

        // Attacker is player 0 (ball untouched): serve from the left, at the
        // attacker's height, velocity preserved below the cap
        let body = fx.world.bodies.get(ball);
        assert_eq!(body.position, Vec2::new(-consts::BALL_RESPAWN_X, 0.0));
        assert_eq!(body.velocity, Vec2::new(5.0, 0.0));
        assert!(fx.winner.is_none());
    }

    #[test]
    fn test_goal_resets_velocity_when_rally_outran_cap() {
        let mut fx = Fixture::new();
        fx.spawn_player(0, Vec2::new(-3.0, 0.0));
        fx.spawn_player(1, Vec2::new(3.0, 0.0));
        let home = fx.spawn_home(1, Vec2::new(9.5, 0.0));
        let ball = fx.spawn_ball(Vec2::new(9.4, 0.5), Vec2::new(24.0, -10.0));

        home_trigger(&mut fx.ctx(), home, ball);

        // |24 * 1.15| >= 25: back to serve speed, rightward (attacker 0 sits
        // on the left), vertical sign kept
        let body = fx.world.bodies.get(ball);
        assert_eq!(
            body.velocity,
            Vec2::new(consts::BALL_INITIAL_SPEED, -consts::BALL_INITIAL_SPEED)
        );
    }

    #[test]
    fn test_last_goal_decides_winner() {
        let mut fx = Fixture::new();
        fx.spawn_player(0, Vec2::new(-3.0, 0.0));
        let defender = fx.spawn_player(1, Vec2::new(3.0, 0.0));
        let home = fx.spawn_home(1, Vec2::new(9.5, 0.0));
        let ball = fx.spawn_ball(Vec2::new(9.4, 0.0), Vec2::new(5.0, 0.0));
        fx.world.players.get_mut(defender).health = 1;

        home_trigger(&mut fx.ctx(), home, ball);

        assert_eq!(fx.world.players.get(defender).health, 0);
        assert_eq!(fx.winner, Some(0));
    }

    #[test]
    fn test_check_winner_needs_exactly_one_survivor() {
        let mut fx = Fixture::new();
        let a = fx.spawn_player(0, Vec2::new(-3.0, 0.0));
        let b = fx.spawn_player(1, Vec2::new(3.0, 0.0));

        assert_eq!(check_winner(&fx.registry, &fx.world), INVALID_PLAYER);

        fx.world.players.get_mut(b).health = 0;
        assert_eq!(check_winner(&fx.registry, &fx.world), 0);

        fx.world.players.get_mut(a).health = 0;
        assert_eq!(check_winner(&fx.registry, &fx.world), INVALID_PLAYER);
    }
}
