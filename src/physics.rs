//! Kinematic bodies and AABB trigger detection
//!
//! The physics here is deliberately thin: bodies integrate by velocity,
//! boxes overlap or they don't, and overlaps are reported as trigger
//! events. There is no contact resolution; every reaction is scripted per
//! collision category by the listeners the game registers.
//!
//! Determinism rules: integration and the pair scan iterate in ascending
//! entity-slot order, each unordered pair is reported at most once per
//! step, and listeners run immediately so later pairs in the same step
//! observe earlier reactions.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::ecs::{mask, Entity};
use crate::game::SimContext;

/// How a body responds to the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyKind {
    /// Moved by its velocity each step
    #[default]
    Dynamic,
    /// Never moves; velocity stays zero
    Static,
}

/// Point-mass body state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Radians
    pub rotation: f32,
    /// Radians per second
    pub angular_velocity: f32,
    pub kind: BodyKind,
}

impl Default for Body {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            angular_velocity: 0.0,
            kind: BodyKind::Dynamic,
        }
    }
}

/// Axis-aligned box collider, stored as half-extents in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoxCollider {
    pub extents: Vec2,
}

/// Render-facing pose, synced from the body after each simulation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    /// Radians
    pub rotation: f32,
    pub scale: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
        }
    }
}

/// A trigger reaction. Plain function pointers keep the listener list
/// trivially copyable between steps; all mutable state rides in the
/// [`SimContext`].
pub type TriggerListener = fn(&mut SimContext<'_>, Entity, Entity);

/// Steps kinematics and dispatches AABB overlap events.
#[derive(Default)]
pub struct PhysicsWorld {
    listeners: Vec<TriggerListener>,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reaction for every overlapping pair. Listeners are called
    /// in registration order with `(a, b)` in ascending handle order.
    pub fn register_trigger_listener(&mut self, listener: TriggerListener) {
        self.listeners.push(listener);
    }

    /// Advance every dynamic body, then report each overlapping pair once.
    pub fn step(&self, ctx: &mut SimContext<'_>, dt: f32) {
        let slots = ctx.registry.len();

        for index in 0..slots {
            let entity = Entity::from_raw(index as u32);
            if !ctx.registry.has_component(entity, mask::BODY)
                || ctx.registry.has_component(entity, mask::DESTROYED)
            {
                continue;
            }
            let body = ctx.world.bodies.get_mut(entity);
            if body.kind == BodyKind::Dynamic {
                body.position += body.velocity * dt;
                body.rotation += body.angular_velocity * dt;
            }
        }

        for i in 0..slots {
            let a = Entity::from_raw(i as u32);
            if !collidable(ctx, a) {
                continue;
            }
            for j in (i + 1)..slots {
                let b = Entity::from_raw(j as u32);
                // Re-checked: an earlier reaction may have retired either side
                if !collidable(ctx, a) {
                    break;
                }
                if !collidable(ctx, b) {
                    continue;
                }
                let overlapping = {
                    let body_a = ctx.world.bodies.get(a);
                    let body_b = ctx.world.bodies.get(b);
                    if body_a.kind == BodyKind::Static && body_b.kind == BodyKind::Static {
                        false
                    } else {
                        aabb_overlap(
                            body_a.position,
                            ctx.world.boxes.get(a).extents,
                            body_b.position,
                            ctx.world.boxes.get(b).extents,
                        )
                    }
                };
                if overlapping {
                    for listener in &self.listeners {
                        listener(ctx, a, b);
                    }
                }
            }
        }
    }
}

fn collidable(ctx: &SimContext<'_>, entity: Entity) -> bool {
    ctx.registry.has_component(entity, mask::BODY | mask::BOX)
        && !ctx.registry.has_component(entity, mask::DESTROYED)
}

/// Inclusive AABB overlap: touching faces count as contact, so a body
/// sliding exactly onto the boundary line still fires its trigger.
#[inline]
pub fn aabb_overlap(pos_a: Vec2, ext_a: Vec2, pos_b: Vec2, ext_b: Vec2) -> bool {
    (pos_a.x - pos_b.x).abs() <= ext_a.x + ext_b.x && (pos_a.y - pos_b.y).abs() <= ext_a.y + ext_b.y
}
