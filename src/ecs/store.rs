//! Dense component storage keyed by entity slot index
//!
//! A plain parallel `Vec<T>`: no indirection, so restoring a snapshot is a
//! single `clone_from` per store and indices stay valid across rollback.

use super::Entity;

/// Per-entity storage for one component type.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentStore<T> {
    components: Vec<T>,
}

impl<T: Clone + Default> ComponentStore<T> {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Make room for `entity`, default-initializing its slot (and any slot
    /// below it that the registry allocated while this store lagged behind).
    pub fn add(&mut self, entity: Entity) {
        if self.components.len() <= entity.index() {
            self.components.resize(entity.index() + 1, T::default());
        }
        self.components[entity.index()] = T::default();
    }

    pub fn set(&mut self, entity: Entity, value: T) {
        self.components[entity.index()] = value;
    }

    #[inline]
    pub fn get(&self, entity: Entity) -> &T {
        &self.components[entity.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, entity: Entity) -> &mut T {
        &mut self.components[entity.index()]
    }

    /// Whole-store overwrite, used to restore one snapshot from the other.
    /// Reuses the existing allocation when capacities allow.
    pub fn copy_all_from(&mut self, other: &Self) {
        self.components.clone_from(&other.components);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl<T: Clone + Default> Default for ComponentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
