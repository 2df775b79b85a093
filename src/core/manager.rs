//! Entity-stack interface
//!
//! The scanning engine crosses an entity boundary in exactly one place:
//! a refill asked to change entities finds the current source exhausted.
//! It then asks the stack for the entity to resume. How entities are
//! declared, resolved and pushed is the caller's policy; the engine only
//! needs the pop.

use crate::core::entity::ScannedEntity;

/// Source of suspended entities for the engine to resume.
pub trait EntityStack {
    /// Suspend an entity. The engine pushes the current entity here when
    /// the caller starts scanning a nested one.
    fn push_entity(&mut self, entity: ScannedEntity);

    /// Called when the current entity is exhausted and the refill was
    /// asked to cross the boundary. `None` means no further input exists.
    fn pop_entity(&mut self) -> Option<ScannedEntity>;
}

/// Vec-backed LIFO stack, the reference implementation used by tests and
/// callers without a resolution layer.
#[derive(Debug, Default)]
pub struct SimpleEntityStack {
    entities: Vec<ScannedEntity>,
}

impl SimpleEntityStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }
}

impl EntityStack for SimpleEntityStack {
    fn push_entity(&mut self, entity: ScannedEntity) {
        self.entities.push(entity);
    }

    fn pop_entity(&mut self) -> Option<ScannedEntity> {
        self.entities.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::EntityLocation;

    #[test]
    fn test_lifo_order() {
        let mut stack = SimpleEntityStack::new();
        stack.push_entity(ScannedEntity::internal(EntityLocation::default(), "first"));
        stack.push_entity(ScannedEntity::internal(EntityLocation::default(), "second"));
        assert_eq!(stack.len(), 2);
        let top = stack.pop_entity().unwrap();
        assert!(!top.is_external());
        assert_eq!(stack.len(), 1);
        assert!(stack.pop_entity().is_some());
        assert!(stack.pop_entity().is_none());
    }
}
