//! Identities of scene entities

use std::cell::Cell;

/// Identity of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

/// Identity of a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub u64);

/// Identity of a shadow map association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowId(pub u64);

/// Identity of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

/// Source of fresh ids, shared by everything that creates scene entities
#[derive(Debug, Default)]
pub struct IdPool {
    next: Cell<u64>,
}

impl IdPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&self) -> u64 {
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }

    pub fn instance(&self) -> InstanceId {
        InstanceId(self.fresh())
    }

    pub fn light(&self) -> LightId {
        LightId(self.fresh())
    }

    pub fn shadow(&self) -> ShadowId {
        ShadowId(self.fresh())
    }

    pub fn material(&self) -> MaterialId {
        MaterialId(self.fresh())
    }
}
