//! Identifier minting
//!
//! Identifiers are minted eagerly at build time so proxies and membership
//! lists can be filled in before anything is persisted.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use super::{EntityId, EntityKind};

pub trait IdMinter: Send + Sync {
    fn mint(&self, kind: EntityKind) -> EntityId;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidMinter;

impl IdMinter for UuidMinter {
    fn mint(&self, _kind: EntityKind) -> EntityId {
        EntityId::new(Uuid::new_v4().to_string())
    }
}

/// Predictable `<kind>-<n>` identifiers
#[derive(Debug, Default)]
pub struct SequentialMinter {
    next: AtomicU64,
}

impl SequentialMinter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdMinter for SequentialMinter {
    fn mint(&self, kind: EntityKind) -> EntityId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        EntityId::new(format!("{}-{}", kind.as_str(), n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_minter_is_unique() {
        let minter = UuidMinter;
        assert_ne!(minter.mint(EntityKind::Resource), minter.mint(EntityKind::Resource));
    }

    #[test]
    fn test_sequential_minter() {
        let minter = SequentialMinter::new();
        assert_eq!(minter.mint(EntityKind::Resource).as_str(), "resource-1");
        assert_eq!(minter.mint(EntityKind::FileUnit).as_str(), "file_unit-2");
    }
}
