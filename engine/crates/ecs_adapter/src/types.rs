use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

impl EntityId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Packed form used as the `GUID` of an entity.
    pub fn to_u64(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    pub fn from_u64(val: u64) -> Self {
        Self {
            index: val as u32,
            generation: (val >> 32) as u32,
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E({}v{})", self.index, self.generation)
    }
}

/// Handle to a change collector registered with [`crate::EcsAdapter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct CollectorId(pub u32);

impl std::fmt::Display for CollectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "C{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_u64_roundtrip() {
        let id = EntityId::new(42, 7);
        assert_eq!(id, EntityId::from_u64(id.to_u64()));
    }

    #[test]
    fn entity_id_u64_boundary() {
        let id = EntityId::new(u32::MAX, u32::MAX);
        assert_eq!(id, EntityId::from_u64(id.to_u64()));
    }

    #[test]
    fn entity_id_ordering_is_index_first() {
        let a = EntityId::new(1, 9);
        let b = EntityId::new(2, 0);
        assert!(a < b);
        assert_eq!(format!("{a}"), "E(1v9)");
    }
}
