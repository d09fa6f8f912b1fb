pub mod allocator;
pub mod bevy_backend;
pub mod changes;
pub mod error;
pub mod types;

pub use allocator::EntityAllocator;
pub use bevy_backend::EcsAdapter;
pub use changes::{ChangeCollectors, Trigger};
pub use error::EcsError;
pub use types::{CollectorId, EntityId};

pub use bevy_ecs::component::Component;
