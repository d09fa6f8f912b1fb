//! Every phase of the round, one module per group.

pub mod appearance;
pub mod archive;
pub mod combat;
pub mod connect;
pub mod conversation;
pub mod kick_off;
pub mod movement;
pub mod planning;
pub mod props;
pub mod round;
pub mod skill;
pub mod upkeep;

use std::collections::BTreeSet;

use ecs_adapter::EntityId;

use crate::actions::ActionComponent;
use crate::components::{Actor, Stage, World};
use crate::context::RpgContext;

pub use appearance::UpdateAppearanceSystem;
pub use archive::{CompressHistorySystem, UpdateArchiveSystem};
pub use combat::{DamageSystem, DeadSystem, HealSystem};
pub use connect::{ClientFactory, ConnectSystem};
pub use conversation::{
    AnnounceSystem, ConversationCheckSystem, MindVoiceSystem, SpeakSystem, StageNarrateSystem, TagSystem, WhisperSystem,
};
pub use kick_off::KickOffSystem;
pub use movement::{GoToSystem, PreGoToSystem};
pub use planning::{ActorPlanningSystem, PostPlanningSystem, PrePlanningSystem, StagePlanningSystem};
pub use props::{
    EquipPropSystem, InspectSystem, PickUpPropSystem, StageTransferSystem, StealPropSystem, TransferPropSystem,
};
pub use round::{PlayerInputSystem, RoundStartSystem};
pub use skill::{BehaviorSystem, SkillSystem};
pub use upkeep::{
    ClientMessageSystem, DestroySystem, GameOverTeardown, PostActionSystem, SaveSystem, SaveTeardown,
};

/// Every entity that owns an agent: world systems, stages and actors.
pub(crate) fn agent_entities(ctx: &RpgContext) -> Vec<EntityId> {
    let mut all: BTreeSet<EntityId> = BTreeSet::new();
    all.extend(ctx.ecs.entities_with::<World>());
    all.extend(ctx.ecs.entities_with::<Stage>());
    all.extend(ctx.ecs.entities_with::<Actor>());
    all.into_iter().collect()
}

/// Values of an action on `entity`, empty when absent.
pub(crate) fn action_values<A: ActionComponent>(ctx: &RpgContext, entity: EntityId) -> Vec<String> {
    ctx.ecs
        .try_component::<A>(entity)
        .map(|a| a.values().to_vec())
        .unwrap_or_default()
}

pub(crate) fn owned_name(ctx: &RpgContext, entity: EntityId) -> Option<String> {
    ctx.name_of(entity).map(str::to_string)
}

/// Reactors in the interactive groups skip the dying and the dead.
pub(crate) fn alive_and_well(ctx: &RpgContext, entity: EntityId) -> bool {
    !ctx.is_dead(entity)
}
