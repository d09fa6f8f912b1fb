use ecs_adapter::EntityId;

use crate::context::RpgContext;

/// Whether `source` can address `target` this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCheck {
    Valid(EntityId),
    TargetUnknown,
    NoStage,
    NotSameStage,
}

impl TargetCheck {
    pub fn entity(self) -> Option<EntityId> {
        match self {
            TargetCheck::Valid(e) => Some(e),
            _ => None,
        }
    }

    /// Corrective line sent back to the requester.
    pub fn explain(self, source: &str, target: &str) -> String {
        match self {
            TargetCheck::Valid(_) => String::new(),
            TargetCheck::TargetUnknown => format!("# {source}想与{target}互动, 但{target}不存在。"),
            TargetCheck::NoStage => format!("# {source}当前不在任何场景中, 无法与{target}互动。"),
            TargetCheck::NotSameStage => format!("# {target}不在{source}所在的场景中, 无法互动。"),
        }
    }
}

/// Check that `target_name` names a live entity reachable from `source`.
///
/// A stage reaches the actors it holds; an actor reaches the actors on its
/// stage and the stage itself.
pub fn check_target(ctx: &RpgContext, source: EntityId, target_name: &str) -> TargetCheck {
    let Some(target) = ctx.entity_by_name(target_name) else {
        return TargetCheck::TargetUnknown;
    };
    let Some(source_stage) = ctx.stage_context_of(source) else {
        return TargetCheck::NoStage;
    };
    match ctx.stage_context_of(target) {
        Some(stage) if stage == source_stage => TargetCheck::Valid(target),
        Some(_) => TargetCheck::NotSameStage,
        None => TargetCheck::NotSameStage,
    }
}
