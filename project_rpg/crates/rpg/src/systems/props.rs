//! Prop ownership changes, equipment and inspection.

use std::marker::PhantomData;

use async_trait::async_trait;
use ecs_adapter::{EntityId, Trigger};
use engine_core::{PhaseError, Reactor};
use persistence::PropType;

use crate::actions::{
    attach_action, ActionComponent, ActionKind, EquipPropAction, InspectAction, PickUpPropAction, StageTransferAction,
    StealPropAction, UpdateAppearanceAction,
};
use crate::components::{Actor, Clothes, Stage, Weapon};
use crate::context::RpgContext;
use crate::events::{AgentEvent, TransferVerb};
use crate::format::{parse_prop_count, parse_target_prop, TargetProp};
use crate::systems::{action_values, alive_and_well, owned_name};
use crate::validation::check_target;

/// Drop equipment slots that point at a prop the entity no longer holds.
fn unequip_if_gone(ctx: &mut RpgContext, entity: EntityId, owner: &str) -> Result<(), PhaseError> {
    let weapon_gone = ctx
        .ecs
        .try_component::<Weapon>(entity)
        .is_some_and(|w| ctx.files.prop(owner, &w.prop_name).is_none());
    if weapon_gone {
        ctx.ecs.remove_component::<Weapon>(entity)?;
    }
    let clothes_gone = ctx
        .ecs
        .try_component::<Clothes>(entity)
        .is_some_and(|c| ctx.files.prop(owner, &c.prop_name).is_none());
    if clothes_gone {
        ctx.ecs.remove_component::<Clothes>(entity)?;
        attach_action::<UpdateAppearanceAction>(&mut ctx.ecs, entity, Vec::new())?;
    }
    Ok(())
}

struct Handover<'a> {
    requester: EntityId,
    requester_name: &'a str,
    from: (EntityId, String),
    to: (EntityId, String),
    prop: &'a str,
    count: Option<u32>,
    verb: TransferVerb,
}

/// Move a prop and tell the stage about it. Failures go back to the
/// requester as a notice.
fn hand_over(ctx: &mut RpgContext, h: Handover<'_>) -> Result<bool, PhaseError> {
    let (from_entity, from) = h.from;
    let (_, to) = h.to;
    let receipt = match ctx.files.transfer_prop(&from, &to, h.prop, h.count) {
        Ok(receipt) => receipt,
        Err(e) => {
            tracing::debug!(from = %from, to = %to, prop = h.prop, error = %e, "transfer refused");
            ctx.notice(
                h.requester,
                format!("# {}无法转移道具{}: {e}", h.requester_name, h.prop),
            );
            return Ok(false);
        }
    };
    unequip_if_gone(ctx, from_entity, &from)?;
    if let Some(stage) = ctx.stage_context_of(h.requester) {
        let event = AgentEvent::PropTransferred {
            from,
            to,
            prop: receipt.prop_name,
            count: receipt.moved,
            verb: h.verb,
        };
        ctx.notify_stage(&stage, true, &event);
    }
    Ok(true)
}

/// Parse `@target/prop=n` and check the target is reachable.
fn targeted(ctx: &mut RpgContext, source: EntityId, source_name: &str, value: &str) -> Option<(EntityId, TargetProp)> {
    let Some(payload) = parse_target_prop(value) else {
        ctx.notice(source, format!("# {source_name}的行动格式错误: {value}"));
        return None;
    };
    let check = check_target(ctx, source, &payload.target);
    match check.entity() {
        Some(target) => Some((target, payload)),
        None => {
            let text = check.explain(source_name, &payload.target);
            ctx.notice(source, text);
            None
        }
    }
}

/// A stage hands one of its props to an actor it holds.
#[derive(Debug, Default)]
pub struct StageTransferSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for StageTransferSystem {
    fn name(&self) -> &'static str {
        "stage_transfer"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<StageTransferAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        ctx.ecs.has_component::<Stage>(entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for stage in entities {
            let Some(stage_name) = owned_name(ctx, stage) else {
                continue;
            };
            for value in action_values::<StageTransferAction>(ctx, stage) {
                let Some((target, payload)) = targeted(ctx, stage, &stage_name, &value) else {
                    continue;
                };
                if !ctx.ecs.has_component::<Actor>(target) || ctx.is_dead(target) {
                    continue;
                }
                hand_over(
                    ctx,
                    Handover {
                        requester: stage,
                        requester_name: &stage_name,
                        from: (stage, stage_name.clone()),
                        to: (target, payload.target.clone()),
                        prop: &payload.prop,
                        count: payload.count,
                        verb: TransferVerb::StageHandOver,
                    },
                )?;
            }
        }
        Ok(())
    }
}

/// An actor picks up a prop lying on its stage.
#[derive(Debug, Default)]
pub struct PickUpPropSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for PickUpPropSystem {
    fn name(&self) -> &'static str {
        "pick_up_prop"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<PickUpPropAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for actor in entities {
            let Some(name) = owned_name(ctx, actor) else {
                continue;
            };
            let Some(stage) = ctx.stage_entity_of(actor) else {
                ctx.notice(actor, format!("# {name}当前不在任何场景中, 无法拾取道具。"));
                continue;
            };
            let Some(stage_name) = owned_name(ctx, stage) else {
                continue;
            };
            for value in action_values::<PickUpPropAction>(ctx, actor) {
                let Some(wanted) = parse_prop_count(&value) else {
                    ctx.notice(actor, format!("# {name}的行动格式错误: {value}"));
                    continue;
                };
                if ctx.files.prop(&stage_name, &wanted.prop).is_none() {
                    ctx.notice(actor, format!("# {stage_name}中没有道具: {}。", wanted.prop));
                    continue;
                }
                hand_over(
                    ctx,
                    Handover {
                        requester: actor,
                        requester_name: &name,
                        from: (stage, stage_name.clone()),
                        to: (actor, name.clone()),
                        prop: &wanted.prop,
                        count: wanted.count,
                        verb: TransferVerb::PickUp,
                    },
                )?;
            }
        }
        Ok(())
    }
}

/// An actor takes a prop from another actor on the same stage.
#[derive(Debug, Default)]
pub struct StealPropSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for StealPropSystem {
    fn name(&self) -> &'static str {
        "steal_prop"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<StealPropAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for thief in entities {
            let Some(name) = owned_name(ctx, thief) else {
                continue;
            };
            for value in action_values::<StealPropAction>(ctx, thief) {
                let Some((victim, payload)) = targeted(ctx, thief, &name, &value) else {
                    continue;
                };
                if !ctx.ecs.has_component::<Actor>(victim) {
                    ctx.notice(thief, format!("# {name}只能从角色身上盗取道具。"));
                    continue;
                }
                hand_over(
                    ctx,
                    Handover {
                        requester: thief,
                        requester_name: &name,
                        from: (victim, payload.target.clone()),
                        to: (thief, name.clone()),
                        prop: &payload.prop,
                        count: payload.count,
                        verb: TransferVerb::Steal,
                    },
                )?;
            }
        }
        Ok(())
    }
}

/// Source hands a prop to a reachable target. Serves both the transfer and
/// the give verbs.
pub struct TransferPropSystem<A> {
    _action: PhantomData<A>,
}

impl<A> Default for TransferPropSystem<A> {
    fn default() -> Self {
        Self { _action: PhantomData }
    }
}

#[async_trait(?Send)]
impl<A: ActionComponent + 'static> Reactor<RpgContext> for TransferPropSystem<A> {
    fn name(&self) -> &'static str {
        match A::KIND {
            ActionKind::GiveProp => "give_prop",
            _ => "transfer_prop",
        }
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<A>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for giver in entities {
            let Some(name) = owned_name(ctx, giver) else {
                continue;
            };
            for value in action_values::<A>(ctx, giver) {
                let Some((receiver, payload)) = targeted(ctx, giver, &name, &value) else {
                    continue;
                };
                hand_over(
                    ctx,
                    Handover {
                        requester: giver,
                        requester_name: &name,
                        from: (giver, name.clone()),
                        to: (receiver, payload.target.clone()),
                        prop: &payload.prop,
                        count: payload.count,
                        verb: TransferVerb::Give,
                    },
                )?;
            }
        }
        Ok(())
    }
}

/// Puts an owned weapon or clothes prop into its slot.
#[derive(Debug, Default)]
pub struct EquipPropSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for EquipPropSystem {
    fn name(&self) -> &'static str {
        "equip_prop"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<EquipPropAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        ctx.ecs.has_component::<Actor>(entity) && alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for actor in entities {
            let Some(name) = owned_name(ctx, actor) else {
                continue;
            };
            for prop_name in action_values::<EquipPropAction>(ctx, actor) {
                let Some(prop_type) = ctx.files.prop(&name, &prop_name).map(|f| f.prop_type()) else {
                    ctx.notice(actor, format!("# {name}没有道具: {prop_name}, 无法装备。"));
                    continue;
                };
                match prop_type {
                    PropType::Weapon => {
                        ctx.ecs.set_component(actor, Weapon { prop_name: prop_name.clone() })?;
                    }
                    PropType::Clothes => {
                        ctx.ecs.set_component(actor, Clothes { prop_name: prop_name.clone() })?;
                        attach_action::<UpdateAppearanceAction>(&mut ctx.ecs, actor, Vec::new())?;
                    }
                    other => {
                        ctx.notice(
                            actor,
                            format!("# {prop_name}的类型是{}, 不能装备。", other.as_str()),
                        );
                        continue;
                    }
                }
                tracing::debug!(actor = %name, prop = %prop_name, "prop equipped");
                if let Some(stage) = ctx.stage_context_of(actor) {
                    let event = AgentEvent::PropEquipped {
                        actor: name.clone(),
                        prop: prop_name,
                    };
                    ctx.notify_stage(&stage, true, &event);
                }
            }
        }
        Ok(())
    }
}

/// Shows the inspector a target's look and visible props.
#[derive(Debug, Default)]
pub struct InspectSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for InspectSystem {
    fn name(&self) -> &'static str {
        "inspect"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<InspectAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for inspector in entities {
            let Some(name) = owned_name(ctx, inspector) else {
                continue;
            };
            for target_name in action_values::<InspectAction>(ctx, inspector) {
                let check = check_target(ctx, inspector, &target_name);
                let Some(target) = check.entity() else {
                    let text = check.explain(&name, &target_name);
                    ctx.notice(inspector, text);
                    continue;
                };
                // Skills are not something you can see.
                let props = ctx
                    .props_of(&target_name)
                    .into_iter()
                    .filter(|(p, _)| p.prop_type != PropType::Skill)
                    .map(|(p, n)| format!("{} x{n}", p.name))
                    .collect();
                let event = AgentEvent::Inspected {
                    inspector: name.clone(),
                    target: target_name.clone(),
                    appearance: ctx.appearance_of(target),
                    props,
                };
                ctx.notify([inspector], &event);
            }
        }
        Ok(())
    }
}
