//! Behavior parsing and skill resolution.

use agent::{parse_plan, AgentTask};
use async_trait::async_trait;
use ecs_adapter::{EntityId, Trigger};
use engine_core::{PhaseError, Reactor};
use persistence::{PropModel, PropType};

use crate::actions::{
    attach_action, ActionKind, BehaviorAction, DamageAction, HealAction, SkillAction, SkillTargetAction,
    SkillUsePropAction,
};
use crate::components::{AgentPingFlag, WorldSystemKind, WorldSystemRole};
use crate::context::RpgContext;
use crate::events::AgentEvent;
use crate::format::make_target_prop;
use crate::prompts::{skill_prompt, skill_target_prompt, CRITICAL_SUCCESS, FAILURE, SUCCESS};
use crate::systems::{action_values, alive_and_well, owned_name};
use crate::validation::check_target;

/// Splits a free-form behavior sentence into skill actions by looking for
/// known names in it.
#[derive(Debug, Default)]
pub struct BehaviorSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for BehaviorSystem {
    fn name(&self) -> &'static str {
        "behavior"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<BehaviorAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for caster in entities {
            let Some(name) = owned_name(ctx, caster) else {
                continue;
            };
            let sentence = action_values::<BehaviorAction>(ctx, caster).join(" ");
            let Some(stage) = ctx.stage_context_of(caster) else {
                ctx.notice(caster, format!("# {name}当前不在任何场景中, 无法行动。"));
                continue;
            };

            let mut nearby = ctx.actor_names_in_stage(&stage);
            nearby.push(stage.clone());
            let targets: Vec<String> = nearby
                .into_iter()
                .filter(|n| *n != name && sentence.contains(n.as_str()))
                .collect();
            let (skills, props): (Vec<PropModel>, Vec<PropModel>) = ctx
                .props_of(&name)
                .into_iter()
                .map(|(p, _)| p)
                .filter(|p| sentence.contains(p.name.as_str()))
                .partition(|p| p.prop_type == PropType::Skill);

            if targets.is_empty() || skills.is_empty() {
                let missing = if targets.is_empty() { "目标" } else { "技能" };
                ctx.notice(
                    caster,
                    format!("# {name}的行动没有生效: 语句中没有找到可用的{missing}。\n## 原始语句\n{sentence}"),
                );
                continue;
            }

            tracing::debug!(caster = %name, targets = targets.len(), skills = skills.len(), "behavior parsed");
            attach_action::<SkillTargetAction>(&mut ctx.ecs, caster, targets)?;
            attach_action::<SkillAction>(&mut ctx.ecs, caster, skills.into_iter().map(|p| p.name).collect())?;
            if !props.is_empty() {
                attach_action::<SkillUsePropAction>(&mut ctx.ecs, caster, props.into_iter().map(|p| p.name).collect())?;
            }
        }
        Ok(())
    }
}

struct Cast {
    caster: EntityId,
    name: String,
    stage: String,
    sentence: String,
    targets: Vec<(EntityId, String)>,
    skills: Vec<(PropModel, u32)>,
}

struct Ruling {
    narration: String,
    result: &'static str,
}

fn skill_system(ctx: &RpgContext) -> Option<String> {
    ctx.ecs
        .entities_with::<WorldSystemRole>()
        .into_iter()
        .find(|&e| {
            ctx.ecs
                .try_component::<WorldSystemRole>(e)
                .is_some_and(|r| r.0 == WorldSystemKind::Skill)
                && ctx.ecs.has_component::<AgentPingFlag>(e)
        })
        .and_then(|e| owned_name(ctx, e))
}

fn read_ruling(reply: Option<&str>) -> Result<Ruling, String> {
    let reply = reply.ok_or_else(|| "技能系统没有回应".to_string())?;
    let plan = parse_plan(reply).map_err(|e| format!("技能系统的回复无法解析: {e}"))?;
    let tag = ActionKind::Tag.as_str();
    let result = if plan.has_token(tag, CRITICAL_SUCCESS) {
        CRITICAL_SUCCESS
    } else if plan.has_token(tag, SUCCESS) {
        SUCCESS
    } else if plan.has_token(tag, FAILURE) {
        return Err(format!("判定为{FAILURE}"));
    } else {
        return Err("技能系统没有给出判定".to_string());
    };
    let narration = plan.joined(ActionKind::Announce.as_str());
    if narration.trim().is_empty() {
        return Err("技能系统没有给出描述".to_string());
    }
    Ok(Ruling { narration, result })
}

/// Collect everything a cast needs; tells the caster what is missing.
fn prepare(ctx: &mut RpgContext, caster: EntityId) -> Option<Cast> {
    let name = owned_name(ctx, caster)?;
    let sentence = action_values::<BehaviorAction>(ctx, caster).join(" ");
    let Some(stage) = ctx.stage_context_of(caster) else {
        ctx.notice(caster, format!("# {name}当前不在任何场景中, 无法使用技能。"));
        return None;
    };

    let mut targets = Vec::new();
    for target in action_values::<SkillTargetAction>(ctx, caster) {
        let check = check_target(ctx, caster, &target);
        match check.entity() {
            Some(entity) => targets.push((entity, target)),
            None => {
                let text = check.explain(&name, &target);
                ctx.notice(caster, text);
            }
        }
    }

    let mut skills = Vec::new();
    for skill in action_values::<SkillAction>(ctx, caster) {
        match ctx.files.prop(&name, &skill) {
            Some(file) if file.prop.prop_type == PropType::Skill => skills.push((file.prop.clone(), file.count)),
            _ => ctx.notice(caster, format!("# {name}没有技能: {skill}。")),
        }
    }

    if targets.is_empty() || skills.is_empty() {
        return None;
    }
    Some(Cast {
        caster,
        name,
        stage,
        sentence,
        targets,
        skills,
    })
}

/// Rules each cast through the skill world system, lets every target with
/// an agent react, then turns the outcome into damage or heal payloads on
/// the caster.
#[derive(Debug, Default)]
pub struct SkillSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for SkillSystem {
    fn name(&self) -> &'static str {
        "skill"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<SkillAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        let casts: Vec<Cast> = entities.into_iter().filter_map(|e| prepare(ctx, e)).collect();
        if casts.is_empty() {
            return Ok(());
        }

        let Some(system) = skill_system(ctx) else {
            for cast in &casts {
                ctx.notice(cast.caster, format!("# {}的技能没有生效: 技能系统离线。", cast.name));
            }
            return Ok(());
        };

        let mut rulings = Vec::new();
        for cast in &casts {
            let props: Vec<(PropModel, u32)> = action_values::<SkillUsePropAction>(ctx, cast.caster)
                .into_iter()
                .filter_map(|p| ctx.files.prop(&cast.name, &p).map(|f| (f.prop.clone(), f.count)))
                .collect();
            let target_names: Vec<String> = cast.targets.iter().map(|(_, n)| n.clone()).collect();
            let prompt = skill_prompt(&cast.name, &ctx.appearance_of(cast.caster), &cast.skills, &props, &target_names);
            rulings.push(AgentTask::standalone(system.clone(), prompt));
        }
        ctx.gather(&mut rulings, "skill").await;

        let mut accepted: Vec<(&Cast, Ruling)> = Vec::new();
        for (cast, task) in casts.iter().zip(rulings.iter()) {
            match read_ruling(task.response()) {
                Ok(ruling) => {
                    let event = AgentEvent::SkillBroadcast {
                        caster: cast.name.clone(),
                        narration: ruling.narration.clone(),
                    };
                    ctx.notify_stage(&cast.stage, true, &event);
                    accepted.push((cast, ruling));
                }
                Err(reason) => {
                    tracing::info!(caster = %cast.name, reason = %reason, "skill rejected");
                    let event = AgentEvent::SkillRejected {
                        caster: cast.name.clone(),
                        sentence: cast.sentence.clone(),
                        reason,
                    };
                    ctx.notify([cast.caster], &event);
                }
            }
        }

        // Targets without an agent take the effect unasked.
        let mut reactions = Vec::new();
        let mut reaction_index = Vec::new();
        for (i, (cast, ruling)) in accepted.iter().enumerate() {
            for (target, target_name) in &cast.targets {
                if ctx.ecs.has_component::<AgentPingFlag>(*target) {
                    reaction_index.push(Some((i, reactions.len())));
                    reactions.push(AgentTask::full(
                        target_name.clone(),
                        skill_target_prompt(&cast.name, target_name, &ruling.narration, ruling.result),
                    ));
                } else {
                    reaction_index.push(None);
                }
            }
        }
        ctx.gather(&mut reactions, "skill_target").await;

        let mut slot = reaction_index.into_iter();
        for (cast, ruling) in &accepted {
            let damage: i32 = cast.skills.iter().map(|(p, _)| p.damage()).sum();
            let damage = if ruling.result == CRITICAL_SUCCESS { damage * 2 } else { damage };
            let heal: i32 = cast.skills.iter().map(|(p, _)| p.heal()).sum();
            let cause = cast.skills[0].0.name.clone();

            for (_, target_name) in &cast.targets {
                let reacted = match slot.next().flatten() {
                    Some((_, task)) => reactions[task].succeeded(),
                    None => true,
                };
                if !reacted {
                    tracing::info!(caster = %cast.name, target = %target_name, "target did not react, effect dropped");
                    continue;
                }
                if damage > 0 {
                    let value = make_target_prop(target_name, &cause, damage as u32);
                    attach_action::<DamageAction>(&mut ctx.ecs, cast.caster, vec![value])?;
                }
                if heal > 0 {
                    let value = make_target_prop(target_name, &cause, heal as u32);
                    attach_action::<HealAction>(&mut ctx.ecs, cast.caster, vec![value])?;
                }
            }
        }
        Ok(())
    }
}
