//! Pre-planning, stage and actor planning, post-planning.

use std::collections::BTreeSet;

use agent::{parse_plan, AgentTask, PlanMap};
use async_trait::async_trait;
use ecs_adapter::EntityId;
use engine_core::{Executor, PhaseError};

use crate::actions::{ActionKind, ACTOR_AVAILABLE_ACTIONS, STAGE_AVAILABLE_ACTIONS};
use crate::components::{Actor, AgentPingFlag, KickOffFlag, PlanningFlag, Stage, StageNarrative};
use crate::context::{PrePlanningPolicy, RpgContext};
use crate::prompts::{actor_plan_prompt, stage_plan_prompt, ActorPlanInput};

/// Marks the entities that plan this round.
#[derive(Debug, Default)]
pub struct PrePlanningSystem;

impl PrePlanningSystem {
    fn selected(ctx: &RpgContext) -> BTreeSet<EntityId> {
        let policy = if ctx.round() <= 1 {
            PrePlanningPolicy::All
        } else {
            ctx.options.pre_planning
        };

        let mut stages: Vec<String> = ctx.stages.all_stages();
        stages.retain(|s| !ctx.actors_in_stage(s).is_empty());
        if policy == PrePlanningPolicy::OnlyPlayersStage {
            stages.retain(|s| ctx.actors_in_stage(s).into_iter().any(|e| ctx.is_player(e)));
        }

        let mut selected: BTreeSet<EntityId> = stages.iter().filter_map(|s| ctx.entity_by_name(s)).collect();
        let actors = match policy {
            PrePlanningPolicy::All => ctx.ecs.entities_with::<Actor>(),
            PrePlanningPolicy::OnlyPlayersStage => stages.iter().flat_map(|s| ctx.actors_in_stage(s)).collect(),
        };
        selected.extend(actors.into_iter().filter(|&e| !ctx.is_player(e)));
        selected.retain(|&e| !ctx.is_dead(e));
        selected
    }
}

#[async_trait(?Send)]
impl Executor<RpgContext> for PrePlanningSystem {
    fn name(&self) -> &'static str {
        "pre_planning"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let selected = Self::selected(ctx);
        tracing::debug!(round = ctx.round(), planners = selected.len(), "planning flags set");
        for entity in selected {
            ctx.ecs.set_component(entity, PlanningFlag)?;
        }
        Ok(())
    }
}

/// Validate a reply against the allow-list, returning the actions to attach.
fn accept_plan(reply: &str, allowed: &[ActionKind]) -> Result<Vec<(ActionKind, Vec<String>)>, String> {
    let plan: PlanMap = parse_plan(reply).map_err(|e| e.to_string())?;
    plan.iter()
        .map(|(key, values)| match ActionKind::from_name(key) {
            Some(kind) if allowed.contains(&kind) => Ok((kind, values.to_vec())),
            _ => Err(format!("action {key} is not allowed")),
        })
        .collect()
}

/// One planning gather: ask every candidate, attach accepted plans, and
/// drop rejected exchanges from history.
async fn run_planning(
    ctx: &mut RpgContext,
    label: &'static str,
    mut candidates: Vec<EntityId>,
    allowed: &[ActionKind],
    prompt_for: fn(&RpgContext, EntityId) -> Option<String>,
) -> Result<(), PhaseError> {
    ctx.chaos.on_planning(label, &mut candidates);

    let mut planned = Vec::new();
    let mut tasks = Vec::new();
    for entity in candidates {
        let (Some(name), Some(prompt)) = (ctx.name_of(entity).map(str::to_string), prompt_for(ctx, entity)) else {
            continue;
        };
        planned.push(entity);
        tasks.push(AgentTask::full(name, prompt));
    }
    if tasks.is_empty() {
        return Ok(());
    }

    ctx.gather(&mut tasks, label).await;

    for (entity, task) in planned.into_iter().zip(tasks.iter()) {
        let Some(reply) = task.response() else {
            continue;
        };
        match accept_plan(reply, allowed) {
            Ok(actions) => {
                for (kind, values) in actions {
                    kind.attach(&mut ctx.ecs, entity, values)?;
                }
            }
            Err(reason) => {
                tracing::warn!(label, agent = task.agent_name(), reason = %reason, "plan rejected");
                if let Some(agent) = ctx.agents.get_mut(task.agent_name()) {
                    agent.discard_last_exchange();
                }
            }
        }
    }
    Ok(())
}

fn candidates<K: ecs_adapter::Component>(ctx: &RpgContext) -> Vec<EntityId> {
    ctx.ecs
        .entities_with::<PlanningFlag>()
        .into_iter()
        .filter(|&e| {
            ctx.ecs.has_component::<K>(e)
                && ctx.ecs.has_component::<AgentPingFlag>(e)
                && ctx.ecs.has_component::<KickOffFlag>(e)
        })
        .collect()
}

fn stage_prompt(ctx: &RpgContext, entity: EntityId) -> Option<String> {
    let stage = &ctx.ecs.try_component::<Stage>(entity)?.name;
    let props = ctx.props_of(stage);
    let actors = ctx.actor_names_in_stage(stage);
    Some(stage_plan_prompt(&props, &actors, ctx.round(), STAGE_AVAILABLE_ACTIONS))
}

fn actor_prompt(ctx: &RpgContext, entity: EntityId) -> Option<String> {
    let name = ctx.name_of(entity)?;
    let stage = ctx.actor_stage(entity).unwrap_or_default().to_string();
    let narrative = ctx
        .stage_entity_of(entity)
        .and_then(|s| ctx.ecs.try_component::<StageNarrative>(s))
        .map(|n| n.text.clone())
        .unwrap_or_default();
    let exits = match ctx.stages.exits(&stage) {
        Ok([]) => ctx.stages.all_stages().into_iter().filter(|s| *s != stage).collect(),
        Ok(exits) => exits.to_vec(),
        Err(_) => Vec::new(),
    };
    let actors = ctx
        .actor_names_in_stage(&stage)
        .into_iter()
        .filter(|n| n != name)
        .collect();
    let props = ctx
        .props_of(&stage)
        .into_iter()
        .map(|(p, n)| format!("{} x{n}", p.name))
        .collect();
    let input = ActorPlanInput {
        stage,
        narrative,
        exits,
        actors,
        props,
        round: ctx.round(),
    };
    Some(actor_plan_prompt(&input, ACTOR_AVAILABLE_ACTIONS))
}

#[derive(Debug, Default)]
pub struct StagePlanningSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for StagePlanningSystem {
    fn name(&self) -> &'static str {
        "stage_planning"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let entities = candidates::<Stage>(ctx);
        run_planning(ctx, "stage_planning", entities, STAGE_AVAILABLE_ACTIONS, stage_prompt).await
    }
}

#[derive(Debug, Default)]
pub struct ActorPlanningSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for ActorPlanningSystem {
    fn name(&self) -> &'static str {
        "actor_planning"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let entities = candidates::<Actor>(ctx);
        run_planning(ctx, "actor_planning", entities, ACTOR_AVAILABLE_ACTIONS, actor_prompt).await
    }
}

#[derive(Debug, Default)]
pub struct PostPlanningSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for PostPlanningSystem {
    fn name(&self) -> &'static str {
        "post_planning"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        for entity in ctx.ecs.entities_with::<PlanningFlag>() {
            ctx.ecs.remove_component::<PlanningFlag>(entity)?;
        }
        Ok(())
    }
}
