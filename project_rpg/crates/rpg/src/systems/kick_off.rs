use agent::{parse_plan, AgentTask};
use async_trait::async_trait;
use ecs_adapter::EntityId;
use engine_core::{Executor, Initializer, PhaseError};

use crate::actions::ActionKind;
use crate::components::{AgentPingFlag, KickOffContent, KickOffFlag, Stage, StageNarrative};
use crate::context::RpgContext;
use crate::events::RecipientKind;
use crate::prompts::{kick_off_actor_prompt, kick_off_stage_prompt, kick_off_world_system_prompt};
use crate::systems::agent_entities;

/// Seeds every reachable agent with its opening setting.
#[derive(Debug, Default)]
pub struct KickOffSystem;

fn kick_off_prompt(ctx: &RpgContext, entity: EntityId, text: &str) -> Option<String> {
    let about = &ctx.options.about_game;
    let round = ctx.round();
    match ctx.recipient_kind(entity)? {
        RecipientKind::Actor => Some(kick_off_actor_prompt(text, about, round)),
        RecipientKind::Stage => {
            let stage = ctx.ecs.try_component::<Stage>(entity)?.name.clone();
            let props = ctx.props_of(&stage);
            let actors = ctx.actor_names_in_stage(&stage);
            Some(kick_off_stage_prompt(text, about, &props, &actors, round))
        }
        RecipientKind::World => Some(kick_off_world_system_prompt(text, about, round)),
    }
}

/// Ask every reachable, unseeded agent for its opening setting. Entities
/// with nothing to say are seeded without a request.
async fn kick_off_pending(ctx: &mut RpgContext, label: &str) -> Result<(), PhaseError> {
    let mut entities = Vec::new();
    let mut tasks = Vec::new();
    for entity in agent_entities(ctx) {
        if !ctx.ecs.has_component::<AgentPingFlag>(entity) || ctx.ecs.has_component::<KickOffFlag>(entity) {
            continue;
        }
        let Some(text) = ctx.ecs.try_component::<KickOffContent>(entity).map(|c| c.text.clone()) else {
            ctx.ecs.set_component(entity, KickOffFlag)?;
            continue;
        };
        let Some(name) = ctx.name_of(entity).map(str::to_string) else {
            continue;
        };
        let Some(prompt) = kick_off_prompt(ctx, entity, &text) else {
            continue;
        };
        entities.push(entity);
        tasks.push(AgentTask::full(name, prompt));
    }
    if tasks.is_empty() {
        return Ok(());
    }

    ctx.gather(&mut tasks, label).await;

    for (entity, task) in entities.into_iter().zip(tasks.iter()) {
        let Some(reply) = task.response() else {
            tracing::warn!(agent = task.agent_name(), round = ctx.round(), "kick-off unanswered, retrying next round");
            continue;
        };
        ctx.ecs.set_component(entity, KickOffFlag)?;
        if ctx.ecs.has_component::<Stage>(entity) {
            if let Ok(plan) = parse_plan(reply) {
                let narrate = plan.joined(ActionKind::StageNarrate.as_str());
                if !narrate.is_empty() {
                    ctx.ecs.set_component(entity, StageNarrative { text: narrate })?;
                }
            }
        }
    }
    Ok(())
}

#[async_trait(?Send)]
impl Initializer<RpgContext> for KickOffSystem {
    fn name(&self) -> &'static str {
        "kick_off"
    }

    async fn initialize(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        // Players see their setting even when nothing answers for them.
        for (entity, proxy) in ctx.players.bound() {
            if let Some(content) = ctx.ecs.try_component::<KickOffContent>(entity) {
                proxy.add_kickoff(content.text.clone());
            }
        }
        kick_off_pending(ctx, "kick_off").await
    }
}

/// Retries, once per round, every agent whose kick-off has not landed yet.
/// Until it does, the agent is left out of planning.
#[async_trait(?Send)]
impl Executor<RpgContext> for KickOffSystem {
    fn name(&self) -> &'static str {
        "kick_off_retry"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        // Round one follows the initializer directly.
        if ctx.round() <= 1 {
            return Ok(());
        }
        kick_off_pending(ctx, "kick_off_retry").await
    }
}
