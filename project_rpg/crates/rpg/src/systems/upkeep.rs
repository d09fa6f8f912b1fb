//! End-of-round housekeeping and teardown.

use async_trait::async_trait;
use engine_core::{Executor, PhaseError, Teardown};
use persistence::StatusProfile;
use session::{ClientMessage, MessageChannel};

use crate::actions::{has_any_action, remove_all_actions};
use crate::components::{Actor, Attributes, Clothes, Deceased, DestroyMark, Weapon};
use crate::context::RpgContext;
use crate::events::AgentEvent;
use crate::systems::owned_name;

/// Strips every action component once all action phases have run.
#[derive(Debug, Default)]
pub struct PostActionSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for PostActionSystem {
    fn name(&self) -> &'static str {
        "post_action"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        for entity in ctx.ecs.all_entities() {
            if has_any_action(&ctx.ecs, entity) {
                remove_all_actions(&mut ctx.ecs, entity)?;
            }
        }
        Ok(())
    }
}

/// Moves queued player deliveries into the proxies.
#[derive(Debug, Default)]
pub struct ClientMessageSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for ClientMessageSystem {
    fn name(&self) -> &'static str {
        "client_message"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        for (entity, deliveries) in ctx.bus.drain_all() {
            let Some(proxy) = ctx.players.proxy_for_entity(entity) else {
                tracing::debug!(entity = %entity, dropped = deliveries.len(), "no proxy for deliveries");
                continue;
            };
            for delivery in deliveries {
                proxy.push_message(delivery.channel, delivery.message);
            }
        }
        Ok(())
    }
}

fn status_profile(ctx: &RpgContext, actor: ecs_adapter::EntityId, name: &str) -> StatusProfile {
    let attrs = ctx.ecs.try_component::<Attributes>(actor).copied().unwrap_or_default();
    StatusProfile {
        name: name.to_string(),
        stage: ctx.actor_stage(actor).unwrap_or_default().to_string(),
        max_hp: attrs.max_hp,
        hp: attrs.hp,
        damage: attrs.damage,
        defense: attrs.defense,
        heal: attrs.heal,
        weapon: ctx.ecs.try_component::<Weapon>(actor).map(|w| w.prop_name.clone()),
        clothes: ctx.ecs.try_component::<Clothes>(actor).map(|c| c.prop_name.clone()),
        props: ctx
            .props_of(name)
            .into_iter()
            .map(|(p, n)| (p.name, n))
            .collect(),
    }
}

/// Refresh derived files, then write everything dirty plus every history.
/// Any write failure stops the game.
fn save(ctx: &mut RpgContext) -> Result<(), PhaseError> {
    for actor in ctx.ecs.entities_with::<Actor>() {
        let Some(name) = owned_name(ctx, actor) else {
            continue;
        };
        let profile = status_profile(ctx, actor, &name);
        if ctx.files.status_profiles.get(&name, "status_profile") != Some(&profile) {
            ctx.files.status_profiles.insert(profile);
        }
    }
    let map = ctx.stage_actors_map();
    ctx.files.set_stage_actors_map(map);

    let report = ctx
        .files
        .flush()
        .map_err(|e| PhaseError::Fatal(format!("save failed: {e}")))?;
    let mut histories = 0;
    for agent in ctx.agents.iter() {
        let written = ctx
            .files
            .write_owner_json(agent.name(), "chat_history.json", agent.history())
            .map_err(|e| PhaseError::Fatal(format!("chat history of {} not saved: {e}", agent.name())))?;
        if written.is_some() {
            histories += 1;
        }
    }
    tracing::debug!(round = ctx.round(), written = report.written, removed = report.removed, histories, "world saved");
    Ok(())
}

#[derive(Debug, Default)]
pub struct SaveSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for SaveSystem {
    fn name(&self) -> &'static str {
        "save"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        save(ctx)
    }
}

/// Reaps entities marked for destruction this round.
#[derive(Debug, Default)]
pub struct DestroySystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for DestroySystem {
    fn name(&self) -> &'static str {
        "destroy"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let doomed = ctx.ecs.entities_with::<DestroyMark>();
        if doomed.is_empty() {
            return Ok(());
        }
        for entity in doomed {
            // A dead player stays in the world until the game is torn down.
            if ctx.is_player(entity) && ctx.ecs.has_component::<Deceased>(entity) {
                continue;
            }
            ctx.destroy_entity(entity)?;
        }
        let map = ctx.stage_actors_map();
        ctx.files.set_stage_actors_map(map);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SaveTeardown;

#[async_trait(?Send)]
impl Teardown<RpgContext> for SaveTeardown {
    fn name(&self) -> &'static str {
        "save"
    }

    async fn teardown(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        save(ctx)
    }
}

/// Tells every player the game has ended.
#[derive(Debug, Default)]
pub struct GameOverTeardown;

#[async_trait(?Send)]
impl Teardown<RpgContext> for GameOverTeardown {
    fn name(&self) -> &'static str {
        "game_over"
    }

    async fn teardown(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let reason = ctx.game_over_reason().unwrap_or("游戏已停止").to_string();
        let event = AgentEvent::GameOver { reason };
        let text = event.format(crate::events::RecipientKind::Actor, "");
        for proxy in ctx.players.iter() {
            proxy.push_message(
                MessageChannel::Tip,
                ClientMessage::new(event.class_name(), text.clone(), ctx.round()),
            );
            proxy.set_game_over();
        }
        tracing::info!(players = ctx.players.len(), "game over delivered");
        Ok(())
    }
}
