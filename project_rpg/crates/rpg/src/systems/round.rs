use async_trait::async_trait;
use engine_core::{Executor, PhaseError};
use session::{ClientMessage, MessageChannel};

use crate::command::{parse_command, PlayerCommand};
use crate::components::{EnterStageFlag, RoundEventsRecord};
use crate::context::RpgContext;
use crate::events::AgentEvent;
use crate::systems::agent_entities;

/// Clears per-round state and announces the round.
#[derive(Debug, Default)]
pub struct RoundStartSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for RoundStartSystem {
    fn name(&self) -> &'static str {
        "round_start"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        for entity in ctx.ecs.entities_with::<RoundEventsRecord>() {
            ctx.ecs.set_component(entity, RoundEventsRecord::default())?;
        }
        for entity in ctx.ecs.entities_with::<EnterStageFlag>() {
            ctx.ecs.remove_component::<EnterStageFlag>(entity)?;
        }
        let round = ctx.round();
        let everyone = agent_entities(ctx);
        ctx.notify(everyone, &AgentEvent::RoundStarted { round });
        tracing::debug!(round, "round started");
        Ok(())
    }
}

/// Turns queued player commands into action components.
#[derive(Debug, Default)]
pub struct PlayerInputSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for PlayerInputSystem {
    fn name(&self) -> &'static str {
        "player_input"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let round = ctx.round();
        let inputs: Vec<_> = ctx
            .players
            .bound()
            .into_iter()
            .map(|(entity, proxy)| (entity, proxy.clone(), proxy.take_commands()))
            .collect();

        for (entity, proxy, commands) in inputs {
            if commands.is_empty() {
                continue;
            }
            if !ctx.ecs.is_alive(entity) || ctx.is_dead(entity) {
                tracing::debug!(player = proxy.name(), "commands ignored, actor is gone");
                continue;
            }
            for command in commands {
                match parse_command(&command) {
                    PlayerCommand::Act(actions) => {
                        tracing::info!(player = proxy.name(), command = %command, "player command accepted");
                        for (kind, value) in actions {
                            kind.attach(&mut ctx.ecs, entity, vec![value])?;
                        }
                    }
                    PlayerCommand::Tip(tip) => {
                        proxy.push_message(MessageChannel::Tip, ClientMessage::new("TipEvent", tip, round));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{GoToAction, SpeakAction};
    use crate::testing::{add_actor, add_player, add_stage, context};

    #[tokio::test]
    async fn round_start_resets_records_and_flags() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        ctx.ecs
            .set_component(a, RoundEventsRecord { events: vec!["old".into()] })
            .unwrap();
        ctx.ecs.set_component(a, EnterStageFlag { stage: "X".into() }).unwrap();

        RoundStartSystem.execute(&mut ctx).await.unwrap();
        let record = ctx.ecs.get_component::<RoundEventsRecord>(a).unwrap();
        assert_eq!(record.events.len(), 1);
        assert!(record.events[0].contains("回合开始"));
        assert!(!ctx.ecs.has_component::<EnterStageFlag>(a));
        // The round marker never enters histories.
        assert!(ctx.agents.history("A").is_empty());
    }

    #[tokio::test]
    async fn round_marker_reaches_player_bus() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let p = add_player(&mut ctx, "P", "X");
        RoundStartSystem.execute(&mut ctx).await.unwrap();
        let queued = ctx.bus.drain(p);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].channel, MessageChannel::Tip);
    }

    #[tokio::test]
    async fn commands_become_actions_and_tips() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let p = add_player(&mut ctx, "P", "X");
        add_actor(&mut ctx, "B", "X");
        let proxy = ctx.players.proxy("P").unwrap().clone();
        proxy.submit_command("B hello");
        proxy.submit_command("/goto Y");
        proxy.submit_command("/fly");

        PlayerInputSystem.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.ecs.get_component::<SpeakAction>(p).unwrap().values, vec!["@B>hello"]);
        assert_eq!(ctx.ecs.get_component::<GoToAction>(p).unwrap().values, vec!["Y"]);
        let tips = proxy.drain(MessageChannel::Tip);
        assert_eq!(tips.len(), 1);
        assert!(tips[0].message.contains("/fly"));
        assert!(proxy.take_commands().is_empty());
    }
}
