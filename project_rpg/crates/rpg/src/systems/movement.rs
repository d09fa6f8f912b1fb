use agent::{parse_plan, AgentTask};
use async_trait::async_trait;
use ecs_adapter::{EntityId, Trigger};
use engine_core::{PhaseError, Reactor};
use space::MoveError;

use crate::actions::{ActionKind, GoToAction};
use crate::components::{Actor, AgentPingFlag, Attributes, EnterStageFlag, StageEntryCond, StageExitCond};
use crate::context::RpgContext;
use crate::events::AgentEvent;
use crate::format::parse_target_message;
use crate::prompts::gate_prompt;
use crate::systems::{action_values, alive_and_well, owned_name};

fn destination(ctx: &RpgContext, mover: EntityId) -> Option<String> {
    action_values::<GoToAction>(ctx, mover)
        .into_iter()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn explain_move(actor: &str, target: &str, error: &MoveError) -> String {
    match error {
        MoveError::StageNotFound(_) => format!("# {actor}无法前往{target}: 场景不存在。"),
        MoveError::SameStage { .. } => format!("# {actor}已经在{target}中了。"),
        MoveError::NoExit { from, .. } => format!("# {actor}无法从{from}直接前往{target}。"),
        other => format!("# {actor}无法前往{target}: {other}"),
    }
}

struct Gate {
    mover: EntityId,
    mover_name: String,
    stage: String,
    task: Option<usize>,
}

fn gate_condition(ctx: &RpgContext, stage: EntityId, leaving: bool) -> Option<String> {
    let text = if leaving {
        ctx.ecs.try_component::<StageExitCond>(stage).map(|c| c.text.clone())
    } else {
        ctx.ecs.try_component::<StageEntryCond>(stage).map(|c| c.text.clone())
    };
    text.filter(|t| !t.trim().is_empty())
}

fn status_of(ctx: &RpgContext, actor: EntityId) -> String {
    let mut status = ctx.appearance_of(actor);
    if let Some(attrs) = ctx.ecs.try_component::<Attributes>(actor) {
        status.push_str(&format!("\n- 生命值: {}/{}", attrs.hp, attrs.max_hp));
    }
    status
}

/// The stage agent lets the actor through only with an explicit yes.
fn ruling(reply: Option<&str>) -> Result<(), String> {
    let reply = reply.ok_or_else(|| "场景没有回应, 无法确认条件。".to_string())?;
    let plan = parse_plan(reply).map_err(|_| "场景的判断无法解析。".to_string())?;
    if plan.has_token(ActionKind::Tag.as_str(), "Yes") {
        return Ok(());
    }
    let reason = plan
        .get(ActionKind::Whisper.as_str())
        .unwrap_or(&[])
        .iter()
        .map(|v| parse_target_message(v).map(|m| m.message).unwrap_or_else(|| v.clone()))
        .collect::<Vec<_>>()
        .join(" ");
    if reason.trim().is_empty() {
        Err("不满足场景的条件。".to_string())
    } else {
        Err(reason)
    }
}

/// Validates movement before it happens: the destination must exist, be
/// reachable and differ from the current stage, and any exit or entry
/// condition has to be approved by the stage agent that owns it.
#[derive(Debug, Default)]
pub struct PreGoToSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for PreGoToSystem {
    fn name(&self) -> &'static str {
        "pre_go_to"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<GoToAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        ctx.ecs.has_component::<Actor>(entity) && alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        let mut gates = Vec::new();
        let mut tasks = Vec::new();

        for mover in entities {
            let Some(name) = owned_name(ctx, mover) else {
                continue;
            };
            let Some(target) = destination(ctx, mover) else {
                ctx.ecs.remove_component::<GoToAction>(mover)?;
                continue;
            };
            let current = match ctx.stages.check_move(mover, &target) {
                Ok(current) => current.to_string(),
                Err(e) => {
                    tracing::debug!(actor = %name, target = %target, error = %e, "movement rejected");
                    ctx.notice(mover, explain_move(&name, &target, &e));
                    ctx.ecs.remove_component::<GoToAction>(mover)?;
                    continue;
                }
            };

            for (stage, leaving) in [(current, true), (target, false)] {
                let Some(stage_entity) = ctx.entity_by_name(&stage) else {
                    continue;
                };
                let Some(condition) = gate_condition(ctx, stage_entity, leaving) else {
                    continue;
                };
                let task = if ctx.ecs.has_component::<AgentPingFlag>(stage_entity) {
                    let prompt = gate_prompt(
                        &name,
                        &stage,
                        leaving,
                        &condition,
                        &status_of(ctx, mover),
                        &ctx.props_of(&name),
                    );
                    tasks.push(AgentTask::standalone(stage.clone(), prompt));
                    Some(tasks.len() - 1)
                } else {
                    None
                };
                gates.push(Gate {
                    mover,
                    mover_name: name.clone(),
                    stage,
                    task,
                });
            }
        }
        if gates.is_empty() {
            return Ok(());
        }

        ctx.gather(&mut tasks, "pre_go_to").await;

        for gate in gates {
            // A mover denied at the exit is not asked about anymore.
            if !ctx.ecs.has_component::<GoToAction>(gate.mover) {
                continue;
            }
            let reply = gate.task.and_then(|i| tasks[i].response());
            let Err(reason) = ruling(reply) else {
                continue;
            };
            tracing::info!(actor = %gate.mover_name, stage = %gate.stage, "gate denied");
            let event = AgentEvent::Whisper {
                from: gate.stage.clone(),
                to: gate.mover_name.clone(),
                content: reason,
            };
            let stage_entity = ctx.entity_by_name(&gate.stage);
            ctx.notify(std::iter::once(gate.mover).chain(stage_entity), &event);
            ctx.ecs.remove_component::<GoToAction>(gate.mover)?;
        }
        Ok(())
    }
}

/// Moves every actor whose `GoToAction` survived the gate.
#[derive(Debug, Default)]
pub struct GoToSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for GoToSystem {
    fn name(&self) -> &'static str {
        "go_to"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<GoToAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        ctx.ecs.has_component::<Actor>(entity) && alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        let mut moved = 0;
        for mover in entities {
            let (Some(name), Some(target)) = (owned_name(ctx, mover), destination(ctx, mover)) else {
                continue;
            };
            let left = match ctx.move_actor(mover, &target) {
                Ok(left) => left,
                Err(e) => {
                    tracing::warn!(actor = %name, target = %target, error = %e, "move failed after gate");
                    ctx.notice(mover, format!("# {name}无法前往{target}。"));
                    continue;
                }
            };
            tracing::info!(actor = %name, from = %left, to = %target, "actor moved");

            let leave = AgentEvent::LeftStage {
                actor: name.clone(),
                stage: left.clone(),
            };
            ctx.notify_stage(&left, true, &leave);
            let enter = AgentEvent::EnteredStage {
                actor: name,
                from: Some(left),
                stage: target.clone(),
            };
            ctx.notify_stage(&target, true, &enter);
            ctx.ecs.set_component(mover, EnterStageFlag { stage: target })?;
            moved += 1;
        }
        if moved > 0 {
            let map = ctx.stage_actors_map();
            ctx.files.set_stage_actors_map(map);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use agent::ScriptedAgentClient;

    use super::*;
    use crate::testing::{add_actor, add_stage, connect, context, heard};

    #[tokio::test]
    async fn unconditioned_move_goes_through() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &["Y"]);
        add_stage(&mut ctx, "Y", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        ctx.ecs
            .set_component(a, GoToAction { values: vec!["Y".into()] })
            .unwrap();

        PreGoToSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert!(ctx.ecs.has_component::<GoToAction>(a));
        GoToSystem.react(&mut ctx, vec![a]).await.unwrap();

        assert_eq!(ctx.actor_stage(a), Some("Y"));
        assert_eq!(ctx.ecs.get_component::<EnterStageFlag>(a).unwrap().stage, "Y");
        assert!(heard(&ctx, "X", "A离开了X场景"));
        assert!(heard(&ctx, "Y", "A进入了场景——Y"));
        assert!(heard(&ctx, "A", "你离开了X, 进入了Y"));
        assert_eq!(ctx.files.stage_actors_map().get("Y"), Some(&vec!["A".to_string()]));
    }

    #[tokio::test]
    async fn unreachable_or_same_stage_is_stripped() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &["Y"]);
        add_stage(&mut ctx, "Y", &[]);
        add_stage(&mut ctx, "Z", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        ctx.ecs
            .set_component(a, GoToAction { values: vec!["Z".into()] })
            .unwrap();
        ctx.ecs
            .set_component(b, GoToAction { values: vec!["X".into()] })
            .unwrap();

        PreGoToSystem.react(&mut ctx, vec![a, b]).await.unwrap();
        assert!(!ctx.ecs.has_component::<GoToAction>(a));
        assert!(!ctx.ecs.has_component::<GoToAction>(b));
        assert!(heard(&ctx, "A", "无法从X直接前往Z"));
        assert!(heard(&ctx, "B", "已经在X中了"));
    }

    #[tokio::test]
    async fn exit_condition_denial_is_whispered() {
        let mut ctx = context();
        let x = add_stage(&mut ctx, "X", &["Y"]);
        add_stage(&mut ctx, "Y", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        ctx.ecs
            .set_component(x, StageExitCond { text: "only if carrying key".into() })
            .unwrap();
        let stage_client = connect(
            &mut ctx,
            "X",
            ScriptedAgentClient::with_replies(
                "X",
                [Some(r#"{"WhisperAction":["@A>you have no key"],"TagAction":["No"]}"#.to_string())],
            ),
        );
        ctx.ecs
            .set_component(a, GoToAction { values: vec!["Y".into()] })
            .unwrap();

        PreGoToSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert_eq!(stage_client.calls().len(), 1);
        assert!(stage_client.calls()[0].contains("only if carrying key"));
        assert!(!ctx.ecs.has_component::<GoToAction>(a));
        assert!(heard(&ctx, "A", "# X对你私语道: you have no key"));
        assert_eq!(ctx.actor_stage(a), Some("X"));
    }

    #[tokio::test]
    async fn approved_entry_lets_the_actor_in() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &["Y"]);
        let y = add_stage(&mut ctx, "Y", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        ctx.ecs
            .set_component(y, StageEntryCond { text: "friends only".into() })
            .unwrap();
        connect(
            &mut ctx,
            "Y",
            ScriptedAgentClient::with_replies("Y", [Some(r#"{"TagAction":["Yes"]}"#.to_string())]),
        );
        ctx.ecs
            .set_component(a, GoToAction { values: vec!["Y".into()] })
            .unwrap();

        PreGoToSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert!(ctx.ecs.has_component::<GoToAction>(a));
    }

    #[tokio::test]
    async fn unreachable_gatekeeper_denies() {
        let mut ctx = context();
        let x = add_stage(&mut ctx, "X", &["Y"]);
        add_stage(&mut ctx, "Y", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        ctx.ecs
            .set_component(x, StageExitCond { text: "never".into() })
            .unwrap();
        ctx.ecs
            .set_component(a, GoToAction { values: vec!["Y".into()] })
            .unwrap();

        PreGoToSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert!(!ctx.ecs.has_component::<GoToAction>(a));
        assert!(heard(&ctx, "A", "场景没有回应"));
    }
}
