//! Conversation group: the player speech check, then narrate, tags, mind
//! voice, whisper, announce and speak.

use std::marker::PhantomData;

use agent::{parse_plan, AgentTask};
use async_trait::async_trait;
use ecs_adapter::{EntityId, Trigger};
use engine_core::{Executor, PhaseError, Reactor};
use session::{ClientMessage, MessageChannel};

use crate::actions::{
    ActionComponent, ActionKind, AnnounceAction, MindVoiceAction, SpeakAction, StageNarrateAction, WhisperAction,
};
use crate::components::{AgentPingFlag, Player, SelfTags, Stage, StageNarrative};
use crate::context::RpgContext;
use crate::events::AgentEvent;
use crate::format::parse_target_message;
use crate::prompts::conversation_check_prompt;
use crate::systems::{action_values, alive_and_well, owned_name};
use crate::validation::check_target;

const SPEECH: [ActionKind; 3] = [ActionKind::Speak, ActionKind::Announce, ActionKind::Whisper];

/// Asks each player's own agent whether the typed speech is acceptable
/// before any of it reaches other histories.
#[derive(Debug, Default)]
pub struct ConversationCheckSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for ConversationCheckSystem {
    fn name(&self) -> &'static str {
        "conversation_check"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let mut checked = Vec::new();
        let mut tasks = Vec::new();
        for entity in ctx.ecs.entities_with::<Player>() {
            if !ctx.ecs.has_component::<AgentPingFlag>(entity) {
                continue;
            }
            if !SPEECH.iter().any(|k| k.is_on(&ctx.ecs, entity)) {
                continue;
            }
            let Some(name) = owned_name(ctx, entity) else {
                continue;
            };
            let prompt = conversation_check_prompt(
                &action_values::<AnnounceAction>(ctx, entity),
                &action_values::<SpeakAction>(ctx, entity),
                &action_values::<WhisperAction>(ctx, entity),
            );
            checked.push(entity);
            tasks.push(AgentTask::input_only(name, prompt));
        }
        if tasks.is_empty() {
            return Ok(());
        }

        ctx.gather(&mut tasks, "conversation_check").await;

        let round = ctx.round();
        for (entity, task) in checked.into_iter().zip(tasks.iter()) {
            let approved = task
                .response()
                .and_then(|reply| parse_plan(reply).ok())
                .is_some_and(|plan| plan.has_token(ActionKind::Tag.as_str(), "Yes"));
            if approved {
                continue;
            }
            for kind in SPEECH {
                kind.remove(&mut ctx.ecs, entity)?;
            }
            tracing::info!(player = task.agent_name(), "player speech rejected");
            if let Some(proxy) = ctx.players.proxy_for_entity(entity) {
                proxy.push_message(
                    MessageChannel::Tip,
                    ClientMessage::new("TipEvent", "# 你的发言没有通过检查, 请换一种说法。", round),
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StageNarrateSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for StageNarrateSystem {
    fn name(&self) -> &'static str {
        "stage_narrate"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<StageNarrateAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        ctx.ecs.has_component::<Stage>(entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for entity in entities {
            let narrate = action_values::<StageNarrateAction>(ctx, entity).join(" ");
            let Some(stage) = owned_name(ctx, entity) else {
                continue;
            };
            if narrate.trim().is_empty() {
                continue;
            }
            ctx.ecs
                .set_component(entity, StageNarrative { text: narrate.clone() })?;
            for owner in ctx.files.stage_archives.owners() {
                ctx.files
                    .stage_archives
                    .update(&owner, &stage, |f| f.stage_narrate = narrate.clone());
            }
            ctx.notify_stage(&stage, false, &AgentEvent::StageNarrate { stage: stage.clone(), narrate });
        }
        Ok(())
    }
}

/// Stores self-assigned tags from `TagAction` or `StageTagAction`.
pub struct TagSystem<A> {
    _action: PhantomData<A>,
}

impl<A> Default for TagSystem<A> {
    fn default() -> Self {
        Self { _action: PhantomData }
    }
}

#[async_trait(?Send)]
impl<A: ActionComponent + 'static> Reactor<RpgContext> for TagSystem<A> {
    fn name(&self) -> &'static str {
        A::KIND.as_str()
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<A>()
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for entity in entities {
            let tags = action_values::<A>(ctx, entity);
            ctx.ecs.set_component(entity, SelfTags { tags })?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MindVoiceSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for MindVoiceSystem {
    fn name(&self) -> &'static str {
        "mind_voice"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<MindVoiceAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for entity in entities {
            let Some(actor) = owned_name(ctx, entity) else {
                continue;
            };
            for content in action_values::<MindVoiceAction>(ctx, entity) {
                ctx.notify(
                    [entity],
                    &AgentEvent::MindVoice {
                        actor: actor.clone(),
                        content,
                    },
                );
            }
        }
        Ok(())
    }
}

/// Resolve `@target>message` values against the speaker's stage. Invalid
/// targets earn the speaker a corrective notice.
fn addressed<A: ActionComponent>(ctx: &mut RpgContext, source: EntityId) -> Vec<(EntityId, String, String)> {
    let Some(from) = owned_name(ctx, source) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for value in action_values::<A>(ctx, source) {
        let Some(parsed) = parse_target_message(&value) else {
            ctx.notice(source, format!("# {from}的{}格式错误: {value}", A::KIND.as_str()));
            continue;
        };
        let check = check_target(ctx, source, &parsed.target);
        match check.entity() {
            Some(target) => out.push((target, parsed.target, parsed.message)),
            None => {
                let text = check.explain(&from, &parsed.target);
                ctx.notice(source, text);
            }
        }
    }
    out
}

#[derive(Debug, Default)]
pub struct WhisperSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for WhisperSystem {
    fn name(&self) -> &'static str {
        "whisper"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<WhisperAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for source in entities {
            let Some(from) = owned_name(ctx, source) else {
                continue;
            };
            for (target, to, content) in addressed::<WhisperAction>(ctx, source) {
                let event = AgentEvent::Whisper {
                    from: from.clone(),
                    to,
                    content,
                };
                ctx.notify([source, target], &event);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct AnnounceSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for AnnounceSystem {
    fn name(&self) -> &'static str {
        "announce"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<AnnounceAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for source in entities {
            let Some(from) = owned_name(ctx, source) else {
                continue;
            };
            let Some(stage) = ctx.stage_context_of(source) else {
                ctx.notice(source, format!("# {from}当前不在任何场景中, 无人能听到。"));
                continue;
            };
            for content in action_values::<AnnounceAction>(ctx, source) {
                let event = AgentEvent::Announce {
                    from: from.clone(),
                    stage: stage.clone(),
                    content,
                };
                ctx.notify_stage(&stage, true, &event);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SpeakSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for SpeakSystem {
    fn name(&self) -> &'static str {
        "speak"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<SpeakAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        alive_and_well(ctx, entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for source in entities {
            let Some(from) = owned_name(ctx, source) else {
                continue;
            };
            let Some(stage) = ctx.stage_context_of(source) else {
                continue;
            };
            for (_, to, content) in addressed::<SpeakAction>(ctx, source) {
                let event = AgentEvent::Speak {
                    from: from.clone(),
                    to,
                    content,
                };
                ctx.notify_stage(&stage, true, &event);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use agent::ScriptedAgentClient;
    use persistence::StageArchiveFile;

    use super::*;
    use crate::actions::{StageTagAction, TagAction};
    use crate::testing::{add_actor, add_player, add_stage, connect, context, heard, history_texts};

    fn attach<A: ActionComponent>(ctx: &mut RpgContext, entity: EntityId, value: &str) {
        ctx.ecs.set_component(entity, A::from_values(vec![value.to_string()])).unwrap();
    }

    #[tokio::test]
    async fn speak_reaches_whole_stage_only() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        add_stage(&mut ctx, "Y", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        add_actor(&mut ctx, "B", "X");
        add_actor(&mut ctx, "C", "X");
        add_actor(&mut ctx, "D", "Y");
        attach::<SpeakAction>(&mut ctx, a, "@B>hi");

        SpeakSystem.react(&mut ctx, vec![a]).await.unwrap();
        for name in ["A", "B", "C", "X"] {
            assert!(heard(&ctx, name, "hi"), "{name} should hear");
        }
        assert!(!heard(&ctx, "D", "hi"));
        assert!(!heard(&ctx, "Y", "hi"));
        assert_eq!(history_texts(&ctx, "B"), vec!["# A对你说: hi".to_string()]);
    }

    #[tokio::test]
    async fn speak_to_absent_target_corrects_speaker() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        add_stage(&mut ctx, "Y", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        add_actor(&mut ctx, "B", "X");
        add_actor(&mut ctx, "D", "Y");
        attach::<SpeakAction>(&mut ctx, a, "@D>hello");

        SpeakSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert!(!heard(&ctx, "B", "hello"));
        assert!(!heard(&ctx, "D", "hello"));
        assert!(heard(&ctx, "A", "不在A所在的场景中"));
    }

    #[tokio::test]
    async fn whisper_is_private() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        add_actor(&mut ctx, "B", "X");
        add_actor(&mut ctx, "C", "X");
        attach::<WhisperAction>(&mut ctx, a, "@B>secret");

        WhisperSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert!(heard(&ctx, "A", "secret"));
        assert!(heard(&ctx, "B", "secret"));
        assert!(!heard(&ctx, "C", "secret"));
        assert!(!heard(&ctx, "X", "secret"));
    }

    #[tokio::test]
    async fn announce_covers_stage_and_its_actors() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        add_stage(&mut ctx, "Y", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        add_actor(&mut ctx, "B", "X");
        add_actor(&mut ctx, "D", "Y");
        attach::<AnnounceAction>(&mut ctx, a, "listen");

        AnnounceSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert!(heard(&ctx, "B", "listen"));
        assert!(heard(&ctx, "X", "listen"));
        assert!(!heard(&ctx, "D", "listen"));
        assert!(!heard(&ctx, "Y", "listen"));
    }

    #[tokio::test]
    async fn mind_voice_stays_with_the_thinker() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        attach::<MindVoiceAction>(&mut ctx, a, "hmm");

        MindVoiceSystem.react(&mut ctx, vec![a]).await.unwrap();
        let record = &ctx.ecs.get_component::<crate::components::RoundEventsRecord>(a).unwrap().events;
        assert!(record.iter().any(|l| l.contains("hmm")));
        assert!(ctx.ecs.get_component::<crate::components::RoundEventsRecord>(b).unwrap().events.is_empty());
        assert!(!heard(&ctx, "B", "hmm"));
    }

    #[tokio::test]
    async fn narrate_updates_stage_and_archives() {
        let mut ctx = context();
        let x = add_stage(&mut ctx, "X", &[]);
        add_actor(&mut ctx, "A", "X");
        ctx.files.stage_archives.insert(StageArchiveFile {
            owner: "A".into(),
            name: "X".into(),
            stage_narrate: String::new(),
        });
        attach::<StageNarrateAction>(&mut ctx, x, "fog rolls in");

        StageNarrateSystem.react(&mut ctx, vec![x]).await.unwrap();
        assert_eq!(ctx.ecs.get_component::<StageNarrative>(x).unwrap().text, "fog rolls in");
        assert_eq!(ctx.files.stage_archives.get("A", "X").unwrap().stage_narrate, "fog rolls in");
        assert!(heard(&ctx, "A", "fog rolls in"));
        assert!(!heard(&ctx, "X", "fog rolls in"));
    }

    #[tokio::test]
    async fn tags_are_remembered() {
        let mut ctx = context();
        let x = add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        attach::<TagAction>(&mut ctx, a, "brave");
        attach::<StageTagAction>(&mut ctx, x, "gloomy");

        TagSystem::<TagAction>::default().react(&mut ctx, vec![a]).await.unwrap();
        TagSystem::<StageTagAction>::default().react(&mut ctx, vec![x]).await.unwrap();
        assert_eq!(ctx.ecs.get_component::<SelfTags>(a).unwrap().tags, vec!["brave"]);
        assert_eq!(ctx.ecs.get_component::<SelfTags>(x).unwrap().tags, vec!["gloomy"]);
    }

    #[tokio::test]
    async fn rejected_player_speech_is_stripped() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let p = add_player(&mut ctx, "P", "X");
        add_actor(&mut ctx, "B", "X");
        connect(
            &mut ctx,
            "P",
            ScriptedAgentClient::with_replies("P", [Some(r#"{"TagAction":["No"]}"#.to_string())]),
        );
        attach::<SpeakAction>(&mut ctx, p, "@B>rude words");
        attach::<MindVoiceAction>(&mut ctx, p, "thinking");

        ConversationCheckSystem.execute(&mut ctx).await.unwrap();
        assert!(!ctx.ecs.has_component::<SpeakAction>(p));
        assert!(ctx.ecs.has_component::<MindVoiceAction>(p));
        let tips = ctx.players.proxy("P").unwrap().drain(MessageChannel::Tip);
        assert_eq!(tips.len(), 1);
        // InputOnly: the check never enters the player's history.
        assert!(history_texts(&ctx, "P").is_empty());
    }

    #[tokio::test]
    async fn approved_player_speech_survives() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let p = add_player(&mut ctx, "P", "X");
        add_actor(&mut ctx, "B", "X");
        connect(
            &mut ctx,
            "P",
            ScriptedAgentClient::with_replies("P", [Some(r#"{"TagAction":["yes"]}"#.to_string())]),
        );
        attach::<SpeakAction>(&mut ctx, p, "@B>hello");

        ConversationCheckSystem.execute(&mut ctx).await.unwrap();
        assert!(ctx.ecs.has_component::<SpeakAction>(p));
    }
}
