use std::collections::BTreeSet;

use async_trait::async_trait;
use ecs_adapter::EntityId;
use engine_core::{Executor, PhaseError};
use persistence::{ActorArchiveFile, StageArchiveFile};

use crate::components::{Actor, Deceased, KickOffContent, RoundEventsRecord, Stage, StageNarrative};
use crate::context::RpgContext;
use crate::prompts::{archive_prompt, compressed_plan_stub, ACTOR_PLAN_TAG, ARCHIVE_TAG, STAGE_PLAN_TAG};
use crate::systems::{agent_entities, owned_name};

fn names_of<T: ecs_adapter::Component>(ctx: &RpgContext) -> Vec<(EntityId, String)> {
    ctx.ecs
        .entities_with::<T>()
        .into_iter()
        .filter_map(|e| owned_name(ctx, e).map(|n| (e, n)))
        .collect()
}

/// Everything the actor read this round, plus the material it started with.
fn corpus(ctx: &RpgContext, actor: EntityId, name: &str) -> String {
    let mut text = Vec::new();
    if let Some(record) = ctx.ecs.try_component::<RoundEventsRecord>(actor) {
        text.extend(record.events.iter().cloned());
    }
    if let Some(kick_off) = ctx.ecs.try_component::<KickOffContent>(actor) {
        text.push(kick_off.text.clone());
    }
    for (prop, _) in ctx.props_of(name) {
        text.push(prop.description);
    }
    text.join("\n")
}

/// Keeps each actor's "who and where I know" files in line with what it
/// saw this round, and re-injects a summary when something new turns up.
#[derive(Debug, Default)]
pub struct UpdateArchiveSystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for UpdateArchiveSystem {
    fn name(&self) -> &'static str {
        "update_archive"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let actors = names_of::<Actor>(ctx);
        let stages = names_of::<Stage>(ctx);

        for (actor, name) in &actors {
            if ctx.ecs.has_component::<Deceased>(*actor) {
                continue;
            }
            let text = corpus(ctx, *actor, name);
            let current = ctx.actor_stage(*actor).map(str::to_string);
            let nearby: BTreeSet<String> = current
                .as_deref()
                .map(|s| ctx.actor_names_in_stage(s).into_iter().collect())
                .unwrap_or_default();

            let mut learned = 0;
            for (other, other_name) in &actors {
                if other_name == name || ctx.files.actor_archives.contains(name, other_name) {
                    continue;
                }
                if nearby.contains(other_name) || text.contains(other_name.as_str()) {
                    ctx.files.actor_archives.insert(ActorArchiveFile {
                        owner: name.clone(),
                        name: other_name.clone(),
                        appearance: ctx.appearance_of(*other),
                    });
                    learned += 1;
                }
            }
            for (stage, stage_name) in &stages {
                if ctx.files.stage_archives.contains(name, stage_name) {
                    continue;
                }
                if current.as_deref() == Some(stage_name.as_str()) || text.contains(stage_name.as_str()) {
                    let stage_narrate = ctx
                        .ecs
                        .try_component::<StageNarrative>(*stage)
                        .map(|n| n.text.clone())
                        .unwrap_or_default();
                    ctx.files.stage_archives.insert(StageArchiveFile {
                        owner: name.clone(),
                        name: stage_name.clone(),
                        stage_narrate,
                    });
                    learned += 1;
                }
            }

            // Co-located actors: the stored look follows what is seen now.
            for other_name in nearby.iter().filter(|n| *n != name) {
                let Some(other) = ctx.entity_by_name(other_name) else {
                    continue;
                };
                let seen = ctx.appearance_of(other);
                let stale = ctx
                    .files
                    .actor_archives
                    .get(name, other_name)
                    .is_some_and(|f| f.appearance != seen);
                if stale {
                    ctx.files
                        .actor_archives
                        .update(name, other_name, |f| f.appearance = seen);
                }
            }

            if learned == 0 {
                continue;
            }
            let known_actors = ctx.files.actor_archives.names(name);
            let known_stages = ctx.files.stage_archives.names(name);
            tracing::debug!(actor = %name, learned, "archives updated");
            if let Some(agent) = ctx.agents.get_mut(name) {
                agent.excise_tagged(ARCHIVE_TAG);
                agent.append_human(archive_prompt(name, &known_actors, &known_stages));
            }
        }
        Ok(())
    }
}

/// Collapses every agent's older planning prompts into a stub.
#[derive(Debug, Default)]
pub struct CompressHistorySystem;

#[async_trait(?Send)]
impl Executor<RpgContext> for CompressHistorySystem {
    fn name(&self) -> &'static str {
        "compress_history"
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let actor_stub = compressed_plan_stub(ACTOR_PLAN_TAG);
        let stage_stub = compressed_plan_stub(STAGE_PLAN_TAG);
        for entity in agent_entities(ctx) {
            let Some(name) = owned_name(ctx, entity) else {
                continue;
            };
            if let Some(agent) = ctx.agents.get_mut(&name) {
                let replaced =
                    agent.compress_tagged(ACTOR_PLAN_TAG, &actor_stub) + agent.compress_tagged(STAGE_PLAN_TAG, &stage_stub);
                if replaced > 0 {
                    tracing::trace!(agent = %name, replaced, "history compressed");
                }
            }
        }
        Ok(())
    }
}
