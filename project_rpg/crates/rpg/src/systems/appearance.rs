use std::collections::BTreeMap;

use agent::{strip_json_fence, AgentTask};
use async_trait::async_trait;
use ecs_adapter::EntityId;
use engine_core::{Executor, PhaseError};

use crate::actions::UpdateAppearanceAction;
use crate::components::{Actor, AgentPingFlag, BaseForm, Clothes, FinalAppearance, WorldSystemKind, WorldSystemRole};
use crate::context::RpgContext;
use crate::prompts::{appearance_prompt, combine_appearance};

/// Re-derives `FinalAppearance` from the base form and the equipped
/// clothes. Runs in two slots per round; a run whose inputs did not change
/// since the last derivation does nothing unless `UpdateAppearanceAction`
/// forces it.
#[derive(Debug)]
pub struct UpdateAppearanceSystem {
    name: &'static str,
}

impl UpdateAppearanceSystem {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Default for UpdateAppearanceSystem {
    fn default() -> Self {
        Self::new("update_appearance")
    }
}

struct Pending {
    entity: EntityId,
    name: String,
    body: String,
    clothes: String,
    key: String,
}

fn clothes_appearance(ctx: &RpgContext, entity: EntityId, owner: &str) -> String {
    ctx.ecs
        .try_component::<Clothes>(entity)
        .and_then(|c| ctx.files.prop(owner, &c.prop_name))
        .map(|f| f.prop.appearance.clone())
        .unwrap_or_default()
}

fn appearance_system(ctx: &RpgContext) -> Option<String> {
    ctx.ecs
        .entities_with::<WorldSystemRole>()
        .into_iter()
        .find(|&e| {
            ctx.ecs
                .try_component::<WorldSystemRole>(e)
                .is_some_and(|r| r.0 == WorldSystemKind::Appearance)
                && ctx.ecs.has_component::<AgentPingFlag>(e)
        })
        .and_then(|e| ctx.name_of(e).map(str::to_string))
}

#[async_trait(?Send)]
impl Executor<RpgContext> for UpdateAppearanceSystem {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        let mut pending = Vec::new();
        for entity in ctx.ecs.entities_with::<Actor>() {
            let Some(base) = ctx.ecs.try_component::<BaseForm>(entity) else {
                continue;
            };
            let Some(name) = ctx.name_of(entity).map(str::to_string) else {
                continue;
            };
            let body = base.text.clone();
            let clothes = clothes_appearance(ctx, entity, &name);
            let key = format!("{body}\u{1f}{clothes}");
            let forced = ctx.ecs.has_component::<UpdateAppearanceAction>(entity);
            let unchanged = ctx
                .ecs
                .try_component::<FinalAppearance>(entity)
                .is_some_and(|a| a.source_key == key);
            if forced {
                ctx.ecs.remove_component::<UpdateAppearanceAction>(entity)?;
            } else if unchanged {
                continue;
            }
            if clothes.is_empty() {
                ctx.ecs
                    .set_component(entity, FinalAppearance { text: body, source_key: key })?;
                continue;
            }
            pending.push(Pending {
                entity,
                name,
                body,
                clothes,
                key,
            });
        }
        if pending.is_empty() {
            return Ok(());
        }

        let mut derived: BTreeMap<String, String> = BTreeMap::new();
        if let Some(system) = appearance_system(ctx) {
            let bodies: BTreeMap<String, (String, String)> = pending
                .iter()
                .map(|p| (p.name.clone(), (p.body.clone(), p.clothes.clone())))
                .collect();
            let mut tasks = vec![AgentTask::standalone(system, appearance_prompt(&bodies))];
            ctx.gather(&mut tasks, self.name).await;
            if let Some(reply) = tasks[0].response() {
                match serde_json::from_str::<BTreeMap<String, String>>(strip_json_fence(reply)) {
                    Ok(map) => derived = map,
                    Err(e) => tracing::warn!(error = %e, "appearance reply unreadable, using fallback"),
                }
            }
        }

        for p in pending {
            let text = derived
                .remove(&p.name)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| combine_appearance(&p.body, &p.clothes));
            ctx.ecs.set_component(
                p.entity,
                FinalAppearance {
                    text,
                    source_key: p.key,
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use agent::ScriptedAgentClient;
    use persistence::PropType;

    use super::*;
    use crate::testing::{add_actor, add_stage, add_world_system, connect, context, give, prop};

    fn dress(ctx: &mut RpgContext, name: &str, cloth: &str) {
        give(ctx, name, prop(cloth, PropType::Clothes, vec![]), 1);
        let e = ctx.entity_by_name(name).unwrap();
        ctx.ecs.set_component(e, Clothes { prop_name: cloth.into() }).unwrap();
    }

    #[tokio::test]
    async fn unclothed_actor_shows_base_form() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        UpdateAppearanceSystem::default().execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.appearance_of(a), "A的样子");
    }

    #[tokio::test]
    async fn clothed_actors_share_one_request() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        dress(&mut ctx, "A", "Robe");
        dress(&mut ctx, "B", "Armor");
        add_world_system(&mut ctx, "Mirror", WorldSystemKind::Appearance);
        let mirror = connect(
            &mut ctx,
            "Mirror",
            ScriptedAgentClient::with_replies("Mirror", [Some(r#"{"A":"A in a robe"}"#.to_string())]),
        );

        let mut system = UpdateAppearanceSystem::default();
        system.execute(&mut ctx).await.unwrap();
        assert_eq!(mirror.calls().len(), 1);
        assert_eq!(ctx.appearance_of(a), "A in a robe");
        // Missing from the reply: fallback derivation.
        assert_eq!(ctx.appearance_of(b), "B的样子 身穿: Armor的外观");

        // Unchanged inputs: the second slot is a no-op.
        system.execute(&mut ctx).await.unwrap();
        assert_eq!(mirror.calls().len(), 1);
        assert!(ctx.agents.history("Mirror").is_empty());
    }

    #[tokio::test]
    async fn forced_update_asks_again() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        dress(&mut ctx, "A", "Robe");
        add_world_system(&mut ctx, "Mirror", WorldSystemKind::Appearance);
        let mirror = connect(
            &mut ctx,
            "Mirror",
            ScriptedAgentClient::with_responder("Mirror", |_, _| Some(r#"{"A":"robed"}"#.to_string())),
        );
        let mut system = UpdateAppearanceSystem::default();
        system.execute(&mut ctx).await.unwrap();
        ctx.ecs.set_component(a, UpdateAppearanceAction::default()).unwrap();
        system.execute(&mut ctx).await.unwrap();
        assert_eq!(mirror.calls().len(), 2);
        assert!(!ctx.ecs.has_component::<UpdateAppearanceAction>(a));
    }

    #[tokio::test]
    async fn offline_appearance_system_falls_back() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        dress(&mut ctx, "A", "Robe");
        UpdateAppearanceSystem::default().execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.appearance_of(a), "A的样子 身穿: Robe的外观");
    }
}
