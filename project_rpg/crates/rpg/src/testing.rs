//! Small world builders shared by unit tests.

use std::sync::Arc;

use agent::{AgentSystem, ScriptedAgentClient};
use ecs_adapter::EntityId;
use persistence::{FileSystem, PropFile, PropModel, PropType};
use session::PlayerProxyManager;

use crate::components::{
    Actor, AgentPingFlag, Attributes, BaseForm, KickOffFlag, Player, RoundEventsRecord, Stage, StageGraph,
    StageNarrative, World, WorldSystemKind, WorldSystemRole,
};
use crate::context::{RpgContext, RpgOptions, Runtime};

pub fn context() -> RpgContext {
    RpgContext::new(
        Runtime::new(FileSystem::in_memory(), AgentSystem::new()),
        PlayerProxyManager::new(64),
        RpgOptions::default(),
    )
}

pub fn add_stage(ctx: &mut RpgContext, name: &str, edges: &[&str]) -> EntityId {
    let edges: Vec<String> = edges.iter().map(|e| e.to_string()).collect();
    let e = ctx.spawn_named(name).unwrap();
    ctx.ecs.set_component(e, Stage { name: name.into() }).unwrap();
    ctx.ecs.set_component(e, StageGraph { edges: edges.clone() }).unwrap();
    ctx.ecs.set_component(e, StageNarrative::default()).unwrap();
    ctx.ecs.set_component(e, Attributes::new(100, 0, 0, 0)).unwrap();
    ctx.ecs.set_component(e, RoundEventsRecord::default()).unwrap();
    ctx.stages.register_stage(name, edges);
    ctx.agents.register(name, None);
    e
}

/// An actor with 100 hp and no attack, placed on `stage` unless empty.
pub fn add_actor(ctx: &mut RpgContext, name: &str, stage: &str) -> EntityId {
    let e = ctx.spawn_named(name).unwrap();
    ctx.ecs
        .set_component(
            e,
            Actor {
                name: name.into(),
                current_stage: String::new(),
            },
        )
        .unwrap();
    ctx.ecs
        .set_component(e, BaseForm { text: format!("{name}的样子") })
        .unwrap();
    ctx.ecs.set_component(e, Attributes::new(100, 0, 0, 0)).unwrap();
    ctx.ecs.set_component(e, RoundEventsRecord::default()).unwrap();
    ctx.agents.register(name, None);
    if !stage.is_empty() {
        ctx.place_actor(e, stage).unwrap();
    }
    e
}

pub fn add_player(ctx: &mut RpgContext, name: &str, stage: &str) -> EntityId {
    let e = add_actor(ctx, name, stage);
    ctx.ecs.set_component(e, Player { name: name.into() }).unwrap();
    ctx.players.create_proxy(name).unwrap();
    ctx.players.bind_entity(name, e).unwrap();
    e
}

pub fn add_world_system(ctx: &mut RpgContext, name: &str, kind: WorldSystemKind) -> EntityId {
    let e = ctx.spawn_named(name).unwrap();
    ctx.ecs.set_component(e, World { name: name.into() }).unwrap();
    ctx.ecs.set_component(e, WorldSystemRole(kind)).unwrap();
    ctx.ecs.set_component(e, RoundEventsRecord::default()).unwrap();
    ctx.agents.register(name, None);
    e
}

/// Attach a scripted client and flag the entity as reachable.
/// Attach a client to an agent that has already been kicked off.
pub fn connect(ctx: &mut RpgContext, name: &str, client: ScriptedAgentClient) -> ScriptedAgentClient {
    let client = connect_unseeded(ctx, name, client);
    let e = ctx.entity_by_name(name).unwrap();
    ctx.ecs.set_component(e, KickOffFlag).unwrap();
    client
}

/// Attach a client without the kick-off having happened.
pub fn connect_unseeded(ctx: &mut RpgContext, name: &str, client: ScriptedAgentClient) -> ScriptedAgentClient {
    ctx.agents.attach_client(name, Arc::new(client.clone())).unwrap();
    let e = ctx.entity_by_name(name).unwrap();
    ctx.ecs.set_component(e, AgentPingFlag).unwrap();
    client
}

pub fn prop(name: &str, prop_type: PropType, attributes: Vec<i32>) -> PropModel {
    PropModel {
        name: name.into(),
        codename: String::new(),
        description: format!("{name}的描述"),
        prop_type,
        attributes,
        appearance: format!("{name}的外观"),
        unique: false,
    }
}

pub fn give(ctx: &mut RpgContext, owner: &str, model: PropModel, count: u32) {
    ctx.files.give_prop(owner, PropFile::new(owner, model, count));
}

pub fn count_of(ctx: &RpgContext, owner: &str, prop: &str) -> Option<u32> {
    ctx.files.prop(owner, prop).map(|f| f.count)
}

pub fn history_texts(ctx: &RpgContext, name: &str) -> Vec<String> {
    ctx.agents.history(name).iter().map(|m| m.text().to_string()).collect()
}

pub fn heard(ctx: &RpgContext, name: &str, needle: &str) -> bool {
    history_texts(ctx, name).iter().any(|t| t.contains(needle))
}
