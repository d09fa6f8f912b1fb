//! Shared world builders for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use agent::{AgentClient, AgentSystem, ScriptedAgentClient};
use ecs_adapter::EntityId;
use engine_core::PipelineConfig;
use persistence::FileSystem;
use rpg::prompts::{ACTOR_PLAN_TAG, STAGE_PLAN_TAG};
use rpg::scenario::SCENARIO_VERSION;
use rpg::{build_world, ConnectSystem, Game, PrePlanningPolicy, RpgContext, RpgOptions, Runtime, ScenarioFile};
use serde_json::{json, Value};
use session::PlayerProxyManager;

/// Stages X <-> Y; A, B and C in X, D in Y; a skill judge.
pub fn base_scenario() -> Value {
    let actor = |name: &str| {
        json!({
            "name": name,
            "base_form": format!("{name}的样子"),
            "attributes": {"max_hp": 100}
        })
    };
    json!({
        "version": SCENARIO_VERSION,
        "about_game": "测试用的小世界",
        "database": {
            "actors": [actor("A"), actor("B"), actor("C"), actor("D"), actor("P")],
            "stages": [
                {"name": "X", "stage_graph": ["Y"], "attributes": {"max_hp": 100}},
                {"name": "Y", "stage_graph": ["X"], "attributes": {"max_hp": 100}}
            ],
            "props": [
                {"name": "Potion", "type": "Consumable", "description": "红色的药水"},
                {"name": "Crown", "type": "NonConsumable", "unique": true},
                {"name": "Robe", "type": "Clothes", "appearance": "红袍", "attributes": [0, 0, 0, 5, 0]},
                {"name": "Fireball", "type": "Skill", "attributes": [0, 0, 100, 0, 0]}
            ],
            "world_systems": [
                {"name": "Judge", "kind": "skill"}
            ]
        },
        "world_systems": [{"name": "Judge"}],
        "players": [],
        "actors": [{"name": "A"}, {"name": "B"}, {"name": "C"}, {"name": "D"}],
        "stages": [
            {"name": "X", "actors": [{"name": "A"}, {"name": "B"}, {"name": "C"}]},
            {"name": "Y", "actors": [{"name": "D"}]}
        ]
    })
}

/// Index of the actor instance named `name` in `scenario["actors"]`.
pub fn actor_slot<'a>(scenario: &'a mut Value, name: &str) -> &'a mut Value {
    let actors = scenario["actors"].as_array_mut().unwrap();
    actors.iter_mut().find(|a| a["name"] == name).unwrap()
}

/// Replies chosen by substring rules; the first rule whose needles all
/// appear in the prompt wins, anything else gets `{}`.
pub fn scripted(name: &str, rules: Vec<(Vec<String>, String)>) -> ScriptedAgentClient {
    ScriptedAgentClient::with_responder(name, move |prompt, _| {
        let reply = rules
            .iter()
            .find(|(needles, _)| needles.iter().all(|n| prompt.contains(n.as_str())))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| "{}".to_string());
        Some(reply)
    })
}

/// Needles of an actor planning prompt for `round`.
pub fn actor_plan(round: u64) -> Vec<String> {
    vec![ACTOR_PLAN_TAG.to_string(), format!("当前回合: {round}\n")]
}

pub fn stage_plan(round: u64) -> Vec<String> {
    vec![STAGE_PLAN_TAG.to_string(), format!("当前回合: {round}\n")]
}

/// An actor that plans `plan` in `round` and stays quiet otherwise.
pub fn plans_once(name: &str, round: u64, plan: Value) -> ScriptedAgentClient {
    scripted(name, vec![(actor_plan(round), plan.to_string())])
}

pub struct WorldBuilder {
    scenario: Value,
    clients: BTreeMap<String, Option<ScriptedAgentClient>>,
    files: FileSystem,
    options: RpgOptions,
    config: PipelineConfig,
}

impl WorldBuilder {
    pub fn new(scenario: Value) -> Self {
        Self {
            scenario,
            clients: BTreeMap::new(),
            files: FileSystem::in_memory(),
            options: RpgOptions::default(),
            config: PipelineConfig::default(),
        }
    }

    pub fn client(mut self, name: &str, client: ScriptedAgentClient) -> Self {
        self.clients.insert(name.to_string(), Some(client));
        self
    }

    /// Leave `name` without a client, so it is never asked anything.
    pub fn offline(mut self, name: &str) -> Self {
        self.clients.insert(name.to_string(), None);
        self
    }

    pub fn runtime_dir(mut self, dir: &Path) -> Self {
        self.files = FileSystem::with_runtime_dir(dir);
        self
    }

    pub fn policy(mut self, policy: PrePlanningPolicy) -> Self {
        self.options.pre_planning = policy;
        self
    }

    /// Every agent without an explicit client answers `{}`.
    pub fn build(self) -> Game {
        let scenario: ScenarioFile = serde_json::from_value(self.scenario).unwrap();
        let mut options = self.options;
        options.about_game = scenario.about_game.clone();
        let mut ctx = RpgContext::new(
            Runtime::new(self.files, AgentSystem::new()),
            PlayerProxyManager::new(session::DEFAULT_QUEUE_CAPACITY),
            options,
        );
        build_world(&mut ctx, &scenario).unwrap();

        for name in ctx.agents.names() {
            let client = match self.clients.get(&name) {
                Some(Some(client)) => client.clone(),
                Some(None) => continue,
                None => ScriptedAgentClient::silent(name.clone()),
            };
            let client: Arc<dyn AgentClient> = Arc::new(client);
            ctx.agents.attach_client(&name, client).unwrap();
        }
        Game::new(ctx, self.config, ConnectSystem::new())
    }
}

pub fn entity(game: &Game, name: &str) -> EntityId {
    game.ctx().entity_by_name(name).unwrap()
}

pub fn history_texts(game: &Game, name: &str) -> Vec<String> {
    game.ctx()
        .agents
        .history(name)
        .iter()
        .map(|m| m.text().to_string())
        .collect()
}

pub fn heard(game: &Game, name: &str, needle: &str) -> bool {
    history_texts(game, name).iter().any(|t| t.contains(needle))
}

pub fn current_stage(game: &Game, name: &str) -> String {
    let e = entity(game, name);
    game.ctx()
        .ecs
        .try_component::<rpg::components::Actor>(e)
        .unwrap()
        .current_stage
        .clone()
}

pub fn count_of(game: &Game, owner: &str, prop: &str) -> Option<u32> {
    game.ctx().files.prop(owner, prop).map(|f| f.count)
}
