//! Scenario document and the builder that turns it into entities.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use ecs_adapter::EntityId;
use persistence::{PropFile, PropModel, PropType};
use serde::{Deserialize, Serialize};
use session::SessionError;

use crate::components::{
    Actor, Attributes, BaseForm, Clothes, KickOffContent, Player, RoundEventsRecord, Stage, StageEntryCond,
    StageExitCond, StageGraph, StageNarrative, Weapon, World, WorldSystemKind, WorldSystemRole,
};
use crate::context::RpgContext;

/// Scenario format version this builder understands.
pub const SCENARIO_VERSION: &str = "0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenario version {found} does not match builder version {expected}")]
    VersionMismatch { expected: &'static str, found: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scenario parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{kind} {name} is not in the database")]
    Unknown { kind: &'static str, name: String },

    #[error("name {0} is used by more than one entity")]
    DuplicateName(String),

    #[error("actor {actor} placed in {first} and {second}")]
    DoublePlacement { actor: String, first: String, second: String },

    #[error("{owner} equips {prop} without owning it")]
    NotOwned { owner: String, prop: String },

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("world error: {0}")]
    World(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributesData {
    pub max_hp: i32,
    pub damage: i32,
    pub defense: i32,
    pub heal: i32,
}

impl From<AttributesData> for Attributes {
    fn from(a: AttributesData) -> Self {
        Attributes::new(a.max_hp, a.damage, a.defense, a.heal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorData {
    pub name: String,
    #[serde(default)]
    pub codename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub kick_off_message: String,
    #[serde(default)]
    pub base_form: String,
    #[serde(default)]
    pub attributes: AttributesData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageData {
    pub name: String,
    #[serde(default)]
    pub codename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub kick_off_message: String,
    #[serde(default)]
    pub stage_graph: Vec<String>,
    #[serde(default)]
    pub exit_condition: Option<String>,
    #[serde(default)]
    pub entry_condition: Option<String>,
    #[serde(default)]
    pub attributes: AttributesData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSystemData {
    pub name: String,
    #[serde(default)]
    pub codename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub kick_off_message: String,
    pub kind: WorldSystemKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub actors: Vec<ActorData>,
    pub stages: Vec<StageData>,
    pub props: Vec<PropModel>,
    pub world_systems: Vec<WorldSystemData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropRef {
    pub name: String,
    #[serde(default = "one")]
    pub count: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorInstance {
    pub name: String,
    #[serde(default)]
    pub props: Vec<PropRef>,
    #[serde(default)]
    pub weapon: Option<String>,
    #[serde(default)]
    pub clothes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageInstance {
    pub name: String,
    #[serde(default)]
    pub actors: Vec<NameRef>,
    #[serde(default)]
    pub props: Vec<PropRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub version: String,
    #[serde(default)]
    pub about_game: String,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub world_systems: Vec<NameRef>,
    /// Actor instances driven by a human; each gets a proxy of the same name.
    #[serde(default)]
    pub players: Vec<ActorInstance>,
    #[serde(default)]
    pub actors: Vec<ActorInstance>,
    #[serde(default)]
    pub stages: Vec<StageInstance>,
}

impl ScenarioFile {
    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        let scenario: ScenarioFile = serde_json::from_str(text)?;
        scenario.check_version()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn check_version(&self) -> Result<(), ScenarioError> {
        if self.version != SCENARIO_VERSION {
            return Err(ScenarioError::VersionMismatch {
                expected: SCENARIO_VERSION,
                found: self.version.clone(),
            });
        }
        Ok(())
    }
}

fn world_err(e: impl std::fmt::Display) -> ScenarioError {
    ScenarioError::World(e.to_string())
}

struct Lookup<'a> {
    actors: BTreeMap<&'a str, &'a ActorData>,
    stages: BTreeMap<&'a str, &'a StageData>,
    props: BTreeMap<&'a str, &'a PropModel>,
    world_systems: BTreeMap<&'a str, &'a WorldSystemData>,
}

impl<'a> Lookup<'a> {
    fn new(db: &'a Database) -> Self {
        Self {
            actors: db.actors.iter().map(|a| (a.name.as_str(), a)).collect(),
            stages: db.stages.iter().map(|s| (s.name.as_str(), s)).collect(),
            props: db.props.iter().map(|p| (p.name.as_str(), p)).collect(),
            world_systems: db.world_systems.iter().map(|w| (w.name.as_str(), w)).collect(),
        }
    }

    fn prop(&self, name: &str) -> Result<&'a PropModel, ScenarioError> {
        self.props.get(name).copied().ok_or_else(|| ScenarioError::Unknown {
            kind: "prop",
            name: name.to_string(),
        })
    }
}

fn spawn(ctx: &mut RpgContext, name: &str) -> Result<EntityId, ScenarioError> {
    ctx.spawn_named(name)
        .ok_or_else(|| ScenarioError::DuplicateName(name.to_string()))
}

fn give_props(ctx: &mut RpgContext, lookup: &Lookup<'_>, owner: &str, props: &[PropRef]) -> Result<(), ScenarioError> {
    for prop in props {
        let model = lookup.prop(&prop.name)?;
        ctx.files
            .give_prop(owner, PropFile::new(owner, model.clone(), prop.count.max(1)));
    }
    Ok(())
}

fn build_actor(
    ctx: &mut RpgContext,
    lookup: &Lookup<'_>,
    instance: &ActorInstance,
    player: bool,
) -> Result<EntityId, ScenarioError> {
    let data = lookup.actors.get(instance.name.as_str()).ok_or_else(|| ScenarioError::Unknown {
        kind: "actor",
        name: instance.name.clone(),
    })?;
    let e = spawn(ctx, &data.name)?;
    ctx.ecs
        .set_component(
            e,
            Actor {
                name: data.name.clone(),
                current_stage: String::new(),
            },
        )
        .map_err(world_err)?;
    ctx.ecs
        .set_component(
            e,
            BaseForm {
                text: data.base_form.clone(),
            },
        )
        .map_err(world_err)?;
    ctx.ecs
        .set_component(e, Attributes::from(data.attributes))
        .map_err(world_err)?;
    ctx.ecs
        .set_component(e, RoundEventsRecord::default())
        .map_err(world_err)?;
    if !data.kick_off_message.is_empty() {
        ctx.ecs
            .set_component(
                e,
                KickOffContent {
                    text: data.kick_off_message.clone(),
                },
            )
            .map_err(world_err)?;
    }
    ctx.agents.register(&data.name, data.url.clone());
    give_props(ctx, lookup, &data.name, &instance.props)?;

    for (slot, prop_name) in [("weapon", &instance.weapon), ("clothes", &instance.clothes)] {
        let Some(prop_name) = prop_name else { continue };
        let owned = ctx.files.prop(&data.name, prop_name).map(|f| f.prop_type());
        let expected = if slot == "weapon" { PropType::Weapon } else { PropType::Clothes };
        if owned != Some(expected) {
            return Err(ScenarioError::NotOwned {
                owner: data.name.clone(),
                prop: prop_name.clone(),
            });
        }
        if slot == "weapon" {
            ctx.ecs
                .set_component(
                    e,
                    Weapon {
                        prop_name: prop_name.clone(),
                    },
                )
                .map_err(world_err)?;
        } else {
            ctx.ecs
                .set_component(
                    e,
                    Clothes {
                        prop_name: prop_name.clone(),
                    },
                )
                .map_err(world_err)?;
        }
    }

    if player {
        ctx.ecs
            .set_component(
                e,
                Player {
                    name: data.name.clone(),
                },
            )
            .map_err(world_err)?;
        ctx.players.create_proxy(&data.name)?;
        ctx.players.bind_entity(&data.name, e)?;
    }
    Ok(e)
}

fn build_stage(ctx: &mut RpgContext, lookup: &Lookup<'_>, instance: &StageInstance) -> Result<EntityId, ScenarioError> {
    let data = lookup.stages.get(instance.name.as_str()).ok_or_else(|| ScenarioError::Unknown {
        kind: "stage",
        name: instance.name.clone(),
    })?;
    let e = spawn(ctx, &data.name)?;
    ctx.ecs
        .set_component(e, Stage { name: data.name.clone() })
        .map_err(world_err)?;
    ctx.ecs
        .set_component(
            e,
            StageGraph {
                edges: data.stage_graph.clone(),
            },
        )
        .map_err(world_err)?;
    ctx.ecs
        .set_component(e, StageNarrative::default())
        .map_err(world_err)?;
    ctx.ecs
        .set_component(e, Attributes::from(data.attributes))
        .map_err(world_err)?;
    ctx.ecs
        .set_component(e, RoundEventsRecord::default())
        .map_err(world_err)?;
    if let Some(text) = data.exit_condition.clone().filter(|t| !t.is_empty()) {
        ctx.ecs.set_component(e, StageExitCond { text }).map_err(world_err)?;
    }
    if let Some(text) = data.entry_condition.clone().filter(|t| !t.is_empty()) {
        ctx.ecs.set_component(e, StageEntryCond { text }).map_err(world_err)?;
    }
    if !data.kick_off_message.is_empty() {
        ctx.ecs
            .set_component(
                e,
                KickOffContent {
                    text: data.kick_off_message.clone(),
                },
            )
            .map_err(world_err)?;
    }
    ctx.stages.register_stage(&data.name, data.stage_graph.clone());
    ctx.agents.register(&data.name, data.url.clone());
    give_props(ctx, lookup, &data.name, &instance.props)?;
    Ok(e)
}

fn build_world_system(ctx: &mut RpgContext, lookup: &Lookup<'_>, name: &str) -> Result<EntityId, ScenarioError> {
    let data = lookup.world_systems.get(name).ok_or_else(|| ScenarioError::Unknown {
        kind: "world system",
        name: name.to_string(),
    })?;
    let e = spawn(ctx, &data.name)?;
    ctx.ecs
        .set_component(e, World { name: data.name.clone() })
        .map_err(world_err)?;
    ctx.ecs
        .set_component(e, WorldSystemRole(data.kind))
        .map_err(world_err)?;
    ctx.ecs
        .set_component(e, RoundEventsRecord::default())
        .map_err(world_err)?;
    if !data.kick_off_message.is_empty() {
        ctx.ecs
            .set_component(
                e,
                KickOffContent {
                    text: data.kick_off_message.clone(),
                },
            )
            .map_err(world_err)?;
    }
    ctx.agents.register(&data.name, data.url.clone());
    Ok(e)
}

/// Populate an empty world from a scenario.
pub fn build_world(ctx: &mut RpgContext, scenario: &ScenarioFile) -> Result<(), ScenarioError> {
    scenario.check_version()?;
    let lookup = Lookup::new(&scenario.database);

    for ws in &scenario.world_systems {
        build_world_system(ctx, &lookup, &ws.name)?;
    }
    // Stages first so edges and placement can be resolved.
    for stage in &scenario.stages {
        build_stage(ctx, &lookup, stage)?;
    }
    for actor in &scenario.players {
        build_actor(ctx, &lookup, actor, true)?;
    }
    for actor in &scenario.actors {
        build_actor(ctx, &lookup, actor, false)?;
    }

    let mut placed: BTreeMap<String, String> = BTreeMap::new();
    for stage in &scenario.stages {
        for actor in &stage.actors {
            if let Some(first) = placed.get(&actor.name) {
                return Err(ScenarioError::DoublePlacement {
                    actor: actor.name.clone(),
                    first: first.clone(),
                    second: stage.name.clone(),
                });
            }
            let entity = ctx
                .entity_by_name(&actor.name)
                .filter(|&e| ctx.ecs.has_component::<Actor>(e))
                .ok_or_else(|| ScenarioError::Unknown {
                    kind: "actor instance",
                    name: actor.name.clone(),
                })?;
            ctx.place_actor(entity, &stage.name).map_err(world_err)?;
            placed.insert(actor.name.clone(), stage.name.clone());
        }
    }

    let stage_names: BTreeSet<&str> = scenario.stages.iter().map(|s| s.name.as_str()).collect();
    for stage in &scenario.stages {
        if let Some(data) = lookup.stages.get(stage.name.as_str()) {
            for edge in &data.stage_graph {
                if !stage_names.contains(edge.as_str()) {
                    tracing::warn!(stage = %stage.name, edge = %edge, "stage graph points at an absent stage");
                }
            }
        }
    }

    let map = ctx.stage_actors_map();
    ctx.files.set_stage_actors_map(map);

    tracing::info!(
        stages = scenario.stages.len(),
        actors = scenario.actors.len(),
        players = scenario.players.len(),
        world_systems = scenario.world_systems.len(),
        "world built"
    );
    Ok(())
}
