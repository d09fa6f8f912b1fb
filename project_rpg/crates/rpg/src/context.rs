use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use agent::{gather, AgentSystem, AgentTask};
use ecs_adapter::{EcsAdapter, EntityId};
use engine_core::{EventBus, PhaseError, WorldContext};
use observability::GatherMetrics;
use persistence::{FileSystem, PropModel};
use serde::{Deserialize, Serialize};
use session::{ClientMessage, MessageChannel, PlayerProxyManager};
use space::{MoveError, StageGraphSpace};

use crate::actions::DeadAction;
use crate::chaos::{ChaosEngineering, NoChaos};
use crate::components::{
    Actor, Deceased, FinalAppearance, Guid, Player, RoundEventsRecord, Stage, World,
};
use crate::events::{AgentEvent, RecipientKind};

/// Which entities pre-planning marks after the first round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrePlanningPolicy {
    /// Every occupied stage and every non-player actor.
    #[default]
    All,
    /// Stages holding a player, and the non-player actors inside them.
    OnlyPlayersStage,
}

#[derive(Debug, Clone, Default)]
pub struct RpgOptions {
    pub about_game: String,
    pub pre_planning: PrePlanningPolicy,
    /// Per-round budget for every gather issued inside the round.
    pub round_deadline: Option<Duration>,
}

/// Process-wide services injected into the world.
pub struct Runtime {
    pub files: FileSystem,
    pub agents: AgentSystem,
    pub chaos: Box<dyn ChaosEngineering>,
}

impl Runtime {
    pub fn new(files: FileSystem, agents: AgentSystem) -> Self {
        Self {
            files,
            agents,
            chaos: Box::new(NoChaos),
        }
    }

    pub fn with_chaos(mut self, chaos: impl ChaosEngineering + 'static) -> Self {
        self.chaos = Box::new(chaos);
        self
    }
}

/// A rendered event waiting for a player proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: MessageChannel,
    pub message: ClientMessage,
}

/// The world every phase operates on.
pub struct RpgContext {
    pub ecs: EcsAdapter,
    pub stages: StageGraphSpace,
    pub files: FileSystem,
    pub agents: AgentSystem,
    pub players: PlayerProxyManager,
    pub bus: EventBus<Delivery>,
    pub chaos: Box<dyn ChaosEngineering>,
    pub options: RpgOptions,
    round: u64,
    deadline_at: Option<tokio::time::Instant>,
    game_over: Option<String>,
    names: BTreeMap<String, EntityId>,
    next_guid: u64,
}

impl RpgContext {
    pub fn new(runtime: Runtime, players: PlayerProxyManager, options: RpgOptions) -> Self {
        Self {
            ecs: EcsAdapter::new(),
            stages: StageGraphSpace::new(),
            files: runtime.files,
            agents: runtime.agents,
            players,
            bus: EventBus::new(),
            chaos: runtime.chaos,
            options,
            round: 0,
            deadline_at: None,
            game_over: None,
            names: BTreeMap::new(),
            next_guid: 1,
        }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over.is_some()
    }

    pub fn game_over_reason(&self) -> Option<&str> {
        self.game_over.as_deref()
    }

    pub fn mark_game_over(&mut self, reason: impl Into<String>) {
        if self.game_over.is_none() {
            let reason = reason.into();
            tracing::info!(round = self.round, reason = %reason, "game over");
            self.game_over = Some(reason);
        }
    }

    /// Deadline applied to gathers issued this round.
    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline_at
    }

    /// Run a batch of agent requests under the round deadline.
    pub async fn gather(&mut self, tasks: &mut [AgentTask], label: &str) -> GatherMetrics {
        gather(&mut self.agents, tasks, self.deadline_at, label).await
    }

    /// Spawn an entity registered under a unique name.
    pub fn spawn_named(&mut self, name: &str) -> Option<EntityId> {
        if self.names.contains_key(name) {
            return None;
        }
        let entity = self.ecs.spawn_entity();
        let guid = Guid(self.next_guid);
        self.next_guid += 1;
        if let Err(e) = self.ecs.set_component(entity, guid) {
            tracing::error!(entity = %entity, error = %e, "failed to tag fresh entity");
        }
        self.names.insert(name.to_string(), entity);
        Some(entity)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<EntityId> {
        self.names
            .get(name)
            .copied()
            .filter(|&e| self.ecs.is_alive(e))
    }

    pub fn entity_by_guid(&self, guid: u64) -> Option<EntityId> {
        self.ecs
            .entities_with::<Guid>()
            .into_iter()
            .find(|&e| self.ecs.try_component::<Guid>(e).is_some_and(|g| g.0 == guid))
    }

    pub fn name_of(&self, entity: EntityId) -> Option<&str> {
        if let Some(actor) = self.ecs.try_component::<Actor>(entity) {
            return Some(&actor.name);
        }
        if let Some(stage) = self.ecs.try_component::<Stage>(entity) {
            return Some(&stage.name);
        }
        self.ecs.try_component::<World>(entity).map(|w| w.name.as_str())
    }

    pub fn recipient_kind(&self, entity: EntityId) -> Option<RecipientKind> {
        if self.ecs.has_component::<Actor>(entity) {
            Some(RecipientKind::Actor)
        } else if self.ecs.has_component::<Stage>(entity) {
            Some(RecipientKind::Stage)
        } else if self.ecs.has_component::<World>(entity) {
            Some(RecipientKind::World)
        } else {
            None
        }
    }

    pub fn is_player(&self, entity: EntityId) -> bool {
        self.ecs.has_component::<Player>(entity)
    }

    /// Dying this round or already dead.
    pub fn is_dead(&self, entity: EntityId) -> bool {
        self.ecs.has_component::<DeadAction>(entity) || self.ecs.has_component::<Deceased>(entity)
    }

    /// Current stage name of an actor, `None` while in transit.
    pub fn actor_stage(&self, actor: EntityId) -> Option<&str> {
        self.ecs
            .try_component::<Actor>(actor)
            .map(|a| a.current_stage.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn stage_entity_of(&self, actor: EntityId) -> Option<EntityId> {
        self.actor_stage(actor).and_then(|s| self.entity_by_name(s))
    }

    /// The stage itself if `entity` is a stage, else the actor's stage.
    pub fn stage_context_of(&self, entity: EntityId) -> Option<String> {
        if let Some(stage) = self.ecs.try_component::<Stage>(entity) {
            return Some(stage.name.clone());
        }
        self.actor_stage(entity).map(str::to_string)
    }

    pub fn actors_in_stage(&self, stage: &str) -> Vec<EntityId> {
        self.stages
            .occupants(stage)
            .into_iter()
            .filter(|&e| self.ecs.is_alive(e))
            .collect()
    }

    pub fn actor_names_in_stage(&self, stage: &str) -> Vec<String> {
        self.actors_in_stage(stage)
            .into_iter()
            .filter_map(|e| self.name_of(e).map(str::to_string))
            .collect()
    }

    /// Stage name to occupant names, for every registered stage.
    pub fn stage_actors_map(&self) -> BTreeMap<String, Vec<String>> {
        self.stages
            .all_stages()
            .into_iter()
            .map(|stage| {
                let actors = self.actor_names_in_stage(&stage);
                (stage, actors)
            })
            .collect()
    }

    /// Put an actor on a stage for the first time.
    pub fn place_actor(&mut self, actor: EntityId, stage: &str) -> Result<(), PhaseError> {
        self.stages
            .place_entity(actor, stage)
            .map_err(|e| PhaseError::Failed(e.to_string()))?;
        self.ecs
            .update_component::<Actor, _>(actor, |a| a.current_stage = stage.to_string())?;
        Ok(())
    }

    /// Re-parent an actor, keeping the stage index and `Actor` in step.
    /// Returns the stage left behind.
    pub fn move_actor(&mut self, actor: EntityId, target: &str) -> Result<String, PhaseError> {
        let left = self
            .stages
            .move_entity(actor, target)
            .map_err(|e: MoveError| PhaseError::Failed(e.to_string()))?;
        self.ecs
            .update_component::<Actor, _>(actor, |a| a.current_stage = target.to_string())?;
        Ok(left)
    }

    pub fn appearance_of(&self, entity: EntityId) -> String {
        self.ecs
            .try_component::<FinalAppearance>(entity)
            .map(|a| a.text.clone())
            .unwrap_or_default()
    }

    /// Props owned by `owner`, sorted by name.
    pub fn props_of(&self, owner: &str) -> Vec<(PropModel, u32)> {
        self.files
            .props
            .list(owner)
            .into_iter()
            .map(|f| (f.prop.clone(), f.count))
            .collect()
    }

    /// Deliver an event to each recipient once: history (when the event
    /// enters histories), the round record, and for players the client bus.
    pub fn notify(&mut self, recipients: impl IntoIterator<Item = EntityId>, event: &AgentEvent) {
        let unique: BTreeSet<EntityId> = recipients.into_iter().collect();
        for entity in unique {
            if !self.ecs.is_alive(entity) {
                continue;
            }
            let (Some(kind), Some(name)) = (self.recipient_kind(entity), self.name_of(entity).map(str::to_string)) else {
                continue;
            };
            let text = event.format(kind, &name);
            if event.enters_history() {
                self.agents.append_human(&name, text.clone());
            }
            if let Err(e) = self
                .ecs
                .update_component::<RoundEventsRecord, _>(entity, |r| r.events.push(text.clone()))
            {
                tracing::trace!(entity = %entity, error = %e, "no round record");
            }
            if self.is_player(entity) {
                self.bus.emit(
                    entity,
                    Delivery {
                        channel: event.channel(),
                        message: ClientMessage::new(event.class_name(), text, self.round),
                    },
                );
            }
        }
    }

    /// Notify every actor on `stage`, plus the stage itself when asked.
    pub fn notify_stage(&mut self, stage: &str, include_stage: bool, event: &AgentEvent) {
        let mut recipients = self.actors_in_stage(stage);
        if include_stage {
            recipients.extend(self.entity_by_name(stage));
        }
        self.notify(recipients, event);
    }

    pub fn notice(&mut self, entity: EntityId, text: impl Into<String>) {
        self.notify([entity], &AgentEvent::Notice { text: text.into() });
    }

    /// Remove an entity from the world. Destroying an entity twice is fatal.
    pub fn destroy_entity(&mut self, entity: EntityId) -> Result<(), PhaseError> {
        if !self.ecs.is_alive(entity) {
            return Err(PhaseError::Fatal(format!("entity {entity} destroyed twice")));
        }
        let name = self.name_of(entity).map(str::to_string);
        if self.stages.entity_stage(entity).is_some() {
            self.stages
                .remove_entity(entity)
                .map_err(|e| PhaseError::Failed(e.to_string()))?;
        }
        self.ecs
            .despawn_entity(entity)
            .map_err(|e| PhaseError::Fatal(format!("despawn {entity}: {e}")))?;
        if let Some(name) = name {
            self.names.remove(&name);
            tracing::info!(entity = %entity, name = %name, "entity destroyed");
        }
        Ok(())
    }
}

impl WorldContext for RpgContext {
    fn ecs(&self) -> &EcsAdapter {
        &self.ecs
    }

    fn ecs_mut(&mut self) -> &mut EcsAdapter {
        &mut self.ecs
    }

    fn begin_round(&mut self, round: u64) {
        self.round = round;
        self.deadline_at = self
            .options
            .round_deadline
            .map(|d| tokio::time::Instant::now() + d);
        self.chaos.on_round_start(round);
    }

    fn should_stop(&self) -> bool {
        self.is_game_over()
    }

    fn take_request_counts(&mut self) -> (usize, usize) {
        self.agents.take_request_counts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Actor;

    fn context() -> RpgContext {
        RpgContext::new(
            Runtime::new(FileSystem::in_memory(), AgentSystem::new()),
            PlayerProxyManager::new(8),
            RpgOptions::default(),
        )
    }

    fn actor(ctx: &mut RpgContext, name: &str) -> EntityId {
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
        ctx.ecs.set_component(e, RoundEventsRecord::default()).unwrap();
        ctx.agents.register(name, None);
        e
    }

    #[test]
    fn names_are_unique() {
        let mut ctx = context();
        let a = ctx.spawn_named("A").unwrap();
        assert!(ctx.spawn_named("A").is_none());
        assert_eq!(ctx.entity_by_name("A"), Some(a));
        assert_eq!(ctx.entity_by_guid(1), Some(a));
    }

    #[test]
    fn move_keeps_index_and_component_in_step() {
        let mut ctx = context();
        ctx.stages.register_stage("X", vec!["Y".into()]);
        ctx.stages.register_stage("Y", vec![]);
        let a = actor(&mut ctx, "A");

        ctx.place_actor(a, "X").unwrap();
        assert_eq!(ctx.actor_stage(a), Some("X"));

        let left = ctx.move_actor(a, "Y").unwrap();
        assert_eq!(left, "X");
        assert_eq!(ctx.actor_stage(a), Some("Y"));
        assert_eq!(ctx.stages.entity_stage(a), Some("Y"));
        assert!(ctx.actors_in_stage("X").is_empty());
    }

    #[test]
    fn notify_writes_history_and_record() {
        let mut ctx = context();
        let a = actor(&mut ctx, "A");
        let b = actor(&mut ctx, "B");
        let event = AgentEvent::Speak {
            from: "A".into(),
            to: "B".into(),
            content: "hi".into(),
        };
        ctx.notify([a, b, b], &event);

        assert_eq!(ctx.agents.history("B").len(), 1);
        assert!(ctx.agents.history("B")[0].text().contains("hi"));
        let record = ctx.ecs.get_component::<RoundEventsRecord>(b).unwrap();
        assert_eq!(record.events.len(), 1);
        // Nobody is a player, so nothing is queued for clients.
        assert!(ctx.bus.is_empty());
    }

    #[test]
    fn round_marker_skips_history() {
        let mut ctx = context();
        let a = actor(&mut ctx, "A");
        ctx.notify([a], &AgentEvent::RoundStarted { round: 1 });
        assert!(ctx.agents.history("A").is_empty());
        assert_eq!(ctx.ecs.get_component::<RoundEventsRecord>(a).unwrap().events.len(), 1);
    }

    #[test]
    fn double_destruction_is_fatal() {
        let mut ctx = context();
        let a = actor(&mut ctx, "A");
        ctx.destroy_entity(a).unwrap();
        assert!(ctx.entity_by_name("A").is_none());
        let err = ctx.destroy_entity(a).unwrap_err();
        assert!(err.is_fatal());
    }
}
