//! Player proxies: the command-ingress and message-drain surface between
//! the round runner and whatever front-end drives a player.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use ecs_adapter::EntityId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no player proxy named {0}")]
    UnknownPlayer(String),

    #[error("player proxy {0} already exists")]
    DuplicatePlayer(String),

    #[error("entity {entity} is already bound to player {player}")]
    AlreadyBound { entity: EntityId, player: String },
}

/// Which of the three outgoing queues a message lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageChannel {
    Stage,
    Actor,
    Tip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub class_name: String,
    pub message: String,
    pub round: u64,
}

impl ClientMessage {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>, round: u64) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
            round,
        }
    }
}

/// Everything drained from a proxy in one swap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyDrain {
    pub stage: Vec<ClientMessage>,
    pub actor: Vec<ClientMessage>,
    pub tip: Vec<ClientMessage>,
}

impl ProxyDrain {
    pub fn is_empty(&self) -> bool {
        self.stage.is_empty() && self.actor.is_empty() && self.tip.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stage.len() + self.actor.len() + self.tip.len()
    }
}

#[derive(Debug, Default)]
struct ProxyQueues {
    commands: VecDeque<String>,
    stage: VecDeque<ClientMessage>,
    actor: VecDeque<ClientMessage>,
    tip: VecDeque<ClientMessage>,
    kickoff: Vec<String>,
    dropped: u64,
    game_over: bool,
}

impl ProxyQueues {
    fn queue_mut(&mut self, channel: MessageChannel) -> &mut VecDeque<ClientMessage> {
        match channel {
            MessageChannel::Stage => &mut self.stage,
            MessageChannel::Actor => &mut self.actor,
            MessageChannel::Tip => &mut self.tip,
        }
    }
}

/// Shared handle to one player's queues.
///
/// The runner pushes messages and takes commands; a front-end submits
/// commands and drains messages. Both takes are a swap under the lock, so a
/// reader never sees a half-written batch.
#[derive(Debug, Clone)]
pub struct PlayerProxy {
    name: String,
    capacity: usize,
    queues: Arc<Mutex<ProxyQueues>>,
}

impl PlayerProxy {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            queues: Arc::new(Mutex::new(ProxyQueues::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, ProxyQueues> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a command for the next round. The oldest command is dropped
    /// when the queue is full.
    pub fn submit_command(&self, command: impl Into<String>) {
        let mut queues = self.lock();
        if queues.commands.len() >= self.capacity {
            queues.commands.pop_front();
            queues.dropped += 1;
            tracing::warn!(player = %self.name, "command queue full, oldest command dropped");
        }
        queues.commands.push_back(command.into());
    }

    pub fn take_commands(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().commands).into()
    }

    pub fn push_message(&self, channel: MessageChannel, message: ClientMessage) {
        let capacity = self.capacity;
        let mut queues = self.lock();
        let overflow = {
            let queue = queues.queue_mut(channel);
            let overflow = queue.len() >= capacity;
            if overflow {
                queue.pop_front();
            }
            queue.push_back(message);
            overflow
        };
        if overflow {
            queues.dropped += 1;
            tracing::debug!(player = %self.name, ?channel, "message queue full, oldest message dropped");
        }
    }

    pub fn drain(&self, channel: MessageChannel) -> Vec<ClientMessage> {
        std::mem::take(self.lock().queue_mut(channel)).into()
    }

    pub fn drain_all(&self) -> ProxyDrain {
        let mut queues = self.lock();
        ProxyDrain {
            stage: std::mem::take(&mut queues.stage).into(),
            actor: std::mem::take(&mut queues.actor).into(),
            tip: std::mem::take(&mut queues.tip).into(),
        }
    }

    pub fn add_kickoff(&self, text: impl Into<String>) {
        self.lock().kickoff.push(text.into());
    }

    pub fn take_kickoff(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().kickoff)
    }

    /// Number of entries discarded because a queue was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn set_game_over(&self) {
        self.lock().game_over = true;
    }

    pub fn is_game_over(&self) -> bool {
        self.lock().game_over
    }
}

/// Every proxy in the game, with its entity binding.
#[derive(Debug, Default)]
pub struct PlayerProxyManager {
    proxies: BTreeMap<String, PlayerProxy>,
    entity_to_player: BTreeMap<EntityId, String>,
    capacity: usize,
}

impl PlayerProxyManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            proxies: BTreeMap::new(),
            entity_to_player: BTreeMap::new(),
            capacity,
        }
    }

    pub fn create_proxy(&mut self, name: &str) -> Result<PlayerProxy, SessionError> {
        if self.proxies.contains_key(name) {
            return Err(SessionError::DuplicatePlayer(name.to_string()));
        }
        let capacity = if self.capacity == 0 { DEFAULT_QUEUE_CAPACITY } else { self.capacity };
        let proxy = PlayerProxy::new(name, capacity);
        self.proxies.insert(name.to_string(), proxy.clone());
        Ok(proxy)
    }

    /// Bind the actor entity controlled by a proxy.
    pub fn bind_entity(&mut self, name: &str, entity: EntityId) -> Result<(), SessionError> {
        if !self.proxies.contains_key(name) {
            return Err(SessionError::UnknownPlayer(name.to_string()));
        }
        if let Some(existing) = self.entity_to_player.get(&entity) {
            return Err(SessionError::AlreadyBound {
                entity,
                player: existing.clone(),
            });
        }
        self.entity_to_player.retain(|_, player| player != name);
        self.entity_to_player.insert(entity, name.to_string());
        Ok(())
    }

    pub fn unbind_entity(&mut self, entity: EntityId) -> Option<String> {
        self.entity_to_player.remove(&entity)
    }

    pub fn proxy(&self, name: &str) -> Option<&PlayerProxy> {
        self.proxies.get(name)
    }

    pub fn proxy_for_entity(&self, entity: EntityId) -> Option<&PlayerProxy> {
        let name = self.entity_to_player.get(&entity)?;
        self.proxies.get(name)
    }

    pub fn entity_for_player(&self, name: &str) -> Option<EntityId> {
        self.entity_to_player
            .iter()
            .find(|(_, player)| player.as_str() == name)
            .map(|(&eid, _)| eid)
    }

    pub fn submit_command(&self, name: &str, command: impl Into<String>) -> Result<(), SessionError> {
        self.proxies
            .get(name)
            .ok_or_else(|| SessionError::UnknownPlayer(name.to_string()))?
            .submit_command(command);
        Ok(())
    }

    /// Bound proxies in entity order.
    pub fn bound(&self) -> Vec<(EntityId, &PlayerProxy)> {
        self.entity_to_player
            .iter()
            .filter_map(|(&eid, name)| self.proxies.get(name).map(|p| (eid, p)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerProxy> {
        self.proxies.values()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
