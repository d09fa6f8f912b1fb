use std::sync::Arc;

use agent::{AgentClient, AgentError};
use async_trait::async_trait;
use engine_core::{Initializer, PhaseError};

use crate::components::AgentPingFlag;
use crate::context::RpgContext;
use crate::systems::agent_entities;

/// Builds a client for `(agent_name, endpoint_url)`.
pub type ClientFactory = Box<dyn FnMut(&str, &str) -> Result<Arc<dyn AgentClient>, AgentError>>;

/// Connects agents and flags every entity whose agent is reachable.
#[derive(Default)]
pub struct ConnectSystem {
    factory: Option<ClientFactory>,
}

impl ConnectSystem {
    /// Only flags agents whose clients were attached beforehand.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(factory: ClientFactory) -> Self {
        Self { factory: Some(factory) }
    }
}

#[async_trait(?Send)]
impl Initializer<RpgContext> for ConnectSystem {
    fn name(&self) -> &'static str {
        "connect"
    }

    async fn initialize(&mut self, ctx: &mut RpgContext) -> Result<(), PhaseError> {
        if let Some(factory) = self.factory.as_mut() {
            ctx.agents.connect_all(|name, url| factory(name, url));
        }

        let mut connected = 0;
        for entity in agent_entities(ctx) {
            let Some(name) = ctx.name_of(entity).map(str::to_string) else {
                continue;
            };
            if ctx.agents.is_connected(&name) {
                ctx.ecs.set_component(entity, AgentPingFlag)?;
                connected += 1;
            } else {
                tracing::warn!(entity = %entity, agent = %name, "agent unreachable, entity will not be asked");
            }
        }
        tracing::info!(connected, agents = ctx.agents.names().len(), "agents connected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use agent::ScriptedAgentClient;

    use super::*;
    use crate::testing::{add_actor, add_stage, context};

    #[tokio::test]
    async fn flags_only_connected_agents() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        ctx.agents
            .attach_client("A", Arc::new(ScriptedAgentClient::silent("A")))
            .unwrap();

        ConnectSystem::new().initialize(&mut ctx).await.unwrap();
        assert!(ctx.ecs.has_component::<AgentPingFlag>(a));
        assert!(!ctx.ecs.has_component::<AgentPingFlag>(b));
    }

    #[tokio::test]
    async fn factory_connects_agents_with_endpoints() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        ctx.agents.register("A", Some("http://localhost:8100".into()));

        let mut system = ConnectSystem::with_factory(Box::new(|name, _url| {
            Ok(Arc::new(ScriptedAgentClient::silent(name)) as Arc<dyn AgentClient>)
        }));
        system.initialize(&mut ctx).await.unwrap();
        assert!(ctx.ecs.has_component::<AgentPingFlag>(a));
        // Stage X has no endpoint.
        let x = ctx.entity_by_name("X").unwrap();
        assert!(!ctx.ecs.has_component::<AgentPingFlag>(x));
    }
}
