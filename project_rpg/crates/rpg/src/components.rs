use ecs_adapter::Component;
use serde::{Deserialize, Serialize};

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Guid(pub u64);

/// A world-level system agent with no physical location.
#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct World {
    pub name: String,
}

#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub name: String,
}

/// `current_stage` is empty while the actor is in transit.
#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub name: String,
    pub current_stage: String,
}

#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub name: String,
}

/// Stages reachable from this one. Empty means no restriction.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageGraph {
    pub edges: Vec<String>,
}

#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageExitCond {
    pub text: String,
}

#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageEntryCond {
    pub text: String,
}

/// Latest narration produced by the stage.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageNarrative {
    pub text: String,
}

#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaseForm {
    pub text: String,
}

/// Derived look. `source_key` identifies the inputs it was derived from.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinalAppearance {
    pub text: String,
    pub source_key: String,
}

#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Attributes {
    pub max_hp: i32,
    pub hp: i32,
    pub damage: i32,
    pub defense: i32,
    pub heal: i32,
}

impl Attributes {
    pub fn new(max_hp: i32, damage: i32, defense: i32, heal: i32) -> Self {
        Self {
            max_hp,
            hp: max_hp,
            damage,
            defense,
            heal,
        }
    }
}

#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Weapon {
    pub prop_name: String,
}

#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clothes {
    pub prop_name: String,
}

#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KickOffContent {
    pub text: String,
}

#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KickOffFlag;

#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentPingFlag;

#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanningFlag;

#[derive(Component, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnterStageFlag {
    pub stage: String,
}

/// Every line delivered to the entity this round.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoundEventsRecord {
    pub events: Vec<String>,
}

#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DestroyMark;

/// Terminal state left behind once the dead phase has run.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Deceased {
    pub killer: Option<String>,
}

/// Last tags an entity gave itself through `TagAction`.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelfTags {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorldSystemKind {
    Appearance,
    Skill,
    Generic,
}

#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldSystemRole(pub WorldSystemKind);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_start_at_full_health() {
        let attrs = Attributes::new(100, 12, 3, 5);
        assert_eq!(attrs.hp, 100);
        assert_eq!(attrs.max_hp, 100);
    }

    #[test]
    fn world_system_kind_uses_snake_case() {
        let kind: WorldSystemKind = serde_json::from_str("\"appearance\"").unwrap();
        assert_eq!(kind, WorldSystemKind::Appearance);
        assert_eq!(serde_json::to_string(&WorldSystemKind::Skill).unwrap(), "\"skill\"");
    }
}
