//! Action components: one transient component per verb.
//!
//! Every action is a list of string values. Attaching an action that is
//! already present merges the new values into it, so an entity carries at
//! most one component per verb per round.

use ecs_adapter::{Component, EcsAdapter, EcsError, EntityId};

/// Common shape of every action component.
pub trait ActionComponent: Component + Clone {
    const KIND: ActionKind;
    fn values(&self) -> &[String];
    fn from_values(values: Vec<String>) -> Self;
}

macro_rules! action_components {
    ($($kind:ident => $ty:ident),* $(,)?) => {
        $(
            #[derive(Component, Debug, Clone, Default, PartialEq, Eq)]
            pub struct $ty {
                pub values: Vec<String>,
            }

            impl ActionComponent for $ty {
                const KIND: ActionKind = ActionKind::$kind;

                fn values(&self) -> &[String] {
                    &self.values
                }

                fn from_values(values: Vec<String>) -> Self {
                    Self { values }
                }
            }
        )*

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ActionKind {
            $($kind),*
        }

        impl ActionKind {
            pub const ALL: &'static [ActionKind] = &[$(ActionKind::$kind),*];

            /// Wire name used in plans.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(ActionKind::$kind => stringify!($ty)),*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($ty) => Some(ActionKind::$kind),)*
                    _ => None,
                }
            }

            pub fn attach(self, ecs: &mut EcsAdapter, entity: EntityId, values: Vec<String>) -> Result<(), EcsError> {
                match self {
                    $(ActionKind::$kind => attach_action::<$ty>(ecs, entity, values)),*
                }
            }

            pub fn remove(self, ecs: &mut EcsAdapter, entity: EntityId) -> Result<(), EcsError> {
                match self {
                    $(ActionKind::$kind => ecs.remove_component::<$ty>(entity)),*
                }
            }

            pub fn is_on(self, ecs: &EcsAdapter, entity: EntityId) -> bool {
                match self {
                    $(ActionKind::$kind => ecs.has_component::<$ty>(entity)),*
                }
            }

            pub fn values_on(self, ecs: &EcsAdapter, entity: EntityId) -> Option<Vec<String>> {
                match self {
                    $(ActionKind::$kind => ecs.try_component::<$ty>(entity).map(|a| a.values.clone())),*
                }
            }
        }
    };
}

action_components! {
    StageNarrate => StageNarrateAction,
    StageTag => StageTagAction,
    StageTransfer => StageTransferAction,
    Damage => DamageAction,
    Heal => HealAction,
    Tag => TagAction,
    MindVoice => MindVoiceAction,
    Speak => SpeakAction,
    Announce => AnnounceAction,
    Whisper => WhisperAction,
    Dead => DeadAction,
    GoTo => GoToAction,
    PickUpProp => PickUpPropAction,
    StealProp => StealPropAction,
    TransferProp => TransferPropAction,
    GiveProp => GivePropAction,
    EquipProp => EquipPropAction,
    UpdateAppearance => UpdateAppearanceAction,
    Inspect => InspectAction,
    Behavior => BehaviorAction,
    Skill => SkillAction,
    SkillTarget => SkillTargetAction,
    SkillUseProp => SkillUsePropAction,
}

/// Attach or merge values into an action component. Duplicate values are
/// kept once.
pub fn attach_action<A: ActionComponent>(ecs: &mut EcsAdapter, entity: EntityId, values: Vec<String>) -> Result<(), EcsError> {
    let mut merged = ecs
        .try_component::<A>(entity)
        .map(|a| a.values().to_vec())
        .unwrap_or_default();
    for value in values {
        if !merged.contains(&value) {
            merged.push(value);
        }
    }
    ecs.set_component(entity, A::from_values(merged))
}

pub const CONVERSATION_ACTIONS: &[ActionKind] = &[
    ActionKind::Tag,
    ActionKind::MindVoice,
    ActionKind::Speak,
    ActionKind::Announce,
    ActionKind::Whisper,
];

/// Actions a stage agent may plan.
pub const STAGE_AVAILABLE_ACTIONS: &[ActionKind] = &[
    ActionKind::StageNarrate,
    ActionKind::StageTag,
    ActionKind::StageTransfer,
    ActionKind::Damage,
    ActionKind::Heal,
    ActionKind::Tag,
    ActionKind::MindVoice,
    ActionKind::Speak,
    ActionKind::Announce,
    ActionKind::Whisper,
];

/// Actions an actor agent may plan.
pub const ACTOR_AVAILABLE_ACTIONS: &[ActionKind] = &[
    ActionKind::Tag,
    ActionKind::MindVoice,
    ActionKind::Speak,
    ActionKind::Announce,
    ActionKind::Whisper,
    ActionKind::Dead,
    ActionKind::GoTo,
    ActionKind::PickUpProp,
    ActionKind::StealProp,
    ActionKind::TransferProp,
    ActionKind::GiveProp,
    ActionKind::EquipProp,
    ActionKind::UpdateAppearance,
    ActionKind::Inspect,
    ActionKind::Behavior,
    ActionKind::Skill,
    ActionKind::SkillTarget,
    ActionKind::SkillUseProp,
    ActionKind::Damage,
    ActionKind::Heal,
];

/// Strip every action component from the entity.
pub fn remove_all_actions(ecs: &mut EcsAdapter, entity: EntityId) -> Result<(), EcsError> {
    for kind in ActionKind::ALL {
        kind.remove(ecs, entity)?;
    }
    Ok(())
}

pub fn has_any_action(ecs: &EcsAdapter, entity: EntityId) -> bool {
    ActionKind::ALL.iter().any(|kind| kind.is_on(ecs, entity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_resolve_both_ways() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_name(kind.as_str()), Some(*kind));
        }
        assert_eq!(ActionKind::GoTo.as_str(), "GoToAction");
        assert_eq!(ActionKind::from_name("FlyAction"), None);
    }

    #[test]
    fn attach_merges_values() {
        let mut ecs = EcsAdapter::new();
        let e = ecs.spawn_entity();
        ActionKind::Speak.attach(&mut ecs, e, vec!["@B>hi".into()]).unwrap();
        ActionKind::Speak
            .attach(&mut ecs, e, vec!["@B>hi".into(), "@C>yo".into()])
            .unwrap();

        let speak = ecs.get_component::<SpeakAction>(e).unwrap();
        assert_eq!(speak.values, vec!["@B>hi".to_string(), "@C>yo".to_string()]);
    }

    #[test]
    fn remove_all_wipes_every_verb() {
        let mut ecs = EcsAdapter::new();
        let e = ecs.spawn_entity();
        ActionKind::GoTo.attach(&mut ecs, e, vec!["Y".into()]).unwrap();
        ActionKind::Tag.attach(&mut ecs, e, vec!["calm".into()]).unwrap();
        assert!(has_any_action(&ecs, e));

        remove_all_actions(&mut ecs, e).unwrap();
        assert!(!has_any_action(&ecs, e));
    }

    #[test]
    fn damage_is_allowed_for_stages_and_actors() {
        assert!(STAGE_AVAILABLE_ACTIONS.contains(&ActionKind::Damage));
        assert!(ACTOR_AVAILABLE_ACTIONS.contains(&ActionKind::Damage));
        assert!(!STAGE_AVAILABLE_ACTIONS.contains(&ActionKind::GoTo));
        assert!(!ACTOR_AVAILABLE_ACTIONS.contains(&ActionKind::StageNarrate));
    }
}
