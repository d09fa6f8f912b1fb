use async_trait::async_trait;
use ecs_adapter::{EntityId, Trigger};
use engine_core::{PhaseError, Reactor};

use crate::actions::{attach_action, DamageAction, DeadAction, HealAction};
use crate::components::{Actor, Attributes, Clothes, Deceased, DestroyMark, Weapon};
use crate::context::RpgContext;
use crate::events::{AgentEvent, TransferVerb};
use crate::format::{parse_target_prop, TargetProp};
use crate::systems::{action_values, owned_name};
use crate::validation::check_target;

fn weapon_damage(ctx: &RpgContext, entity: EntityId, owner: &str) -> i32 {
    ctx.ecs
        .try_component::<Weapon>(entity)
        .and_then(|w| ctx.files.prop(owner, &w.prop_name))
        .map(|f| f.prop.damage())
        .unwrap_or(0)
}

/// Payload counts are `u32`; anything past `i32::MAX` is treated as the maximum.
fn payload_amount(payload: &TargetProp) -> i32 {
    i32::try_from(payload.count.unwrap_or(0)).unwrap_or(i32::MAX)
}

fn clothes_defense(ctx: &RpgContext, entity: EntityId, owner: &str) -> i32 {
    ctx.ecs
        .try_component::<Clothes>(entity)
        .and_then(|c| ctx.files.prop(owner, &c.prop_name))
        .map(|f| f.prop.defense())
        .unwrap_or(0)
}

/// Resolve one `@target/cause=n` payload against the source. Invalid
/// payloads are reported to the source and skipped.
fn resolve(ctx: &mut RpgContext, source: EntityId, source_name: &str, value: &str) -> Option<(EntityId, TargetProp)> {
    let Some(payload) = parse_target_prop(value) else {
        ctx.notice(source, format!("# {source_name}的行动格式错误: {value}"));
        return None;
    };
    let check = check_target(ctx, source, &payload.target);
    let Some(target) = check.entity() else {
        let text = check.explain(source_name, &payload.target);
        ctx.notice(source, text);
        return None;
    };
    if !ctx.ecs.has_component::<Actor>(target) || ctx.ecs.has_component::<Deceased>(target) {
        return None;
    }
    Some((target, payload))
}

/// Applies `@target/cause=n` damage payloads. The final amount is the
/// payload plus the source's attack, minus the target's defense, clamped to
/// `[0, max_hp]`. A target dropping to zero is marked dying.
#[derive(Debug, Default)]
pub struct DamageSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for DamageSystem {
    fn name(&self) -> &'static str {
        "damage"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<DamageAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        !ctx.ecs.has_component::<Deceased>(entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for source in entities {
            let Some(source_name) = owned_name(ctx, source) else {
                continue;
            };
            let attack = ctx
                .ecs
                .try_component::<Attributes>(source)
                .map(|a| a.damage)
                .unwrap_or(0)
                .saturating_add(weapon_damage(ctx, source, &source_name));

            for value in action_values::<DamageAction>(ctx, source) {
                let Some((target, payload)) = resolve(ctx, source, &source_name, &value) else {
                    continue;
                };
                let Some(attrs) = ctx.ecs.try_component::<Attributes>(target).copied() else {
                    continue;
                };
                let defense = attrs.defense.saturating_add(clothes_defense(ctx, target, &payload.target));
                let amount = payload_amount(&payload)
                    .saturating_add(attack)
                    .saturating_sub(defense)
                    .clamp(0, attrs.max_hp.max(0));
                let hp = attrs.hp.saturating_sub(amount).max(0);
                ctx.ecs.update_component::<Attributes, _>(target, |a| a.hp = hp)?;
                tracing::info!(source = %source_name, target = %payload.target, amount, hp, "damage applied");

                if let Some(stage) = ctx.stage_context_of(target) {
                    let event = AgentEvent::Damaged {
                        source: source_name.clone(),
                        target: payload.target.clone(),
                        amount,
                        hp,
                        max_hp: attrs.max_hp,
                    };
                    ctx.notify_stage(&stage, true, &event);
                }
                if hp == 0 && !ctx.ecs.has_component::<DeadAction>(target) {
                    attach_action::<DeadAction>(&mut ctx.ecs, target, vec![source_name.clone()])?;
                }
            }
        }
        Ok(())
    }
}

/// Applies `@target/cause=n` heal payloads, capped at max hp.
#[derive(Debug, Default)]
pub struct HealSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for HealSystem {
    fn name(&self) -> &'static str {
        "heal"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<HealAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        !ctx.ecs.has_component::<Deceased>(entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for source in entities {
            let Some(source_name) = owned_name(ctx, source) else {
                continue;
            };
            for value in action_values::<HealAction>(ctx, source) {
                let Some((target, payload)) = resolve(ctx, source, &source_name, &value) else {
                    continue;
                };
                // Dying this round is final.
                if ctx.ecs.has_component::<DeadAction>(target) {
                    continue;
                }
                let Some(attrs) = ctx.ecs.try_component::<Attributes>(target).copied() else {
                    continue;
                };
                let hp = attrs.hp.saturating_add(payload_amount(&payload)).min(attrs.max_hp);
                ctx.ecs.update_component::<Attributes, _>(target, |a| a.hp = hp)?;

                if let Some(stage) = ctx.stage_context_of(target) {
                    let event = AgentEvent::Healed {
                        source: source_name.clone(),
                        target: payload.target.clone(),
                        amount: hp.saturating_sub(attrs.hp),
                        hp,
                        max_hp: attrs.max_hp,
                    };
                    ctx.notify_stage(&stage, true, &event);
                }
            }
        }
        Ok(())
    }
}

/// Turns `DeadAction` into the terminal `Deceased` state. The killer takes
/// every unique prop. A dead player ends the game; everyone else is
/// destroyed at the end of the round.
#[derive(Debug, Default)]
pub struct DeadSystem;

#[async_trait(?Send)]
impl Reactor<RpgContext> for DeadSystem {
    fn name(&self) -> &'static str {
        "dead"
    }

    fn trigger(&self) -> Trigger {
        Trigger::added::<DeadAction>()
    }

    fn filter(&self, ctx: &RpgContext, entity: EntityId) -> bool {
        ctx.ecs.has_component::<Actor>(entity) && !ctx.ecs.has_component::<Deceased>(entity)
    }

    async fn react(&mut self, ctx: &mut RpgContext, entities: Vec<EntityId>) -> Result<(), PhaseError> {
        for dead in entities {
            let Some(name) = owned_name(ctx, dead) else {
                continue;
            };
            let killer = action_values::<DeadAction>(ctx, dead)
                .into_iter()
                .find(|k| *k != name && ctx.entity_by_name(k).is_some());
            ctx.ecs.set_component(dead, Deceased { killer: killer.clone() })?;
            ctx.ecs.update_component::<Attributes, _>(dead, |a| a.hp = 0).ok();
            tracing::info!(actor = %name, killer = ?killer, "actor died");

            let stage = ctx.stage_context_of(dead);
            if let Some(killer) = &killer {
                let uniques: Vec<String> = ctx
                    .files
                    .props
                    .list(&name)
                    .into_iter()
                    .filter(|f| f.is_unique())
                    .map(|f| f.prop.name.clone())
                    .collect();
                for prop in uniques {
                    match ctx.files.transfer_prop(&name, killer, &prop, None) {
                        Ok(receipt) => {
                            if let Some(stage) = &stage {
                                let event = AgentEvent::PropTransferred {
                                    from: name.clone(),
                                    to: killer.clone(),
                                    prop: receipt.prop_name,
                                    count: receipt.moved,
                                    verb: TransferVerb::Give,
                                };
                                ctx.notify_stage(stage, true, &event);
                            }
                        }
                        Err(e) => tracing::warn!(prop = %prop, error = %e, "unique prop stayed with the dead"),
                    }
                }
            }

            if let Some(stage) = &stage {
                let event = AgentEvent::Killed {
                    killer: killer.clone().unwrap_or_else(|| "未知的力量".to_string()),
                    target: name.clone(),
                };
                ctx.notify_stage(stage, true, &event);
            }

            if ctx.is_player(dead) {
                ctx.mark_game_over(format!("{name}死亡"));
            } else {
                ctx.ecs.set_component(dead, DestroyMark)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use persistence::PropType;

    use super::*;
    use crate::testing::{add_actor, add_player, add_stage, context, count_of, give, heard, prop};

    fn hp(ctx: &RpgContext, e: EntityId) -> i32 {
        ctx.ecs.get_component::<Attributes>(e).unwrap().hp
    }

    fn damage(ctx: &mut RpgContext, source: EntityId, value: &str) {
        ctx.ecs
            .set_component(source, DamageAction { values: vec![value.into()] })
            .unwrap();
    }

    #[tokio::test]
    async fn damage_adds_attack_and_subtracts_defense() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        ctx.ecs.set_component(a, Attributes::new(100, 5, 0, 0)).unwrap();
        ctx.ecs.set_component(b, Attributes::new(100, 0, 3, 0)).unwrap();
        give(&mut ctx, "A", prop("Sword", PropType::Weapon, vec![0, 0, 10, 0, 0]), 1);
        ctx.ecs.set_component(a, Weapon { prop_name: "Sword".into() }).unwrap();
        give(&mut ctx, "B", prop("Mail", PropType::Clothes, vec![0, 0, 0, 2, 0]), 1);
        ctx.ecs.set_component(b, Clothes { prop_name: "Mail".into() }).unwrap();
        damage(&mut ctx, a, "@B/Punch=20");

        DamageSystem.react(&mut ctx, vec![a]).await.unwrap();
        // 20 + 5 + 10 - 3 - 2
        assert_eq!(hp(&ctx, b), 70);
        assert!(heard(&ctx, "X", "造成了30点伤害"));
        assert!(!ctx.ecs.has_component::<DeadAction>(b));
    }

    #[tokio::test]
    async fn damage_never_goes_negative_or_heals() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        ctx.ecs.set_component(b, Attributes::new(100, 0, 50, 0)).unwrap();
        damage(&mut ctx, a, "@B/Poke=10");

        DamageSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert_eq!(hp(&ctx, b), 100);
    }

    #[tokio::test]
    async fn lethal_damage_marks_dying() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        damage(&mut ctx, a, "@B/Fireball=500");

        DamageSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert_eq!(hp(&ctx, b), 0);
        assert_eq!(ctx.ecs.get_component::<DeadAction>(b).unwrap().values, vec!["A"]);
    }

    #[tokio::test]
    async fn huge_damage_saturates_instead_of_overflowing() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        let c = add_actor(&mut ctx, "C", "X");
        ctx.ecs.set_component(a, Attributes::new(100, 5, 0, 0)).unwrap();
        ctx.ecs
            .set_component(
                a,
                DamageAction {
                    values: vec!["@B/Nuke=2147483647".into(), "@C/Nuke=3000000000".into()],
                },
            )
            .unwrap();

        DamageSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert_eq!(hp(&ctx, b), 0);
        assert_eq!(hp(&ctx, c), 0);
        assert!(ctx.ecs.has_component::<DeadAction>(b));
        assert!(ctx.ecs.has_component::<DeadAction>(c));
    }

    #[tokio::test]
    async fn huge_heal_is_capped_without_overflow() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        ctx.ecs.update_component::<Attributes, _>(b, |a| a.hp = 40).unwrap();
        ctx.ecs
            .set_component(a, HealAction { values: vec!["@B/Elixir=4294967295".into()] })
            .unwrap();

        HealSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert_eq!(hp(&ctx, b), 100);
        assert!(heard(&ctx, "B", "恢复了60点生命值"));
    }

    #[tokio::test]
    async fn damage_to_other_stage_is_corrected() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        add_stage(&mut ctx, "Y", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let c = add_actor(&mut ctx, "C", "Y");
        damage(&mut ctx, a, "@C/Punch=10");

        DamageSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert_eq!(hp(&ctx, c), 100);
        assert!(heard(&ctx, "A", "不在A所在的场景中"));
    }

    #[tokio::test]
    async fn heal_is_capped() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let a = add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        ctx.ecs.update_component::<Attributes, _>(b, |a| a.hp = 90).unwrap();
        ctx.ecs
            .set_component(a, HealAction { values: vec!["@B/Potion=50".into()] })
            .unwrap();

        HealSystem.react(&mut ctx, vec![a]).await.unwrap();
        assert_eq!(hp(&ctx, b), 100);
        assert!(heard(&ctx, "B", "恢复了10点生命值"));
    }

    #[tokio::test]
    async fn death_hands_unique_props_to_killer() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        add_actor(&mut ctx, "A", "X");
        let b = add_actor(&mut ctx, "B", "X");
        let mut crown = prop("Crown", PropType::NonConsumable, vec![]);
        crown.unique = true;
        give(&mut ctx, "B", crown, 1);
        give(&mut ctx, "B", prop("Bread", PropType::Consumable, vec![]), 2);
        ctx.ecs
            .set_component(b, DeadAction { values: vec!["A".into()] })
            .unwrap();

        DeadSystem.react(&mut ctx, vec![b]).await.unwrap();
        assert_eq!(count_of(&ctx, "A", "Crown"), Some(1));
        assert_eq!(count_of(&ctx, "B", "Crown"), None);
        assert_eq!(count_of(&ctx, "B", "Bread"), Some(2));
        assert_eq!(ctx.ecs.get_component::<Deceased>(b).unwrap().killer.as_deref(), Some("A"));
        assert!(ctx.ecs.has_component::<DestroyMark>(b));
        assert!(heard(&ctx, "A", "你击败了B"));
        assert!(!ctx.is_game_over());
    }

    #[tokio::test]
    async fn dead_player_ends_the_game() {
        let mut ctx = context();
        add_stage(&mut ctx, "X", &[]);
        let p = add_player(&mut ctx, "P", "X");
        ctx.ecs.set_component(p, DeadAction::default()).unwrap();

        DeadSystem.react(&mut ctx, vec![p]).await.unwrap();
        assert!(ctx.is_game_over());
        assert!(!ctx.ecs.has_component::<DestroyMark>(p));
        assert!(ctx.ecs.get_component::<Deceased>(p).unwrap().killer.is_none());
    }
}
