//! World-wide guarantees that must hold after every round.

mod common;

use std::collections::BTreeMap;
use std::path::Path;

use rpg::components::{Actor, Attributes, FinalAppearance};
use rpg::prompts::combine_appearance;
use rpg::{Game, PrePlanningPolicy};
use serde_json::json;

use common::{
    actor_plan, actor_slot, base_scenario, entity, heard, history_texts, plans_once, scripted, stage_plan,
    WorldBuilder,
};

fn snapshot(game: &Game) -> String {
    let ctx = game.ctx();
    let mut out = String::new();
    for name in ctx.agents.names() {
        out.push_str(&format!("{name}: {:?}\n", history_texts(game, &name)));
        let Some(e) = ctx.entity_by_name(&name) else {
            continue;
        };
        out.push_str(&format!(
            "  actor={:?} attrs={:?} look={:?}\n",
            ctx.ecs.try_component::<Actor>(e),
            ctx.ecs.try_component::<Attributes>(e),
            ctx.ecs.try_component::<FinalAppearance>(e),
        ));
        let props: Vec<(String, u32)> = ctx.props_of(&name).into_iter().map(|(p, n)| (p.name, n)).collect();
        out.push_str(&format!("  props={props:?}\n"));
    }
    out.push_str(&format!("map={:?}\n", ctx.stage_actors_map()));
    out
}

fn read_tree(root: &Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let key = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                files.insert(key, std::fs::read_to_string(&path).unwrap());
            }
        }
    }
    files
}

fn busy_world(dir: &Path) -> Game {
    let mut scenario = base_scenario();
    actor_slot(&mut scenario, "A")["props"] = json!([{"name": "Potion", "count": 3}, {"name": "Robe"}]);
    let a = scripted(
        "A",
        vec![
            (actor_plan(1), json!({"SpeakAction": ["@B>你好"], "EquipPropAction": ["Robe"]}).to_string()),
            (actor_plan(2), json!({"GivePropAction": ["@C/Potion=2"]}).to_string()),
            (actor_plan(3), json!({"GoToAction": ["Y"]}).to_string()),
        ],
    );
    let b = plans_once("B", 2, json!({"WhisperAction": ["@C>小心A"]}));
    WorldBuilder::new(scenario)
        .client("A", a)
        .client("B", b)
        .runtime_dir(dir)
        .build()
}

#[tokio::test]
async fn identical_inputs_give_identical_worlds() {
    let dir_one = tempfile::tempdir().unwrap();
    let dir_two = tempfile::tempdir().unwrap();
    let mut one = busy_world(dir_one.path());
    let mut two = busy_world(dir_two.path());

    for _ in 0..3 {
        one.step().await.unwrap();
        two.step().await.unwrap();
        assert_eq!(snapshot(&one), snapshot(&two));
    }
    assert_eq!(read_tree(dir_one.path()), read_tree(dir_two.path()));
    assert!(!read_tree(dir_one.path()).is_empty());
}

#[tokio::test]
async fn no_action_survives_a_round() {
    let dir = tempfile::tempdir().unwrap();
    let mut game = busy_world(dir.path());

    for _ in 0..3 {
        game.step().await.unwrap();
        for e in game.ctx().ecs.all_entities() {
            assert!(!rpg::actions::has_any_action(&game.ctx().ecs, e));
        }
    }
}

#[tokio::test]
async fn only_the_players_stage_plans_after_the_first_round() {
    let mut scenario = base_scenario();
    scenario["players"] = json!([{"name": "P"}]);
    scenario["stages"][0]["actors"] = json!([{"name": "A"}, {"name": "B"}, {"name": "C"}, {"name": "P"}]);
    let d = scripted("D", vec![]);
    let y = scripted("Y", vec![]);
    let a = scripted("A", vec![]);
    let mut game = WorldBuilder::new(scenario)
        .client("A", a.clone())
        .client("D", d.clone())
        .client("Y", y.clone())
        .offline("P")
        .policy(PrePlanningPolicy::OnlyPlayersStage)
        .build();

    game.step().await.unwrap();
    game.submit_command("P", "/speak @A>hello").unwrap();
    game.step().await.unwrap();

    let asked = |calls: Vec<String>, needles: Vec<String>| {
        calls.iter().any(|p| needles.iter().all(|n| p.contains(n.as_str())))
    };
    assert!(asked(d.calls(), actor_plan(1)));
    assert!(!asked(d.calls(), actor_plan(2)));
    assert!(asked(y.calls(), stage_plan(1)));
    assert!(!asked(y.calls(), stage_plan(2)));
    assert!(asked(a.calls(), actor_plan(2)));
    assert!(heard(&game, "A", "hello"));
    assert!(!heard(&game, "D", "hello"));
}

#[tokio::test]
async fn prop_counts_are_conserved() {
    let mut scenario = base_scenario();
    scenario["stages"][0]["props"] = json!([{"name": "Potion", "count": 5}]);
    actor_slot(&mut scenario, "C")["props"] = json!([{"name": "Potion", "count": 1}]);
    let mut game = WorldBuilder::new(scenario)
        .client("A", plans_once("A", 1, json!({"PickUpPropAction": ["Potion=2"]})))
        .client("B", plans_once("B", 1, json!({"StealPropAction": ["@A/Potion=1"]})))
        .client("C", plans_once("C", 1, json!({"TransferPropAction": ["@A/Potion=1"]})))
        .client("D", plans_once("D", 2, json!({"GivePropAction": ["@A/Potion=9"]})))
        .build();
    let before = game.ctx().files.total_count("Potion");
    assert_eq!(before, 6);

    for _ in 0..2 {
        game.step().await.unwrap();
        assert_eq!(game.ctx().files.total_count("Potion"), before);
    }
}

#[tokio::test]
async fn actor_stage_matches_the_space_after_movement() {
    let mut scenario = base_scenario();
    scenario["database"]["stages"][1]["stage_graph"] = json!([]);
    let mut game = WorldBuilder::new(scenario)
        .client("A", plans_once("A", 1, json!({"GoToAction": ["Y"]})))
        .client("D", plans_once("D", 1, json!({"GoToAction": ["X"]})))
        .client("B", plans_once("B", 2, json!({"GoToAction": ["Nowhere"]})))
        .build();

    for _ in 0..2 {
        game.step().await.unwrap();
        let ctx = game.ctx();
        for e in ctx.ecs.entities_with::<Actor>() {
            let actor = ctx.ecs.try_component::<Actor>(e).unwrap();
            assert_eq!(Some(actor.current_stage.as_str()), ctx.stages.entity_stage(e), "{}", actor.name);
        }
    }
    assert_eq!(common::current_stage(&game, "A"), "Y");
    assert_eq!(common::current_stage(&game, "D"), "X");
    assert_eq!(common::current_stage(&game, "B"), "X");
}

#[tokio::test]
async fn equipping_clothes_updates_the_look() {
    let mut scenario = base_scenario();
    actor_slot(&mut scenario, "A")["props"] = json!([{"name": "Robe"}]);
    let mut game = WorldBuilder::new(scenario)
        .client("A", plans_once("A", 1, json!({"EquipPropAction": ["Robe"]})))
        .build();

    game.step().await.unwrap();

    let a = entity(&game, "A");
    let look = game.ctx().ecs.try_component::<FinalAppearance>(a).unwrap();
    assert_eq!(look.text, combine_appearance("A的样子", "红袍"));
    let b = entity(&game, "B");
    let look = game.ctx().ecs.try_component::<FinalAppearance>(b).unwrap();
    assert_eq!(look.text, "B的样子");
}

#[tokio::test]
async fn rejected_stage_plan_is_not_remembered() {
    let x = scripted("X", vec![(stage_plan(2), json!({"GoToAction": ["Y"]}).to_string())]);
    let mut game = WorldBuilder::new(base_scenario()).client("X", x.clone()).build();

    game.step().await.unwrap();
    let before = history_texts(&game, "X").len();
    game.step().await.unwrap();

    assert!(x.calls().iter().any(|p| p.contains("当前回合: 2\n")));
    assert_eq!(history_texts(&game, "X").len(), before);
    assert!(!game.ctx().ecs.has_component::<rpg::actions::GoToAction>(entity(&game, "X")));
}

#[tokio::test]
async fn whispers_and_announcements_reach_the_right_ears() {
    let mut game = WorldBuilder::new(base_scenario())
        .client(
            "A",
            plans_once("A", 1, json!({"WhisperAction": ["@B>秘密"], "AnnounceAction": ["大家好"]})),
        )
        .build();

    game.step().await.unwrap();

    assert!(heard(&game, "A", "秘密"));
    assert!(heard(&game, "B", "秘密"));
    for name in ["C", "D", "X", "Y"] {
        assert!(!heard(&game, name, "秘密"), "{name} overheard the whisper");
    }
    for name in ["A", "B", "C", "X"] {
        assert!(heard(&game, name, "大家好"), "{name} missed the announcement");
    }
    for name in ["D", "Y"] {
        assert!(!heard(&game, name, "大家好"), "{name} heard a foreign announcement");
    }
}
